use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{
    AttemptId, BeginSubmission, ExamSession, ResultId, SubmissionTicket, SubmissionTrigger,
};
use gateway::{AttemptSubmission, GatewayError, SubmissionAck, SubmissionGateway};
use tracing::{debug, info, warn};

use crate::error::SubmissionError;
use crate::integrity::IntegrityMonitor;
use crate::timer::CountdownTimer;

/// Network half of a submission, detached from the session borrow.
pub type Delivery = Pin<Box<dyn Future<Output = Result<SubmissionAck, GatewayError>> + Send>>;

/// What the caller gets back for an accepted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub attempt_id: AttemptId,
    pub trigger: SubmissionTrigger,
    pub elapsed_seconds: u32,
    /// Number of deliveries it took, 1 when the first call succeeded.
    pub deliveries: u32,
    /// When the attempt stopped accepting answers.
    pub finished_at: DateTime<Utc>,
    pub ack: SubmissionAck,
}

impl SubmissionReceipt {
    #[must_use]
    pub fn result_id(&self) -> &ResultId {
        &self.ack.result_id
    }
}

/// Result of a `submit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The attempt is accepted, either by this call or an earlier one.
    Submitted(SubmissionReceipt),
    /// Another delivery is in flight; this call issued nothing.
    InFlight,
}

/// What the guard decided for one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Phase is now `Submitting`; deliver this ticket.
    Deliver(SubmissionTicket),
    /// Nothing to send.
    Skip(SubmitOutcome),
}

/// Single gate through which an attempt reaches `Submitted`.
///
/// The phase flip in `admit` is synchronous, so whichever of timeout, integrity
/// trip or manual submit calls it first wins and every later call is a no-op.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    gateway: Arc<dyn SubmissionGateway>,
    receipt: Option<SubmissionReceipt>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(gateway: Arc<dyn SubmissionGateway>) -> Self {
        Self {
            gateway,
            receipt: None,
        }
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// Submit the attempt and wait for the service.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::NotStarted` for a session that never started,
    /// and `SubmissionError::Gateway` when delivery fails (the session is then `Failed`).
    pub async fn submit(
        &mut self,
        session: &mut ExamSession,
        timer: &mut CountdownTimer,
        monitor: &mut IntegrityMonitor,
        trigger: SubmissionTrigger,
        elapsed_seconds: u32,
    ) -> Result<SubmitOutcome, SubmissionError> {
        match self.admit(session, timer, monitor, trigger, elapsed_seconds)? {
            Admission::Skip(outcome) => Ok(outcome),
            Admission::Deliver(ticket) => {
                let result = self.delivery(&ticket).await;
                self.settle(session, &ticket, result)
                    .map(SubmitOutcome::Submitted)
            }
        }
    }

    /// Synchronous guard step: flip the phase, stop the timer, disarm the monitor.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::NotStarted` for a session that never started.
    pub fn admit(
        &self,
        session: &mut ExamSession,
        timer: &mut CountdownTimer,
        monitor: &mut IntegrityMonitor,
        trigger: SubmissionTrigger,
        elapsed_seconds: u32,
    ) -> Result<Admission, SubmissionError> {
        match session.begin_submission(trigger, elapsed_seconds) {
            BeginSubmission::Started(ticket) => {
                timer.stop();
                monitor.disarm();
                info!(
                    attempt_id = %ticket.attempt_id,
                    trigger = %ticket.trigger,
                    delivery = ticket.delivery,
                    elapsed = ticket.elapsed_seconds,
                    answered = session.answered_count(),
                    questions = ticket.snapshot.len(),
                    "submitting attempt"
                );
                Ok(Admission::Deliver(ticket))
            }
            BeginSubmission::InFlight => {
                debug!(%trigger, "submission already in flight");
                Ok(Admission::Skip(SubmitOutcome::InFlight))
            }
            BeginSubmission::AlreadySubmitted(result_id) => {
                debug!(%trigger, %result_id, "attempt already submitted");
                let receipt = match (&self.receipt, session.ticket()) {
                    (Some(receipt), _) => receipt.clone(),
                    // Accepted through another coordinator; rebuild from the frozen ticket.
                    (None, Some(ticket)) => SubmissionReceipt {
                        attempt_id: ticket.attempt_id,
                        trigger: ticket.trigger,
                        elapsed_seconds: ticket.elapsed_seconds,
                        deliveries: ticket.delivery,
                        finished_at: finished_at(session),
                        ack: SubmissionAck::new(result_id),
                    },
                    (None, None) => return Err(SubmissionError::NotStarted),
                };
                Ok(Admission::Skip(SubmitOutcome::Submitted(receipt)))
            }
            BeginSubmission::NotStarted => Err(SubmissionError::NotStarted),
        }
    }

    /// Build the network call for an admitted ticket.
    #[must_use]
    pub fn delivery(&self, ticket: &SubmissionTicket) -> Delivery {
        let gateway = Arc::clone(&self.gateway);
        let submission = AttemptSubmission::from_ticket(ticket);
        Box::pin(async move { gateway.submit_attempt(&submission).await })
    }

    /// Apply the service's answer to the session.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Gateway` for a failed delivery; the session is
    /// moved to `Failed` and no retry is attempted.
    pub fn settle(
        &mut self,
        session: &mut ExamSession,
        ticket: &SubmissionTicket,
        result: Result<SubmissionAck, GatewayError>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        match result {
            Ok(ack) => {
                session.complete_submission(ack.result_id.clone())?;
                info!(
                    attempt_id = %ticket.attempt_id,
                    result_id = %ack.result_id,
                    "attempt submitted"
                );
                let receipt = SubmissionReceipt {
                    attempt_id: ticket.attempt_id,
                    trigger: ticket.trigger,
                    elapsed_seconds: ticket.elapsed_seconds,
                    deliveries: ticket.delivery,
                    finished_at: finished_at(session),
                    ack,
                };
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(err) => {
                session.fail_submission()?;
                warn!(
                    attempt_id = %ticket.attempt_id,
                    delivery = ticket.delivery,
                    error = %err,
                    "submission failed"
                );
                Err(SubmissionError::Gateway(err))
            }
        }
    }
}

fn finished_at(session: &ExamSession) -> DateTime<Utc> {
    session.finished_at().unwrap_or_else(|| session.started_at())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{
        AnswerValue, ExamPhase, ExamSettings, Question, QuestionId, QuestionKind, TestDefinition,
        TestId,
    };
    use exam_core::time::fixed_clock;
    use gateway::InMemoryGateway;
    use std::time::Duration;

    fn build_session() -> ExamSession {
        let test = TestDefinition {
            id: TestId::new("t1"),
            title: "Mock".into(),
            duration_minutes: 1,
            questions: vec![
                Question::new(
                    QuestionId::new("q1"),
                    "Q1",
                    vec!["A".into(), "B".into(), "C".into(), "D".into()],
                    QuestionKind::SingleChoice,
                ),
                Question::new(
                    QuestionId::new("q2"),
                    "Q2",
                    vec!["A".into(), "B".into()],
                    QuestionKind::MultiChoice,
                ),
            ],
            locked: false,
        };
        ExamSession::initialize(test, ExamSettings::default(), fixed_clock()).unwrap()
    }

    struct Fixture {
        gateway: InMemoryGateway,
        coordinator: SubmissionCoordinator,
        session: ExamSession,
        timer: CountdownTimer,
        monitor: IntegrityMonitor,
    }

    fn fixture() -> Fixture {
        let gateway = InMemoryGateway::new();
        let coordinator = SubmissionCoordinator::new(Arc::new(gateway.clone()));
        let mut timer = CountdownTimer::new(Duration::from_secs(1));
        timer.start(60);
        let (_emitter, mut source) = crate::integrity::signal_channel(true);
        let mut monitor = IntegrityMonitor::new();
        monitor.arm(&mut source);
        Fixture {
            gateway,
            coordinator,
            session: build_session(),
            timer,
            monitor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_submit_stops_timer_and_disarms_monitor() {
        let mut f = fixture();
        let outcome = f
            .coordinator
            .submit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Manual,
                12,
            )
            .await
            .unwrap();

        let SubmitOutcome::Submitted(receipt) = outcome else {
            panic!("expected a receipt");
        };
        assert_eq!(receipt.trigger, SubmissionTrigger::Manual);
        assert_eq!(receipt.elapsed_seconds, 12);
        assert_eq!(receipt.deliveries, 1);
        assert_eq!(receipt.finished_at, exam_core::time::fixed_now());
        assert_eq!(f.session.phase(), ExamPhase::Submitted);
        assert!(!f.timer.is_running());
        assert!(!f.monitor.is_armed());
        assert_eq!(f.gateway.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn racing_triggers_issue_one_delivery() {
        let mut f = fixture();
        let first = f
            .coordinator
            .admit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Timeout,
                60,
            )
            .unwrap();
        let second = f
            .coordinator
            .admit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Manual,
                60,
            )
            .unwrap();
        assert_eq!(second, Admission::Skip(SubmitOutcome::InFlight));

        let Admission::Deliver(ticket) = first else {
            panic!("first trigger should deliver");
        };
        let result = f.coordinator.delivery(&ticket).await;
        let receipt = f
            .coordinator
            .settle(&mut f.session, &ticket, result)
            .unwrap();
        assert_eq!(receipt.trigger, SubmissionTrigger::Timeout);
        assert_eq!(f.gateway.deliveries().len(), 1);

        let again = f
            .coordinator
            .submit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::IntegrityViolation,
                60,
            )
            .await
            .unwrap();
        assert_eq!(again, SubmitOutcome::Submitted(receipt));
        assert_eq!(f.gateway.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_moves_to_failed_and_retry_reuses_snapshot() {
        let mut f = fixture();
        f.session
            .set_answer(&QuestionId::new("q1"), AnswerValue::Single(3))
            .unwrap();
        f.gateway.fail_next(1).unwrap();

        let err = f
            .coordinator
            .submit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Timeout,
                60,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Gateway(GatewayError::Unavailable(_))));
        assert_eq!(f.session.phase(), ExamPhase::Failed);
        assert!(!f.timer.is_running());
        assert!(!f.monitor.is_armed());

        let outcome = f
            .coordinator
            .submit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Timeout,
                60,
            )
            .await
            .unwrap();
        let SubmitOutcome::Submitted(receipt) = outcome else {
            panic!("retry should be accepted");
        };
        assert_eq!(receipt.deliveries, 2);
        assert_eq!(f.session.phase(), ExamPhase::Submitted);

        let deliveries = f.gateway.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0], deliveries[1]);
        assert_eq!(f.gateway.accepted_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_from_another_coordinator_reports_delivered_elapsed() {
        let mut f = fixture();
        f.coordinator
            .submit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::IntegrityViolation,
                17,
            )
            .await
            .unwrap();

        let fresh = SubmissionCoordinator::new(Arc::new(f.gateway.clone()));
        let outcome = fresh
            .admit(
                &mut f.session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Timeout,
                60,
            )
            .unwrap();
        let Admission::Skip(SubmitOutcome::Submitted(receipt)) = outcome else {
            panic!("submitted session must not deliver again");
        };
        assert_eq!(receipt.elapsed_seconds, 17);
        assert_eq!(receipt.trigger, SubmissionTrigger::IntegrityViolation);
        assert_eq!(receipt.deliveries, 1);
        assert_eq!(receipt.result_id(), f.session.result_id().unwrap());
        assert_eq!(f.gateway.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unstarted_session_is_refused() {
        let mut f = fixture();
        let test = TestDefinition {
            id: TestId::new("t2"),
            title: "Later".into(),
            duration_minutes: 5,
            questions: vec![Question::new(
                QuestionId::new("q1"),
                "Q1",
                vec!["A".into(), "B".into()],
                QuestionKind::SingleChoice,
            )],
            locked: false,
        };
        let mut session =
            ExamSession::prepare(test, ExamSettings::default(), fixed_clock()).unwrap();

        let err = f
            .coordinator
            .submit(
                &mut session,
                &mut f.timer,
                &mut f.monitor,
                SubmissionTrigger::Manual,
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NotStarted));
        assert_eq!(session.phase(), ExamPhase::Loading);
        assert!(f.timer.is_running());
        assert!(f.gateway.deliveries().is_empty());
    }
}
