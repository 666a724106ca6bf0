use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{
    AnswerError, AnswerValue, AttemptId, ExamPhase, ExamSession, ExamSettings, LoadError,
    QuestionId, SubmissionTicket, SubmissionTrigger, TestId,
};
use gateway::{SubmissionGateway, TestCatalog};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ExamError, SubmissionError};
use crate::integrity::{IntegrityEvent, IntegrityMonitor, SignalSource};
use crate::submission::{Admission, Delivery, SubmissionCoordinator, SubmissionReceipt};
use crate::timer::{CountdownTimer, TimerEvent};

/// User intent forwarded from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamCommand {
    SetAnswer {
        question_id: QuestionId,
        value: AnswerValue,
    },
    ToggleOption {
        question_id: QuestionId,
        option: usize,
    },
    ClearAnswer {
        question_id: QuestionId,
    },
    NavigateTo(usize),
    Next,
    Previous,
    /// Manual submit.
    Submit,
    /// Resend a failed submission.
    Retry,
}

/// State changes the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub enum ExamNotice {
    Started {
        attempt_id: AttemptId,
        remaining_seconds: u32,
    },
    Tick {
        remaining_seconds: u32,
        display: String,
        low_time: bool,
    },
    Warning {
        count: u32,
        threshold: u32,
    },
    AnswerRejected {
        question_id: QuestionId,
        error: AnswerError,
    },
    Navigated {
        index: usize,
    },
    PhaseChanged {
        phase: ExamPhase,
        trigger: Option<SubmissionTrigger>,
    },
    Submitted(SubmissionReceipt),
    SubmissionFailed {
        message: String,
    },
}

struct InFlight {
    ticket: SubmissionTicket,
    delivery: Delivery,
}

/// Owns one attempt and drives it from start to submission.
///
/// Every event is handled to completion before the next is polled, so the
/// session needs no locking.
pub struct ExamController {
    session: ExamSession,
    timer: CountdownTimer,
    monitor: IntegrityMonitor,
    coordinator: SubmissionCoordinator,
}

impl ExamController {
    #[must_use]
    pub fn new(session: ExamSession, gateway: Arc<dyn SubmissionGateway>) -> Self {
        let timer = CountdownTimer::new(session.settings().tick_interval());
        Self {
            session,
            timer,
            monitor: IntegrityMonitor::new(),
            coordinator: SubmissionCoordinator::new(gateway),
        }
    }

    /// Fetch a test and open an attempt on it.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Catalog` if the fetch fails and `ExamError::Load` if
    /// the payload cannot start an attempt.
    pub async fn load(
        catalog: &dyn TestCatalog,
        gateway: Arc<dyn SubmissionGateway>,
        test_id: &TestId,
        settings: ExamSettings,
        clock: Clock,
    ) -> Result<Self, ExamError> {
        let test = catalog
            .fetch_test(test_id)
            .await
            .map_err(ExamError::Catalog)?;
        if test.id != *test_id {
            warn!(%test_id, received = %test.id, "catalog returned a different test");
            return Err(LoadError::UnexpectedTest {
                requested: test_id.clone(),
                received: test.id,
            }
            .into());
        }
        let session = ExamSession::prepare(test, settings, clock).inspect_err(|err| {
            warn!(%test_id, error = %err, "test cannot be started");
        })?;
        info!(
            %test_id,
            attempt_id = %session.attempt_id(),
            questions = session.questions().len(),
            duration_seconds = session.duration_seconds(),
            "test loaded"
        );
        Ok(Self::new(session, gateway))
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.coordinator.receipt()
    }

    /// Drive the attempt until it is submitted.
    ///
    /// Starts a prepared session, the countdown and the integrity monitor, then
    /// handles timer ticks, environment signals, commands and the in-flight
    /// submission one at a time. Fullscreen is handed back to the host when the
    /// run ends. Notices are best-effort; a dropped receiver is ignored.
    ///
    /// # Errors
    ///
    /// Returns the last `SubmissionError` once the session is `Failed` and the
    /// command channel has closed, since no retry can arrive after that.
    pub async fn run(
        &mut self,
        source: &mut dyn SignalSource,
        commands: mpsc::Receiver<ExamCommand>,
        notices: mpsc::UnboundedSender<ExamNotice>,
    ) -> Result<SubmissionReceipt, ExamError> {
        if let Some(receipt) = self.coordinator.receipt() {
            return Ok(receipt.clone());
        }
        if self.session.phase() == ExamPhase::Loading {
            self.session.start()?;
        }

        let outcome = self.drive(source, commands, &notices).await;
        self.monitor.release(source);
        if let Ok(receipt) = &outcome {
            info!(
                attempt_id = %receipt.attempt_id,
                result_id = %receipt.result_id(),
                trigger = %receipt.trigger,
                "exam finished"
            );
        }
        outcome
    }

    async fn drive(
        &mut self,
        source: &mut dyn SignalSource,
        mut commands: mpsc::Receiver<ExamCommand>,
        notices: &mpsc::UnboundedSender<ExamNotice>,
    ) -> Result<SubmissionReceipt, ExamError> {
        let started = Instant::now();
        let already_spent = self.session.ticked_seconds();
        let elapsed = move || {
            let wall = u32::try_from(started.elapsed().as_secs()).unwrap_or(u32::MAX);
            already_spent.saturating_add(wall)
        };

        if self.session.is_in_progress() {
            self.timer.start(self.session.remaining_seconds());
            self.monitor.arm(source);
            info!(
                attempt_id = %self.session.attempt_id(),
                remaining_seconds = self.session.remaining_seconds(),
                "exam started"
            );
            notify(
                notices,
                ExamNotice::Started {
                    attempt_id: self.session.attempt_id(),
                    remaining_seconds: self.session.remaining_seconds(),
                },
            );
        }

        let mut in_flight: Option<InFlight> = None;
        let mut failure: Option<SubmissionError> = None;
        let mut signals_open = true;
        let mut commands_open = true;

        loop {
            if !commands_open
                && in_flight.is_none()
                && self.session.phase() == ExamPhase::Failed
            {
                return Err(failure.map_or(ExamError::Abandoned, ExamError::Submission));
            }

            tokio::select! {
                biased;

                Some(result) = async {
                    match in_flight.as_mut() {
                        Some(flight) => Some(flight.delivery.as_mut().await),
                        None => None,
                    }
                } => {
                    let Some(flight) = in_flight.take() else { continue };
                    match self.coordinator.settle(&mut self.session, &flight.ticket, result) {
                        Ok(receipt) => {
                            notify(notices, self.phase_notice());
                            notify(notices, ExamNotice::Submitted(receipt.clone()));
                            return Ok(receipt);
                        }
                        Err(err) => {
                            notify(notices, self.phase_notice());
                            notify(notices, ExamNotice::SubmissionFailed { message: err.to_string() });
                            failure = Some(err);
                        }
                    }
                }

                event = self.timer.next_event() => {
                    let trigger = self.on_timer(event, notices);
                    if let Some(trigger) = trigger {
                        self.trigger(trigger, elapsed(), &mut in_flight, notices);
                    }
                }

                signal = source.next_signal(), if signals_open => {
                    let Some(signal) = signal else {
                        debug!("signal source closed");
                        signals_open = false;
                        continue;
                    };
                    match self.monitor.observe(signal, &mut self.session) {
                        Some(IntegrityEvent::Warning { count, threshold }) => {
                            notify(notices, ExamNotice::Warning { count, threshold });
                        }
                        Some(IntegrityEvent::Tripped { .. }) => {
                            self.trigger(SubmissionTrigger::IntegrityViolation, elapsed(), &mut in_flight, notices);
                        }
                        None => {}
                    }
                }

                command = commands.recv(), if commands_open => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        commands_open = false;
                        continue;
                    };
                    if let Some(trigger) = self.on_command(command, notices) {
                        self.trigger(trigger, elapsed(), &mut in_flight, notices);
                    }
                }
            }
        }
    }

    fn on_timer(
        &mut self,
        event: TimerEvent,
        notices: &mpsc::UnboundedSender<ExamNotice>,
    ) -> Option<SubmissionTrigger> {
        let (remaining, trigger) = match event {
            TimerEvent::Tick { remaining } => (remaining, None),
            TimerEvent::Expired => (0, Some(SubmissionTrigger::Timeout)),
        };
        let remaining_seconds = self.session.record_tick(remaining);
        debug!(remaining_seconds, "tick");
        notify(
            notices,
            ExamNotice::Tick {
                remaining_seconds,
                display: self.session.formatted_remaining(),
                low_time: self.session.is_low_time(),
            },
        );
        trigger
    }

    fn on_command(
        &mut self,
        command: ExamCommand,
        notices: &mpsc::UnboundedSender<ExamNotice>,
    ) -> Option<SubmissionTrigger> {
        let (question_id, result) = match command {
            ExamCommand::SetAnswer { question_id, value } => {
                let result = self.session.set_answer(&question_id, value);
                (question_id, result)
            }
            ExamCommand::ToggleOption {
                question_id,
                option,
            } => {
                let result = self.session.toggle_option(&question_id, option);
                (question_id, result)
            }
            ExamCommand::ClearAnswer { question_id } => {
                let result = self.session.clear_answer(&question_id);
                (question_id, result)
            }
            ExamCommand::NavigateTo(index) => {
                let index = self.session.navigate_to(index);
                notify(notices, ExamNotice::Navigated { index });
                return None;
            }
            ExamCommand::Next => {
                let index = self.session.next();
                notify(notices, ExamNotice::Navigated { index });
                return None;
            }
            ExamCommand::Previous => {
                let index = self.session.previous();
                notify(notices, ExamNotice::Navigated { index });
                return None;
            }
            ExamCommand::Submit => return Some(SubmissionTrigger::Manual),
            ExamCommand::Retry => {
                if self.session.phase() != ExamPhase::Failed {
                    debug!(phase = %self.session.phase(), "retry ignored");
                    return None;
                }
                return Some(
                    self.session
                        .submission_trigger()
                        .unwrap_or(SubmissionTrigger::Manual),
                );
            }
        };

        if let Err(error) = result {
            debug!(%question_id, %error, "answer rejected");
            notify(notices, ExamNotice::AnswerRejected { question_id, error });
        }
        None
    }

    fn trigger(
        &mut self,
        trigger: SubmissionTrigger,
        elapsed_seconds: u32,
        in_flight: &mut Option<InFlight>,
        notices: &mpsc::UnboundedSender<ExamNotice>,
    ) {
        match self.coordinator.admit(
            &mut self.session,
            &mut self.timer,
            &mut self.monitor,
            trigger,
            elapsed_seconds,
        ) {
            Ok(Admission::Deliver(ticket)) => {
                notify(notices, self.phase_notice());
                let delivery = self.coordinator.delivery(&ticket);
                *in_flight = Some(InFlight { ticket, delivery });
            }
            Ok(Admission::Skip(_)) => {}
            Err(err) => warn!(%trigger, error = %err, "submission refused"),
        }
    }

    fn phase_notice(&self) -> ExamNotice {
        ExamNotice::PhaseChanged {
            phase: self.session.phase(),
            trigger: self.session.submission_trigger(),
        }
    }
}

fn notify(notices: &mpsc::UnboundedSender<ExamNotice>, notice: ExamNotice) {
    let _ = notices.send(notice);
}
