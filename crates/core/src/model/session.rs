use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::answer::{AnswerError, AnswerValue};
use crate::model::ids::{AttemptId, QuestionId, ResultId, TestId};
use crate::model::question::{Question, QuestionKind};
use crate::model::settings::ExamSettings;
use crate::model::snapshot::{AnswerSnapshot, SnapshotEntry};
use crate::model::test::{LoadError, TestDefinition};
use crate::time::{Clock, format_countdown};

static UNANSWERED: AnswerValue = AnswerValue::Unanswered;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PhaseError {
    #[error("expected phase {expected}, found {actual}")]
    Unexpected {
        expected: ExamPhase,
        actual: ExamPhase,
    },
}

//
// ─── PHASE & TRIGGER ───────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt.
///
/// `Loading -> InProgress -> Submitting -> {Submitted, Failed}`, with
/// `Failed -> Submitting` only through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamPhase {
    Loading,
    InProgress,
    Submitting,
    Submitted,
    Failed,
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExamPhase::Loading => "loading",
            ExamPhase::InProgress => "in-progress",
            ExamPhase::Submitting => "submitting",
            ExamPhase::Submitted => "submitted",
            ExamPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cause that ended the in-progress phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionTrigger {
    Manual,
    Timeout,
    IntegrityViolation,
}

impl fmt::Display for SubmissionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionTrigger::Manual => "manual",
            SubmissionTrigger::Timeout => "timeout",
            SubmissionTrigger::IntegrityViolation => "integrity-violation",
        };
        f.write_str(name)
    }
}

/// Palette state of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Current,
    Answered,
    Unanswered,
}

//
// ─── SUBMISSION GUARD ──────────────────────────────────────────────────────────
//

/// Frozen payload for one delivery to the submission service.
///
/// Retries carry the same attempt id, snapshot and elapsed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    pub attempt_id: AttemptId,
    pub test_id: TestId,
    pub trigger: SubmissionTrigger,
    pub snapshot: AnswerSnapshot,
    pub elapsed_seconds: u32,
    /// 1 for the first delivery, incremented per retry.
    pub delivery: u32,
}

/// Result of asking the session to enter `Submitting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginSubmission {
    /// Phase flipped to `Submitting`; the caller owns the network call.
    Started(SubmissionTicket),
    /// Another delivery is already in flight.
    InFlight,
    /// The attempt has already been accepted.
    AlreadySubmitted(ResultId),
    /// The session never reached `InProgress`.
    NotStarted,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Authoritative in-memory record of one exam attempt.
///
/// All mutation goes through the methods below and happens synchronously, so a
/// single phase check is enough to serialize the three termination triggers.
pub struct ExamSession {
    attempt_id: AttemptId,
    test_id: TestId,
    title: String,
    questions: Vec<Question>,
    settings: ExamSettings,
    clock: Clock,
    phase: ExamPhase,
    duration_seconds: u32,
    remaining_seconds: u32,
    current: usize,
    answers: HashMap<QuestionId, AnswerValue>,
    violation_count: u32,
    trigger: Option<SubmissionTrigger>,
    ticket: Option<SubmissionTicket>,
    result_id: Option<ResultId>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExamSession {
    /// Validate a loaded test and open an attempt on it.
    ///
    /// The returned session is already `InProgress` with a fresh attempt id.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the payload is locked, has no questions, has a
    /// non-positive duration, or contains malformed questions.
    pub fn initialize(
        test: TestDefinition,
        settings: ExamSettings,
        clock: Clock,
    ) -> Result<Self, LoadError> {
        let mut session = Self::prepare(test, settings, clock)?;
        session.enter_progress();
        Ok(session)
    }

    /// Validate a loaded test and hold the attempt in `Loading` until `start`.
    ///
    /// Answers, ticks, violations and submissions are all refused while loading.
    ///
    /// # Errors
    ///
    /// Same as `initialize`.
    pub fn prepare(
        test: TestDefinition,
        settings: ExamSettings,
        clock: Clock,
    ) -> Result<Self, LoadError> {
        test.validate()?;
        let duration_seconds = test.duration_seconds()?;

        Ok(Self {
            attempt_id: AttemptId::generate(),
            test_id: test.id,
            title: test.title,
            questions: test.questions,
            settings,
            clock,
            phase: ExamPhase::Loading,
            duration_seconds,
            remaining_seconds: duration_seconds,
            current: 0,
            answers: HashMap::new(),
            violation_count: 0,
            trigger: None,
            ticket: None,
            result_id: None,
            started_at: clock.now(),
            finished_at: None,
        })
    }

    /// Move a prepared session to `InProgress` and stamp its start time.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` unless the session is still `Loading`.
    pub fn start(&mut self) -> Result<(), PhaseError> {
        self.expect_phase(ExamPhase::Loading)?;
        self.enter_progress();
        Ok(())
    }

    fn enter_progress(&mut self) {
        self.phase = ExamPhase::InProgress;
        self.started_at = self.clock.now();
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    #[must_use]
    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.phase == ExamPhase::InProgress
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn submission_trigger(&self) -> Option<SubmissionTrigger> {
        self.trigger
    }

    #[must_use]
    pub fn result_id(&self) -> Option<&ResultId> {
        self.result_id.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Payload frozen by the first transition to `Submitting`.
    #[must_use]
    pub fn ticket(&self) -> Option<&SubmissionTicket> {
        self.ticket.as_ref()
    }

    /// When the attempt left `InProgress`.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    /// Stored answer for a question, `Unanswered` if never touched.
    #[must_use]
    pub fn answer(&self, question_id: &QuestionId) -> &AnswerValue {
        self.answers.get(question_id).unwrap_or(&UNANSWERED)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|v| v.is_answered()).count()
    }

    /// Palette state for the question at `index`, `None` if out of range.
    #[must_use]
    pub fn question_status(&self, index: usize) -> Option<QuestionStatus> {
        let question = self.questions.get(index)?;
        if index == self.current {
            Some(QuestionStatus::Current)
        } else if self.answer(question.id()).is_answered() {
            Some(QuestionStatus::Answered)
        } else {
            Some(QuestionStatus::Unanswered)
        }
    }

    /// Countdown as `MM:SS`.
    #[must_use]
    pub fn formatted_remaining(&self) -> String {
        format_countdown(self.remaining_seconds)
    }

    #[must_use]
    pub fn is_low_time(&self) -> bool {
        self.remaining_seconds < self.settings.low_time_warning_secs()
    }

    /// Elapsed time as counted by applied ticks.
    #[must_use]
    pub fn ticked_seconds(&self) -> u32 {
        self.duration_seconds - self.remaining_seconds
    }

    //
    // ─── ANSWERS ───────────────────────────────────────────────────────────────
    //

    /// Store an answer for a question.
    ///
    /// Outside `InProgress` the call is a no-op and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the question is unknown or the value does not fit
    /// the question; the previous answer is kept.
    pub fn set_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
    ) -> Result<(), AnswerError> {
        if !self.is_in_progress() {
            return Ok(());
        }
        self.find_question(question_id)?.check_answer(&value)?;
        self.answers.insert(question_id.clone(), value);
        Ok(())
    }

    /// Flip one option of a multi-choice question in or out of its set.
    ///
    /// Outside `InProgress` the call is a no-op and returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` for unknown questions, single-choice questions, or
    /// an out-of-range option.
    pub fn toggle_option(
        &mut self,
        question_id: &QuestionId,
        index: usize,
    ) -> Result<(), AnswerError> {
        if !self.is_in_progress() {
            return Ok(());
        }
        let question = self.find_question(question_id)?;
        if question.kind() != QuestionKind::MultiChoice {
            return Err(AnswerError::ShapeMismatch {
                kind: question.kind(),
                given: "toggle",
            });
        }
        question.check_answer(&AnswerValue::multi([index]))?;

        let entry = self
            .answers
            .entry(question_id.clone())
            .or_insert_with(|| AnswerValue::multi([]));
        match entry {
            AnswerValue::Multi(set) => {
                if !set.remove(&index) {
                    set.insert(index);
                }
            }
            other => *other = AnswerValue::multi([index]),
        }
        Ok(())
    }

    /// Reset a question to `Unanswered`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::UnknownQuestion` if the id is not part of the test.
    pub fn clear_answer(&mut self, question_id: &QuestionId) -> Result<(), AnswerError> {
        if !self.is_in_progress() {
            return Ok(());
        }
        self.find_question(question_id)?;
        self.answers.remove(question_id);
        Ok(())
    }

    fn find_question(&self, question_id: &QuestionId) -> Result<&Question, AnswerError> {
        self.questions
            .iter()
            .find(|q| q.id() == question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion(question_id.clone()))
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Move the cursor, clamped to the question range. Returns the new index.
    pub fn navigate_to(&mut self, index: usize) -> usize {
        self.current = index.min(self.questions.len() - 1);
        self.current
    }

    pub fn next(&mut self) -> usize {
        self.navigate_to(self.current.saturating_add(1))
    }

    pub fn previous(&mut self) -> usize {
        self.navigate_to(self.current.saturating_sub(1))
    }

    //
    // ─── SNAPSHOT ──────────────────────────────────────────────────────────────
    //

    /// Copy of every question's answer in question order.
    #[must_use]
    pub fn snapshot(&self) -> AnswerSnapshot {
        let entries = self
            .questions
            .iter()
            .map(|q| SnapshotEntry {
                question_id: q.id().clone(),
                value: self.answer(q.id()).clone(),
            })
            .collect();
        AnswerSnapshot::new(entries)
    }

    //
    // ─── TIMER & INTEGRITY INPUTS ──────────────────────────────────────────────
    //

    /// Apply a countdown value from the timer. Remaining time never increases.
    pub fn record_tick(&mut self, remaining_seconds: u32) -> u32 {
        if self.is_in_progress() {
            self.remaining_seconds = self.remaining_seconds.min(remaining_seconds);
        }
        self.remaining_seconds
    }

    /// Count one integrity violation.
    ///
    /// Returns the new count, or `None` when the session is no longer in
    /// progress or the threshold has already been reached.
    pub fn record_violation(&mut self) -> Option<u32> {
        if !self.is_in_progress() || self.threshold_reached() {
            return None;
        }
        self.violation_count += 1;
        Some(self.violation_count)
    }

    #[must_use]
    pub fn threshold_reached(&self) -> bool {
        self.violation_count >= self.settings.violation_threshold()
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    /// Enter `Submitting` if no other trigger got there first.
    ///
    /// From `InProgress` this records the trigger, freezes the snapshot and the
    /// elapsed time (clamped to the duration). From `Failed` it re-enters
    /// `Submitting` with the frozen ticket; `trigger` and `elapsed_seconds` are
    /// ignored so a retry resends exactly what was sent before.
    pub fn begin_submission(
        &mut self,
        trigger: SubmissionTrigger,
        elapsed_seconds: u32,
    ) -> BeginSubmission {
        match self.phase {
            ExamPhase::Loading => BeginSubmission::NotStarted,
            ExamPhase::Submitting => BeginSubmission::InFlight,
            ExamPhase::Submitted => match &self.result_id {
                Some(id) => BeginSubmission::AlreadySubmitted(id.clone()),
                None => BeginSubmission::InFlight,
            },
            ExamPhase::InProgress => {
                let ticket = SubmissionTicket {
                    attempt_id: self.attempt_id,
                    test_id: self.test_id.clone(),
                    trigger,
                    snapshot: self.snapshot(),
                    elapsed_seconds: elapsed_seconds.min(self.duration_seconds),
                    delivery: 1,
                };
                self.phase = ExamPhase::Submitting;
                self.trigger = Some(trigger);
                self.finished_at = Some(self.clock.now());
                self.ticket = Some(ticket.clone());
                BeginSubmission::Started(ticket)
            }
            ExamPhase::Failed => match self.ticket.as_mut() {
                Some(ticket) => {
                    ticket.delivery += 1;
                    self.phase = ExamPhase::Submitting;
                    BeginSubmission::Started(ticket.clone())
                }
                None => BeginSubmission::NotStarted,
            },
        }
    }

    /// Record the server's acceptance of the in-flight delivery.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` if no delivery is in flight.
    pub fn complete_submission(&mut self, result_id: ResultId) -> Result<(), PhaseError> {
        self.expect_phase(ExamPhase::Submitting)?;
        self.phase = ExamPhase::Submitted;
        self.result_id = Some(result_id);
        Ok(())
    }

    /// Record a failed delivery. The attempt stays over; only a retry can resend it.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` if no delivery is in flight.
    pub fn fail_submission(&mut self) -> Result<(), PhaseError> {
        self.expect_phase(ExamPhase::Submitting)?;
        self.phase = ExamPhase::Failed;
        Ok(())
    }

    fn expect_phase(&self, expected: ExamPhase) -> Result<(), PhaseError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PhaseError::Unexpected {
                expected,
                actual: self.phase,
            })
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("attempt_id", &self.attempt_id)
            .field("test_id", &self.test_id)
            .field("phase", &self.phase)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("answers_len", &self.answers.len())
            .field("violation_count", &self.violation_count)
            .field("trigger", &self.trigger)
            .field("result_id", &self.result_id)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
