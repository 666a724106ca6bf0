mod answer;
mod ids;
mod question;
mod session;
mod settings;
mod snapshot;

pub use ids::{AttemptId, ParseIdError, QuestionId, ResultId, TestId};

pub use answer::{AnswerError, AnswerValue};
pub use question::{Question, QuestionKind};
pub use session::{
    BeginSubmission, ExamPhase, ExamSession, PhaseError, QuestionStatus, SubmissionTicket,
    SubmissionTrigger,
};
pub use settings::{ExamSettings, SettingsError};
pub use snapshot::{AnswerSnapshot, SnapshotEntry};
pub use test::{LoadError, TestDefinition};
