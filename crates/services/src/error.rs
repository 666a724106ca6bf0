//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{LoadError, PhaseError};
use gateway::GatewayError;

/// Errors emitted by `SubmissionCoordinator`.
///
/// The only error that reaches the presentation layer during an attempt; the
/// session is left in `Failed` and can be retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("session has not started")]
    NotStarted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Errors emitted by `ExamController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("test catalog request failed: {0}")]
    Catalog(#[source] GatewayError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error("command channel closed before the attempt was submitted")]
    Abandoned,
}
