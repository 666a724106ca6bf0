use thiserror::Error;

use crate::model::{AnswerError, LoadError, PhaseError, SettingsError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
