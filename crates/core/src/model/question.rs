use std::fmt;

use crate::model::answer::{AnswerError, AnswerValue};
use crate::model::ids::QuestionId;

/// Whether a question accepts one option or any subset of options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuestionKind {
    #[default]
    SingleChoice,
    MultiChoice,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => f.write_str("single-choice"),
            QuestionKind::MultiChoice => f.write_str("multi-choice"),
        }
    }
}

/// One question of a loaded test. Immutable for the lifetime of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    kind: QuestionKind,
}

impl Question {
    #[must_use]
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        kind: QuestionKind,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            options,
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    /// Validates an answer against this question's type and options.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the value has the wrong shape or an index is out of range.
    pub fn check_answer(&self, value: &AnswerValue) -> Result<(), AnswerError> {
        value.validate(self.kind, self.options.len())
    }
}
