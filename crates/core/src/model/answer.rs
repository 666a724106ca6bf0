use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::QuestionKind;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A rejected answer write. The session keeps its previous answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("option {index} is out of range ({options} options)")]
    OptionOutOfRange { index: usize, options: usize },

    #[error("{kind} question cannot take a {given} answer")]
    ShapeMismatch {
        kind: QuestionKind,
        given: &'static str,
    },
}

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// The chosen value for one question.
///
/// `Unanswered` is an explicit absence and is distinct from option index 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnswerValue {
    #[default]
    Unanswered,
    Single(usize),
    /// Unordered set of option indices for multi-choice questions.
    Multi(BTreeSet<usize>),
}

impl AnswerValue {
    /// Builds a multi-choice answer from any collection of indices.
    #[must_use]
    pub fn multi(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::Multi(indices.into_iter().collect())
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        !matches!(self, Self::Unanswered)
    }

    /// Short name of the answer shape, used in error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Unanswered => "unanswered",
            Self::Single(_) => "single-index",
            Self::Multi(_) => "index-set",
        }
    }

    /// Checks this value against the question type and option count.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::ShapeMismatch` if the shape does not match `kind`,
    /// or `AnswerError::OptionOutOfRange` for an index outside `0..options`.
    pub fn validate(&self, kind: QuestionKind, options: usize) -> Result<(), AnswerError> {
        match (kind, self) {
            (_, Self::Unanswered) => Ok(()),
            (QuestionKind::SingleChoice, Self::Single(index)) => check_index(*index, options),
            (QuestionKind::MultiChoice, Self::Multi(set)) => {
                set.iter().try_for_each(|index| check_index(*index, options))
            }
            (kind, other) => Err(AnswerError::ShapeMismatch {
                kind,
                given: other.shape(),
            }),
        }
    }
}

fn check_index(index: usize, options: usize) -> Result<(), AnswerError> {
    if index < options {
        Ok(())
    } else {
        Err(AnswerError::OptionOutOfRange { index, options })
    }
}
