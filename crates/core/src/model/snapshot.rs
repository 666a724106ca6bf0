use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionId;

/// One question's answer inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

/// Complete, order-matched answer set for submission.
///
/// Holds exactly one entry per question of the test, in question order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl AnswerSnapshot {
    pub(crate) fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_answered()).count()
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.entries
            .iter()
            .find(|e| &e.question_id == question_id)
            .map(|e| &e.value)
    }
}
