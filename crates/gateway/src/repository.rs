use async_trait::async_trait;
use exam_core::model::{
    AnswerSnapshot, AttemptId, ResultId, SubmissionTicket, TestDefinition, TestId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by catalog and submission adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("not found")]
    NotFound,

    #[error("request failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

/// One delivery of a finished attempt to the submission service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSubmission {
    /// Client-minted idempotency token; identical across retries.
    pub attempt_id: AttemptId,
    pub test_id: TestId,
    pub answers: AnswerSnapshot,
    pub time_spent_secs: u32,
}

impl AttemptSubmission {
    #[must_use]
    pub fn from_ticket(ticket: &SubmissionTicket) -> Self {
        Self {
            attempt_id: ticket.attempt_id,
            test_id: ticket.test_id.clone(),
            answers: ticket.snapshot.clone(),
            time_spent_secs: ticket.elapsed_seconds,
        }
    }
}

/// Server acknowledgement of a submitted attempt.
///
/// Scoring happens server-side; the optional figures are passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionAck {
    pub result_id: ResultId,
    pub score: Option<f64>,
    pub accuracy: Option<f64>,
    pub percentile: Option<f64>,
}

impl SubmissionAck {
    #[must_use]
    pub fn new(result_id: ResultId) -> Self {
        Self {
            result_id,
            score: None,
            accuracy: None,
            percentile: None,
        }
    }
}

/// Source of test definitions. Purchase checks happen behind this contract.
#[async_trait]
pub trait TestCatalog: Send + Sync {
    /// Fetch a test definition by ID.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the test does not exist, or other
    /// transport/decoding errors.
    async fn fetch_test(&self, id: &TestId) -> Result<TestDefinition, GatewayError>;
}

/// Receiver of finished attempts.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Deliver an attempt for grading.
    ///
    /// Implementations must treat a repeated `attempt_id` as the same attempt.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the service cannot accept the attempt.
    async fn submit_attempt(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionAck, GatewayError>;
}

/// Simple in-memory catalog and submission sink for testing and prototyping.
///
/// Records every delivery, deduplicates by attempt id, and can be told to fail
/// the next N deliveries.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    tests: Arc<Mutex<HashMap<TestId, TestDefinition>>>,
    deliveries: Arc<Mutex<Vec<AttemptSubmission>>>,
    accepted: Arc<Mutex<HashMap<AttemptId, ResultId>>>,
    failures_left: Arc<Mutex<u32>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test definition so `fetch_test` can return it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the internal lock is poisoned.
    pub fn insert_test(&self, test: TestDefinition) -> Result<(), GatewayError> {
        let mut guard = self.tests.lock().map_err(unavailable)?;
        guard.insert(test.id.clone(), test);
        Ok(())
    }

    /// Make the next `count` deliveries fail with `GatewayError::Unavailable`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the internal lock is poisoned.
    pub fn fail_next(&self, count: u32) -> Result<(), GatewayError> {
        let mut guard = self.failures_left.lock().map_err(unavailable)?;
        *guard = count;
        Ok(())
    }

    /// Every delivery received, including failed ones, in arrival order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<AttemptSubmission> {
        self.deliveries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of distinct attempts that were accepted.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

fn unavailable<E: std::fmt::Display>(e: E) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

#[async_trait]
impl TestCatalog for InMemoryGateway {
    async fn fetch_test(&self, id: &TestId) -> Result<TestDefinition, GatewayError> {
        let guard = self.tests.lock().map_err(unavailable)?;
        guard.get(id).cloned().ok_or(GatewayError::NotFound)
    }
}

#[async_trait]
impl SubmissionGateway for InMemoryGateway {
    async fn submit_attempt(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionAck, GatewayError> {
        self.deliveries
            .lock()
            .map_err(unavailable)?
            .push(submission.clone());

        {
            let mut failures = self.failures_left.lock().map_err(unavailable)?;
            if *failures > 0 {
                *failures -= 1;
                return Err(GatewayError::Unavailable("scripted failure".into()));
            }
        }

        let mut accepted = self.accepted.lock().map_err(unavailable)?;
        let next = accepted.len() + 1;
        let result_id = accepted
            .entry(submission.attempt_id)
            .or_insert_with(|| ResultId::new(format!("result-{next}")))
            .clone();
        Ok(SubmissionAck::new(result_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{Question, QuestionId, QuestionKind};

    fn build_test(id: &str) -> TestDefinition {
        TestDefinition {
            id: TestId::new(id),
            title: format!("Test {id}"),
            duration_minutes: 1,
            questions: vec![Question::new(
                QuestionId::new("q1"),
                "Q",
                vec!["A".into(), "B".into()],
                QuestionKind::SingleChoice,
            )],
            locked: false,
        }
    }

    fn build_submission() -> AttemptSubmission {
        AttemptSubmission {
            attempt_id: AttemptId::generate(),
            test_id: TestId::new("t1"),
            answers: AnswerSnapshot::default(),
            time_spent_secs: 12,
        }
    }

    #[tokio::test]
    async fn fetch_returns_registered_test() {
        let gateway = InMemoryGateway::new();
        gateway.insert_test(build_test("t1")).unwrap();

        let fetched = gateway.fetch_test(&TestId::new("t1")).await.unwrap();
        assert_eq!(fetched.title, "Test t1");

        let missing = gateway.fetch_test(&TestId::new("t2")).await.unwrap_err();
        assert!(matches!(missing, GatewayError::NotFound));
    }

    #[tokio::test]
    async fn repeated_attempt_id_returns_same_result() {
        let gateway = InMemoryGateway::new();
        let submission = build_submission();

        let first = gateway.submit_attempt(&submission).await.unwrap();
        let second = gateway.submit_attempt(&submission).await.unwrap();

        assert_eq!(first.result_id, second.result_id);
        assert_eq!(gateway.deliveries().len(), 2);
        assert_eq!(gateway.accepted_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(1).unwrap();
        let submission = build_submission();

        let err = gateway.submit_attempt(&submission).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.accepted_count(), 0);

        gateway.submit_attempt(&submission).await.unwrap();
        assert_eq!(gateway.accepted_count(), 1);
    }
}
