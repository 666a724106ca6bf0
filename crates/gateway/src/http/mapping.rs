use exam_core::model::{
    AnswerValue, Question, QuestionId, QuestionKind, ResultId, TestDefinition, TestId,
};
use serde::{Deserialize, Serialize};

use crate::repository::{AttemptSubmission, GatewayError, SubmissionAck};

fn decode<E: core::fmt::Display>(e: E) -> GatewayError {
    GatewayError::Decode(e.to_string())
}

//
// ─── LOAD ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestPayload {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(alias = "duration")]
    duration_minutes: i64,
    #[serde(default)]
    questions: Vec<QuestionPayload>,
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionPayload {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    question_type: Option<String>,
}

pub(crate) fn parse_question_kind(tag: Option<&str>) -> Result<QuestionKind, GatewayError> {
    match tag.map(str::trim) {
        None | Some("") | Some("MCQ") => Ok(QuestionKind::SingleChoice),
        Some("MSQ") => Ok(QuestionKind::MultiChoice),
        Some(other) => Err(GatewayError::Decode(format!("invalid question type: {other}"))),
    }
}

pub(crate) fn map_test(payload: TestPayload) -> Result<TestDefinition, GatewayError> {
    let questions = payload
        .questions
        .into_iter()
        .map(|q| {
            let kind = parse_question_kind(q.question_type.as_deref())?;
            Ok(Question::new(QuestionId::new(q.id), q.text, q.options, kind))
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    Ok(TestDefinition {
        id: TestId::new(payload.id),
        title: payload.title,
        duration_minutes: payload.duration_minutes,
        questions,
        locked: payload.locked,
    })
}

pub(crate) fn parse_test(body: &str) -> Result<TestDefinition, GatewayError> {
    let payload: TestPayload = serde_json::from_str(body).map_err(decode)?;
    map_test(payload)
}

//
// ─── SUBMIT ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Chosen {
    Single(usize),
    Multi(Vec<usize>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnswerPayload {
    q_id: String,
    chosen: Option<Chosen>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitBody {
    answers: Vec<AnswerPayload>,
    time_spent: u32,
    client_attempt_id: String,
}

pub(crate) fn chosen(value: &AnswerValue) -> Option<Chosen> {
    match value {
        AnswerValue::Unanswered => None,
        AnswerValue::Single(index) => Some(Chosen::Single(*index)),
        AnswerValue::Multi(set) => Some(Chosen::Multi(set.iter().copied().collect())),
    }
}

pub(crate) fn submit_body(submission: &AttemptSubmission) -> SubmitBody {
    SubmitBody {
        answers: submission
            .answers
            .entries()
            .iter()
            .map(|entry| AnswerPayload {
                q_id: entry.question_id.as_str().to_owned(),
                chosen: chosen(&entry.value),
            })
            .collect(),
        time_spent: submission.time_spent_secs,
        client_attempt_id: submission.attempt_id.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    attempt_id: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    percentile: Option<f64>,
}

pub(crate) fn parse_ack(body: &str) -> Result<SubmissionAck, GatewayError> {
    let response: SubmitResponse = serde_json::from_str(body).map_err(decode)?;
    if response.attempt_id.trim().is_empty() {
        return Err(GatewayError::Decode("empty attemptId".into()));
    }
    Ok(SubmissionAck {
        result_id: ResultId::new(response.attempt_id),
        score: response.score,
        accuracy: response.accuracy,
        percentile: response.percentile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{BeginSubmission, ExamSession, ExamSettings, SubmissionTrigger};
    use exam_core::time::fixed_clock;
    use serde_json::json;

    #[test]
    fn parses_catalog_payload_with_legacy_duration_field() {
        let body = json!({
            "id": "t1",
            "title": "GATE CS Mock 1",
            "duration": 180,
            "subject": "CS",
            "questions": [
                { "id": "q1", "text": "2+2?", "options": ["3", "4"], "questionType": "MCQ" },
                { "id": "q2", "text": "Primes?", "options": ["2", "4", "5"], "questionType": "MSQ" },
                { "id": "q3", "text": "Untyped", "options": ["x"] }
            ],
            "locked": false
        })
        .to_string();

        let test = parse_test(&body).unwrap();
        assert_eq!(test.duration_minutes, 180);
        assert_eq!(test.questions.len(), 3);
        assert_eq!(test.questions[0].kind(), QuestionKind::SingleChoice);
        assert_eq!(test.questions[1].kind(), QuestionKind::MultiChoice);
        assert_eq!(test.questions[2].kind(), QuestionKind::SingleChoice);
    }

    #[test]
    fn parses_duration_minutes_field() {
        let body = json!({ "id": "t1", "title": "T", "durationMinutes": 1, "questions": [] })
            .to_string();
        let test = parse_test(&body).unwrap();
        assert_eq!(test.duration_minutes, 1);
        assert!(test.questions.is_empty());
    }

    #[test]
    fn locked_payload_keeps_lock_flag() {
        let body = json!({ "id": "t1", "title": "T", "duration": 60, "questions": [], "locked": true })
            .to_string();
        assert!(parse_test(&body).unwrap().locked);
    }

    #[test]
    fn unknown_question_type_is_a_decode_error() {
        let err = parse_question_kind(Some("ESSAY")).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn missing_duration_is_a_decode_error() {
        let err = parse_test(r#"{"id":"t1","questions":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn submit_body_uses_null_int_and_array() {
        let test = parse_test(
            &json!({
                "id": "t1",
                "title": "T",
                "duration": 1,
                "questions": [
                    { "id": "q1", "text": "a", "options": ["0", "1", "2"] },
                    { "id": "q2", "text": "b", "options": ["0", "1", "2"], "questionType": "MSQ" },
                    { "id": "q3", "text": "c", "options": ["0", "1", "2"] }
                ]
            })
            .to_string(),
        )
        .unwrap();
        let mut session =
            ExamSession::initialize(test, ExamSettings::default(), fixed_clock()).unwrap();
        session
            .set_answer(&QuestionId::new("q1"), AnswerValue::Single(2))
            .unwrap();
        session
            .set_answer(&QuestionId::new("q2"), AnswerValue::multi([2, 0]))
            .unwrap();
        let BeginSubmission::Started(ticket) =
            session.begin_submission(SubmissionTrigger::Manual, 42)
        else {
            panic!("expected a started submission");
        };

        let body = serde_json::to_value(submit_body(&AttemptSubmission::from_ticket(&ticket)))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "answers": [
                    { "qId": "q1", "chosen": 2 },
                    { "qId": "q2", "chosen": [0, 2] },
                    { "qId": "q3", "chosen": null }
                ],
                "timeSpent": 42,
                "clientAttemptId": session.attempt_id().to_string()
            })
        );
    }

    #[test]
    fn ack_passes_scores_through() {
        let ack = parse_ack(r#"{"attemptId":"a-1","score":12.5,"percentile":80.0}"#).unwrap();
        assert_eq!(ack.result_id, ResultId::new("a-1"));
        assert_eq!(ack.score, Some(12.5));
        assert_eq!(ack.accuracy, None);
        assert_eq!(ack.percentile, Some(80.0));
    }

    #[test]
    fn ack_without_id_is_rejected() {
        assert!(parse_ack(r#"{"score":1.0}"#).is_err());
        assert!(parse_ack(r#"{"attemptId":"  "}"#).is_err());
    }
}
