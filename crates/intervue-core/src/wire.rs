use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::QuestionId;
use crate::model::Violation;

pub const ANSWER: &str = "answer";
pub const PROCTORING: &str = "proctoring";
pub const NEXT_QUESTION: &str = "next_question";

/// Types the backend sends back over the realtime channel.
pub const CONNECTED: &str = "connected";
pub const EVALUATION: &str = "evaluation";
pub const ANSWER_RECEIVED: &str = "answer_received";
pub const PROCTORING_ACK: &str = "proctoring_ack";
pub const ERROR: &str = "error";

/// Locally generated frame delivered when reconnection gives up.
pub const CHANNEL_EXHAUSTED: &str = "channel_exhausted";

/// Realtime wire frame: `{ "type": ..., "payload": ... }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The frame as a JSON value, as handed to wildcard subscribers.
    pub fn to_value(&self) -> Value {
        json!({ "type": self.kind, "payload": self.payload })
    }

    pub fn answer(question_id: &QuestionId, answer: &str) -> Self {
        Self::new(
            ANSWER,
            json!({
                "questionId": question_id,
                "answer": answer,
                "timestamp": Utc::now().timestamp_millis(),
            }),
        )
    }

    pub fn proctoring(violation: &Violation) -> Self {
        Self::new(
            PROCTORING,
            json!({
                "type": violation.kind.as_str(),
                "message": violation.message,
                "timestamp": violation.timestamp.timestamp_millis(),
            }),
        )
    }

    pub fn next_question() -> Self {
        Self::new(
            NEXT_QUESTION,
            json!({ "timestamp": Utc::now().timestamp_millis() }),
        )
    }

    /// Question id carried by `evaluation` / `answer_received` frames.
    pub fn question_id(&self) -> Option<QuestionId> {
        self.payload
            .get("questionId")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(QuestionId::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ViolationKind;

    #[test]
    fn parses_frame_with_payload() {
        let env = Envelope::parse(r#"{"type":"evaluation","payload":{"questionId":"q1","feedback":"ok"}}"#)
            .unwrap();
        assert_eq!(env.kind, EVALUATION);
        assert_eq!(env.question_id(), Some(QuestionId::from_raw("q1")));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let env = Envelope::parse(r#"{"type":"ping"}"#).unwrap();
        assert!(env.payload.is_null());
    }

    #[test]
    fn rejects_frame_without_type() {
        assert!(Envelope::parse(r#"{"payload":{}}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn numeric_question_ids_are_accepted() {
        let env = Envelope::new(EVALUATION, json!({"questionId": 3}));
        assert_eq!(env.question_id(), Some(QuestionId::from_raw("3")));
    }

    #[test]
    fn answer_frame_shape() {
        let env = Envelope::answer(&QuestionId::from_raw("q7"), "closures capture scope");
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["payload"]["questionId"], "q7");
        assert_eq!(json["payload"]["answer"], "closures capture scope");
        assert!(json["payload"]["timestamp"].is_i64());
    }

    #[test]
    fn proctoring_frame_uses_violation_kind() {
        let env = Envelope::proctoring(&Violation::new(ViolationKind::FocusLost));
        assert_eq!(env.kind, PROCTORING);
        assert_eq!(env.payload["type"], "focus_lost");
        assert_eq!(env.payload["message"], "Tab switch detected");
    }

    #[test]
    fn full_frame_value_for_wildcards() {
        let env = Envelope::next_question();
        let value = env.to_value();
        assert_eq!(value["type"], NEXT_QUESTION);
        assert!(value["payload"]["timestamp"].is_i64());
    }
}
