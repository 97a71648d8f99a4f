use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use intervue_core::model::{
    Answer, CreatedSession, Difficulty, Evaluation, Question, Report, SessionSetup, SessionSummary,
};
use intervue_core::service::{QuestionService, ReportService};
use intervue_core::{QuestionId, ServiceError, SessionId};
use intervue_settings::InterviewSettings;

/// Connection parameters for the REST backend.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Base URL including the `/api` prefix.
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub auth_token: Option<String>,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            auth_token: None,
        }
    }

    pub fn from_settings(settings: &InterviewSettings) -> Self {
        Self {
            base_url: settings.api.base_url.clone(),
            request_timeout: Duration::from_millis(settings.api.request_timeout_ms),
            connect_timeout: Duration::from_millis(settings.api.connect_timeout_ms),
            auth_token: settings.api.auth_token.clone(),
        }
    }
}

/// Shared JSON-over-HTTP plumbing.
#[derive(Clone)]
struct ApiClient {
    client: Client,
    config: Arc<HttpConfig>,
}

impl ApiClient {
    fn new(config: HttpConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let url = endpoint(&self.config.base_url, path);
        let mut req = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .json(body);
        if let Some(token) = &self.config.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.config.request_timeout)
            } else {
                ServiceError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), "request rejected");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited { retry_after },
                _ => ServiceError::from_status(status.as_u16(), error_message(&body)),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Prefer the backend's `message` field over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Unwrap `{ "success": true, "<key>": {...} }`, tolerating a bare object.
fn unwrap_field(mut body: Value, key: &str) -> Value {
    match body.get_mut(key) {
        Some(inner) => inner.take(),
        None => body,
    }
}

pub(crate) fn parse_created_session(body: Value) -> Result<CreatedSession, ServiceError> {
    serde_json::from_value(unwrap_field(body, "session"))
        .map_err(|e| ServiceError::Decode(format!("session: {e}")))
}

#[derive(Deserialize)]
struct WireQuestion {
    id: Value,
    #[serde(alias = "question")]
    text: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    difficulty: Option<Difficulty>,
}

pub(crate) fn parse_question(body: Value) -> Result<Question, ServiceError> {
    // A string `question` is the text of a bare question, not an envelope.
    let body = match body.get("question") {
        Some(Value::Object(_)) => unwrap_field(body, "question"),
        _ => body,
    };
    let wire: WireQuestion = serde_json::from_value(body)
        .map_err(|e| ServiceError::Decode(format!("question: {e}")))?;
    let id = match wire.id {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => return Err(ServiceError::Decode(format!("question id: {other}"))),
    };
    Ok(Question {
        id: QuestionId::from_raw(id),
        text: wire.text,
        topic: if wire.topic.is_empty() {
            "general".to_string()
        } else {
            wire.topic
        },
        difficulty: wire.difficulty.unwrap_or(Difficulty::Medium),
    })
}

pub(crate) fn parse_evaluation(body: Value) -> Evaluation {
    Evaluation(unwrap_field(body, "evaluation"))
}

/// Per-session context the stateless REST routes need echoed back.
#[derive(Default)]
struct SessionContext {
    setup: SessionSetup,
    questions: HashMap<QuestionId, String>,
}

/// [`QuestionService`] over the REST backend.
pub struct HttpQuestionService {
    api: ApiClient,
    sessions: Mutex<HashMap<SessionId, SessionContext>>,
}

impl HttpQuestionService {
    pub fn new(config: HttpConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            api: ApiClient::new(config)?,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn context_body(&self, session_id: &SessionId) -> Value {
        let sessions = self.sessions.lock();
        match sessions.get(session_id) {
            Some(ctx) => json!({
                "type": ctx.setup.interview_type,
                "role": ctx.setup.role,
                "techStack": ctx.setup.tech_stack,
                "experience": ctx.setup.experience,
            }),
            None => json!({}),
        }
    }
}

#[async_trait]
impl QuestionService for HttpQuestionService {
    #[instrument(skip_all)]
    async fn create_session(&self, setup: &SessionSetup) -> Result<CreatedSession, ServiceError> {
        let body = serde_json::to_value(setup).map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let created = parse_created_session(self.api.post("/interview/start", &body).await?)?;
        self.sessions.lock().insert(
            created.id.clone(),
            SessionContext {
                setup: setup.clone(),
                questions: HashMap::new(),
            },
        );
        Ok(created)
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn next_question(
        &self,
        session_id: &SessionId,
        previous_answers: &[Answer],
    ) -> Result<Question, ServiceError> {
        let mut body = self.context_body(session_id);
        body["sessionId"] = json!(session_id);
        body["previousAnswers"] = json!(previous_answers);

        let question = parse_question(self.api.post("/questions/generate", &body).await?)?;
        if let Some(ctx) = self.sessions.lock().get_mut(session_id) {
            ctx.questions.insert(question.id.clone(), question.text.clone());
        }
        Ok(question)
    }

    #[instrument(skip_all, fields(session_id = %session_id, question_id = %question_id))]
    async fn submit_answer(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        text: &str,
        time_spent_seconds: u32,
    ) -> Result<Evaluation, ServiceError> {
        let path = format!("/interview/{session_id}/answer");
        let _ = self
            .api
            .post(
                &path,
                &json!({
                    "questionId": question_id,
                    "answer": text,
                    "timeSpent": time_spent_seconds,
                }),
            )
            .await?;

        let question_text = self
            .sessions
            .lock()
            .get(session_id)
            .and_then(|ctx| ctx.questions.get(question_id).cloned())
            .unwrap_or_default();
        let context = self.context_body(session_id);
        let body = json!({
            "question": question_text,
            "answer": text,
            "context": context,
            "type": context.get("type").cloned().unwrap_or(Value::Null),
        });
        Ok(parse_evaluation(self.api.post("/evaluation/answer", &body).await?))
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn end_session(&self, session_id: &SessionId) -> Result<SessionSummary, ServiceError> {
        let path = format!("/interview/{session_id}/end");
        let summary = self.api.post(&path, &json!({})).await?;
        self.sessions.lock().remove(session_id);
        Ok(SessionSummary(summary))
    }
}

/// [`ReportService`] over the REST backend.
pub struct HttpReportService {
    api: ApiClient,
}

impl HttpReportService {
    pub fn new(config: HttpConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            api: ApiClient::new(config)?,
        })
    }
}

#[async_trait]
impl ReportService for HttpReportService {
    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn generate_report(&self, session_id: &SessionId) -> Result<Report, ServiceError> {
        let body = self
            .api
            .post("/reports/generate", &json!({ "sessionId": session_id }))
            .await?;
        Ok(Report::from_service(unwrap_field(body, "report")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_slashes() {
        assert_eq!(
            endpoint("http://localhost:3001/api/", "/interview/start"),
            "http://localhost:3001/api/interview/start"
        );
        assert_eq!(
            endpoint("http://localhost:3001/api", "reports/generate"),
            "http://localhost:3001/api/reports/generate"
        );
    }

    #[test]
    fn created_session_from_envelope() {
        let created = parse_created_session(json!({
            "success": true,
            "session": {"id": "abc-123", "status": "active", "currentQuestionIndex": 0}
        }))
        .unwrap();
        assert_eq!(created.id.as_str(), "abc-123");
        assert!(created.total_questions.is_none());
    }

    #[test]
    fn created_session_without_id_is_decode_error() {
        let err = parse_created_session(json!({"session": {"status": "active"}})).unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn question_from_generator_payload() {
        let q = parse_question(json!({
            "success": true,
            "question": {
                "id": "q_1700000000",
                "text": "Explain the event loop.",
                "topic": "JavaScript",
                "difficulty": "hard",
                "expectedPoints": [],
                "timeLimit": 180
            }
        }))
        .unwrap();
        assert_eq!(q.id.as_str(), "q_1700000000");
        assert_eq!(q.topic, "JavaScript");
        assert_eq!(q.difficulty, Difficulty::Hard);
    }

    #[test]
    fn question_defaults_for_sparse_payload() {
        let q = parse_question(json!({"id": 7, "question": "Tell me about yourself."})).unwrap();
        assert_eq!(q.id.as_str(), "7");
        assert_eq!(q.text, "Tell me about yourself.");
        assert_eq!(q.topic, "general");
        assert_eq!(q.difficulty, Difficulty::Medium);
    }

    #[test]
    fn bare_question_with_text_under_question_key() {
        let q = parse_question(json!({
            "id": "q_2",
            "question": "Describe a hash map.",
            "topic": "Data Structures",
            "difficulty": "easy"
        }))
        .unwrap();
        assert_eq!(q.id.as_str(), "q_2");
        assert_eq!(q.text, "Describe a hash map.");
        assert_eq!(q.topic, "Data Structures");
        assert_eq!(q.difficulty, Difficulty::Easy);
    }

    #[test]
    fn evaluation_unwraps_envelope() {
        let eval = parse_evaluation(json!({"success": true, "evaluation": {"score": 7}}));
        assert_eq!(eval.0["score"], 7);
        assert!(eval.is_available());
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"error":"Validation Error","message":"Interview type and role are required"}"#),
            "Interview type and role are required"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn config_from_settings() {
        let mut settings = InterviewSettings::default();
        settings.api.base_url = "https://api.test/api".into();
        settings.api.request_timeout_ms = 5_000;
        let config = HttpConfig::from_settings(&settings);
        assert_eq!(config.base_url, "https://api.test/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_backend_is_retryable() {
        let mut config = HttpConfig::new("http://127.0.0.1:9/api");
        config.connect_timeout = Duration::from_millis(200);
        config.request_timeout = Duration::from_millis(500);
        let service = HttpReportService::new(config).unwrap();
        let err = service
            .generate_report(&SessionId::from_raw("sess_x"))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
