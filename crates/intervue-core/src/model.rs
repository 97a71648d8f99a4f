use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::{QuestionId, SessionId};

/// Sentinel recorded when a question's budget runs out with nothing buffered.
pub const NO_ANSWER_SENTINEL: &str = "No answer provided";

/// Lifecycle states of an interview session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Initializing,
    AwaitingQuestion,
    Answering,
    Submitting,
    Finalizing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::AwaitingQuestion => "awaiting_question",
            Self::Answering => "answering",
            Self::Submitting => "submitting",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running interview as seen by the controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub question_index: u32,
    pub total_questions: u32,
    pub per_question_budget_secs: u32,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Whether the question at `question_index` is the final one.
    pub fn is_last_question(&self) -> bool {
        self.question_index + 1 >= self.total_questions
    }
}

/// Candidate-supplied parameters for `createSession`.
///
/// Every field is optional here; unset fields fall back to configured
/// defaults before the session is validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub interview_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tech_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_data: Option<Value>,
}

impl SessionSetup {
    /// Fill unset or blank fields from `defaults`.
    pub fn with_fallbacks(mut self, defaults: &SessionSetup) -> Self {
        fn pick(value: Option<String>, fallback: &Option<String>) -> Option<String> {
            value
                .filter(|v| !v.trim().is_empty())
                .or_else(|| fallback.clone().filter(|v| !v.trim().is_empty()))
        }

        self.interview_type = pick(self.interview_type, &defaults.interview_type);
        self.role = pick(self.role, &defaults.role);
        self.experience = pick(self.experience, &defaults.experience);
        self.persona = pick(self.persona, &defaults.persona);
        self.tech_stack.retain(|t| !t.trim().is_empty());
        if self.tech_stack.is_empty() {
            self.tech_stack = defaults.tech_stack.clone();
        }
        if self.cv_data.is_none() {
            self.cv_data = defaults.cv_data.clone();
        }
        if self.project_data.is_none() {
            self.project_data = defaults.project_data.clone();
        }
        self
    }
}

/// What the Question Service returns from `createSession`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub id: SessionId,
    #[serde(default)]
    pub total_questions: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "Easy")]
    Easy,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "Hard", alias = "high", alias = "High")]
    Hard,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub topic: String,
    pub difficulty: Difficulty,
}

/// Opaque evaluation supplied by the Question Service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Evaluation(pub Value);

impl Evaluation {
    /// Placeholder recorded when the evaluation could not be obtained.
    pub fn unavailable() -> Self {
        Self(json!({ "status": "unavailable" }))
    }

    pub fn is_available(&self) -> bool {
        self.0.get("status").and_then(Value::as_str) != Some("unavailable")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: QuestionId,
    pub text: String,
    pub time_spent_seconds: u32,
    pub evaluation: Evaluation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PresenceLost,
    FocusLost,
    ImmersiveModeExited,
    CaptureDenied,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PresenceLost => "presence_lost",
            Self::FocusLost => "focus_lost",
            Self::ImmersiveModeExited => "immersive_mode_exited",
            Self::CaptureDenied => "capture_denied",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::PresenceLost => "Face not visible in camera",
            Self::FocusLost => "Tab switch detected",
            Self::ImmersiveModeExited => "Fullscreen exited",
            Self::CaptureDenied => "Camera or microphone access denied",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    pub fn new(kind: ViolationKind) -> Self {
        Self::with_message(kind, kind.default_message())
    }

    pub fn with_message(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only record of integrity violations.
#[derive(Clone, Debug, Default)]
pub struct ViolationLog {
    entries: Vec<Violation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.entries.push(violation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[Violation] {
        &self.entries
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.entries.iter().filter(|v| v.kind == kind).count()
    }

    pub fn report(&self) -> IntegrityReport {
        IntegrityReport {
            total: self.len(),
            presence_lost: self.count_of(ViolationKind::PresenceLost),
            focus_lost: self.count_of(ViolationKind::FocusLost),
            immersive_mode_exited: self.count_of(ViolationKind::ImmersiveModeExited),
            capture_denied: self.count_of(ViolationKind::CaptureDenied),
            status: if self.is_empty() {
                IntegrityStatus::Clean
            } else {
                IntegrityStatus::Flagged
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Clean,
    Flagged,
}

/// Per-kind violation counts handed to the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    #[serde(rename = "violations")]
    pub total: usize,
    pub presence_lost: usize,
    pub focus_lost: usize,
    pub immersive_mode_exited: usize,
    pub capture_denied: usize,
    pub status: IntegrityStatus,
}

/// Opaque summary returned by `endSession`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionSummary(pub Value);

/// Report produced by the Report Service, or synthesized locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub body: Value,
    #[serde(default)]
    pub fallback: bool,
}

impl Report {
    pub fn from_service(body: Value) -> Self {
        Self {
            body,
            fallback: false,
        }
    }

    /// Minimal stand-in used when the Report Service cannot deliver.
    pub fn fallback(session: &Session, answers: &[Answer], integrity: &IntegrityReport) -> Self {
        let body = json!({
            "id": format!("report_{}", session.id),
            "sessionId": session.id,
            "questionsAnswered": answers.len(),
            "totalQuestions": session.total_questions,
            "overallScore": null,
            "answers": answers,
            "proctoring": integrity,
            "interviewDate": session.started_at,
            "generatedAt": Utc::now(),
            "status": "pending",
        });
        Self {
            body,
            fallback: true,
        }
    }
}
