//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files deserialize with production defaults for missing fields.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "api": { "baseUrl": "https://interview.example.com/api" },
///   "session": { "totalQuestions": 3 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterviewSettings {
    pub version: String,
    pub api: ApiSettings,
    pub session: SessionSettings,
    /// Retry policy for Question/Report service calls.
    pub retry: RetrySettings,
    pub channel: ChannelSettings,
    /// Fallbacks applied to `start` when the caller leaves fields unset.
    pub defaults: SetupDefaults,
    pub logging: LoggingSettings,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            api: ApiSettings::default(),
            session: SessionSettings::default(),
            retry: RetrySettings::default(),
            channel: ChannelSettings::default(),
            defaults: SetupDefaults::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl InterviewSettings {
    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<()> {
        if self.session.total_questions == 0 {
            return Err(SettingsError::invalid("session.totalQuestions", "must be at least 1"));
        }
        if self.session.per_question_budget_secs == 0 {
            return Err(SettingsError::invalid(
                "session.perQuestionBudgetSecs",
                "must be at least 1",
            ));
        }
        if self.session.presence_poll_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "session.presencePollIntervalMs",
                "must be at least 1",
            ));
        }
        if self.channel.reconnect_base_delay_ms == 0 {
            return Err(SettingsError::invalid(
                "channel.reconnectBaseDelayMs",
                "must be at least 1",
            ));
        }
        if self.channel.send_queue == 0 {
            return Err(SettingsError::invalid("channel.sendQueue", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::invalid("retry.maxAttempts", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::invalid(
                "retry.jitterFactor",
                format!("must be within 0..=1, got {}", self.retry.jitter_factor),
            ));
        }
        Ok(())
    }
}

/// Backend endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// REST base URL, e.g. `http://localhost:3001/api`.
    pub base_url: String,
    /// Realtime base URL; sessions connect to `{wsUrl}/interview/{id}`.
    pub ws_url: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Bearer token sent with REST calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            ws_url: "ws://localhost:3001".to_string(),
            request_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            auth_token: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub total_questions: u32,
    pub per_question_budget_secs: u32,
    pub presence_poll_interval_ms: u64,
    /// Pause before trying to re-enter immersive mode after losing it.
    pub immersive_reentry_delay_ms: u64,
    /// Read each question aloud when it is delivered.
    pub speak_questions: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            total_questions: 5,
            per_question_budget_secs: 180,
            presence_poll_interval_ms: 1_000,
            immersive_reentry_delay_ms: 500,
            speak_questions: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Total calls per operation, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    pub enabled: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub send_queue: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            send_queue: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupDefaults {
    pub interview_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub tech_stack: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    pub persona: String,
}

impl Default for SetupDefaults {
    fn default() -> Self {
        Self {
            interview_type: "technical".to_string(),
            role: None,
            tech_stack: Vec::new(),
            experience: None,
            persona: "balanced".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
