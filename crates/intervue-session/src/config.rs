use std::time::Duration;

use intervue_core::model::SessionSetup;
use intervue_core::BackoffPolicy;
use intervue_settings::InterviewSettings;

use crate::error::SessionError;
use crate::integrity::IntegrityConfig;

/// Everything a [`SessionController`](crate::SessionController) needs besides
/// its collaborators.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub total_questions: u32,
    pub per_question_budget_secs: u32,
    /// Filled into `start` setups that leave fields blank.
    pub defaults: SessionSetup,
    /// Shared by every Question/Report service call.
    pub retry: BackoffPolicy,
    pub integrity: IntegrityConfig,
    pub speak_questions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_questions: 5,
            per_question_budget_secs: 180,
            defaults: SessionSetup {
                interview_type: Some("technical".into()),
                persona: Some("balanced".into()),
                ..Default::default()
            },
            retry: BackoffPolicy::new(3, Duration::from_secs(1)),
            integrity: IntegrityConfig::default(),
            speak_questions: true,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &InterviewSettings) -> Self {
        let d = &settings.defaults;
        Self {
            total_questions: settings.session.total_questions,
            per_question_budget_secs: settings.session.per_question_budget_secs,
            defaults: SessionSetup {
                interview_type: Some(d.interview_type.clone()),
                role: d.role.clone(),
                tech_stack: d.tech_stack.clone(),
                experience: d.experience.clone(),
                persona: Some(d.persona.clone()),
                cv_data: None,
                project_data: None,
            },
            retry: BackoffPolicy::new(
                settings.retry.max_attempts,
                Duration::from_millis(settings.retry.base_delay_ms),
            )
            .with_max_delay(Duration::from_millis(settings.retry.max_delay_ms))
            .with_jitter(settings.retry.jitter_factor),
            integrity: IntegrityConfig {
                poll_interval: Duration::from_millis(settings.session.presence_poll_interval_ms),
                reentry_delay: Duration::from_millis(settings.session.immersive_reentry_delay_ms),
            },
            speak_questions: settings.session.speak_questions,
        }
    }

    /// Apply defaults to `setup` and reject it if role or tech stack are
    /// still missing, or the session shape is unusable.
    pub fn resolve_setup(&self, setup: SessionSetup) -> Result<SessionSetup, SessionError> {
        if self.total_questions == 0 {
            return Err(SessionError::ConfigInvalid("total questions must be at least 1".into()));
        }
        if self.per_question_budget_secs == 0 {
            return Err(SessionError::ConfigInvalid(
                "per-question budget must be at least 1 second".into(),
            ));
        }

        if self.integrity.poll_interval.is_zero() {
            return Err(SessionError::ConfigInvalid(
                "presence poll interval must be non-zero".into(),
            ));
        }

        let setup = setup.with_fallbacks(&self.defaults);
        if setup.role.is_none() {
            return Err(SessionError::ConfigInvalid("role is required".into()));
        }
        if setup.tech_stack.is_empty() {
            return Err(SessionError::ConfigInvalid("tech stack is required".into()));
        }
        Ok(setup)
    }
}
