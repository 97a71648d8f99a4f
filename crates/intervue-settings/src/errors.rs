use thiserror::Error;

/// Failures while loading `settings.json`.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but no session could run with it.
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_names_the_field() {
        let err = SettingsError::invalid("session.totalQuestions", "must be at least 1");
        assert_eq!(err.to_string(), "session.totalQuestions: must be at least 1");
    }

    #[test]
    fn json_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(err.to_string().starts_with("settings file is not valid JSON"));
    }
}
