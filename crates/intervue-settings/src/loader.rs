//! Layered settings: compiled defaults, then `~/.intervue/settings.json`,
//! then `INTERVUE_*` variables.
//!
//! The file is merged key by key over the defaults, so a user file only needs
//! the values it changes. Arrays replace wholesale and `null` leaves the
//! default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::InterviewSettings;

/// `~/.intervue/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".intervue").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<InterviewSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// [`InterviewSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<InterviewSettings> {
    let defaults = serde_json::to_value(InterviewSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: InterviewSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `overlay` into `base`. Objects merge per key; anything else in
/// `overlay` wins unless it is `null`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `INTERVUE_*` environment overrides to loaded settings.
///
/// Out-of-range or unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut InterviewSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Override application against an arbitrary variable source.
pub fn apply_overrides_from<F>(settings: &mut InterviewSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Endpoints ───────────────────────────────────────────────────
    if let Some(v) = env.string("INTERVUE_API_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = env.string("INTERVUE_WS_URL") {
        settings.api.ws_url = v;
    }
    if let Some(v) = env.string("INTERVUE_AUTH_TOKEN") {
        settings.api.auth_token = Some(v);
    }
    if let Some(v) = env.u64("INTERVUE_REQUEST_TIMEOUT_MS", 1_000, 600_000) {
        settings.api.request_timeout_ms = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.u64("INTERVUE_TOTAL_QUESTIONS", 1, 50) {
        settings.session.total_questions = v as u32;
    }
    if let Some(v) = env.u64("INTERVUE_QUESTION_BUDGET_SECS", 10, 3_600) {
        settings.session.per_question_budget_secs = v as u32;
    }
    if let Some(v) = env.bool("INTERVUE_SPEAK_QUESTIONS") {
        settings.session.speak_questions = v;
    }

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = env.u64("INTERVUE_MAX_RECONNECTS", 0, 20) {
        settings.channel.max_reconnect_attempts = v as u32;
    }
    if let Some(v) = env.bool("INTERVUE_CHANNEL_ENABLED") {
        settings.channel.enabled = v;
    }

    // ── Defaults ────────────────────────────────────────────────────
    if let Some(v) = env.string("INTERVUE_DEFAULT_ROLE") {
        settings.defaults.role = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("INTERVUE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("INTERVUE_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Parse a boolean string: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer and accept it only inside `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim().parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn apply(pairs: &[(&str, &str)]) -> InterviewSettings {
        let map = vars(pairs);
        let mut settings = InterviewSettings::default();
        apply_overrides_from(&mut settings, |name| map.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_objects() {
        let target = serde_json::json!({"session": {"totalQuestions": 5, "perQuestionBudgetSecs": 180}});
        let source = serde_json::json!({"session": {"totalQuestions": 3}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["session"]["totalQuestions"], 3);
        assert_eq!(merged["session"]["perQuestionBudgetSecs"], 180);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"techStack": ["rust", "go"]});
        let source = serde_json::json!({"techStack": ["react"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["techStack"], serde_json::json!(["react"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── parsing helpers ─────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_u64_range("5", 1, 50), Some(5));
        assert_eq!(parse_u64_range(" 50 ", 1, 50), Some(50));
        assert_eq!(parse_u64_range("0", 1, 50), None);
        assert_eq!(parse_u64_range("51", 1, 50), None);
        assert_eq!(parse_u64_range("-1", 1, 50), None);
        assert_eq!(parse_u64_range("five", 1, 50), None);
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_to_each_section() {
        let s = apply(&[
            ("INTERVUE_API_URL", "https://api.test/api"),
            ("INTERVUE_WS_URL", "wss://api.test"),
            ("INTERVUE_TOTAL_QUESTIONS", "3"),
            ("INTERVUE_QUESTION_BUDGET_SECS", "60"),
            ("INTERVUE_MAX_RECONNECTS", "0"),
            ("INTERVUE_DEFAULT_ROLE", "Backend Engineer"),
            ("INTERVUE_LOG_LEVEL", "debug"),
            ("INTERVUE_LOG_JSON", "yes"),
        ]);
        assert_eq!(s.api.base_url, "https://api.test/api");
        assert_eq!(s.api.ws_url, "wss://api.test");
        assert_eq!(s.session.total_questions, 3);
        assert_eq!(s.session.per_question_budget_secs, 60);
        assert_eq!(s.channel.max_reconnect_attempts, 0);
        assert_eq!(s.defaults.role.as_deref(), Some("Backend Engineer"));
        assert_eq!(s.logging.level, "debug");
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let s = apply(&[
            ("INTERVUE_TOTAL_QUESTIONS", "500"),
            ("INTERVUE_QUESTION_BUDGET_SECS", "abc"),
            ("INTERVUE_LOG_JSON", "sometimes"),
            ("INTERVUE_API_URL", ""),
        ]);
        let defaults = InterviewSettings::default();
        assert_eq!(s.session.total_questions, defaults.session.total_questions);
        assert_eq!(
            s.session.per_question_budget_secs,
            defaults.session.per_question_budget_secs
        );
        assert!(!s.logging.json);
        assert_eq!(s.api.base_url, defaults.api.base_url);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/intervue/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = InterviewSettings::default();
        assert_eq!(settings.version, defaults.version);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"retry": {"maxAttempts": 4}, "defaults": {"techStack": ["rust"]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.base_delay_ms, 1_000);
        assert_eq!(settings.defaults.tech_stack, vec!["rust".to_string()]);
        assert_eq!(settings.defaults.persona, "balanced");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_rejects_zero_presence_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"presencePollIntervalMs": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result,
            Err(SettingsError::InvalidValue { field: "session.presencePollIntervalMs", .. })
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"retry": {"maxAttempts": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::InvalidValue { field: "retry.maxAttempts", .. })));
    }
}
