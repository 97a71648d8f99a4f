//! Tracing subscriber setup for the interview engine.
//!
//! One global subscriber: an [`EnvFilter`] plus a human or JSON formatting
//! layer on stderr. `RUST_LOG` wins over configured
//! levels when set.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "intervue_realtime" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a level name such as `"debug"`; unknown names fall back to INFO.
    pub fn from_level_str(level: &str, json: bool) -> Self {
        Self {
            log_level: parse_level(level).unwrap_or(Level::INFO),
            json,
            ..Default::default()
        }
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: Level) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }

    /// The directive string handed to [`EnvFilter`].
    pub fn filter_string(&self) -> String {
        build_filter_string(self.log_level, &self.module_levels)
    }
}

/// Parse a level name, case-insensitively.
pub fn parse_level(s: &str) -> Option<Level> {
    Level::from_str(s.trim()).ok()
}

fn build_filter_string(level: Level, module_levels: &[(String, Level)]) -> String {
    let mut filter = level.to_string().to_lowercase();
    for (module, level) in module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Handle on the installed subscriber.
pub struct TelemetryGuard {
    filter: String,
}

impl TelemetryGuard {
    /// Effective filter directives, `RUST_LOG` when it was set.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Install the global subscriber. Call once at startup; a second call
/// keeps the existing subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let (env_filter, filter) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let directives = filter.to_string();
            (filter, directives)
        }
        Err(_) => {
            let directives = config.filter_string();
            (EnvFilter::new(&directives), directives)
        }
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_err()
    {
        eprintln!("intervue-telemetry: global subscriber already set, keeping it");
    }

    TelemetryGuard { filter }
}
