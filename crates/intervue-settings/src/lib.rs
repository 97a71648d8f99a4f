//! # intervue-settings
//!
//! Layered configuration for the interview session engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`InterviewSettings::default()`]
//! 2. **User file**: `~/.intervue/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `INTERVUE_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = intervue_settings::load_settings()?;
//! println!("questions per session: {}", settings.session.total_questions);
//! # Ok::<(), intervue_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
