//! Interview session engine.
//!
//! [`SessionController`] owns the lifecycle of one interview and consumes a
//! single event queue fed by the [`QuestionFlowScheduler`] countdown, the
//! [`MediaCaptureManager`] transcript, the [`IntegrityMonitor`] and the
//! realtime channel. Clients drive it through a [`SessionHandle`].

mod capture;
mod config;
mod controller;
mod error;
mod event;
mod fallback;
mod integrity;
mod scheduler;

pub mod fakes;

pub use capture::{CaptureHandle, MediaCaptureManager, TranscriptBuffer};
pub use config::SessionConfig;
pub use controller::{SessionController, SessionDeps, SessionHandle, SessionOutcome, SessionSnapshot};
pub use error::SessionError;
pub use event::{SessionCommand, SessionEvent, TimerEvent};
pub use fallback::fallback_question;
pub use integrity::{IntegrityConfig, IntegrityMonitor};
pub use scheduler::QuestionFlowScheduler;
