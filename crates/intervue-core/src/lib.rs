pub mod backoff;
pub mod errors;
pub mod ids;
pub mod media;
pub mod model;
pub mod proctor;
pub mod service;
pub mod wire;

pub use backoff::BackoffPolicy;
pub use errors::{CaptureError, ServiceError};
pub use ids::{QuestionId, SessionId, StreamId};
