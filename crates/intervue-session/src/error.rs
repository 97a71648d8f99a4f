use intervue_core::model::SessionStatus;
use intervue_core::{CaptureError, QuestionId, ServiceError};

#[derive(Clone, Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    ConfigInvalid(String),

    #[error("capture permission denied: {0}")]
    CapturePermissionDenied(String),

    #[error("{operation} failed after retries: {source}")]
    TransientNetwork {
        operation: &'static str,
        source: ServiceError,
    },

    #[error("realtime channel gave up after {attempts} reconnect attempts")]
    ChannelExhausted { attempts: u32 },

    #[error("report generation failed: {0}")]
    ReportGenerationFailed(ServiceError),

    #[error("answer targets {submitted}, active question is {active}")]
    Validation {
        submitted: QuestionId,
        active: QuestionId,
    },

    #[error("{action} not allowed while {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("capture error: {0}")]
    Capture(CaptureError),

    #[error("session aborted")]
    Aborted,

    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl SessionError {
    /// Errors that end the session rather than a single action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid(_)
                | Self::CapturePermissionDenied(_)
                | Self::TransientNetwork { .. }
                | Self::Aborted
        )
    }

    /// Classify a service failure: retryable ones surface as
    /// `TransientNetwork`, the rest as `Service`.
    pub fn from_service(operation: &'static str, err: ServiceError) -> Self {
        if err.is_retryable() {
            Self::TransientNetwork {
                operation,
                source: err,
            }
        } else {
            Self::Service(err)
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(msg) => Self::CapturePermissionDenied(msg),
            other => Self::Capture(other),
        }
    }
}
