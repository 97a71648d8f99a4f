use std::time::Duration;

/// Failures of the Question and Report services.
/// Classifies errors as retryable (transient network class) or fatal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ServiceError {
    // Fatal
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    Decode(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            404 => Self::NotFound(body),
            400 | 422 => Self::InvalidRequest(body),
            408 => Self::Timeout(Duration::ZERO),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

/// Failures reported by the media subsystem.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("recording failed: {0}")]
    Recording(String),
    #[error("speech unavailable: {0}")]
    Speech(String),
}

impl CaptureError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::RateLimited { retry_after: None }.is_retryable());
        assert!(ServiceError::ServerError { status: 503, body: "busy".into() }.is_retryable());
        assert!(ServiceError::Network("reset".into()).is_retryable());
        assert!(ServiceError::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(!ServiceError::Unauthorized("no token".into()).is_retryable());
        assert!(!ServiceError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ServiceError::NotFound("session".into()).is_retryable());
        assert!(!ServiceError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            ServiceError::from_status(401, String::new()),
            ServiceError::Unauthorized(_)
        ));
        assert!(matches!(
            ServiceError::from_status(404, String::new()),
            ServiceError::NotFound(_)
        ));
        assert!(ServiceError::from_status(429, String::new()).is_retryable());
        assert!(ServiceError::from_status(502, "bad gateway".into()).is_retryable());
        assert!(!ServiceError::from_status(418, "teapot".into()).is_retryable());
    }

    #[test]
    fn suggested_delay_only_for_rate_limit() {
        let rl = ServiceError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(rl.suggested_delay(), Some(Duration::from_secs(3)));
        assert_eq!(ServiceError::Network("x".into()).suggested_delay(), None);
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ServiceError::Network("x".into()).error_kind(), "network_error");
        assert_eq!(
            ServiceError::ServerError { status: 500, body: String::new() }.error_kind(),
            "server_error"
        );
    }

    #[test]
    fn capture_permission_classification() {
        assert!(CaptureError::PermissionDenied("camera".into()).is_permission_denied());
        assert!(!CaptureError::DeviceUnavailable("none".into()).is_permission_denied());
    }
}
