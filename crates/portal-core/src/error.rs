use reqwest::StatusCode;
use thiserror::Error;

pub type PortalResult<T> = std::result::Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("invalid component reference '{reference}': {reason}")]
    Identity { reference: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("platform API error: {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("platform request {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("platform request {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode platform response for {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0} not configured")]
    Unconfigured(&'static str),
}

impl PortalError {
    pub fn identity(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Identity {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn component_not_found(component: &str, app_id: &str) -> Self {
        Self::NotFound(format!("component {component} not found in app {app_id}"))
    }

    pub fn archived(action: &str) -> Self {
        Self::Conflict(format!("app is archived; {action} is not permitted"))
    }

    pub(crate) fn from_reqwest(operation: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { operation }
        } else if err.is_decode() {
            Self::Decode {
                operation,
                source: err,
            }
        } else {
            Self::Transport {
                operation,
                source: err,
            }
        }
    }

    /// HTTP status an outer surface should answer with.
    ///
    /// Upstream statuses are passed through verbatim when they form a valid
    /// HTTP status code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Identity { .. } | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport { .. } | Self::Decode { .. } => StatusCode::BAD_GATEWAY,
            Self::Unconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity_error",
            Self::InvalidRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unsupported(_) => "not_implemented",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout { .. } => "upstream_timeout",
            Self::Transport { .. } => "upstream_unavailable",
            Self::Decode { .. } => "upstream_decode_error",
            Self::Unconfigured(_) => "unconfigured",
        }
    }

    /// Upstream status code, when the platform answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
