//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use thiserror::Error;

/// Result alias for raw remote client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors reported by a [`VehicleApi`](crate::VehicleApi) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Credentials are no longer accepted; the user must re-authenticate.
    #[error("authentication expired: {0}")]
    AuthExpired(String),
    /// The cloud session token lapsed; a fresh login may recover.
    #[error("session expired: {0}")]
    SessionExpired(String),
    /// The cloud answered with an application-level error.
    #[error("api error {code}: {message}")]
    Api { code: String, message: String },
    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The vehicle or region does not expose this endpoint.
    #[error("endpoint not supported: {endpoint}")]
    EndpointUnsupported { endpoint: String },
    /// The cloud accepted a command but reports it failed asynchronously.
    #[error("remote control reported failure: {0}")]
    RemoteControlSoftFailure(String),
    #[error("control password rejected: {0}")]
    ControlPasswordRejected(String),
}

impl ApiError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(endpoint: impl Into<String>) -> Self {
        Self::EndpointUnsupported {
            endpoint: endpoint.into(),
        }
    }

    /// Authentication-class failures: fatal for a cycle.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::SessionExpired(_))
    }

    /// Failures a coordinator degrades around using cached data.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::Transport(_)
                | Self::RateLimited(_)
                | Self::EndpointUnsupported { .. }
        )
    }
}

/// Errors surfaced by [`ApiSession::call`](crate::ApiSession::call).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// Re-authentication is required before any further call can succeed.
    #[error("authentication required: {0}")]
    AuthRequired(String),
    /// A command was accepted by the cloud but reported as failed later.
    #[error("remote control soft failure: {0}")]
    RemoteControlSoftFailure(String),
    /// Any other failure; `cause` keeps the remote classification.
    #[error("{message}")]
    UpdateFailed { message: String, cause: ApiError },
}

impl CallError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRequired(_))
    }

    /// True when the underlying remote error marked the endpoint as unsupported.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UpdateFailed {
                cause: ApiError::EndpointUnsupported { .. },
                ..
            }
        )
    }

    pub fn cause(&self) -> Option<&ApiError> {
        match self {
            Self::UpdateFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
