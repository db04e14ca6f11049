//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use r_evc_client::{CallError, ResourceKind};
use thiserror::Error;

/// Whole-cycle failures of a coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The account must be re-authenticated; no retry will help.
    #[error("authentication required: {0}")]
    AuthRequired(String),
    /// The coordinator's mandatory resource could not be fetched or served from cache.
    #[error("{resource} unavailable: {message}")]
    Unavailable {
        resource: ResourceKind,
        message: String,
    },
}

impl CoordinatorError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRequired(_))
    }

    /// Classify a failed call for a mandatory `resource`.
    pub(crate) fn from_call(resource: ResourceKind, err: CallError) -> Self {
        match err {
            CallError::AuthRequired(reason) => Self::AuthRequired(reason),
            other => Self::Unavailable {
                resource,
                message: other.to_string(),
            },
        }
    }
}

/// User-visible command failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("action failed: {0}")]
    ActionFailed(String),
}

impl CommandError {
    pub fn message(&self) -> &str {
        match self {
            Self::ActionFailed(message) => message,
        }
    }
}
