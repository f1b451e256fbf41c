//! Error types for the workflow core.

use crate::gate::Capability;

/// Top-level error type. Every failure is synchronous and locally
/// recoverable; validation and permission checks run strictly before any
/// mutation, so a returned error means nothing changed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Permission denied: {capability} on {subject}")]
    PermissionDenied {
        capability: Capability,
        subject: String,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },
}

impl Error {
    pub(crate) fn denied(capability: Capability, subject: impl Into<String>) -> Self {
        Self::PermissionDenied {
            capability,
            subject: subject.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }
}

/// Result type alias for the workflow core.
pub type Result<T> = std::result::Result<T, Error>;
