//! Error taxonomy shared by every component.
//!
//! Each variant maps onto one HTTP status; transports render the
//! `{error, details?}` envelope returned by [`PolisError::envelope`].

use crate::storage::StorageError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolisError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("{0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal { details: Option<String> },
}

pub type PolisResult<T> = Result<T, PolisError>;

/// Body returned to clients for any failed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PolisError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::AuthorizationDenied(msg.into())
    }

    /// HTTP status code conveying the error kind.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AuthenticationRequired => 401,
            Self::AuthorizationDenied(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal { .. } => 500,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            Self::Internal { details } => details.clone(),
            _ => None,
        };
        ErrorEnvelope {
            error: self.to_string(),
            details,
        }
    }
}

impl From<StorageError> for PolisError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation(what) => Self::Conflict(format!("{} already exists", what)),
            StorageError::StaleWrite(what) => {
                Self::Conflict(format!("{} was modified concurrently, retry the update", what))
            }
            other => {
                tracing::error!(error = %other, "storage failure");
                Self::Internal {
                    details: Some(other.to_string()),
                }
            }
        }
    }
}

impl From<serde_json::Error> for PolisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            details: Some(format!("serialization: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(PolisError::validation("x").status(), 400);
        assert_eq!(PolisError::AuthenticationRequired.status(), 401);
        assert_eq!(PolisError::denied("x").status(), 403);
        assert_eq!(PolisError::not_found("x").status(), 404);
        assert_eq!(PolisError::Conflict("x".into()).status(), 409);
        assert_eq!(PolisError::Internal { details: None }.status(), 500);
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let err: PolisError = StorageError::UniqueViolation("document slug 'a'".into()).into();
        assert_eq!(err.status(), 409);
        assert_eq!(err.to_string(), "document slug 'a' already exists");
    }

    #[test]
    fn internal_envelope_keeps_details_but_generic_message() {
        let err = PolisError::Internal {
            details: Some("disk full".into()),
        };
        let envelope = err.envelope();
        assert_eq!(envelope.error, "internal error");
        assert_eq!(envelope.details.as_deref(), Some("disk full"));

        let json = serde_json::to_value(PolisError::not_found("concept 7 not found").envelope()).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "concept 7 not found" }));
    }
}
