//! Error taxonomy for field and ledger operations.
//!
//! Domain-rule rejections (`CapacityExceeded`, `Cooldown`, `SelfReference`,
//! `AlreadyActive`, `NotFound`, `OriginNotFound`) are deterministic and must not be retried.
//! `Conflict` and `Storage` are transient and safe to retry with backoff.
//! `InvariantViolation` is fatal: it signals that the ledger no longer balances.

use chrono::Duration;
use thiserror::Error;

use crate::quantity::Quantity;

/// Errors returned by every field, propagation and ledger operation.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("propagation origin '{0}' not found or inactive")]
    OriginNotFound(String),

    #[error("node '{node}' already holds {max} active bonds")]
    CapacityExceeded { node: String, max: usize },

    #[error("bond cooldown active for '{node}': {} minutes remaining", remaining.num_minutes())]
    Cooldown { node: String, remaining: Duration },

    #[error("node '{0}' cannot bond with itself")]
    SelfReference(String),

    #[error("bond already active between '{0}' and '{1}'")]
    AlreadyActive(String, String),

    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("conservation invariant violated: in={total_in} out={total_out} balance={balance}")]
    InvariantViolation {
        total_in: Quantity,
        total_out: Quantity,
        balance: Quantity,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid ledger event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl FieldError {
    /// Whether the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Storage(_))
    }

    /// Shorthand for a missing or inactive node.
    pub fn node_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("node '{id}'"))
    }
}

/// Result alias used across the crate.
pub type FieldResult<T> = std::result::Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FieldError::Conflict("pair".into()).is_retryable());
        assert!(FieldError::Storage(anyhow::anyhow!("disk")).is_retryable());
        assert!(!FieldError::SelfReference("a".into()).is_retryable());
        assert!(!FieldError::CapacityExceeded {
            node: "a".into(),
            max: 5
        }
        .is_retryable());
        assert!(!FieldError::Cooldown {
            node: "a".into(),
            remaining: Duration::hours(3),
        }
        .is_retryable());
        assert!(!FieldError::OriginNotFound("o".into()).is_retryable());
    }

    #[test]
    fn test_origin_not_found_is_distinct() {
        let err = FieldError::OriginNotFound("o".into());
        assert!(!matches!(err, FieldError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            "propagation origin 'o' not found or inactive"
        );
    }

    #[test]
    fn test_cooldown_message_reports_minutes() {
        let err = FieldError::Cooldown {
            node: "x".into(),
            remaining: Duration::minutes(90),
        };
        assert_eq!(
            err.to_string(),
            "bond cooldown active for 'x': 90 minutes remaining"
        );
    }
}
