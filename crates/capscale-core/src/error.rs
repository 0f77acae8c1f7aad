//! Error taxonomy shared by the decision core and its collaborators.

use thiserror::Error;

/// Result type alias for capacity operations.
pub type CapacityResult<T> = Result<T, CapacityError>;

/// Errors surfaced at the collaborator boundary.
///
/// Only `Configuration` and a failed bulk snapshot fetch are fatal to a
/// batch; everything else is recorded per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    #[error("tenant not found: {0}")]
    NotFound(String),

    #[error("failed to apply action for {tenant}: {reason}")]
    ApplyAction { tenant: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CapacityError {
    pub fn apply(tenant: &str, reason: impl ToString) -> Self {
        CapacityError::ApplyAction {
            tenant: tenant.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CapacityError::NotFound(_))
    }
}
