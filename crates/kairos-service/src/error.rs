use kairos_core::error::CoreError;
use thiserror::Error;

use crate::identity::DirectoryError;
use crate::ledger::LedgerError;

/// Service layer errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    DatabaseError(#[from] kairos_db::error::DbError),

    #[error(transparent)]
    CoreError(CoreError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Occurrence {occurrence_id} is full: {going} of {capacity_max} seats taken")]
    CapacityExceeded {
        occurrence_id: uuid::Uuid,
        capacity_max: i32,
        going: i64,
    },

    /// Joining needs a payment the caller has not authorized.
    #[error("Payment of {amount} {currency} required")]
    PaymentRequired { amount: i64, currency: String },

    #[error("Payment failed: {0}")]
    PaymentFailed(#[source] LedgerError),

    /// Another change to the same participation holds a payment claim on it.
    #[error("A payment for user {user_id} on occurrence {occurrence_id} is still being processed")]
    TransitionInProgress {
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    },

    #[error("Occurrence {0} has already started")]
    OccurrenceAlreadyStarted(uuid::Uuid),

    #[error("Occurrence {0} is closed")]
    OccurrenceClosed(uuid::Uuid),

    #[error("User not found: {0}")]
    UserNotFound(uuid::Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory error: {0}")]
    DirectoryError(#[from] DirectoryError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(message) | CoreError::InvalidInput(message) => {
                Self::ValidationError(message)
            }
            other => Self::CoreError(other),
        }
    }
}

impl ServiceError {
    /// Whether the error describes a rejected request rather than a fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::CapacityExceeded { .. }
                | Self::PaymentRequired { .. }
                | Self::PaymentFailed(_)
                | Self::TransitionInProgress { .. }
                | Self::OccurrenceAlreadyStarted(_)
                | Self::OccurrenceClosed(_)
                | Self::UserNotFound(_)
                | Self::NotFound(_)
        )
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
