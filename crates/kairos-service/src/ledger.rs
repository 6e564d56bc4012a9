//! Contract of the external payment ledger.
//!
//! The engine only moves money through this trait. Charges and refunds cross a network
//! boundary, so every call is failable; the engine never retries a ledger call on its own.

use async_trait::async_trait;
use thiserror::Error;

/// A charge of `amount` minor units taken from `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChargeRequest {
    pub user_id: uuid::Uuid,
    pub amount: i64,
    pub currency: String,
    /// Human-readable purpose shown on the user's statement.
    pub reason: String,
    /// Booking reference, `occurrence:<id>`.
    pub reference: String,
}

/// Money moved back from the publisher to a participant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RefundRequest {
    pub from_user_id: uuid::Uuid,
    pub to_user_id: uuid::Uuid,
    pub amount: i64,
    pub currency: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    pub transaction_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Charge declined: {0}")]
    Declined(String),

    /// The ledger did not answer in time. The outcome of the call is unknown.
    #[error("Ledger did not respond")]
    NoResponse,

    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// ## Errors
    /// Returns a `LedgerError` if the charge was not taken.
    async fn charge(&self, request: ChargeRequest) -> Result<Receipt, LedgerError>;

    /// ## Errors
    /// Returns a `LedgerError` if the refund was not issued.
    async fn refund(&self, request: RefundRequest) -> Result<Receipt, LedgerError>;

    /// ## Summary
    /// Whether the user has already paid for `reference`, for instance through a checkout the
    /// caller completed after a `PaymentRequired` answer.
    ///
    /// ## Errors
    /// Returns a `LedgerError` if the ledger could not be asked.
    async fn check_paid(&self, user_id: uuid::Uuid, reference: &str) -> Result<bool, LedgerError>;
}
