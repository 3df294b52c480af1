//! Saga error types.

use common::EscrowId;
use domain::EscrowError;
use escrow_store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga and escrow operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga step failed.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// The saga was rolled back.
    #[error("Saga failed: {message}")]
    SagaFailed { message: String },

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// Order service error.
    #[error("Order service error: {0}")]
    OrderService(String),

    /// Listing service error.
    #[error("Listing service error: {0}")]
    ListingService(String),

    /// Wallet service error.
    #[error("Wallet service error: {0}")]
    WalletService(String),

    /// An external call did not complete in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The caller may not perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The escrow or a collaborator is not in the required state.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Escrow not found.
    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] EscrowError),

    /// Repository error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SagaError {
    /// Builds a not-found error for an escrow ID.
    pub fn escrow_not_found(id: EscrowId) -> Self {
        SagaError::EscrowNotFound(id.to_string())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
