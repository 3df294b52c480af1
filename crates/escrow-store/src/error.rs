use common::{EscrowId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found a different stored version than expected.
    #[error(
        "Concurrency conflict for escrow {escrow_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        escrow_id: EscrowId,
        expected: Version,
        actual: Version,
    },

    /// The escrow was not found.
    #[error("Escrow not found: {0}")]
    NotFound(EscrowId),

    /// The webhook record was not found.
    #[error("Webhook not found: {0}")]
    WebhookNotFound(uuid::Uuid),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
