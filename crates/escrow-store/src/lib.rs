//! Persistence for the escrow saga system.
//!
//! Escrows are stored as versioned documents with conditional writes; payments
//! and webhooks are append-mostly ledgers with uniqueness constraints.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    EscrowRepository, EscrowRepositoryExt, PaymentRepository, PaymentRepositoryExt,
    WebhookRepository,
};
