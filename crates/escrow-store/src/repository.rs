use async_trait::async_trait;
use common::{EscrowId, OrderId, UserId};
use domain::{Escrow, EscrowStatus, PaymentAction, PaymentRecord, WebhookRecord};
use uuid::Uuid;

use crate::{Result, StoreError};

/// Versioned document storage for escrows.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EscrowRepository: Send + Sync {
    /// Inserts a new escrow.
    ///
    /// The escrow must never have been stored. On success its version is set
    /// to [`common::Version::first`].
    async fn insert(&self, escrow: &mut Escrow) -> Result<()>;

    /// Loads an escrow by ID.
    ///
    /// Returns None if it doesn't exist.
    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>>;

    /// Conditionally overwrites a stored escrow.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version differs from
    /// `escrow.version()`. On success the version is incremented both in the
    /// store and on `escrow`.
    async fn update(&self, escrow: &mut Escrow) -> Result<()>;

    /// Finds the escrow backing an order.
    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Escrow>>;

    /// Lists escrows where the user is the buyer, oldest first.
    async fn list_by_buyer(&self, buyer_id: &UserId) -> Result<Vec<Escrow>>;

    /// Lists escrows where the user is the seller, oldest first.
    async fn list_by_seller(&self, seller_id: &UserId) -> Result<Vec<Escrow>>;

    /// Lists escrows in a given status, oldest first.
    async fn list_by_status(&self, status: EscrowStatus) -> Result<Vec<Escrow>>;
}

/// Extension trait providing convenience methods for escrow repositories.
#[async_trait]
pub trait EscrowRepositoryExt: EscrowRepository {
    /// Loads an escrow, failing with `NotFound` if it doesn't exist.
    async fn load(&self, id: EscrowId) -> Result<Escrow> {
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }
}

impl<T: EscrowRepository + ?Sized> EscrowRepositoryExt for T {}

/// Append-only ledger of gateway actions.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Records a ledger row.
    ///
    /// Fails with `Duplicate` if a succeeded row already exists for the same
    /// `(provider, intent_id, action)`.
    async fn record(&self, payment: &PaymentRecord) -> Result<()>;

    /// Lists all rows for an escrow, oldest first.
    async fn list_for_escrow(&self, escrow_id: EscrowId) -> Result<Vec<PaymentRecord>>;

    /// Lists all rows for a provider intent, oldest first.
    async fn find_by_intent(&self, provider: &str, intent_id: &str) -> Result<Vec<PaymentRecord>>;
}

/// Extension trait providing convenience methods for payment ledgers.
#[async_trait]
pub trait PaymentRepositoryExt: PaymentRepository {
    /// Returns the succeeded row for an intent action, if the gateway already accepted it.
    async fn find_succeeded(
        &self,
        provider: &str,
        intent_id: &str,
        action: PaymentAction,
    ) -> Result<Option<PaymentRecord>> {
        Ok(self
            .find_by_intent(provider, intent_id)
            .await?
            .into_iter()
            .find(|p| p.action == action && p.is_succeeded()))
    }
}

impl<T: PaymentRepository + ?Sized> PaymentRepositoryExt for T {}

/// Idempotency records for asynchronous callbacks.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Inserts the record unless one with the same `(source, event_id)` exists.
    ///
    /// Returns None when the record was inserted, or the previously stored
    /// record when it is a duplicate.
    async fn insert_if_absent(&self, record: &WebhookRecord) -> Result<Option<WebhookRecord>>;

    /// Looks up a record by its deduplication key.
    async fn find(&self, source: &str, event_id: &str) -> Result<Option<WebhookRecord>>;

    /// Flags a record as processed.
    async fn mark_processed(&self, id: Uuid) -> Result<()>;
}
