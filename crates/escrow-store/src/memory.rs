use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{EscrowId, OrderId, UserId, Version};
use domain::{Escrow, EscrowStatus, PaymentRecord, WebhookRecord};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Result, StoreError,
    repository::{EscrowRepository, PaymentRepository, WebhookRepository},
};

/// In-memory store implementation for testing and local development.
///
/// Provides the same semantics as the PostgreSQL implementation, including
/// conditional writes and uniqueness constraints.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    escrows: Arc<RwLock<HashMap<EscrowId, Escrow>>>,
    payments: Arc<RwLock<Vec<PaymentRecord>>>,
    webhooks: Arc<RwLock<Vec<WebhookRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored escrows.
    pub async fn escrow_count(&self) -> usize {
        self.escrows.read().await.len()
    }

    /// Returns the number of ledger rows.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Returns the number of webhook records.
    pub async fn webhook_count(&self) -> usize {
        self.webhooks.read().await.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        self.escrows.write().await.clear();
        self.payments.write().await.clear();
        self.webhooks.write().await.clear();
    }

    async fn filter_escrows(&self, predicate: impl Fn(&Escrow) -> bool) -> Vec<Escrow> {
        let store = self.escrows.read().await;
        let mut escrows: Vec<_> = store.values().filter(|e| predicate(e)).cloned().collect();
        escrows.sort_by_key(|e| e.created_at());
        escrows
    }
}

#[async_trait]
impl EscrowRepository for InMemoryStore {
    async fn insert(&self, escrow: &mut Escrow) -> Result<()> {
        let mut store = self.escrows.write().await;
        if store.contains_key(&escrow.id()) {
            return Err(StoreError::Duplicate(format!("escrow {}", escrow.id())));
        }
        if escrow.version() != Version::initial() {
            return Err(StoreError::ConcurrencyConflict {
                escrow_id: escrow.id(),
                expected: escrow.version(),
                actual: Version::initial(),
            });
        }

        escrow.set_version(Version::first());
        store.insert(escrow.id(), escrow.clone());
        Ok(())
    }

    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>> {
        Ok(self.escrows.read().await.get(&id).cloned())
    }

    async fn update(&self, escrow: &mut Escrow) -> Result<()> {
        let mut store = self.escrows.write().await;
        let stored = store
            .get_mut(&escrow.id())
            .ok_or(StoreError::NotFound(escrow.id()))?;

        if stored.version() != escrow.version() {
            return Err(StoreError::ConcurrencyConflict {
                escrow_id: escrow.id(),
                expected: escrow.version(),
                actual: stored.version(),
            });
        }

        escrow.set_version(escrow.version().next());
        *stored = escrow.clone();
        Ok(())
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Escrow>> {
        Ok(self
            .filter_escrows(|e| e.order_id() == Some(order_id))
            .await
            .into_iter()
            .next())
    }

    async fn list_by_buyer(&self, buyer_id: &UserId) -> Result<Vec<Escrow>> {
        Ok(self.filter_escrows(|e| e.buyer_id() == buyer_id).await)
    }

    async fn list_by_seller(&self, seller_id: &UserId) -> Result<Vec<Escrow>> {
        Ok(self.filter_escrows(|e| e.seller_id() == seller_id).await)
    }

    async fn list_by_status(&self, status: EscrowStatus) -> Result<Vec<Escrow>> {
        Ok(self.filter_escrows(|e| e.status() == status).await)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn record(&self, payment: &PaymentRecord) -> Result<()> {
        let mut ledger = self.payments.write().await;

        // Partial unique index simulation: only succeeded rows are constrained
        if payment.is_succeeded()
            && ledger.iter().any(|p| {
                p.is_succeeded()
                    && p.provider == payment.provider
                    && p.intent_id == payment.intent_id
                    && p.action == payment.action
            })
        {
            return Err(StoreError::Duplicate(format!(
                "{} {} for intent {}",
                payment.provider, payment.action, payment.intent_id
            )));
        }

        ledger.push(payment.clone());
        Ok(())
    }

    async fn list_for_escrow(&self, escrow_id: EscrowId) -> Result<Vec<PaymentRecord>> {
        let ledger = self.payments.read().await;
        Ok(ledger
            .iter()
            .filter(|p| p.escrow_id == escrow_id)
            .cloned()
            .collect())
    }

    async fn find_by_intent(&self, provider: &str, intent_id: &str) -> Result<Vec<PaymentRecord>> {
        let ledger = self.payments.read().await;
        Ok(ledger
            .iter()
            .filter(|p| p.provider == provider && p.intent_id == intent_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WebhookRepository for InMemoryStore {
    async fn insert_if_absent(&self, record: &WebhookRecord) -> Result<Option<WebhookRecord>> {
        let mut webhooks = self.webhooks.write().await;
        if let Some(existing) = webhooks
            .iter()
            .find(|w| w.source == record.source && w.event_id == record.event_id)
        {
            return Ok(Some(existing.clone()));
        }

        webhooks.push(record.clone());
        Ok(None)
    }

    async fn find(&self, source: &str, event_id: &str) -> Result<Option<WebhookRecord>> {
        let webhooks = self.webhooks.read().await;
        Ok(webhooks
            .iter()
            .find(|w| w.source == source && w.event_id == event_id)
            .cloned())
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        let mut webhooks = self.webhooks.write().await;
        let record = webhooks
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(StoreError::WebhookNotFound(id))?;
        record.processed = true;
        record.processed_at = Some(chrono::Utc::now());
        Ok(())
    }
}
