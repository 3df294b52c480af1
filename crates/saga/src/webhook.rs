//! Idempotent ingestion of payment provider callbacks.

use std::sync::Arc;

use common::EscrowId;
use domain::WebhookRecord;
use escrow_store::{PaymentRepository, WebhookRepository};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, SagaError};

/// Result of ingesting one callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    /// True if the `(source, event_id)` pair was seen before.
    pub duplicate: bool,

    /// ID of the stored record (the original one for duplicates).
    pub webhook_id: Uuid,

    /// Escrow the callback refers to, when it could be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_id: Option<EscrowId>,
}

/// Stores each callback once and correlates it with an escrow.
#[derive(Clone)]
pub struct WebhookIngestor {
    webhooks: Arc<dyn WebhookRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl WebhookIngestor {
    pub fn new(webhooks: Arc<dyn WebhookRepository>, payments: Arc<dyn PaymentRepository>) -> Self {
        Self { webhooks, payments }
    }

    /// Records a callback unless it was already received.
    ///
    /// New callbacks are correlated with an escrow through the payment
    /// ledger, using `payload.intent_id`, and then marked processed. A
    /// redelivery of a callback that was stored but never processed is
    /// processed again.
    #[tracing::instrument(skip(self, payload))]
    pub async fn ingest(
        &self,
        source: &str,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<WebhookOutcome> {
        if source.is_empty() || event_id.is_empty() {
            return Err(SagaError::Validation(
                "webhook source and event_id are required".to_string(),
            ));
        }

        metrics::counter!("webhooks_received_total").increment(1);

        let record = WebhookRecord::received(source, event_id, event_type, payload);
        let Some(existing) = self.webhooks.insert_if_absent(&record).await? else {
            let escrow_id = self.process(&record).await?;
            return Ok(WebhookOutcome {
                duplicate: false,
                webhook_id: record.id,
                escrow_id,
            });
        };

        metrics::counter!("webhooks_duplicate_total").increment(1);
        if existing.processed {
            tracing::info!(webhook_id = %existing.id, "duplicate webhook ignored");
            return Ok(WebhookOutcome {
                duplicate: true,
                webhook_id: existing.id,
                escrow_id: None,
            });
        }

        tracing::info!(webhook_id = %existing.id, "resuming unprocessed webhook");
        let escrow_id = self.process(&existing).await?;
        Ok(WebhookOutcome {
            duplicate: true,
            webhook_id: existing.id,
            escrow_id,
        })
    }

    /// Correlates a stored callback and marks it processed.
    async fn process(&self, record: &WebhookRecord) -> Result<Option<EscrowId>> {
        let escrow_id = self.correlate(&record.source, &record.payload).await?;
        match escrow_id {
            Some(escrow_id) => tracing::info!(%escrow_id, "webhook correlated with escrow"),
            None => tracing::info!("webhook does not reference a known payment"),
        }

        self.webhooks.mark_processed(record.id).await?;
        Ok(escrow_id)
    }

    async fn correlate(&self, source: &str, payload: &serde_json::Value) -> Result<Option<EscrowId>> {
        let Some(intent_id) = payload.get("intent_id").and_then(|v| v.as_str()) else {
            return Ok(None);
        };

        let rows = self.payments.find_by_intent(source, intent_id).await?;
        Ok(rows.first().map(|p| p.escrow_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use common::Money;
    use domain::{PaymentAction, PaymentRecord};
    use escrow_store::{InMemoryStore, StoreError};

    fn ingestor(store: &InMemoryStore) -> WebhookIngestor {
        WebhookIngestor::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_same_event_is_stored_once() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);
        let payload = serde_json::json!({"intent_id": "pi_1"});

        let first = ingestor
            .ingest("mock", "evt_1", "payment.captured", payload.clone())
            .await
            .unwrap();
        let second = ingestor
            .ingest("mock", "evt_1", "payment.captured", payload)
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.webhook_id, second.webhook_id);
        assert_eq!(store.webhook_count().await, 1);
    }

    #[tokio::test]
    async fn test_correlates_through_payment_ledger() {
        let store = InMemoryStore::new();
        let escrow_id = EscrowId::new();
        store
            .record(&PaymentRecord::succeeded(
                escrow_id,
                "mock",
                "pi_7",
                PaymentAction::Capture,
                Money::from_cents(100),
                "USD",
            ))
            .await
            .unwrap();

        let outcome = ingestor(&store)
            .ingest(
                "mock",
                "evt_2",
                "payment.captured",
                serde_json::json!({"intent_id": "pi_7"}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.escrow_id, Some(escrow_id));
        let stored = store.find("mock", "evt_2").await.unwrap().unwrap();
        assert!(stored.processed);
    }

    #[tokio::test]
    async fn test_same_event_id_from_other_source_is_new() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);
        let payload = serde_json::json!({});

        ingestor.ingest("mock", "evt_1", "a", payload.clone()).await.unwrap();
        let other = ingestor.ingest("stripe", "evt_1", "a", payload).await.unwrap();

        assert!(!other.duplicate);
        assert_eq!(store.webhook_count().await, 2);
    }

    /// Ledger whose first intent lookup fails.
    struct FlakyLedger {
        inner: InMemoryStore,
        failed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PaymentRepository for FlakyLedger {
        async fn record(&self, payment: &PaymentRecord) -> escrow_store::Result<()> {
            self.inner.record(payment).await
        }

        async fn list_for_escrow(
            &self,
            escrow_id: EscrowId,
        ) -> escrow_store::Result<Vec<PaymentRecord>> {
            self.inner.list_for_escrow(escrow_id).await
        }

        async fn find_by_intent(
            &self,
            provider: &str,
            intent_id: &str,
        ) -> escrow_store::Result<Vec<PaymentRecord>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Corrupt("ledger unavailable".to_string()));
            }
            self.inner.find_by_intent(provider, intent_id).await
        }
    }

    #[tokio::test]
    async fn test_redelivery_finishes_interrupted_processing() {
        let store = InMemoryStore::new();
        let escrow_id = EscrowId::new();
        store
            .record(&PaymentRecord::succeeded(
                escrow_id,
                "mock",
                "pi_3",
                PaymentAction::Capture,
                Money::from_cents(100),
                "USD",
            ))
            .await
            .unwrap();
        let ingestor = WebhookIngestor::new(
            Arc::new(store.clone()),
            Arc::new(FlakyLedger {
                inner: store.clone(),
                failed: AtomicBool::new(false),
            }),
        );
        let payload = serde_json::json!({"intent_id": "pi_3"});

        let first = ingestor
            .ingest("mock", "evt_3", "payment.captured", payload.clone())
            .await;
        assert!(first.is_err());
        assert!(!store.find("mock", "evt_3").await.unwrap().unwrap().processed);

        let retried = ingestor
            .ingest("mock", "evt_3", "payment.captured", payload.clone())
            .await
            .unwrap();
        assert_eq!(retried.escrow_id, Some(escrow_id));
        assert!(store.find("mock", "evt_3").await.unwrap().unwrap().processed);

        let third = ingestor
            .ingest("mock", "evt_3", "payment.captured", payload)
            .await
            .unwrap();
        assert!(third.duplicate);
        assert_eq!(third.escrow_id, None);
        assert_eq!(third.webhook_id, retried.webhook_id);
        assert_eq!(store.webhook_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_event_id_is_rejected() {
        let store = InMemoryStore::new();
        let result = ingestor(&store)
            .ingest("mock", "", "a", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(SagaError::Validation(_))));
    }
}
