//! Webhook idempotency records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A received asynchronous callback, unique per `(source, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: Uuid,

    /// Who sent the callback (usually the payment provider name).
    pub source: String,

    /// Sender-assigned event identifier used for deduplication.
    pub event_id: String,

    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookRecord {
    /// Creates an unprocessed record stamped with the current time.
    pub fn received(
        source: impl Into<String>,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            processed: false,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}
