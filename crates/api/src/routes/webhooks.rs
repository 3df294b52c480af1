//! Payment provider callback endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::WebhookOutcome;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::escrows::AppState;

#[derive(Deserialize)]
pub struct PaymentWebhookBody {
    /// Provider name; defaults to the configured gateway.
    pub source: Option<String>,
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// POST /webhooks/payment: store a callback once per `(source, event_id)`.
#[tracing::instrument(skip(state, body), fields(event_id = %body.event_id))]
pub async fn payment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PaymentWebhookBody>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let source = body
        .source
        .unwrap_or_else(|| state.payment_provider.clone());

    let outcome = state
        .webhooks
        .ingest(&source, &body.event_id, &body.event_type, body.data)
        .await?;
    Ok(Json(outcome))
}
