//! Escrow creation, lookup and settlement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{EscrowId, ListingId, Money, OrderId, UserId};
use domain::{DisputeResolution, Escrow};
use saga::{CreateEscrowRequest, EscrowService, TransitionOutcome, WebhookIngestor};
use serde::Deserialize;

use crate::auth::CurrentCaller;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub escrows: EscrowService,
    pub webhooks: WebhookIngestor,

    /// Provider assumed for webhooks that do not name a source.
    pub payment_provider: String,

    /// Backing store name reported by the health check.
    pub storage: &'static str,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateEscrowBody {
    pub listing_id: String,
    pub seller_id: String,

    /// Decimal amount in major units, e.g. `100.00`.
    pub amount: f64,
    pub currency: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ResolveBody {
    pub resolution: DisputeResolution,
    #[serde(default)]
    pub reason: String,
}

// -- Handlers --

/// POST /escrows: run the creation saga for the calling buyer.
#[tracing::instrument(skip(state, caller, body), fields(user_id = %caller.0.user_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Json(body): Json<CreateEscrowBody>,
) -> Result<Json<Escrow>, ApiError> {
    let amount = Money::from_decimal(body.amount)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid amount: {}", body.amount)))?;

    let request = CreateEscrowRequest {
        listing_id: ListingId::new(body.listing_id),
        seller_id: UserId::new(body.seller_id),
        amount,
        currency: body.currency,
        order_id: body.order_id.map(OrderId::new),
    };

    let escrow = state.escrows.create(&caller.0, request).await?;
    Ok(Json(escrow))
}

/// GET /escrows/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(id): Path<String>,
) -> Result<Json<Escrow>, ApiError> {
    let escrow_id = parse_escrow_id(&id)?;
    Ok(Json(state.escrows.get(&caller.0, escrow_id).await?))
}

/// GET /escrows/order/{order_id}
#[tracing::instrument(skip(state, caller))]
pub async fn get_by_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(order_id): Path<String>,
) -> Result<Json<Escrow>, ApiError> {
    let escrow = state
        .escrows
        .get_by_order(&caller.0, &OrderId::new(order_id))
        .await?;
    Ok(Json(escrow))
}

/// GET /escrows/buyer: escrows where the caller is the buyer.
pub async fn list_buyer(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
) -> Result<Json<Vec<Escrow>>, ApiError> {
    Ok(Json(state.escrows.list_for_buyer(&caller.0).await?))
}

/// GET /escrows/seller: escrows where the caller is the seller.
pub async fn list_seller(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
) -> Result<Json<Vec<Escrow>>, ApiError> {
    Ok(Json(state.escrows.list_for_seller(&caller.0).await?))
}

/// POST /escrows/{id}/release
#[tracing::instrument(skip(state, caller, body))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let escrow_id = parse_escrow_id(&id)?;
    let reason = reason_or(body, "Released by seller");
    Ok(Json(
        state.escrows.release(&caller.0, escrow_id, &reason).await?,
    ))
}

/// POST /escrows/{id}/refund
#[tracing::instrument(skip(state, caller, body))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let escrow_id = parse_escrow_id(&id)?;
    let reason = reason_or(body, "Refund requested by buyer");
    Ok(Json(
        state.escrows.refund(&caller.0, escrow_id, &reason).await?,
    ))
}

/// POST /escrows/{id}/dispute
#[tracing::instrument(skip(state, caller, body))]
pub async fn dispute(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let escrow_id = parse_escrow_id(&id)?;
    let reason = reason_or(body, "Dispute opened");
    Ok(Json(
        state
            .escrows
            .open_dispute(&caller.0, escrow_id, &reason)
            .await?,
    ))
}

/// POST /escrows/{id}/resolve: operator settles a dispute.
#[tracing::instrument(skip(state, caller, body))]
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    caller: CurrentCaller,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let escrow_id = parse_escrow_id(&id)?;
    Ok(Json(
        state
            .escrows
            .resolve_dispute(&caller.0, escrow_id, body.resolution, &body.reason)
            .await?,
    ))
}

// -- Helpers --

fn parse_escrow_id(id: &str) -> Result<EscrowId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid escrow ID: {e}")))?;
    Ok(EscrowId::from_uuid(uuid))
}

fn reason_or(body: Option<Json<ReasonBody>>, fallback: &str) -> String {
    match body {
        Some(Json(ReasonBody { reason })) if !reason.trim().is_empty() => reason,
        _ => fallback.to_string(),
    }
}
