//! HTTP API server with observability for the escrow saga system.
//!
//! Provides REST endpoints for escrow creation, settlement and disputes, plus
//! payment webhook ingestion, with structured logging (tracing) and
//! Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use escrow_store::{
    EscrowRepository, InMemoryStore, PaymentRepository, PostgresStore, WebhookRepository,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    Collaborators, EscrowService, InMemoryListingService, InMemoryOrderService,
    InMemoryPaymentGateway, InMemoryWalletService, PaymentGateway, SagaConfig, WebhookIngestor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::escrows::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/escrows", post(routes::escrows::create))
        .route("/escrows/buyer", get(routes::escrows::list_buyer))
        .route("/escrows/seller", get(routes::escrows::list_seller))
        .route("/escrows/order/{order_id}", get(routes::escrows::get_by_order))
        .route("/escrows/{id}", get(routes::escrows::get))
        .route("/escrows/{id}/release", post(routes::escrows::release))
        .route("/escrows/{id}/refund", post(routes::escrows::refund))
        .route("/escrows/{id}/dispute", post(routes::escrows::dispute))
        .route("/escrows/{id}/resolve", post(routes::escrows::resolve))
        .route("/webhooks/payment", post(routes::webhooks::payment))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Repositories backing the application.
#[derive(Clone)]
pub struct Stores {
    pub escrows: Arc<dyn EscrowRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub name: &'static str,
}

impl Stores {
    /// All repositories served by one in-memory store.
    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            escrows: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            webhooks: Arc::new(store),
            name: "memory",
        }
    }

    /// All repositories served by one PostgreSQL pool.
    pub fn postgres(store: PostgresStore) -> Self {
        Self {
            escrows: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            webhooks: Arc::new(store),
            name: "postgres",
        }
    }
}

/// In-memory external services, kept so callers can inspect or steer them.
#[derive(Clone, Default)]
pub struct MockServices {
    pub gateway: InMemoryPaymentGateway,
    pub orders: InMemoryOrderService,
    pub listings: InMemoryListingService,
    pub wallet: InMemoryWalletService,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Wires the escrow service and webhook ingestor over the given stores.
pub fn create_state(stores: Stores, services: &MockServices, config: SagaConfig) -> Arc<AppState> {
    let collaborators = Collaborators {
        escrows: stores.escrows,
        payments: stores.payments.clone(),
        gateway: Arc::new(services.gateway.clone()),
        orders: Arc::new(services.orders.clone()),
        listings: Arc::new(services.listings.clone()),
        wallet: Arc::new(services.wallet.clone()),
    };

    Arc::new(AppState {
        escrows: EscrowService::new(collaborators, config),
        webhooks: WebhookIngestor::new(stores.webhooks, stores.payments),
        payment_provider: services.gateway.provider().to_string(),
        storage: stores.name,
    })
}

/// Creates application state over an in-memory store and mock services.
pub fn create_default_state(config: SagaConfig) -> (Arc<AppState>, MockServices) {
    let services = MockServices::new();
    let state = create_state(Stores::in_memory(InMemoryStore::new()), &services, config);
    (state, services)
}
