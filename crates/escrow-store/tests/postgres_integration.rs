//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p escrow-store --test postgres_integration
//! ```

use std::sync::Arc;

use common::{ListingId, Money, OrderId, UserId, Version};
use domain::{
    Escrow, EscrowStatus, HoldTerms, NewEscrow, PaymentAction, PaymentRecord, SYSTEM_ACTOR,
    WebhookRecord,
};
use escrow_store::{
    EscrowRepository, EscrowRepositoryExt, PaymentRepository, PaymentRepositoryExt, PostgresStore,
    StoreError, WebhookRepository,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_escrow_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE payments, webhooks, escrows")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn new_escrow(buyer: &str, seller: &str) -> Escrow {
    Escrow::open(
        NewEscrow {
            listing_id: ListingId::new("listing-1"),
            buyer_id: UserId::new(buyer),
            seller_id: UserId::new(seller),
            amount: Money::from_cents(25_000),
            currency: "USD".to_string(),
            hold_terms: HoldTerms::default(),
        },
        buyer,
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn insert_and_load_escrow_document() {
    let store = get_test_store().await;
    let mut escrow = new_escrow("buyer", "seller");

    store.insert(&mut escrow).await.unwrap();
    assert_eq!(escrow.version(), Version::first());

    let loaded = store.load(escrow.id()).await.unwrap();
    assert_eq!(loaded.id(), escrow.id());
    assert_eq!(loaded.version(), Version::first());
    assert_eq!(loaded.amount_total(), Money::from_cents(25_000));
    assert_eq!(loaded.event_kinds(), escrow.event_kinds());
}

#[tokio::test]
#[serial]
async fn duplicate_insert_is_rejected() {
    let store = get_test_store().await;
    let mut escrow = new_escrow("buyer", "seller");
    store.insert(&mut escrow).await.unwrap();

    let mut copy = escrow.clone();
    copy.set_version(Version::initial());
    let result = store.insert(&mut copy).await;
    assert!(matches!(result, Err(StoreError::Duplicate(_))));
}

#[tokio::test]
#[serial]
async fn conditional_update_detects_stale_writer() {
    let store = get_test_store().await;
    let mut escrow = new_escrow("buyer", "seller");
    store.insert(&mut escrow).await.unwrap();

    let mut first = store.load(escrow.id()).await.unwrap();
    let mut second = store.load(escrow.id()).await.unwrap();

    first.authorize("mock", "pi_1", SYSTEM_ACTOR).unwrap();
    store.update(&mut first).await.unwrap();
    assert_eq!(first.version(), Version::new(2));

    second.mark_failed(SYSTEM_ACTOR, "stale").unwrap();
    let result = store.update(&mut second).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
    ));

    let stored = store.load(escrow.id()).await.unwrap();
    assert_eq!(stored.status(), EscrowStatus::Authorized);
}

#[tokio::test]
#[serial]
async fn update_of_missing_escrow_is_not_found() {
    let store = get_test_store().await;
    let mut escrow = new_escrow("buyer", "seller");
    escrow.set_version(Version::first());

    let result = store.update(&mut escrow).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn lookups_use_indexed_columns() {
    let store = get_test_store().await;
    let mut a = new_escrow("alice", "sam");
    let mut b = new_escrow("bob", "sam");
    store.insert(&mut a).await.unwrap();
    store.insert(&mut b).await.unwrap();

    a.link_order(OrderId::new("ord_1")).unwrap();
    store.update(&mut a).await.unwrap();

    let found = store.find_by_order(&OrderId::new("ord_1")).await.unwrap();
    assert_eq!(found.map(|e| e.id()), Some(a.id()));

    let by_seller = store.list_by_seller(&UserId::new("sam")).await.unwrap();
    assert_eq!(by_seller.len(), 2);
    assert_eq!(by_seller[0].id(), a.id());

    let by_buyer = store.list_by_buyer(&UserId::new("bob")).await.unwrap();
    assert_eq!(by_buyer.len(), 1);

    let created = store.list_by_status(EscrowStatus::Created).await.unwrap();
    assert_eq!(created.len(), 2);
}

#[tokio::test]
#[serial]
async fn succeeded_payment_rows_are_unique_per_action() {
    let store = get_test_store().await;
    let mut escrow = new_escrow("buyer", "seller");
    store.insert(&mut escrow).await.unwrap();
    let amount = escrow.amount_total();

    let authorize = PaymentRecord::succeeded(
        escrow.id(),
        "mock",
        "pi_1",
        PaymentAction::Authorize,
        amount,
        "USD",
    );
    let capture = PaymentRecord::succeeded(
        escrow.id(),
        "mock",
        "pi_1",
        PaymentAction::Capture,
        amount,
        "USD",
    );
    store.record(&authorize).await.unwrap();
    store.record(&capture).await.unwrap();

    let failed_refund =
        PaymentRecord::failed(escrow.id(), "mock", "pi_1", PaymentAction::Refund, amount, "USD");
    store.record(&failed_refund).await.unwrap();

    let again = PaymentRecord::succeeded(
        escrow.id(),
        "mock",
        "pi_1",
        PaymentAction::Capture,
        amount,
        "USD",
    );
    assert!(matches!(
        store.record(&again).await,
        Err(StoreError::Duplicate(_))
    ));

    let rows = store.list_for_escrow(escrow.id()).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(
        store
            .find_succeeded("mock", "pi_1", PaymentAction::Refund)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        store
            .find_succeeded("mock", "pi_1", PaymentAction::Capture)
            .await
            .unwrap()
            .map(|p| p.id),
        Some(capture.id)
    );
}

#[tokio::test]
#[serial]
async fn webhook_insert_is_idempotent() {
    let store = get_test_store().await;
    let payload = serde_json::json!({"intent_id": "pi_1"});

    let first = WebhookRecord::received("mock", "evt_1", "payment.captured", payload.clone());
    assert!(store.insert_if_absent(&first).await.unwrap().is_none());

    let second = WebhookRecord::received("mock", "evt_1", "payment.captured", payload);
    let existing = store.insert_if_absent(&second).await.unwrap().unwrap();
    assert_eq!(existing.id, first.id);

    store.mark_processed(first.id).await.unwrap();
    let stored = store.find("mock", "evt_1").await.unwrap().unwrap();
    assert!(stored.processed);
    assert!(stored.processed_at.is_some());
}
