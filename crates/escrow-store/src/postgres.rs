use async_trait::async_trait;
use common::{EscrowId, Money, OrderId, UserId, Version};
use domain::{Escrow, EscrowStatus, PaymentRecord, WebhookRecord};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    repository::{EscrowRepository, PaymentRepository, WebhookRepository},
};

const ESCROW_PRIMARY_KEY: &str = "escrows_pkey";
const PAYMENTS_SUCCEEDED_UNIQUE: &str = "payments_succeeded_unique";

/// PostgreSQL-backed repositories.
///
/// Escrows are stored as a JSONB document plus the scalar columns needed for
/// lookups and for the conditional version check.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_escrow(row: PgRow) -> Result<Escrow> {
        let document: serde_json::Value = row.try_get("document")?;
        let mut escrow: Escrow = serde_json::from_value(document)?;
        escrow.set_version(Version::new(row.try_get("version")?));
        Ok(escrow)
    }

    fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
        let action: String = row.try_get("action")?;
        let status: String = row.try_get("status")?;

        Ok(PaymentRecord {
            id: row.try_get("id")?,
            escrow_id: EscrowId::from_uuid(row.try_get::<Uuid, _>("escrow_id")?),
            provider: row.try_get("provider")?,
            intent_id: row.try_get("intent_id")?,
            action: action.parse().map_err(StoreError::Corrupt)?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            status: status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_webhook(row: PgRow) -> Result<WebhookRecord> {
        Ok(WebhookRecord {
            id: row.try_get("id")?,
            source: row.try_get("source")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            processed: row.try_get("processed")?,
            received_at: row.try_get("received_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }

    async fn list_escrows_where(&self, column: &str, value: &str) -> Result<Vec<Escrow>> {
        let sql = format!(
            "SELECT version, document FROM escrows WHERE {column} = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::row_to_escrow).collect()
    }
}

fn is_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl EscrowRepository for PostgresStore {
    #[tracing::instrument(skip(self, escrow), fields(escrow_id = %escrow.id()))]
    async fn insert(&self, escrow: &mut Escrow) -> Result<()> {
        if escrow.version() != Version::initial() {
            return Err(StoreError::ConcurrencyConflict {
                escrow_id: escrow.id(),
                expected: escrow.version(),
                actual: Version::initial(),
            });
        }

        let mut stored = escrow.clone();
        stored.set_version(Version::first());
        let document = serde_json::to_value(&stored)?;

        sqlx::query(
            r#"
            INSERT INTO escrows (id, order_id, buyer_id, seller_id, status, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stored.id().as_uuid())
        .bind(stored.order_id().map(OrderId::as_str))
        .bind(stored.buyer_id().as_str())
        .bind(stored.seller_id().as_str())
        .bind(stored.status().as_str())
        .bind(stored.version().as_i64())
        .bind(document)
        .bind(stored.created_at())
        .bind(stored.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, ESCROW_PRIMARY_KEY) {
                return StoreError::Duplicate(format!("escrow {}", escrow.id()));
            }
            StoreError::Database(e)
        })?;

        escrow.set_version(Version::first());
        Ok(())
    }

    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>> {
        let row = sqlx::query("SELECT version, document FROM escrows WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_escrow).transpose()
    }

    #[tracing::instrument(skip(self, escrow), fields(escrow_id = %escrow.id(), version = %escrow.version()))]
    async fn update(&self, escrow: &mut Escrow) -> Result<()> {
        let expected = escrow.version();
        let mut stored = escrow.clone();
        stored.set_version(expected.next());
        let document = serde_json::to_value(&stored)?;

        let result = sqlx::query(
            r#"
            UPDATE escrows
            SET order_id = $2, status = $3, version = $4, document = $5, updated_at = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(stored.id().as_uuid())
        .bind(stored.order_id().map(OrderId::as_str))
        .bind(stored.status().as_str())
        .bind(stored.version().as_i64())
        .bind(document)
        .bind(stored.updated_at())
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM escrows WHERE id = $1")
                    .bind(escrow.id().as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    escrow_id: escrow.id(),
                    expected,
                    actual: Version::new(actual),
                },
                None => StoreError::NotFound(escrow.id()),
            });
        }

        escrow.set_version(stored.version());
        Ok(())
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Escrow>> {
        Ok(self
            .list_escrows_where("order_id", order_id.as_str())
            .await?
            .into_iter()
            .next())
    }

    async fn list_by_buyer(&self, buyer_id: &UserId) -> Result<Vec<Escrow>> {
        self.list_escrows_where("buyer_id", buyer_id.as_str()).await
    }

    async fn list_by_seller(&self, seller_id: &UserId) -> Result<Vec<Escrow>> {
        self.list_escrows_where("seller_id", seller_id.as_str()).await
    }

    async fn list_by_status(&self, status: EscrowStatus) -> Result<Vec<Escrow>> {
        self.list_escrows_where("status", status.as_str()).await
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    #[tracing::instrument(skip(self, payment), fields(escrow_id = %payment.escrow_id, action = %payment.action))]
    async fn record(&self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, escrow_id, provider, intent_id, action, amount_cents, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.escrow_id.as_uuid())
        .bind(&payment.provider)
        .bind(&payment.intent_id)
        .bind(payment.action.as_str())
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, PAYMENTS_SUCCEEDED_UNIQUE) {
                return StoreError::Duplicate(format!(
                    "{} {} for intent {}",
                    payment.provider, payment.action, payment.intent_id
                ));
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn list_for_escrow(&self, escrow_id: EscrowId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, escrow_id, provider, intent_id, action, amount_cents, currency, status, created_at
            FROM payments
            WHERE escrow_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(escrow_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn find_by_intent(&self, provider: &str, intent_id: &str) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, escrow_id, provider, intent_id, action, amount_cents, currency, status, created_at
            FROM payments
            WHERE provider = $1 AND intent_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(provider)
        .bind(intent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }
}

#[async_trait]
impl WebhookRepository for PostgresStore {
    #[tracing::instrument(skip(self, record), fields(source = %record.source, event_id = %record.event_id))]
    async fn insert_if_absent(&self, record: &WebhookRecord) -> Result<Option<WebhookRecord>> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhooks (id, source, event_id, event_type, payload, processed, received_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source, event_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.source)
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.processed)
        .bind(record.received_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(None);
        }

        self.find(&record.source, &record.event_id)
            .await?
            .map(Some)
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "webhook {}/{} conflicted but is missing",
                    record.source, record.event_id
                ))
            })
    }

    async fn find(&self, source: &str, event_id: &str) -> Result<Option<WebhookRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, source, event_id, event_type, payload, processed, received_at, processed_at
            FROM webhooks
            WHERE source = $1 AND event_id = $2
            "#,
        )
        .bind(source)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_webhook).transpose()
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE webhooks SET processed = TRUE, processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::WebhookNotFound(id));
        }
        Ok(())
    }
}
