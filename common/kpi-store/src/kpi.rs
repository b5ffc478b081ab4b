use chrono::{DateTime, Utc};
use kpi_domain::{BucketMap, OrderEvent, SessionEvent, SessionEventType};
use sqlx::PgPool;

use crate::error::{classify, StoreError, StoreResult};

/// Idempotent raw-event insert plus additive aggregate flush over
/// Postgres. A concrete struct over `PgPool`, not a trait — the teacher's
/// services address `PgPool` directly from `AppState` rather than going
/// through a repository trait, and this gateway has exactly one backing
/// implementation.
#[derive(Clone)]
pub struct KpiStore {
    pool: PgPool,
}

impl KpiStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(classify)?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                order_id TEXT PRIMARY KEY,
                customer_id TEXT,
                amount DOUBLE PRECISION NOT NULL,
                currency TEXT NOT NULL,
                channel TEXT,
                event_time TIMESTAMPTZ NOT NULL,
                received_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                event_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                user_id TEXT,
                channel TEXT,
                event_time TIMESTAMPTZ NOT NULL,
                received_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        for table in ["kpi_minute", "kpi_hour"] {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    bucket TIMESTAMPTZ PRIMARY KEY,
                    revenue DOUBLE PRECISION NOT NULL DEFAULT 0,
                    order_count BIGINT NOT NULL DEFAULT 0,
                    session_count BIGINT NOT NULL DEFAULT 0,
                    checkout_count BIGINT NOT NULL DEFAULT 0,
                    purchase_count BIGINT NOT NULL DEFAULT 0,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#
            );
            sqlx::query(&ddl).execute(&self.pool).await.map_err(classify)?;
        }
        Ok(())
    }

    /// Insert-if-absent. Returns whether a row was newly written; the
    /// caller gates the aggregate contribution on this boolean, which is
    /// the linchpin of exactly-once-effect behavior under at-least-once
    /// delivery.
    pub async fn insert_order(
        &self,
        order: &OrderEvent,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (order_id, customer_id, amount, currency, channel, event_time, received_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.customer_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.channel)
        .bind(order.event_time)
        .bind(order.received_at)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_session(
        &self,
        session: &SessionEvent,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let event_type = match session.event_type {
            SessionEventType::View => "view",
            SessionEventType::Checkout => "checkout",
            SessionEventType::Purchase => "purchase",
        };
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (event_id, session_id, event_type, user_id, channel, event_time, received_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&session.event_id)
        .bind(&session.session_id)
        .bind(event_type)
        .bind(&session.user_id)
        .bind(&session.channel)
        .bind(session.event_time)
        .bind(session.received_at)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() == 1)
    }

    /// Batched additive upsert of drained aggregate deltas. Each map is
    /// flushed as one `UNNEST`-based multi-row statement, atomic across
    /// its own rows; the minute and hour batches are two separate
    /// statements (not a joint transaction), per spec.
    pub async fn flush(&self, minute: BucketMap, hour: BucketMap) -> StoreResult<()> {
        if !minute.is_empty() {
            self.flush_bucket_map("kpi_minute", minute).await?;
        }
        if !hour.is_empty() {
            self.flush_bucket_map("kpi_hour", hour).await?;
        }
        Ok(())
    }

    async fn flush_bucket_map(&self, table: &str, map: BucketMap) -> StoreResult<()> {
        let len = map.len();
        let mut buckets = Vec::with_capacity(len);
        let mut revenue = Vec::with_capacity(len);
        let mut order_count = Vec::with_capacity(len);
        let mut session_count = Vec::with_capacity(len);
        let mut checkout_count = Vec::with_capacity(len);
        let mut purchase_count = Vec::with_capacity(len);
        for (bucket, metrics) in map {
            buckets.push(bucket);
            revenue.push(metrics.revenue);
            order_count.push(metrics.order_count);
            session_count.push(metrics.session_count);
            checkout_count.push(metrics.checkout_count);
            purchase_count.push(metrics.purchase_count);
        }

        let query = format!(
            r#"
            INSERT INTO {table} (bucket, revenue, order_count, session_count, checkout_count, purchase_count, updated_at)
            SELECT b, r, oc, sc, cc, pc, NOW()
            FROM UNNEST($1::timestamptz[], $2::float8[], $3::bigint[], $4::bigint[], $5::bigint[], $6::bigint[])
                AS t(b, r, oc, sc, cc, pc)
            ON CONFLICT (bucket) DO UPDATE SET
                revenue = {table}.revenue + EXCLUDED.revenue,
                order_count = {table}.order_count + EXCLUDED.order_count,
                session_count = {table}.session_count + EXCLUDED.session_count,
                checkout_count = {table}.checkout_count + EXCLUDED.checkout_count,
                purchase_count = {table}.purchase_count + EXCLUDED.purchase_count,
                updated_at = NOW()
            "#
        );

        sqlx::query(&query)
            .bind(buckets)
            .bind(revenue)
            .bind(order_count)
            .bind(session_count)
            .bind(checkout_count)
            .bind(purchase_count)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
