use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::Row;

use crate::error::{classify, StoreError, StoreResult};

/// Closed whitelist of KPI columns a bucket can be queried or alerted on.
/// The column name that ever reaches a SQL string is always one of these
/// `&'static str` literals chosen by a `match` — never the caller's raw
/// input — so the whitelist is enforced before interpolation by
/// construction, not by a runtime check an implementer could forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kpi {
    Revenue,
    OrderCount,
    SessionCount,
    CheckoutCount,
    PurchaseCount,
}

impl Kpi {
    pub fn as_column(&self) -> &'static str {
        match self {
            Kpi::Revenue => "revenue",
            Kpi::OrderCount => "order_count",
            Kpi::SessionCount => "session_count",
            Kpi::CheckoutCount => "checkout_count",
            Kpi::PurchaseCount => "purchase_count",
        }
    }
}

impl TryFrom<&str> for Kpi {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "revenue" => Ok(Kpi::Revenue),
            "order_count" => Ok(Kpi::OrderCount),
            "session_count" => Ok(Kpi::SessionCount),
            "checkout_count" => Ok(Kpi::CheckoutCount),
            "purchase_count" => Ok(Kpi::PurchaseCount),
            other => Err(StoreError::UnknownKpi(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Read/write gateway for the detector loop. Runs in its own process with
/// its own pool — no in-memory communication with the ingest side.
#[derive(Clone)]
pub struct AlertStore {
    pool: PgPool,
}

impl AlertStore {
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
            CREATE TABLE IF NOT EXISTS alerts (
                id BIGSERIAL PRIMARY KEY,
                bucket TIMESTAMPTZ NOT NULL,
                kpi TEXT NOT NULL,
                current_value DOUBLE PRECISION NOT NULL,
                baseline_value DOUBLE PRECISION NOT NULL,
                delta_pct DOUBLE PRECISION NOT NULL,
                direction TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (bucket, kpi)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// The most recent `count` minute buckets present in `kpi_minute`
    /// within `now - lookback_minutes`, ascending by time. Fewer than
    /// `count` are returned if not enough data exists.
    pub async fn latest_buckets(
        &self,
        lookback_minutes: i64,
        count: i64,
    ) -> StoreResult<Vec<DateTime<Utc>>> {
        let cutoff = Utc::now() - Duration::minutes(lookback_minutes);
        let rows = sqlx::query(
            r#"
            SELECT bucket FROM kpi_minute
            WHERE bucket >= $1
            ORDER BY bucket DESC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(count)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        let mut buckets: Vec<DateTime<Utc>> = rows
            .into_iter()
            .map(|row| row.get::<DateTime<Utc>, _>("bucket"))
            .collect();
        buckets.reverse();
        Ok(buckets)
    }

    /// Mean of `kpi` over the `window_minutes` buckets ending at `bucket`
    /// (inclusive). `None` if any required bucket is missing or the
    /// window is empty.
    pub async fn smoothed_current(
        &self,
        bucket: DateTime<Utc>,
        kpi: Kpi,
        window_minutes: i64,
    ) -> StoreResult<Option<f64>> {
        if window_minutes == 0 {
            return Ok(None);
        }
        let start = bucket - Duration::minutes(window_minutes - 1);
        let column = kpi.as_column();
        let query = format!(
            "SELECT {column} AS value FROM kpi_minute WHERE bucket >= $1 AND bucket <= $2 ORDER BY bucket"
        );
        let rows = sqlx::query(&query)
            .bind(start)
            .bind(bucket)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        if (rows.len() as i64) < window_minutes {
            return Ok(None);
        }
        let sum: f64 = rows.iter().map(|row| row.get::<f64, _>("value")).sum();
        Ok(Some(sum / window_minutes as f64))
    }

    /// Mean of historical `kpi` values over `[bucket - baseline_days,
    /// bucket)` matching hour-of-day and minute-of-hour; additionally
    /// matches day-of-week when `baseline_days >= 7`.
    pub async fn baseline(
        &self,
        bucket: DateTime<Utc>,
        kpi: Kpi,
        baseline_days: i64,
    ) -> StoreResult<Option<f64>> {
        let start = bucket - Duration::days(baseline_days);
        let column = kpi.as_column();
        let query = if baseline_days >= 7 {
            format!(
                r#"
                SELECT AVG({column}) AS value FROM kpi_minute
                WHERE bucket >= $1 AND bucket < $2
                  AND EXTRACT(DOW FROM bucket) = EXTRACT(DOW FROM $2::timestamptz)
                  AND EXTRACT(HOUR FROM bucket) = EXTRACT(HOUR FROM $2::timestamptz)
                  AND EXTRACT(MINUTE FROM bucket) = EXTRACT(MINUTE FROM $2::timestamptz)
                "#
            )
        } else {
            format!(
                r#"
                SELECT AVG({column}) AS value FROM kpi_minute
                WHERE bucket >= $1 AND bucket < $2
                  AND EXTRACT(HOUR FROM bucket) = EXTRACT(HOUR FROM $2::timestamptz)
                  AND EXTRACT(MINUTE FROM bucket) = EXTRACT(MINUTE FROM $2::timestamptz)
                "#
            )
        };
        let row = sqlx::query(&query)
            .bind(start)
            .bind(bucket)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.try_get::<Option<f64>, _>("value").map_err(classify)?)
    }

    /// Insert-if-absent on `(bucket, kpi)`. Returns whether a row was
    /// newly written.
    pub async fn insert_alert(
        &self,
        bucket: DateTime<Utc>,
        kpi: Kpi,
        current: f64,
        baseline: f64,
        delta_pct: f64,
        direction: Direction,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (bucket, kpi, current_value, baseline_value, delta_pct, direction)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (bucket, kpi) DO NOTHING
            "#,
        )
        .bind(bucket)
        .bind(kpi.as_column())
        .bind(current)
        .bind(baseline)
        .bind(delta_pct)
        .bind(direction.as_str())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() == 1)
    }
}
