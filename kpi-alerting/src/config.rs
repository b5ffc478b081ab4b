use std::env;

/// Process configuration, read once at startup. Mirrors stream-processor's
/// config.rs: no external config crate, env vars read directly.
pub struct Config {
    pub database_url: String,
    pub metrics_addr: String,
    pub interval_seconds: u64,
    pub kpi: String,
    pub baseline_days: i64,
    pub threshold_pct: f64,
    pub min_baseline: f64,
    pub lookback_minutes: i64,
    pub current_window_minutes: i64,
    pub duration_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            metrics_addr: env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:9091".to_string()),
            interval_seconds: env::var("INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            kpi: env::var("KPI").unwrap_or_else(|_| "revenue".to_string()),
            baseline_days: env::var("BASELINE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            threshold_pct: env::var("THRESHOLD_PCT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.3),
            min_baseline: env::var("MIN_BASELINE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            lookback_minutes: env::var("LOOKBACK_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            current_window_minutes: env::var("CURRENT_WINDOW_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            duration_minutes: env::var("DURATION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}
