use std::env;

/// Process configuration, read once at startup. No external config crate
/// is used — none of the teacher's Rust services pull one in; the
/// Python original's `dynaconf`/`pydantic-settings` layer has no Rust
/// analogue in this workspace.
pub struct Config {
    pub kafka_bootstrap_servers: String,
    pub kafka_orders_topic: String,
    pub kafka_sessions_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub database_url: String,
    pub flush_interval_seconds: u64,
    pub dedupe_ttl_seconds: i64,
    pub log_every_n: u64,
    pub metrics_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            kafka_bootstrap_servers: env::var("KAFKA_BOOTSTRAP_SERVERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            kafka_orders_topic: env::var("KAFKA_ORDERS_TOPIC").unwrap_or_else(|_| "orders".to_string()),
            kafka_sessions_topic: env::var("KAFKA_SESSIONS_TOPIC")
                .unwrap_or_else(|_| "sessions".to_string()),
            kafka_group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "stream-processor".to_string()),
            kafka_auto_offset_reset: env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or_else(|_| "earliest".to_string()),
            database_url: env::var("DATABASE_URL")?,
            flush_interval_seconds: env::var("FLUSH_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            dedupe_ttl_seconds: env::var("DEDUPE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            log_every_n: env::var("LOG_EVERY_N")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200)
                .max(1),
            metrics_addr: env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
        })
    }
}
