use axum::{routing::get, Router};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

/// Metrics for the stream processor binary.
#[derive(Clone)]
pub struct IngestMetrics {
    registry: Registry,
    pub processed_total: IntCounter,
    pub duplicate_total: IntCounter,
    pub store_error_total: IntCounter,
    pub consumer_lag: IntGauge,
    pub processing_latency_seconds: Histogram,
}

impl IngestMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let processed_total = IntCounter::new(
            "kpi_ingest_processed_total",
            "Events newly persisted and aggregated",
        )
        .unwrap();
        let duplicate_total = IntCounter::new(
            "kpi_ingest_duplicate_total",
            "Events dropped by the dedupe cache or the store's unique constraint",
        )
        .unwrap();
        let store_error_total = IntCounter::new(
            "kpi_ingest_store_error_total",
            "Transient or fatal store errors encountered while processing",
        )
        .unwrap();
        let consumer_lag = IntGauge::new(
            "kpi_ingest_consumer_lag",
            "Most recently observed partition lag",
        )
        .unwrap();
        let processing_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "kpi_ingest_processing_latency_seconds",
                "Time from event.received_at to processed_at",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .unwrap();
        registry.register(Box::new(processed_total.clone())).ok();
        registry.register(Box::new(duplicate_total.clone())).ok();
        registry.register(Box::new(store_error_total.clone())).ok();
        registry.register(Box::new(consumer_lag.clone())).ok();
        registry
            .register(Box::new(processing_latency_seconds.clone()))
            .ok();
        Self {
            registry,
            processed_total,
            duplicate_total,
            store_error_total,
            consumer_lag,
            processing_latency_seconds,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for the alert detector binary.
#[derive(Clone)]
pub struct AlertMetrics {
    registry: Registry,
    pub ticks_total: IntCounter,
    pub ticks_errored_total: IntCounter,
    pub alerts_emitted_total: IntCounter,
}

impl AlertMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let ticks_total = IntCounter::new("kpi_alert_ticks_total", "Detector ticks run").unwrap();
        let ticks_errored_total = IntCounter::new(
            "kpi_alert_ticks_errored_total",
            "Detector ticks that raised an error and were swallowed",
        )
        .unwrap();
        let alerts_emitted_total = IntCounter::new(
            "kpi_alert_alerts_emitted_total",
            "Alert rows newly inserted",
        )
        .unwrap();
        registry.register(Box::new(ticks_total.clone())).ok();
        registry
            .register(Box::new(ticks_errored_total.clone()))
            .ok();
        registry
            .register(Box::new(alerts_emitted_total.clone()))
            .ok();
        Self {
            registry,
            ticks_total,
            ticks_errored_total,
            alerts_emitted_total,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for AlertMetrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(registry: Registry) -> String {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    encoder.encode_to_string(&families).unwrap_or_default()
}

/// Spawn the shared `/healthz` + `/metrics` HTTP server used by both
/// binaries, mirroring `audit-consumer`'s metrics endpoint.
pub async fn serve(addr: SocketAddr, registry: Registry) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(move || render_metrics(registry.clone())));
    info!(%addr, "starting metrics server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
