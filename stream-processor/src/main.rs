mod config;

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use config::Config;
use futures_util::StreamExt;
use kpi_domain::{decode, Aggregates, BucketMetrics, DedupeCache, Event, SessionEventType, Topic};
use kpi_observability::IngestMetrics;
use kpi_store::{KpiStore, StoreError};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Config::from_env().context("loading configuration")?;
    let metrics = IngestMetrics::new();
    let metrics_addr = config.metrics_addr.parse().context("parsing METRICS_ADDR")?;
    let metrics_registry = metrics.registry().clone();
    tokio::spawn(async move {
        if let Err(err) = kpi_observability::serve(metrics_addr, metrics_registry).await {
            error!(?err, "metrics server exited");
        }
    });

    // Store pool -> consumer -> flush task, strict startup order; torn
    // down in reverse on shutdown.
    let store = KpiStore::connect(&config.database_url)
        .await
        .context("connecting to KPI store")?;

    let consumer: StreamConsumer = rdkafka::ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        .set("group.id", &config.kafka_group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        .create()
        .context("creating kafka consumer")?;
    consumer
        .subscribe(&[&config.kafka_orders_topic, &config.kafka_sessions_topic])
        .context("subscribing to topics")?;

    let aggregates = Arc::new(Aggregates::new());

    let flush_store = store.clone();
    let flush_aggregates = aggregates.clone();
    let flush_interval = StdDuration::from_secs(config.flush_interval_seconds);
    let flush_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let (minute, hour) = flush_aggregates.drain();
            if minute.is_empty() && hour.is_empty() {
                continue;
            }
            if let Err(err) = flush_store.flush(minute, hour).await {
                error!(?err, "kpi flush failed");
            }
        }
    });

    let orders_topic = config.kafka_orders_topic.clone();
    let sessions_topic = config.kafka_sessions_topic.clone();
    let mut dedupe = DedupeCache::new(ChronoDuration::seconds(config.dedupe_ttl_seconds));
    let mut processed: u64 = 0;

    let run_result = run_consume_loop(
        &consumer,
        &orders_topic,
        &sessions_topic,
        &store,
        &aggregates,
        &mut dedupe,
        &metrics,
        config.log_every_n,
        &mut processed,
    )
    .await;

    flush_task.abort();
    info!(processed, "stream processor shutting down");
    run_result
}

#[allow(clippy::too_many_arguments)]
async fn run_consume_loop(
    consumer: &StreamConsumer,
    orders_topic: &str,
    sessions_topic: &str,
    store: &KpiStore,
    aggregates: &Aggregates,
    dedupe: &mut DedupeCache,
    metrics: &IngestMetrics,
    log_every_n: u64,
    processed: &mut u64,
) -> anyhow::Result<()> {
    let mut stream = consumer.stream();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
            message = stream.next() => {
                let Some(message) = message else { return Ok(()) };
                let message = message.context("kafka consumer error")?;
                let topic = if message.topic() == orders_topic {
                    Topic::Orders
                } else if message.topic() == sessions_topic {
                    Topic::Sessions
                } else {
                    warn!(topic = message.topic(), "message on unrecognized topic, dropping");
                    continue;
                };
                let Some(Ok(payload)) = message.payload_view::<str>() else {
                    warn!("message without a valid UTF-8 payload, dropping");
                    continue;
                };

                match decode(payload.as_bytes(), topic) {
                    Ok(event) => {
                        match handle_event(event, store, aggregates, dedupe, metrics).await {
                            Ok(true) => {
                                *processed += 1;
                                if *processed % log_every_n == 0 {
                                    info!(processed, "processed events");
                                }
                                if *processed % (log_every_n * 5) == 0 {
                                    dedupe.cleanup(Utc::now());
                                }
                            }
                            Ok(false) => {}
                            Err(StoreError::Fatal(source)) => return Err(StoreError::Fatal(source).into()),
                            Err(err) => {
                                metrics.store_error_total.inc();
                                error!(?err, "store error processing event, continuing");
                            }
                        }
                    }
                    Err(err) => {
                        warn!(?err, "dropping malformed message");
                    }
                }
            }
        }
    }
}

/// Decode → dedupe check → raw insert → (conditional) aggregate
/// contribution, strictly sequential for a single event. Returns whether
/// the event was newly persisted (and therefore counted as processed).
async fn handle_event(
    event: Event,
    store: &KpiStore,
    aggregates: &Aggregates,
    dedupe: &mut DedupeCache,
    metrics: &IngestMetrics,
) -> Result<bool, StoreError> {
    let now = Utc::now();
    if dedupe.seen(event.event_id(), now) {
        metrics.duplicate_total.inc();
        return Ok(false);
    }

    let processing_latency = (now - event.received_at()).num_milliseconds().max(0) as f64 / 1000.0;
    metrics.processing_latency_seconds.observe(processing_latency);

    let inserted = match event {
        Event::Order(order) => {
            let inserted = store.insert_order(&order, now).await?;
            if inserted {
                aggregates.add(order.event_time, BucketMetrics::order(order.amount));
            }
            inserted
        }
        Event::Session(session) => {
            let inserted = store.insert_session(&session, now).await?;
            if inserted {
                let delta = match session.event_type {
                    SessionEventType::View => BucketMetrics::view(),
                    SessionEventType::Checkout => BucketMetrics::checkout(),
                    SessionEventType::Purchase => BucketMetrics::purchase(),
                };
                aggregates.add(session.event_time, delta);
            }
            inserted
        }
    };
    if inserted {
        metrics.processed_total.inc();
    } else {
        metrics.duplicate_total.inc();
    }
    Ok(inserted)
}
