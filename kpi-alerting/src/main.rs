mod config;
mod detector;

use anyhow::Context;
use config::Config;
use detector::Detector;
use kpi_observability::AlertMetrics;
use kpi_store::{AlertStore, Kpi};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Config::from_env().context("loading configuration")?;
    let kpi = Kpi::try_from(config.kpi.as_str()).context("parsing KPI")?;

    let metrics = AlertMetrics::new();
    let metrics_addr = config.metrics_addr.parse().context("parsing METRICS_ADDR")?;
    let metrics_registry = metrics.registry().clone();
    tokio::spawn(async move {
        if let Err(err) = kpi_observability::serve(metrics_addr, metrics_registry).await {
            error!(?err, "metrics server exited");
        }
    });

    let store = AlertStore::connect(&config.database_url)
        .await
        .context("connecting to alert store")?;

    let detector = Detector {
        kpi,
        baseline_days: config.baseline_days,
        threshold_pct: config.threshold_pct,
        min_baseline: config.min_baseline,
        lookback_minutes: config.lookback_minutes,
        current_window_minutes: config.current_window_minutes,
        duration_minutes: config.duration_minutes,
    };

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(config.interval_seconds));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("alerting shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                metrics.ticks_total.inc();
                match detector.tick(&store).await {
                    Ok(true) => {
                        metrics.alerts_emitted_total.inc();
                        info!(kpi = config.kpi, "anomaly alert emitted");
                    }
                    Ok(false) => {}
                    Err(err) => {
                        metrics.ticks_errored_total.inc();
                        error!(?err, "detector tick failed, continuing");
                    }
                }
            }
        }
    }
}
