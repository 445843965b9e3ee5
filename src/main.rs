//! Geofence gateway - batch geofence evaluation service
//!
//! Replays JSONL position batches through the engine and appends every
//! entry/exit transition to the egress file.
//!
//! Module structure:
//! - `domain/` - Core types (TrackingPoint, GeoFence, TransitionEvent)
//! - `services/` - Engine (geometry, registries, state stores, pipeline)
//! - `io/` - External interfaces (replay input, seed, egress, Prometheus)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use geofence_gateway::infra::{Config, Metrics};
use geofence_gateway::io::{load_seed, run_replay, Egress};
use geofence_gateway::services::Pipeline;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence gateway - evaluates position batches against geofences
#[derive(Parser, Debug)]
#[command(name = "geofence-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// JSONL batch file to replay ("-" or absent reads stdin)
    #[arg(short, long)]
    input: Option<String>,
}

async fn open_input(input: Option<&str>) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match input {
        None | Some("-") => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {path}"))?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-point visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "geofence-gateway starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        candidate_policy = %config.candidate_policy().as_str(),
        max_batch_points = %config.max_batch_points(),
        seed_file = ?config.seed_file(),
        egress_file = %config.egress_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let pipeline = Arc::new(Pipeline::new(&config, metrics));

    if let Some(seed_file) = config.seed_file() {
        load_seed(seed_file, &pipeline)?;
    }

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_pipeline = pipeline.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = geofence_gateway::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_pipeline,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Periodic metrics summary
    let report_pipeline = pipeline.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            report_pipeline
                .metrics()
                .report(report_pipeline.tracked_devices(), report_pipeline.fence_count())
                .log();
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let egress = Egress::new(config.egress_file());
    let reader = open_input(args.input.as_deref()).await?;
    run_replay(reader, &pipeline, &egress, shutdown_rx).await?;

    pipeline.metrics().report(pipeline.tracked_devices(), pipeline.fence_count()).log();
    info!("geofence-gateway shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_config_flag() {
        let args = Args::try_parse_from(["geofence-gateway", "--config", "config/prod.toml"]).unwrap();
        assert_eq!(args.config, "config/prod.toml");
        assert_eq!(args.input, None);
    }

    #[test]
    fn test_args_input_flag() {
        let args =
            Args::try_parse_from(["geofence-gateway", "-c", "a.toml", "--input", "batches.jsonl"]).unwrap();
        assert_eq!(args.input.as_deref(), Some("batches.jsonl"));
    }
}
