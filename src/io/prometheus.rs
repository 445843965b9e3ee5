//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine metrics in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::Pipeline;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a counter split by a `kind` label
fn write_labeled_counter(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    values: &[(&str, u64)],
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (kind, val) in values {
        let _ = writeln!(output, "{name}{{site=\"{site}\",kind=\"{kind}\"}} {val}");
    }
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(pipeline: &Pipeline, site_id: &str) -> String {
    let summary = pipeline.metrics().report(pipeline.tracked_devices(), pipeline.fence_count());
    let mut output = String::with_capacity(4096);

    write_batch_metrics(&mut output, site_id, &summary);
    write_point_metrics(&mut output, site_id, &summary);
    write_transition_metrics(&mut output, site_id, &summary);
    write_latency_metrics(&mut output, site_id, &summary);
    write_state_metrics(&mut output, site_id, &summary);

    output
}

fn write_batch_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_batches_total",
        "Batches ingested",
        MetricType::Counter,
        site,
        summary.batches_total,
    );
    write_metric(
        output,
        "geofence_batches_rejected_total",
        "Batches rejected before evaluation (empty or too large)",
        MetricType::Counter,
        site,
        summary.batches_rejected,
    );
    let _ = writeln!(output, "# HELP geofence_batches_per_sec Batches ingested per second");
    let _ = writeln!(output, "# TYPE geofence_batches_per_sec gauge");
    let _ = writeln!(
        output,
        "geofence_batches_per_sec{{site=\"{site}\"}} {:.2}",
        summary.batches_per_sec
    );
}

fn write_point_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_points_total",
        "Points received",
        MetricType::Counter,
        site,
        summary.points_total,
    );
    write_labeled_counter(
        output,
        "geofence_points_outcome_total",
        "Points by Position Tracker outcome",
        site,
        &[
            ("accepted", summary.points_accepted),
            ("stale", summary.points_stale),
            ("rejected", summary.points_rejected),
        ],
    );
}

fn write_transition_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_labeled_counter(
        output,
        "geofence_transitions_total",
        "Fence transitions emitted",
        site,
        &[("entered", summary.transitions_entered), ("exited", summary.transitions_exited)],
    );
    write_metric(
        output,
        "geofence_fence_errors_total",
        "Per-fence evaluation failures",
        MetricType::Counter,
        site,
        summary.fence_errors,
    );
}

fn write_latency_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "geofence_ingest_latency_us",
        "Batch ingest latency in microseconds",
        site,
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.avg_ingest_latency_us,
    );
    write_metric(
        output,
        "geofence_ingest_latency_p99_us",
        "99th percentile batch ingest latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "geofence_ingest_latency_max_us",
        "Maximum batch ingest latency",
        MetricType::Gauge,
        site,
        summary.max_ingest_latency_us,
    );
}

fn write_state_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_tracked_devices",
        "Devices with a latest position",
        MetricType::Gauge,
        site,
        summary.tracked_devices as u64,
    );
    write_metric(
        output,
        "geofence_fences",
        "Fences in the index",
        MetricType::Gauge,
        site,
        summary.fences as u64,
    );
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    pipeline: Arc<Pipeline>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut response =
                text_response(StatusCode::OK, format_prometheus_metrics(&pipeline, &site_id));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            Ok(response)
        }
        (&Method::GET, "/health") => Ok(text_response(StatusCode::OK, "ok".to_string())),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found".to_string())),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    pipeline: Arc<Pipeline>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let pipeline = pipeline.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let pipeline = pipeline.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, pipeline, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fence::{FenceDraft, FenceShape};
    use crate::domain::types::{AssetId, Coordinate, DeviceId, TrackingPoint};
    use crate::infra::config::Config;
    use crate::infra::metrics::Metrics;
    use crate::services::fence_index::CandidatePolicy;
    use chrono::Utc;

    #[test]
    fn test_format_prometheus_metrics() {
        let config = Config::default().with_candidate_policy(CandidatePolicy::AllFences);
        let pipeline = Pipeline::new(&config, Arc::new(Metrics::new()));
        pipeline
            .create_fence(FenceDraft::new(
                "Depot",
                FenceShape::Circle { center: Coordinate::new(0.0, 0.0), radius_m: 50.0 },
            ))
            .unwrap();
        let point =
            TrackingPoint::new(DeviceId::new("d1"), AssetId::new("a1"), 0.0, 0.0, Utc::now());
        pipeline.ingest(&AssetId::new("a1"), vec![point]).unwrap();

        let output = format_prometheus_metrics(&pipeline, "north");

        assert!(output.contains("geofence_batches_total{site=\"north\"} 1"));
        assert!(output.contains("geofence_points_outcome_total{site=\"north\",kind=\"accepted\"} 1"));
        assert!(output.contains("geofence_transitions_total{site=\"north\",kind=\"entered\"} 1"));
        assert!(output.contains("geofence_ingest_latency_us_bucket{site=\"north\""));
        assert!(output.contains("geofence_tracked_devices{site=\"north\"} 1"));
        assert!(output.contains("geofence_fences{site=\"north\"} 1"));
    }
}
