//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine counters in Prometheus text format at /metrics and the
//! latest cycle report as JSON at /snapshot. Uses hyper for the HTTP server.

use crate::domain::CycleReport;
use crate::infra::metrics::{Metrics, MetricsSummary};
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

/// Write a simple metric (counter or gauge) with session label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    session: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{session=\"{session}\"}} {val}");
}

/// Write a gauge metric with f64 value
fn write_gauge_f64(output: &mut String, name: &str, help: &str, session: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{session=\"{session}\"}} {val:.6}");
}

/// Escape a label value for the text exposition format
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, session: &str) -> String {
    let summary = metrics.peek();
    let session = escape_label_value(session);
    let session = session.as_str();
    let mut output = String::with_capacity(4096);

    write_feed_metrics(&mut output, session, &summary);
    write_lap_metrics(&mut output, session, &summary);
    write_queue_metrics(&mut output, session, &summary);

    output
}

fn write_feed_metrics(output: &mut String, session: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "pit_strategy_batches_total",
        "Feed batches processed",
        MetricType::Counter,
        session,
        summary.batches_total,
    );
    write_metric(
        output,
        "pit_strategy_empty_batches_total",
        "Feed batches with no rows",
        MetricType::Counter,
        session,
        summary.empty_batches,
    );
    write_metric(
        output,
        "pit_strategy_feed_errors_total",
        "Failed feed fetches",
        MetricType::Counter,
        session,
        summary.feed_errors,
    );
    write_metric(
        output,
        "pit_strategy_rows_total",
        "Feed rows received",
        MetricType::Counter,
        session,
        summary.rows_total,
    );
    write_metric(
        output,
        "pit_strategy_rows_malformed_total",
        "Feed rows skipped as malformed",
        MetricType::Counter,
        session,
        summary.rows_malformed,
    );
    write_metric(
        output,
        "pit_strategy_batch_latency_avg_us",
        "Average batch processing time in microseconds",
        MetricType::Gauge,
        session,
        summary.avg_batch_latency_us,
    );
    write_metric(
        output,
        "pit_strategy_batch_latency_max_us",
        "Maximum batch processing time in microseconds",
        MetricType::Gauge,
        session,
        summary.max_batch_latency_us,
    );
    write_gauge_f64(
        output,
        "pit_strategy_batches_per_min",
        "Batches processed per minute",
        session,
        summary.batches_per_min,
    );
}

fn write_lap_metrics(output: &mut String, session: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "pit_strategy_laps_recorded_total",
        "Laps accepted into baselines and stints",
        MetricType::Counter,
        session,
        summary.laps_recorded,
    );
    write_metric(
        output,
        "pit_strategy_laps_rejected_total",
        "Laps below the minimum valid lap time",
        MetricType::Counter,
        session,
        summary.laps_rejected,
    );
    write_metric(
        output,
        "pit_strategy_laps_repeated_total",
        "Lap reports repeated across cycles",
        MetricType::Counter,
        session,
        summary.laps_repeated,
    );
    write_metric(
        output,
        "pit_strategy_pit_entries_total",
        "Pit-entry transitions observed",
        MetricType::Counter,
        session,
        summary.pit_entries,
    );
    write_metric(
        output,
        "pit_strategy_stints_scored_total",
        "Stints scored at pit entry",
        MetricType::Counter,
        session,
        summary.stints_scored,
    );
    write_metric(
        output,
        "pit_strategy_stints_skipped_total",
        "Pit entries without a scoreable stint",
        MetricType::Counter,
        session,
        summary.stints_skipped,
    );
}

fn write_queue_metrics(output: &mut String, session: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "pit_strategy_queue_depth",
        "Karts waiting in the pit lane",
        MetricType::Gauge,
        session,
        summary.queue_depth,
    );
    write_metric(
        output,
        "pit_strategy_karts_queued_total",
        "Karts added to the pit queue",
        MetricType::Counter,
        session,
        summary.karts_queued,
    );
    write_metric(
        output,
        "pit_strategy_karts_released_total",
        "Karts taken out of the pit queue",
        MetricType::Counter,
        session,
        summary.karts_released,
    );
    write_metric(
        output,
        "pit_strategy_queue_evictions_total",
        "Queue entries evicted at capacity",
        MetricType::Counter,
        session,
        summary.queue_evictions,
    );
    write_metric(
        output,
        "pit_strategy_queue_duplicates_total",
        "Enqueue attempts for a kart already queued",
        MetricType::Counter,
        session,
        summary.queue_duplicates,
    );
    write_metric(
        output,
        "pit_strategy_box_now_total",
        "Transitions into a box-now verdict",
        MetricType::Counter,
        session,
        summary.box_now_verdicts,
    );
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    session: Arc<String>,
    reports: watch::Receiver<Option<CycleReport>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &session);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::GET, "/snapshot") => Ok(snapshot_response(&reports.borrow())),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

fn snapshot_response(latest: &Option<CycleReport>) -> Response<Full<Bytes>> {
    match latest {
        Some(report) => match serde_json::to_string(report) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                error!(error = %e, "snapshot_serialize_failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"ok":false,"error":"serialize_failed"}"#.to_string(),
                )
            }
        },
        None => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"ok":false,"error":"no_cycle_yet"}"#.to_string(),
        ),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    session: String,
    reports: watch::Receiver<Option<CycleReport>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let session = Arc::new(session);

    info!(port = %port, session = %session, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let session = session.clone();
                        let reports = reports.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let session = session.clone();
                                let reports = reports.clone();
                                async move { handle_request(req, metrics, session, reports).await }
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
    use crate::domain::{CycleStats, Verdict};
    use std::time::Instant;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_batch(6, Instant::now());
        metrics.record_row_malformed();
        metrics.record_pit_entry(true);
        metrics.set_queue_depth(2);

        let output = format_prometheus_metrics(&metrics, "sprint");

        assert!(output.contains("pit_strategy_batches_total{session=\"sprint\"} 1"));
        assert!(output.contains("pit_strategy_rows_total{session=\"sprint\"} 6"));
        assert!(output.contains("pit_strategy_rows_malformed_total{session=\"sprint\"} 1"));
        assert!(output.contains("pit_strategy_stints_scored_total{session=\"sprint\"} 1"));
        assert!(output.contains("pit_strategy_queue_depth{session=\"sprint\"} 2"));
        assert!(output.contains("# TYPE pit_strategy_queue_depth gauge"));
    }

    #[test]
    fn test_session_label_escaped() {
        let metrics = Metrics::new();
        metrics.set_queue_depth(1);

        let output = format_prometheus_metrics(&metrics, "night \"B\"\\2\nrun");

        assert!(output.contains(r#"pit_strategy_queue_depth{session="night \"B\"\\2\nrun"} 1"#));
        assert!(output.lines().all(|line| line.starts_with('#') || line.starts_with("pit_strategy_")));
    }

    #[test]
    fn test_snapshot_response_status() {
        assert_eq!(snapshot_response(&None).status(), StatusCode::SERVICE_UNAVAILABLE);

        let report = CycleReport {
            session: "sprint".to_string(),
            cycle: 3,
            ts: 0,
            queue: Vec::new(),
            verdict: Verdict::StayOut,
            stats: CycleStats::default(),
        };
        assert_eq!(snapshot_response(&Some(report)).status(), StatusCode::OK);
    }
}
