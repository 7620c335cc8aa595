//! pit-strategy - pit-lane kart recommendation for endurance karting
//!
//! Polls a timing feed once per cycle, scores karts as they enter the pit
//! lane and tells the strategist whether the driver on track should box now.
//!
//! Module structure:
//! - `domain/` - Core types (LapEvent, PitQueueEntry, Verdict, pace)
//! - `io/` - External interfaces (feed sources, report egress, metrics HTTP)
//! - `services/` - Strategy logic (engine, baselines, stints, scoring, queue)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use pit_strategy::domain::CycleReport;
use pit_strategy::infra::{Config, FeedKind, Metrics};
use pit_strategy::io::{source, FeedSource, ReportEgress};
use pit_strategy::services::StrategyEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Pit strategy engine - box / stay-out calls from live timing
#[derive(Parser, Debug)]
#[command(name = "pit-strategy", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Replay a recorded session file (JSONL, one batch per line)
    #[arg(long, conflicts_with = "url")]
    replay: Option<String>,

    /// Poll a live timing endpoint
    #[arg(long)]
    url: Option<String>,

    /// Override the polling interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Process a single batch and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG overrides; default INFO, RUST_LOG=debug shows every lap
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "pit_strategy_starting");

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);
    if let Some(path) = &args.replay {
        config = config.with_replay_file(path);
    }
    if let Some(url) = &args.url {
        config = config.with_http_url(url);
    }
    if let Some(ms) = args.poll_ms {
        config = config.with_poll_interval_ms(ms);
    }
    config.validate()?;

    let feed_kind = match config.feed_kind() {
        FeedKind::Replay => "replay",
        FeedKind::Http => "http",
    };
    info!(
        config_file = %config.config_file(),
        session = %config.session_id(),
        feed = %feed_kind,
        poll_interval_ms = %config.poll_interval_ms(),
        baseline_window = %config.baseline_window(),
        min_lap_seconds = %config.min_lap_seconds(),
        rocket_threshold = %config.rocket_threshold(),
        lemon_threshold = %config.lemon_threshold(),
        box_threshold = %config.box_threshold(),
        queue_capacity = %config.queue_capacity(),
        driver_swap = ?config.driver_swap(),
        egress_file = %config.egress_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (report_tx, report_rx) = watch::channel::<Option<CycleReport>>(None);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_session = config.session_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = pit_strategy::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_session,
                report_rx,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Periodic metrics log
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    let mut feed = source::from_config(&config).await?;
    let egress = ReportEgress::new(config.egress_file());
    let mut engine = StrategyEngine::new(config.clone(), metrics.clone());
    info!(source = %feed.source_name(), "engine_started");

    run_session(&mut engine, feed.as_mut(), &egress, &report_tx, &metrics, &config, args.once)
        .await;

    let _ = shutdown_tx.send(true);
    metrics.report().log();
    info!(cycles = %engine.cycle(), queue = %engine.queue().len(), "pit_strategy_shutdown_complete");
    Ok(())
}

/// Pull, process and report one batch per tick until the feed ends or Ctrl+C
async fn run_session(
    engine: &mut StrategyEngine,
    feed: &mut dyn FeedSource,
    egress: &ReportEgress,
    report_tx: &watch::Sender<Option<CycleReport>>,
    metrics: &Metrics,
    config: &Config,
    once: bool,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms()));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("shutdown_signal_received");
                return;
            }
        }

        let fetched = tokio::select! {
            result = feed.next_batch() => result,
            _ = &mut ctrl_c => {
                info!("shutdown_signal_received");
                return;
            }
        };

        let rows = match fetched {
            Ok(Some(rows)) => rows,
            Ok(None) => {
                info!(source = %feed.source_name(), "feed_exhausted");
                return;
            }
            Err(e) => {
                // Treated as an empty cycle; state carries over
                metrics.record_feed_error();
                warn!(source = %feed.source_name(), error = %format!("{e:#}"), "feed_fetch_failed");
                Vec::new()
            }
        };

        let report = engine.process_batch(&rows);
        egress.write_report(&report);
        report_tx.send_replace(Some(report));

        if once {
            return;
        }
    }
}
