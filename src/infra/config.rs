//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Where lap batches come from
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Replay,
    Http,
}

/// What to do when a kart on track reports a different driver than its stint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverSwapPolicy {
    /// Keep the laps, bind the stint to the latest driver
    Rebind,
    /// Drop the laps and start a fresh stint for the new driver
    Restart,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Timing session identifier, included in every report
    #[serde(default = "default_session_id")]
    pub id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { id: default_session_id() }
    }
}

fn default_session_id() -> String {
    "session".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaselineConfig {
    /// Number of recent valid laps kept per driver
    #[serde(default = "default_baseline_window")]
    pub window: usize,
    /// Laps shorter than this are timing glitches (track specific)
    #[serde(default = "default_min_lap_seconds")]
    pub min_lap_seconds: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { window: default_baseline_window(), min_lap_seconds: default_min_lap_seconds() }
    }
}

fn default_baseline_window() -> usize {
    10
}

fn default_min_lap_seconds() -> f64 {
    20.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StintConfig {
    #[serde(default = "default_driver_swap")]
    pub driver_swap: DriverSwapPolicy,
}

impl Default for StintConfig {
    fn default() -> Self {
        Self { driver_swap: default_driver_swap() }
    }
}

fn default_driver_swap() -> DriverSwapPolicy {
    DriverSwapPolicy::Rebind
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Scores below this are rockets (seconds, negative)
    #[serde(default = "default_rocket_threshold")]
    pub rocket_threshold: f64,
    /// Scores above this are lemons (seconds)
    #[serde(default = "default_lemon_threshold")]
    pub lemon_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rocket_threshold: default_rocket_threshold(),
            lemon_threshold: default_lemon_threshold(),
        }
    }
}

fn default_rocket_threshold() -> f64 {
    -0.2
}

fn default_lemon_threshold() -> f64 {
    0.15
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: default_queue_capacity() }
    }
}

fn default_queue_capacity() -> usize {
    12
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Queue head score below which the advice is to box now
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self { box_threshold: default_box_threshold() }
    }
}

fn default_box_threshold() -> f64 {
    -0.1
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_kind")]
    pub kind: FeedKind,
    /// JSONL file with one batch per line (replay mode)
    #[serde(default)]
    pub replay_file: Option<String>,
    /// Endpoint returning the live timing rows (http mode)
    #[serde(default)]
    pub http_url: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Status strings that mean "in the pit lane"
    #[serde(default = "default_pit_tokens")]
    pub pit_tokens: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            kind: default_feed_kind(),
            replay_file: None,
            http_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            pit_tokens: default_pit_tokens(),
        }
    }
}

fn default_feed_kind() -> FeedKind {
    FeedKind::Replay
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_pit_tokens() -> Vec<String> {
    vec!["PIT".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for cycle reports (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "reports.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub stint: StintConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    session_id: String,
    baseline_window: usize,
    min_lap_seconds: f64,
    driver_swap: DriverSwapPolicy,
    rocket_threshold: f64,
    lemon_threshold: f64,
    queue_capacity: usize,
    box_threshold: f64,
    feed_kind: FeedKind,
    replay_file: Option<String>,
    http_url: Option<String>,
    poll_interval_ms: u64,
    feed_timeout_ms: u64,
    pit_tokens: Vec<String>,
    egress_file: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            session_id: toml_config.session.id,
            baseline_window: toml_config.baseline.window,
            min_lap_seconds: toml_config.baseline.min_lap_seconds,
            driver_swap: toml_config.stint.driver_swap,
            rocket_threshold: toml_config.scoring.rocket_threshold,
            lemon_threshold: toml_config.scoring.lemon_threshold,
            queue_capacity: toml_config.queue.capacity,
            box_threshold: toml_config.strategy.box_threshold,
            feed_kind: toml_config.feed.kind,
            replay_file: toml_config.feed.replay_file,
            http_url: toml_config.feed.http_url,
            poll_interval_ms: toml_config.feed.poll_interval_ms,
            feed_timeout_ms: toml_config.feed.timeout_ms,
            pit_tokens: toml_config.feed.pit_tokens,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.baseline_window >= 3, "baseline.window must be at least 3");
        ensure!(self.queue_capacity >= 1, "queue.capacity must be at least 1");
        ensure!(
            self.min_lap_seconds.is_finite() && self.min_lap_seconds >= 0.0,
            "baseline.min_lap_seconds must be a non-negative number"
        );
        ensure!(
            self.rocket_threshold < self.lemon_threshold,
            "scoring.rocket_threshold ({}) must be below scoring.lemon_threshold ({})",
            self.rocket_threshold,
            self.lemon_threshold
        );
        ensure!(self.box_threshold.is_finite(), "strategy.box_threshold must be a number");
        ensure!(self.poll_interval_ms > 0, "feed.poll_interval_ms must be positive");
        Ok(())
    }

    // Getters for all config fields
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn baseline_window(&self) -> usize {
        self.baseline_window
    }

    pub fn min_lap_seconds(&self) -> f64 {
        self.min_lap_seconds
    }

    pub fn driver_swap(&self) -> DriverSwapPolicy {
        self.driver_swap
    }

    pub fn rocket_threshold(&self) -> f64 {
        self.rocket_threshold
    }

    pub fn lemon_threshold(&self) -> f64 {
        self.lemon_threshold
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn box_threshold(&self) -> f64 {
        self.box_threshold
    }

    pub fn feed_kind(&self) -> &FeedKind {
        &self.feed_kind
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn http_url(&self) -> Option<&str> {
        self.http_url.as_deref()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn feed_timeout_ms(&self) -> u64 {
        self.feed_timeout_ms
    }

    pub fn pit_tokens(&self) -> &[String] {
        &self.pit_tokens
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Replay a recorded feed file instead of the configured source
    pub fn with_replay_file(mut self, path: &str) -> Self {
        self.feed_kind = FeedKind::Replay;
        self.replay_file = Some(path.to_string());
        self
    }

    /// Poll a live endpoint instead of the configured source
    pub fn with_http_url(mut self, url: &str) -> Self {
        self.feed_kind = FeedKind::Http;
        self.http_url = Some(url.to_string());
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_baseline_window(mut self, window: usize) -> Self {
        self.baseline_window = window;
        self
    }

    pub fn with_min_lap_seconds(mut self, seconds: f64) -> Self {
        self.min_lap_seconds = seconds;
        self
    }

    pub fn with_driver_swap(mut self, policy: DriverSwapPolicy) -> Self {
        self.driver_swap = policy;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_box_threshold(mut self, threshold: f64) -> Self {
        self.box_threshold = threshold;
        self
    }

    pub fn with_scoring_thresholds(mut self, rocket: f64, lemon: f64) -> Self {
        self.rocket_threshold = rocket;
        self.lemon_threshold = lemon;
        self
    }
}
