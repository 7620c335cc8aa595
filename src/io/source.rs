//! Timing feed sources
//!
//! A source yields one batch of raw rows per polling cycle. Rows are left
//! undecoded so a single bad row never costs the whole batch.

use crate::infra::config::{Config, FeedKind};
use crate::io::feed::{self, RawRow};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};

/// Where timing rows come from
///
/// The polling loop calls [`next_batch`](FeedSource::next_batch) once per
/// cycle inside a `select!` with shutdown.
#[async_trait]
pub trait FeedSource: Send + 'static {
    /// Fetch the next batch
    ///
    /// `Ok(None)` means the source is exhausted. An empty vector is a valid
    /// batch with no rows.
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>>;

    /// Short name for logs
    fn source_name(&self) -> &str;
}

/// Build the source selected in config
pub async fn from_config(config: &Config) -> Result<Box<dyn FeedSource>> {
    match config.feed_kind() {
        FeedKind::Replay => {
            let Some(path) = config.replay_file() else {
                bail!("feed.kind = \"replay\" requires feed.replay_file");
            };
            Ok(Box::new(ReplaySource::open(path).await?))
        }
        FeedKind::Http => {
            let Some(url) = config.http_url() else {
                bail!("feed.kind = \"http\" requires feed.http_url");
            };
            Ok(Box::new(HttpSource::new(url, Duration::from_millis(config.feed_timeout_ms()))?))
        }
    }
}

// ============================================================================
// Replay Source (recorded session, one JSON batch per line)
// ============================================================================

/// Replays a recorded session file, one line per cycle
pub struct ReplaySource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl ReplaySource {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        info!(file = %path.display(), "replay_source_opened");
        Ok(Self { path, lines: BufReader::new(file).lines(), line_no: 0 })
    }
}

#[async_trait]
impl FeedSource for ReplaySource {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                info!(file = %self.path.display(), batches = %self.line_no, "replay_source_exhausted");
                return Ok(None);
            };
            self.line_no += 1;

            match feed::parse_batch(&line) {
                Ok(rows) => return Ok(Some(rows)),
                Err(e) => {
                    // A corrupt line is one lost cycle, not a dead session
                    warn!(
                        file = %self.path.display(),
                        line = %self.line_no,
                        error = %e,
                        "replay_line_unparseable"
                    );
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// HTTP Source (live timing endpoint)
// ============================================================================

/// Polls a live timing endpoint that returns the current standings
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .context("Failed to build HTTP client")?;
        info!(url = %url, timeout_ms = %timeout.as_millis(), "http_source_initialized");
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl FeedSource for HttpSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {} returned {}", self.url, status);
        }

        let body = response.text().await.context("Failed to read feed body")?;
        let rows = feed::parse_batch(&body)?;
        debug!(url = %self.url, rows = %rows.len(), bytes = %body.len(), "http_batch_fetched");
        Ok(Some(rows))
    }

    fn source_name(&self) -> &str {
        "http"
    }
}
