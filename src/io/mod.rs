//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `feed` - Timing row decoding and lap normalization
//! - `source` - Replay file and live HTTP feed sources
//! - `egress` - Cycle report output to file (JSONL format)
//! - `prometheus` - Prometheus metrics and snapshot HTTP endpoint

pub mod egress;
pub mod feed;
pub mod prometheus;
pub mod source;

// Re-export commonly used types
pub use egress::{read_last_report, ReportEgress};
pub use feed::{normalize_raw, parse_batch, RawRow, RowError};
pub use source::{FeedSource, HttpSource, ReplaySource};
