//! Report egress - writes cycle reports to file
//!
//! Reports are written in JSONL format (one JSON object per line)
//! to the file specified in config. The TUI tails the same file.

use crate::domain::CycleReport;
use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for cycle reports
pub struct ReportEgress {
    file_path: String,
}

impl ReportEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a report to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_report(&self, report: &CycleReport) -> bool {
        let json = match serde_json::to_string(report) {
            Ok(json) => json,
            Err(e) => {
                error!(cycle = %report.cycle, error = %e, "report_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                debug!(
                    cycle = %report.cycle,
                    queue = %report.queue.len(),
                    verdict = %report.verdict.as_str(),
                    "report_egressed"
                );
                true
            }
            Err(e) => {
                error!(cycle = %report.cycle, error = %e, "report_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

/// Bytes read from the end of the report file before widening
const TAIL_WINDOW: u64 = 64 * 1024;

/// Read the most recent report from an egress file
///
/// Only the tail of the file is read. Returns `Ok(None)` when the file does
/// not exist yet or holds no reports.
pub fn read_last_report<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<CycleReport>> {
    let path = path.as_ref();
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open reports {}", path.display()))
        }
    };

    let line = read_last_line(&mut file)
        .with_context(|| format!("Failed to read reports {}", path.display()))?;
    let Some(line) = line else {
        return Ok(None);
    };
    let report = serde_json::from_str(&line)
        .with_context(|| format!("Malformed last report in {}", path.display()))?;
    Ok(Some(report))
}

/// Last non-blank line of a file, reading backwards in doubling windows
fn read_last_line(file: &mut File) -> std::io::Result<Option<String>> {
    let len = file.metadata()?.len();
    let mut window = TAIL_WINDOW;

    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        std::io::Read::by_ref(file).take(len - start).read_to_end(&mut buf)?;

        let end = buf.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |i| i + 1);
        let body = &buf[..end];
        // A line is only complete if its start is inside the window
        match body.iter().rposition(|&b| b == b'\n') {
            Some(nl) => return Ok(Some(String::from_utf8_lossy(&body[nl + 1..]).into_owned())),
            None if start == 0 => {
                return Ok((!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()))
            }
            None => window = window.saturating_mul(2),
        }
    }
}
