//! JSONL audit trail.
//!
//! One JSON object per line, `{"ts": ..., "event": "<kind>", ...fields}`.
//! Each line stands alone, so a torn final write loses one record only.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{EngineEvent, EventSink};

#[derive(Serialize)]
struct AuditLine<'a> {
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a EngineEvent,
}

/// A parsed audit line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Event sink writing JSON lines. Write failures are logged and counted,
/// never returned to the engine.
pub struct JsonlAuditSink<W: Write> {
    writer: W,
    written: u64,
    failures: u64,
}

impl<W: Write> JsonlAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            failures: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &AuditLine<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(b"\n")
    }
}

impl JsonlAuditSink<BufWriter<File>> {
    /// Append to `path`, creating it and its parent directory if needed.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> EventSink for JsonlAuditSink<W> {
    fn emit(&mut self, at: DateTime<Utc>, event: &EngineEvent) {
        let line = AuditLine { ts: at, event };
        match self.write_line(&line) {
            Ok(()) => {
                self.written += 1;
                if event.is_alert() {
                    if let Err(err) = self.writer.flush() {
                        warn!(error = %err, "audit flush failed");
                    }
                }
            }
            Err(err) => {
                self.failures += 1;
                warn!(error = %err, event = event.kind(), "audit write failed");
            }
        }
    }
}

/// Read an audit file back. Malformed lines are skipped with a warning.
pub fn read_audit(path: &Path) -> io::Result<Vec<AuditRecord>> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    for (n, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(line = n + 1, error = %err, "skipping malformed audit line"),
        }
    }
    Ok(records)
}
