//! JSON-lines persistence for test results.
//!
//! Each completed [`TestResult`] is appended as one JSON line as soon as its
//! cycle finishes, so an interrupted run still leaves everything collected
//! so far on disk. `load_history` reads such a file back for comparison
//! against earlier runs.

use chrono::Utc;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::geo::Protocol;
use crate::results::TestResult;
use crate::vpn::ResultSink;

/// Default results filename for a run starting now.
pub fn default_path(protocol: Protocol) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("tunnelrank_{}_{}.jsonl", timestamp, protocol.name().to_lowercase()))
}

/// Append-only JSON-lines file sink.
pub struct JsonlSink {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Recording results to {}", path.display());
        Ok(Self { path, writer: LineWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn record(&mut self, result: &TestResult) -> std::io::Result<()> {
        let line = serde_json::to_string(result)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn load_history(&self) -> std::io::Result<Vec<TestResult>> {
        load_history(&self.path)
    }
}

/// Read back every result line from a results file, skipping blank lines.
pub fn load_history(path: &Path) -> std::io::Result<Vec<TestResult>> {
    let reader = BufReader::new(File::open(path)?);
    let mut results = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        results.push(serde_json::from_str(&line)?);
    }

    Ok(results)
}
