//! Append-only JSONL persistence for run events.
//!
//! Every record is flushed on the event boundary so a crash mid-run leaves a
//! readable prefix of the log. Writes are serialized behind a mutex; ordering
//! within a run is preserved, records across runs may interleave.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::types::EventRecord;

/// Error type for log writing and reading.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An append-only event log backed by a single JSONL file.
///
/// Thread-safe via internal mutex.
pub struct EventLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl EventLog {
    /// Open the log file for appending, creating parent directories as needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one record and flush it.
    pub fn append(&self, record: &EventRecord) -> Result<(), WriteError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records from a log file, skipping blank lines.
    pub fn read(path: &Path) -> Result<Vec<EventRecord>, WriteError> {
        let content = fs::read_to_string(path)?;
        let records: Result<Vec<EventRecord>, _> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect();
        Ok(records?)
    }
}
