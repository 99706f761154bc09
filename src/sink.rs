//! Output targets for emitted records.
//!
//! A [`Sink`] consumes full [`LogRecord`] values and decides how to
//! render them. The writer sinks here cover local output; the HTTP
//! export path is its own sink in [`exporter`](crate::exporter).

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::record::{Level, LogRecord};

/// Abstraction over an output target that consumes full log records.
pub trait Sink: Send + Sync {
    /// Whether records at `level` are worth constructing at all.
    ///
    /// The logger consults this before assigning identity to a record, so
    /// a disabled level costs neither an id nor a sink call.
    fn enabled(&self, level: Level) -> bool {
        let _ = level;
        true
    }

    /// Handle a record. The sink decides how to serialize or format it.
    fn handle(&self, record: &LogRecord) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn enabled(&self, level: Level) -> bool {
        (**self).enabled(level)
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        (**self).handle(record)
    }
}

/// Errors produced while a sink handles a record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] io::Error),

    #[error("sink serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// The sink's downstream (e.g. an export batcher) is closed.
    #[error("sink is closed")]
    Closed,
}

/// Human-readable line-per-record sink.
///
/// Renders `time=<rfc3339> level=<LEVEL> msg=<message> key=value ...`
/// with attributes sorted by key. Causal ids and callsites are not
/// rendered; use [`JsonSink`] for the full wire view.
pub struct TextSink {
    writer: Mutex<Box<dyn Write + Send>>,
    min_level: Level,
}

impl TextSink {
    pub fn new(writer: impl Write + Send + 'static, min_level: Level) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            min_level,
        }
    }

    /// Text sink over stdout.
    pub fn stdout(min_level: Level) -> Self {
        Self::new(io::stdout(), min_level)
    }
}

impl Sink for TextSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut line = format!(
            "time={} level={} msg={:?}",
            record.timestamp.to_rfc3339(),
            record.level,
            record.message,
        );
        let mut keys: Vec<&String> = record.attrs.keys().collect();
        keys.sort();
        for key in keys {
            line.push_str(&format!(" {}={}", key, record.attrs[key]));
        }
        line.push('\n');

        let mut writer = self.writer.lock().expect("text sink writer poisoned");
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Wire-schema sink: one compact JSON object per line.
///
/// Lines match what the HTTP exporter sends, causal identity included.
pub struct JsonSink {
    writer: Mutex<Box<dyn Write + Send>>,
    min_level: Level,
}

impl JsonSink {
    pub fn new(writer: impl Write + Send + 'static, min_level: Level) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            min_level,
        }
    }

    /// JSON sink over stdout.
    pub fn stdout(min_level: Level) -> Self {
        Self::new(io::stdout(), min_level)
    }
}

impl Sink for JsonSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut line = record.to_wire_string()?;
        line.push('\n');

        let mut writer = self.writer.lock().expect("json sink writer poisoned");
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured records.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Clear all captured records.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl Sink for MemorySink {
    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
