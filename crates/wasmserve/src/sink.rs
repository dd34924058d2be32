//! Append-only diagnostics sink.
//!
//! Build output, the commands being run, and unmatched requests are written here
//! for the developer to read. Every entry ends with a newline.

use parking_lot::Mutex;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;
use std::sync::Arc;

/// Destination for diagnostics entries.
pub trait LogSink: Send + Sync {
    /// Append one entry. Implementations must not fail loudly.
    fn append(&self, entry: &[u8]);
}

pub type SharedSink = Arc<dyn LogSink>;

/// Newline-terminate an entry if it is not already.
pub fn terminated(entry: &[u8]) -> Cow<'_, [u8]> {
    if entry.ends_with(b"\n") {
        Cow::Borrowed(entry)
    } else {
        let mut owned = Vec::with_capacity(entry.len() + 1);
        owned.extend_from_slice(entry);
        owned.push(b'\n');
        Cow::Owned(owned)
    }
}

/// Sink over any writer (standard output, a log file, ...).
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<File> {
    /// Open `path` for appending, creating it if needed.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn append(&self, entry: &[u8]) {
        let mut writer = self.writer.lock();
        let result = writer
            .write_all(&terminated(entry))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to write diagnostics: {}", e);
        }
    }
}

/// In-memory sink. Useful when embedding the server and in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl LogSink for MemorySink {
    fn append(&self, entry: &[u8]) {
        self.buffer.lock().extend_from_slice(&terminated(entry));
    }
}

/// Optional sink handle shared by the pipeline and the router.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<SharedSink>,
}

impl Diagnostics {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Forward `entry` to the sink. Empty entries are dropped.
    pub fn log(&self, entry: impl AsRef<[u8]>) {
        let entry = entry.as_ref();
        if entry.is_empty() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.append(entry);
        }
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
