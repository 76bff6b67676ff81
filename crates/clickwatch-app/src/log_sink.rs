//! Destinations for the worker's raw output lines

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use clickwatch_core::prelude::*;

/// Append-only destination for worker output.
///
/// `append` is called from the worker task, once per line, in arrival order.
/// Failures are reported to the caller and never stop the worker.
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str) -> io::Result<()>;
}

/// Appends each line plus `\n` to a file.
///
/// The file is opened in append mode and created, with its parent
/// directories, on first use. Each line goes out in a single `write_all`
/// so lines are never interleaved with other writers.
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        debug!("Opened worker log at {}", self.path.display());
        Ok(file)
    }
}

impl LogSink for FileLogSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        if let Err(e) = file.write_all(record.as_bytes()) {
            // Reopen on the next line; the file may have been rotated away
            *guard = None;
            return Err(e);
        }
        Ok(())
    }
}

/// Keeps the most recent lines in memory.
#[derive(Debug)]
pub struct MemoryLogSink {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl MemoryLogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, line: &str) -> io::Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
        Ok(())
    }
}

/// Fans every line out to several sinks.
///
/// Every sink sees every line even if an earlier one fails; the first
/// failure is returned.
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LogSink for TeeSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.append(line) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TeeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeeSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
