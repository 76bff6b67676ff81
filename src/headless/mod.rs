//! Headless mode - NDJSON event output
//!
//! clickwatch has no window: it reports the worker status and the
//! controller state as newline-delimited JSON on stdout, one event per line,
//! and takes commands on stdin (see [`command`]).
//!
//! # Example Output
//!
//! ```json
//! {"event":"process_status","status":"running","pid":4242,"timestamp":1704700001000}
//! {"event":"device_state","state":{"battery_level":57,"connection":"connected","device_address":"AA:BB:CC:DD:EE:FF","button_a":"pressed","button_b":"released"},"timestamp":1704700002000}
//! {"event":"line","line":"Plus button PRESSED","timestamp":1704700002000}
//! ```

pub mod command;
pub mod runner;
pub mod signals;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use clickwatch_core::{DeviceState, ProcessStatus};

pub use command::{parse_command, Command};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Worker started or stopped
    ProcessStatus {
        status: ProcessStatus,
        pid: Option<u32>,
        timestamp: i64,
    },

    /// Controller state changed (full snapshot)
    DeviceState { state: DeviceState, timestamp: i64 },

    /// Raw worker output line, only with `--details`
    Line { line: String, timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = self.write_to(&mut stdout) {
            error!("Failed to write headless event to stdout: {}", e);
        }
    }

    /// Write this event as a single NDJSON line and flush
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let json = serde_json::to_string(self).map_err(io::Error::other)?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn process_status(status: ProcessStatus, pid: Option<u32>) -> Self {
        Self::ProcessStatus {
            status,
            pid,
            timestamp: Self::now(),
        }
    }

    pub fn device_state(state: DeviceState) -> Self {
        Self::DeviceState {
            state,
            timestamp: Self::now(),
        }
    }

    pub fn line(line: String) -> Self {
        Self::Line {
            line,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}
