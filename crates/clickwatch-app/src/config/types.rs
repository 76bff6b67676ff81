//! Configuration types for `.clickwatch/config.toml`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use clickwatch_core::WorkerCommand;

use crate::supervisor::StopTimeouts;

/// Root of `.clickwatch/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub worker: WorkerCommand,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SupervisorSettings {
    /// Start the worker as soon as clickwatch starts
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// Milliseconds the worker gets to exit after SIGTERM
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Milliseconds to wait for the worker after a forced kill
    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            stop_grace_ms: default_stop_grace_ms(),
            kill_wait_ms: default_kill_wait_ms(),
        }
    }
}

impl SupervisorSettings {
    pub fn stop_timeouts(&self) -> StopTimeouts {
        StopTimeouts {
            grace: Duration::from_millis(self.stop_grace_ms),
            kill_wait: Duration::from_millis(self.kill_wait_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSettings {
    /// Worker output log, relative to the working directory
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Echo every worker line as an event
    #[serde(default)]
    pub details: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            details: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stop_grace_ms() -> u64 {
    3000
}

fn default_kill_wait_ms() -> u64 {
    2000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.txt")
}
