//! Core domain types: worker lifecycle and derived device state

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::events::LogEvent;

// ─────────────────────────────────────────────────────────
// Worker Process
// ─────────────────────────────────────────────────────────

/// Lifecycle state of the supervised worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    #[default]
    NotRunning,
    Running,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::NotRunning => write!(f, "Not Running"),
            ProcessStatus::Running => write!(f, "Running"),
        }
    }
}

/// How to launch the worker process
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerCommand {
    /// Executable name or path
    pub program: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory (inherits ours when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl Default for WorkerCommand {
    /// The controller bridge script, run with the system Python
    fn default() -> Self {
        Self::new("python3").with_args(["app.py"])
    }
}

// ─────────────────────────────────────────────────────────
// Device State
// ─────────────────────────────────────────────────────────

/// BLE link state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Not Connected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Physical button position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    Pressed,
    #[default]
    Released,
}

/// The controller's two buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonId {
    /// "Plus" button
    A,
    /// "Minus" button
    B,
}

/// Everything derived from the worker's output.
///
/// Invariants maintained by [`DeviceState::apply`]:
/// - `connection == Disconnected` implies `device_address == None`
/// - `battery_level`, when set, is within `0..=100`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    pub battery_level: Option<u8>,
    pub connection: ConnectionStatus,
    pub device_address: Option<String>,
    pub button_a: ButtonState,
    pub button_b: ButtonState,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionStatus::Connected)
    }

    pub fn button(&self, id: ButtonId) -> ButtonState {
        match id {
            ButtonId::A => self.button_a,
            ButtonId::B => self.button_b,
        }
    }

    /// Apply a classified event. Returns `true` if anything changed.
    ///
    /// Disconnect clears the address but keeps the last battery reading
    /// and button positions.
    pub fn apply(&mut self, event: &LogEvent) -> bool {
        let before = self.clone();

        match event {
            LogEvent::BatteryReading(level) => {
                // Classifier never emits out-of-range readings
                if *level <= 100 {
                    self.battery_level = Some(*level);
                }
            }
            LogEvent::ButtonChanged(ButtonId::A, state) => self.button_a = *state,
            LogEvent::ButtonChanged(ButtonId::B, state) => self.button_b = *state,
            LogEvent::DeviceConnected(address) => {
                self.connection = ConnectionStatus::Connected;
                self.device_address = Some(address.clone());
            }
            LogEvent::DeviceDisconnected => {
                self.connection = ConnectionStatus::Disconnected;
                self.device_address = None;
            }
        }

        *self != before
    }
}
