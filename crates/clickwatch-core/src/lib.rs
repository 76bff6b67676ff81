//! # clickwatch-core - Core Domain Types
//!
//! Foundation crate for clickwatch. Provides the device/process state types,
//! the line classifier, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** and does no process I/O.
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`DeviceState`] - Battery, connection, address and button state of the controller
//! - [`ProcessStatus`] - Whether the worker process is running
//! - [`WorkerCommand`] - Program, arguments and directory used to launch the worker
//!
//! ### Events (`events`)
//! - [`LogEvent`] - Semantic event recognized in one line of worker output
//!
//! ### Classifier (`classifier`)
//! - [`classify()`] - Map a line to at most one [`LogEvent`]
//! - [`classify_detailed()`] - Same decision, with the matched rule and parse error
//! - [`RULES`] - Priority-ordered rule table (first match wins)
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `is_fatal()` classification
//! - [`SpawnError`] - Worker launch failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use clickwatch_core::prelude::*;
//! ```

pub mod ansi;
pub mod classifier;
pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all clickwatch crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use ansi::strip_ansi_codes;
pub use classifier::{
    classify, classify_detailed, Classification, ParseError, Rule, RuleKind, RULES,
};
pub use error::{Error, Result, ResultExt, SpawnError};
pub use events::LogEvent;
pub use types::{
    ButtonId, ButtonState, ConnectionStatus, DeviceState, ProcessStatus, WorkerCommand,
};
