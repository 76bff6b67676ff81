//! # clickwatch-daemon - Worker Process Management
//!
//! Spawns the bridge worker, reads its stdout and stderr as lines on a
//! single background task, and stops it with a bounded SIGTERM → kill
//! escalation.
//!
//! Depends on [`clickwatch_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! - [`WorkerProcess`] - Spawn, observe and shut down one run of the worker
//! - [`LineHandler`] - Per-line callback invoked on the worker task
//! - [`LineStream`] - Cancel-safe line reader over an async byte stream

pub mod process;
pub mod reader;

pub use process::{LineHandler, WorkerProcess};
pub use reader::LineStream;
