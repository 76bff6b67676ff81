//! # clickwatch-app - Supervision and State
//!
//! Ties the worker process to the device state: [`ProcessSupervisor`] runs
//! the worker and feeds its lines through the classifier into the
//! [`DeviceStateStore`], which notifies [`Observer`]s of every change.
//! Raw lines go to a [`LogSink`].
//!
//! ## Public API
//!
//! - [`ProcessSupervisor`] - Start and stop the worker
//! - [`DeviceStateStore`] - Latest device state and worker status
//! - [`Observer`], [`ChannelObserver`] - Change notifications
//! - [`LogSink`] and its file, memory and tee implementations
//! - [`config`] - `.clickwatch/config.toml` loading

pub mod config;
pub mod log_sink;
pub mod observer;
pub mod store;
pub mod supervisor;

pub use log_sink::{FileLogSink, LogSink, MemoryLogSink, TeeSink};
pub use observer::{ChannelObserver, Observer, StateChange};
pub use store::DeviceStateStore;
pub use supervisor::{ProcessSupervisor, StopTimeouts};
