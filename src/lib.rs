//! clickwatch Library
//!
//! Headless front-end for the clickwatch supervisor. The supervision and
//! state logic lives in the `clickwatch-*` workspace crates.

pub mod headless;

pub use headless::runner::run_headless;
