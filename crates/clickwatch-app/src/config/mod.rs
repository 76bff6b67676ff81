//! Configuration for clickwatch
//!
//! Settings live in `.clickwatch/config.toml` under the directory clickwatch
//! runs in. Command-line flags override them.

pub mod settings;
pub mod types;

pub use settings::{config_path, init_config_dir, load_settings, load_settings_file};
pub use types::*;
