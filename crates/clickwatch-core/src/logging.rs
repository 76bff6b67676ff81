//! Logging configuration using tracing
//!
//! Stdout belongs to the headless event stream, so diagnostics go to a
//! rolling file only.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the log filter directive
pub const LOG_ENV_VAR: &str = "CLICKWATCH_LOG";

const LOG_FILE_PREFIX: &str = "clickwatch.log";
const DEFAULT_FILTER: &str =
    "clickwatch=info,clickwatch_app=info,clickwatch_daemon=info,clickwatch_core=info,warn";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/clickwatch/logs/` (platform data dir).
/// Log level is controlled by the `CLICKWATCH_LOG` environment variable.
///
/// # Examples
/// ```bash
/// CLICKWATCH_LOG=debug clickwatch
/// CLICKWATCH_LOG=clickwatch_daemon=trace clickwatch
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("clickwatch starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("clickwatch").join("logs"))
}
