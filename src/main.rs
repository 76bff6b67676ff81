//! clickwatch - supervise a Zwift Click bridge and track controller state
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use clickwatch::headless::HeadlessEvent;
use clickwatch_app::config::{self, Settings};
use clickwatch_core::prelude::*;
use clickwatch_core::WorkerCommand;

/// clickwatch - supervise a Zwift Click bridge and track controller state
#[derive(Parser, Debug)]
#[command(name = "clickwatch")]
#[command(about = "Runs the controller bridge and reports its state as NDJSON", long_about = None)]
struct Args {
    /// Config file (default: .clickwatch/config.toml in the current directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File receiving the worker's raw output
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Milliseconds the worker gets to exit after SIGTERM
    #[arg(long, value_name = "MS")]
    stop_grace_ms: Option<u64>,

    /// Emit every worker line as a `line` event
    #[arg(long)]
    details: bool,

    /// Wait for a `start` command instead of starting the worker immediately
    #[arg(long)]
    no_auto_start: bool,

    /// Write a default .clickwatch/config.toml and exit
    #[arg(long)]
    init_config: bool,

    /// Worker program and arguments (default: python3 app.py)
    #[arg(last = true, value_name = "PROGRAM")]
    worker: Vec<String>,
}

impl Args {
    /// Load the settings file and apply command-line overrides
    fn resolve_settings(&self, base: &std::path::Path) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => config::load_settings_file(path)
                .with_context(|| format!("Loading config from {}", path.display()))?,
            None => config::load_settings(base),
        };

        if let Some(file) = &self.log_file {
            settings.log.file = file.clone();
        }
        if let Some(ms) = self.stop_grace_ms {
            settings.supervisor.stop_grace_ms = ms;
        }
        if self.details {
            settings.log.details = true;
        }
        if self.no_auto_start {
            settings.supervisor.auto_start = false;
        }
        if let Some((program, args)) = self.worker.split_first() {
            let working_dir = settings.worker.working_dir.take();
            settings.worker = WorkerCommand {
                program: program.clone(),
                args: args.to_vec(),
                working_dir,
            };
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install().map_err(|e| Error::terminal(e.to_string()))?;
    clickwatch_core::logging::init()?;

    let base_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if args.init_config {
        let path = config::init_config_dir(&base_path).context("Writing default config")?;
        eprintln!("Config written to {}", path.display());
        return Ok(());
    }

    let settings = match args.resolve_settings(&base_path) {
        Ok(settings) => settings,
        Err(e) => {
            HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
            return Err(e);
        }
    };
    let result = clickwatch::run_headless(settings).await;

    if let Err(ref e) = result {
        error!("Application error: {:?}", e);
    }
    result
}
