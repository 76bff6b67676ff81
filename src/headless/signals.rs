//! Shutdown signals for the headless runner
//!
//! The listener is installed before the worker starts, so SIGINT or SIGTERM
//! arriving at any point stops the worker through the normal stop path
//! instead of killing clickwatch and leaving the worker orphaned.

use clickwatch_core::prelude::*;

/// Signal that asked clickwatch to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

/// Installed SIGINT/SIGTERM handlers (Ctrl+C only on non-unix targets)
#[derive(Debug)]
pub struct ShutdownListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownListener {
    /// Install the handlers. Must be called from within the tokio runtime.
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let interrupt = signal(SignalKind::interrupt())
                .map_err(|e| Error::terminal(format!("Failed to create SIGINT handler: {}", e)))?;
            let terminate = signal(SignalKind::terminate())
                .map_err(|e| Error::terminal(format!("Failed to create SIGTERM handler: {}", e)))?;

            debug!("Shutdown signal handlers installed");
            Ok(Self {
                interrupt,
                terminate,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next shutdown signal.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn recv(&mut self) -> Result<ShutdownSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                Some(()) = self.interrupt.recv() => Ok(ShutdownSignal::Interrupt),
                Some(()) = self.terminate.recv() => Ok(ShutdownSignal::Terminate),
                else => Err(Error::terminal("Signal streams closed")),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| Error::terminal(format!("Failed to listen for Ctrl+C: {}", e)))?;
            Ok(ShutdownSignal::Interrupt)
        }
    }
}
