//! Worker process management

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use clickwatch_core::prelude::*;
use clickwatch_core::{SpawnError, WorkerCommand};

use crate::reader::LineStream;

/// Receives the worker's output, one line at a time, on the worker task.
///
/// Calls are sequential and never overlap. `on_exit` is the last call and
/// only happens when the task ends on its own or after a kill; an aborted
/// task never reaches it.
pub trait LineHandler: Send + 'static {
    fn on_line(&mut self, line: String);

    fn on_exit(&mut self, _code: Option<i32>) {}
}

impl<F> LineHandler for F
where
    F: FnMut(String) + Send + 'static,
{
    fn on_line(&mut self, line: String) {
        self(line)
    }
}

/// Manages one run of the worker child process.
///
/// The `Child` is moved into a single background task that reads stdout and
/// stderr line by line, hands every line to the [`LineHandler`], and reaps
/// the child once both pipes close. Both signals go through that task
/// ([`term_tx`] for SIGTERM, [`kill_tx`] for the forced kill), so the pid is
/// only ever signalled while the child is still unreaped. An atomic flag
/// ([`exited`]) backs synchronous `has_exited()` checks, a [`Notify`] lets
/// `shutdown()` await the exit, and the task's `JoinHandle` lets shutdown
/// join it.
///
/// # Exit detection
///
/// The child counts as exited only after both pipes reach EOF and it has
/// been reaped. If the worker leaves behind a background process that
/// inherited its stdout or stderr, the pipes stay open after the worker
/// itself exits, and the process keeps reporting running until that
/// descendant exits or [`Self::shutdown`] kills the worker. Lines the
/// descendant prints in the meantime are still delivered.
pub struct WorkerProcess {
    /// Process ID for logging
    pid: Option<u32>,
    /// One-shot sender that asks the task to SIGTERM the process.
    term_tx: Option<oneshot::Sender<()>>,
    /// One-shot sender that tells the task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the task once the child has been reaped.
    exited: Arc<AtomicBool>,
    /// Notified by the task immediately after the child is reaped.
    exit_notify: Arc<Notify>,
    /// The reader/reaper task; yields the exit code
    task: Option<JoinHandle<Option<i32>>>,
}

impl WorkerProcess {
    /// Spawn the worker and start its reader task.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// child exists; output is consumed asynchronously.
    pub fn spawn<H: LineHandler>(
        command: &WorkerCommand,
        handler: H,
    ) -> std::result::Result<Self, SpawnError> {
        info!("Spawning worker: {}", command.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Python block-buffers piped stdout; markers must arrive live
            .env("PYTHONUNBUFFERED", "1")
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(command.program.clone(), e))?;

        let pid = child.id();
        info!("Worker process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or(SpawnError::MissingPipe { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SpawnError::MissingPipe { stream: "stderr" })?;

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (term_tx, term_rx) = oneshot::channel::<()>();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(Self::run(
            child,
            stdout,
            stderr,
            term_rx,
            kill_rx,
            handler,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            pid,
            term_tx: Some(term_tx),
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
            task: Some(task),
        })
    }

    /// Background task: owns `child`, pumps both pipes into the handler,
    /// then reaps the child.
    ///
    /// Two ways the task can end:
    /// 1. Both pipes reach EOF and `child.wait()` resolves.
    /// 2. `kill_rx` fires (or its sender is dropped): the child is killed and
    ///    reaped, and no further lines are delivered.
    ///
    /// A `term_rx` request at any point before the reap sends SIGTERM and
    /// keeps going; the child's exit then ends the task through path 1.
    #[allow(clippy::too_many_arguments)]
    async fn run<H: LineHandler>(
        mut child: Child,
        stdout: ChildStdout,
        stderr: ChildStderr,
        mut term_rx: oneshot::Receiver<()>,
        mut kill_rx: oneshot::Receiver<()>,
        mut handler: H,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) -> Option<i32> {
        let mut stdout = LineStream::new(BufReader::new(stdout));
        let mut stderr = LineStream::new(BufReader::new(stderr));
        let mut killed = false;
        let mut term_pending = true;

        while !(stdout.is_finished() && stderr.is_finished()) {
            tokio::select! {
                biased;

                _ = &mut kill_rx => {
                    killed = true;
                    break;
                }
                request = &mut term_rx, if term_pending => {
                    term_pending = false;
                    if request.is_ok() {
                        Self::send_terminate(&mut child);
                    }
                }
                line = stdout.next_line(), if !stdout.is_finished() => {
                    if let Some(line) = line {
                        trace!("stdout: {}", line);
                        handler.on_line(line);
                    }
                }
                line = stderr.next_line(), if !stderr.is_finished() => {
                    if let Some(line) = line {
                        trace!("stderr: {}", line);
                        handler.on_line(line);
                    }
                }
            }
        }

        let code = if killed {
            Self::kill_and_reap(&mut child).await
        } else {
            debug!("Worker output closed, waiting for exit");
            loop {
                tokio::select! {
                    biased;

                    _ = &mut kill_rx => break Self::kill_and_reap(&mut child).await,
                    request = &mut term_rx, if term_pending => {
                        term_pending = false;
                        if request.is_ok() {
                            Self::send_terminate(&mut child);
                        }
                    }
                    result = child.wait() => break match result {
                        Ok(status) => {
                            info!("Worker process exited with status: {:?}", status);
                            status.code()
                        }
                        Err(e) => {
                            error!("Error waiting for worker process: {}", e);
                            None
                        }
                    },
                }
            }
        };

        // Flag first so `has_exited()` is true before anyone is woken
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        handler.on_exit(code);
        code
    }

    /// SIGTERM the child unless it has already been reaped. Returns whether
    /// a signal went out.
    ///
    /// `Child::id()` is `None` once the child has been reaped, so the pid
    /// signalled here cannot have been reused by another process.
    fn send_terminate(child: &mut Child) -> bool {
        let Some(pid) = child.id() else {
            debug!("Worker already reaped, not signalling");
            return false;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    debug!("Sent SIGTERM to worker {}", pid);
                    return true;
                }
                Err(e) => warn!("Failed to send SIGTERM to worker {}: {}", pid, e),
            }
        }

        // No graceful signal available
        match child.start_kill() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to kill worker {}: {}", pid, e);
                false
            }
        }
    }

    async fn kill_and_reap(child: &mut Child) -> Option<i32> {
        info!("Kill signal received, force-killing worker process");
        if let Err(e) = child.kill().await {
            error!("Failed to kill worker process: {}", e);
        }
        match child.wait().await {
            Ok(status) => {
                info!("Worker process killed, exit status: {:?}", status);
                status.code()
            }
            Err(e) => {
                error!("Error waiting after kill: {}", e);
                None
            }
        }
    }

    /// Stop the worker and join its task.
    ///
    /// 1. Early exit if the process is already gone
    /// 2. Have the task send SIGTERM (forced kill on platforms without signals)
    /// 3. Wait up to `grace` for exit via `exit_notify`
    /// 4. Force-kill through the task if it is still alive
    /// 5. Join the task for up to `kill_wait`, aborting it past that
    ///
    /// Once this returns the handler will not be called again.
    pub async fn shutdown(mut self, grace: Duration, kill_wait: Duration) -> Option<i32> {
        if self.has_exited() {
            info!("Worker process already exited");
        } else {
            info!("Initiating worker shutdown (pid {:?})", self.pid);

            // Register before signalling so the wake-up cannot be missed
            let exit_notify = Arc::clone(&self.exit_notify);
            let notified = exit_notify.notified();

            self.terminate();

            if self.has_exited() {
                info!("Worker process exited gracefully");
            } else {
                match timeout(grace, notified).await {
                    Ok(()) => info!("Worker process exited gracefully"),
                    Err(_) => {
                        warn!("Worker did not exit within {:?}, force killing", grace);
                        self.force_kill();
                    }
                }
            }
        }

        self.join(kill_wait).await
    }

    /// Join the task of a worker that exited on its own.
    pub async fn reap(mut self, limit: Duration) -> Option<i32> {
        self.join(limit).await
    }

    async fn join(&mut self, limit: Duration) -> Option<i32> {
        let mut task = self.task.take()?;

        match timeout(limit, &mut task).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                error!("Worker task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Worker task still running after {:?}, aborting", limit);
                self.force_kill();
                task.abort();
                // Dropping the child inside the task kills it (kill_on_drop)
                let _ = task.await;
                None
            }
        }
    }

    /// Ask the task to SIGTERM the process.
    fn terminate(&mut self) {
        if let Some(tx) = self.term_tx.take() {
            if tx.send(()).is_err() {
                debug!("Worker task already finished, nothing to terminate");
            }
        }
    }

    /// Force kill the process by signalling the task.
    fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The task may have already finished on its own
            let _ = tx.send(());
        }
    }

    /// Whether the child has been reaped.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Logical complement of `has_exited()`.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("WorkerProcess dropped while process may still be running");
            self.force_kill();
        }
        // kill_on_drop(true) on the Child is the final safety net
        debug!("WorkerProcess dropped");
    }
}
