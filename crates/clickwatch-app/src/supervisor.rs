//! Worker lifecycle: start, stop, and the per-line pipeline
//!
//! Every line the worker prints goes through [`WorkerPump`] on the worker
//! task: classified, applied to the store if it carries an event, then
//! appended to the log sink. Lines are handled strictly in arrival order.

use std::sync::Arc;
use std::time::Duration;

use clickwatch_core::prelude::*;
use clickwatch_core::{classify_detailed, Classification, ProcessStatus, SpawnError, WorkerCommand};
use clickwatch_daemon::{LineHandler, WorkerProcess};

use crate::log_sink::LogSink;
use crate::store::{DeviceStateStore, RunId};

/// How long `stop()` waits at each escalation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    /// Time the worker gets to exit after SIGTERM
    pub grace: Duration,
    /// Time to wait for the worker task after the forced kill
    pub kill_wait: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(3000),
            kill_wait: Duration::from_millis(2000),
        }
    }
}

/// Per-run line handler living on the worker task
struct WorkerPump {
    run: RunId,
    store: Arc<DeviceStateStore>,
    sink: Arc<dyn LogSink>,
}

impl LineHandler for WorkerPump {
    fn on_line(&mut self, line: String) {
        match classify_detailed(&line) {
            Classification::Event { rule, event } => {
                trace!("{:?} matched: {}", rule, event.summary());
                self.store.apply(&event);
            }
            Classification::Malformed { rule, error } => {
                debug!("Ignoring malformed {:?} line: {}", rule, error);
            }
            Classification::Unmatched => {}
        }

        if let Err(e) = self.sink.append(&line) {
            warn!("Failed to write worker output to log: {}", e);
        }
    }

    fn on_exit(&mut self, code: Option<i32>) {
        info!("Worker exited with code {:?}", code);
        self.store.finish_run(self.run);
    }
}

struct ActiveRun {
    id: RunId,
    process: WorkerProcess,
}

/// Owns the worker process and drives [`ProcessStatus`] in the store.
///
/// Only one worker runs at a time. `start` and `stop` take `&mut self`, so
/// callers serialize them; the store can be shared freely through
/// [`Self::store`].
pub struct ProcessSupervisor {
    store: Arc<DeviceStateStore>,
    sink: Arc<dyn LogSink>,
    timeouts: StopTimeouts,
    active: Option<ActiveRun>,
}

impl ProcessSupervisor {
    pub fn new(store: Arc<DeviceStateStore>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            store,
            sink,
            timeouts: StopTimeouts::default(),
            active: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: StopTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Start the worker. Succeeds without doing anything if it is already
    /// running.
    pub async fn start(&mut self, command: &WorkerCommand) -> std::result::Result<(), SpawnError> {
        if self.is_running() {
            debug!("Worker already running, ignoring start");
            return Ok(());
        }

        if let Some(previous) = self.active.take() {
            debug!("Reaping previous worker run");
            previous.process.reap(self.timeouts.kill_wait).await;
            self.store.finish_run(previous.id);
        }

        let id = self.store.begin_run();
        let pump = WorkerPump {
            run: id,
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
        };

        let process = match WorkerProcess::spawn(command, pump) {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to start worker: {}", e);
                return Err(e);
            }
        };

        self.active = Some(ActiveRun { id, process });
        self.store.mark_running(id);
        Ok(())
    }

    /// Stop the worker and wait until it can no longer touch the store.
    ///
    /// Does nothing beyond reaping if the worker is not running.
    pub async fn stop(&mut self) {
        let Some(run) = self.active.take() else {
            debug!("No worker to stop");
            return;
        };

        if run.process.has_exited() {
            run.process.reap(self.timeouts.kill_wait).await;
        } else {
            let code = run
                .process
                .shutdown(self.timeouts.grace, self.timeouts.kill_wait)
                .await;
            info!("Worker stopped (exit code {:?})", code);
        }

        // Covers the abort path, where the pump never reports the exit
        self.store.finish_run(run.id);
    }

    /// Current worker status
    pub fn status(&self) -> ProcessStatus {
        self.store.process_status()
    }

    /// Whether a worker process is alive
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.process.is_running())
    }

    /// PID of the live worker, if any
    pub fn pid(&self) -> Option<u32> {
        self.active
            .as_ref()
            .filter(|run| run.process.is_running())
            .and_then(|run| run.process.id())
    }

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.store
    }

    pub fn timeouts(&self) -> StopTimeouts {
        self.timeouts
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("status", &self.status())
            .field("pid", &self.pid())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::log_sink::MemoryLogSink;
    use crate::observer::{ChannelObserver, StateChange};
    use clickwatch_core::{ButtonState, ConnectionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    /// Counts lines without bounding them
    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl CountingSink {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl LogSink for CountingSink {
        fn append(&self, _line: &str) -> std::io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").with_args(["-c", script])
    }

    fn supervisor() -> (
        ProcessSupervisor,
        Arc<MemoryLogSink>,
        UnboundedReceiver<StateChange>,
    ) {
        let store = Arc::new(DeviceStateStore::new());
        let (observer, rx) = ChannelObserver::new();
        store.subscribe(Arc::new(observer));
        let sink = Arc::new(MemoryLogSink::new(100));
        let supervisor = ProcessSupervisor::new(store, sink.clone()).with_timeouts(StopTimeouts {
            grace: Duration::from_millis(500),
            kill_wait: Duration::from_secs(2),
        });
        (supervisor, sink, rx)
    }

    async fn next_status(rx: &mut UnboundedReceiver<StateChange>) -> ProcessStatus {
        loop {
            let change = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("change in time")
                .expect("channel open");
            if let StateChange::ProcessStatus(status) = change {
                return status;
            }
        }
    }

    #[tokio::test]
    async fn test_session_updates_store_and_log() {
        let (mut supervisor, sink, mut rx) = supervisor();
        let script = "echo 'Using MAC of \"AA:BB:CC:DD:EE:FF\"'; \
                      echo 'Current battery level is 57 app.py'; \
                      echo 'Plus button PRESSED'; \
                      echo 'unrelated noise'";

        supervisor.start(&sh(script)).await.unwrap();
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);
        assert_eq!(next_status(&mut rx).await, ProcessStatus::NotRunning);

        let state = supervisor.store().device_state();
        assert_eq!(state.connection, ConnectionStatus::Connected);
        assert_eq!(state.device_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(state.battery_level, Some(57));
        assert_eq!(state.button_a, ButtonState::Pressed);

        // Every line reaches the log, matched or not
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.lines()[3], "unrelated noise");
        assert_eq!(supervisor.status(), ProcessStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let (mut supervisor, _sink, mut rx) = supervisor();

        supervisor.start(&sh("exec sleep 30")).await.unwrap();
        let pid = supervisor.pid();
        assert!(pid.is_some());

        supervisor.start(&sh("exec sleep 30")).await.unwrap();
        assert_eq!(supervisor.pid(), pid);
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);

        supervisor.stop().await;
        assert_eq!(next_status(&mut rx).await, ProcessStatus::NotRunning);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_terminates_running_worker() {
        let (mut supervisor, sink, mut rx) = supervisor();

        supervisor
            .start(&sh("echo 'Minus button PRESSED'; exec sleep 30"))
            .await
            .unwrap();
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);

        // Wait until the first line has been processed
        timeout(Duration::from_secs(5), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        supervisor.stop().await;
        assert_eq!(supervisor.status(), ProcessStatus::NotRunning);
        assert_eq!(supervisor.pid(), None);

        let state = supervisor.store().device_state();
        assert_eq!(state.button_b, ButtonState::Pressed);
        assert_eq!(next_status(&mut rx).await, ProcessStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_no_updates_after_stop_returns() {
        let store = Arc::new(DeviceStateStore::new());
        let sink = Arc::new(CountingSink::default());
        let mut supervisor = ProcessSupervisor::new(Arc::clone(&store), sink.clone())
            .with_timeouts(StopTimeouts {
                grace: Duration::from_millis(200),
                kill_wait: Duration::from_secs(2),
            });

        // Ignores SIGTERM and keeps changing the state until killed
        let script = "trap '' TERM; n=0; while true; do \
                      n=$((n + 1)); \
                      echo \"Current battery level is $((n % 100)) app.py\"; \
                      echo 'Plus button PRESSED'; \
                      echo 'Plus button RELEASED'; \
                      done";
        supervisor.start(&sh(script)).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while sink.count() < 100 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        supervisor.stop().await;
        let lines = sink.count();
        let state = store.device_state();
        assert_eq!(store.process_status(), ProcessStatus::NotRunning);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.count(), lines);
        assert_eq!(store.device_state(), state);
        assert_eq!(store.process_status(), ProcessStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let (mut supervisor, _sink, mut rx) = supervisor();

        supervisor.stop().await;
        assert_eq!(supervisor.status(), ProcessStatus::NotRunning);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_escalates_when_sigterm_ignored() {
        let (mut supervisor, _sink, mut rx) = supervisor();

        supervisor
            .start(&sh("trap '' TERM; echo ready; while true; do sleep 1; done"))
            .await
            .unwrap();
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);

        let started = std::time::Instant::now();
        supervisor.stop().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(supervisor.status(), ProcessStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_restart_after_exit() {
        let (mut supervisor, sink, mut rx) = supervisor();

        supervisor.start(&sh("echo first")).await.unwrap();
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);
        assert_eq!(next_status(&mut rx).await, ProcessStatus::NotRunning);

        supervisor.start(&sh("echo second")).await.unwrap();
        assert_eq!(next_status(&mut rx).await, ProcessStatus::Running);
        assert_eq!(next_status(&mut rx).await, ProcessStatus::NotRunning);

        assert_eq!(sink.lines(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_status_untouched() {
        let (mut supervisor, _sink, mut rx) = supervisor();

        let result = supervisor
            .start(&WorkerCommand::new("/nonexistent/clickwatch-worker"))
            .await;

        assert!(matches!(result, Err(SpawnError::NotFound { .. })));
        assert_eq!(supervisor.status(), ProcessStatus::NotRunning);
        assert!(!supervisor.is_running());
        assert!(rx.try_recv().is_err());
    }
}
