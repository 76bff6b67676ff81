//! Thread-safe store for the derived device state and worker status

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use clickwatch_core::prelude::*;
use clickwatch_core::{DeviceState, LogEvent, ProcessStatus};

use crate::observer::Observer;

/// Identifies one run of the worker process.
///
/// Exit reports carry the id of the run they belong to, so a late report
/// from an old run can never overwrite the status of a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunId(u64);

#[derive(Debug, Default)]
struct Inner {
    device: DeviceState,
    status: ProcessStatus,
    run: u64,
    run_finished: bool,
}

/// Holds the latest [`DeviceState`] and [`ProcessStatus`] and notifies
/// observers when either changes.
///
/// Writers are serialized by `write_lock`, which is held across both the
/// mutation and the observer callbacks, so observers see changes in the
/// order they were made. Readers only take the inner read lock and always
/// get a fully updated snapshot.
pub struct DeviceStateStore {
    inner: RwLock<Inner>,
    write_lock: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            write_lock: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer for all future changes
    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        write(&self.observers).push(observer);
    }

    /// Snapshot of the device state
    pub fn device_state(&self) -> DeviceState {
        read(&self.inner).device.clone()
    }

    /// Current worker status
    pub fn process_status(&self) -> ProcessStatus {
        read(&self.inner).status
    }

    /// Apply a classified event. Observers are notified only if the state
    /// actually changed; the return value says whether it did.
    pub fn apply(&self, event: &LogEvent) -> bool {
        let _writer = lock(&self.write_lock);

        let snapshot = {
            let mut inner = write(&self.inner);
            if !inner.device.apply(event) {
                return false;
            }
            inner.device.clone()
        };

        debug!("Device state changed: {}", event.summary());
        for observer in self.observers() {
            observer.on_device_state_changed(&snapshot);
        }
        true
    }

    // ─────────────────────────────────────────────────────────
    // Worker status (written by the supervisor only)
    // ─────────────────────────────────────────────────────────

    /// Open a new run. Status is unchanged until [`Self::mark_running`].
    pub(crate) fn begin_run(&self) -> RunId {
        let _writer = lock(&self.write_lock);
        let mut inner = write(&self.inner);
        inner.run += 1;
        inner.run_finished = false;
        RunId(inner.run)
    }

    /// Report that the worker of `run` was spawned.
    ///
    /// If the worker already exited, observers still get `Running` followed
    /// by `NotRunning` and the stored status stays `NotRunning`. Ignored if
    /// `run` is no longer current.
    pub(crate) fn mark_running(&self, run: RunId) -> bool {
        let _writer = lock(&self.write_lock);

        let already_finished = {
            let mut inner = write(&self.inner);
            if inner.run != run.0 {
                debug!("Ignoring start of stale run {}", run.0);
                return false;
            }
            if !inner.run_finished {
                if inner.status == ProcessStatus::Running {
                    return false;
                }
                inner.status = ProcessStatus::Running;
            }
            inner.run_finished
        };

        self.notify_status(ProcessStatus::Running);
        if already_finished {
            debug!("Worker run {} exited before it was reported running", run.0);
            self.notify_status(ProcessStatus::NotRunning);
        }
        true
    }

    /// Report that the worker of `run` is gone. Idempotent.
    pub(crate) fn finish_run(&self, run: RunId) -> bool {
        let _writer = lock(&self.write_lock);

        {
            let mut inner = write(&self.inner);
            if inner.run != run.0 {
                debug!("Ignoring exit of stale run {}", run.0);
                return false;
            }
            inner.run_finished = true;
            if inner.status == ProcessStatus::NotRunning {
                return false;
            }
            inner.status = ProcessStatus::NotRunning;
        }

        self.notify_status(ProcessStatus::NotRunning);
        true
    }

    fn notify_status(&self, status: ProcessStatus) {
        info!("Worker status: {}", status);
        for observer in self.observers() {
            observer.on_process_status_changed(status);
        }
    }

    fn observers(&self) -> Vec<Arc<dyn Observer>> {
        read(&self.observers).clone()
    }
}

impl std::fmt::Debug for DeviceStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = read(&self.inner);
        f.debug_struct("DeviceStateStore")
            .field("device", &inner.device)
            .field("status", &inner.status)
            .field("observers", &read(&self.observers).len())
            .finish()
    }
}

// A panicking observer must not take the store down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickwatch_core::{ButtonId, ButtonState, ConnectionStatus};

    /// Records every notification it receives
    #[derive(Default)]
    struct Recording {
        statuses: Mutex<Vec<ProcessStatus>>,
        states: Mutex<Vec<DeviceState>>,
    }

    impl Observer for Recording {
        fn on_process_status_changed(&self, status: ProcessStatus) {
            self.statuses.lock().unwrap().push(status);
        }

        fn on_device_state_changed(&self, state: &DeviceState) {
            self.states.lock().unwrap().push(state.clone());
        }
    }

    fn store_with_recorder() -> (DeviceStateStore, Arc<Recording>) {
        let store = DeviceStateStore::new();
        let recorder = Arc::new(Recording::default());
        store.subscribe(recorder.clone());
        (store, recorder)
    }

    #[test]
    fn test_apply_notifies_with_full_snapshot() {
        let (store, recorder) = store_with_recorder();

        assert!(store.apply(&LogEvent::DeviceConnected("AA:BB:CC:DD:EE:FF".to_string())));

        let states = recorder.states.lock().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].connection, ConnectionStatus::Connected);
        assert_eq!(states[0].device_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(store.device_state(), states[0]);
    }

    #[test]
    fn test_unchanged_state_does_not_notify() {
        let (store, recorder) = store_with_recorder();

        assert!(!store.apply(&LogEvent::DeviceDisconnected));
        assert!(!store.apply(&LogEvent::ButtonChanged(
            ButtonId::A,
            ButtonState::Released
        )));
        assert!(recorder.states.lock().unwrap().is_empty());
    }

    #[test]
    fn test_double_disconnect_is_idempotent() {
        let (store, recorder) = store_with_recorder();
        store.apply(&LogEvent::BatteryReading(64));
        store.apply(&LogEvent::DeviceConnected("AA".to_string()));

        store.apply(&LogEvent::DeviceDisconnected);
        let once = store.device_state();
        store.apply(&LogEvent::DeviceDisconnected);

        assert_eq!(store.device_state(), once);
        assert_eq!(once.device_address, None);
        assert_eq!(once.battery_level, Some(64));
        assert_eq!(recorder.states.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_run_lifecycle_notifies_status() {
        let (store, recorder) = store_with_recorder();

        let run = store.begin_run();
        assert_eq!(store.process_status(), ProcessStatus::NotRunning);
        assert!(store.mark_running(run));
        assert_eq!(store.process_status(), ProcessStatus::Running);
        assert!(store.finish_run(run));
        assert!(!store.finish_run(run));

        assert_eq!(
            *recorder.statuses.lock().unwrap(),
            vec![ProcessStatus::Running, ProcessStatus::NotRunning]
        );
    }

    #[test]
    fn test_exit_before_mark_running_still_reports_both_transitions() {
        let (store, recorder) = store_with_recorder();

        let run = store.begin_run();
        assert!(!store.finish_run(run));
        assert!(store.mark_running(run));

        assert_eq!(store.process_status(), ProcessStatus::NotRunning);
        assert_eq!(
            *recorder.statuses.lock().unwrap(),
            vec![ProcessStatus::Running, ProcessStatus::NotRunning]
        );
    }

    #[test]
    fn test_stale_run_cannot_change_status() {
        let store = DeviceStateStore::new();

        let old = store.begin_run();
        store.mark_running(old);
        store.finish_run(old);

        let new = store.begin_run();
        store.mark_running(new);
        assert!(!store.finish_run(old));
        assert_eq!(store.process_status(), ProcessStatus::Running);
    }

    /// Reads the store from inside the callback
    struct Reentrant {
        store: Arc<DeviceStateStore>,
        seen: Mutex<Vec<Option<u8>>>,
    }

    impl Observer for Reentrant {
        fn on_device_state_changed(&self, _state: &DeviceState) {
            let level = self.store.device_state().battery_level;
            self.seen.lock().unwrap().push(level);
        }
    }

    #[test]
    fn test_observer_can_read_store_during_callback() {
        let store = Arc::new(DeviceStateStore::new());
        let observer = Arc::new(Reentrant {
            store: Arc::clone(&store),
            seen: Mutex::new(Vec::new()),
        });
        store.subscribe(observer.clone());

        store.apply(&LogEvent::BatteryReading(33));
        assert_eq!(*observer.seen.lock().unwrap(), vec![Some(33)]);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_state() {
        let store = Arc::new(DeviceStateStore::new());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.apply(&LogEvent::DeviceConnected(format!("MAC-{}", i)));
                    store.apply(&LogEvent::DeviceDisconnected);
                }
            })
        };

        for _ in 0..2000 {
            let state = store.device_state();
            if state.connection == ConnectionStatus::Disconnected {
                assert_eq!(state.device_address, None);
            } else {
                assert!(state.device_address.is_some());
            }
        }

        writer.join().unwrap();
    }
}
