//! State-change notifications for external consumers
//!
//! The store calls observers synchronously on the thread that made the
//! change, which is usually the worker task. Consumers with their own event
//! loop should use [`ChannelObserver`] and drain the receiver there instead
//! of touching their own state from the callback.

use tokio::sync::mpsc;

use clickwatch_core::prelude::*;
use clickwatch_core::{DeviceState, ProcessStatus};

/// Receives change notifications from a [`crate::DeviceStateStore`].
///
/// Callbacks may read the store but must not call `apply` on it.
pub trait Observer: Send + Sync {
    fn on_process_status_changed(&self, _status: ProcessStatus) {}

    fn on_device_state_changed(&self, _state: &DeviceState) {}
}

/// One notification, as delivered by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    ProcessStatus(ProcessStatus),
    DeviceState(DeviceState),
}

/// Observer that forwards every notification into an unbounded channel.
///
/// Unbounded so the worker never waits on a slow consumer. The channel item
/// defaults to [`StateChange`]; an event loop that merges other inputs into
/// the same channel can use its own type via [`ChannelObserver::from_sender`].
#[derive(Debug, Clone)]
pub struct ChannelObserver<T = StateChange> {
    tx: mpsc::UnboundedSender<T>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StateChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<T: From<StateChange>> ChannelObserver<T> {
    /// Forward into an existing channel, converting each change
    pub fn from_sender(tx: mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }

    fn forward(&self, change: StateChange) {
        if self.tx.send(T::from(change)).is_err() {
            trace!("State change receiver dropped");
        }
    }
}

impl<T: From<StateChange> + Send> Observer for ChannelObserver<T> {
    fn on_process_status_changed(&self, status: ProcessStatus) {
        self.forward(StateChange::ProcessStatus(status));
    }

    fn on_device_state_changed(&self, state: &DeviceState) {
        self.forward(StateChange::DeviceState(state.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_process_status_changed(ProcessStatus::Running);
        observer.on_device_state_changed(&DeviceState::default());

        assert_eq!(
            rx.try_recv().ok(),
            Some(StateChange::ProcessStatus(ProcessStatus::Running))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(StateChange::DeviceState(DeviceState::default()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[derive(Debug, PartialEq)]
    enum Merged {
        Change(StateChange),
        Line(String),
    }

    impl From<StateChange> for Merged {
        fn from(change: StateChange) -> Self {
            Merged::Change(change)
        }
    }

    #[test]
    fn test_shared_channel_keeps_arrival_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::from_sender(tx.clone());

        observer.on_process_status_changed(ProcessStatus::Running);
        tx.send(Merged::Line("Plus button PRESSED".to_string())).unwrap();
        observer.on_process_status_changed(ProcessStatus::NotRunning);

        assert_eq!(
            rx.try_recv().ok(),
            Some(Merged::Change(StateChange::ProcessStatus(ProcessStatus::Running)))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(Merged::Line("Plus button PRESSED".to_string()))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(Merged::Change(StateChange::ProcessStatus(
                ProcessStatus::NotRunning
            )))
        );
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_process_status_changed(ProcessStatus::NotRunning);
    }
}
