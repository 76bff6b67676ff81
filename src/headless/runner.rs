//! Headless mode runner - main event loop
//!
//! Owns the supervisor, turns store notifications into NDJSON events and
//! executes stdin commands. Exits on `quit`, on SIGINT/SIGTERM, or once
//! stdin is closed and the worker is no longer running. The worker is always
//! stopped before returning.
//!
//! State changes and worker lines share one channel, so events come out in
//! the order the worker task produced them: a line's `device_state` event
//! is always followed by the `line` event for that line.

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

use clickwatch_app::config::Settings;
use clickwatch_app::{
    ChannelObserver, DeviceStateStore, FileLogSink, LogSink, ProcessSupervisor, StateChange,
    TeeSink,
};
use clickwatch_core::prelude::*;
use clickwatch_core::ProcessStatus;

use super::command::{parse_command, Command};
use super::signals::{ShutdownListener, ShutdownSignal};
use super::HeadlessEvent;

/// Input to the headless event loop from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    UnknownCommand(String),
    StdinClosed,
}

/// Output of the worker task, in production order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Update {
    State(StateChange),
    Line(String),
}

impl From<StateChange> for Update {
    fn from(change: StateChange) -> Self {
        Update::State(change)
    }
}

/// Log sink that hands every worker line to the event loop
struct LineEcho {
    tx: mpsc::UnboundedSender<Update>,
}

impl LogSink for LineEcho {
    fn append(&self, line: &str) -> io::Result<()> {
        self.tx
            .send(Update::Line(line.to_string()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event loop gone"))
    }
}

/// Run in headless mode - output NDJSON events on stdout
pub async fn run_headless(settings: Settings) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("clickwatch starting in HEADLESS mode");
    info!("Worker: {}", settings.worker.display());
    info!("Log file: {}", settings.log.file.display());
    info!("═══════════════════════════════════════════════════════");

    let mut signals = match ShutdownListener::install() {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!("{}; running without signal handling", e);
            None
        }
    };

    let (update_tx, mut updates) = mpsc::unbounded_channel::<Update>();
    let store = Arc::new(DeviceStateStore::new());
    store.subscribe(Arc::new(ChannelObserver::from_sender(update_tx.clone())));

    let file_sink: Arc<dyn LogSink> = Arc::new(FileLogSink::new(&settings.log.file));
    let sink: Arc<dyn LogSink> = if settings.log.details {
        Arc::new(
            TeeSink::new()
                .with(file_sink)
                .with(Arc::new(LineEcho { tx: update_tx })),
        )
    } else {
        file_sink
    };

    let mut supervisor = ProcessSupervisor::new(Arc::clone(&store), sink)
        .with_timeouts(settings.supervisor.stop_timeouts());

    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(msg_tx);
    });

    emit_snapshot(&supervisor);

    if settings.supervisor.auto_start {
        start_worker(&mut supervisor, &settings).await;
    }

    headless_event_loop(
        &mut supervisor,
        &settings,
        &mut updates,
        &mut msg_rx,
        &mut signals,
    )
    .await;

    supervisor.stop().await;

    // Report whatever happened during shutdown, ending with the final status
    while let Ok(update) = updates.try_recv() {
        emit_update(update, None);
    }

    info!("clickwatch headless mode exiting");
    Ok(())
}

/// Main headless event loop
async fn headless_event_loop(
    supervisor: &mut ProcessSupervisor,
    settings: &Settings,
    updates: &mut mpsc::UnboundedReceiver<Update>,
    msg_rx: &mut mpsc::Receiver<Message>,
    signals: &mut Option<ShutdownListener>,
) {
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(update) = updates.recv() => {
                let stopped =
                    update == Update::State(StateChange::ProcessStatus(ProcessStatus::NotRunning));
                emit_update(update, supervisor.pid());
                if stopped && !stdin_open {
                    info!("Worker stopped and stdin is closed");
                    break;
                }
            }
            signal = next_signal(signals) => {
                info!("Received {}, stopping worker", signal.name());
                break;
            }
            msg = msg_rx.recv() => match msg {
                Some(Message::Command(Command::Start)) => {
                    start_worker(supervisor, settings).await;
                }
                Some(Message::Command(Command::Stop)) => {
                    supervisor.stop().await;
                }
                Some(Message::Command(Command::Status)) => {
                    emit_snapshot(supervisor);
                }
                Some(Message::Command(Command::Quit)) => {
                    info!("Quit requested");
                    break;
                }
                Some(Message::UnknownCommand(input)) => {
                    HeadlessEvent::error(format!("Unknown command: {}", input), false).emit();
                }
                Some(Message::StdinClosed) => {
                    stdin_open = false;
                    if !supervisor.is_running() {
                        info!("Stdin closed with no worker running");
                        break;
                    }
                }
                None => {
                    info!("Message channel closed");
                    break;
                }
            },
        }
    }
}

async fn start_worker(supervisor: &mut ProcessSupervisor, settings: &Settings) {
    if let Err(e) = supervisor.start(&settings.worker).await {
        let err = Error::from(e);
        HeadlessEvent::error(err.to_string(), err.is_fatal()).emit();
    }
}

fn emit_snapshot(supervisor: &ProcessSupervisor) {
    HeadlessEvent::process_status(supervisor.status(), supervisor.pid()).emit();
    HeadlessEvent::device_state(supervisor.store().device_state()).emit();
}

fn emit_update(update: Update, pid: Option<u32>) {
    match update {
        Update::State(StateChange::ProcessStatus(status)) => {
            let pid = if status.is_running() { pid } else { None };
            HeadlessEvent::process_status(status, pid).emit();
        }
        Update::State(StateChange::DeviceState(state)) => {
            HeadlessEvent::device_state(state).emit()
        }
        Update::Line(line) => HeadlessEvent::line(line).emit(),
    }
}

/// Next shutdown signal, or never if no listener is installed
async fn next_signal(signals: &mut Option<ShutdownListener>) -> ShutdownSignal {
    let Some(listener) = signals.as_mut() else {
        return std::future::pending().await;
    };
    match listener.recv().await {
        Ok(signal) => signal,
        Err(e) => {
            error!("Signal handler error: {}", e);
            *signals = None;
            std::future::pending().await
        }
    }
}

/// Read commands from stdin until it closes or `quit` is read (blocking)
fn spawn_stdin_reader_blocking(msg_tx: mpsc::Sender<Message>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let message = match parse_command(&line) {
            None => continue,
            Some(Ok(command)) => {
                info!("Stdin: {:?} requested", command);
                Message::Command(command)
            }
            Some(Err(input)) => {
                warn!("Unknown stdin command: {}", input);
                Message::UnknownCommand(input)
            }
        };

        let quit = message == Message::Command(Command::Quit);
        if msg_tx.blocking_send(message).is_err() || quit {
            info!("Stdin reader exiting");
            return;
        }
    }

    let _ = msg_tx.blocking_send(Message::StdinClosed);
    info!("Stdin reader exiting");
}
