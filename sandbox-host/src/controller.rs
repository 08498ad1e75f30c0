//! The host controller task
//!
//! Owns the current source text and the link to a runtime. Edits restart a
//! trailing debounce timer; when it fires the latest text is sent as
//! `EXECUTE_CODE`, but only once the runtime has announced `FRAME_READY`.
//! A dispatch that comes due earlier is parked and sent on readiness.

use parking_lot::Mutex;
use sandbox_types::{Failure, HostMessage, HostPort, RuntimeMessage, DEFAULT_QUIET_PERIOD_MS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Called with every failure the runtime reports
pub type FailureHook = Box<dyn Fn(&Failure) + Send + Sync>;

/// Readiness of the runtime as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Waiting for `FRAME_READY`
    Loading,
    Ready,
}

enum Command {
    Edit(String),
    Shutdown,
}

#[derive(Debug)]
struct Shared {
    status: HostStatus,
    source: String,
    last_failure: Option<Failure>,
    dispatches: usize,
}

/// Builder for a controller task
pub struct HostController {
    port: HostPort,
    source: String,
    quiet_period: Duration,
    on_failure: Option<FailureHook>,
}

impl HostController {
    pub fn new(port: HostPort, source: impl Into<String>) -> Self {
        Self {
            port,
            source: source.into(),
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            on_failure: None,
        }
    }

    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn on_failure(mut self, hook: impl Fn(&Failure) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Start the controller on the current tokio runtime
    ///
    /// The initial source counts as an edit made now.
    pub fn spawn(self) -> HostHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            status: HostStatus::Loading,
            source: self.source.clone(),
            last_failure: None,
            dispatches: 0,
        }));
        let task = Task {
            port: self.port,
            commands: commands_rx,
            shared: Arc::clone(&shared),
            source: self.source,
            quiet_period: self.quiet_period,
            on_failure: self.on_failure,
            ready: false,
            parked: false,
            deadline: Some(Instant::now() + self.quiet_period),
        };
        let task = tokio::spawn(task.run());
        HostHandle {
            commands: commands_tx,
            shared,
            task: Some(task),
        }
    }
}

struct Task {
    port: HostPort,
    commands: UnboundedReceiver<Command>,
    shared: Arc<Mutex<Shared>>,
    source: String,
    quiet_period: Duration,
    on_failure: Option<FailureHook>,
    ready: bool,
    /// A dispatch came due before readiness
    parked: bool,
    deadline: Option<Instant>,
}

impl Task {
    async fn run(mut self) {
        loop {
            let timer = sleep_until(self.deadline.unwrap_or_else(Instant::now));
            // An edit landing on the deadline tick restarts the quiet period
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Edit(text)) => self.edit(text),
                    Some(Command::Shutdown) | None => break,
                },
                message = self.port.recv() => match message {
                    Some(message) => self.handle(message),
                    None => {
                        tracing::warn!("Runtime disconnected");
                        break;
                    }
                },
                _ = timer, if self.deadline.is_some() => {
                    self.deadline = None;
                    if self.ready {
                        self.dispatch();
                    } else {
                        tracing::debug!("Runtime not ready, parking dispatch");
                        self.parked = true;
                    }
                }
            }
        }
        tracing::debug!("Host controller stopped");
    }

    fn edit(&mut self, text: String) {
        self.shared.lock().source = text.clone();
        self.source = text;
        self.deadline = Some(Instant::now() + self.quiet_period);
    }

    fn handle(&mut self, message: RuntimeMessage) {
        match message {
            RuntimeMessage::FrameReady => {
                if self.ready {
                    tracing::debug!("Duplicate FRAME_READY ignored");
                    return;
                }
                self.ready = true;
                self.shared.lock().status = HostStatus::Ready;
                tracing::info!("Runtime ready");
                if std::mem::take(&mut self.parked) {
                    self.dispatch();
                }
            }
            RuntimeMessage::ExecutionError { error, stack } => {
                let failure = Failure { message: error, stack };
                tracing::warn!(error = %failure.message, "Execution failed");
                if let Some(hook) = &self.on_failure {
                    hook(&failure);
                }
                self.shared.lock().last_failure = Some(failure);
            }
        }
    }

    fn dispatch(&mut self) {
        let message = HostMessage::ExecuteCode {
            code: self.source.clone(),
        };
        if let Err(err) = self.port.send(message) {
            tracing::warn!(error = %err, "Failed to send code to runtime");
            return;
        }
        let mut shared = self.shared.lock();
        shared.dispatches += 1;
        tracing::debug!(dispatches = shared.dispatches, bytes = self.source.len(), "Code dispatched");
    }
}

/// Handle to a running controller
pub struct HostHandle {
    commands: UnboundedSender<Command>,
    shared: Arc<Mutex<Shared>>,
    task: Option<JoinHandle<()>>,
}

impl HostHandle {
    /// Replace the source text and restart the quiet period
    pub fn edit(&self, text: impl Into<String>) {
        if self.commands.send(Command::Edit(text.into())).is_err() {
            tracing::debug!("Edit after the controller stopped");
        }
    }

    pub fn status(&self) -> HostStatus {
        self.shared.lock().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == HostStatus::Ready
    }

    /// The source text as of the last processed edit
    pub fn source(&self) -> String {
        self.shared.lock().source.clone()
    }

    pub fn last_failure(&self) -> Option<Failure> {
        self.shared.lock().last_failure.clone()
    }

    /// Number of `EXECUTE_CODE` messages sent so far
    pub fn dispatch_count(&self) -> usize {
        self.shared.lock().dispatches
    }

    /// Resolves once the controller task has stopped, for example because
    /// the runtime side of its channel went away
    pub async fn closed(&self) {
        self.commands.closed().await
    }

    /// Stop the controller and wait for its task to finish
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!("Host controller task failed: {}", err);
            }
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
