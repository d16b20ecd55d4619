//! Supervisor actor: owns the backend process and its lifecycle flags.
//!
//! Every mutation happens on the actor task. Long operations (runtime
//! check, readiness poll, startup timer, graceful shutdown) run in spawned
//! tasks that report back as `Internal` events tagged with the instance
//! they belong to, so results for a superseded instance are dropped.
//!
//! State transitions:
//! - Stopped -> Starting -> Ready
//! - Ready -> Stopping -> Stopped
//! - Starting -> Stopped (runtime check failed, spawn failed, unexpected exit)
//! - Starting -> Stopping -> Stopped (startup timeout, readiness exhausted, stop)

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::command::{launch_command, resolve_port};
use super::readiness::{Readiness, ReadinessPolicy, poll_until_alive};
use crate::config::{BackendConfig, CoreConfig};
use crate::domain::{BackendState, StatusNotification};
use crate::error::ProcessError;
use crate::ports::{
    BackendClient, EventSink, ProcessEvent, ProcessLauncher, RuntimeCheck, SpawnedProcess,
};

pub(crate) const JRE_HINT: &str =
    "No compatible Java 8 (64bit) Runtime Environment is installed. Please install it.";

/// Requests accepted by the actor.
pub enum SupervisorCommand {
    StartOrRestart {
        backend: BackendConfig,
        reverify: bool,
    },
    Stop {
        done: oneshot::Sender<()>,
    },
    Reconfigure {
        config: Box<CoreConfig>,
        client: Option<Arc<dyn BackendClient>>,
    },
}

/// What the scheduler side needs to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorNotice {
    /// A (re)start is about to replace the backend; running work must stop.
    AbortVerifications,
    StateChanged(BackendState),
    Ready { name: String, restarted: bool },
}

enum Internal {
    RuntimeChecked {
        generation: u64,
        backend: BackendConfig,
        check: Result<RuntimeCheck, ProcessError>,
    },
    Process {
        instance: u64,
        event: ProcessEvent,
    },
    ReadinessSettled {
        instance: u64,
        outcome: Readiness,
    },
    StartupTimedOut {
        instance: u64,
        timeout_ms: u64,
    },
    ShutdownFinished {
        instance: u64,
    },
}

struct Instance {
    id: u64,
    port: u16,
    backend: BackendConfig,
    kill: CancellationToken,
    exited: CancellationToken,
    readiness: CancellationToken,
    marker_seen: bool,
}

pub(crate) struct SupervisorActor {
    config: CoreConfig,
    launcher: Arc<dyn ProcessLauncher>,
    client: Arc<dyn BackendClient>,
    sink: Arc<dyn EventSink>,
    notices: mpsc::UnboundedSender<SupervisorNotice>,
    state: watch::Sender<BackendState>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,

    /// Incremented on every launch. Timers and polls carry the value they
    /// were armed with.
    instance_count: u64,
    starting_or_restarting: bool,
    /// Incremented on every accepted start request.
    generation: u64,
    reverify: bool,

    current: Option<Instance>,
    /// Instance whose graceful shutdown is in flight.
    shutting_down: Option<u64>,
    /// Backend to launch once the running instance is gone.
    pending: Option<BackendConfig>,
    port: Option<u16>,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

impl SupervisorActor {
    pub(crate) fn new(
        config: CoreConfig,
        launcher: Arc<dyn ProcessLauncher>,
        client: Arc<dyn BackendClient>,
        sink: Arc<dyn EventSink>,
        notices: mpsc::UnboundedSender<SupervisorNotice>,
        state: watch::Sender<BackendState>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            launcher,
            client,
            sink,
            notices,
            state,
            internal_tx,
            internal_rx,
            instance_count: 0,
            starting_or_restarting: false,
            generation: 0,
            reverify: true,
            current: None,
            shutting_down: None,
            pending: None,
            port: None,
            stop_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SupervisorCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event),
            }
        }
        // ハンドルが全部落ちた: プロセスを残さない
        if let Some(instance) = self.current.take() {
            debug!(instance = instance.id, "supervisor dropped, killing backend");
            instance.readiness.cancel();
            instance.kill.cancel();
        }
    }

    fn handle_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::StartOrRestart { backend, reverify } => {
                self.start_or_restart(backend, reverify)
            }
            SupervisorCommand::Stop { done } => self.stop(done),
            SupervisorCommand::Reconfigure { config, client } => {
                self.config = *config;
                if let Some(client) = client {
                    self.client = client;
                }
            }
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::RuntimeChecked {
                generation,
                backend,
                check,
            } => self.on_runtime_checked(generation, backend, check),
            Internal::Process { instance, event } => self.on_process_event(instance, event),
            Internal::ReadinessSettled { instance, outcome } => {
                self.on_readiness_settled(instance, outcome)
            }
            Internal::StartupTimedOut {
                instance,
                timeout_ms,
            } => self.on_startup_timeout(instance, timeout_ms),
            Internal::ShutdownFinished { instance } => self.on_shutdown_finished(instance),
        }
    }

    fn start_or_restart(&mut self, backend: BackendConfig, reverify: bool) {
        if self.starting_or_restarting {
            debug!(backend = %backend.name, "already starting or restarting, ignoring");
            return;
        }
        self.reverify = reverify;
        self.starting_or_restarting = true;
        self.generation += 1;
        if self.state() != BackendState::Stopped {
            let _ = self.notices.send(SupervisorNotice::AbortVerifications);
        }

        let generation = self.generation;
        let client = Arc::clone(&self.client);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let check = client.check_runtime().await;
            let _ = tx.send(Internal::RuntimeChecked {
                generation,
                backend,
                check,
            });
        });
    }

    fn on_runtime_checked(
        &mut self,
        generation: u64,
        backend: BackendConfig,
        check: Result<RuntimeCheck, ProcessError>,
    ) {
        if generation != self.generation || !self.starting_or_restarting {
            debug!(generation, "start request was withdrawn");
            return;
        }
        match check {
            Ok(check) if check.compatible => {
                if !check.is_64bit {
                    error!(
                        version = ?check.version,
                        "java runtime is not 64-bit, the nailgun server will possibly not work"
                    );
                }
                self.pending = Some(backend);
                if self.current.is_some() {
                    self.begin_shutdown();
                } else if self.shutting_down.is_none() {
                    self.launch_pending();
                }
            }
            other => {
                match other {
                    Ok(check) => warn!(version = ?check.version, "incompatible java runtime"),
                    Err(e) => warn!(error = %e, "java runtime check failed"),
                }
                self.hint(JRE_HINT);
                self.starting_or_restarting = false;
                if self.current.is_some() {
                    self.begin_shutdown();
                } else {
                    self.set_state(BackendState::Stopped);
                }
            }
        }
    }

    fn launch_pending(&mut self) {
        let Some(backend) = self.pending.take() else {
            return;
        };
        if let Err(e) = self.launch(backend) {
            error!(error = %e, "failed to start nailgun server");
            self.hint(&format!("Failed to start the verification backend: {e}"));
            self.starting_or_restarting = false;
            self.set_state(BackendState::Stopped);
        }
    }

    fn launch(&mut self, backend: BackendConfig) -> Result<(), ProcessError> {
        let port = resolve_port(self.config.nailgun.port, self.port)?;
        let spec = launch_command(&self.config, &backend, port)?;
        self.port = Some(port);

        info!(backend = %backend.name, port, "starting nailgun server");
        self.sink.notify(StatusNotification::BackendChanged {
            name: backend.name.clone(),
        });
        self.set_state_for(BackendState::Starting, Some(backend.name.clone()));
        debug!(command = %spec.display(), "launch command");

        self.instance_count += 1;
        let id = self.instance_count;
        let timeout = self.config.startup_timeout(&backend);
        let SpawnedProcess {
            pid,
            mut events,
            kill,
        } = self.launcher.spawn(&spec)?;
        debug!(instance = id, ?pid, "nailgun server process spawned");

        let exited = CancellationToken::new();
        let tx = self.internal_tx.clone();
        let exited_signal = exited.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let done = matches!(event, ProcessEvent::Exited(_));
                if done {
                    exited_signal.cancel();
                }
                if tx.send(Internal::Process { instance: id, event }).is_err() || done {
                    break;
                }
            }
            exited_signal.cancel();
        });

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Internal::StartupTimedOut {
                instance: id,
                timeout_ms: timeout.as_millis() as u64,
            });
        });

        self.current = Some(Instance {
            id,
            port,
            backend,
            kill,
            exited,
            readiness: CancellationToken::new(),
            marker_seen: false,
        });
        Ok(())
    }

    fn on_process_event(&mut self, instance: u64, event: ProcessEvent) {
        let state = self.state();
        let Some(current) = self.current.as_mut().filter(|c| c.id == instance) else {
            trace!(instance, ?event, "output from a previous instance");
            return;
        };
        match event {
            ProcessEvent::Stdout(line) => {
                trace!(origin = "NS", instance, %line);
                if !current.marker_seen
                    && state == BackendState::Starting
                    && line.contains(&current.backend.ready_marker)
                {
                    current.marker_seen = true;
                    let client = Arc::clone(&self.client);
                    let tx = self.internal_tx.clone();
                    let port = current.port;
                    let cancel = current.readiness.clone();
                    let policy = ReadinessPolicy::from_settings(&self.config.readiness);
                    debug!(instance, port, "ready marker seen, polling");
                    tokio::spawn(async move {
                        let outcome = poll_until_alive(client.as_ref(), port, policy, &cancel).await;
                        let _ = tx.send(Internal::ReadinessSettled { instance, outcome });
                    });
                }
            }
            ProcessEvent::Stderr(line) => debug!(origin = "NS", instance, %line),
            ProcessEvent::Exited(code) => {
                error!(instance, ?code, %state, "nailgun server exited unexpectedly");
                if let Some(current) = self.current.take() {
                    current.readiness.cancel();
                }
                self.starting_or_restarting = false;
                self.pending = None;
                self.set_state(BackendState::Stopped);
                self.resolve_waiters();
            }
        }
    }

    fn on_readiness_settled(&mut self, instance: u64, outcome: Readiness) {
        if self.current.as_ref().map(|c| c.id) != Some(instance) {
            debug!(instance, "readiness result for a previous instance");
            return;
        }
        match outcome {
            Readiness::Alive { attempts } => {
                debug!(instance, attempts, "nailgun server confirmed running");
                self.set_ready();
            }
            Readiness::Exhausted => {
                error!(instance, "a problem with nailgun was detected, it cannot be started");
                self.hint("The verification backend could not be started");
                self.starting_or_restarting = false;
                self.pending = None;
                self.begin_shutdown();
            }
            Readiness::Cancelled => {}
        }
    }

    fn on_startup_timeout(&mut self, instance: u64, timeout_ms: u64) {
        if self.state().is_ready() || self.current.as_ref().map(|c| c.id) != Some(instance) {
            trace!(instance, "startup timer expired for a settled instance");
            return;
        }
        error!(instance, timeout_ms, "the nailgun server startup timed out");
        self.hint(&format!(
            "The verification backend startup timed out after {timeout_ms}ms"
        ));
        self.starting_or_restarting = false;
        self.pending = None;
        self.begin_shutdown();
    }

    fn stop(&mut self, done: oneshot::Sender<()>) {
        self.starting_or_restarting = false;
        self.pending = None;
        self.stop_waiters.push(done);
        if self.shutting_down.is_some() {
            return;
        }
        if self.current.is_some() {
            self.begin_shutdown();
        } else {
            self.set_state(BackendState::Stopped);
            self.resolve_waiters();
        }
    }

    /// Asks the current instance to stop, escalating to a kill after the
    /// grace period. Ends with `ShutdownFinished`.
    fn begin_shutdown(&mut self) {
        let Some(instance) = self.current.take() else {
            return;
        };
        instance.readiness.cancel();
        self.shutting_down = Some(instance.id);
        self.set_state(BackendState::Stopping);
        info!(instance = instance.id, port = instance.port, "gracefully shutting down nailgun server");

        let client = Arc::clone(&self.client);
        let tx = self.internal_tx.clone();
        let grace = std::time::Duration::from_millis(self.config.readiness.shutdown_grace_ms);
        tokio::spawn(async move {
            if !instance.exited.is_cancelled() {
                if let Err(e) = client.request_shutdown(instance.port).await {
                    warn!(instance = instance.id, error = %e, "ng-stop failed");
                }
                tokio::select! {
                    _ = instance.exited.cancelled() => {}
                    _ = tokio::time::sleep(grace) => {
                        warn!(instance = instance.id, "nailgun server ignored ng-stop, killing it");
                        instance.kill.cancel();
                        if tokio::time::timeout(grace, instance.exited.cancelled()).await.is_err() {
                            error!(instance = instance.id, "nailgun server did not exit after kill");
                        }
                    }
                }
            }
            let _ = tx.send(Internal::ShutdownFinished {
                instance: instance.id,
            });
        });
    }

    fn on_shutdown_finished(&mut self, instance: u64) {
        if self.shutting_down != Some(instance) {
            return;
        }
        self.shutting_down = None;
        info!(instance, "nailgun server is stopped");
        self.set_state(BackendState::Stopped);
        if self.starting_or_restarting && self.pending.is_some() {
            self.launch_pending();
        } else {
            self.resolve_waiters();
        }
    }

    fn set_ready(&mut self) {
        self.starting_or_restarting = false;
        let name = self
            .current
            .as_ref()
            .map(|c| c.backend.name.clone())
            .unwrap_or_default();
        info!(backend = %name, "nailgun started");
        self.set_state(BackendState::Ready);
        self.sink.notify(StatusNotification::BackendReady {
            name: name.clone(),
            restarted: self.reverify,
        });
        let _ = self.notices.send(SupervisorNotice::Ready {
            name,
            restarted: self.reverify,
        });
    }

    fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    fn set_state(&mut self, state: BackendState) {
        self.set_state_for(state, None);
    }

    fn set_state_for(&mut self, state: BackendState, backend_name: Option<String>) {
        if self.state() == state {
            return;
        }
        debug!(%state, "backend state");
        self.state.send_replace(state);
        self.sink
            .notify(StatusNotification::StateChanged { state, backend_name });
        let _ = self.notices.send(SupervisorNotice::StateChanged(state));
    }

    fn resolve_waiters(&mut self) {
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn hint(&self, message: &str) {
        self.sink.notify(StatusNotification::Hint {
            message: message.to_string(),
        });
    }
}
