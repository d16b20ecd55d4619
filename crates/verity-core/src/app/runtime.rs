//! Runtime - スケジューラとスーパーバイザを一つのループで駆動する
//!
//! The scheduler is owned by a single task. Inbound messages, supervisor
//! notices and the periodic tick are all handled there, one at a time, and
//! every handled event is followed by an eager tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::status::RuntimeStatus;
use crate::config::{BackendConfig, CoreConfig};
use crate::domain::{BackendState, Inbound, StatusNotification, UserCommand};
use crate::error::ChannelError;
use crate::ports::{BackendClient, Clock, CommandChannel, EventSink, IdGenerator, ProcessLauncher};
use crate::queue::{Scheduler, SchedulerPorts};
use crate::supervisor::{Supervisor, SupervisorDeps, SupervisorNotice};

/// Builds the `BackendClient` for a given configuration.
pub type ClientFactory = Arc<dyn Fn(&CoreConfig) -> Arc<dyn BackendClient> + Send + Sync>;

/// A wired but not yet started runtime. See `RuntimeBuilder`.
pub struct Runtime {
    pub(crate) config: CoreConfig,
    pub(crate) backend: BackendConfig,
    pub(crate) channel: Arc<dyn CommandChannel>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) launcher: Arc<dyn ProcessLauncher>,
    pub(crate) client_factory: ClientFactory,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Runtime {
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Name of the backend `start` launches.
    pub fn backend_name(&self) -> &str {
        &self.backend.name
    }

    /// Spawns the supervisor and the scheduler loop, then launches the
    /// selected backend. Must be called inside a tokio runtime.
    pub fn start(self) -> RuntimeHandle {
        let client = (self.client_factory)(&self.config);
        let (supervisor, notices, supervisor_join) = Supervisor::spawn(
            self.config.clone(),
            SupervisorDeps {
                launcher: self.launcher,
                client,
                sink: Arc::clone(&self.sink),
            },
        );

        let scheduler = Scheduler::new(
            SchedulerPorts {
                channel: self.channel,
                status: Arc::new(supervisor.clone()),
                sink: Arc::clone(&self.sink),
                ids: self.ids,
                clock: self.clock,
            },
            self.config.preferences.clone(),
        )
        .with_workspace_root(self.config.workspace_root.clone());

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RuntimeStatus::default());
        let shutdown = CancellationToken::new();

        info!(backend = %self.backend.name, "starting verification runtime");
        supervisor.start_or_restart(self.backend.clone(), false);

        let event_loop = EventLoop {
            scheduler,
            supervisor: supervisor.clone(),
            notices,
            inbound: inbound_rx,
            tick_interval: self.config.tick_interval(),
            config: self.config,
            active_backend: self.backend.name,
            sink: self.sink,
            client_factory: self.client_factory,
            status: status_tx,
        };
        let join = tokio::spawn(event_loop.run(shutdown.clone()));

        RuntimeHandle {
            inbound: inbound_tx,
            status: status_rx,
            supervisor,
            shutdown,
            join,
            supervisor_join,
        }
    }
}

/// Handle to a running runtime.
pub struct RuntimeHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    status: watch::Receiver<RuntimeStatus>,
    supervisor: Supervisor,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    supervisor_join: JoinHandle<()>,
}

impl RuntimeHandle {
    pub fn send(&self, message: Inbound) -> Result<(), ChannelError> {
        self.inbound.send(message).map_err(|_| ChannelError::Closed)
    }

    /// Sender for feeding the runtime from another task.
    pub fn sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound.clone()
    }

    /// Snapshot published after the latest tick.
    pub fn status(&self) -> RuntimeStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeStatus> {
        self.status.clone()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Stops the scheduler loop, then the backend process.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "runtime loop ended abnormally");
        }
        self.supervisor.stop().await;
        drop(self.supervisor);
        if let Err(e) = self.supervisor_join.await {
            warn!(error = %e, "supervisor ended abnormally");
        }
        info!("verification runtime stopped");
    }
}

struct EventLoop {
    scheduler: Scheduler,
    supervisor: Supervisor,
    notices: mpsc::UnboundedReceiver<SupervisorNotice>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    tick_interval: Duration,
    config: CoreConfig,
    active_backend: String,
    sink: Arc<dyn EventSink>,
    client_factory: ClientFactory,
    status: watch::Sender<RuntimeStatus>,
}

impl EventLoop {
    async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(notice) = self.notices.recv() => self.on_notice(notice),
                message = self.inbound.recv() => match message {
                    Some(message) => self.on_inbound(message),
                    None => {
                        debug!("inbound channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => {}
            }
            self.scheduler.tick();
            self.publish();
        }
    }

    fn on_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Editor(event) => self.scheduler.handle_editor(event),
            Inbound::Backend(event) => self.scheduler.handle_backend(event),
            Inbound::Command(UserCommand::Verify { manually_triggered }) => {
                self.scheduler.request_verify(manually_triggered);
            }
            Inbound::Command(UserCommand::StopVerification) => {
                self.scheduler.request_stop(true);
            }
            Inbound::Command(UserCommand::SelectBackend { name }) => self.select_backend(&name),
            Inbound::ConfigurationChanged(config) => self.reconfigure(config),
        }
    }

    fn on_notice(&mut self, notice: SupervisorNotice) {
        match notice {
            SupervisorNotice::AbortVerifications => {
                self.scheduler.request_stop(false);
            }
            SupervisorNotice::StateChanged(BackendState::Stopped) => self.scheduler.backend_stopped(),
            SupervisorNotice::StateChanged(_) => {}
            SupervisorNotice::Ready { name, restarted } => {
                self.scheduler.backend_ready(&name, restarted);
                self.active_backend = name;
            }
        }
    }

    fn select_backend(&mut self, name: &str) {
        let Some(backend) = self.config.backend(name).cloned() else {
            warn!(backend = name, available = ?self.config.backend_names(), "unknown backend");
            self.sink.notify(StatusNotification::Hint {
                message: format!("Unknown verification backend `{name}`"),
            });
            return;
        };
        // 起動中の要求は supervisor が捨てるので、active は Ready で更新する
        info!(backend = name, "switching verification backend");
        self.supervisor.start_or_restart(backend, true);
    }

    fn reconfigure(&mut self, config: CoreConfig) {
        if let Err(e) = config.validate() {
            warn!(error = %e, "ignoring invalid configuration");
            self.sink.notify(StatusNotification::Hint {
                message: format!("The configuration is invalid: {e}"),
            });
            return;
        }
        let restart = self.config.requires_restart(&config, &self.active_backend)
            || !self.supervisor.is_ready();

        self.scheduler
            .reconfigure(config.preferences.clone(), config.workspace_root.clone());
        let client = (self.client_factory)(&config);
        self.supervisor.reconfigure(config.clone(), Some(client));
        self.config = config;

        if restart
            && let Some(backend) = self.config.select_backend(Some(&self.active_backend)).cloned()
        {
            info!(backend = %backend.name, "configuration changed, restarting backend");
            self.supervisor.start_or_restart(backend, true);
        }
    }

    fn publish(&self) {
        let next = RuntimeStatus {
            backend: self.supervisor.state(),
            queue: self.scheduler.snapshot(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
