//! Backend process supervisor.
//!
//! `Supervisor` is a cheap handle onto a single actor task. The actor
//! publishes its `BackendState` through a watch channel (read by
//! `is_ready`) and reports scheduler-relevant changes as
//! `SupervisorNotice`s.

mod actor;
pub mod command;
pub mod readiness;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

pub use actor::{SupervisorCommand, SupervisorNotice};
pub use command::{launch_command, resolve_port};
pub use readiness::{Readiness, ReadinessPolicy, poll_until_alive};

use crate::config::{BackendConfig, CoreConfig};
use crate::domain::BackendState;
use crate::ports::{BackendClient, BackendStatus, EventSink, ProcessLauncher};
use actor::SupervisorActor;

/// Collaborators of the supervisor actor.
#[derive(Clone)]
pub struct SupervisorDeps {
    pub launcher: Arc<dyn ProcessLauncher>,
    pub client: Arc<dyn BackendClient>,
    pub sink: Arc<dyn EventSink>,
}

#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    state: watch::Receiver<BackendState>,
}

impl Supervisor {
    /// Spawns the actor on the current runtime.
    pub fn spawn(
        config: CoreConfig,
        deps: SupervisorDeps,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorNotice>, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BackendState::Stopped);

        let actor = SupervisorActor::new(
            config,
            deps.launcher,
            deps.client,
            deps.sink,
            notices_tx,
            state_tx,
        );
        let handle = tokio::spawn(actor.run(commands_rx));

        (
            Self {
                commands: commands_tx,
                state: state_rx,
            },
            notices_rx,
            handle,
        )
    }

    /// Starts `backend`, replacing whatever is running. A no-op while a
    /// previous start has not settled.
    pub fn start_or_restart(&self, backend: BackendConfig, reverify: bool) {
        self.send(SupervisorCommand::StartOrRestart { backend, reverify });
    }

    /// Stops the backend and waits until the process is gone.
    pub async fn stop(&self) {
        let (done, wait) = oneshot::channel();
        self.send(SupervisorCommand::Stop { done });
        let _ = wait.await;
    }

    /// Replaces the settings used for future launches.
    pub fn reconfigure(&self, config: CoreConfig, client: Option<Arc<dyn BackendClient>>) {
        self.send(SupervisorCommand::Reconfigure {
            config: Box::new(config),
            client,
        });
    }

    pub fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.state.clone()
    }

    fn send(&self, command: SupervisorCommand) {
        if self.commands.send(command).is_err() {
            debug!("supervisor is gone, command dropped");
        }
    }
}

impl BackendStatus for Supervisor {
    fn is_ready(&self) -> bool {
        Supervisor::is_ready(self)
    }
}
