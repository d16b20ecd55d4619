//! In-memory collaborators for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Preferences;
use crate::domain::{BackendRequest, DocumentUri, StatusNotification};
use crate::error::{ChannelError, ProcessError};
use crate::ports::{
    BackendClient, BackendStatus, CommandChannel, CommandSpec, EventSink, FixedClock,
    ProcessEvent, ProcessLauncher, RuntimeCheck, SpawnedProcess, UlidGenerator,
};
use crate::queue::{Scheduler, SchedulerPorts};

pub(crate) fn uri(name: &str) -> DocumentUri {
    DocumentUri::new(format!("file:///{name}.vpr"))
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub(crate) struct RecordingChannel {
    requests: Mutex<Vec<BackendRequest>>,
    closed: AtomicBool,
}

impl RecordingChannel {
    pub fn requests(&self) -> Vec<BackendRequest> {
        lock(&self.requests).clone()
    }

    pub fn verifies(&self) -> Vec<DocumentUri> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                BackendRequest::Verify { uri, .. } => Some(uri),
                BackendRequest::Stop { .. } => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<DocumentUri> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                BackendRequest::Stop { uri } => Some(uri),
                BackendRequest::Verify { .. } => None,
            })
            .collect()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn push(&self, request: BackendRequest) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        lock(&self.requests).push(request);
        Ok(())
    }
}

impl CommandChannel for RecordingChannel {
    fn send_verify(
        &self,
        uri: &DocumentUri,
        manually_triggered: bool,
        workspace_root: Option<&Path>,
    ) -> Result<(), ChannelError> {
        self.push(BackendRequest::Verify {
            uri: uri.clone(),
            manually_triggered,
            workspace_root: workspace_root.map(Path::to_path_buf),
        })
    }

    fn send_stop(&self, uri: &DocumentUri) -> Result<(), ChannelError> {
        self.push(BackendRequest::Stop { uri: uri.clone() })
    }
}

#[derive(Default)]
pub(crate) struct FlagStatus(AtomicBool);

impl FlagStatus {
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }
}

impl BackendStatus for FlagStatus {
    fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink(Mutex<Vec<StatusNotification>>);

impl RecordingSink {
    pub fn notifications(&self) -> Vec<StatusNotification> {
        lock(&self.0).clone()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, notification: StatusNotification) {
        lock(&self.0).push(notification);
    }
}

/// Scheduler wired to recording fakes.
pub(crate) struct Harness {
    pub scheduler: Scheduler,
    pub channel: Arc<RecordingChannel>,
    pub status: Arc<FlagStatus>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// Backend not ready yet.
    pub fn new() -> Self {
        let channel = Arc::new(RecordingChannel::default());
        let status = Arc::new(FlagStatus::default());
        let sink = Arc::new(RecordingSink::default());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let ports = SchedulerPorts {
            channel: channel.clone(),
            status: status.clone(),
            sink: sink.clone(),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock: Arc::new(clock),
        };
        Self {
            scheduler: Scheduler::new(ports, Preferences::default()),
            channel,
            status,
            sink,
        }
    }

    pub fn ready() -> Self {
        let h = Self::new();
        h.status.set_ready(true);
        h
    }
}

/// Scripted `BackendClient`.
pub(crate) struct FakeBackendClient {
    alive_after: Option<u32>,
    check: RuntimeCheck,
    probes: AtomicU32,
    checks: AtomicU32,
    shutdowns: Mutex<Vec<u16>>,
}

impl FakeBackendClient {
    /// Compatible 64-bit runtime, server answers the first probe.
    pub fn new() -> Self {
        Self {
            alive_after: Some(1),
            check: RuntimeCheck {
                version: Some("1.8.0".into()),
                is_64bit: true,
                compatible: true,
            },
            probes: AtomicU32::new(0),
            checks: AtomicU32::new(0),
            shutdowns: Mutex::new(Vec::new()),
        }
    }

    pub fn alive_after(mut self, probes: u32) -> Self {
        self.alive_after = Some(probes);
        self
    }

    pub fn never_alive(mut self) -> Self {
        self.alive_after = None;
        self
    }

    pub fn incompatible(mut self) -> Self {
        self.check = RuntimeCheck {
            version: Some("1.7.0".into()),
            is_64bit: true,
            compatible: false,
        };
        self
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn runtime_checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn shutdown_requests(&self) -> Vec<u16> {
        lock(&self.shutdowns).clone()
    }
}

#[async_trait]
impl BackendClient for FakeBackendClient {
    async fn check_runtime(&self) -> Result<RuntimeCheck, ProcessError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.check.clone())
    }

    async fn is_alive(&self, _port: u16) -> bool {
        let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.alive_after.is_some_and(|after| n >= after)
    }

    async fn request_shutdown(&self, port: u16) -> Result<(), ProcessError> {
        lock(&self.shutdowns).push(port);
        Ok(())
    }
}

struct FakeProcess {
    events: mpsc::UnboundedSender<ProcessEvent>,
    kill: CancellationToken,
}

/// `ProcessLauncher` whose processes only do what the test tells them.
///
/// A spawned process prints the nailgun banner unless `silent`, and exits
/// when killed.
pub(crate) struct FakeLauncher {
    banner: Option<String>,
    spawned: Mutex<Vec<CommandSpec>>,
    processes: Mutex<Vec<FakeProcess>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            banner: Some("NGServer 0.9.1 started on 127.0.0.1, port 7654.".into()),
            spawned: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
        }
    }

    pub fn silent(mut self) -> Self {
        self.banner = None;
        self
    }

    pub fn spawned(&self) -> Vec<CommandSpec> {
        lock(&self.spawned).clone()
    }

    /// Whether the `index`-th spawned process was killed.
    pub fn killed(&self, index: usize) -> bool {
        lock(&self.processes)
            .get(index)
            .is_some_and(|p| p.kill.is_cancelled())
    }

    pub fn emit(&self, index: usize, event: ProcessEvent) {
        if let Some(p) = lock(&self.processes).get(index) {
            let _ = p.events.send(event);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, spec: &CommandSpec) -> Result<SpawnedProcess, ProcessError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();
        if let Some(banner) = &self.banner {
            let _ = tx.send(ProcessEvent::Stdout(banner.clone()));
        }

        let on_kill = kill.clone();
        let exit_tx = tx.clone();
        tokio::spawn(async move {
            on_kill.cancelled().await;
            let _ = exit_tx.send(ProcessEvent::Exited(None));
        });

        lock(&self.spawned).push(spec.clone());
        lock(&self.processes).push(FakeProcess {
            events: tx,
            kill: kill.clone(),
        });
        Ok(SpawnedProcess {
            pid: None,
            events: rx,
            kill,
        })
    }
}
