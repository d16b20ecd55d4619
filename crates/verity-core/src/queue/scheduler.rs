//! Scheduler: the verification work queue.
//!
//! Owns the task queue and the per-document state. Collaborators only
//! enqueue; every effect (dispatching a verify or stop request, updating a
//! document) happens inside `tick()`, one pass at a time.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use super::admission::{Admission, Denial};
use super::compaction::{Compaction, compact};
use super::TaskRecord;
use crate::app::status::QueueSnapshot;
use crate::config::Preferences;
use crate::domain::{
    BackendEvent, DocumentState, DocumentUri, EditorEvent, StatusNotification, TaskId, TaskKind,
    TaskSpec, VerificationOutcome, fingerprint,
};
use crate::error::SchedulerError;
use crate::ports::{BackendStatus, Clock, CommandChannel, EventSink, IdGenerator};

const NOT_READY_HINT: &str = "The verification backend is not ready yet";

/// Collaborators the scheduler talks to.
#[derive(Clone)]
pub struct SchedulerPorts {
    pub channel: Arc<dyn CommandChannel>,
    pub status: Arc<dyn BackendStatus>,
    pub sink: Arc<dyn EventSink>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
}

enum Step {
    /// The head was resolved to `NoOp`; look at the next one.
    Continue,
    /// The head has to wait for a later tick.
    Block,
}

pub struct Scheduler {
    tasks: VecDeque<TaskRecord>,
    documents: HashMap<DocumentUri, DocumentState>,
    active: Option<DocumentUri>,
    preferences: Preferences,
    workspace_root: Option<PathBuf>,
    ports: SchedulerPorts,

    /// Last denial logged, so a waiting `Verify` is reported once per reason.
    last_denial: Option<(TaskId, Denial)>,

    /// Set when the head pass enqueued follow-up work.
    requeued: bool,
}

impl Scheduler {
    pub fn new(ports: SchedulerPorts, preferences: Preferences) -> Self {
        Self {
            tasks: VecDeque::new(),
            documents: HashMap::new(),
            active: None,
            preferences,
            workspace_root: None,
            ports,
            last_denial: None,
            requeued: false,
        }
    }

    pub fn with_workspace_root(mut self, root: Option<PathBuf>) -> Self {
        self.workspace_root = root;
        self
    }

    /// Appends a task to the tail. Never fails.
    pub fn enqueue(&mut self, spec: TaskSpec) -> TaskId {
        let id = self.ports.ids.generate_task_id();
        trace!(task = %id, kind = %spec.kind, target = ?spec.target, "enqueue");
        self.tasks
            .push_back(TaskRecord::new(id, spec, self.ports.clock.now()));
        self.requeued = true;
        id
    }

    /// One reconciliation: compaction, then advance the head until it blocks.
    pub fn tick(&mut self) {
        loop {
            self.requeued = false;
            let summary = compact(&mut self.tasks);
            if summary.disabled > 0 {
                trace!(disabled = summary.disabled, "compacted queue");
            }
            self.advance(&summary);
            // Save が新しい Verify を積んだら、同じ tick でもう一度畳む
            if !self.requeued {
                break;
            }
        }
        // 閉じられた文書は検証が片付いたら捨てる
        self.documents.retain(|_, doc| doc.open || doc.verifying);
    }

    fn advance(&mut self, summary: &Compaction) {
        while let Some(head) = self.tasks.front() {
            if head.kind.is_noop() {
                self.tasks.pop_front();
                continue;
            }
            match self.step(summary) {
                Ok(Step::Continue) => {}
                Ok(Step::Block) => break,
                Err(err) => self.discard_head(err),
            }
        }
    }

    fn step(&mut self, summary: &Compaction) -> Result<Step, SchedulerError> {
        let Some(kind) = self.tasks.front().map(|head| head.kind) else {
            return Ok(Step::Block);
        };
        match kind {
            TaskKind::Verify => self.step_verify(),
            TaskKind::Verifying => self.step_verifying(summary),
            TaskKind::Stopping => self.step_stopping(summary),
            TaskKind::Save => self.step_save(),
            _ => {
                if let Some(head) = self.tasks.front_mut() {
                    debug!(task = %head.id, %kind, "nothing to do for task at head");
                    head.disable();
                }
                Ok(Step::Continue)
            }
        }
    }

    fn step_verify(&mut self) -> Result<Step, SchedulerError> {
        let Some(head) = self.tasks.front() else {
            return Ok(Step::Block);
        };
        let id = head.id;
        let manual = head.manually_triggered;
        let target = head.target_uri()?.clone();

        let admission = Admission {
            backend_ready: self.ports.status.is_ready(),
            document: self.documents.get(&target),
            active: self.active.as_ref(),
            auto_verify: self.preferences.auto_verify,
        };
        if let Err(denial) = admission.check(&target, manual) {
            self.note_denial(id, &target, manual, denial);
            return Ok(Step::Block);
        }

        self.ports
            .channel
            .send_verify(&target, manual, self.workspace_root.as_deref())
            .map_err(|source| SchedulerError::Dispatch {
                uri: target.clone(),
                source,
            })?;
        if let Some(head) = self.tasks.front_mut() {
            head.begin_verifying()?;
        }
        if let Some(doc) = self.documents.get_mut(&target) {
            doc.mark_verifying();
        }
        self.last_denial = None;

        info!(task = %id, uri = %target, manual, "verification dispatched");
        self.ports.sink.notify(StatusNotification::VerificationStarted {
            uri: target,
            manually_triggered: manual,
        });
        Ok(Step::Block)
    }

    fn step_verifying(&mut self, summary: &Compaction) -> Result<Step, SchedulerError> {
        let Some(head) = self.tasks.front() else {
            return Ok(Step::Block);
        };
        let manual = head.manually_triggered;
        let target = head.target_uri()?.clone();

        // 完了通知は停止要求より優先
        if let Some(outcome) = summary.completion_for(&target).cloned() {
            if let Some(head) = self.tasks.front_mut() {
                head.disable();
            }
            self.finish(target, outcome, manual);
            return Ok(Step::Continue);
        }
        if let Some((observed, _)) = summary.completions.first() {
            return Err(SchedulerError::TargetMismatch {
                expected: target,
                observed: observed.clone(),
            });
        }

        if summary.stop_requested || summary.superseded_by_other(&target) {
            self.ports
                .channel
                .send_stop(&target)
                .map_err(|source| SchedulerError::Dispatch {
                    uri: target.clone(),
                    source,
                })?;
            if let Some(head) = self.tasks.front_mut() {
                head.begin_stopping()?;
            }
            info!(
                uri = %target,
                requested = summary.stop_requested,
                manual = summary.stop_manually_triggered,
                "cancelling verification"
            );
        }
        Ok(Step::Block)
    }

    fn step_stopping(&mut self, summary: &Compaction) -> Result<Step, SchedulerError> {
        if !summary.stopping_complete {
            return Ok(Step::Block);
        }
        let Some(head) = self.tasks.front_mut() else {
            return Ok(Step::Block);
        };
        head.disable();
        let target = head.target_uri()?.clone();
        if let Some(doc) = self.documents.get_mut(&target) {
            doc.abandon();
        }
        info!(uri = %target, "verification stopped");
        self.ports
            .sink
            .notify(StatusNotification::VerificationStopped { uri: target });
        Ok(Step::Continue)
    }

    fn step_save(&mut self) -> Result<Step, SchedulerError> {
        let Some(head) = self.tasks.front_mut() else {
            return Ok(Step::Block);
        };
        head.disable();
        let saved = head.saved_fingerprint();
        let target = head.target_uri()?.clone();

        let Some(doc) = self.documents.get_mut(&target) else {
            debug!(uri = %target, "save for unknown document");
            return Ok(Step::Continue);
        };
        if !doc.record_save(saved) {
            debug!(uri = %target, "cosmetic save, keeping verification state");
            return Ok(Step::Continue);
        }
        self.enqueue_auto_verify(target);
        Ok(Step::Continue)
    }

    fn finish(&mut self, target: DocumentUri, outcome: VerificationOutcome, manual: bool) {
        let now = self.ports.clock.now();
        if let Some(doc) = self.documents.get_mut(&target) {
            doc.finish(outcome.success.is_success(), now);
        }
        info!(
            uri = %target,
            success = ?outcome.success,
            time_secs = outcome.time_secs,
            "verification finished"
        );
        if manual && outcome.success.is_success() {
            self.ports.sink.notify(StatusNotification::Hint {
                message: outcome.describe(target.file_name()),
            });
        }
        self.ports
            .sink
            .notify(StatusNotification::VerificationFinished {
                uri: target,
                outcome,
            });
    }

    fn note_denial(&mut self, id: TaskId, target: &DocumentUri, manual: bool, denial: Denial) {
        if self.last_denial == Some((id, denial)) {
            return;
        }
        self.last_denial = Some((id, denial));
        debug!(task = %id, uri = %target, reason = %denial, "verification not admitted");
        if !manual {
            return;
        }
        if denial == Denial::BackendNotReady {
            self.ports.sink.notify(StatusNotification::Hint {
                message: NOT_READY_HINT.to_string(),
            });
        }
        self.ports
            .sink
            .notify(StatusNotification::VerificationNotStarted {
                uri: target.clone(),
                reason: denial.to_string(),
            });
    }

    fn discard_head(&mut self, err: SchedulerError) {
        let Some(task) = self.tasks.pop_front() else {
            return;
        };
        match err {
            SchedulerError::TargetMismatch { .. } => {
                warn!(task = %task.id, kind = %task.kind, error = %err, "dropping head")
            }
            _ => error!(task = %task.id, kind = %task.kind, error = %err, "dropping head"),
        }
        if task.kind.is_blocking()
            && let Some(uri) = &task.target
            && let Some(doc) = self.documents.get_mut(uri)
        {
            doc.abandon();
        }
    }

    pub fn handle_editor(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::DocumentOpened { uri } => {
                debug!(%uri, "document opened");
                self.documents
                    .entry(uri.clone())
                    .and_modify(|doc| doc.open = true)
                    .or_insert_with(|| DocumentState::opened(uri.clone()));
                // 背景で開かれた文書は focus されたときに検証する
                if self.active.as_ref() == Some(&uri) {
                    self.enqueue_auto_verify(uri);
                }
            }
            EditorEvent::DocumentClosed { uri } => {
                debug!(%uri, "document closed");
                for task in self.tasks.iter_mut() {
                    if task.kind == TaskKind::Verify && task.targets(&uri) {
                        task.disable();
                    }
                }
                if self.active.as_ref() == Some(&uri) {
                    self.active = None;
                }
                let Some(doc) = self.documents.get_mut(&uri) else {
                    return;
                };
                doc.open = false;
                // 実行中なら停止が終わるまで記録を残す
                if doc.verifying {
                    self.enqueue(TaskSpec::stop(false));
                } else {
                    self.documents.remove(&uri);
                }
            }
            EditorEvent::DocumentSaved { uri, text } => {
                let saved = text.as_deref().map(fingerprint);
                self.enqueue(TaskSpec::save(uri, saved));
            }
            EditorEvent::ActiveDocumentChanged { uri } => {
                self.active = uri.clone();
                self.withdraw_unfocused(uri.as_ref());
                if let Some(uri) = uri {
                    self.enqueue_auto_verify(uri);
                }
            }
        }
    }

    /// Queues an automatic `Verify` for `uri` if admission could ever
    /// accept it: auto-verify is on, the document is open and active, and
    /// it has not been verified since its last change.
    fn enqueue_auto_verify(&mut self, uri: DocumentUri) {
        if !self.preferences.auto_verify || self.active.as_ref() != Some(&uri) {
            return;
        }
        let Some(doc) = self.documents.get(&uri) else {
            return;
        };
        if !doc.open || (doc.verified && !doc.changed) {
            trace!(%uri, "no automatic verification needed");
            return;
        }
        self.enqueue(TaskSpec::verify(uri, false));
    }

    /// Undispatched `Verify` tasks for documents other than the focused
    /// one can no longer be admitted.
    fn withdraw_unfocused(&mut self, focused: Option<&DocumentUri>) {
        for task in self.tasks.iter_mut() {
            if task.kind != TaskKind::Verify || task.target.as_ref() == focused {
                continue;
            }
            debug!(task = %task.id, target = ?task.target, "focus moved, withdrawing verification");
            task.disable();
        }
    }

    pub fn handle_backend(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::StateChanged {
                new_state,
                progress,
            } => {
                if self.preferences.show_progress {
                    self.ports.sink.notify(StatusNotification::Progress {
                        state: new_state,
                        progress,
                    });
                }
            }
            BackendEvent::VerificationComplete { uri, outcome } => {
                self.enqueue(TaskSpec::verification_complete(uri, outcome));
            }
            BackendEvent::VerificationFailed { uri } => {
                self.enqueue(TaskSpec::verification_failed(uri));
            }
            BackendEvent::StopAcknowledged { .. } => {
                self.enqueue(TaskSpec::stopping_complete());
            }
        }
    }

    /// `verify` command: verify the active document.
    pub fn request_verify(&mut self, manually_triggered: bool) -> Option<TaskId> {
        let Some(uri) = self.active.clone() else {
            if manually_triggered {
                self.ports.sink.notify(StatusNotification::Hint {
                    message: "There is no active document to verify".to_string(),
                });
            }
            return None;
        };
        Some(self.enqueue(TaskSpec::verify(uri, manually_triggered)))
    }

    pub fn request_stop(&mut self, manually_triggered: bool) -> TaskId {
        self.enqueue(TaskSpec::stop(manually_triggered))
    }

    /// The supervisor reached `Ready`.
    pub fn backend_ready(&mut self, name: &str, restarted: bool) {
        info!(backend = name, restarted, "backend ready");
        if !restarted {
            return;
        }
        for doc in self.documents.values_mut() {
            doc.verified = false;
        }
        if self.preferences.auto_verify_after_backend_change
            && let Some(uri) = self.active.clone()
        {
            self.enqueue(TaskSpec::verify(uri, false));
        }
    }

    /// The backend process is gone; release a head still waiting on it.
    pub fn backend_stopped(&mut self) {
        let Some(head) = self.tasks.front() else {
            return;
        };
        match (head.kind, head.target.clone()) {
            (TaskKind::Verifying, Some(uri)) => {
                warn!(%uri, "backend stopped during verification");
                self.enqueue(TaskSpec::verification_failed(uri));
            }
            (TaskKind::Stopping, _) => {
                self.enqueue(TaskSpec::stopping_complete());
            }
            _ => {}
        }
    }

    /// New configuration: adopt the flags and drop queued work.
    pub fn reconfigure(&mut self, preferences: Preferences, workspace_root: Option<PathBuf>) {
        self.preferences = preferences;
        self.workspace_root = workspace_root;
        self.enqueue(TaskSpec::clear());
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn active(&self) -> Option<&DocumentUri> {
        self.active.as_ref()
    }

    pub fn document(&self, uri: &DocumentUri) -> Option<&DocumentState> {
        self.documents.get(uri)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter()
    }

    pub fn head(&self) -> Option<&TaskRecord> {
        self.tasks.front()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot {
            documents: self.documents.values().filter(|doc| doc.open).count(),
            ..QueueSnapshot::default()
        };
        for task in &self.tasks {
            if task.kind.is_noop() {
                snapshot.noop += 1;
            } else if task.kind.is_blocking() {
                snapshot.blocking += 1;
            } else {
                snapshot.pending += 1;
            }
        }
        snapshot.verifying = self
            .documents
            .values()
            .find(|doc| doc.verifying)
            .map(|doc| doc.uri.clone());
        snapshot
    }
}
