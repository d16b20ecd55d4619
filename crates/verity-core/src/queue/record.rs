//! Task record: a submitted task stamped with id and enqueue time.

use chrono::{DateTime, Utc};

use crate::domain::{DocumentUri, TaskId, TaskKind, TaskResult, TaskSpec, VerificationOutcome};
use crate::error::SchedulerError;

/// A task sitting in the scheduler's queue.
///
/// Design:
/// - The queue position is the ordering; `id` is for logs and denial tracking.
/// - `kind` is only changed through the transition methods below.
///
/// State transitions:
/// - `Verify -> Verifying` when dispatched
/// - `Verifying -> Stopping` when cancelled
/// - any kind `-> NoOp` when satisfied, superseded or consumed
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: Option<DocumentUri>,
    pub manually_triggered: bool,
    pub result: Option<TaskResult>,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, spec: TaskSpec, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: spec.kind,
            target: spec.target,
            manually_triggered: spec.manually_triggered,
            result: spec.result,
            enqueued_at,
        }
    }

    pub fn target_uri(&self) -> Result<&DocumentUri, SchedulerError> {
        self.target
            .as_ref()
            .ok_or(SchedulerError::MissingTarget { kind: self.kind })
    }

    pub fn targets(&self, uri: &DocumentUri) -> bool {
        self.target.as_ref() == Some(uri)
    }

    /// Outcome carried by a completion or failure marker.
    pub fn outcome(&self) -> Option<&VerificationOutcome> {
        match &self.result {
            Some(TaskResult::Verification(outcome)) => Some(outcome),
            _ => None,
        }
    }

    /// Fingerprint carried by a `Save`, if the editor sent the text.
    pub fn saved_fingerprint(&self) -> Option<u64> {
        match self.result {
            Some(TaskResult::Saved { fingerprint }) => fingerprint,
            _ => None,
        }
    }

    pub fn begin_verifying(&mut self) -> Result<(), SchedulerError> {
        self.transition(TaskKind::Verify, TaskKind::Verifying)
    }

    pub fn begin_stopping(&mut self) -> Result<(), SchedulerError> {
        self.transition(TaskKind::Verifying, TaskKind::Stopping)
    }

    pub fn disable(&mut self) {
        self.kind = TaskKind::NoOp;
    }

    fn transition(&mut self, from: TaskKind, to: TaskKind) -> Result<(), SchedulerError> {
        if self.kind != from {
            return Err(SchedulerError::InvalidTransition {
                from: self.kind,
                to,
            });
        }
        self.kind = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn record(spec: TaskSpec) -> TaskRecord {
        TaskRecord::new(TaskId::from(Ulid::new()), spec, Utc::now())
    }

    #[test]
    fn verify_moves_through_verifying_to_stopping() {
        let mut task = record(TaskSpec::verify(DocumentUri::new("file:///a.vpr"), true));
        task.begin_verifying().unwrap();
        assert_eq!(task.kind, TaskKind::Verifying);
        task.begin_stopping().unwrap();
        assert_eq!(task.kind, TaskKind::Stopping);
        assert!(task.manually_triggered);
    }

    #[test]
    fn stopping_an_undispatched_verify_is_rejected() {
        let mut task = record(TaskSpec::verify(DocumentUri::new("file:///a.vpr"), false));
        let err = task.begin_stopping().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition {
                from: TaskKind::Verify,
                to: TaskKind::Stopping
            }
        ));
        assert_eq!(task.kind, TaskKind::Verify);
    }

    #[test]
    fn stop_has_no_target() {
        let task = record(TaskSpec::stop(true));
        assert!(matches!(
            task.target_uri(),
            Err(SchedulerError::MissingTarget { kind: TaskKind::Stop })
        ));
    }
}
