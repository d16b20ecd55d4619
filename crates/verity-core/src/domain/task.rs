//! Task model: a queued unit of intent.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DocumentUri, VerificationOutcome};

/// Kind of a queued task.
///
/// Requests (`Save`, `Verify`, `Stop`, `Clear`) and markers
/// (`VerificationComplete`, `VerificationFailed`, `StoppingComplete`) are
/// submitted by collaborators. `Verifying` and `Stopping` are only ever
/// produced by the scheduler transmuting a task in place, and `NoOp` is the
/// terminal state of every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    NoOp,
    Save,
    Verify,
    Stop,
    Clear,
    Verifying,
    Stopping,
    StoppingComplete,
    VerificationComplete,
    VerificationFailed,
}

impl TaskKind {
    /// The head of the queue waits on these until the backend answers.
    pub fn is_blocking(self) -> bool {
        matches!(self, TaskKind::Verifying | TaskKind::Stopping)
    }

    /// Acknowledgements from the backend, consumed by the compaction pass.
    pub fn is_marker(self) -> bool {
        matches!(
            self,
            TaskKind::StoppingComplete
                | TaskKind::VerificationComplete
                | TaskKind::VerificationFailed
        )
    }

    pub fn is_noop(self) -> bool {
        matches!(self, TaskKind::NoOp)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Payload attached to some task kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// Terminal result carried by `VerificationComplete` / `VerificationFailed`.
    Verification(VerificationOutcome),

    /// Fingerprint of the saved text, when the editor sent it along.
    Saved { fingerprint: Option<u64> },
}

/// A task as submitted by a collaborator, before the queue stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub target: Option<DocumentUri>,
    pub manually_triggered: bool,
    pub result: Option<TaskResult>,
}

impl TaskSpec {
    fn new(kind: TaskKind, target: Option<DocumentUri>) -> Self {
        Self {
            kind,
            target,
            manually_triggered: false,
            result: None,
        }
    }

    pub fn verify(uri: DocumentUri, manually_triggered: bool) -> Self {
        Self {
            manually_triggered,
            ..Self::new(TaskKind::Verify, Some(uri))
        }
    }

    pub fn stop(manually_triggered: bool) -> Self {
        Self {
            manually_triggered,
            ..Self::new(TaskKind::Stop, None)
        }
    }

    pub fn save(uri: DocumentUri, fingerprint: Option<u64>) -> Self {
        Self {
            result: Some(TaskResult::Saved { fingerprint }),
            ..Self::new(TaskKind::Save, Some(uri))
        }
    }

    pub fn clear() -> Self {
        Self::new(TaskKind::Clear, None)
    }

    pub fn verification_complete(uri: DocumentUri, outcome: VerificationOutcome) -> Self {
        Self {
            result: Some(TaskResult::Verification(outcome)),
            ..Self::new(TaskKind::VerificationComplete, Some(uri))
        }
    }

    pub fn verification_failed(uri: DocumentUri) -> Self {
        Self {
            result: Some(TaskResult::Verification(VerificationOutcome::failed())),
            ..Self::new(TaskKind::VerificationFailed, Some(uri))
        }
    }

    pub fn stopping_complete() -> Self {
        Self::new(TaskKind::StoppingComplete, None)
    }

    pub fn noop() -> Self {
        Self::new(TaskKind::NoOp, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Success;

    #[test]
    fn only_verifying_and_stopping_block() {
        let blocking: Vec<TaskKind> = [
            TaskKind::NoOp,
            TaskKind::Save,
            TaskKind::Verify,
            TaskKind::Stop,
            TaskKind::Clear,
            TaskKind::Verifying,
            TaskKind::Stopping,
            TaskKind::StoppingComplete,
            TaskKind::VerificationComplete,
            TaskKind::VerificationFailed,
        ]
        .into_iter()
        .filter(|k| k.is_blocking())
        .collect();
        assert_eq!(blocking, vec![TaskKind::Verifying, TaskKind::Stopping]);
    }

    #[test]
    fn failure_marker_carries_error_outcome() {
        let spec = TaskSpec::verification_failed(DocumentUri::new("file:///a.vpr"));
        match spec.result {
            Some(TaskResult::Verification(outcome)) => {
                assert_eq!(outcome.success, Success::Error)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
