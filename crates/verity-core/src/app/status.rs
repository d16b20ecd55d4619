//! Status - キューとバックエンドの観測用スナップショット

use serde::{Deserialize, Serialize};

use crate::domain::{BackendState, DocumentUri};

/// Point-in-time counts of the scheduler queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Tasks still waiting for the head (`Verify`, `Save`, `Clear`, ...).
    pub pending: usize,

    /// `Verifying` / `Stopping` entries. Never more than one.
    pub blocking: usize,

    /// Disabled entries not yet trimmed from the head.
    pub noop: usize,

    pub documents: usize,
    pub verifying: Option<DocumentUri>,
}

/// Queue counts plus the supervisor's view, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub backend: BackendState,
    pub queue: QueueSnapshot,
}

impl RuntimeStatus {
    /// Nothing queued, nothing running.
    pub fn is_idle(&self) -> bool {
        self.queue.pending == 0 && self.queue.blocking == 0
    }
}
