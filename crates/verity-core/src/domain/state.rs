//! Backend and verification states reported to the editor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the supervised backend process.
///
/// State transitions:
/// - Stopped -> Starting -> Ready
/// - Ready -> Stopping -> Stopped
/// - Starting -> Stopped (runtime check failed, timeout, readiness poll exhausted)
/// - Starting -> Stopping -> Stopped (explicit stop while starting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Stopping,
}

impl BackendState {
    pub fn is_ready(self) -> bool {
        matches!(self, BackendState::Ready)
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendState::Stopped => "stopped",
            BackendState::Starting => "starting",
            BackendState::Ready => "ready",
            BackendState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// What the backend reports about its own progress (`stateChanged`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationState {
    Stopped,
    Starting,
    VerificationRunning,
    VerificationPrintingHelp,
    VerificationReporting,
    PostProcessing,
    Ready,
    Stopping,
}
