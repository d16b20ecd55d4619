//! Messages crossing the core's boundary.
//!
//! Inbound: editor document events, user commands, backend notifications and
//! configuration changes. Outbound: requests on the backend command channel
//! and status notifications for the editor. All of them are plain serde
//! shapes so the binary can carry them as JSON lines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{BackendState, DocumentUri, VerificationOutcome, VerificationState};
use crate::config::CoreConfig;

/// Document lifecycle reported by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    DocumentOpened {
        uri: DocumentUri,
    },
    DocumentClosed {
        uri: DocumentUri,
    },
    DocumentSaved {
        uri: DocumentUri,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    ActiveDocumentChanged {
        #[serde(default)]
        uri: Option<DocumentUri>,
    },
}

/// Explicit user actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserCommand {
    #[serde(rename_all = "camelCase")]
    Verify { manually_triggered: bool },
    StopVerification,
    SelectBackend { name: String },
}

/// Notifications from the verification backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        new_state: VerificationState,
        #[serde(default)]
        progress: Option<f64>,
    },
    VerificationComplete {
        uri: DocumentUri,
        #[serde(flatten)]
        outcome: VerificationOutcome,
    },
    VerificationFailed {
        uri: DocumentUri,
    },
    /// Acknowledgement of a stop request.
    StopAcknowledged {
        #[serde(default)]
        uri: Option<DocumentUri>,
    },
}

/// Requests sent to the backend over the command channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendRequest {
    #[serde(rename_all = "camelCase")]
    Verify {
        uri: DocumentUri,
        manually_triggered: bool,
        #[serde(default)]
        workspace_root: Option<PathBuf>,
    },
    Stop {
        uri: DocumentUri,
    },
}

/// Discrete status updates for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusNotification {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        state: BackendState,
        #[serde(default)]
        backend_name: Option<String>,
    },
    BackendChanged {
        name: String,
    },
    BackendReady {
        name: String,
        restarted: bool,
    },
    Progress {
        state: VerificationState,
        #[serde(default)]
        progress: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    VerificationStarted {
        uri: DocumentUri,
        manually_triggered: bool,
    },
    VerificationFinished {
        uri: DocumentUri,
        outcome: VerificationOutcome,
    },
    VerificationNotStarted {
        uri: DocumentUri,
        reason: String,
    },
    VerificationStopped {
        uri: DocumentUri,
    },
    Hint {
        message: String,
    },
}

/// Everything the runtime can be fed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Inbound {
    Editor(EditorEvent),
    Command(UserCommand),
    Backend(BackendEvent),
    ConfigurationChanged(CoreConfig),
}

/// Everything the runtime emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outbound {
    Request(BackendRequest),
    Status(StatusNotification),
}
