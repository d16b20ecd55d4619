//! Domain model: tasks, documents, outcomes, states and boundary messages.

pub mod document;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use document::{DocumentState, fingerprint};
pub use events::{
    BackendEvent, BackendRequest, EditorEvent, Inbound, Outbound, StatusNotification,
    UserCommand,
};
pub use ids::{DocumentUri, TaskId};
pub use outcome::{Success, VerificationOutcome};
pub use state::{BackendState, VerificationState};
pub use task::{TaskKind, TaskResult, TaskSpec};
