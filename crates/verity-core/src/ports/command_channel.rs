//! CommandChannel port - backend への要求

use std::path::Path;

use crate::domain::DocumentUri;
use crate::error::ChannelError;

/// Sends requests to the verification backend.
///
/// Both calls are fire-and-forget: the backend answers later with a
/// completion, failure or stop acknowledgement, which reaches the
/// scheduler as a marker task.
pub trait CommandChannel: Send + Sync {
    fn send_verify(
        &self,
        uri: &DocumentUri,
        manually_triggered: bool,
        workspace_root: Option<&Path>,
    ) -> Result<(), ChannelError>;

    fn send_stop(&self, uri: &DocumentUri) -> Result<(), ChannelError>;
}

/// Readiness of the backend as the scheduler sees it.
pub trait BackendStatus: Send + Sync {
    fn is_ready(&self) -> bool;
}
