//! BackendClient port - nailgun クライアント経由の問い合わせ

use async_trait::async_trait;

use crate::error::ProcessError;

/// Result of probing the Java runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCheck {
    /// Version string as reported, if one could be parsed.
    pub version: Option<String>,
    pub is_64bit: bool,
    pub compatible: bool,
}

/// Short-lived queries against the Java runtime and a running nailgun server.
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    /// Runs `java -version` and classifies the output.
    async fn check_runtime(&self) -> Result<RuntimeCheck, ProcessError>;

    /// Whether a nailgun server answers on `port`.
    async fn is_alive(&self, port: u16) -> bool;

    /// Asks the server on `port` to shut itself down (`ng-stop`).
    async fn request_shutdown(&self, port: u16) -> Result<(), ProcessError>;
}
