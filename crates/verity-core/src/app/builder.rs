//! RuntimeBuilder - ランタイムの構築とワイヤリング
//!
//! 起動時検証（Fail-fast）: 設定の不備や未知のバックエンド名は
//! `build()` の時点で `BuildError` として返す。

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::ConfigError;
use crate::impls::{OutboundChannel, TokioProcessLauncher};
use crate::ports::{
    BackendClient, Clock, CommandChannel, EventSink, IdGenerator, NoopEventSink,
    ProcessLauncher, SystemClock, UlidGenerator,
};
use crate::probe::ProcessProbe;

use super::runtime::{ClientFactory, Runtime};

/// Assembles a `Runtime`.
///
/// # Example
/// ```ignore
/// let (outbound, rx) = OutboundChannel::pair();
/// let runtime = RuntimeBuilder::new()
///     .config(CoreConfig::load("verity.json")?)
///     .backend("silicon")
///     .outbound(outbound)
///     .build()?;
/// let handle = runtime.start();
/// ```
///
/// Only the configuration and a command channel are required. Everything
/// else defaults to the real process-backed implementation.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: Option<CoreConfig>,
    backend: Option<String>,
    channel: Option<Arc<dyn CommandChannel>>,
    sink: Option<Arc<dyn EventSink>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    client_factory: Option<ClientFactory>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はランタイム構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no configuration given")]
    MissingConfig,

    #[error("no command channel given")]
    MissingChannel,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("unknown backend `{name}`, configured backends: {available:?}")]
    UnknownBackend { name: String, available: Vec<String> },
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Backend launched on start. Defaults to the first configured one.
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Uses one `OutboundChannel` for both backend requests and status.
    pub fn outbound(self, outbound: OutboundChannel) -> Self {
        let shared = Arc::new(outbound);
        self.channel(shared.clone()).sink(shared)
    }

    pub fn channel(mut self, channel: Arc<dyn CommandChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Status notifications are dropped when no sink is given.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Uses the same client whatever the configuration says.
    pub fn backend_client(self, client: Arc<dyn BackendClient>) -> Self {
        self.client_factory(Arc::new(move |_: &CoreConfig| Arc::clone(&client)))
    }

    pub fn client_factory(mut self, factory: ClientFactory) -> Self {
        self.client_factory = Some(factory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// # 検証
    /// - 設定と command channel が与えられているか
    /// - 設定が `CoreConfig::validate` を通るか
    /// - 指定されたバックエンド名が設定に存在するか
    pub fn build(self) -> Result<Runtime, BuildError> {
        let config = self.config.ok_or(BuildError::MissingConfig)?;
        config.validate()?;
        let channel = self.channel.ok_or(BuildError::MissingChannel)?;

        let backend = match self.backend.as_deref() {
            Some(name) => config.backend(name).ok_or_else(|| BuildError::UnknownBackend {
                name: name.to_string(),
                available: config.backend_names().into_iter().map(String::from).collect(),
            })?,
            None => config
                .select_backend(None)
                .ok_or_else(|| ConfigError::Invalid("no verification backend configured".into()))?,
        }
        .clone();

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(Runtime {
            config,
            backend,
            channel,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopEventSink)),
            launcher: self
                .launcher
                .unwrap_or_else(|| Arc::new(TokioProcessLauncher)),
            client_factory: self.client_factory.unwrap_or_else(|| {
                Arc::new(|config: &CoreConfig| {
                    Arc::new(ProcessProbe::from_config(config)) as Arc<dyn BackendClient>
                })
            }),
            ids,
            clock,
        })
    }
}
