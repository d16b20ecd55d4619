//! verity-core
//!
//! Verification work queue and backend process supervisor for an editor
//! integration of a nailgun hosted verifier.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, document, outcome, state, events）
//! - **config**: 設定（backends, nailgun, java, scheduler, readiness）
//! - **ports**: 抽象化レイヤー（CommandChannel, BackendStatus, EventSink, ProcessLauncher, BackendClient, Clock, IdGenerator）
//! - **queue**: スケジューラ（compaction, admission, head pass）
//! - **supervisor**: nailgun サーバのライフサイクル管理
//! - **probe**: `java -version` / ng クライアントによる問い合わせ
//! - **impls**: 本番実装（tokio プロセス, outbound チャネル）
//! - **app**: ランタイムの構築と駆動

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod probe;
pub mod queue;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{RuntimeBuilder, RuntimeHandle, RuntimeStatus};
pub use config::CoreConfig;
