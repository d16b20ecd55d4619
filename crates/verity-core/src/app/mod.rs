//! App - アプリケーション層
//!
//! ports を組み合わせて、スケジューラとスーパーバイザを一つのランタイムにまとめる。
//!
//! # 主要コンポーネント
//! - **RuntimeBuilder**: 構築とワイヤリング（Fail-fast 検証付き）
//! - **Runtime / RuntimeHandle**: イベントループの起動と操作
//! - **RuntimeStatus**: 観測用スナップショット

pub mod builder;
pub mod runtime;
pub mod status;

pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::runtime::{ClientFactory, Runtime, RuntimeHandle};
pub use self::status::{QueueSnapshot, RuntimeStatus};
