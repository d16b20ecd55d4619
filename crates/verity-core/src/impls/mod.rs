//! Impls - ports の本番実装

pub mod outbound;
pub mod tokio_process;

pub use self::outbound::OutboundChannel;
pub use self::tokio_process::TokioProcessLauncher;
