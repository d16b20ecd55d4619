use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{DocumentUri, TaskKind};

/// Failure to start or talk to an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("invalid command line: {0}")]
    InvalidCommand(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process `{program}` did not finish within {timeout_ms}ms")]
    TimedOut { program: String, timeout_ms: u64 },

    #[error("process io: {0}")]
    Io(#[from] std::io::Error),
}

/// The outbound side of the backend command channel is gone.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("command channel closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while the scheduler advances the queue head.
///
/// None of these escape a tick: they are logged and the head is dropped.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("dispatch failed for {uri}: {source}")]
    Dispatch {
        uri: DocumentUri,
        #[source]
        source: ChannelError,
    },

    #[error("task {kind} has no target document")]
    MissingTarget { kind: TaskKind },

    #[error("invalid task transition {from} -> {to}")]
    InvalidTransition { from: TaskKind, to: TaskKind },

    #[error("completion for {observed} does not match blocking task for {expected}")]
    TargetMismatch {
        expected: DocumentUri,
        observed: DocumentUri,
    },
}
