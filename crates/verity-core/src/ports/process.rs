//! ProcessLauncher port - 外部プロセスの起動

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;

/// A fully expanded command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Splits a whitespace separated command line.
    pub fn parse(line: &str) -> Result<Self, ProcessError> {
        let mut parts = line.split_whitespace();
        let program = parts.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self::new(program).args(parts))
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output and lifecycle of a spawned process, one line at a time.
///
/// `Exited` is always the last event of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
}

/// Handle to a running process.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,

    /// Cancelling kills the process. `Exited` follows.
    pub kill: CancellationToken,
}

/// Starts long running processes.
///
/// Must be called from within a tokio runtime; implementations spawn their
/// reader tasks on it.
pub trait ProcessLauncher: Send + Sync + 'static {
    fn spawn(&self, command: &CommandSpec) -> Result<SpawnedProcess, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let spec = CommandSpec::parse("java  -Xss16m\t-cp a.jar").unwrap();
        assert_eq!(spec.program, "java");
        assert_eq!(spec.args, vec!["-Xss16m", "-cp", "a.jar"]);
        assert_eq!(spec.display(), "java -Xss16m -cp a.jar");
    }

    #[test]
    fn parse_rejects_blank_line() {
        assert!(matches!(
            CommandSpec::parse("   "),
            Err(ProcessError::EmptyCommand)
        ));
    }
}
