//! `ProcessLauncher` on top of `tokio::process`.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::ports::{CommandSpec, ProcessEvent, ProcessLauncher, SpawnedProcess};

/// Spawns processes with piped output and forwards it line by line.
///
/// Design:
/// - one reader task per stream, one waiter task owning the child
/// - the waiter sends `Exited` only after both readers hit EOF, so the
///   exit is always the last event
/// - cancelling `kill` kills the child; dropping the handle does too
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

impl ProcessLauncher for TokioProcessLauncher {
    fn spawn(&self, spec: &CommandSpec) -> Result<SpawnedProcess, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, command = %spec.display(), "process spawned");

        let (tx, events) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, tx.clone(), ProcessEvent::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, tx.clone(), ProcessEvent::Stderr)));

        let token = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = token.cancelled() => {
                    debug!(pid, "killing process");
                    if let Err(e) = child.start_kill() {
                        warn!(pid, error = %e, "failed to kill process");
                    }
                    child.wait().await
                }
            };
            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = reader.await;
            }
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid, error = %e, "failed to wait for process");
                    None
                }
            };
            let _ = tx.send(ProcessEvent::Exited(code));
        });

        Ok(SpawnedProcess { pid, events, kill })
    }
}

async fn forward_lines<R>(
    reader: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(wrap(line)).is_err() {
            break;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn collect(mut process: SpawnedProcess) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = process.events.recv().await {
            let done = matches!(event, ProcessEvent::Exited(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn forwards_output_then_exit() {
        let spec = CommandSpec::new("sh").args(["-c", "echo started; echo oops >&2; exit 3"]);
        let events = collect(TokioProcessLauncher.spawn(&spec).unwrap()).await;

        assert!(events.contains(&ProcessEvent::Stdout("started".into())));
        assert!(events.contains(&ProcessEvent::Stderr("oops".into())));
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(3))));
    }

    #[tokio::test]
    async fn kill_token_terminates_process() {
        let spec = CommandSpec::new("sleep").arg("30");
        let process = TokioProcessLauncher.spawn(&spec).unwrap();
        process.kill.cancel();

        let events = tokio::time::timeout(std::time::Duration::from_secs(5), collect(process))
            .await
            .unwrap();
        assert!(matches!(events.last(), Some(ProcessEvent::Exited(_))));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let err = TokioProcessLauncher
            .spawn(&CommandSpec::new("/nonexistent/backend"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
