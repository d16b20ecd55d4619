//! Short-lived helper processes: the Java runtime check and the nailgun
//! client calls used for liveness and shutdown.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, trace};

use crate::config::CoreConfig;
use crate::error::ProcessError;
use crate::impls::TokioProcessLauncher;
use crate::ports::{
    BackendClient, CommandSpec, ProcessEvent, ProcessLauncher, RuntimeCheck,
};

/// Class name the liveness probe asks the server to run.
const PROBE_CLASS: &str = "NOT_USED_CLASS_NAME";

/// Prefix of the server's answer when it is up but the probe class is unknown.
const ALIVE_PREFIX: &str = "java.lang.ClassNotFoundException:";

/// Minimum supported Java release (1.8 / 8).
const REQUIRED_MINOR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl JavaVersion {
    /// Java 8 and newer. Legacy versions are reported as `1.x.y`.
    pub fn is_compatible(&self) -> bool {
        self.major > 1 || (self.major == 1 && self.minor >= REQUIRED_MINOR)
    }
}

impl std::fmt::Display for JavaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([1-9]\d*)\.(\d+)\.(\d+)").unwrap_or_else(|e| panic!("version regex: {e}"))
    })
}

/// First `major.minor.patch` triple found in `java -version` output.
pub fn parse_java_version(output: &str) -> Option<JavaVersion> {
    let caps = version_regex().captures(output)?;
    Some(JavaVersion {
        major: caps[1].parse().ok()?,
        minor: caps[2].parse().ok()?,
        patch: caps[3].parse().ok()?,
    })
}

/// Classifies the combined output of `java -version`.
pub fn classify_runtime(output: &str) -> RuntimeCheck {
    let version = parse_java_version(output);
    RuntimeCheck {
        version: version.map(|v| v.to_string()),
        is_64bit: output.contains("64"),
        compatible: version.is_some_and(|v| v.is_compatible()),
    }
}

/// Whether the nailgun client's stderr shows a live server.
pub fn classify_liveness(stderr: &str) -> bool {
    stderr.trim_start().starts_with(ALIVE_PREFIX)
}

#[derive(Debug, Default)]
pub struct ProbeOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `spec` to completion and collects its output, killing it after
/// `timeout`.
pub async fn run_to_completion(
    launcher: &dyn ProcessLauncher,
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<ProbeOutput, ProcessError> {
    trace!(command = %spec.display(), "running probe");
    let mut process = launcher.spawn(spec)?;
    let mut output = ProbeOutput::default();

    let collect = async {
        while let Some(event) = process.events.recv().await {
            match event {
                ProcessEvent::Stdout(line) => push_line(&mut output.stdout, &line),
                ProcessEvent::Stderr(line) => push_line(&mut output.stderr, &line),
                ProcessEvent::Exited(code) => {
                    output.status = code;
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(timeout, collect).await.is_err() {
        process.kill.cancel();
        return Err(ProcessError::TimedOut {
            program: spec.program.clone(),
            timeout_ms: timeout.as_millis() as u64,
        });
    }
    Ok(output)
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

/// `BackendClient` backed by the `java` and nailgun client executables.
#[derive(Clone)]
pub struct ProcessProbe {
    launcher: Arc<dyn ProcessLauncher>,
    java: PathBuf,
    ng_client: PathBuf,
    timeout: Duration,
}

impl ProcessProbe {
    pub fn new(java: PathBuf, ng_client: PathBuf, timeout: Duration) -> Self {
        Self {
            launcher: Arc::new(TokioProcessLauncher),
            java,
            ng_client,
            timeout,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            config.java.executable.clone(),
            config.nailgun.client_executable.clone(),
            Duration::from_millis(config.readiness.probe_timeout_ms),
        )
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    async fn run(&self, spec: CommandSpec) -> Result<ProbeOutput, ProcessError> {
        run_to_completion(self.launcher.as_ref(), &spec, self.timeout).await
    }

    async fn ng(&self, port: u16, command: &str) -> Result<ProbeOutput, ProcessError> {
        let spec = CommandSpec::new(self.ng_client.to_string_lossy())
            .arg("--nailgun-port")
            .arg(port.to_string())
            .arg(command);
        self.run(spec).await
    }
}

#[async_trait]
impl BackendClient for ProcessProbe {
    async fn check_runtime(&self) -> Result<RuntimeCheck, ProcessError> {
        let out = self
            .run(CommandSpec::new(self.java.to_string_lossy()).arg("-version"))
            .await?;
        // java -version は stderr に出力する実装が多い
        let combined = format!("{}\n{}", out.stdout, out.stderr);
        let check = classify_runtime(&combined);
        debug!(version = ?check.version, is_64bit = check.is_64bit, "java runtime checked");
        Ok(check)
    }

    async fn is_alive(&self, port: u16) -> bool {
        match self.ng(port, PROBE_CLASS).await {
            Ok(out) => classify_liveness(&out.stderr),
            Err(e) => {
                debug!(port, error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn request_shutdown(&self, port: u16) -> Result<(), ProcessError> {
        let out = self.ng(port, "ng-stop").await?;
        debug!(port, status = ?out.status, "ng-stop finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;
    use rstest::rstest;

    #[rstest]
    #[case("java version \"1.8.0_292\"", Some((1, 8, 0)), true)]
    #[case("java version \"1.7.0_80\"", Some((1, 7, 0)), false)]
    #[case("openjdk version \"17.0.2\" 2022-01-18", Some((17, 0, 2)), true)]
    #[case("openjdk version \"11.0.20.1\"", Some((11, 0, 20)), true)]
    #[case("command not found", None, false)]
    fn parses_java_versions(
        #[case] output: &str,
        #[case] expected: Option<(u32, u32, u32)>,
        #[case] compatible: bool,
    ) {
        let parsed = parse_java_version(output);
        assert_eq!(parsed.map(|v| (v.major, v.minor, v.patch)), expected);
        assert_eq!(classify_runtime(output).compatible, compatible);
    }

    #[test]
    fn detects_64bit_runtime() {
        let out = "openjdk version \"17.0.2\"\nOpenJDK 64-Bit Server VM (build 17.0.2+8)";
        let check = classify_runtime(out);
        assert!(check.is_64bit);
        assert_eq!(check.version.as_deref(), Some("17.0.2"));

        assert!(!classify_runtime("java version \"1.8.0\"\nClient VM").is_64bit);
    }

    #[rstest]
    #[case("java.lang.ClassNotFoundException: NOT_USED_CLASS_NAME", true)]
    #[case("\njava.lang.ClassNotFoundException: x", true)]
    #[case("connect: Connection refused", false)]
    #[case("", false)]
    fn classifies_liveness(#[case] stderr: &str, #[case] alive: bool) {
        assert_eq!(classify_liveness(stderr), alive);
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let err = run_to_completion(
            &TokioProcessLauncher,
            &CommandSpec::new("/nonexistent/definitely-not-java"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn collects_both_streams() {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo out; echo 'java.lang.ClassNotFoundException: X' >&2; exit 1");
        let out = run_to_completion(&TokioProcessLauncher, &spec, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out");
        assert!(classify_liveness(&out.stderr));
        assert_eq!(out.status, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_is_killed_after_timeout() {
        let launcher = FakeLauncher::new().silent();
        let err = run_to_completion(
            &launcher,
            &CommandSpec::new("ng").arg("ng-stop"),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { timeout_ms: 500, .. }));
        assert!(launcher.killed(0));
    }
}
