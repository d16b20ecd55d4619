//! Launch command for the nailgun server hosting a backend.

use std::net::{Ipv4Addr, TcpListener};

use crate::config::{BackendConfig, CoreConfig, PortSetting};
use crate::error::ProcessError;
use crate::ports::CommandSpec;

/// Port for the next launch. A wildcard keeps the port already in use,
/// otherwise asks the OS for a free one.
pub fn resolve_port(setting: PortSetting, previous: Option<u16>) -> Result<u16, ProcessError> {
    match (setting, previous) {
        (PortSetting::Fixed(port), _) => Ok(port),
        (PortSetting::Any, Some(port)) => Ok(port),
        (PortSetting::Any, None) => {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
            Ok(listener.local_addr()?.port())
        }
    }
}

/// Server jar followed by the backend's own classpath entries.
pub fn classpath(config: &CoreConfig, backend: &BackendConfig) -> Result<String, ProcessError> {
    let entries = std::iter::once(&config.nailgun.server_jar).chain(backend.paths.iter());
    let joined = std::env::join_paths(entries)
        .map_err(|e| ProcessError::InvalidCommand(e.to_string()))?;
    Ok(joined.to_string_lossy().into_owned())
}

/// Expands the backend's command template. Placeholders are substituted
/// per whitespace separated token, so expanded values may contain spaces.
pub fn launch_command(
    config: &CoreConfig,
    backend: &BackendConfig,
    port: u16,
) -> Result<CommandSpec, ProcessError> {
    let classpath = classpath(config, backend)?;
    let java = config.java.executable.to_string_lossy();
    let server_jar = config.nailgun.server_jar.to_string_lossy();
    let port = port.to_string();

    let mut tokens = backend.command.split_whitespace().map(|token| {
        token
            .replace("$java$", &java)
            .replace("$classpath$", &classpath)
            .replace("$serverJar$", &server_jar)
            .replace("$port$", &port)
    });
    let program = tokens.next().ok_or(ProcessError::EmptyCommand)?;
    Ok(CommandSpec::new(program)
        .args(tokens)
        .current_dir(config.workspace_root.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.java.executable = PathBuf::from("/usr/bin/java");
        config.nailgun.server_jar = PathBuf::from("/opt/ng/nailgun.jar");
        let mut backend = BackendConfig::new("silicon");
        backend.paths = vec![PathBuf::from("/opt/viper/silicon.jar")];
        config.backends.push(backend);
        config
    }

    #[cfg(unix)]
    #[test]
    fn expands_default_template() {
        let config = config();
        let spec = launch_command(&config, &config.backends[0], 7654).unwrap();

        assert_eq!(spec.program, "/usr/bin/java");
        assert_eq!(
            spec.args,
            vec![
                "-Xmx2048m",
                "-Xss16m",
                "-cp",
                "/opt/ng/nailgun.jar:/opt/viper/silicon.jar",
                "-server",
                "com.martiansoftware.nailgun.NGServer",
                "127.0.0.1:7654",
            ]
        );
    }

    #[test]
    fn custom_template_can_use_server_jar() {
        let mut config = config();
        config.backends[0].command = "run-backend --jar $serverJar$ --port=$port$".into();
        let spec = launch_command(&config, &config.backends[0], 1).unwrap();
        assert_eq!(spec.program, "run-backend");
        assert_eq!(spec.args, vec!["--jar", "/opt/ng/nailgun.jar", "--port=1"]);
    }

    #[test]
    fn blank_template_is_rejected() {
        let mut config = config();
        config.backends[0].command = "  ".into();
        assert!(matches!(
            launch_command(&config, &config.backends[0], 1),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn wildcard_port_keeps_previous() {
        assert_eq!(resolve_port(PortSetting::Fixed(9000), Some(1)).unwrap(), 9000);
        assert_eq!(resolve_port(PortSetting::Any, Some(4321)).unwrap(), 4321);
        assert_ne!(resolve_port(PortSetting::Any, None).unwrap(), 0);
    }
}
