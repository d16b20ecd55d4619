//! Configuration consumed by the core.
//!
//! Loaded once from JSON and replaced wholesale when the editor reports a
//! configuration change. Every field has a default so partial documents are
//! accepted; `validate()` rejects the combinations the core cannot run with.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Launch template of the nailgun server hosting a backend.
pub const DEFAULT_COMMAND: &str =
    "$java$ -Xmx2048m -Xss16m -cp $classpath$ -server com.martiansoftware.nailgun.NGServer 127.0.0.1:$port$";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub preferences: Preferences,
    pub nailgun: NailgunSettings,
    pub java: JavaSettings,
    pub scheduler: SchedulerSettings,
    pub readiness: ReadinessSettings,
    pub backends: Vec<BackendConfig>,

    /// Working directory for verification requests and backend processes.
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub auto_verify: bool,
    pub auto_verify_after_backend_change: bool,
    pub show_progress: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_verify: true,
            auto_verify_after_backend_change: true,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NailgunSettings {
    pub client_executable: PathBuf,
    pub server_jar: PathBuf,
    pub port: PortSetting,
    pub timeout_ms: u64,
}

impl Default for NailgunSettings {
    fn default() -> Self {
        Self {
            client_executable: PathBuf::from("ng"),
            server_jar: PathBuf::from("nailgun-server.jar"),
            port: PortSetting::Any,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JavaSettings {
    pub executable: PathBuf,
}

impl Default for JavaSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("java"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessSettings {
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            max_retries: 20,
            poll_interval_ms: 100,
            shutdown_grace_ms: 2_000,
            probe_timeout_ms: 5_000,
        }
    }
}

/// Definition of one verification backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub name: String,

    #[serde(default = "default_command")]
    pub command: String,

    /// Classpath entries appended after the nailgun server jar.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Substring of the server's stdout announcing that it has started.
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    /// Overrides `nailgun.timeoutMs` for this backend.
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_ready_marker() -> String {
    "started".to_string()
}

impl BackendConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: default_command(),
            paths: Vec::new(),
            ready_marker: default_ready_marker(),
            startup_timeout_ms: None,
        }
    }
}

/// Port the nailgun server listens on. `"*"` picks a free port at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "PortRepr", into = "PortRepr")]
pub enum PortSetting {
    #[default]
    Any,
    Fixed(u16),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
}

impl TryFrom<PortRepr> for PortSetting {
    type Error = String;

    fn try_from(value: PortRepr) -> Result<Self, Self::Error> {
        match value {
            PortRepr::Number(port) => Ok(PortSetting::Fixed(port)),
            PortRepr::Text(text) => {
                let text = text.trim();
                if text.is_empty() || text == "*" {
                    return Ok(PortSetting::Any);
                }
                text.parse::<u16>()
                    .map(PortSetting::Fixed)
                    .map_err(|_| format!("invalid port `{text}`"))
            }
        }
    }
}

impl From<PortSetting> for PortRepr {
    fn from(value: PortSetting) -> Self {
        match value {
            PortSetting::Any => PortRepr::Text("*".to_string()),
            PortSetting::Fixed(port) => PortRepr::Number(port),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid(
                "no verification backend configured".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(ConfigError::Invalid("backend with empty name".to_string()));
            }
            if !names.insert(backend.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate backend name `{}`",
                    backend.name
                )));
            }
            if backend.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "backend `{}` has an empty command",
                    backend.name
                )));
            }
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tickIntervalMs must be positive".to_string(),
            ));
        }
        if self.readiness.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "readiness.maxRetries must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Backend by name, falling back to the first configured one.
    pub fn select_backend(&self, name: Option<&str>) -> Option<&BackendConfig> {
        name.and_then(|name| self.backends.iter().find(|b| b.name == name))
            .or_else(|| self.backends.first())
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    pub fn startup_timeout(&self, backend: &BackendConfig) -> Duration {
        Duration::from_millis(backend.startup_timeout_ms.unwrap_or(self.nailgun.timeout_ms))
    }

    /// Whether switching from `self` to `next` requires restarting the
    /// running backend named `active`.
    pub fn requires_restart(&self, next: &CoreConfig, active: &str) -> bool {
        self.backend(active) != next.backend(active)
            || self.nailgun != next.nailgun
            || self.java != next.java
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"{ "backends": [ { "name": "silicon", "paths": ["/opt/viper/silicon.jar"] } ] }"#
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = CoreConfig::from_json_str(minimal()).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 100);
        assert_eq!(config.readiness.max_retries, 20);
        assert_eq!(config.readiness.poll_interval_ms, 100);
        assert!(config.preferences.auto_verify);
        assert_eq!(config.nailgun.port, PortSetting::Any);
        assert_eq!(config.backends[0].ready_marker, "started");
        assert_eq!(config.backends[0].command, DEFAULT_COMMAND);
    }

    #[test]
    fn port_accepts_wildcard_number_and_numeric_string() {
        let parse = |port: &str| {
            let json = format!(r#"{{ "nailgun": {{ "port": {port} }}, "backends": [{{"name":"a"}}] }}"#);
            CoreConfig::from_json_str(&json).map(|c| c.nailgun.port)
        };
        assert_eq!(parse(r#""*""#).unwrap(), PortSetting::Any);
        assert_eq!(parse("7654").unwrap(), PortSetting::Fixed(7654));
        assert_eq!(parse(r#""7654""#).unwrap(), PortSetting::Fixed(7654));
        assert!(parse(r#""seven""#).is_err());
    }

    #[test]
    fn rejects_duplicate_backends() {
        let json = r#"{ "backends": [ {"name":"a"}, {"name":"a"} ] }"#;
        let err = CoreConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_empty_backend_list() {
        let err = CoreConfig::from_json_str("{}").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn select_backend_falls_back_to_first() {
        let json = r#"{ "backends": [ {"name":"silicon"}, {"name":"carbon"} ] }"#;
        let config = CoreConfig::from_json_str(json).unwrap();
        assert_eq!(config.select_backend(Some("carbon")).unwrap().name, "carbon");
        assert_eq!(config.select_backend(Some("nope")).unwrap().name, "silicon");
        assert_eq!(config.select_backend(None).unwrap().name, "silicon");
    }

    #[test]
    fn restart_needed_only_when_active_backend_or_nailgun_changes() {
        let base = CoreConfig::from_json_str(
            r#"{ "backends": [ {"name":"silicon"}, {"name":"carbon"} ] }"#,
        )
        .unwrap();

        let mut other_backend_changed = base.clone();
        other_backend_changed.backends[1].paths.push(PathBuf::from("x.jar"));
        assert!(!base.requires_restart(&other_backend_changed, "silicon"));

        let mut prefs_changed = base.clone();
        prefs_changed.preferences.auto_verify = false;
        assert!(!base.requires_restart(&prefs_changed, "silicon"));

        let mut nailgun_changed = base.clone();
        nailgun_changed.nailgun.timeout_ms = 1;
        assert!(base.requires_restart(&nailgun_changed, "silicon"));

        let mut active_changed = base.clone();
        active_changed.backends[0].ready_marker = "listening".to_string();
        assert!(base.requires_restart(&active_changed, "silicon"));
    }

    #[test]
    fn startup_timeout_prefers_backend_override() {
        let mut config = CoreConfig::from_json_str(minimal()).unwrap();
        assert_eq!(
            config.startup_timeout(&config.backends[0].clone()),
            Duration::from_millis(5_000)
        );
        config.backends[0].startup_timeout_ms = Some(250);
        assert_eq!(
            config.startup_timeout(&config.backends[0].clone()),
            Duration::from_millis(250)
        );
    }
}
