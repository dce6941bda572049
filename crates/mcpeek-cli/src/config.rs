//! `mcpeek.toml` configuration.
//!
//! Every section is optional; a missing file yields the defaults.

use anyhow::Context;
use mcpeek_mcp::{SessionOptions, DEFAULT_REGISTRY_URL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct McpeekConfig {
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,
    #[serde(default)]
    pub inspect: InspectConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for McpeekConfig {
    fn default() -> Self {
        Self {
            workflows_dir: default_workflows_dir(),
            inspect: InspectConfig::default(),
            registry: RegistryConfig::default(),
            inspector: InspectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InspectConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_container_handshake_timeout")]
    pub container_handshake_timeout_secs: u64,
    #[serde(default = "default_close_grace")]
    pub close_grace_secs: u64,
    /// 0 disables the per-server timeout.
    #[serde(default)]
    pub default_server_timeout_secs: u64,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout(),
            container_handshake_timeout_secs: default_container_handshake_timeout(),
            close_grace_secs: default_close_grace(),
            default_server_timeout_secs: 0,
        }
    }
}

impl InspectConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            handshake_timeout: Duration::from_secs(self.request_timeout_secs),
            container_handshake_timeout: Duration::from_secs(self.container_handshake_timeout_secs),
            close_grace: Duration::from_secs(self.close_grace_secs),
        }
    }

    pub fn default_server_timeout(&self) -> Option<Duration> {
        (self.default_server_timeout_secs > 0)
            .then(|| Duration::from_secs(self.default_server_timeout_secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InspectorConfig {
    #[serde(default = "default_inspector_command")]
    pub command: String,
    #[serde(default = "default_inspector_args")]
    pub args: Vec<String>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            command: default_inspector_command(),
            args: default_inspector_args(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from(".github/workflows")
}
fn default_max_concurrency() -> usize {
    8
}
fn default_request_timeout() -> u64 {
    30
}
fn default_container_handshake_timeout() -> u64 {
    120
}
fn default_close_grace() -> u64 {
    5
}
fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}
fn default_inspector_command() -> String {
    "npx".to_string()
}
fn default_inspector_args() -> Vec<String> {
    vec!["@modelcontextprotocol/inspector".to_string()]
}

/// Read `path`, falling back to defaults when it does not exist.
pub fn load(path: &Path) -> anyhow::Result<McpeekConfig> {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(McpeekConfig::default()),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("mcpeek.toml")).unwrap();
        assert_eq!(config.workflows_dir, PathBuf::from(".github/workflows"));
        assert_eq!(config.inspect.max_concurrency, 8);
        assert_eq!(config.inspect.default_server_timeout(), None);
        assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
        assert_eq!(config.inspector.command, "npx");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpeek.toml");
        std::fs::write(
            &path,
            "workflows_dir = \"flows\"\n[inspect]\nclose_grace_secs = 1\ndefault_server_timeout_secs = 45\n[logging]\njson = true\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.workflows_dir, PathBuf::from("flows"));
        assert_eq!(config.inspect.request_timeout_secs, 30);
        let opts = config.inspect.session_options();
        assert_eq!(opts.close_grace, Duration::from_secs(1));
        assert_eq!(opts.container_handshake_timeout, Duration::from_secs(120));
        assert_eq!(
            config.inspect.default_server_timeout(),
            Some(Duration::from_secs(45))
        );
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpeek.toml");
        std::fs::write(&path, "[inspect]\nmax_concurrency = \"lots\"\n").unwrap();
        assert!(load(&path).is_err());
    }
}
