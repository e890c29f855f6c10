//! Agent configuration, loaded from TOML with every field defaulted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tl_link::ReconnectBackoff;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tvlink.toml";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Control server WebSocket endpoint.
    #[serde(default = "d_ws_url")]
    pub ws_url: String,
    /// HTTP registration endpoint (side channel).
    #[serde(default = "d_register_url")]
    pub register_url: String,
    #[serde(default = "d_register_timeout_ms")]
    pub register_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: d_ws_url(),
            register_url: d_register_url(),
            register_timeout_ms: d_register_timeout_ms(),
        }
    }
}

fn d_ws_url() -> String {
    "ws://localhost:8080/ws".into()
}
fn d_register_url() -> String {
    "http://localhost:8080/api/tv/register".into()
}
fn d_register_timeout_ms() -> u64 {
    10_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Link
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "d_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Bound on TCP connect plus the TLS and WebSocket handshakes.
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Health timer period as a multiple of the ping interval.
    #[serde(default = "d_health_check_multiplier")]
    pub health_check_multiplier: u32,
    /// Idle time, in ping intervals, after which the link is stale.
    #[serde(default = "d_stale_multiplier")]
    pub stale_multiplier: u32,
    #[serde(default = "d_max_inbound_bytes")]
    pub max_inbound_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: d_ping_interval_ms(),
            connect_timeout_ms: d_connect_timeout_ms(),
            health_check_multiplier: d_health_check_multiplier(),
            stale_multiplier: d_stale_multiplier(),
            max_inbound_bytes: d_max_inbound_bytes(),
        }
    }
}

fn d_ping_interval_ms() -> u64 {
    30_000
}
fn d_connect_timeout_ms() -> u64 {
    10_000
}
fn d_health_check_multiplier() -> u32 {
    2
}
fn d_stale_multiplier() -> u32 {
    3
}
fn d_max_inbound_bytes() -> usize {
    64 * 1024
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backoff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "d_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before giving up; `0` retries forever.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: d_min_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            max_attempts: d_max_attempts(),
        }
    }
}

impl BackoffConfig {
    pub fn policy(&self) -> ReconnectBackoff {
        ReconnectBackoff {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

fn d_min_delay_ms() -> u64 {
    5_000
}
fn d_max_delay_ms() -> u64 {
    300_000
}
fn d_max_attempts() -> u32 {
    20
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Fixed device id.  When unset the id comes from `identity_file`,
    /// generated and persisted on first start.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "d_unknown")]
    pub model: String,
    #[serde(default = "d_unknown")]
    pub brand: String,
    /// Reported address; detected from the default route when unset.
    #[serde(default)]
    pub ip: Option<String>,
    /// Branch / group the device belongs to.
    #[serde(default = "d_group_id")]
    pub group_id: String,
    #[serde(default = "d_identity_file")]
    pub identity_file: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: None,
            model: d_unknown(),
            brand: d_unknown(),
            ip: None,
            group_id: d_group_id(),
            identity_file: d_identity_file(),
        }
    }
}

fn d_unknown() -> String {
    "unknown".into()
}
fn d_group_id() -> String {
    "default".into()
}
fn d_identity_file() -> PathBuf {
    PathBuf::from("./data/device.json")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Log key events without touching the device.
    #[default]
    Log,
    /// Run `program args… <code>` for every key event.
    Shell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub kind: ExecutorKind,
    #[serde(default = "d_program")]
    pub program: String,
    #[serde(default = "d_args")]
    pub args: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::default(),
            program: d_program(),
            args: d_args(),
        }
    }
}

fn d_program() -> String {
    "input".into()
}
fn d_args() -> Vec<String> {
    vec!["keyevent".into()]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Process / logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Exclusive-locked PID file preventing a second agent on the same
    /// device.  Set to `""` to run without a lock.
    #[serde(default = "d_pid_file")]
    pub pid_file: Option<PathBuf>,
}

impl ProcessConfig {
    /// The lock path, or `None` when locking is disabled.
    pub fn pid_path(&self) -> Option<&Path> {
        self.pid_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            pid_file: d_pid_file(),
        }
    }
}

fn d_pid_file() -> Option<PathBuf> {
    Some(PathBuf::from("./data/tvlink.pid"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow::anyhow!("parsing config: {e}"))
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
    }

    /// Apply `TVLINK_*` overrides through `lookup` (normally
    /// `std::env::var`).  Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("TVLINK_WS_URL") {
            self.server.ws_url = url;
        }
        if let Some(url) = get("TVLINK_REGISTER_URL") {
            self.server.register_url = url;
        }
        if let Some(id) = get("TVLINK_DEVICE_ID") {
            self.device.id = Some(id);
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.link.ping_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.link.connect_timeout_ms)
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.server.register_timeout_ms)
    }
}

/// Load the config from `explicit` (the `--config` flag), else
/// `TVLINK_CONFIG`, else [`DEFAULT_CONFIG_PATH`], then apply environment
/// overrides.  Returns the config and the path that was used.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(Config, PathBuf)> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::var("TVLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };

    let mut config = Config::load(&path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok((config, path))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let ws_url = self.server.ws_url.trim();
        if ws_url.is_empty() {
            errors.push(ConfigError::error("server.ws_url", "must not be empty"));
        } else if ws_url.starts_with("ws://") {
            errors.push(ConfigError::warning(
                "server.ws_url",
                "plain ws:// is unencrypted; use wss:// outside a trusted network",
            ));
        } else if !ws_url.starts_with("wss://") {
            errors.push(ConfigError::error(
                "server.ws_url",
                format!("'{ws_url}' must start with ws:// or wss://"),
            ));
        }

        let register_url = self.server.register_url.trim();
        if register_url.is_empty() {
            errors.push(ConfigError::error("server.register_url", "must not be empty"));
        } else if !(register_url.starts_with("http://") || register_url.starts_with("https://")) {
            errors.push(ConfigError::error(
                "server.register_url",
                format!("'{register_url}' must start with http:// or https://"),
            ));
        }

        if self.server.register_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "server.register_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.link.ping_interval_ms == 0 {
            errors.push(ConfigError::error(
                "link.ping_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.link.connect_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "link.connect_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.link.health_check_multiplier == 0 {
            errors.push(ConfigError::error(
                "link.health_check_multiplier",
                "must be at least 1",
            ));
        }
        if self.link.stale_multiplier == 0 {
            errors.push(ConfigError::error(
                "link.stale_multiplier",
                "must be at least 1",
            ));
        }
        if self.link.max_inbound_bytes == 0 {
            errors.push(ConfigError::error(
                "link.max_inbound_bytes",
                "must be greater than 0",
            ));
        }

        if self.backoff.min_delay_ms > self.backoff.max_delay_ms {
            errors.push(ConfigError::error(
                "backoff.min_delay_ms",
                format!(
                    "min_delay_ms ({}) exceeds max_delay_ms ({})",
                    self.backoff.min_delay_ms, self.backoff.max_delay_ms
                ),
            ));
        }
        if self.backoff.max_attempts == 0 {
            errors.push(ConfigError::warning(
                "backoff.max_attempts",
                "0 retries forever; the agent will never exit on its own",
            ));
        }

        if matches!(&self.device.id, Some(id) if id.trim().is_empty()) {
            errors.push(ConfigError::error(
                "device.id",
                "must not be empty when set",
            ));
        }

        if self.executor.kind == ExecutorKind::Shell && self.executor.program.trim().is_empty() {
            errors.push(ConfigError::error(
                "executor.program",
                "required when executor.kind = \"shell\"",
            ));
        }

        errors
    }

    /// `true` when [`validate`](Self::validate) reports no errors
    /// (warnings are allowed).
    pub fn is_runnable(&self) -> bool {
        !self
            .validate()
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_policy_converts_millis() {
        let policy = BackoffConfig::default().policy();
        assert_eq!(policy.min_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(300));
        assert_eq!(policy.max_attempts, 20);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.link.ping_interval_ms, 30_000);
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[link\nping_interval_ms = ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "TVLINK_WS_URL" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.server.ws_url, d_ws_url());
    }
}
