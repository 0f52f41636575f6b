//! Configuration system for the harness.
//!
//! Values are layered, later layers winning:
//! - built-in defaults
//! - an optional TOML file
//! - `FCR_` environment variables
//! - command-line flags (applied by the binary through [`Sourced::from_cli`])
//!
//! Every value remembers where it came from so `fcr show-config` can explain
//! the effective setup. The phase flag and old-cluster version have no
//! default: the phase must be injected, never guessed.

pub mod env;
pub mod source;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, ConfigValueSource, Sourced};

use crate::client::Credentials;
use crate::phase::{ClusterVersion, Phase, PhaseContext, VersionParseError};
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, Poller};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9200";
pub const DEFAULT_USERNAME: &str = "test_user";
pub const DEFAULT_PASSWORD: &str = "x-pack-test-password";

/// Long enough to cover waits for green health with delayed shards.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

pub const DEFAULT_READINESS_TEMPLATES: &[&str] = &[
    "security-index-template",
    ".ml-anomalies-",
    ".ml-state",
    ".ml-meta",
    ".ml-notifications",
];

pub const DEFAULT_MONITORING_TEMPLATE_IDS: &[&str] = &["es", "kibana", "logstash", "beats", "alerts"];

/// Version stamp carried by current monitoring templates.
pub const DEFAULT_MONITORING_TEMPLATE_VERSION: i64 = 6_000_026;

/// Security index format that accepts writes without an upgrade call.
pub const DEFAULT_SECURITY_INDEX_FORMAT: i64 = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid environment: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Env(Vec<EnvError>),

    #[error("missing required setting '{key}' (set {env} or pass --{flag})")]
    Missing {
        key: &'static str,
        env: &'static str,
        flag: &'static str,
    },

    #[error("invalid setting '{key}': {message}")]
    Invalid { key: &'static str, message: String },

    #[error(transparent)]
    Version(#[from] VersionParseError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    is_old_cluster: Option<bool>,
    old_cluster_version: Option<String>,
    client_timeout: Option<String>,
    poll_timeout: Option<String>,
    poll_interval: Option<String>,
    readiness_templates: Option<Vec<String>>,
    #[serde(default)]
    monitoring: MonitoringFileConfig,
    #[serde(default)]
    security: SecurityFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitoringFileConfig {
    template_ids: Option<Vec<String>>,
    template_version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecurityFileConfig {
    internal_index_format: Option<i64>,
}

/// Effective harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub endpoint: Sourced<String>,
    pub username: Sourced<String>,
    pub password: Sourced<String>,
    pub is_old_cluster: Option<Sourced<bool>>,
    pub old_cluster_version: Option<Sourced<String>>,
    pub client_timeout: Sourced<Duration>,
    pub poll_timeout: Sourced<Duration>,
    pub poll_interval: Sourced<Duration>,
    pub readiness_templates: Sourced<Vec<String>>,
    pub monitoring_template_ids: Sourced<Vec<String>>,
    pub monitoring_template_version: Sourced<i64>,
    pub security_index_format: Sourced<i64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            endpoint: Sourced::default_value(DEFAULT_ENDPOINT.to_string()),
            username: Sourced::default_value(DEFAULT_USERNAME.to_string()),
            password: Sourced::default_value(DEFAULT_PASSWORD.to_string()),
            is_old_cluster: None,
            old_cluster_version: None,
            client_timeout: Sourced::default_value(DEFAULT_CLIENT_TIMEOUT),
            poll_timeout: Sourced::default_value(DEFAULT_POLL_TIMEOUT),
            poll_interval: Sourced::default_value(DEFAULT_POLL_INTERVAL),
            readiness_templates: Sourced::default_value(strings(DEFAULT_READINESS_TEMPLATES)),
            monitoring_template_ids: Sourced::default_value(strings(DEFAULT_MONITORING_TEMPLATE_IDS)),
            monitoring_template_version: Sourced::default_value(DEFAULT_MONITORING_TEMPLATE_VERSION),
            security_index_format: Sourced::default_value(DEFAULT_SECURITY_INDEX_FORMAT),
        }
    }
}

fn parse_file_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|err| ConfigError::Invalid {
        key,
        message: format!("'{value}' is not a duration: {err}"),
    })
}

impl HarnessConfig {
    /// Defaults, then the optional file, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            config.apply_file(path)?;
        }
        let mut parser = EnvParser::new();
        config.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(config)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        self.apply_toml(&text, &display)
    }

    /// Apply TOML text; `origin` names the file in source tracking.
    pub fn apply_toml(&mut self, text: &str, origin: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: origin.to_string(),
            message: err.to_string(),
        })?;
        debug!(origin, "applying config file");

        if let Some(v) = file.endpoint {
            self.endpoint = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.username {
            self.username = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.password {
            self.password = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.is_old_cluster {
            self.is_old_cluster = Some(Sourced::from_file(v, origin));
        }
        if let Some(v) = file.old_cluster_version {
            self.old_cluster_version = Some(Sourced::from_file(v, origin));
        }
        if let Some(v) = file.client_timeout {
            self.client_timeout = Sourced::from_file(parse_file_duration("client_timeout", &v)?, origin);
        }
        if let Some(v) = file.poll_timeout {
            self.poll_timeout = Sourced::from_file(parse_file_duration("poll_timeout", &v)?, origin);
        }
        if let Some(v) = file.poll_interval {
            self.poll_interval = Sourced::from_file(parse_file_duration("poll_interval", &v)?, origin);
        }
        if let Some(v) = file.readiness_templates {
            self.readiness_templates = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.monitoring.template_ids {
            self.monitoring_template_ids = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.monitoring.template_version {
            self.monitoring_template_version = Sourced::from_file(v, origin);
        }
        if let Some(v) = file.security.internal_index_format {
            self.security_index_format = Sourced::from_file(v, origin);
        }
        Ok(())
    }

    /// Overlay `FCR_*` variables; parse errors accumulate in `parser`.
    pub fn apply_env(&mut self, parser: &mut EnvParser) {
        if let Some(v) = parser.get_string("ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = parser.get_string("USERNAME") {
            self.username = v;
        }
        if let Some(v) = parser.get_string("PASSWORD") {
            self.password = v;
        }
        if let Some(v) = parser.get_bool("IS_OLD_CLUSTER") {
            self.is_old_cluster = Some(v);
        }
        if let Some(v) = parser.get_string("OLD_CLUSTER_VERSION") {
            self.old_cluster_version = Some(v);
        }
        if let Some(v) = parser.get_duration("CLIENT_TIMEOUT") {
            self.client_timeout = v;
        }
        if let Some(v) = parser.get_duration("POLL_TIMEOUT") {
            self.poll_timeout = v;
        }
        if let Some(v) = parser.get_duration("POLL_INTERVAL") {
            self.poll_interval = v;
        }
        if let Some(v) = parser.get_string_list("READINESS_TEMPLATES") {
            self.readiness_templates = v;
        }
        if let Some(v) = parser.get_string_list("MONITORING_TEMPLATE_IDS") {
            self.monitoring_template_ids = v;
        }
        if let Some(v) = parser.get_u64_range("MONITORING_TEMPLATE_VERSION", 0, i64::MAX as u64) {
            self.monitoring_template_version = v.map(|n| n as i64);
        }
        if let Some(v) = parser.get_u64_range("SECURITY_INDEX_FORMAT", 0, 1_000) {
            self.security_index_format = v.map(|n| n as i64);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.value.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid {
                key: "endpoint",
                message: "must not be empty".to_string(),
            });
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "endpoint",
                message: format!("'{endpoint}' must start with http:// or https://"),
            });
        }
        if self.poll_timeout.value.is_zero() {
            return Err(ConfigError::Invalid {
                key: "poll_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval.value > self.poll_timeout.value {
            return Err(ConfigError::Invalid {
                key: "poll_interval",
                message: format!(
                    "{} exceeds poll_timeout {}",
                    humantime::format_duration(self.poll_interval.value),
                    humantime::format_duration(self.poll_timeout.value)
                ),
            });
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.value.clone(), self.password.value.clone())
    }

    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_timeout.value, self.poll_interval.value)
    }

    pub fn phase(&self) -> Result<Phase, ConfigError> {
        self.is_old_cluster
            .as_ref()
            .map(|flag| Phase::from_old_cluster_flag(flag.value))
            .ok_or(ConfigError::Missing {
                key: "is_old_cluster",
                env: "FCR_IS_OLD_CLUSTER",
                flag: "old-cluster/--new-cluster",
            })
    }

    /// Build the immutable per-run context.
    pub fn phase_context(&self) -> Result<PhaseContext, ConfigError> {
        let phase = self.phase()?;
        let version = self
            .old_cluster_version
            .as_ref()
            .ok_or(ConfigError::Missing {
                key: "old_cluster_version",
                env: "FCR_OLD_CLUSTER_VERSION",
                flag: "old-cluster-version",
            })?;
        let old_cluster_version: ClusterVersion = version.value.parse()?;
        Ok(PhaseContext::new(phase, old_cluster_version, self.credentials()))
    }

    /// `(key, value, origin)` rows with the password redacted.
    pub fn describe(&self) -> Vec<(&'static str, String, String)> {
        let duration = |d: &Sourced<Duration>| humantime::format_duration(d.value).to_string();
        let unset = "<unset>".to_string();
        vec![
            ("endpoint", self.endpoint.value.clone(), self.endpoint.origin.to_string()),
            ("username", self.username.value.clone(), self.username.origin.to_string()),
            ("password", "<redacted>".to_string(), self.password.origin.to_string()),
            (
                "is_old_cluster",
                self.is_old_cluster
                    .as_ref()
                    .map(|v| v.value.to_string())
                    .unwrap_or_else(|| unset.clone()),
                self.is_old_cluster
                    .as_ref()
                    .map(|v| v.origin.to_string())
                    .unwrap_or_default(),
            ),
            (
                "old_cluster_version",
                self.old_cluster_version
                    .as_ref()
                    .map(|v| v.value.clone())
                    .unwrap_or_else(|| unset.clone()),
                self.old_cluster_version
                    .as_ref()
                    .map(|v| v.origin.to_string())
                    .unwrap_or_default(),
            ),
            ("client_timeout", duration(&self.client_timeout), self.client_timeout.origin.to_string()),
            ("poll_timeout", duration(&self.poll_timeout), self.poll_timeout.origin.to_string()),
            ("poll_interval", duration(&self.poll_interval), self.poll_interval.origin.to_string()),
            (
                "readiness_templates",
                self.readiness_templates.value.join(","),
                self.readiness_templates.origin.to_string(),
            ),
            (
                "monitoring.template_ids",
                self.monitoring_template_ids.value.join(","),
                self.monitoring_template_ids.origin.to_string(),
            ),
            (
                "monitoring.template_version",
                self.monitoring_template_version.value.to_string(),
                self.monitoring_template_version.origin.to_string(),
            ),
            (
                "security.internal_index_format",
                self.security_index_format.value.to_string(),
                self.security_index_format.origin.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
