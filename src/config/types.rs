//! Core configuration types and loading.

use super::secret::SecretString;
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default number of pending alerts per sink before producers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_240;

/// Main configuration structure for dockwatch.
///
/// Field names follow the JSON layout of existing deployments, so their
/// config files load unchanged.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Engine API version to target, e.g. `"1.43"`. Negotiated when absent.
    #[serde(default)]
    pub docker_version: Option<String>,
    /// Engine endpoint: `unix://`, `tcp://`, `http://` or `https://`.
    /// Local defaults (`DOCKER_HOST` or the standard socket) when absent.
    #[serde(default)]
    pub docker_host: Option<String>,
    /// Monitored containers.
    pub containers: Vec<ContainerConfig>,
    /// Historical lines requested when a stream is opened.
    #[serde(default)]
    pub tail: Tail,
    /// Default sink for containers without their own `hook_url`.
    #[serde(default)]
    pub hook_url: Option<SecretString>,
    /// Payload format used for every sink.
    #[serde(default)]
    pub notifier: NotifierKind,
    /// Pending alerts per sink before `enqueue` applies backpressure.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// HTTP timeout for one notification request.
    #[serde(default = "default_notify_timeout", with = "humantime_serde")]
    pub notify_timeout: Duration,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One monitored container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    /// Engine-assigned id or container name.
    pub container_id: String,
    /// Label reported as `server` in every alert.
    pub server_name: String,
    /// Per-container sink override. An empty string counts as absent.
    #[serde(default)]
    pub hook_url: Option<SecretString>,
}

/// How much history to request when a log stream is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tail {
    #[default]
    All,
    Lines(u64),
}

impl Tail {
    /// Value for the engine's `tail` query parameter.
    pub fn as_param(&self) -> String {
        match self {
            Tail::All => "all".to_string(),
            Tail::Lines(n) => n.to_string(),
        }
    }
}

impl FromStr for Tail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Tail::All);
        }
        s.parse::<u64>()
            .map(Tail::Lines)
            .map_err(|_| format!("invalid tail '{}': expected a line count or \"all\"", s))
    }
}

impl<'de> Deserialize<'de> for Tail {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTail {
            Count(u64),
            Text(String),
        }

        match RawTail::deserialize(deserializer)? {
            RawTail::Count(n) => Ok(Tail::Lines(n)),
            RawTail::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Payload format spoken by the sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Lark / Feishu custom bot text message.
    #[default]
    Lark,
    /// Plain JSON `{"server", "msg"}` body.
    Webhook,
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierKind::Lark => f.write_str("lark"),
            NotifierKind::Webhook => f.write_str("webhook"),
        }
    }
}

/// Shutdown policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long sink consumers may keep delivering queued alerts after a
    /// termination signal. `0s` exits immediately.
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Engine API version, `MAJOR.MINOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: usize,
    pub minor: usize,
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let (major, minor) = trimmed
            .split_once('.')
            .ok_or_else(|| format!("invalid docker_version '{}': expected MAJOR.MINOR", s))?;
        let parse = |part: &str| {
            part.parse::<usize>()
                .map_err(|_| format!("invalid docker_version '{}': expected MAJOR.MINOR", s))
        };
        Ok(ApiVersion {
            major: parse(major)?,
            minor: parse(minor)?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_metrics_port() -> u16 {
    9090
}

/// Treats a missing and an empty URL the same way.
pub(crate) fn configured(hook: &Option<SecretString>) -> Option<&SecretString> {
    hook.as_ref().filter(|h| !h.expose().trim().is_empty())
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the document does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML (or JSON) text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Validate the configuration structure.
    ///
    /// Checks everything that does not depend on the environment. All
    /// problems are returned at once.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.containers.is_empty() {
            errors.push(ConfigError::ValidationError(
                "containers: at least one container must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, container) in self.containers.iter().enumerate() {
            let id = container.container_id.trim();
            if id.is_empty() {
                errors.push(ConfigError::ValidationError(format!(
                    "containers[{}]: container_id cannot be empty",
                    index
                )));
            } else if !seen.insert(id) {
                errors.push(ConfigError::ValidationError(format!(
                    "containers[{}]: duplicate container_id '{}'",
                    index, id
                )));
            }

            if container.server_name.trim().is_empty() {
                errors.push(ConfigError::ValidationError(format!(
                    "containers[{}]: server_name cannot be empty",
                    index
                )));
            }

            if configured(&container.hook_url).is_none() && configured(&self.hook_url).is_none() {
                errors.push(ConfigError::Unroutable {
                    container: display_name(container, index),
                });
            }
        }

        if self.queue_capacity == 0 {
            errors.push(ConfigError::ValidationError(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(ref version) = self.docker_version
            && !version.trim().is_empty()
            && let Err(e) = version.parse::<ApiVersion>()
        {
            errors.push(ConfigError::ValidationError(e));
        }

        if let Some(ref host) = self.docker_host
            && let Err(e) = super::runtime::DockerEndpoint::parse(host)
        {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn display_name(container: &ContainerConfig, index: usize) -> String {
    if container.container_id.trim().is_empty() {
        format!("containers[{}]", index)
    } else {
        container.container_id.clone()
    }
}
