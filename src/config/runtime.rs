//! Runtime configuration with resolved hook URLs and engine endpoint.

use super::env::resolve_env_vars;
use super::secret::SecretString;
use super::types::{
    ApiVersion, Config, ContainerConfig, MetricsConfig, NotifierKind, ShutdownConfig, Tail,
    configured,
};
use crate::error::ConfigError;
use std::time::Duration;

/// Where the container engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// `DOCKER_HOST` or the platform's default socket.
    LocalDefaults,
    /// A unix socket path.
    Unix(String),
    /// Engine API over plain HTTP(S), base URL without trailing slash.
    Http(String),
}

impl DockerEndpoint {
    /// Parse a `docker_host` value.
    pub fn parse(host: &str) -> Result<Self, ConfigError> {
        let host = host.trim();
        if host.is_empty() {
            return Ok(DockerEndpoint::LocalDefaults);
        }
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ConfigError::ValidationError(
                    "docker_host: unix socket path cannot be empty".to_string(),
                ));
            }
            return Ok(DockerEndpoint::Unix(path.to_string()));
        }
        if let Some(addr) = host.strip_prefix("tcp://") {
            return Ok(DockerEndpoint::Http(format!(
                "http://{}",
                addr.trim_end_matches('/')
            )));
        }
        if host.starts_with("http://") || host.starts_with("https://") {
            return Ok(DockerEndpoint::Http(host.trim_end_matches('/').to_string()));
        }
        Err(ConfigError::ValidationError(format!(
            "docker_host '{}': expected unix://, tcp://, http:// or https://",
            host
        )))
    }
}

impl std::fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DockerEndpoint::LocalDefaults => f.write_str("local defaults"),
            DockerEndpoint::Unix(path) => write!(f, "unix://{}", path),
            DockerEndpoint::Http(url) => f.write_str(url),
        }
    }
}

/// Engine connection settings.
#[derive(Debug, Clone)]
pub struct DockerSettings {
    pub endpoint: DockerEndpoint,
    /// Pinned API version; `None` negotiates with the engine.
    pub api_version: Option<ApiVersion>,
}

/// A monitored container with its override URL resolved.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub container_id: String,
    pub server_name: String,
    pub hook_url: Option<SecretString>,
}

/// Runtime configuration, ready to start the agent.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub docker: DockerSettings,
    pub containers: Vec<ContainerSpec>,
    pub tail: Tail,
    pub default_hook: Option<SecretString>,
    pub notifier: NotifierKind,
    pub queue_capacity: usize,
    pub notify_timeout: Duration,
    pub shutdown: ShutdownConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Resolve environment variables and URLs into a [`RuntimeConfig`].
    ///
    /// Call after [`Config::validate`]. Every error found is returned.
    pub fn compile(self) -> Result<RuntimeConfig, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let default_hook = match configured(&self.hook_url) {
            Some(hook) => resolve_hook("default", hook).map_err(|e| errors.push(e)).ok(),
            None => None,
        };

        let containers: Vec<ContainerSpec> = self
            .containers
            .iter()
            .filter_map(|container| match resolve_container(container) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    errors.push(e);
                    None
                }
            })
            .collect();

        let endpoint = match self.docker_host.as_deref() {
            Some(host) => DockerEndpoint::parse(host).map_err(|e| errors.push(e)).ok(),
            None => Some(DockerEndpoint::LocalDefaults),
        };

        let api_version = match self.docker_version.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v
                .parse::<ApiVersion>()
                .map_err(|e| errors.push(ConfigError::ValidationError(e)))
                .ok(),
            _ => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(RuntimeConfig {
            docker: DockerSettings {
                endpoint: endpoint.unwrap_or(DockerEndpoint::LocalDefaults),
                api_version,
            },
            containers,
            tail: self.tail,
            default_hook,
            notifier: self.notifier,
            queue_capacity: self.queue_capacity,
            notify_timeout: self.notify_timeout,
            shutdown: self.shutdown,
            metrics: self.metrics,
        })
    }
}

fn resolve_container(container: &ContainerConfig) -> Result<ContainerSpec, ConfigError> {
    let hook_url = match configured(&container.hook_url) {
        Some(hook) => Some(resolve_hook(&container.container_id, hook)?),
        None => None,
    };

    Ok(ContainerSpec {
        container_id: container.container_id.trim().to_string(),
        server_name: container.server_name.clone(),
        hook_url,
    })
}

/// Substitute `${VAR}` references and check the result is an HTTP(S) URL.
fn resolve_hook(owner: &str, hook: &SecretString) -> Result<SecretString, ConfigError> {
    let resolved = resolve_env_vars(hook.expose().trim()).map_err(|e| {
        ConfigError::InvalidHookUrl {
            owner: owner.to_string(),
            message: e.to_string(),
        }
    })?;

    let url = reqwest::Url::parse(&resolved).map_err(|e| ConfigError::InvalidHookUrl {
        owner: owner.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(SecretString::new(resolved)),
        other => Err(ConfigError::InvalidHookUrl {
            owner: owner.to_string(),
            message: format!("unsupported scheme '{}'", other),
        }),
    }
}
