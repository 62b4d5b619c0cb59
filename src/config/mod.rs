//! Configuration loading and validation for dockwatch.
//!
//! The file is YAML; JSON documents load as well. Loading happens in three
//! steps: [`Config::load`] parses, [`Config::validate`] checks structure and
//! routing, [`Config::compile`] resolves `${VAR}` references and URLs.

mod env;
mod runtime;
mod secret;
mod types;

pub use env::resolve_env_vars;
pub use runtime::{ContainerSpec, DockerEndpoint, DockerSettings, RuntimeConfig};
pub use secret::SecretString;
pub use types::{
    ApiVersion, Config, ContainerConfig, DEFAULT_QUEUE_CAPACITY, MetricsConfig, NotifierKind,
    ShutdownConfig, Tail,
};
