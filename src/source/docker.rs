//! Log source backed by the bollard Docker client.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, LogsOptions, LogsOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, ClientVersion, Docker};
use futures_util::StreamExt;

use super::{LogSource, LogStream};
use crate::config::{ApiVersion, Tail};
use crate::error::StreamError;
use crate::framer::Framing;

/// Seconds bollard waits for a response head. Does not apply to the body
/// of a followed log stream.
const REQUEST_TIMEOUT_SECS: u64 = 120;

const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Reads logs through the engine's unix socket.
///
/// bollard demultiplexes stdout and stderr itself, so streams from this
/// source are always [`Framing::Raw`].
#[derive(Debug, Clone)]
pub struct DockerSource {
    docker: Docker,
}

impl DockerSource {
    /// Connect to a local engine through `socket`, or through the platform
    /// defaults when `None`.
    ///
    /// Without a pinned version the API version is negotiated with the
    /// engine. A failed negotiation is not fatal: the engine may come up
    /// later, and opening each container reports the error instead.
    pub async fn connect(
        socket: Option<&str>,
        api_version: Option<ApiVersion>,
    ) -> Result<Self, StreamError> {
        let version = api_version.map(|v| ClientVersion {
            major_version: v.major,
            minor_version: v.minor,
        });
        let client_version = version.as_ref().unwrap_or(API_DEFAULT_VERSION);

        let docker = match socket {
            None if version.is_none() => Docker::connect_with_local_defaults(),
            None => Docker::connect_with_local(&local_socket(), REQUEST_TIMEOUT_SECS, client_version),
            Some(path) => Docker::connect_with_socket(path, REQUEST_TIMEOUT_SECS, client_version),
        }
        .map_err(|e| StreamError::Open(format!("docker client: {}", e)))?;

        let docker = if version.is_some() {
            docker
        } else {
            match docker.clone().negotiate_version().await {
                Ok(negotiated) => negotiated,
                Err(e) => {
                    tracing::warn!(error = %e, "Engine API version negotiation failed");
                    docker
                }
            }
        };

        tracing::info!(
            api_version = %docker.client_version(),
            "Connected to container engine"
        );

        Ok(Self { docker })
    }
}

/// Unix socket named by `DOCKER_HOST`, or the standard one.
fn local_socket() -> String {
    std::env::var("DOCKER_HOST")
        .ok()
        .filter(|host| host.starts_with("unix://"))
        .unwrap_or_else(|| DEFAULT_SOCKET.to_string())
}

#[async_trait]
impl LogSource for DockerSource {
    async fn open(&self, container_id: &str, tail: Tail) -> Result<LogStream, StreamError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();

        let info = match self
            .docker
            .inspect_container(container_id, Some(options))
            .await
        {
            Ok(info) => info,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(StreamError::NotFound(container_id.to_string())),
            Err(e) => {
                return Err(StreamError::Unavailable {
                    container: container_id.to_string(),
                    message: e.to_string(),
                });
            }
        };

        if let Some(state) = info.state
            && !state.running.unwrap_or(false)
        {
            tracing::warn!(
                container = %container_id,
                "Container is not running, only its existing logs will be read"
            );
        }

        let options: LogsOptions = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .tail(&tail.as_param())
            .build();

        let chunks = self
            .docker
            .logs(container_id, Some(options))
            .map(|item| {
                item.map(LogOutput::into_bytes)
                    .map_err(|e| StreamError::Read(e.to_string()))
            })
            .boxed();

        Ok(LogStream {
            framing: Framing::Raw,
            chunks,
        })
    }
}
