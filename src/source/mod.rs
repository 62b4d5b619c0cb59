//! Container log sources.
//!
//! A [`LogSource`] opens the follow-mode log stream of one container and
//! hands back raw byte chunks together with their [`Framing`]. Decoding
//! into lines is left to [`crate::framer::LineFramer`].

pub mod docker;
pub mod engine_api;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::config::{DockerEndpoint, DockerSettings, Tail};
use crate::error::StreamError;
use crate::framer::Framing;

pub use docker::DockerSource;
pub use engine_api::EngineApiSource;

/// An open container log stream.
pub struct LogStream {
    pub framing: Framing,
    pub chunks: BoxStream<'static, Result<Bytes, StreamError>>,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

/// Opens combined stdout and stderr log streams in follow mode.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Open the log stream of `container_id`, replaying `tail` historical
    /// lines first.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotFound`] if the engine does not know the container,
    /// [`StreamError::Unavailable`] or [`StreamError::Open`] if the stream
    /// cannot be started. Callers do not retry.
    async fn open(&self, container_id: &str, tail: Tail) -> Result<LogStream, StreamError>;
}

/// Connect the source matching the configured engine endpoint.
///
/// Local sockets go through bollard; TCP and HTTP hosts are read with a
/// plain HTTP client so the multiplexed stream reaches the framer as is.
pub async fn connect(settings: &DockerSettings) -> Result<Arc<dyn LogSource>, StreamError> {
    match &settings.endpoint {
        DockerEndpoint::Http(base_url) => Ok(Arc::new(EngineApiSource::new(
            base_url.clone(),
            settings.api_version,
        )?)),
        DockerEndpoint::Unix(path) => Ok(Arc::new(
            DockerSource::connect(Some(path.as_str()), settings.api_version).await?,
        )),
        DockerEndpoint::LocalDefaults => Ok(Arc::new(
            DockerSource::connect(None, settings.api_version).await?,
        )),
    }
}
