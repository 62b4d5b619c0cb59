//! Log source speaking the Engine HTTP API directly.
//!
//! Used for `tcp://` and `http(s)://` engine hosts. The log endpoint is read
//! as raw bytes, so containers without a TTY arrive as a multiplexed stream
//! and go through the frame decoder.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{LogSource, LogStream};
use crate::config::{ApiVersion, Tail};
use crate::error::StreamError;
use crate::framer::Framing;

// No read timeout: a followed log stream may stay silent for hours.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct InspectResponse {
    #[serde(rename = "Config", default)]
    config: Option<InspectConfig>,
    #[serde(rename = "State", default)]
    state: Option<InspectState>,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Tty", default)]
    tty: bool,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
}

/// Engine API client over HTTP.
#[derive(Debug, Clone)]
pub struct EngineApiSource {
    base_url: String,
    api_version: Option<ApiVersion>,
    client: Client,
}

impl EngineApiSource {
    /// Create a source for `base_url` (`http://host:port`, no trailing
    /// slash). Without a version, unversioned paths are used and the engine
    /// serves its own API version.
    pub fn new(base_url: String, api_version: Option<ApiVersion>) -> Result<Self, StreamError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StreamError::Open(format!("http client: {}", e)))?;

        Ok(Self {
            base_url,
            api_version,
            client,
        })
    }

    fn container_url(&self, container_id: &str, endpoint: &str) -> String {
        let prefix = match self.api_version {
            Some(version) => format!("{}/v{}", self.base_url, version),
            None => self.base_url.clone(),
        };
        format!(
            "{}/containers/{}/{}",
            prefix,
            urlencoding::encode(container_id),
            endpoint
        )
    }

    /// Build the follow-mode logs URL.
    pub fn logs_url(&self, container_id: &str, tail: Tail) -> String {
        format!(
            "{}?stdout=1&stderr=1&follow=1&tail={}",
            self.container_url(container_id, "logs"),
            tail.as_param()
        )
    }

    async fn inspect(&self, container_id: &str) -> Result<InspectResponse, StreamError> {
        let unavailable = |message: String| StreamError::Unavailable {
            container: container_id.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.container_url(container_id, "json"))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StreamError::NotFound(container_id.to_string())),
            status if !status.is_success() => Err(unavailable(format!("inspect: HTTP {}", status))),
            _ => response
                .json::<InspectResponse>()
                .await
                .map_err(|e| unavailable(format!("inspect: {}", e))),
        }
    }
}

#[async_trait]
impl LogSource for EngineApiSource {
    async fn open(&self, container_id: &str, tail: Tail) -> Result<LogStream, StreamError> {
        let info = self.inspect(container_id).await?;

        if let Some(state) = &info.state
            && !state.running
        {
            tracing::warn!(
                container = %container_id,
                "Container is not running, only its existing logs will be read"
            );
        }

        let tty = info.config.is_some_and(|c| c.tty);
        let framing = if tty {
            Framing::Raw
        } else {
            Framing::Multiplexed
        };

        let response = self
            .client
            .get(self.logs_url(container_id, tail))
            .send()
            .await
            .map_err(|e| StreamError::Open(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(StreamError::NotFound(container_id.to_string())),
            status if !status.is_success() => {
                return Err(StreamError::Open(format!("HTTP {}", status)));
            }
            _ => {}
        }

        tracing::debug!(container = %container_id, tty, "Log stream opened");

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Read(e.to_string())))
            .boxed();

        Ok(LogStream { framing, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_url_with_pinned_version() {
        let source = EngineApiSource::new(
            "http://10.0.0.5:2375".to_string(),
            Some(ApiVersion { major: 1, minor: 43 }),
        )
        .unwrap();

        assert_eq!(
            source.logs_url("3f2a9c1d7e4b", Tail::Lines(50)),
            "http://10.0.0.5:2375/v1.43/containers/3f2a9c1d7e4b/logs?stdout=1&stderr=1&follow=1&tail=50"
        );
    }

    #[test]
    fn logs_url_unversioned_and_encoded() {
        let source = EngineApiSource::new("http://docker:2375".to_string(), None).unwrap();

        assert_eq!(
            source.logs_url("my app", Tail::All),
            "http://docker:2375/containers/my%20app/logs?stdout=1&stderr=1&follow=1&tail=all"
        );
    }

    #[test]
    fn inspect_response_reads_tty_flag() {
        let body = r#"{"Id":"abc","Config":{"Tty":true,"Image":"nginx"},"State":{"Running":true}}"#;
        let info: InspectResponse = serde_json::from_str(body).unwrap();
        assert!(info.config.unwrap().tty);
        assert!(info.state.unwrap().running);

        let info: InspectResponse = serde_json::from_str(r#"{"Id":"abc"}"#).unwrap();
        assert!(info.config.is_none());
    }
}
