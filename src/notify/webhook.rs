//! Generic JSON webhook notifier.
//!
//! Posts the alert itself, `{"server": ..., "msg": ...}`, as the request
//! body. Any 2xx response counts as delivered.

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::SecretString;
use crate::error::NotifyError;
use crate::notify::{AlertMessage, Notifier};

/// Notifier posting alerts to an arbitrary HTTP endpoint.
pub struct WebhookNotifier {
    name: String,
    url: SecretString,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(name: String, url: SecretString, client: reqwest::Client) -> Self {
        Self { name, url, client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier_type(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
        let span =
            tracing::debug_span!("send_webhook", sink = %self.name, server = %alert.server);

        async {
            let response = self
                .client
                .post(self.url.expose())
                .json(alert)
                .send()
                .await
                .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Status(status.as_u16()));
            }

            tracing::debug!(status = %status, "Webhook accepted alert");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed a token.
        f.debug_struct("WebhookNotifier")
            .field("name", &self.name)
            .finish()
    }
}
