//! Lark (Feishu) custom bot notifier.
//!
//! Sends each alert as a text message through a bot webhook. The bot API
//! answers HTTP 200 even when it refuses a message and reports the outcome
//! in the JSON body, either as `code`/`msg` or, on older deployments, as
//! `StatusCode`/`StatusMessage`.

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use crate::config::SecretString;
use crate::error::NotifyError;
use crate::notify::{AlertMessage, Notifier};

#[derive(Debug, Clone, Serialize)]
struct LarkContent {
    text: String,
}

/// Text message body accepted by the bot webhook.
#[derive(Debug, Clone, Serialize)]
struct LarkPayload {
    msg_type: &'static str,
    content: LarkContent,
}

fn build_lark_payload(alert: &AlertMessage) -> Result<LarkPayload, NotifyError> {
    Ok(LarkPayload {
        msg_type: "text",
        content: LarkContent { text: alert.text()? },
    })
}

/// Interpret the bot's response body.
///
/// A body that is not a JSON object, or carries no status field, counts
/// as accepted.
fn check_lark_response(body: &str) -> Result<(), NotifyError> {
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(body)
    else {
        return Ok(());
    };

    let (code, message) = if let Some(code) = fields.get("code") {
        (code, fields.get("msg"))
    } else if let Some(code) = fields.get("StatusCode") {
        (code, fields.get("StatusMessage"))
    } else {
        return Ok(());
    };

    match code.as_i64() {
        Some(0) => Ok(()),
        _ => {
            let message = message.and_then(|m| m.as_str()).unwrap_or("unknown error");
            Err(NotifyError::Rejected(format!("code {}: {}", code, message)))
        }
    }
}

/// Notifier posting to a Lark custom bot webhook.
pub struct LarkNotifier {
    name: String,
    url: SecretString,
    client: reqwest::Client,
}

impl LarkNotifier {
    /// Create a new Lark notifier.
    ///
    /// `client` is shared between notifiers and carries the request timeout.
    pub fn new(name: String, url: SecretString, client: reqwest::Client) -> Self {
        Self { name, url, client }
    }
}

#[async_trait]
impl Notifier for LarkNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier_type(&self) -> &str {
        "lark"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
        let span = tracing::debug_span!("send_lark", sink = %self.name, server = %alert.server);

        async {
            let payload = build_lark_payload(alert)?;

            let response = self
                .client
                .post(self.url.expose())
                .json(&payload)
                .send()
                .await
                .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Status(status.as_u16()));
            }

            let body = response
                .text()
                .await
                .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;
            check_lark_response(&body)?;

            tracing::debug!("Lark message accepted");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for LarkNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LarkNotifier")
            .field("name", &self.name)
            .finish()
    }
}
