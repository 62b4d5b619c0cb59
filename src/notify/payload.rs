//! Alert message carried from a tail session to its sink.

use serde::Serialize;

use crate::error::NotifyError;

/// One matched log line and the label of the container it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    /// `server_name` of the originating container.
    pub server: String,
    /// The matched line, verbatim.
    pub msg: String,
}

impl AlertMessage {
    pub fn new(server: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            msg: msg.into(),
        }
    }

    /// JSON text `{"server": ..., "msg": ...}` used as the chat message body.
    pub fn text(&self) -> Result<String, NotifyError> {
        serde_json::to_string(self).map_err(|e| NotifyError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_server_and_msg_json() {
        let alert = AlertMessage::new("api-prod", "connection error: timeout");
        assert_eq!(
            alert.text().unwrap(),
            r#"{"server":"api-prod","msg":"connection error: timeout"}"#
        );
    }

    #[test]
    fn text_escapes_quotes_and_control_characters() {
        let alert = AlertMessage::new("db", "ERROR \"quoted\"\ttab");
        let text = alert.text().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["msg"], "ERROR \"quoted\"\ttab");
    }
}
