//! Alert delivery for dockwatch.
//!
//! Tail sessions never talk HTTP themselves. Each matched line becomes an
//! [`AlertMessage`] pushed onto the [`Sink`] its container was routed to at
//! startup. One [`SinkWorker`] per sink delivers the queue in order through
//! a [`Notifier`].
//!
//! ```text
//! tail tasks -> Router -> Sink (bounded mpsc) -> SinkWorker -> Notifier -> HTTP
//! ```

pub mod lark;
mod payload;
pub mod router;
pub mod sink;
mod traits;
pub mod webhook;

use std::sync::Arc;

use crate::config::{NotifierKind, SecretString};

pub use lark::LarkNotifier;
pub use payload::AlertMessage;
pub use router::{DEFAULT_SINK, Router};
pub use sink::{Sink, SinkReport, SinkWorker};
pub use traits::Notifier;
pub use webhook::WebhookNotifier;

/// Create the notifier for one sink.
pub fn build_notifier(
    kind: NotifierKind,
    name: &str,
    url: &SecretString,
    client: &reqwest::Client,
) -> Arc<dyn Notifier> {
    match kind {
        NotifierKind::Lark => Arc::new(LarkNotifier::new(
            name.to_string(),
            url.clone(),
            client.clone(),
        )),
        NotifierKind::Webhook => Arc::new(WebhookNotifier::new(
            name.to_string(),
            url.clone(),
            client.clone(),
        )),
    }
}
