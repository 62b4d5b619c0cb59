//! Notifier trait definition.

use async_trait::async_trait;

use super::AlertMessage;
use crate::error::NotifyError;

/// Delivery of a single alert to one endpoint.
///
/// Implementations make exactly one attempt per call. Queuing and error
/// accounting are done by the sink consumer that owns the notifier.
///
/// # Example
///
/// ```ignore
/// use dockwatch::notify::{AlertMessage, Notifier};
///
/// struct StdoutNotifier { name: String }
///
/// #[async_trait]
/// impl Notifier for StdoutNotifier {
///     fn name(&self) -> &str { &self.name }
///     fn notifier_type(&self) -> &str { "stdout" }
///     async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
///         println!("{}", alert.text()?);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Name of the sink this notifier delivers for (e.g. "default").
    fn name(&self) -> &str;

    /// Type of the notifier ("lark", "webhook").
    fn notifier_type(&self) -> &str;

    /// Send one alert.
    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError>;
}

impl std::fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name())
            .field("type", &self.notifier_type())
            .finish()
    }
}
