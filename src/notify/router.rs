//! Container to sink routing, resolved once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ContainerSpec, SecretString};
use crate::error::ConfigError;

use super::{Notifier, Sink, SinkWorker};

/// Name of the sink built from the global `hook_url`.
pub const DEFAULT_SINK: &str = "default";

/// Maps each container to the sink that receives its alerts.
///
/// Sinks are deduplicated by resolved URL: containers naming the same URL,
/// or an override equal to the default, share one queue and one worker.
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<String, Sink>,
    sinks: Vec<Sink>,
}

impl Router {
    /// Build every sink the containers need and return the workers that
    /// consume them.
    ///
    /// `make_notifier` is called once per distinct URL with the sink name.
    /// The default sink is only created when some container uses it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Unroutable`] for the first container with neither an
    /// override nor a default. No sink is created in that case.
    pub fn build<F>(
        containers: &[ContainerSpec],
        default_hook: Option<&SecretString>,
        capacity: usize,
        mut make_notifier: F,
    ) -> Result<(Router, Vec<SinkWorker>), ConfigError>
    where
        F: FnMut(&str, &SecretString) -> Arc<dyn Notifier>,
    {
        // Resolve every route before creating anything.
        let mut plan = Vec::with_capacity(containers.len());
        for container in containers {
            let (url, owner) = match (&container.hook_url, default_hook) {
                (Some(url), _) => (url, container.container_id.as_str()),
                (None, Some(url)) => (url, DEFAULT_SINK),
                (None, None) => {
                    return Err(ConfigError::Unroutable {
                        container: container.container_id.clone(),
                    });
                }
            };
            let owner = if Some(url) == default_hook {
                DEFAULT_SINK
            } else {
                owner
            };
            plan.push((container, url, owner));
        }

        let mut router = Router::default();
        let mut workers = Vec::new();
        let mut by_url: HashMap<&str, Sink> = HashMap::new();

        for (container, url, owner) in plan {
            let sink = match by_url.get(url.expose()) {
                Some(sink) => sink.clone(),
                None => {
                    let notifier = make_notifier(owner, url);
                    let (sink, worker) = Sink::new(owner, capacity, notifier);
                    tracing::debug!(sink = owner, "Created sink");
                    by_url.insert(url.expose(), sink.clone());
                    router.sinks.push(sink.clone());
                    workers.push(worker);
                    sink
                }
            };
            tracing::debug!(
                container = %container.container_id,
                sink = sink.name(),
                "Routed container"
            );
            router.routes.insert(container.container_id.clone(), sink);
        }

        Ok((router, workers))
    }

    /// Sink for a container id.
    pub fn route(&self, container_id: &str) -> Option<&Sink> {
        self.routes.get(container_id)
    }

    /// Every distinct sink, in creation order.
    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
