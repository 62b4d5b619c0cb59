//! Supervision of the per-container tail tasks.
//!
//! Each configured container runs as an independent Tokio task tracked in a
//! `JoinSet`:
//! - a failed or ended stream stops that container only
//! - panics are caught, logged and counted
//! - nothing is restarted
//!
//! ```text
//! main.rs
//!     |
//!     v
//! Supervisor
//!     +-- spawn --> run_tail(container_1) --> framer --> classify --> Sink
//!     +-- spawn --> run_tail(container_2) --> ...
//!     +-- spawn --> run_tail(container_n) --> ...
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ContainerSpec, Tail};
use crate::error::{ConfigError, TailError};
use crate::notify::Router;
use crate::source::LogSource;
use crate::tail::{TailExit, TailState, run_tail};

type TaskResult = (String, Result<TailExit, TailError>);

/// How the tail tasks ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Streams closed by the engine.
    pub ended: usize,
    /// Sessions stopped by an open or read error.
    pub failed: usize,
    pub panicked: usize,
    /// Sessions stopped by shutdown.
    pub cancelled: usize,
}

/// Owns the running tail tasks.
pub struct Supervisor {
    tasks: JoinSet<TaskResult>,
    names: HashMap<tokio::task::Id, String>,
    states: HashMap<String, Arc<watch::Sender<TailState>>>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Start one tail task per container.
    ///
    /// Every container must have a route; otherwise nothing is started.
    pub fn spawn(
        containers: &[ContainerSpec],
        tail: Tail,
        source: Arc<dyn LogSource>,
        router: &Router,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let mut routed = Vec::with_capacity(containers.len());
        for spec in containers {
            let sink = router
                .route(&spec.container_id)
                .ok_or_else(|| ConfigError::Unroutable {
                    container: spec.container_id.clone(),
                })?;
            routed.push((spec.clone(), sink.clone()));
        }

        let mut supervisor = Supervisor {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            states: HashMap::new(),
            cancel,
        };

        for (spec, sink) in routed {
            let name = spec.container_id.clone();
            let (state, _) = watch::channel(TailState::Starting);
            let state = Arc::new(state);
            supervisor.states.insert(name.clone(), Arc::clone(&state));

            let source = Arc::clone(&source);
            let cancel = supervisor.cancel.clone();
            let task_name = name.clone();
            let handle = supervisor.tasks.spawn(async move {
                let result = run_tail(spec, source.as_ref(), tail, sink, &state, cancel).await;
                (task_name, result)
            });
            supervisor.names.insert(handle.id(), name);
        }

        info!(containers = supervisor.states.len(), "Tail supervisor started");
        Ok(supervisor)
    }

    /// Watch a container's session state.
    pub fn subscribe(&self, container_id: &str) -> Option<watch::Receiver<TailState>> {
        self.states.get(container_id).map(|s| s.subscribe())
    }

    /// Number of tasks not yet joined.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Join tasks as they stop until shutdown is requested.
    ///
    /// When every session has stopped on its own, waits for the
    /// cancellation token before returning.
    pub async fn supervise(mut self) -> SupervisorReport {
        let mut report = SupervisorReport::default();
        let mut announced = false;

        loop {
            if self.tasks.is_empty() {
                if !announced && !self.cancel.is_cancelled() {
                    warn!("All tail sessions have stopped, waiting for shutdown");
                    announced = true;
                }
                self.cancel.cancelled().await;
                break;
            }

            tokio::select! {
                Some(joined) = self.tasks.join_next_with_id() => self.record(joined, &mut report),
                _ = self.cancel.cancelled() => break,
            }
        }

        // Sessions observe the token themselves; collect their exits.
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.record(joined, &mut report);
        }

        info!(
            ended = report.ended,
            failed = report.failed,
            panicked = report.panicked,
            cancelled = report.cancelled,
            "All tail tasks stopped"
        );
        report
    }

    fn record(
        &mut self,
        joined: Result<(tokio::task::Id, TaskResult), tokio::task::JoinError>,
        report: &mut SupervisorReport,
    ) {
        match joined {
            Ok((id, (_, Ok(TailExit::EndOfStream)))) => {
                self.names.remove(&id);
                report.ended += 1;
            }
            Ok((id, (_, Ok(TailExit::Cancelled)))) => {
                self.names.remove(&id);
                report.cancelled += 1;
            }
            Ok((id, (_, Err(_)))) => {
                // Already logged inside the session span.
                self.names.remove(&id);
                report.failed += 1;
            }
            Err(join_error) => {
                let container = self
                    .names
                    .remove(&join_error.id())
                    .unwrap_or_else(|| "unknown".to_string());
                if let Some(state) = self.states.get(&container) {
                    state.send_replace(TailState::Stopped);
                }

                if join_error.is_panic() {
                    error!(
                        container = %container,
                        error = %join_error,
                        "Tail task panicked, container no longer tailed"
                    );
                    metrics::counter!("dockwatch_tail_panics_total", "container" => container)
                        .increment(1);
                    report.panicked += 1;
                } else {
                    tracing::debug!(container = %container, "Tail task aborted");
                    report.cancelled += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("running", &self.tasks.len())
            .field("containers", &self.states.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use crate::error::{NotifyError, StreamError};
    use crate::framer::Framing;
    use crate::notify::{AlertMessage, Notifier};
    use crate::source::LogStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned lines per container; unknown ids are not found and
    /// "boom" panics on open.
    struct ScriptedSource {
        logs: HashMap<String, &'static str>,
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn open(&self, container_id: &str, _tail: Tail) -> Result<LogStream, StreamError> {
            if container_id == "boom" {
                panic!("engine client crashed");
            }
            let body = self
                .logs
                .get(container_id)
                .ok_or_else(|| StreamError::NotFound(container_id.to_string()))?;
            Ok(LogStream {
                framing: Framing::Raw,
                chunks: stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))]).boxed(),
            })
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<AlertMessage>>);

    #[async_trait]
    impl Notifier for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn notifier_type(&self) -> &str {
            "collect"
        }

        async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn spec(id: &str) -> ContainerSpec {
        ContainerSpec {
            container_id: id.to_string(),
            server_name: format!("{}-prod", id),
            hook_url: None,
        }
    }

    fn router_for(
        containers: &[ContainerSpec],
        notifier: Arc<Collect>,
    ) -> (Router, Vec<crate::notify::SinkWorker>) {
        let default = SecretString::new("https://hooks.example.com/default".to_string());
        Router::build(containers, Some(&default), 16, |_, _| {
            notifier.clone() as Arc<dyn Notifier>
        })
        .unwrap()
    }

    async fn wait_stopped(supervisor: &Supervisor, id: &str) {
        let mut rx = supervisor.subscribe(id).unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s == TailState::Stopped),
        )
        .await
        .expect("session should stop")
        .unwrap();
    }

    #[tokio::test]
    async fn failing_container_does_not_stop_others() {
        let containers = vec![spec("a"), spec("b")];
        let notifier = Arc::new(Collect::default());
        let (router, workers) = router_for(&containers, notifier.clone());
        let source = Arc::new(ScriptedSource {
            logs: HashMap::from([("a".to_string(), "ok\nERROR: disk full\nfine\n")]),
        });
        let cancel = CancellationToken::new();

        let supervisor =
            Supervisor::spawn(&containers, Tail::All, source, &router, cancel.clone()).unwrap();
        wait_stopped(&supervisor, "a").await;
        wait_stopped(&supervisor, "b").await;

        let handle = tokio::spawn(supervisor.supervise());
        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.ended, 1);
        assert_eq!(report.failed, 1);

        drop(router);
        for worker in workers {
            worker.run(CancellationToken::new(), Duration::ZERO).await;
        }
        let received = notifier.0.lock().unwrap().clone();
        assert_eq!(received, vec![AlertMessage::new("a-prod", "ERROR: disk full")]);
    }

    #[tokio::test]
    async fn panicking_task_is_counted_and_marked_stopped() {
        let containers = vec![spec("a"), spec("boom")];
        let (router, _workers) = router_for(&containers, Arc::new(Collect::default()));
        let source = Arc::new(ScriptedSource {
            logs: HashMap::from([("a".to_string(), "ready\n")]),
        });
        let cancel = CancellationToken::new();

        let supervisor =
            Supervisor::spawn(&containers, Tail::All, source, &router, cancel.clone()).unwrap();
        let mut boom = supervisor.subscribe("boom").unwrap();
        let handle = tokio::spawn(supervisor.supervise());

        tokio::time::timeout(
            Duration::from_secs(5),
            boom.wait_for(|s| *s == TailState::Stopped),
        )
        .await
        .expect("panicked session should be marked stopped")
        .unwrap();

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.panicked, 1);
        assert_eq!(report.ended, 1);
    }

    #[tokio::test]
    async fn unroutable_container_starts_nothing() {
        let routed = vec![spec("a")];
        let (router, _workers) = router_for(&routed, Arc::new(Collect::default()));
        let source = Arc::new(ScriptedSource {
            logs: HashMap::new(),
        });

        let result = Supervisor::spawn(
            &[spec("a"), spec("stray")],
            Tail::All,
            source,
            &router,
            CancellationToken::new(),
        );

        match result {
            Err(ConfigError::Unroutable { container }) => assert_eq!(container, "stray"),
            other => panic!("Expected Unroutable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancel_stops_streaming_sessions() {
        struct Endless;

        #[async_trait]
        impl LogSource for Endless {
            async fn open(&self, _: &str, _: Tail) -> Result<LogStream, StreamError> {
                Ok(LogStream {
                    framing: Framing::Raw,
                    chunks: stream::pending().boxed(),
                })
            }
        }

        let containers = vec![spec("a"), spec("b")];
        let (router, _workers) = router_for(&containers, Arc::new(Collect::default()));
        let cancel = CancellationToken::new();
        let supervisor =
            Supervisor::spawn(&containers, Tail::Lines(0), Arc::new(Endless), &router, cancel.clone())
                .unwrap();

        let mut a = supervisor.subscribe("a").unwrap();
        a.wait_for(|s| *s == TailState::Streaming).await.unwrap();
        assert_eq!(supervisor.running(), 2);

        let handle = tokio::spawn(supervisor.supervise());
        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor should return after cancel")
            .unwrap();
        assert_eq!(report.cancelled, 2);
        assert_eq!(*a.borrow(), TailState::Stopped);
    }
}
