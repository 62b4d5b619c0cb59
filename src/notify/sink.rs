//! Per-destination alert queue and its consumer.
//!
//! Every notification endpoint gets one bounded `mpsc` queue. Tail sessions
//! hold cloned [`Sink`] handles and enqueue into it; a single [`SinkWorker`]
//! dequeues in FIFO order and hands each alert to its notifier. A full queue
//! makes [`Sink::enqueue`] wait, so alerts are never dropped while the
//! process runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{AlertMessage, Notifier};
use crate::error::QueueError;

/// Producer handle of a sink queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Sink {
    name: Arc<str>,
    tx: mpsc::Sender<AlertMessage>,
}

impl Sink {
    /// Create a sink queue and the worker that consumes it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; configuration validation rejects that.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        notifier: Arc<dyn Notifier>,
    ) -> (Sink, SinkWorker) {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Sink {
            name: Arc::clone(&name),
            tx,
        };
        let worker = SinkWorker { name, rx, notifier };
        (sink, worker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an alert, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] once the worker has stopped accepting alerts.
    pub async fn enqueue(&self, alert: AlertMessage) -> Result<(), QueueError> {
        self.tx.send(alert).await.map_err(|_| QueueError::Closed)?;
        self.record_size();
        Ok(())
    }

    /// Queue an alert without waiting.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the queue is at capacity,
    /// [`QueueError::Closed`] once the worker has stopped accepting alerts.
    pub fn try_enqueue(&self, alert: AlertMessage) -> Result<(), QueueError> {
        self.tx.try_send(alert).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        self.record_size();
        Ok(())
    }

    /// Number of alerts waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_size(&self) {
        record_size(&self.name, self.len());
    }
}

/// Delivery counts of one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub sent: u64,
    pub failed: u64,
    /// Alerts still queued, or cut mid-delivery, when the drain deadline
    /// passed.
    pub dropped: u64,
}

/// Single consumer of a sink queue.
pub struct SinkWorker {
    name: Arc<str>,
    rx: mpsc::Receiver<AlertMessage>,
    notifier: Arc<dyn Notifier>,
}

impl SinkWorker {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver alerts until cancelled or until every producer is gone.
    ///
    /// After cancellation the queue is closed to producers. The delivery in
    /// flight and whatever is still queued get at most `drain_timeout` in
    /// total; an alert cut mid-delivery counts as dropped along with the
    /// rest of the queue.
    pub async fn run(self, cancel: CancellationToken, drain_timeout: Duration) -> SinkReport {
        let SinkWorker {
            name,
            mut rx,
            notifier,
        } = self;
        let span = tracing::info_span!("sink", sink = %name);

        async move {
            let mut report = SinkReport::default();
            let mut cut = 0u64;
            let mut deadline = None;
            tracing::debug!(notifier_type = notifier.notifier_type(), "Sink worker started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(alert) => {
                            record_size(&name, rx.len());
                            let delivery = deliver(&name, notifier.as_ref(), &alert, &mut report);
                            tokio::pin!(delivery);
                            tokio::select! {
                                biased;
                                _ = &mut delivery => {}
                                _ = cancel.cancelled() => {
                                    let until = Instant::now() + drain_timeout;
                                    deadline = Some(until);
                                    if tokio::time::timeout_at(until, delivery).await.is_err() {
                                        tracing::warn!(
                                            server = %alert.server,
                                            "Drain timeout reached mid-delivery"
                                        );
                                        cut = 1;
                                    }
                                    break;
                                }
                            }
                        }
                        None => {
                            tracing::debug!("All producers gone, sink worker stopping");
                            return report;
                        }
                    },
                }
            }

            rx.close();
            let pending = rx.len();
            if pending > 0 && cut == 0 && !drain_timeout.is_zero() {
                tracing::info!(
                    pending,
                    drain_timeout = ?drain_timeout,
                    "Draining queued alerts before exit"
                );
                let until = deadline.unwrap_or_else(|| Instant::now() + drain_timeout);
                let mut in_flight = false;
                let drain = async {
                    while let Some(alert) = rx.recv().await {
                        in_flight = true;
                        deliver(&name, notifier.as_ref(), &alert, &mut report).await;
                        in_flight = false;
                    }
                };
                if tokio::time::timeout_at(until, drain).await.is_err() {
                    tracing::warn!("Drain timeout reached");
                    if in_flight {
                        cut = 1;
                    }
                }
            }

            let dropped = rx.len() as u64 + cut;
            if dropped > 0 {
                tracing::warn!(dropped, "Dropping queued alerts on shutdown");
                metrics::counter!("dockwatch_alerts_dropped_total", "sink" => name.to_string())
                    .increment(dropped);
                report.dropped = dropped;
            }
            record_size(&name, 0);

            tracing::debug!(
                sent = report.sent,
                failed = report.failed,
                dropped = report.dropped,
                "Sink worker stopped"
            );
            report
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for SinkWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkWorker")
            .field("name", &self.name)
            .field("notifier", &self.notifier)
            .finish()
    }
}

async fn deliver(
    name: &str,
    notifier: &dyn Notifier,
    alert: &AlertMessage,
    report: &mut SinkReport,
) {
    match notifier.send(alert).await {
        Ok(()) => {
            report.sent += 1;
            metrics::counter!("dockwatch_alerts_sent_total", "sink" => name.to_string())
                .increment(1);
            tracing::debug!(server = %alert.server, "Alert delivered");
        }
        Err(e) => {
            report.failed += 1;
            metrics::counter!("dockwatch_notify_errors_total", "sink" => name.to_string())
                .increment(1);
            tracing::error!(
                server = %alert.server,
                notifier_type = notifier.notifier_type(),
                error = %e,
                "Failed to deliver alert"
            );
        }
    }
}

fn record_size(name: &str, size: usize) {
    metrics::gauge!("dockwatch_queue_size", "sink" => name.to_string()).set(size as f64);
}
