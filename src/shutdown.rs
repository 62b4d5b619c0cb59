//! Signal handling and the bounded drain of sink workers.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::notify::{SinkReport, SinkWorker};

/// Wait for SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}

/// Cancel `cancel` once a termination signal arrives.
pub fn cancel_on_signal(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(cancel_on(wait_for_signal(), cancel))
}

/// Cancel `cancel` when `signal` resolves. If the signal cannot be listened
/// for, the agent keeps running and only an external cancel ends the task.
async fn cancel_on<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    tokio::select! {
        received = signal => match received {
            Ok(name) => {
                info!(signal = name, "Received shutdown signal, initiating graceful shutdown");
                cancel.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signals, continuing without them");
                cancel.cancelled().await;
            }
        },
        _ = cancel.cancelled() => {}
    }
}

/// Running sink workers, drained together on shutdown.
#[derive(Debug)]
pub struct SinkDrain {
    workers: JoinSet<(String, SinkReport)>,
}

impl SinkDrain {
    /// Spawn one task per worker. Each worker stops delivering once
    /// `cancel` fires and `drain_timeout` has elapsed.
    pub fn spawn(
        workers: Vec<SinkWorker>,
        cancel: &CancellationToken,
        drain_timeout: Duration,
    ) -> Self {
        let mut set = JoinSet::new();
        for worker in workers {
            let cancel = cancel.clone();
            set.spawn(async move {
                let name = worker.name().to_string();
                let report = worker.run(cancel, drain_timeout).await;
                (name, report)
            });
        }
        Self { workers: set }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker and sum their reports.
    pub async fn wait(mut self) -> SinkReport {
        let mut total = SinkReport::default();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok((name, report)) => {
                    info!(
                        sink = %name,
                        sent = report.sent,
                        failed = report.failed,
                        dropped = report.dropped,
                        "Sink worker finished"
                    );
                    total.sent += report.sent;
                    total.failed += report.failed;
                    total.dropped += report.dropped;
                }
                Err(e) => error!(error = %e, "Sink worker task failed"),
            }
        }

        if total.dropped > 0 {
            warn!(dropped = total.dropped, "Alerts dropped at shutdown");
        }
        total
    }
}
