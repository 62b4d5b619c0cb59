//! Prometheus metrics exposition.
//!
//! When `metrics.enabled` is set, the exporter serves every `dockwatch_*`
//! series on `0.0.0.0:<port>/metrics`. Without it the `metrics` macros used
//! across the crate are no-ops.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

static RECORDER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Register HELP text for every series.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        "dockwatch_lines_total",
        "Log lines read from a container stream"
    );
    describe_counter!(
        "dockwatch_alerts_matched_total",
        "Log lines classified as alerts"
    );
    describe_counter!(
        "dockwatch_alerts_sent_total",
        "Alerts delivered to a sink endpoint"
    );
    describe_counter!(
        "dockwatch_notify_errors_total",
        "Alert deliveries that failed or were rejected"
    );
    describe_counter!(
        "dockwatch_alerts_dropped_total",
        "Alerts still queued when the shutdown drain ended"
    );
    describe_counter!(
        "dockwatch_stream_errors_total",
        "Container log streams that failed to open or broke while reading"
    );
    describe_counter!(
        "dockwatch_tail_panics_total",
        "Tail tasks that panicked"
    );

    describe_gauge!(
        "dockwatch_queue_size",
        "Alerts waiting in a sink queue"
    );
    describe_gauge!(
        "dockwatch_tail_up",
        "Container log stream status (1=streaming, 0=stopped)"
    );
    describe_gauge!(
        "dockwatch_build_info",
        "Build information with version label (always 1)"
    );
}

/// Prometheus exporter bound to a port.
pub struct MetricsServer {
    port: u16,
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Like [`MetricsServer::new`], signalling `ready_tx` once the recorder
    /// is installed. Series recorded before that point are lost.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Install the global recorder and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot bind or a recorder is already installed.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        let _ = RECORDER_INSTALLED.set(());
        register_metric_descriptions();

        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");
        cancel.cancelled().await;
        info!("Metrics server shutting down");

        Ok(())
    }
}

pub fn is_recorder_installed() -> bool {
    RECORDER_INSTALLED.get().is_some()
}

/// Publish every series at zero so dashboards see them before the first
/// event.
pub fn initialize_metrics(containers: &[&str], sinks: &[&str]) {
    use metrics::{counter, gauge};

    gauge!("dockwatch_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    for container in containers {
        let container = container.to_string();
        gauge!("dockwatch_tail_up", "container" => container.clone()).set(0.0);
        counter!("dockwatch_lines_total", "container" => container.clone()).absolute(0);
        counter!("dockwatch_alerts_matched_total", "container" => container.clone()).absolute(0);
        counter!("dockwatch_stream_errors_total", "container" => container.clone()).absolute(0);
        counter!("dockwatch_tail_panics_total", "container" => container).absolute(0);
    }

    for sink in sinks {
        let sink = sink.to_string();
        gauge!("dockwatch_queue_size", "sink" => sink.clone()).set(0.0);
        counter!("dockwatch_alerts_sent_total", "sink" => sink.clone()).absolute(0);
        counter!("dockwatch_notify_errors_total", "sink" => sink.clone()).absolute(0);
        counter!("dockwatch_alerts_dropped_total", "sink" => sink).absolute(0);
    }

    tracing::info!(
        container_count = containers.len(),
        sink_count = sinks.len(),
        "Metrics initialized to zero"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    static TEST_PORT: OnceLock<u16> = OnceLock::new();

    fn get_test_port() -> u16 {
        *TEST_PORT.get_or_init(|| {
            let port = portpicker::pick_unused_port().expect("No free port");
            let server = MetricsServer::new(port);

            std::thread::spawn(move || {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let _ = server.run(CancellationToken::new()).await;
                });
            });

            std::thread::sleep(Duration::from_millis(500));
            port
        })
    }

    async fn scrape(port: u16) -> String {
        reqwest::Client::new()
            .get(format!("http://127.0.0.1:{}/metrics", port))
            .send()
            .await
            .expect("Request should succeed")
            .text()
            .await
            .expect("Should have body")
    }

    #[tokio::test]
    async fn metrics_server_serves_prometheus_text() {
        let port = get_test_port();
        metrics::counter!("dockwatch_alerts_sent_total", "sink" => "format-check").increment(1);

        let body = scrape(port).await;
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let first = line.chars().next().unwrap_or(' ');
            assert!(
                first == '#' || first.is_alphabetic() || first == '_',
                "Invalid Prometheus line: {}",
                line
            );
        }
    }

    #[tokio::test]
    async fn initialized_series_are_exported() {
        let port = get_test_port();
        assert!(is_recorder_installed());

        initialize_metrics(&["3f2a9c1d7e4b"], &["default"]);
        metrics::counter!("dockwatch_lines_total", "container" => "3f2a9c1d7e4b").increment(7);

        let body = scrape(port).await;
        assert!(body.contains("dockwatch_build_info"), "Body: {}", body);
        assert!(body.contains("dockwatch_tail_up"), "Body: {}", body);
        assert!(
            body.contains(r#"dockwatch_lines_total{container="3f2a9c1d7e4b"} 7"#),
            "Body: {}",
            body
        );
        assert!(body.contains(r#"sink="default""#), "Body: {}", body);
    }

    #[test]
    fn new_keeps_port() {
        assert_eq!(MetricsServer::new(9090).port(), 9090);
        assert_eq!(MetricsServer::new(0).port(), 0);
    }
}
