//! dockwatch - Tail Docker container logs and forward error lines to chat
//! webhooks.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dockwatch::cli::{Cli, LogFormat};
use dockwatch::config::{Config, RuntimeConfig};
use dockwatch::error::ConfigError;
use dockwatch::notify::{Router, build_notifier};
use dockwatch::shutdown::{SinkDrain, cancel_on_signal};
use dockwatch::{MetricsServer, Supervisor, metrics, source};

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn report_config_errors(errors: &[ConfigError]) {
    for e in errors {
        error!(error = %e, "Configuration validation error");
    }
    error!(error_count = errors.len(), "Configuration validation failed");
}

fn print_summary(cli: &Cli, runtime: &RuntimeConfig) {
    let overrides = runtime
        .containers
        .iter()
        .filter(|c| c.hook_url.is_some())
        .count();

    println!("Configuration is valid: {}", cli.config.display());
    println!("  Docker host: {}", runtime.docker.endpoint);
    match runtime.docker.api_version {
        Some(version) => println!("  API version: {}", version),
        None => println!("  API version: negotiated"),
    }
    println!(
        "  Containers: {} ({} with their own hook_url)",
        runtime.containers.len(),
        overrides
    );
    for container in &runtime.containers {
        let sink = if container.hook_url.is_some() {
            "override"
        } else {
            "default"
        };
        println!(
            "    - {} ({}) -> {}",
            container.container_id, container.server_name, sink
        );
    }
    println!(
        "  Default hook: {}",
        if runtime.default_hook.is_some() {
            "configured"
        } else {
            "none"
        }
    );
    println!("  Notifier: {}", runtime.notifier);
    println!("  Tail: {}", runtime.tail.as_param());
    println!(
        "  Metrics: {} (port {})",
        if runtime.metrics.enabled {
            "enabled"
        } else {
            "disabled"
        },
        runtime.metrics.port
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(errors) = config.validate() {
        report_config_errors(&errors);
        std::process::exit(1);
    }

    let runtime_config = match config.compile() {
        Ok(rc) => rc,
        Err(errors) => {
            report_config_errors(&errors);
            std::process::exit(1);
        }
    };

    if cli.validate {
        print_summary(&cli, &runtime_config);
        return Ok(());
    }

    info!(
        containers = runtime_config.containers.len(),
        version = env!("CARGO_PKG_VERSION"),
        "dockwatch starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(runtime_config))
}

async fn run(rc: RuntimeConfig) -> Result<()> {
    let cancel = CancellationToken::new();

    let metrics_handle = if rc.metrics.enabled {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let server = MetricsServer::with_ready_signal(rc.metrics.port, ready_tx);
        let cancel_metrics = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
        if ready_rx.await.is_err() {
            warn!("Metrics server did not start, continuing without metrics");
        }
        Some(handle)
    } else {
        info!("Metrics server disabled");
        None
    };

    let http_client = reqwest::Client::builder()
        .timeout(rc.notify_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let (router, workers) = Router::build(
        &rc.containers,
        rc.default_hook.as_ref(),
        rc.queue_capacity,
        |name, url| build_notifier(rc.notifier, name, url, &http_client),
    )?;

    if metrics::is_recorder_installed() {
        let containers: Vec<&str> = rc
            .containers
            .iter()
            .map(|c| c.container_id.as_str())
            .collect();
        let sinks: Vec<&str> = router.sinks().iter().map(|s| s.name()).collect();
        metrics::initialize_metrics(&containers, &sinks);
    }

    let drain = SinkDrain::spawn(workers, &cancel, rc.shutdown.drain_timeout);
    info!(sinks = drain.len(), notifier = %rc.notifier, "Sink workers started");

    let signal_handle = cancel_on_signal(cancel.clone());

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = source::connect(&rc.docker) => Some(res),
    };
    let source = match connected {
        Some(Ok(source)) => source,
        Some(Err(e)) => {
            error!(error = %e, endpoint = %rc.docker.endpoint, "Failed to connect to container engine");
            cancel.cancel();
            drain.wait().await;
            return Err(anyhow::Error::new(e).context("failed to connect to container engine"));
        }
        None => {
            drain.wait().await;
            info!("dockwatch shutdown complete");
            return Ok(());
        }
    };

    let supervisor = Supervisor::spawn(&rc.containers, rc.tail, source, &router, cancel.clone())?;
    drop(router);

    let report = supervisor.supervise().await;
    if report.panicked > 0 {
        warn!(panicked = report.panicked, "Some tail tasks panicked");
    }

    info!("Waiting for sink workers to drain queued alerts");
    drain.wait().await;

    let _ = signal_handle.await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    info!("dockwatch shutdown complete");
    Ok(())
}
