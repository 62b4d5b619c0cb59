//! Per-container tail session.
//!
//! A [`TailSession`] owns one container's open log stream and its line
//! framer. [`run_tail`] drives a session through its whole life:
//!
//! ```text
//! Starting --open ok--> Streaming --end of stream / read error--> Stopped
//!     |                                                              ^
//!     +------------------- open failed ------------------------------+
//! ```
//!
//! A stopped session is never reopened.

use std::collections::VecDeque;
use std::fmt;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::classify::is_alert;
use crate::config::{ContainerSpec, Tail};
use crate::error::{StreamError, TailError};
use crate::framer::LineFramer;
use crate::notify::{AlertMessage, Sink};
use crate::source::{LogSource, LogStream};

/// Lifecycle of a tail session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Starting,
    Streaming,
    Stopped,
}

impl fmt::Display for TailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailState::Starting => f.write_str("starting"),
            TailState::Streaming => f.write_str("streaming"),
            TailState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Why a session stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailExit {
    /// The engine closed the log stream.
    EndOfStream,
    /// Shutdown was requested.
    Cancelled,
}

/// Open log stream of one container, yielding decoded lines.
pub struct TailSession {
    stream: LogStream,
    framer: LineFramer,
    pending: VecDeque<String>,
    finished: bool,
}

impl TailSession {
    pub fn new(stream: LogStream) -> Self {
        let framer = LineFramer::new(stream.framing);
        Self {
            stream,
            framer,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Open the container's stream through `source`.
    pub async fn open(
        source: &dyn LogSource,
        container_id: &str,
        tail: Tail,
    ) -> Result<Self, StreamError> {
        let stream = source.open(container_id, tail).await?;
        Ok(Self::new(stream))
    }

    /// Next complete line, or `None` at end of stream.
    ///
    /// A final line without a trailing newline is returned before `None`.
    /// After a read error the session yields nothing more.
    pub async fn next_line(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }
            match self.stream.chunks.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.framer.push(&chunk)),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.framer.finish());
                }
            }
        }
    }
}

impl fmt::Debug for TailSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailSession")
            .field("framing", &self.framer.framing())
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

/// Tail one container until its stream ends, fails, or `cancel` fires.
///
/// Every line matching [`is_alert`] is enqueued on `sink` in stream order.
/// `state` follows the session lifecycle and always ends at
/// [`TailState::Stopped`].
pub async fn run_tail(
    spec: ContainerSpec,
    source: &dyn LogSource,
    tail: Tail,
    sink: Sink,
    state: &watch::Sender<TailState>,
    cancel: CancellationToken,
) -> Result<TailExit, TailError> {
    let span = tracing::info_span!(
        "tail",
        container = %spec.container_id,
        server = %spec.server_name
    );

    let result = drive(&spec, source, tail, &sink, state, &cancel)
        .instrument(span.clone())
        .await;

    state.send_replace(TailState::Stopped);
    metrics::gauge!("dockwatch_tail_up", "container" => spec.container_id.clone()).set(0.0);

    span.in_scope(|| match &result {
        Ok(TailExit::EndOfStream) => tracing::warn!("Log stream ended, container no longer tailed"),
        Ok(TailExit::Cancelled) => tracing::debug!("Tail stopped by shutdown"),
        Err(e) => tracing::error!(error = %e, "Tail stopped"),
    });
    result
}

async fn drive(
    spec: &ContainerSpec,
    source: &dyn LogSource,
    tail: Tail,
    sink: &Sink,
    state: &watch::Sender<TailState>,
    cancel: &CancellationToken,
) -> Result<TailExit, TailError> {
    let container = spec.container_id.as_str();
    state.send_replace(TailState::Starting);
    tracing::debug!(tail = %tail.as_param(), "Opening log stream");

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(TailExit::Cancelled),
        opened = TailSession::open(source, container, tail) => opened,
    };
    let mut session = opened.inspect_err(|_| record_stream_error(container))?;

    state.send_replace(TailState::Streaming);
    metrics::gauge!("dockwatch_tail_up", "container" => container.to_string()).set(1.0);
    tracing::info!(sink = sink.name(), "Tailing container logs");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TailExit::Cancelled),
            next = session.next_line() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                record_stream_error(container);
                return Err(e.into());
            }
            None => return Ok(TailExit::EndOfStream),
        };

        metrics::counter!("dockwatch_lines_total", "container" => container.to_string())
            .increment(1);
        if !is_alert(&line) {
            continue;
        }

        metrics::counter!("dockwatch_alerts_matched_total", "container" => container.to_string())
            .increment(1);
        tracing::info!(line = %line, "Alert matched");

        let alert = AlertMessage::new(spec.server_name.clone(), line);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TailExit::Cancelled),
            queued = sink.enqueue(alert) => queued?,
        }
    }
}

fn record_stream_error(container: &str) {
    metrics::counter!("dockwatch_stream_errors_total", "container" => container.to_string())
        .increment(1);
}
