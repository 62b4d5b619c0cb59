//! dockwatch - Tail Docker container logs and forward error lines to chat
//! webhooks.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod framer;
pub mod metrics;
pub mod notify;
pub mod shutdown;
pub mod source;
pub mod stream_buffer;
pub mod supervisor;
pub mod tail;

pub use classify::is_alert;
pub use cli::LogFormat;
pub use framer::{Framing, LineFramer};
pub use metrics::{MetricsServer, register_metric_descriptions};
pub use notify::{AlertMessage, Notifier, Router, Sink, SinkReport, SinkWorker};
pub use shutdown::SinkDrain;
pub use source::{LogSource, LogStream};
pub use stream_buffer::StreamBuffer;
pub use supervisor::{Supervisor, SupervisorReport};
pub use tail::{TailExit, TailSession, TailState, run_tail};
