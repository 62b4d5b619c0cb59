//! Centralized error types for dockwatch using thiserror.
//!
//! Only [`ConfigError`] is fatal. Everything else is reported through
//! tracing by the task that hit it and the rest of the process keeps going.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("container '{container}' has no hook_url and no default hook_url is configured")]
    Unroutable { container: String },
    #[error("invalid hook url for '{owner}': {message}")]
    InvalidHookUrl { owner: String, message: String },
}

/// Errors raised while opening or reading a container log stream.
///
/// Any of these ends the affected container's tail session.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("container '{0}' not found")]
    NotFound(String),
    #[error("container '{container}' unavailable: {message}")]
    Unavailable { container: String, message: String },
    #[error("failed to open log stream: {0}")]
    Open(String),
    #[error("log stream read failed: {0}")]
    Read(String),
}

/// Errors related to delivering one alert to a notification endpoint.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    #[error("endpoint rejected message: {0}")]
    Rejected(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Errors related to sink queue operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("sink queue closed")]
    Closed,
    #[error("sink queue full")]
    Full,
}

/// Reasons a container tail task stopped.
#[derive(Error, Debug)]
pub enum TailError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
