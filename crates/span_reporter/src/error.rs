//! Error types for span reporting.
//!
//! Nothing here is allowed to reach the instrumented application as a panic;
//! the worst outcome of any failure is an undelivered batch.

use thiserror::Error;

/// Errors surfaced while establishing the connection to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Host name lookup failed
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },
    /// Lookup succeeded but yielded no address
    #[error("no address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    /// Socket bind or connect failed
    #[error("socket error: {0}")]
    Io(String),
    /// A connection attempt is already in progress or complete
    #[error("already connecting or connected")]
    AlreadyConnected,
    /// No connection was ever established
    #[error("not connected")]
    NotConnected,
}

/// Errors of a single datagram send. Logged and counted by the transport,
/// never returned to callers of `enqueue`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("datagram of {size} bytes exceeds the {max} byte limit")]
    PacketTooLarge { size: usize, max: usize },
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned when a span is submitted to a stopped reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("reporter is shut down")]
    Closed,
}

/// Errors of the reporter lifecycle.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
    /// Queued datagrams did not leave the process before the deadline
    #[error("timed out waiting for queued datagrams to drain")]
    DrainTimeout,
    #[error("background task failed: {0}")]
    Join(String),
}
