//! Span Reporter
//!
//! Ships finished distributed-tracing spans to a collector agent. Batches are
//! encoded with the Thrift binary protocol as one-way `emitBatch` calls and
//! sent as UDP datagrams, best effort: nothing is acknowledged or retried.
//!
//! ```text
//! Span ─▶ BatchProcessor ─▶ encoder + framer ─▶ DeliveryQueue ─▶ Transport ─▶ agent
//! ```
//!
//! Datagrams produced before the socket is connected wait in the
//! [`DeliveryQueue`] and are flushed in submission order once it is.

pub mod batch_processor;
pub mod config;
pub mod delivery_queue;
pub mod encoder;
pub mod error;
pub mod framer;
pub mod reporter;
pub mod span;
pub mod transport;
pub mod wire;

// Re-export main types
pub use batch_processor::{BatchConfig, BatchMetrics, BatchProcessor};
pub use config::{Protocol, ReporterConfig};
pub use delivery_queue::{ConnectionState, DeliveryMetrics, DeliveryQueue};
pub use encoder::{encode_batch, encode_batch_parts};
pub use error::{ConnectionError, ReporterError, SubmitError, TransportError};
pub use framer::{emit_batch_message, emit_batch_message_parts, frame};
pub use reporter::{ReporterMetrics, SpanReporter};
pub use span::{Batch, Log, Process, Span, TagValue, Tags, TraceId};
pub use transport::{Transport, TransportMetrics, UdpTransport};
