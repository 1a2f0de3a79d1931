use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Span flag: the trace was sampled.
pub const FLAG_SAMPLED: i32 = 1;
/// Span flag: the trace was force-sampled for debugging.
pub const FLAG_DEBUG: i32 = 2;

/// Tag collection keyed by tag name.
///
/// A `BTreeMap` so that iteration (and therefore encoding) follows key order.
pub type Tags = BTreeMap<String, TagValue>;

/// 128-bit trace identifier split into two 64-bit halves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl From<u128> for TraceId {
    fn from(id: u128) -> Self {
        Self {
            high: (id >> 64) as u64,
            low: id as u64,
        }
    }
}

impl From<TraceId> for u128 {
    fn from(id: TraceId) -> Self {
        (u128::from(id.high) << 64) | u128::from(id.low)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

/// Tag value types.
///
/// Every variant reaches the wire as its string rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::String(s) => f.write_str(s),
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::String(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::String(v.to_string())
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

/// The reporting service. One per batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub service_name: String,
    #[serde(default)]
    pub tags: Tags,
}

impl Process {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: Tags::new(),
        }
    }

    /// Adds a process-level tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A timestamped event attached to a span
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// Event time (Unix microseconds)
    pub timestamp: i64,
    #[serde(default)]
    pub fields: Tags,
}

impl Log {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            fields: Tags::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Represents a single distributed tracing span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: u64,
    /// Parent span identifier (0 if root span)
    pub parent_span_id: u64,
    pub operation_name: String,
    pub flags: i32,
    /// Span start time (Unix microseconds)
    pub start_time: i64,
    /// Span duration (microseconds)
    pub duration: i64,
    #[serde(default)]
    pub tags: Tags,
    /// Events in the order they were logged
    #[serde(default)]
    pub logs: Vec<Log>,
}

/// Current wall-clock time in Unix microseconds.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

impl Span {
    /// Creates a sampled span starting now
    pub fn new(
        trace_id: impl Into<TraceId>,
        span_id: u64,
        parent_span_id: u64,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id,
            parent_span_id,
            operation_name: operation_name.into(),
            flags: FLAG_SAMPLED,
            start_time: now_micros(),
            duration: 0,
            tags: Tags::new(),
            logs: Vec::new(),
        }
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a tag to the span
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Appends a log event
    pub fn log(&mut self, log: Log) {
        self.logs.push(log);
    }

    /// Marks the span as completed now
    pub fn finish(&mut self) {
        self.finish_at(now_micros());
    }

    /// Marks the span as completed at `end_time` (Unix microseconds)
    pub fn finish_at(&mut self, end_time: i64) {
        self.duration = end_time.saturating_sub(self.start_time).max(0);
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id == 0
    }
}

/// One transmission unit: the reporting process and its finished spans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub process: Process,
    pub spans: Vec<Span>,
}

impl Batch {
    pub fn new(process: Process) -> Self {
        Self {
            process,
            spans: Vec::new(),
        }
    }

    /// Creates a batch with the given spans
    pub fn with_spans(process: Process, spans: Vec<Span>) -> Self {
        Self { process, spans }
    }

    /// Adds a span to the batch
    pub fn add(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
