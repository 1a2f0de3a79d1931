//! Batch encoding for the collector's `emitBatch` call.
//!
//! Produces the call's argument struct: field 1 holds the `Batch`, which in
//! turn holds the `Process` (field 1) and the span list (field 2).
//!
//! Layout rules:
//! - every struct, at any depth, ends with exactly one `STOP` byte
//! - tag and log lists are omitted entirely when empty
//! - the span list is always written, even with zero spans
//! - tags are written in key order

use crate::span::{Batch, Log, Process, Span, Tags};
use crate::wire::{list_count, ttype, ThriftWriter};
use bytes::Bytes;

/// Field ids of the collector schema, per struct.
pub mod field {
    pub mod args {
        pub const BATCH: i16 = 1;
    }

    pub mod batch {
        pub const PROCESS: i16 = 1;
        pub const SPANS: i16 = 2;
    }

    pub mod process {
        pub const SERVICE_NAME: i16 = 1;
        pub const TAGS: i16 = 2;
    }

    pub mod tag {
        pub const KEY: i16 = 1;
        pub const V_TYPE: i16 = 2;
        pub const V_STR: i16 = 3;
    }

    pub mod span {
        pub const TRACE_ID_LOW: i16 = 1;
        pub const TRACE_ID_HIGH: i16 = 2;
        pub const SPAN_ID: i16 = 3;
        pub const PARENT_SPAN_ID: i16 = 4;
        pub const OPERATION_NAME: i16 = 5;
        // 6 is `references`, never written
        pub const FLAGS: i16 = 7;
        pub const START_TIME: i16 = 8;
        pub const DURATION: i16 = 9;
        pub const TAGS: i16 = 10;
        pub const LOGS: i16 = 11;
    }

    pub mod log {
        pub const TIMESTAMP: i16 = 1;
        pub const FIELDS: i16 = 2;
    }
}

/// `TagType.STRING`; every tag value is sent as a string.
pub const TAG_TYPE_STRING: i32 = 0;

/// The high half of the trace id is not transmitted; the collector sees 0.
const TRACE_ID_HIGH: i64 = 0;

/// Encodes a batch as the `emitBatch` argument struct.
pub fn encode_batch(batch: &Batch) -> Bytes {
    encode_batch_parts(&batch.process, &batch.spans)
}

/// Same as [`encode_batch`] for a process and span slice held separately.
pub fn encode_batch_parts(process: &Process, spans: &[Span]) -> Bytes {
    let mut w = ThriftWriter::with_capacity(estimate_size(process, spans));
    write_batch_args(&mut w, process, spans);
    w.into_bytes()
}

/// Writes the argument struct into an existing writer.
pub fn write_batch_args(w: &mut ThriftWriter, process: &Process, spans: &[Span]) {
    w.field_header(ttype::STRUCT, field::args::BATCH);

    w.field_header(ttype::STRUCT, field::batch::PROCESS);
    write_process(w, process);

    let count = list_count(spans.len());
    w.field_header(ttype::LIST, field::batch::SPANS);
    w.list_header(ttype::STRUCT, count);
    for span in spans.iter().take(count as usize) {
        write_span(w, span);
    }
    // Batch
    w.struct_end();
    // args
    w.struct_end();
}

fn write_process(w: &mut ThriftWriter, process: &Process) {
    w.field_string(field::process::SERVICE_NAME, &process.service_name);
    write_tag_list(w, field::process::TAGS, &process.tags);
    w.struct_end();
}

fn write_span(w: &mut ThriftWriter, span: &Span) {
    use field::span as f;

    w.field_i64(f::TRACE_ID_LOW, span.trace_id.low as i64);
    w.field_i64(f::TRACE_ID_HIGH, TRACE_ID_HIGH);
    w.field_i64(f::SPAN_ID, span.span_id as i64);
    w.field_i64(f::PARENT_SPAN_ID, span.parent_span_id as i64);
    w.field_string(f::OPERATION_NAME, &span.operation_name);
    w.field_i32(f::FLAGS, span.flags);
    w.field_i64(f::START_TIME, span.start_time);
    w.field_i64(f::DURATION, span.duration);
    write_tag_list(w, f::TAGS, &span.tags);

    if !span.logs.is_empty() {
        let count = list_count(span.logs.len());
        w.field_header(ttype::LIST, f::LOGS);
        w.list_header(ttype::STRUCT, count);
        for log in span.logs.iter().take(count as usize) {
            write_log(w, log);
        }
    }
    w.struct_end();
}

fn write_log(w: &mut ThriftWriter, log: &Log) {
    w.field_i64(field::log::TIMESTAMP, log.timestamp);
    write_tag_list(w, field::log::FIELDS, &log.fields);
    w.struct_end();
}

fn write_tag_list(w: &mut ThriftWriter, field_id: i16, tags: &Tags) {
    if tags.is_empty() {
        return;
    }
    let count = list_count(tags.len());
    w.field_header(ttype::LIST, field_id);
    w.list_header(ttype::STRUCT, count);
    for (key, value) in tags.iter().take(count as usize) {
        w.field_string(field::tag::KEY, key);
        w.field_i32(field::tag::V_TYPE, TAG_TYPE_STRING);
        w.field_string(field::tag::V_STR, &value.to_string());
        w.struct_end();
    }
}

/// Rough pre-allocation hint; exactness is not required.
fn estimate_size(process: &Process, spans: &[Span]) -> usize {
    const FIXED_SPAN: usize = 80;
    const PER_TAG: usize = 32;
    let span_bytes: usize = spans
        .iter()
        .map(|s| FIXED_SPAN + s.operation_name.len() + (s.tags.len() + s.logs.len()) * PER_TAG)
        .sum();
    32 + process.service_name.len() + process.tags.len() * PER_TAG + span_bytes
}
