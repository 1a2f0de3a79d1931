//! One-way call envelope for the collector agent.
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────┬──────────┬───────────┐
//! │ Version  │ Kind     │ Method name     │ Seq ID   │ Args      │
//! │ int16 BE │ int16 BE │ int32 len + str │ int32 BE │ struct    │
//! └──────────┴──────────┴─────────────────┴──────────┴───────────┘
//! ```

use crate::encoder;
use crate::span::{Batch, Process, Span};
use crate::wire::ThriftWriter;
use bytes::Bytes;

/// Strict binary protocol version 1, upper half of the message header.
pub const VERSION_1: i16 = 0x8001_u16 as i16;

/// Thrift message kind for calls that expect no reply.
pub const MESSAGE_ONEWAY: i16 = 4;

pub const EMIT_BATCH: &str = "emitBatch";

/// No reply is ever read, so every call uses the same sequence id.
pub const EMIT_BATCH_SEQUENCE_ID: i32 = 1;

fn write_header(w: &mut ThriftWriter, method_name: &str, sequence_id: i32) {
    w.i16(VERSION_1);
    w.i16(MESSAGE_ONEWAY);
    w.string(method_name);
    w.i32(sequence_id);
}

/// Wraps an encoded argument struct in a one-way call envelope.
pub fn frame(method_name: &str, sequence_id: i32, payload: &[u8]) -> Bytes {
    let mut w = ThriftWriter::with_capacity(12 + method_name.len() + payload.len());
    write_header(&mut w, method_name, sequence_id);
    w.raw(payload);
    w.into_bytes()
}

/// Encodes and frames a batch as a complete `emitBatch` datagram.
pub fn emit_batch_message(batch: &Batch) -> Bytes {
    emit_batch_message_parts(&batch.process, &batch.spans)
}

/// Same as [`emit_batch_message`], writing header and body into one buffer.
pub fn emit_batch_message_parts(process: &Process, spans: &[Span]) -> Bytes {
    let mut w = ThriftWriter::new();
    write_header(&mut w, EMIT_BATCH, EMIT_BATCH_SEQUENCE_ID);
    encoder::write_batch_args(&mut w, process, spans);
    w.into_bytes()
}

/// Size of the `emitBatch` envelope for an empty, unnamed process.
pub fn min_emit_batch_size() -> usize {
    emit_batch_message(&Batch::default()).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_batch;
    use crate::span::{Tags, TraceId};

    #[rustfmt::skip]
    const GOLDEN: &[u8] = &[
        0x80, 0x01, 0x00, 0x04,                                 // version 1, oneway
        0, 0, 0, 9, b'e', b'm', b'i', b't', b'B', b'a', b't', b'c', b'h',
        0, 0, 0, 1,                                             // seq id
        12, 0, 1,                                               // args.batch
        12, 0, 1,                                               // batch.process
        11, 0, 1, 0, 0, 0, 3, b's', b'v', b'c',                 // serviceName
        0,                                                      // end Process
        15, 0, 2, 12, 0, 0, 0, 1,                               // batch.spans
        10, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1,                       // traceIdLow
        10, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0,                       // traceIdHigh
        10, 0, 3, 0, 0, 0, 0, 0, 0, 0, 1,                       // spanId
        10, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0,                       // parentSpanId
        11, 0, 5, 0, 0, 0, 2, b'o', b'p',                       // operationName
        8, 0, 7, 0, 0, 0, 0,                                    // flags
        10, 0, 8, 0, 0, 0, 0, 0, 0, 0x03, 0xE8,                 // startTime
        10, 0, 9, 0, 0, 0, 0, 0, 0, 0, 50,                      // duration
        0,                                                      // end Span
        0,                                                      // end Batch
        0,                                                      // end args
    ];

    fn golden_batch() -> Batch {
        Batch::with_spans(
            Process::new("svc"),
            vec![Span {
                trace_id: TraceId::new(0, 1),
                span_id: 1,
                parent_span_id: 0,
                operation_name: "op".to_string(),
                flags: 0,
                start_time: 1000,
                duration: 50,
                tags: Tags::new(),
                logs: Vec::new(),
            }],
        )
    }

    #[test]
    fn test_golden_emit_batch() {
        assert_eq!(emit_batch_message(&golden_batch()).as_ref(), GOLDEN);
    }

    #[test]
    fn test_frame_matches_single_buffer_path() {
        let batch = golden_batch();
        let framed = frame(EMIT_BATCH, EMIT_BATCH_SEQUENCE_ID, &encode_batch(&batch));
        assert_eq!(framed, emit_batch_message(&batch));
    }

    #[test]
    fn test_frame_header() {
        let framed = frame("m", 7, &[0xAA]);
        assert_eq!(
            framed.as_ref(),
            &[0x80, 0x01, 0x00, 0x04, 0, 0, 0, 1, b'm', 0, 0, 0, 7, 0xAA]
        );
    }

    #[test]
    fn test_min_emit_batch_size() {
        // header (4) + name (13) + seq (4) + args/batch/process headers (9)
        // + empty serviceName (4) + 3 terminators + span list header (8)
        assert_eq!(min_emit_batch_size(), 45);
    }
}
