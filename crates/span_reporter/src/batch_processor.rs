//! Batch Processor - Pure Batching Abstraction
//!
//! Groups finished spans into batches of at most `items_per_batch` and hands
//! out at most `batches_per_loop` of them per flush-loop tick. Spans keep
//! their submission order across batches.
//!
//! Concurrency lives in [`SpanReporter`](crate::SpanReporter); this type has
//! no `Arc`, no atomics and no exporter, so it can be tested in isolation.
//!
//! ```rust,ignore
//! let mut processor = BatchProcessor::new(BatchConfig::default());
//! processor.add(span);
//!
//! for spans in processor.take_loop_batches() {
//!     queue.enqueue(emit_batch_message_parts(&process, &spans));
//! }
//! ```

use crate::config::ReporterConfig;
use crate::span::Span;
use std::collections::VecDeque;

/// Configuration for batch processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of spans per batch
    pub items_per_batch: usize,
    /// Maximum number of batches per flush-loop tick
    pub batches_per_loop: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            items_per_batch: 100,
            batches_per_loop: 10,
        }
    }
}

impl From<&ReporterConfig> for BatchConfig {
    fn from(config: &ReporterConfig) -> Self {
        Self {
            items_per_batch: config.items_per_batch.max(1),
            batches_per_loop: config.batches_per_loop.max(1),
        }
    }
}

/// Metrics for batch processing (plain u64 - no atomic overhead for sequential use)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchMetrics {
    /// Total spans added
    pub spans_added: u64,
    /// Total batches handed out
    pub batches_taken: u64,
}

/// FIFO of finished spans cut into bounded batches.
pub struct BatchProcessor {
    pending: VecDeque<Span>,
    config: BatchConfig,
    metrics: BatchMetrics,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            config,
            metrics: BatchMetrics::default(),
        }
    }

    /// Adds a finished span
    pub fn add(&mut self, span: Span) {
        self.pending.push_back(span);
        self.metrics.spans_added += 1;
    }

    /// Returns the total number of pending spans
    pub fn total_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes the oldest `items_per_batch` spans (or fewer).
    ///
    /// Returns `None` if no spans are pending.
    pub fn take_batch(&mut self) -> Option<Vec<Span>> {
        if self.pending.is_empty() {
            return None;
        }
        let n = self.config.items_per_batch.min(self.pending.len());
        self.metrics.batches_taken += 1;
        Some(self.pending.drain(..n).collect())
    }

    /// Takes up to `batches_per_loop` batches for one flush-loop tick.
    pub fn take_loop_batches(&mut self) -> Vec<Vec<Span>> {
        let mut batches = Vec::new();
        while batches.len() < self.config.batches_per_loop {
            match self.take_batch() {
                Some(batch) => batches.push(batch),
                None => break,
            }
        }
        batches
    }

    /// Takes every pending span, ignoring `batches_per_loop` (shutdown path).
    pub fn drain_batches(&mut self) -> Vec<Vec<Span>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.take_batch() {
            batches.push(batch);
        }
        batches
    }

    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }
}
