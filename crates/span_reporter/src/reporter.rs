use crate::batch_processor::{BatchConfig, BatchProcessor};
use crate::config::ReporterConfig;
use crate::delivery_queue::{ConnectionState, DeliveryMetrics, DeliveryQueue};
use crate::error::{ReporterError, SubmitError};
use crate::framer::emit_batch_message_parts;
use crate::span::{Batch, Process, Span};
use crate::transport::{Transport, UdpTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Thread-safe reporter counters
#[derive(Debug, Default)]
pub struct ReporterMetrics {
    /// Spans accepted by `submit_span`
    pub spans_submitted: AtomicU64,
    /// Datagrams handed to the delivery queue
    pub batches_emitted: AtomicU64,
    /// Spans that could not fit into a single datagram
    pub spans_dropped: AtomicU64,
}

impl ReporterMetrics {
    pub fn spans_submitted(&self) -> u64 {
        self.spans_submitted.load(Ordering::Relaxed)
    }

    pub fn batches_emitted(&self) -> u64 {
        self.batches_emitted.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }
}

/// Encodes span batches and hands the datagrams to the delivery queue.
struct Emitter<T: Transport> {
    queue: Arc<DeliveryQueue<T>>,
    metrics: Arc<ReporterMetrics>,
    max_packet_size: usize,
}

impl<T: Transport> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            metrics: Arc::clone(&self.metrics),
            max_packet_size: self.max_packet_size,
        }
    }
}

impl<T: Transport> Emitter<T> {
    /// Emits `spans` as one datagram, halving the batch while it exceeds
    /// `max_packet_size`. A single span that still does not fit is dropped.
    fn emit(&self, process: &Process, spans: &[Span]) {
        let datagram = emit_batch_message_parts(process, spans);
        if datagram.len() <= self.max_packet_size {
            self.queue.enqueue(datagram);
            self.metrics.batches_emitted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if spans.len() > 1 {
            let (head, tail) = spans.split_at(spans.len() / 2);
            debug!(
                spans = spans.len(),
                size = datagram.len(),
                max = self.max_packet_size,
                "splitting oversize batch"
            );
            self.emit(process, head);
            self.emit(process, tail);
            return;
        }

        self.metrics
            .spans_dropped
            .fetch_add(spans.len() as u64, Ordering::Relaxed);
        if let Some(span) = spans.first() {
            warn!(
                trace_id = %span.trace_id,
                span_id = span.span_id,
                size = datagram.len(),
                max = self.max_packet_size,
                "span does not fit in one datagram, dropping"
            );
        }
    }
}

/// Flush loop: collects submitted spans and emits up to `batches_per_loop`
/// batches per tick. On shutdown every remaining span is emitted.
async fn run_flush_loop<T: Transport>(
    emitter: Emitter<T>,
    process: Arc<Process>,
    mut processor: BatchProcessor,
    mut span_rx: mpsc::UnboundedReceiver<Span>,
    mut shutdown_rx: oneshot::Receiver<()>,
    flush_interval: Duration,
) {
    let mut interval = tokio::time::interval(flush_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            // Fires on explicit shutdown and when the reporter is dropped
            _ = &mut shutdown_rx => {
                while let Ok(span) = span_rx.try_recv() {
                    processor.add(span);
                }
                let batches = processor.drain_batches();
                debug!(batches = batches.len(), "final flush");
                for spans in &batches {
                    emitter.emit(&process, spans);
                }
                break;
            }

            // Ahead of `recv` so a steady stream of spans cannot starve it
            _ = interval.tick() => {
                for spans in processor.take_loop_batches() {
                    emitter.emit(&process, &spans);
                }
            }

            Some(span) = span_rx.recv() => {
                processor.add(span);
            }
        }
    }
}

/// Reports finished spans to a collector agent.
///
/// Spans submitted with [`submit_span`](Self::submit_span) are batched by a
/// background task; [`submit_batch`](Self::submit_batch) bypasses batching.
/// Datagrams produced before the transport connects are buffered by the
/// [`DeliveryQueue`] and flushed in order once it does.
pub struct SpanReporter<T: Transport = UdpTransport> {
    queue: Arc<DeliveryQueue<T>>,
    emitter: Emitter<T>,
    span_tx: mpsc::UnboundedSender<Span>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    loop_task: Option<JoinHandle<()>>,
    metrics: Arc<ReporterMetrics>,
    shutdown_timeout: Duration,
}

impl SpanReporter<UdpTransport> {
    /// Starts a reporter sending to `config.host:config.port` over UDP.
    pub fn udp(config: ReporterConfig, process: Process) -> Result<Self, ReporterError> {
        let transport = UdpTransport::new(config.max_packet_size);
        Self::start(config, process, transport)
    }
}

impl<T: Transport> SpanReporter<T> {
    /// Starts the connect and flush-loop tasks. Must be called within a
    /// tokio runtime.
    pub fn start(
        config: ReporterConfig,
        process: Process,
        transport: T,
    ) -> Result<Self, ReporterError> {
        config.validate()?;
        info!(
            host = %config.host,
            port = config.port,
            protocol = ?config.protocol,
            transport = transport.name(),
            "starting span reporter"
        );

        let queue = Arc::new(DeliveryQueue::new(Arc::new(transport)));
        let metrics = Arc::new(ReporterMetrics::default());
        let process = Arc::new(process);

        queue.begin_connect()?;
        {
            let queue = Arc::clone(&queue);
            let host = config.host.clone();
            let port = config.port;
            // Failures are logged by the queue and reported again by `shutdown`
            tokio::spawn(async move {
                let _ = queue.finish_connect(&host, port).await;
            });
        }

        let emitter = Emitter {
            queue: Arc::clone(&queue),
            metrics: Arc::clone(&metrics),
            max_packet_size: config.max_packet_size,
        };
        let (span_tx, span_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let loop_task = tokio::spawn(run_flush_loop(
            emitter.clone(),
            process,
            BatchProcessor::new(BatchConfig::from(&config)),
            span_rx,
            shutdown_rx,
            config.flush_interval(),
        ));

        Ok(Self {
            emitter,
            queue,
            span_tx,
            shutdown_tx: Some(shutdown_tx),
            loop_task: Some(loop_task),
            metrics,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Hands a finished span to the batching loop
    pub fn submit_span(&self, span: Span) -> Result<(), SubmitError> {
        self.span_tx.send(span).map_err(|_| SubmitError::Closed)?;
        self.metrics.spans_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Encodes `batch` with its own process and enqueues it immediately
    pub fn submit_batch(&self, batch: &Batch) {
        self.emitter.emit(&batch.process, &batch.spans);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.queue.state()
    }

    pub fn metrics(&self) -> &Arc<ReporterMetrics> {
        &self.metrics
    }

    pub fn delivery_metrics(&self) -> &Arc<DeliveryMetrics> {
        self.queue.metrics()
    }

    pub fn transport(&self) -> &Arc<T> {
        self.queue.transport()
    }

    /// Flushes every submitted span and waits, up to the configured
    /// timeout, for the transport to report its outbound buffer empty.
    pub async fn shutdown(mut self) -> Result<(), ReporterError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.loop_task.take() {
            task.await.map_err(|e| ReporterError::Join(e.to_string()))?;
        }

        match tokio::time::timeout(self.shutdown_timeout, self.queue.drain_signal()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ReporterError::Connection(e)),
            Err(_) => Err(ReporterError::DrainTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::framer::emit_batch_message;
    use crate::transport::RecordingTransport;

    fn test_config() -> ReporterConfig {
        ReporterConfig::default()
            .with_items_per_batch(2)
            .with_flush_interval(Duration::from_secs(3600))
    }

    fn test_span(i: u64) -> Span {
        Span::new(1_u128, i, 0, format!("op-{}", i)).with_start_time(1_000 + i as i64)
    }

    #[tokio::test]
    async fn test_submit_span_and_shutdown() {
        let process = Process::new("svc");
        let reporter =
            SpanReporter::start(test_config(), process.clone(), RecordingTransport::new()).unwrap();

        for i in 0..5 {
            reporter.submit_span(test_span(i)).unwrap();
        }
        assert_eq!(reporter.metrics().spans_submitted(), 5);

        let transport = Arc::clone(reporter.transport());
        let metrics = Arc::clone(reporter.metrics());
        reporter.shutdown().await.unwrap();

        let spans: Vec<Span> = (0..5).map(test_span).collect();
        let expected = vec![
            emit_batch_message_parts(&process, &spans[0..2]),
            emit_batch_message_parts(&process, &spans[2..4]),
            emit_batch_message_parts(&process, &spans[4..5]),
        ];
        assert_eq!(transport.sent(), expected);
        assert_eq!(metrics.batches_emitted(), 3);
    }

    #[tokio::test]
    async fn test_submit_batch_uses_batch_process() {
        let reporter =
            SpanReporter::start(test_config(), Process::new("svc"), RecordingTransport::new())
                .unwrap();

        let batch = Batch::with_spans(
            Process::new("other").with_tag("version", "1.2"),
            vec![test_span(1)],
        );
        reporter.submit_batch(&batch);

        let transport = Arc::clone(reporter.transport());
        reporter.shutdown().await.unwrap();
        assert_eq!(transport.sent(), vec![emit_batch_message(&batch)]);
    }

    #[tokio::test]
    async fn test_oversize_batch_is_split() {
        let process = Process::new("svc");
        let spans: Vec<Span> = (0..4).map(test_span).collect();
        let single = emit_batch_message_parts(&process, &spans[..1]).len();

        let config = test_config()
            .with_items_per_batch(4)
            .with_max_packet_size(single);
        let reporter =
            SpanReporter::start(config, process.clone(), RecordingTransport::new()).unwrap();
        for span in &spans {
            reporter.submit_span(span.clone()).unwrap();
        }

        let transport = Arc::clone(reporter.transport());
        reporter.shutdown().await.unwrap();

        let expected: Vec<_> = spans
            .chunks(1)
            .map(|s| emit_batch_message_parts(&process, s))
            .collect();
        assert_eq!(transport.sent(), expected);
    }

    #[tokio::test]
    async fn test_span_larger_than_packet_is_dropped() {
        let config = test_config().with_max_packet_size(256);
        let reporter =
            SpanReporter::start(config, Process::new("svc"), RecordingTransport::new()).unwrap();

        let mut big = test_span(1);
        big.set_tag("payload", "x".repeat(1024));
        let batch = Batch::with_spans(Process::new("svc"), vec![big]);
        reporter.submit_batch(&batch);

        let transport = Arc::clone(reporter.transport());
        let metrics = Arc::clone(reporter.metrics());
        reporter.shutdown().await.unwrap();
        assert!(transport.sent().is_empty());
        assert_eq!(metrics.spans_dropped(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_reports_connection_failure() {
        let error = ConnectionError::Io("refused".into());
        let reporter = SpanReporter::start(
            test_config(),
            Process::new("svc"),
            RecordingTransport::failing(error.clone()),
        )
        .unwrap();
        reporter.submit_span(test_span(1)).unwrap();

        match reporter.shutdown().await {
            Err(ReporterError::Connection(e)) => assert_eq!(e, error),
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_times_out_when_transport_never_drains() {
        let config = test_config().with_shutdown_timeout(Duration::from_millis(20));
        let reporter = SpanReporter::start(
            config,
            Process::new("svc"),
            RecordingTransport::new().manual_empty(),
        )
        .unwrap();
        reporter.submit_span(test_span(1)).unwrap();

        let transport = Arc::clone(reporter.transport());
        assert!(matches!(
            reporter.shutdown().await,
            Err(ReporterError::DrainTimeout)
        ));
        // The batch itself was still handed to the transport
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ticks_fire_under_continuous_submission() {
        let config = ReporterConfig::default()
            .with_items_per_batch(100)
            .with_batches_per_loop(1)
            .with_flush_interval(Duration::from_millis(1));
        let reporter = Arc::new(
            SpanReporter::start(config, Process::new("svc"), RecordingTransport::new()).unwrap(),
        );

        let producer = {
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move {
                let mut seq = 0_u64;
                while reporter.metrics().batches_emitted() < 3 && seq < 200_000 {
                    reporter.submit_span(test_span(seq)).unwrap();
                    seq += 1;
                    if seq % 64 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };
        producer.await.unwrap();

        // Batches went out while spans were still arriving
        assert!(reporter.metrics().batches_emitted() >= 3);
        assert!(reporter.metrics().spans_submitted() < 200_000);

        let reporter = match Arc::try_unwrap(reporter) {
            Ok(r) => r,
            Err(_) => panic!("reporter still shared"),
        };
        reporter.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = test_config().with_batches_per_loop(0);
        let result = SpanReporter::start(config, Process::new("svc"), RecordingTransport::new());
        assert!(matches!(result, Err(ReporterError::InvalidConfig(_))));
    }
}
