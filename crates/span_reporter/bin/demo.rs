//! # Span Reporter Demo
//!
//! Runs a local mock agent on a loopback UDP socket, reports a few synthetic
//! request traces to it, then shuts the reporter down and prints what the
//! agent received.
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (10 traces)
//! cargo run -p span_reporter --bin demo -- --quick
//!
//! # Full mode (200 traces), with reporter logs
//! RUST_LOG=span_reporter=debug cargo run -p span_reporter --bin demo
//! ```

use rand::Rng;
use span_reporter::span::{now_micros, FLAG_DEBUG, FLAG_SAMPLED};
use span_reporter::{Log, Process, ReporterConfig, Span, SpanReporter, TraceId};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

const OPERATIONS: &[&str] = &["db.query", "cache.get", "http.client", "render"];

/// What the mock agent saw
#[derive(Default)]
struct AgentStats {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    largest: AtomicU64,
}

async fn run_mock_agent(socket: UdpSocket, stats: Arc<AgentStats>) {
    let mut buf = vec![0u8; 65_536];
    while let Ok(n) = socket.recv(&mut buf).await {
        stats.datagrams.fetch_add(1, Ordering::Relaxed);
        stats.bytes.fetch_add(n as u64, Ordering::Relaxed);
        stats.largest.fetch_max(n as u64, Ordering::Relaxed);
    }
}

/// Builds one request trace: a sampled root span with a handful of children.
fn build_trace(rng: &mut impl Rng, request: u64) -> Vec<Span> {
    let trace_id = TraceId::new(rng.gen(), rng.gen());
    let root_id: u64 = rng.gen();
    let start = now_micros();

    let mut spans = Vec::new();
    let mut offset = 50;
    for _ in 0..rng.gen_range(1..=4) {
        let operation = OPERATIONS[rng.gen_range(0..OPERATIONS.len())];
        let duration = rng.gen_range(100..5_000);
        let mut child =
            Span::new(trace_id, rng.gen(), root_id, operation).with_start_time(start + offset);
        if rng.gen_bool(0.1) {
            child.flags = FLAG_SAMPLED | FLAG_DEBUG;
            child.set_tag("error", true);
            child.log(Log::new(start + offset + duration).with_field("event", "error"));
        }
        child.finish_at(start + offset + duration);
        offset += duration;
        spans.push(child);
    }

    let mut root = Span::new(trace_id, root_id, 0, "GET /checkout").with_start_time(start);
    root.set_tag("http.method", "GET");
    root.set_tag("http.status_code", 200_i64);
    root.set_tag("request.id", request as i64);
    root.finish_at(start + offset + 20);
    spans.push(root);
    spans
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let quick = std::env::args().any(|arg| arg == "--quick");
    let traces = if quick { 10 } else { 200 };

    println!("Phase 1: starting mock agent");
    let agent = UdpSocket::bind("127.0.0.1:0").await?;
    let port = agent.local_addr()?.port();
    let stats = Arc::new(AgentStats::default());
    let agent_task = tokio::spawn(run_mock_agent(agent, Arc::clone(&stats)));
    println!("   listening on 127.0.0.1:{port}\n");

    println!("Phase 2: starting reporter");
    let config = ReporterConfig::default()
        .with_agent("127.0.0.1", port)
        .with_items_per_batch(50)
        .with_flush_interval(Duration::from_millis(100));
    println!(
        "   batch: {} spans, {} batches per flush, every {:?}\n",
        config.items_per_batch,
        config.batches_per_loop,
        config.flush_interval()
    );
    let process = Process::new("checkout-service")
        .with_tag("hostname", "demo-host")
        .with_tag("client.version", env!("CARGO_PKG_VERSION"));
    let reporter = SpanReporter::udp(config, process)?;

    println!("Phase 3: reporting {traces} traces");
    let started = Instant::now();
    let mut rng = rand::thread_rng();
    for request in 0..traces {
        for span in build_trace(&mut rng, request) {
            reporter.submit_span(span)?;
        }
    }

    let metrics = Arc::clone(reporter.metrics());
    let transport = Arc::clone(reporter.transport());
    println!("\nPhase 4: shutting down");
    reporter.shutdown().await?;
    let elapsed = started.elapsed();

    // Loopback delivery is not synchronous with send.
    tokio::time::sleep(Duration::from_millis(50)).await;
    agent_task.abort();

    println!("\nResults ({elapsed:?})");
    println!("   spans submitted:    {}", metrics.spans_submitted());
    println!("   spans dropped:      {}", metrics.spans_dropped());
    println!("   batches emitted:    {}", metrics.batches_emitted());
    println!("   datagrams sent:     {}", transport.metrics().datagrams_sent());
    println!("   bytes sent:         {}", transport.metrics().bytes_sent());
    println!("   agent datagrams:    {}", stats.datagrams.load(Ordering::Relaxed));
    println!("   agent bytes:        {}", stats.bytes.load(Ordering::Relaxed));
    println!("   largest datagram:   {}", stats.largest.load(Ordering::Relaxed));
    Ok(())
}
