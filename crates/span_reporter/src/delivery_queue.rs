//! Connection-aware delivery of framed datagrams.
//!
//! Datagrams enqueued before the transport is connected wait in an unbounded
//! FIFO; once connected they are flushed ahead of anything enqueued later.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──on_connected()──▶ Connected
//!       ▲                          │
//!       └──── connect failed ──────┘
//! ```
//!
//! State and pending list sit behind one mutex, so the queue can be shared
//! across tokio worker threads. No lock is held across an await point.

use crate::error::ConnectionError;
use crate::transport::Transport;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connection state of a [`DeliveryQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Counters for the delivery queue
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Datagrams handed to `enqueue`
    pub messages_enqueued: AtomicU64,
    /// Datagrams that had to wait for the connection
    pub messages_buffered: AtomicU64,
    /// Datagrams passed on to the transport
    pub messages_sent: AtomicU64,
}

impl DeliveryMetrics {
    pub fn messages_enqueued(&self) -> u64 {
        self.messages_enqueued.load(Ordering::Relaxed)
    }

    pub fn messages_buffered(&self) -> u64 {
        self.messages_buffered.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}

struct QueueInner {
    state: ConnectionState,
    pending: VecDeque<Bytes>,
    /// Set while `on_connected` is moving the pending list to the transport
    flushing: bool,
    last_error: Option<ConnectionError>,
}

/// Defers datagrams until the transport is connected, then sends in order.
pub struct DeliveryQueue<T: Transport> {
    transport: Arc<T>,
    inner: Mutex<QueueInner>,
    state_tx: watch::Sender<ConnectionState>,
    metrics: Arc<DeliveryMetrics>,
}

impl<T: Transport> DeliveryQueue<T> {
    pub fn new(transport: Arc<T>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            inner: Mutex::new(QueueInner {
                state: ConnectionState::Disconnected,
                pending: VecDeque::new(),
                flushing: false,
                last_error: None,
            }),
            state_tx,
            metrics: Arc::new(DeliveryMetrics::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the state and the watch together. Callers hold the `inner`
    /// guard, so watchers observe transitions in lock order.
    fn transition(&self, inner: &mut QueueInner, state: ConnectionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
        &self.metrics
    }

    /// Sends `message` now if connected, otherwise appends it to the
    /// pending list.
    pub fn enqueue(&self, message: Bytes) {
        self.metrics.messages_enqueued.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connected {
            // Sent under the lock so a concurrent enqueue cannot overtake it
            self.transport.send(message);
            self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.pending.push_back(message);
            self.metrics.messages_buffered.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Connects the transport and flushes the pending list.
    ///
    /// A failure is returned once and leaves the queue `Disconnected` with its
    /// pending list intact; no reconnect is attempted.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        self.begin_connect()?;
        self.finish_connect(host, port).await
    }

    /// Moves `Disconnected` to `Connecting` without touching the transport,
    /// so drain waiters see the attempt before the connecting task runs.
    pub fn begin_connect(&self) -> Result<(), ConnectionError> {
        {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(ConnectionError::AlreadyConnected);
            }
            inner.last_error = None;
            self.transition(&mut inner, ConnectionState::Connecting);
        }
        Ok(())
    }

    /// Runs the transport connect for an attempt opened by
    /// [`begin_connect`](Self::begin_connect).
    pub async fn finish_connect(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        debug!(host, port, transport = self.transport.name(), "connecting");

        match self.transport.connect(host, port).await {
            Ok(()) => {
                self.on_connected();
                Ok(())
            }
            Err(e) => {
                let pending = {
                    let mut inner = self.lock();
                    inner.last_error = Some(e.clone());
                    self.transition(&mut inner, ConnectionState::Disconnected);
                    inner.pending.len()
                };
                warn!(host, port, error = %e, pending, "connection failed");
                Err(e)
            }
        }
    }

    /// Marks the transport connected and flushes the pending list in
    /// enqueue order.
    ///
    /// The state stays `Connecting` while a taken list is being sent, so
    /// datagrams enqueued meanwhile land in a fresh list that the next pass
    /// picks up. Only an empty take flips the state to `Connected`.
    pub fn on_connected(&self) {
        {
            let mut inner = self.lock();
            if inner.flushing || inner.state == ConnectionState::Connected {
                return;
            }
            inner.flushing = true;
            if inner.state != ConnectionState::Connecting {
                self.transition(&mut inner, ConnectionState::Connecting);
            }
        }

        let mut flushed = 0_u64;
        loop {
            let batch = {
                let mut inner = self.lock();
                if inner.pending.is_empty() {
                    inner.flushing = false;
                    self.transition(&mut inner, ConnectionState::Connected);
                    break;
                }
                std::mem::take(&mut inner.pending)
            };
            for message in batch {
                self.transport.send(message);
                flushed += 1;
            }
        }
        self.metrics.messages_sent.fetch_add(flushed, Ordering::Relaxed);
        info!(flushed, transport = self.transport.name(), "connected");
    }

    /// Resolves once the transport reports its outbound buffer empty.
    ///
    /// Waits out an in-progress connection first. The transport is always
    /// consulted, even with nothing pending. Fails without draining when the
    /// queue is not connected.
    pub async fn drain_signal(&self) -> Result<(), ConnectionError> {
        let mut state_rx = self.state_tx.subscribe();
        let state = match state_rx
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
        {
            Ok(state) => *state,
            // The sender lives in `self`, so it cannot be dropped here
            Err(_) => return Err(ConnectionError::NotConnected),
        };

        match state {
            ConnectionState::Connected => {
                self.transport.outgoing_empty().await;
                Ok(())
            }
            _ => Err(self
                .lock()
                .last_error
                .clone()
                .unwrap_or(ConnectionError::NotConnected)),
        }
    }
}
