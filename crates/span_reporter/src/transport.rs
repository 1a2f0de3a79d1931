use crate::error::{ConnectionError, TransportError};
use bytes::Bytes;
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Datagram transport towards the collector agent.
///
/// Uses native async fn in traits instead of `#[async_trait]`.
pub trait Transport: Send + Sync + 'static {
    /// Establishes the connection. Called at most once per successful connect.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Submits one datagram, fire-and-forget. Failures are the transport's
    /// to log; they are never reported back.
    fn send(&self, datagram: Bytes);

    /// Completes once every datagram submitted before the call has left the
    /// outbound buffer.
    fn outgoing_empty(&self) -> impl Future<Output = ()> + Send;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// Counters for the UDP transport
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub datagrams_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
    /// Datagrams rejected before reaching the socket (oversize, not connected)
    pub datagrams_dropped: AtomicU64,
}

// Statistical counters only; nothing synchronizes on them, hence `Relaxed`.
impl TransportMetrics {
    pub fn datagrams_sent(&self) -> u64 {
        self.datagrams_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    pub fn datagrams_dropped(&self) -> u64 {
        self.datagrams_dropped.load(Ordering::Relaxed)
    }

    fn record_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

enum Outgoing {
    Datagram(Bytes),
    /// Acknowledged once every datagram queued ahead of it was sent
    Flush(oneshot::Sender<()>),
}

/// UDP transport backed by a tokio socket.
///
/// Datagrams go through an unbounded channel to a single writer task, which
/// keeps them in submission order and acts as the outbound buffer.
pub struct UdpTransport {
    max_packet_size: usize,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    metrics: Arc<TransportMetrics>,
}

impl UdpTransport {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            outgoing: Mutex::new(None),
            metrics: Arc::new(TransportMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<TransportMetrics> {
        &self.metrics
    }

    pub fn is_connected(&self) -> bool {
        self.sender().is_some()
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Outgoing>> {
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn drop_datagram(&self, error: &TransportError) {
        self.metrics.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "dropping datagram");
    }
}

impl Transport for UdpTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }

        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ConnectionError::Resolve {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ConnectionError::NoAddress {
                host: host.to_string(),
                port,
            })?;

        let bind_addr: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut outgoing = self.outgoing.lock().unwrap_or_else(PoisonError::into_inner);
            if outgoing.is_some() {
                return Err(ConnectionError::AlreadyConnected);
            }
            *outgoing = Some(tx);
        }

        debug!(agent = %addr, local = ?socket.local_addr().ok(), "udp transport connected");
        tokio::spawn(run_writer(socket, rx, Arc::clone(&self.metrics)));
        Ok(())
    }

    fn send(&self, datagram: Bytes) {
        if datagram.len() > self.max_packet_size {
            self.drop_datagram(&TransportError::PacketTooLarge {
                size: datagram.len(),
                max: self.max_packet_size,
            });
            return;
        }
        match self.sender() {
            Some(tx) => {
                if tx.send(Outgoing::Datagram(datagram)).is_err() {
                    self.drop_datagram(&TransportError::NotConnected);
                }
            }
            None => self.drop_datagram(&TransportError::NotConnected),
        }
    }

    async fn outgoing_empty(&self) {
        let Some(tx) = self.sender() else {
            // Nothing was ever queued
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Outgoing::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn name(&self) -> &str {
        "udp"
    }
}

async fn run_writer(
    socket: UdpSocket,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    metrics: Arc<TransportMetrics>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outgoing::Datagram(datagram) => match socket.send(&datagram).await {
                Ok(sent) => metrics.record_sent(sent),
                Err(e) => {
                    metrics.send_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %TransportError::Io(e), len = datagram.len(), "udp send failed");
                }
            },
            Outgoing::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("udp writer stopped");
}

/// Test transport that records every datagram and lets tests decide when
/// connection and drain complete.
#[cfg(test)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<Bytes>>,
    connect_result: Result<(), ConnectionError>,
    gated: bool,
    gate: tokio::sync::Notify,
    auto_empty: bool,
    empty: tokio::sync::Notify,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connect_result: Ok(()),
            gated: false,
            gate: tokio::sync::Notify::new(),
            auto_empty: true,
            empty: tokio::sync::Notify::new(),
        }
    }

    /// `connect` waits for [`Self::open_gate`]
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    pub fn failing(error: ConnectionError) -> Self {
        Self {
            connect_result: Err(error),
            ..Self::new()
        }
    }

    /// `outgoing_empty` waits for [`Self::signal_empty`]
    pub fn manual_empty(mut self) -> Self {
        self.auto_empty = false;
        self
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub fn signal_empty(&self) {
        self.empty.notify_one();
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    async fn connect(&self, _host: &str, _port: u16) -> Result<(), ConnectionError> {
        if self.gated {
            self.gate.notified().await;
        }
        self.connect_result.clone()
    }

    fn send(&self, datagram: Bytes) {
        self.sent.lock().unwrap().push(datagram);
    }

    async fn outgoing_empty(&self) {
        if !self.auto_empty {
            self.empty.notified().await;
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}
