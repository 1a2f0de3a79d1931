//! Reporter configuration.

use crate::error::ReporterError;
use crate::framer::min_emit_batch_size;
use serde::Deserialize;
use std::time::Duration;

/// Largest datagram the collector agent accepts.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65_000;

/// Agent port for the binary protocol.
pub const DEFAULT_AGENT_PORT: u16 = 6832;

/// Wire framing used towards the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Binary-protocol `emitBatch` one-way calls over UDP.
    #[default]
    UdpBinary,
}

/// Configuration for the span reporter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReporterConfig {
    /// Agent host name or IP address.
    ///
    /// Default: "localhost"
    pub host: String,

    /// Agent UDP port.
    ///
    /// Default: 6832
    pub port: u16,

    pub protocol: Protocol,

    /// Maximum spans per emitted batch.
    ///
    /// Default: 100
    pub items_per_batch: usize,

    /// Maximum batches emitted per flush-loop tick. Spans beyond
    /// `items_per_batch * batches_per_loop` wait for the next tick.
    ///
    /// Default: 10
    pub batches_per_loop: usize,

    /// Flush-loop tick period in milliseconds.
    ///
    /// Default: 1000
    pub flush_interval_ms: u64,

    /// Datagrams above this size are split or dropped.
    ///
    /// Default: 65000
    pub max_packet_size: usize,

    /// Upper bound on waiting for queued datagrams at shutdown.
    ///
    /// Default: 5000
    pub shutdown_timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_AGENT_PORT,
            protocol: Protocol::UdpBinary,
            items_per_batch: 100,
            batches_per_loop: 10,
            flush_interval_ms: 1000,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl ReporterConfig {
    /// Parses a JSON document; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ReporterError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ReporterError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReporterError> {
        if self.host.trim().is_empty() {
            return Err(ReporterError::InvalidConfig("host must not be empty".into()));
        }
        if self.items_per_batch == 0 {
            return Err(ReporterError::InvalidConfig(
                "items_per_batch must be at least 1".into(),
            ));
        }
        if self.batches_per_loop == 0 {
            return Err(ReporterError::InvalidConfig(
                "batches_per_loop must be at least 1".into(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ReporterError::InvalidConfig(
                "flush_interval_ms must be at least 1".into(),
            ));
        }
        let min = min_emit_batch_size();
        if self.max_packet_size < min {
            return Err(ReporterError::InvalidConfig(format!(
                "max_packet_size {} is below the {} byte minimum",
                self.max_packet_size, min
            )));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn with_agent(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_items_per_batch(mut self, items: usize) -> Self {
        self.items_per_batch = items;
        self
    }

    pub fn with_batches_per_loop(mut self, batches: usize) -> Self {
        self.batches_per_loop = batches;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ReporterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 6832);
        assert_eq!(config.protocol, Protocol::UdpBinary);
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ReporterConfig::from_json_str(
            r#"{"host": "agent.local", "port": 6000, "protocol": "udp_binary", "items_per_batch": 5}"#,
        )
        .unwrap();
        assert_eq!(config.host, "agent.local");
        assert_eq!(config.port, 6000);
        assert_eq!(config.items_per_batch, 5);
        assert_eq!(config.batches_per_loop, 10);
    }

    #[test]
    fn test_from_json_rejects_unknown_protocol() {
        let err = ReporterConfig::from_json_str(r#"{"protocol": "http"}"#).unwrap_err();
        assert!(matches!(err, ReporterError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_batching() {
        let config = ReporterConfig::default().with_items_per_batch(0);
        assert!(config.validate().is_err());

        let config = ReporterConfig::default().with_batches_per_loop(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_packets() {
        let config = ReporterConfig::default().with_max_packet_size(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = ReporterConfig::default().with_agent(" ", 6832);
        assert!(config.validate().is_err());
    }
}
