use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use iroh::EndpointAddr;
use serde::{Deserialize, Serialize};

use crate::core::RelayPeer;
use crate::error::ProxyError;
use crate::framing::MAX_MESSAGE_SIZE;
use crate::net::{relay_peer, SNR_ALPN};

/// Number of relays a write must reach before it counts as durable.
pub const DEFAULT_REPLICATION_FACTOR: usize = 2;

/// What a write reports when the relay set runs out before the replication
/// factor is met.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplicationPolicy {
    /// Report the result of the last relay attempted. A write that reached
    /// fewer relays than required still succeeds if that last attempt did.
    #[default]
    LastResult,
    /// Fail with [`ProxyError::Replication`] unless the replication factor was met.
    Strict,
}

/// Configuration for a [`Proxy`](crate::Proxy).
///
/// All fields except the relay set have defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use iroh_snr::ProxyConfig;
///
/// let config = ProxyConfig::new()
///     .replication_factor(3)
///     .attempt_timeout(Duration::from_secs(5));
/// ```
///
/// or load it from a JSON file with [`ProxyConfig::load`]:
///
/// ```json
/// { "relays": [ { "id": "…", "addrs": [] } ], "attempt_timeout_ms": 5000 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Relay peers, fixed for the lifetime of the proxy.
    ///
    /// Read by [`Proxy::from_config`](crate::Proxy::from_config);
    /// [`Proxy::with_config`](crate::Proxy::with_config) takes its relay set
    /// from the caller instead.
    pub relays: Vec<EndpointAddr>,
    /// Protocol identifier used for outbound streams and the inbound handler.
    pub protocol: String,
    /// Maximum accepted frame size in bytes.
    pub max_message_size: usize,
    pub replication_factor: usize,
    /// Deadline for a single relay attempt. `None` leaves attempts unbounded.
    pub attempt_timeout_ms: Option<u64>,
    /// Fail writes that fall short of `replication_factor`.
    pub strict_replication: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self {
            relays: Vec::new(),
            protocol: String::from_utf8_lossy(SNR_ALPN).into_owned(),
            max_message_size: MAX_MESSAGE_SIZE,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            attempt_timeout_ms: None,
            strict_replication: false,
        }
    }

    /// Read a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ProxyConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.replication_factor == 0 {
            return Err(ProxyError::Config(
                "replication_factor must be at least 1".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ProxyError::Config(
                "max_message_size must be non-zero".into(),
            ));
        }
        if self.protocol.is_empty() {
            return Err(ProxyError::Config("protocol must not be empty".into()));
        }
        Ok(())
    }

    pub fn relay(mut self, addr: EndpointAddr) -> Self {
        self.relays.push(addr);
        self
    }

    pub fn relays(mut self, addrs: impl IntoIterator<Item = EndpointAddr>) -> Self {
        self.relays.extend(addrs);
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set maximum accepted frame size (default: 4 MiB).
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Set how many relays a write must reach (default: 2).
    pub fn replication_factor(mut self, factor: usize) -> Self {
        self.replication_factor = factor;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn strict_replication(mut self, strict: bool) -> Self {
        self.strict_replication = strict;
        self
    }

    /// Relay descriptors for the configured endpoint addresses, in order.
    pub fn relay_peers(&self) -> Result<Vec<RelayPeer>, ProxyError> {
        self.relays
            .iter()
            .map(|addr| {
                relay_peer(addr).map_err(|err| {
                    ProxyError::Config(format!("relay {}: {err:#}", addr.id.fmt_short()))
                })
            })
            .collect()
    }

    pub fn attempt_timeout_duration(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn replication_policy(&self) -> ReplicationPolicy {
        if self.strict_replication {
            ReplicationPolicy::Strict
        } else {
            ReplicationPolicy::LastResult
        }
    }
}
