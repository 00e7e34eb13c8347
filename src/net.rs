//! Relay transport over iroh QUIC endpoints.
//!
//! This module provides [`IrohTransport`], the [`RelayTransport`] used in
//! production. Connections are cached per relay and protocol so that the
//! `connect` call the proxy makes before every attempt is free once a relay
//! has been reached.
//!
//! # Protocol
//!
//! Streams are negotiated with the ALPN identifier `/ipfs/supernoderouting`.
//! Every request uses a fresh bidirectional stream carrying one frame in each
//! direction (see [`crate::framing`]).

use std::collections::HashMap;
use std::future::Future;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use iroh::endpoint::{Connection, RecvStream, SendStream};
use iroh::{Endpoint, EndpointAddr};
use tokio::io::Join;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{short_id, PeerId, RelayPeer};
use crate::proxy::RelayTransport;

/// ALPN protocol identifier for supernode routing streams.
pub const SNR_ALPN: &[u8] = b"/ipfs/supernoderouting";

/// Build a relay descriptor from an iroh endpoint address.
///
/// The descriptor's address is the JSON form of `addr`, which is what
/// [`IrohTransport`] dials.
pub fn relay_peer(addr: &EndpointAddr) -> Result<RelayPeer> {
    Ok(RelayPeer::new(
        *addr.id.as_bytes(),
        serde_json::to_string(addr)?,
    ))
}

/// Parse a relay's address back into an [`EndpointAddr`].
fn parse_addr(relay: &RelayPeer) -> Result<EndpointAddr> {
    let addr: EndpointAddr = serde_json::from_str(&relay.addr)
        .with_context(|| format!("invalid address for relay {}", short_id(&relay.id)))?;
    if addr.id.as_bytes() != &relay.id {
        return Err(anyhow!(
            "address for relay {} names a different endpoint",
            short_id(&relay.id)
        ));
    }
    Ok(addr)
}

type CacheKey = (PeerId, Vec<u8>);

/// Live connections keyed by relay and ALPN.
///
/// The map lock is only held for lookups and inserts, never across a dial, so
/// a relay that is slow to answer does not hold up calls to other relays.
struct ConnectionCache<C> {
    conns: Mutex<HashMap<CacheKey, C>>,
}

impl<C: Clone> ConnectionCache<C> {
    fn new() -> Self {
        Self {
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached connection for `key` if `alive` accepts it, otherwise
    /// run `dial` and cache its result. When two dials for the same key race,
    /// the connection inserted first wins.
    async fn get_or_dial<A, F, Fut>(&self, key: CacheKey, alive: A, dial: F) -> Result<C>
    where
        A: Fn(&C) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        {
            let mut conns = self.conns.lock().await;
            if let Some(conn) = conns.get(&key) {
                if alive(conn) {
                    return Ok(conn.clone());
                }
                debug!(peer = %short_id(&key.0), "dropping closed relay connection");
                conns.remove(&key);
            }
        }

        let fresh = dial().await?;

        let mut conns = self.conns.lock().await;
        if let Some(existing) = conns.get(&key) {
            if alive(existing) {
                return Ok(existing.clone());
            }
        }
        conns.insert(key, fresh.clone());
        Ok(fresh)
    }
}

/// [`RelayTransport`] implementation on top of an iroh [`Endpoint`].
pub struct IrohTransport {
    endpoint: Endpoint,
    /// ALPN used by [`RelayTransport::connect`].
    alpn: Vec<u8>,
    addresses: Mutex<HashMap<PeerId, EndpointAddr>>,
    connections: ConnectionCache<Connection>,
}

impl IrohTransport {
    pub fn new(endpoint: Endpoint, alpn: impl Into<Vec<u8>>) -> Self {
        Self {
            endpoint,
            alpn: alpn.into(),
            addresses: Mutex::new(HashMap::new()),
            connections: ConnectionCache::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get a live cached connection or dial a new one.
    async fn connection(&self, peer: &PeerId, alpn: &[u8]) -> Result<Connection> {
        let key = (*peer, alpn.to_vec());
        self.connections
            .get_or_dial(
                key,
                |conn: &Connection| conn.close_reason().is_none(),
                move || async move {
                    let addr = {
                        let addrs = self.addresses.lock().await;
                        addrs.get(peer).cloned()
                    }
                    .ok_or_else(|| anyhow!("no known address for relay {}", short_id(peer)))?;

                    self.endpoint
                        .connect(addr, alpn)
                        .await
                        .with_context(|| format!("dialing relay {}", short_id(peer)))
                },
            )
            .await
    }
}

#[async_trait]
impl RelayTransport for IrohTransport {
    type Stream = Join<RecvStream, SendStream>;

    async fn connect(&self, relay: &RelayPeer) -> Result<()> {
        let addr = parse_addr(relay)?;
        self.addresses.lock().await.insert(relay.id, addr);
        self.connection(&relay.id, &self.alpn).await?;
        Ok(())
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &[u8]) -> Result<Self::Stream> {
        let conn = self.connection(peer, protocol).await?;
        let (send, recv) = conn
            .open_bi()
            .await
            .with_context(|| format!("opening stream to relay {}", short_id(peer)))?;
        Ok(tokio::io::join(recv, send))
    }
}
