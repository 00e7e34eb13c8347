//! The supernode routing proxy.
//!
//! A [`Proxy`] does not take part in the DHT itself. It holds a fixed set of
//! trusted relay peers and forwards every routing operation to them, trying
//! relays one at a time in order of proximity to the message key until the
//! operation is satisfied:
//!
//! - [`Proxy::send_message`] delivers a one-way message. Reads stop at the first
//!   relay that accepts the message, writes (`PUT_VALUE`, `ADD_PROVIDER`) keep
//!   going until the replication factor is reached.
//! - [`Proxy::send_request`] returns the first well-formed response.
//!
//! Per-relay failures never escape the walk; only exhaustion of the relay set
//! (or cancellation of the whole call) is reported to the caller.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::config::{ProxyConfig, ReplicationPolicy, DEFAULT_REPLICATION_FACTOR};
use crate::core::{short_id, PeerId, PeerRanker, RelayPeer, XorRanker};
use crate::error::ProxyError;
use crate::framing::{read_message, write_message, MAX_MESSAGE_SIZE};
use crate::net::SNR_ALPN;
use crate::protocol::{MessageType, OperationClass, RoutingMessage};

// ============================================================================
// Transport Seam
// ============================================================================

/// The transport operations the proxy needs from its host.
///
/// Implementations are expected to cache connections: `connect` is called
/// before every stream is opened and should be cheap for a peer that is
/// already connected.
#[async_trait]
pub trait RelayTransport: Send + Sync + 'static {
    /// A bidirectional byte stream to a relay.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Ensure there is a live connection to `relay`.
    async fn connect(&self, relay: &RelayPeer) -> Result<()>;

    /// Open a new stream to an already connected peer, negotiating `protocol`.
    async fn open_stream(&self, peer: &PeerId, protocol: &[u8]) -> Result<Self::Stream>;
}

// ============================================================================
// Proxy
// ============================================================================

/// Delegates DHT routing operations to a fixed set of relay peers.
///
/// The relay set and all settings are read-only after construction, so a
/// single proxy can serve any number of concurrent calls through `&self`.
pub struct Proxy<T: RelayTransport, R: PeerRanker = XorRanker> {
    transport: Arc<T>,
    ranker: R,
    relays: Vec<RelayPeer>,
    /// Bare ids of `relays`, in the same order. Ranking only needs ids.
    relay_ids: Vec<PeerId>,
    protocol: Vec<u8>,
    max_message_size: usize,
    replication_factor: usize,
    attempt_timeout: Option<Duration>,
    policy: ReplicationPolicy,
}

impl<T: RelayTransport> Proxy<T, XorRanker> {
    /// Build a proxy with default settings and XOR proximity ranking.
    ///
    /// An empty relay set is accepted; every dispatch on such a proxy fails
    /// with [`ProxyError::NoRelays`].
    pub fn new(transport: T, relays: &[RelayPeer]) -> Self {
        Self::from_parts(
            Arc::new(transport),
            XorRanker,
            relays,
            SNR_ALPN.to_vec(),
            MAX_MESSAGE_SIZE,
            DEFAULT_REPLICATION_FACTOR,
            None,
            ReplicationPolicy::LastResult,
        )
    }

    /// Build a proxy from a validated [`ProxyConfig`], relays included.
    ///
    /// The relay set is `config.relays`, turned into descriptors with
    /// [`ProxyConfig::relay_peers`].
    pub fn from_config(transport: T, config: &ProxyConfig) -> Result<Self, ProxyError> {
        let relays = config.relay_peers()?;
        Self::with_config(transport, &relays, config)
    }

    /// Build a proxy from a validated [`ProxyConfig`] and an explicit relay set.
    ///
    /// `config.relays` is ignored; `relays` is used as given. This suits
    /// transports whose relay descriptors are not iroh endpoint addresses.
    pub fn with_config(
        transport: T,
        relays: &[RelayPeer],
        config: &ProxyConfig,
    ) -> Result<Self, ProxyError> {
        config.validate()?;
        Ok(Self::from_parts(
            Arc::new(transport),
            XorRanker,
            relays,
            config.protocol.as_bytes().to_vec(),
            config.max_message_size,
            config.replication_factor,
            config.attempt_timeout_duration(),
            config.replication_policy(),
        ))
    }
}

impl<T: RelayTransport, R: PeerRanker> Proxy<T, R> {
    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        transport: Arc<T>,
        ranker: R,
        relays: &[RelayPeer],
        protocol: Vec<u8>,
        max_message_size: usize,
        replication_factor: usize,
        attempt_timeout: Option<Duration>,
        policy: ReplicationPolicy,
    ) -> Self {
        let relays = relays.to_vec();
        let relay_ids = relays.iter().map(|relay| relay.id).collect();
        Self {
            transport,
            ranker,
            relays,
            relay_ids,
            protocol,
            max_message_size,
            replication_factor,
            attempt_timeout,
            policy,
        }
    }

    /// Replace the proximity ranking.
    pub fn with_ranker<R2: PeerRanker>(self, ranker: R2) -> Proxy<T, R2> {
        Proxy {
            transport: self.transport,
            ranker,
            relays: self.relays,
            relay_ids: self.relay_ids,
            protocol: self.protocol,
            max_message_size: self.max_message_size,
            replication_factor: self.replication_factor,
            attempt_timeout: self.attempt_timeout,
            policy: self.policy,
        }
    }

    pub fn relays(&self) -> &[RelayPeer] {
        &self.relays
    }

    pub fn protocol(&self) -> &[u8] {
        &self.protocol
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect to every configured relay once, in configuration order.
    ///
    /// Failures are skipped. This is a warm-up, not a readiness check: it
    /// never fails and returns how many relays were reached. Cancellation
    /// stops the warm-up early.
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> usize {
        let mut reached = Vec::new();
        for relay in &self.relays {
            if cancel.is_cancelled() {
                break;
            }
            let connect = async {
                self.transport
                    .connect(relay)
                    .await
                    .map_err(|source| ProxyError::Connect {
                        peer: relay.id,
                        source,
                    })
            };
            match self.run_attempt(cancel, &relay.id, connect).await {
                Ok(()) => reached.push(short_id(&relay.id)),
                Err(err) => debug!(peer = %short_id(&relay.id), "bootstrap connect failed: {err}"),
            }
        }

        if reached.is_empty() {
            warn!(
                configured = self.relays.len(),
                "unable to bootstrap to any supernode routers"
            );
        } else {
            info!(
                configured = self.relays.len(),
                "bootstrapped to {} supernode routers: {:?}",
                reached.len(),
                reached
            );
        }
        reached.len()
    }

    /// Reject a stream opened by a peer that wants to route through us.
    ///
    /// See [`crate::server::reject_stream`].
    pub async fn handle_stream<S>(&self, remote: impl Display, stream: S)
    where
        S: AsyncWrite + Unpin,
    {
        crate::server::reject_stream(remote, stream).await;
    }

    /// Deliver `msg` to as many relays as its operation requires.
    ///
    /// Relays are tried closest-first by proximity to `msg.key`. A read is done
    /// after one relay accepts it; a write keeps going until
    /// `replication_factor` relays accepted it. If the relay set runs out
    /// first, the outcome depends on the replication policy: by default the
    /// last attempt's result is returned, which means a write that reached
    /// fewer relays than required still reports success when the last relay
    /// tried accepted it.
    pub async fn send_message(
        &self,
        cancel: &CancellationToken,
        msg: &RoutingMessage,
    ) -> Result<(), ProxyError> {
        let ranked = self.ranked(&msg.key)?;
        let required = self.required_successes(msg.kind);

        let mut successes = 0;
        let mut last: Result<(), ProxyError> = Err(ProxyError::NoRelays);
        for peer in ranked {
            if cancel.is_cancelled() {
                return Err(ProxyError::Cancelled);
            }
            let span = debug_span!(
                "send_routing_message",
                peer = %short_id(&peer),
                kind = ?msg.kind,
                request = ?msg,
            );
            let attempt = async {
                let relay = self.relay(&peer)?;
                self.deliver(relay, msg).await
            };
            match self
                .run_attempt(cancel, &peer, attempt)
                .instrument(span)
                .await
            {
                Ok(()) => {
                    successes += 1;
                    last = Ok(());
                    if successes >= required {
                        return Ok(());
                    }
                }
                Err(ProxyError::Cancelled) => return Err(ProxyError::Cancelled),
                Err(err) => {
                    debug!(peer = %short_id(&peer), kind = ?msg.kind, "relay attempt failed: {err}");
                    last = Err(err);
                }
            }
        }

        debug!(kind = ?msg.kind, successes, required, "relay set exhausted");
        match self.policy {
            ReplicationPolicy::LastResult => last,
            ReplicationPolicy::Strict if successes == 0 => last,
            ReplicationPolicy::Strict => Err(ProxyError::Replication {
                achieved: successes,
                required,
            }),
        }
    }

    /// Send `msg` to relays closest-first and return the first well-formed
    /// response. If every relay fails, the last relay's error is returned.
    pub async fn send_request(
        &self,
        cancel: &CancellationToken,
        msg: &RoutingMessage,
    ) -> Result<RoutingMessage, ProxyError> {
        let ranked = self.ranked(&msg.key)?;

        let mut last = ProxyError::NoRelays;
        for peer in ranked {
            if cancel.is_cancelled() {
                return Err(ProxyError::Cancelled);
            }
            let span = debug_span!(
                "send_routing_request",
                peer = %short_id(&peer),
                kind = ?msg.kind,
                request = ?msg,
            );
            let attempt = async {
                let relay = self.relay(&peer)?;
                self.request(relay, msg).await
            };
            match self
                .run_attempt(cancel, &peer, attempt)
                .instrument(span)
                .await
            {
                Ok(response) => return Ok(response),
                Err(ProxyError::Cancelled) => return Err(ProxyError::Cancelled),
                Err(err) => {
                    debug!(peer = %short_id(&peer), kind = ?msg.kind, "relay request failed: {err}");
                    last = err;
                }
            }
        }
        Err(last)
    }

    fn ranked(&self, key: &[u8]) -> Result<Vec<PeerId>, ProxyError> {
        if self.relay_ids.is_empty() {
            return Err(ProxyError::NoRelays);
        }
        Ok(self.ranker.rank(&self.relay_ids, key))
    }

    fn relay(&self, peer: &PeerId) -> Result<&RelayPeer, ProxyError> {
        self.relays
            .iter()
            .find(|relay| relay.id == *peer)
            .ok_or(ProxyError::UnknownRelay { peer: *peer })
    }

    fn required_successes(&self, kind: MessageType) -> usize {
        match kind.class() {
            OperationClass::Read => 1,
            OperationClass::Write => self.replication_factor,
        }
    }

    /// Run one relay attempt under the call's cancellation token and the
    /// per-attempt deadline. Dropping `attempt` releases any stream it holds.
    async fn run_attempt<O, F>(
        &self,
        cancel: &CancellationToken,
        peer: &PeerId,
        attempt: F,
    ) -> Result<O, ProxyError>
    where
        F: Future<Output = Result<O, ProxyError>>,
    {
        let bounded = async {
            match self.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, attempt)
                    .await
                    .map_err(|_| ProxyError::Timeout { peer: *peer })?,
                None => attempt.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProxyError::Cancelled),
            res = bounded => res,
        }
    }

    async fn open(&self, relay: &RelayPeer) -> Result<T::Stream, ProxyError> {
        self.transport
            .connect(relay)
            .await
            .map_err(|source| ProxyError::Connect {
                peer: relay.id,
                source,
            })?;
        self.transport
            .open_stream(&relay.id, &self.protocol)
            .await
            .map_err(|source| ProxyError::OpenStream {
                peer: relay.id,
                source,
            })
    }

    async fn deliver(&self, relay: &RelayPeer, msg: &RoutingMessage) -> Result<(), ProxyError> {
        let mut stream = self.open(relay).await?;
        let result = write_message(&mut stream, msg, self.max_message_size)
            .await
            .map_err(|err| ProxyError::Write {
                peer: relay.id,
                source: err.into(),
            });
        close(&mut stream).await;
        result
    }

    async fn request(
        &self,
        relay: &RelayPeer,
        msg: &RoutingMessage,
    ) -> Result<RoutingMessage, ProxyError> {
        let mut stream = self.open(relay).await?;
        let result = self.exchange(&mut stream, relay, msg).await;
        close(&mut stream).await;
        result
    }

    async fn exchange(
        &self,
        stream: &mut T::Stream,
        relay: &RelayPeer,
        msg: &RoutingMessage,
    ) -> Result<RoutingMessage, ProxyError> {
        write_message(stream, msg, self.max_message_size)
            .await
            .map_err(|err| ProxyError::Write {
                peer: relay.id,
                source: err.into(),
            })?;

        match read_message(stream, self.max_message_size).await {
            Ok(Some(response)) => {
                debug!(response = ?response, "relay answered");
                Ok(response)
            }
            Ok(None) => Err(ProxyError::NoResponse { peer: relay.id }),
            Err(err) => Err(ProxyError::Read {
                peer: relay.id,
                source: err.into(),
            }),
        }
    }
}

/// Close our side of a stream, ignoring errors from a peer that already went away.
async fn close<S: AsyncWrite + Unpin>(stream: &mut S) {
    if let Err(err) = stream.shutdown().await {
        debug!("closing relay stream failed: {err}");
    }
}
