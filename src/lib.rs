//! # Iroh SNR
//!
//! Supernode routing for lightweight nodes. Instead of joining the DHT routing
//! mesh, a client node hands every routing operation (value lookup, value
//! storage, provider advertisement, provider lookup) to a small, fixed set of
//! trusted relay peers reached over the [`iroh`](https://crates.io/crates/iroh)
//! transport stack.
//!
//! The crate is split into a handful of modules:
//!
//! - [`core`]: relay descriptors, keyspace hashing, XOR distance, and the
//!   [`PeerRanker`] used to order relays for a given key.
//! - [`proxy`]: the [`Proxy`] itself: bootstrap, one-way dispatch with
//!   replication accounting, and request/response dispatch with failover.
//! - [`protocol`]: the serialisable [`RoutingMessage`] exchanged with relays.
//! - [`framing`]: length-prefixed frames with a bounded frame size.
//! - [`net`]: an [`iroh`] based [`RelayTransport`] implementation.
//! - [`server`]: the inbound handler that refuses to route for other peers.
//! - [`config`]: [`ProxyConfig`], loadable from JSON.
//!
//! ## Getting started
//!
//! ```no_run
//! use anyhow::Result;
//! use iroh::{Endpoint, EndpointAddr};
//! use iroh_snr::{relay_peer, IrohTransport, MessageType, Proxy, RoutingMessage, SNR_ALPN};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn launch(endpoint: Endpoint, supernodes: Vec<EndpointAddr>) -> Result<()> {
//! let relays = supernodes.iter().map(relay_peer).collect::<Result<Vec<_>>>()?;
//! let proxy = Proxy::new(IrohTransport::new(endpoint, SNR_ALPN), &relays);
//!
//! let cancel = CancellationToken::new();
//! proxy.bootstrap(&cancel).await;
//! let reply = proxy
//!     .send_request(&cancel, &RoutingMessage::new(MessageType::GetValue, b"/pk/abc".to_vec()))
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
//!
//! The binary in `src/main.rs` wires these pieces together into a small
//! command line client.

pub mod config;
pub mod core;
pub mod error;
pub mod framing;
pub mod net;
pub mod protocol;
pub mod proxy;
pub mod server;

pub use crate::config::{ProxyConfig, ReplicationPolicy, DEFAULT_REPLICATION_FACTOR};
pub use crate::core::{
    derive_node_id, routing_target, xor_distance, NodeId, PeerId, PeerRanker, RelayPeer, XorRanker,
};
pub use crate::error::ProxyError;
pub use crate::framing::{FrameError, MAX_MESSAGE_SIZE};
pub use crate::net::{relay_peer, IrohTransport, SNR_ALPN};
pub use crate::protocol::{MessageType, OperationClass, PeerInfo, Record, RoutingMessage};
pub use crate::proxy::{Proxy, RelayTransport};
pub use crate::server::{reject_stream, RejectingHandler};
