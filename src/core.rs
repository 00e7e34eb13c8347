//! Core identity and ranking primitives for the routing proxy.
//!
//! - **Identity & Hashing**: [`PeerId`], [`NodeId`], [`derive_node_id`], [`routing_target`]
//! - **Distance Metrics**: [`xor_distance`] for Kademlia-style proximity
//! - **Relays**: [`RelayPeer`], the immutable descriptor of a supernode
//! - **Ranking**: the [`PeerRanker`] seam and its default [`XorRanker`]

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// The 32-byte public identity of a relay peer (an iroh endpoint id).
pub type PeerId = [u8; 32];

/// A 256-bit position in the DHT keyspace.
///
/// Both peers and routing keys are mapped into this space with BLAKE3 before
/// distances are compared, so that arbitrary-length keys rank uniformly.
pub type NodeId = [u8; 32];

// ============================================================================
// Hashing Functions
// ============================================================================

/// Compute a 32-byte BLAKE3 digest of the input data.
fn blake3_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = iroh_blake3::Hasher::new();
    hasher.update(data);
    let digest = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_bytes());
    out
}

/// Derive the keyspace position of a peer from its identity bytes.
///
/// ```
/// use iroh_snr::derive_node_id;
///
/// let node_id = derive_node_id(b"example-public-key-bytes");
/// assert_eq!(node_id.len(), 32);
/// ```
pub fn derive_node_id(data: &[u8]) -> NodeId {
    blake3_digest(data)
}

/// Convert a routing key into the keyspace target that peers are ranked against.
///
/// ```
/// use iroh_snr::routing_target;
///
/// assert_eq!(routing_target(b"/pk/abc"), routing_target(b"/pk/abc"));
/// assert_ne!(routing_target(b"/pk/abc"), routing_target(b"/pk/abd"));
/// ```
pub fn routing_target(key: &[u8]) -> NodeId {
    blake3_digest(key)
}

// ============================================================================
// Distance Metrics
// ============================================================================

/// Compute the XOR distance between two keyspace positions.
///
/// # Properties
/// - `xor_distance(a, a) == [0; 32]` (reflexive)
/// - `xor_distance(a, b) == xor_distance(b, a)` (symmetric)
pub fn xor_distance(a: &NodeId, b: &NodeId) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Compare two XOR distances lexicographically.
fn distance_cmp(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    for i in 0..32 {
        if a[i] < b[i] {
            return Ordering::Less;
        } else if a[i] > b[i] {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

// ============================================================================
// Relay Descriptors
// ============================================================================

/// A trusted, well-connected peer that performs DHT operations on our behalf.
///
/// `addr` is the transport-specific address bundle for the peer. For the iroh
/// transport this is a JSON-serialized `EndpointAddr`, which carries the relay
/// URL and every known direct address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayPeer {
    pub id: PeerId,
    pub addr: String,
}

impl RelayPeer {
    pub fn new(id: PeerId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

impl fmt::Debug for RelayPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayPeer")
            .field("id", &short_id(&self.id))
            .field("addr", &self.addr)
            .finish()
    }
}

/// Abbreviated hex form of a peer id for log output.
pub fn short_id(id: &PeerId) -> String {
    hex::encode(&id[..5])
}

// ============================================================================
// Ranking
// ============================================================================

/// Orders candidate peers by proximity to a routing key, closest first.
///
/// Implementations must be deterministic for a fixed input set: the proxy
/// walks candidates in exactly the order returned here.
pub trait PeerRanker: Send + Sync + 'static {
    fn rank(&self, peers: &[PeerId], key: &[u8]) -> Vec<PeerId>;
}

/// Kademlia ranking: ascending XOR distance between `BLAKE3(peer)` and `BLAKE3(key)`.
///
/// Equal distances (only possible for duplicate ids) keep a stable order by
/// raw id bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct XorRanker;

impl PeerRanker for XorRanker {
    fn rank(&self, peers: &[PeerId], key: &[u8]) -> Vec<PeerId> {
        let target = routing_target(key);
        let mut scored: Vec<([u8; 32], PeerId)> = peers
            .iter()
            .map(|peer| (xor_distance(&derive_node_id(peer), &target), *peer))
            .collect();
        scored.sort_by(|a, b| distance_cmp(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));
        scored.into_iter().map(|(_, peer)| peer).collect()
    }
}
