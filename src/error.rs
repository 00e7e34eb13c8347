use crate::core::{short_id, PeerId};

/// Errors returned by the routing proxy.
///
/// Per-candidate variants carry the relay they came from. The proxy absorbs
/// them while it still has candidates left and surfaces the last one when the
/// relay set is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("connection to relay {} failed: {source}", short_id(.peer))]
    Connect {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("opening stream to relay {} failed: {source}", short_id(.peer))]
    OpenStream {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("writing request to relay {} failed: {source}", short_id(.peer))]
    Write {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("reading response from relay {} failed: {source}", short_id(.peer))]
    Read {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("no response to request from relay {}", short_id(.peer))]
    NoResponse { peer: PeerId },

    #[error("attempt on relay {} timed out", short_id(.peer))]
    Timeout { peer: PeerId },

    #[error("relay {} is not part of the configured relay set", short_id(.peer))]
    UnknownRelay { peer: PeerId },

    #[error("no relays configured")]
    NoRelays,

    #[error("operation cancelled")]
    Cancelled,

    #[error("write replicated to {achieved} of {required} relays")]
    Replication { achieved: usize, required: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// True for failures scoped to a single relay attempt.
    pub fn is_candidate_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::Connect { .. }
                | ProxyError::OpenStream { .. }
                | ProxyError::Write { .. }
                | ProxyError::Read { .. }
                | ProxyError::NoResponse { .. }
                | ProxyError::Timeout { .. }
                | ProxyError::UnknownRelay { .. }
        )
    }

    /// The relay a per-candidate failure came from, if any.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            ProxyError::Connect { peer, .. }
            | ProxyError::OpenStream { peer, .. }
            | ProxyError::Write { peer, .. }
            | ProxyError::Read { peer, .. }
            | ProxyError::NoResponse { peer }
            | ProxyError::Timeout { peer }
            | ProxyError::UnknownRelay { peer } => Some(peer),
            _ => None,
        }
    }
}
