//! Routing message definitions.
//!
//! This module defines the structured message exchanged with relay peers. The
//! proxy only ever reads two fields: [`RoutingMessage::kind`] (to decide how many
//! relays must accept the message) and [`RoutingMessage::key`] (to rank relays).
//! Everything else is passed through untouched.

use serde::{Deserialize, Serialize};

/// The DHT operation a message carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    PutValue,
    #[default]
    GetValue,
    AddProvider,
    GetProviders,
    FindNode,
    Ping,
}

/// Whether an operation mutates remote state.
///
/// Writes must be accepted by several relays before they count as durable;
/// reads are satisfied by a single relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationClass {
    Read,
    Write,
}

impl MessageType {
    pub fn class(self) -> OperationClass {
        match self {
            MessageType::PutValue | MessageType::AddProvider => OperationClass::Write,
            MessageType::GetValue
            | MessageType::GetProviders
            | MessageType::FindNode
            | MessageType::Ping => OperationClass::Read,
        }
    }
}

/// A stored DHT record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_received: Option<String>,
}

/// A peer reference carried in `closer_peers` / `provider_peers`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: Vec<u8>,
    #[serde(default)]
    pub addrs: Vec<String>,
}

/// A routing request or response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMessage {
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub closer_peers: Vec<PeerInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_peers: Vec<PeerInfo>,
    #[serde(default)]
    pub cluster_level: i32,
}

impl RoutingMessage {
    pub fn new(kind: MessageType, key: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_provider_peers(mut self, peers: Vec<PeerInfo>) -> Self {
        self.provider_peers = peers;
        self
    }

    pub fn with_closer_peers(mut self, peers: Vec<PeerInfo>) -> Self {
        self.closer_peers = peers;
        self
    }
}
