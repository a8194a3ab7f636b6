//! Gossip wire format.
//!
//! Packets are bincode-encoded and, when the mesh carries an encryption
//! key, sealed as a whole with ChaCha20-Poly1305. Deserialization is size
//! bounded.

use std::collections::HashMap;
use std::net::SocketAddr;

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::member::MemberStatus;

/// Maximum accepted size of a decoded packet. Large enough for a full state
/// sync of a sizeable mesh, small enough to bound memory per datagram.
pub const MAX_PACKET_SIZE: u64 = 64 * 1024;

/// Node state carried in digests and syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    /// Node name.
    pub name: String,
    /// Gossip transport address.
    pub addr: SocketAddr,
    /// Incarnation number; higher wins on merge.
    pub incarnation: u64,
    /// Status as known by the sender.
    pub status: MemberStatus,
    /// Tag map as known by the sender.
    pub tags: HashMap<String, String>,
}

/// Wire packets exchanged between gossip peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    /// Failure-detector probe.
    Ping { seq: u64, from: NodeState },

    /// Probe acknowledgement, piggybacking the sender's member digest.
    Ack {
        seq: u64,
        from: NodeState,
        members: Vec<NodeState>,
    },

    /// Full state push. `reply` asks the receiver to sync back once.
    Sync {
        from: NodeState,
        members: Vec<NodeState>,
        reply: bool,
    },

    /// User-event broadcast, deduplicated by `(origin, seq)`.
    User {
        origin: String,
        seq: u64,
        name: String,
        payload: Vec<u8>,
    },

    /// Graceful-leave intent.
    Leave { name: String, incarnation: u64 },
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_PACKET_SIZE)
        .with_fixint_encoding()
}

/// Encode a packet.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

/// Decode a packet with the size bound enforced.
pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
    bincode_options().deserialize(bytes)
}

/// Bounded deserialization for user-event payloads carried inside packets.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode_options().deserialize(bytes)
}

/// Encode a user-event payload struct.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeState {
        NodeState {
            name: name.into(),
            addr: "127.0.0.1:5353".parse().unwrap(),
            incarnation: 1,
            status: MemberStatus::Alive,
            tags: HashMap::from([("_pk".into(), "abc".into())]),
        }
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet::Ack {
            seq: 42,
            from: node("a"),
            members: vec![node("a"), node("b")],
        };
        let bytes = encode(&packet).unwrap();
        match decode(&bytes).unwrap() {
            Packet::Ack { seq, from, members } => {
                assert_eq!(seq, 42);
                assert_eq!(from.name, "a");
                assert_eq!(members.len(), 2);
                assert_eq!(members[1].name, "b");
            }
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&[0xff; 16]).is_err());
    }

    #[test]
    fn test_user_packet_preserves_payload() {
        let packet = Packet::User {
            origin: "a".into(),
            seq: 7,
            name: "_j".into(),
            payload: vec![1, 2, 3],
        };
        let bytes = encode(&packet).unwrap();
        match decode(&bytes).unwrap() {
            Packet::User { payload, name, .. } => {
                assert_eq!(name, "_j");
                assert_eq!(payload, vec![1, 2, 3]);
            }
            other => panic!("wrong packet: {:?}", other),
        }
    }
}
