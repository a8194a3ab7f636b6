//! User-event payloads carried over gossip.
//!
//! All payloads are bincode-encoded and bounded by the gossip user-event
//! size limit. The JOIN announcement is the authoritative signal for peer
//! installation; membership events are the authoritative signal for peer
//! removal.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use wgmesh_overlay::PeerSpec;

/// Gossip user-event names.
pub mod events {
    /// JOIN announcement, broadcast by the bootstrap after a successful
    /// join RPC.
    pub const JOIN: &str = "_j";
    /// RTT probe request.
    pub const RTT_REQUEST: &str = "_rtt0";
    /// RTT probe response.
    pub const RTT_RESPONSE: &str = "_rtt1";
}

/// Reserved metadata tags published via gossip, one set per node.
pub mod tags {
    /// Node role: `b` for bootstrap, `n` for member.
    pub const NODE_TYPE: &str = "_t";
    /// WireGuard public key.
    pub const PUBKEY: &str = "_pk";
    /// External endpoint IP.
    pub const ADDR: &str = "_addr";
    /// External endpoint port.
    pub const PORT: &str = "_port";
    /// Mesh IP.
    pub const MESH_IP: &str = "_i";

    /// `_t` value of the bootstrap node.
    pub const TYPE_BOOTSTRAP: &str = "b";
    /// `_t` value of every other node.
    pub const TYPE_MEMBER: &str = "n";
}

/// Kind discriminator of a peer announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnouncementKind {
    Join,
    Leave,
}

/// A peer announcement, broadcast as the `_j` user event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub kind: AnnouncementKind,
    pub pubkey: String,
    pub endpoint_ip: IpAddr,
    pub endpoint_port: u16,
    pub mesh_ip: Ipv4Addr,
}

impl PeerAnnouncement {
    /// The tunnel peer entry this announcement describes.
    pub fn to_peer_spec(&self) -> PeerSpec {
        PeerSpec {
            public_key: self.pubkey.clone(),
            endpoint_ip: self.endpoint_ip,
            endpoint_port: self.endpoint_port,
            mesh_ip: self.mesh_ip,
        }
    }
}

/// Payload of the `_rtt0` request event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RttRequest {
    pub requested_by: String,
}

/// One member's distance estimate inside an RTT response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RttEntry {
    pub node: String,
    pub rtt_msec: i32,
}

/// Payload of the `_rtt1` response event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RttResponse {
    pub node: String,
    pub rtts: Vec<RttEntry>,
}

/// Encode a payload with bincode.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    wgmesh_gossip::message::encode_payload(value)
}

/// Decode a payload with the size bound enforced.
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    wgmesh_gossip::message::decode_payload(bytes)
}
