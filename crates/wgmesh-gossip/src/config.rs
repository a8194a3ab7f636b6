//! Gossip engine configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Port the gossip transport binds to on the mesh IP.
pub const GOSSIP_PORT: u16 = 5353;

/// Maximum size of a user-event payload in bytes.
pub const USER_EVENT_SIZE_LIMIT: usize = 512;

/// Maximum size of a request/response-style user-event packet in bytes.
pub const QUERY_SIZE_LIMIT: usize = 1024;

/// Gossip engine configuration.
///
/// The timing constants are fixed by the mesh design; tests shrink them to
/// keep suites fast. `lan()` and `wan()` select the probe profile.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// This node's name, unique within the mesh.
    pub node_name: String,

    /// Address the UDP transport binds to (mesh IP, port 5353).
    pub bind_addr: SocketAddr,

    /// Optional 32-byte symmetric key; when set, every datagram is sealed
    /// with ChaCha20-Poly1305.
    pub encryption_key: Option<[u8; 32]>,

    /// Tags published for this node at start.
    pub tags: HashMap<String, String>,

    /// Interval of the failure-detector probe tick.
    pub probe_interval: Duration,

    /// Time to wait for a probe acknowledgement before suspecting a member.
    pub probe_timeout: Duration,

    /// Time a member may stay suspect before being declared failed.
    pub suspicion_timeout: Duration,

    /// How often the reaper runs and how long failed/left members linger
    /// before a reap is forced in test configurations.
    pub reap_interval: Duration,

    /// Delay after broadcasting a leave intent before `leave()` returns.
    pub leave_propagate_delay: Duration,

    /// Upper bound on a user-event broadcast fan-out.
    pub broadcast_timeout: Duration,

    /// Window in which a fail-then-rejoin is logged as flapping.
    pub flap_timeout: Duration,

    /// How long a reaped member's name stays tombstoned against stale
    /// digests.
    pub tombstone_timeout: Duration,

    /// How long failed members are retained (and re-probed) before reaping.
    pub reconnect_timeout: Duration,

    /// Interval for re-probing failed members.
    pub reconnect_interval: Duration,

    /// How long join/leave intents for not-yet-known members are remembered.
    pub recent_intent_timeout: Duration,

    /// Capacity of the outbound event channel.
    pub event_buffer: usize,

    /// Maximum accepted size of an incoming user-event packet.
    pub query_size_limit: usize,
}

impl GossipConfig {
    /// WAN-profile configuration (the default mode).
    pub fn new(node_name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            node_name: node_name.into(),
            bind_addr,
            encryption_key: None,
            tags: HashMap::new(),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(3),
            suspicion_timeout: Duration::from_secs(6),
            reap_interval: Duration::from_secs(15),
            leave_propagate_delay: Duration::from_secs(1),
            broadcast_timeout: Duration::from_secs(5),
            flap_timeout: Duration::from_secs(60),
            tombstone_timeout: Duration::from_secs(24 * 60 * 60),
            reconnect_timeout: Duration::from_secs(24 * 60 * 60),
            reconnect_interval: Duration::from_secs(30),
            recent_intent_timeout: Duration::from_secs(5 * 60),
            event_buffer: 512,
            query_size_limit: QUERY_SIZE_LIMIT,
        }
    }

    /// Switch to the LAN probe profile (tighter timeouts).
    pub fn lan(mut self) -> Self {
        self.probe_timeout = Duration::from_millis(500);
        self.suspicion_timeout = Duration::from_secs(2);
        self
    }

    /// Set the symmetric encryption key.
    pub fn with_encryption_key(mut self, key: [u8; 32]) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Set the initial tag map.
    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wan_profile_defaults() {
        let cfg = GossipConfig::new("n1", "127.0.0.1:5353".parse().unwrap());
        assert_eq!(cfg.reap_interval, Duration::from_secs(15));
        assert_eq!(cfg.flap_timeout, Duration::from_secs(60));
        assert_eq!(cfg.probe_timeout, Duration::from_secs(3));
        assert_eq!(cfg.query_size_limit, 1024);
    }

    #[test]
    fn test_lan_profile_tightens_probes() {
        let cfg = GossipConfig::new("n1", "127.0.0.1:5353".parse().unwrap()).lan();
        assert_eq!(cfg.probe_timeout, Duration::from_millis(500));
        assert!(cfg.suspicion_timeout < Duration::from_secs(6));
    }
}
