//! Node state.
//!
//! [`MeshNode`] is the single top-level value owning every process-wide
//! handle: the gossip engine, the tunnel wrapper and the shared runtime
//! state the agent and exporter read. It is threaded as an `Arc` into the
//! event router, both RPC servers and the periodic tasks.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use ipnet::Ipv4Net;
use tokio::sync::mpsc;
use tracing::debug;
use wgmesh_gossip::{Event, Gossip, GossipConfig, GossipHandle, Member, GOSSIP_PORT};
use wgmesh_overlay::{MeshIpAllocator, Tunnel};

use crate::error::Result;
use crate::payload::{tags, RttResponse};

/// Parameters for bringing up a node.
#[derive(Debug, Clone)]
pub struct NodeParams {
    pub mesh_name: String,
    /// Empty means: derive from the mesh IP.
    pub node_name: String,
    pub cidr: Ipv4Net,
    pub ipam: Option<Ipv4Net>,
    pub mesh_ip: Ipv4Addr,
    /// External tunnel endpoint.
    pub endpoint_ip: IpAddr,
    pub endpoint_port: u16,
    pub is_bootstrap: bool,
    pub lan_mode: bool,
    pub dev_mode: bool,
    pub gossip_key: Option<[u8; 32]>,
    /// Gossip bind address override; `None` binds `mesh_ip:5353`.
    pub gossip_bind: Option<SocketAddr>,
}

struct Shared {
    creation_ts: i64,
    join_ts: i64,
    last_updated: i64,
    change_seq: u64,
    observers: HashMap<String, mpsc::Sender<()>>,
    rtt_tx: Option<mpsc::Sender<RttResponse>>,
    /// Addresses handed out by the join RPC whose owners may not have
    /// appeared in gossip yet. Released when the member is removed.
    leased: HashSet<Ipv4Addr>,
}

/// A running mesh node.
pub struct MeshNode {
    pub mesh_name: String,
    pub node_name: String,
    pub cidr: Ipv4Net,
    pub mesh_ip: Ipv4Addr,
    pub endpoint_ip: IpAddr,
    pub endpoint_port: u16,
    pub is_bootstrap: bool,
    pub lan_mode: bool,
    pub dev_mode: bool,
    pub gossip_key: Option<[u8; 32]>,

    pub gossip: GossipHandle,
    pub tunnel: Arc<dyn Tunnel>,

    /// Present on the bootstrap only.
    pub allocator: Option<MeshIpAllocator>,

    /// Serializes allocate → install-peer → broadcast on the join path.
    pub join_lock: tokio::sync::Mutex<()>,

    shared: Mutex<Shared>,
}

impl MeshNode {
    /// Derive a node name from the mesh name and a mesh IP, e.g. mesh `X`
    /// with IP `10.232.1.1` becomes `X0AE80101`.
    pub fn derive_node_name(mesh_name: &str, mesh_ip: Ipv4Addr) -> String {
        format!("{}{:08X}", mesh_name, u32::from(mesh_ip))
    }

    /// The reserved metadata tags this node publishes.
    pub fn reserved_tags(params: &NodeParams, pubkey: &str) -> HashMap<String, String> {
        HashMap::from([
            (
                tags::NODE_TYPE.to_string(),
                if params.is_bootstrap {
                    tags::TYPE_BOOTSTRAP.to_string()
                } else {
                    tags::TYPE_MEMBER.to_string()
                },
            ),
            (tags::PUBKEY.to_string(), pubkey.to_string()),
            (tags::ADDR.to_string(), params.endpoint_ip.to_string()),
            (tags::PORT.to_string(), params.endpoint_port.to_string()),
            (tags::MESH_IP.to_string(), params.mesh_ip.to_string()),
        ])
    }

    /// Start the gossip engine and assemble the node.
    ///
    /// Returns the node and the gossip event channel for the router.
    pub async fn start(
        params: NodeParams,
        tunnel: Arc<dyn Tunnel>,
        pubkey: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Event>)> {
        let node_name = if params.node_name.is_empty() {
            Self::derive_node_name(&params.mesh_name, params.mesh_ip)
        } else {
            params.node_name.clone()
        };

        let bind = params
            .gossip_bind
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(params.mesh_ip), GOSSIP_PORT));

        let mut gossip_cfg = GossipConfig::new(node_name.clone(), bind)
            .with_tags(Self::reserved_tags(&params, pubkey));
        if params.lan_mode {
            gossip_cfg = gossip_cfg.lan();
        }
        if let Some(key) = params.gossip_key {
            gossip_cfg = gossip_cfg.with_encryption_key(key);
        }

        let (gossip, events) = Gossip::start(gossip_cfg).await?;

        let allocator = if params.is_bootstrap {
            Some(MeshIpAllocator::new(params.cidr, params.ipam)?)
        } else {
            None
        };

        let now = unix_now();
        let node = Arc::new(Self {
            mesh_name: params.mesh_name,
            node_name,
            cidr: params.cidr,
            mesh_ip: params.mesh_ip,
            endpoint_ip: params.endpoint_ip,
            endpoint_port: params.endpoint_port,
            is_bootstrap: params.is_bootstrap,
            lan_mode: params.lan_mode,
            dev_mode: params.dev_mode,
            gossip_key: params.gossip_key,
            gossip,
            tunnel,
            allocator,
            join_lock: tokio::sync::Mutex::new(()),
            shared: Mutex::new(Shared {
                creation_ts: now,
                join_ts: now,
                last_updated: now,
                change_seq: 1,
                observers: HashMap::new(),
                rtt_tx: None,
                leased: HashSet::new(),
            }),
        });

        Ok((node, events))
    }

    // -------------------------------------------------------------------
    // Timestamps and change tracking
    // -------------------------------------------------------------------

    /// Set the mesh creation and node join timestamps (after a join RPC).
    pub fn set_timestamps(&self, creation_ts: i64, join_ts: i64) {
        let mut shared = self.shared.lock().unwrap();
        shared.creation_ts = creation_ts;
        shared.join_ts = join_ts;
    }

    /// Mesh creation and node join timestamps as Unix seconds.
    pub fn timestamps(&self) -> (i64, i64) {
        let shared = self.shared.lock().unwrap();
        (shared.creation_ts, shared.join_ts)
    }

    /// Record a membership change: bumps the change sequence and the
    /// last-updated timestamp read by the snapshot exporter.
    pub fn note_change(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.change_seq += 1;
        shared.last_updated = unix_now();
    }

    /// Current `(change_seq, last_updated)` pair.
    pub fn change_state(&self) -> (u64, i64) {
        let shared = self.shared.lock().unwrap();
        (shared.change_seq, shared.last_updated)
    }

    // -------------------------------------------------------------------
    // Observers (agent WaitForChange)
    // -------------------------------------------------------------------

    /// Register an observer channel under an opaque key.
    pub fn register_observer(&self, key: impl Into<String>, tx: mpsc::Sender<()>) {
        self.shared.lock().unwrap().observers.insert(key.into(), tx);
    }

    /// Remove an observer channel.
    pub fn deregister_observer(&self, key: &str) {
        self.shared.lock().unwrap().observers.remove(key);
    }

    /// Fan an event notification out to every observer. Non-blocking: an
    /// observer that would block just misses this event.
    pub fn notify_observers(&self) {
        let shared = self.shared.lock().unwrap();
        for (key, tx) in shared.observers.iter() {
            if tx.try_send(()).is_err() {
                debug!(observer = %key, "observer channel full, dropping notification");
            }
        }
    }

    // -------------------------------------------------------------------
    // RTT response channel
    // -------------------------------------------------------------------

    /// Install the channel `_rtt1` responses are forwarded to.
    pub fn set_rtt_channel(&self, tx: mpsc::Sender<RttResponse>) {
        self.shared.lock().unwrap().rtt_tx = Some(tx);
    }

    /// Remove the RTT response channel.
    pub fn clear_rtt_channel(&self) {
        self.shared.lock().unwrap().rtt_tx = None;
    }

    /// Forward an RTT response to the registered channel, if any.
    pub fn forward_rtt_response(&self, resp: RttResponse) {
        let shared = self.shared.lock().unwrap();
        if let Some(tx) = &shared.rtt_tx {
            if tx.try_send(resp).is_err() {
                debug!("rtt response channel full, dropping response");
            }
        }
    }

    // -------------------------------------------------------------------
    // Member views
    // -------------------------------------------------------------------

    /// Record an address lease handed out by the join RPC.
    pub fn lease_ip(&self, ip: Ipv4Addr) {
        self.shared.lock().unwrap().leased.insert(ip);
    }

    /// Release an address lease (on member removal).
    pub fn release_ip(&self, ip: Ipv4Addr) {
        self.shared.lock().unwrap().leased.remove(&ip);
    }

    /// Mesh IPs currently in use: this node's own, the `_i` tags of all
    /// members, and outstanding leases whose owners have not shown up in
    /// gossip yet.
    pub async fn taken_mesh_ips(&self) -> Result<HashSet<Ipv4Addr>> {
        let mut taken: HashSet<Ipv4Addr> = self.shared.lock().unwrap().leased.clone();
        taken.insert(self.mesh_ip);
        for member in self.gossip.members().await? {
            if let Some(ip) = member.tag(tags::MESH_IP).and_then(|s| s.parse().ok()) {
                taken.insert(ip);
            }
        }
        Ok(taken)
    }

    /// Whether a node name is in use by any current member.
    pub async fn is_node_name_in_use(&self, name: &str) -> Result<bool> {
        if name == self.node_name {
            return Ok(true);
        }
        Ok(self
            .gossip
            .members()
            .await?
            .iter()
            .any(|m| m.name == name))
    }

    /// Live members other than this node.
    pub async fn live_peers(&self) -> Result<Vec<Member>> {
        Ok(self
            .gossip
            .members()
            .await?
            .into_iter()
            .filter(|m| m.status.is_live() && m.name != self.node_name)
            .collect())
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_node_name() {
        let name = MeshNode::derive_node_name("X", "10.232.1.1".parse().unwrap());
        assert_eq!(name, "X0AE80101");
    }

    #[test]
    fn test_derive_node_name_low_ip() {
        let name = MeshNode::derive_node_name("mesh", "10.0.0.1".parse().unwrap());
        assert_eq!(name, "mesh0A000001");
    }

    #[test]
    fn test_reserved_tags() {
        let params = NodeParams {
            mesh_name: "X".into(),
            node_name: String::new(),
            cidr: "10.232.0.0/16".parse().unwrap(),
            ipam: None,
            mesh_ip: "10.232.1.1".parse().unwrap(),
            endpoint_ip: "1.2.3.4".parse().unwrap(),
            endpoint_port: 54540,
            is_bootstrap: true,
            lan_mode: false,
            dev_mode: true,
            gossip_key: None,
            gossip_bind: None,
        };
        let tag_map = MeshNode::reserved_tags(&params, "pubkey1");
        assert_eq!(tag_map.get(tags::NODE_TYPE).unwrap(), "b");
        assert_eq!(tag_map.get(tags::PUBKEY).unwrap(), "pubkey1");
        assert_eq!(tag_map.get(tags::ADDR).unwrap(), "1.2.3.4");
        assert_eq!(tag_map.get(tags::PORT).unwrap(), "54540");
        assert_eq!(tag_map.get(tags::MESH_IP).unwrap(), "10.232.1.1");
    }
}
