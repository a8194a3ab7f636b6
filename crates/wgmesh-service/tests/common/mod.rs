//! Shared helpers for service integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use wgmesh_gossip::{Event, Member, MemberStatus};
use wgmesh_overlay::MockTunnel;
use wgmesh_service::{MeshNode, NodeParams};

/// Default parameters for a loopback bootstrap node.
pub fn bootstrap_params() -> NodeParams {
    NodeParams {
        mesh_name: "X".into(),
        node_name: String::new(),
        cidr: "10.232.0.0/16".parse().unwrap(),
        ipam: None,
        mesh_ip: "10.232.1.1".parse().unwrap(),
        endpoint_ip: "192.0.2.1".parse().unwrap(),
        endpoint_port: 54540,
        is_bootstrap: true,
        lan_mode: true,
        dev_mode: true,
        gossip_key: None,
        gossip_bind: Some("127.0.0.1:0".parse().unwrap()),
    }
}

/// Start a loopback bootstrap node on a mock tunnel.
pub async fn start_node(
    params: NodeParams,
) -> (Arc<MeshNode>, Arc<MockTunnel>, mpsc::Receiver<Event>) {
    let tunnel = Arc::new(MockTunnel::new());
    let (node, events) = MeshNode::start(params, tunnel.clone(), "bootstrap-pk")
        .await
        .unwrap();
    (node, tunnel, events)
}

/// A synthetic member with the given reserved tags.
pub fn member_with_tags(name: &str, tags: &[(&str, &str)]) -> Member {
    member_with_status(name, tags, MemberStatus::Alive)
}

pub fn member_with_status(name: &str, tags: &[(&str, &str)], status: MemberStatus) -> Member {
    let addr: SocketAddr = "10.232.0.9:5353".parse().unwrap();
    Member {
        name: name.into(),
        addr,
        status,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}
