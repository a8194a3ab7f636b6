//! Joiner-side peer installation.
//!
//! After a successful join RPC the joiner must install a tunnel peer entry
//! for every existing member before it brings the tunnel up and joins
//! gossip. That ordering guarantees no gossip message arrives before the
//! joiner can decrypt tunnel traffic from its sender.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::{debug, error};
use wgmesh_gossip::GOSSIP_PORT;
use wgmesh_overlay::{PeerSpec, Tunnel};

use crate::error::{Result, ServiceError};
use crate::rpc::mesh::Peer;

/// Install a tunnel peer entry for every received peer.
///
/// Returns the gossip seed addresses (each peer's mesh IP on the gossip
/// port); the first entry belongs to the bootstrap node the join went
/// through. Gossip must only be joined after this returns.
pub async fn install_peers(tunnel: &dyn Tunnel, peers: &[Peer]) -> Result<Vec<SocketAddr>> {
    let mut seeds = Vec::with_capacity(peers.len());

    for peer in peers {
        let mesh_ip: Ipv4Addr = peer
            .mesh_ip
            .parse()
            .map_err(|_| ServiceError::Server(format!("invalid peer mesh IP {}", peer.mesh_ip)))?;
        let endpoint_ip: IpAddr = peer.endpoint_ip.parse().map_err(|_| {
            ServiceError::Server(format!("invalid peer endpoint {}", peer.endpoint_ip))
        })?;

        let spec = PeerSpec {
            public_key: peer.pubkey.clone(),
            endpoint_ip,
            endpoint_port: peer.endpoint_port,
            mesh_ip,
        };
        match tunnel.add_peer(&spec).await {
            Ok(_) => debug!(pk = %spec.public_key, ip = %mesh_ip, "installed peer"),
            Err(e) => {
                error!(error = %e, pk = %spec.public_key, "unable to install peer");
                return Err(e.into());
            }
        }

        seeds.push(SocketAddr::new(IpAddr::V4(mesh_ip), GOSSIP_PORT));
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgmesh_overlay::MockTunnel;

    fn peer(pk: &str, mesh_ip: &str) -> Peer {
        Peer {
            kind: "JOIN".into(),
            pubkey: pk.into(),
            endpoint_ip: "1.2.3.4".into(),
            endpoint_port: 54540,
            mesh_ip: mesh_ip.into(),
        }
    }

    #[tokio::test]
    async fn test_installs_every_peer_and_returns_seeds() {
        let tunnel = MockTunnel::new();
        let peers = vec![peer("pk-a", "10.232.1.1"), peer("pk-b", "10.232.1.2")];

        let seeds = install_peers(&tunnel, &peers).await.unwrap();

        let installed = tunnel.installed();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].public_key, "pk-a");
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], "10.232.1.1:5353".parse().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_peer_entry_fails() {
        let tunnel = MockTunnel::new();
        let peers = vec![peer("pk-a", "not-an-ip")];
        assert!(install_peers(&tunnel, &peers).await.is_err());
        assert!(tunnel.installed().is_empty());
    }
}
