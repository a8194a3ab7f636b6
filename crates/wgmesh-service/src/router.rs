//! The event router.
//!
//! A single-consumer loop over the gossip event channel drives every
//! mutation of the tunnel peer table and the snapshot freshness state.
//! Running single-threaded preserves gossip delivery order; per-event
//! handlers swallow errors after logging so the loop never dies.
//!
//! The JOIN user event is the authoritative install signal (tags may not
//! be readable yet at MemberJoin time); membership leave/fail/reap events
//! are the authoritative removal signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wgmesh_gossip::{Event, Member};
use wgmesh_overlay::PeerSpec;

use crate::node::MeshNode;
use crate::payload::{self, events, tags, AnnouncementKind, PeerAnnouncement, RttResponse};
use crate::rtt;

/// Interval of the optional peer-table audit.
const AUDIT_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the router loop.
pub fn spawn(node: Arc<MeshNode>, events: mpsc::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(run(node, events))
}

async fn run(node: Arc<MeshNode>, mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        debug!(kind = event.kind(), "router received event");

        // fan out to wait-for-change observers before anything else;
        // non-blocking, droppy per observer
        node.notify_observers();

        match event {
            Event::User(ev) => match ev.name.as_str() {
                events::JOIN => handle_join_event(&node, &ev.payload).await,
                events::RTT_REQUEST => rtt::spawn_responder(Arc::clone(&node)),
                events::RTT_RESPONSE => handle_rtt_response(&node, &ev.payload),
                other => debug!(event = %other, "ignoring unknown user event"),
            },
            Event::MemberJoin(_) | Event::MemberUpdate(_) => {
                node.note_change();
            }
            Event::MemberLeave(members)
            | Event::MemberFailed(members)
            | Event::MemberReap(members) => {
                handle_member_down(&node, members).await;
                node.note_change();
            }
        }
    }
    debug!("router loop finished");
}

/// Install the announced peer. Idempotent: the bootstrap already holds the
/// entry it just added, so an already-present peer is a no-op.
async fn handle_join_event(node: &MeshNode, raw: &[u8]) {
    let announcement: PeerAnnouncement = match payload::decode(raw) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "unable to decode a peer announcement");
            return;
        }
    };
    if announcement.kind != AnnouncementKind::Join {
        return;
    }
    if announcement.pubkey.is_empty() {
        warn!("peer announcement without a public key, skipping");
        return;
    }

    let spec = announcement.to_peer_spec();
    match node.tunnel.add_peer(&spec).await {
        Ok(true) => {
            info!(pk = %spec.public_key, ip = %spec.mesh_ip, "added peer");
        }
        Ok(false) => {
            // already present: we are the bootstrap that installed it
            // during the join RPC
        }
        Err(e) => {
            error!(error = %e, pk = %spec.public_key, "unable to add peer after user event");
        }
    }
}

fn handle_rtt_response(node: &MeshNode, raw: &[u8]) {
    let resp: RttResponse = match payload::decode(raw) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "unable to decode rtt response user event");
            return;
        }
    };
    if resp.node == node.node_name {
        return;
    }
    node.forward_rtt_response(resp);
}

/// Remove the tunnel peers of members that left, failed or were reaped,
/// then prune them from the gossip state. Their address leases end here.
async fn handle_member_down(node: &MeshNode, members: Vec<Member>) {
    for member in members {
        if let Some(ip) = member.tag(tags::MESH_IP).and_then(|s| s.parse().ok()) {
            node.release_ip(ip);
        }
        match member.tag(tags::PUBKEY) {
            Some(pk) => {
                if let Err(e) = node.tunnel.remove_peer(pk).await {
                    error!(error = %e, node = %member.name, "unable to remove peer of departed member");
                }
            }
            None => {
                // tags can be missing on very late events
                warn!(node = %member.name, "departed member carries no public key tag, skipping tunnel removal");
            }
        }

        if let Err(e) = node.gossip.remove_member(&member.name).await {
            error!(error = %e, node = %member.name, "unable to prune departed member");
        } else {
            info!(node = %member.name, addr = %member.addr, "node left mesh");
        }
    }
}

/// Spawn the periodic peer-table audit.
///
/// Steady state is maintained passively by the router; this compares the
/// tunnel's actual peer list against the set derived from the member list
/// and corrects drift.
pub fn spawn_audit(node: Arc<MeshNode>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(AUDIT_INTERVAL);
        tick.tick().await; // skip the immediate first tick
        loop {
            tick.tick().await;
            if let Err(e) = audit_once(&node).await {
                warn!(error = %e, "peer table audit failed");
            }
        }
    })
}

/// One audit pass. Returns the number of corrections applied.
pub async fn audit_once(node: &MeshNode) -> crate::Result<usize> {
    let members = node.live_peers().await?;
    let actual: std::collections::HashSet<String> =
        node.tunnel.peer_keys().await?.into_iter().collect();

    let mut corrections = 0;

    let mut expected = std::collections::HashSet::new();
    for member in &members {
        let (Some(pk), Some(ip), Some(addr), Some(port)) = (
            member.tag(tags::PUBKEY),
            member.tag(tags::MESH_IP),
            member.tag(tags::ADDR),
            member.tag(tags::PORT),
        ) else {
            continue;
        };
        expected.insert(pk.to_string());

        if !actual.contains(pk) {
            let (Ok(mesh_ip), Ok(endpoint_ip), Ok(endpoint_port)) =
                (ip.parse(), addr.parse(), port.parse())
            else {
                continue;
            };
            let spec = PeerSpec {
                public_key: pk.to_string(),
                endpoint_ip,
                endpoint_port,
                mesh_ip,
            };
            warn!(pk = %pk, "audit: installing missing peer entry");
            node.tunnel.add_peer(&spec).await?;
            corrections += 1;
        }
    }

    for pk in actual.difference(&expected) {
        warn!(pk = %pk, "audit: removing stale peer entry");
        node.tunnel.remove_peer(pk).await?;
        corrections += 1;
    }

    Ok(corrections)
}
