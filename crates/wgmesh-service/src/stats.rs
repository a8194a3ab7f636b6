//! Periodic mesh statistics logging.
//!
//! A 1-second ticker logs the node count whenever it changes; a full stats
//! line is emitted once a minute regardless.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::node::MeshNode;

/// Spawn the stats ticker.
pub fn spawn(node: Arc<MeshNode>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut last_count: Option<usize> = None;
        let mut since_full_log = 0u32;

        loop {
            tick.tick().await;
            since_full_log += 1;

            let Ok(count) = node.gossip.num_nodes().await else {
                continue;
            };

            if last_count != Some(count) {
                last_count = Some(count);
                info!(nodes = count, "mesh has {} nodes", count);
            } else if since_full_log >= 60 {
                since_full_log = 0;
                let peers = node.tunnel.peer_keys().await.map(|k| k.len()).unwrap_or(0);
                info!(nodes = count, peers = peers, "mesh stats");
            }
        }
    })
}
