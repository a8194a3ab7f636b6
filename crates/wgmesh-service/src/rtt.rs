//! RTT probe protocol.
//!
//! The agent broadcasts `_rtt0`; every receiving node waits a random delay
//! in `[0, num_nodes × 1s)` to spread responses, then broadcasts `_rtt1`
//! with its distance estimates. The initiator collects responses for
//! `num_nodes + 2` seconds.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::node::MeshNode;
use crate::payload::{self, events, RttEntry, RttRequest, RttResponse};

/// Spawn the delayed responder for an incoming `_rtt0` request.
pub fn spawn_responder(node: Arc<MeshNode>) {
    tokio::spawn(async move {
        if let Err(e) = respond(&node).await {
            warn!(error = %e, "unable to respond to rtt request");
        }
    });
}

async fn respond(node: &MeshNode) -> crate::Result<()> {
    let num_nodes = node.gossip.num_nodes().await?.max(1);

    // randomized delay spreads responses and keeps every payload under the
    // user-event size limit from colliding on the bus at once
    let delay_ms = rand::thread_rng().gen_range(0..num_nodes as u64 * 1000);
    debug!(msec = delay_ms, "delaying rtt response");
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let estimates = node.gossip.rtt_estimates().await?;
    let rtts: Vec<RttEntry> = estimates
        .iter()
        .map(|(name, rtt)| RttEntry {
            node: name.clone(),
            rtt_msec: rtt.as_millis() as i32,
        })
        .collect();

    let response = RttResponse {
        node: node.node_name.clone(),
        rtts,
    };
    let raw = payload::encode(&response)?;
    node.gossip.user_event(events::RTT_RESPONSE, raw).await?;
    Ok(())
}

/// Broadcast an `_rtt0` request and collect `_rtt1` responses for
/// `num_nodes + 2` seconds.
pub async fn collect(node: &MeshNode) -> crate::Result<Vec<RttResponse>> {
    let (tx, mut rx) = mpsc::channel(64);
    node.set_rtt_channel(tx);

    let request = RttRequest {
        requested_by: node.node_name.clone(),
    };
    let raw = payload::encode(&request)?;
    if let Err(e) = node.gossip.user_event(events::RTT_REQUEST, raw).await {
        node.clear_rtt_channel();
        error!(error = %e, "unable to broadcast rtt request");
        return Err(e.into());
    }

    let num_nodes = node.gossip.num_nodes().await?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(num_nodes as u64 + 2);

    let mut responses = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(resp)) => responses.push(resp),
            Ok(None) | Err(_) => break,
        }
    }

    node.clear_rtt_channel();
    Ok(responses)
}
