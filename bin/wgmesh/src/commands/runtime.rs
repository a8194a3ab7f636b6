//! Shared node runtime assembly and teardown.
//!
//! Both `bootstrap` and `join` end up with the same set of background
//! services around a [`MeshNode`]; this module spawns them and runs the
//! graceful shutdown chain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use wgmesh_gossip::Event;
use wgmesh_overlay::WgDevice;
use wgmesh_service::{export, router, rpc, stats, MeshNode};

/// Delay between the leave broadcast and gossip shutdown, giving the
/// cluster time to see the intent.
const LEAVE_DRAIN: Duration = Duration::from_secs(3);

/// Handles of the background services around a node.
pub(crate) struct NodeRuntime {
    pub node: Arc<MeshNode>,
    pub device: WgDevice,
    export_path: Option<PathBuf>,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeRuntime {
    /// Spawn the event router, audit, stats ticker, snapshot exporter and
    /// agent server.
    pub fn launch(
        node: Arc<MeshNode>,
        events: tokio::sync::mpsc::Receiver<Event>,
        device: WgDevice,
        memberlist_file: &str,
        agent_bind_socket: &str,
        agent_bind_socket_id: &str,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        router::spawn(node.clone(), events);
        router::spawn_audit(node.clone());
        stats::spawn(node.clone());

        let export_path = (!memberlist_file.is_empty()).then(|| PathBuf::from(memberlist_file));
        if let Some(path) = &export_path {
            export::spawn(node.clone(), path.clone());
        }

        if !agent_bind_socket.is_empty() {
            let node = node.clone();
            let socket = agent_bind_socket.to_string();
            let socket_id = agent_bind_socket_id.to_string();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                info!(socket = %socket, "starting agent service");
                let shutdown = async move {
                    let _ = shutdown_rx.changed().await;
                };
                if let Err(e) = rpc::agent::serve(node, &socket, &socket_id, shutdown).await {
                    warn!(error = %e, "agent service failed");
                }
            });
        }

        Self {
            node,
            device,
            export_path,
            shutdown_tx,
        }
    }

    /// A future that resolves when shutdown is signalled; handed to the
    /// mesh RPC server.
    pub fn shutdown_future(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            let _ = rx.changed().await;
        }
    }

    /// The graceful shutdown chain: leave the gossip cluster, drain, stop
    /// the engine and servers, delete the snapshot file, remove the
    /// interface.
    pub async fn teardown(self) -> Result<()> {
        info!("shutting down");

        if let Err(e) = self.node.gossip.leave().await {
            warn!(error = %e, "leave broadcast failed");
        }
        tokio::time::sleep(LEAVE_DRAIN).await;

        if let Err(e) = self.node.gossip.shutdown().await {
            warn!(error = %e, "gossip shutdown failed");
        }

        let _ = self.shutdown_tx.send(true);

        if let Some(path) = &self.export_path {
            export::delete(path).await;
        }

        self.device.remove().await?;
        info!("shutdown complete");
        Ok(())
    }
}
