//! Local agent RPC.
//!
//! Served on a Unix domain socket for operator tooling (CLI, dashboard).
//! All operations are unauthenticated; access control is the filesystem
//! permission of the socket path, optionally chowned to a configured
//! `uid:gid`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError};
use crate::node::MeshNode;
use crate::rtt;

/// Mesh overview returned by `Info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshInfo {
    pub name: String,
    pub node_name: String,
    pub node_count: usize,
    pub mesh_creation_ts: i64,
    pub node_join_ts: i64,
}

/// One key/value pair of a member's tag map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

/// One member as returned by `Nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub node_name: String,
    pub addr: String,
    pub status: String,
    pub rtt_msec: i32,
    pub tags: Vec<TagPair>,
}

/// `WaitForChange` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitRequest {
    pub timeout_secs: u64,
}

/// `WaitForChange` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitResponse {
    pub was_timeout: bool,
    pub changes_occurred: bool,
}

/// `Tag` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRequest {
    pub key: String,
    pub value: String,
}

/// Result of `Tag` / `Untag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagResult {
    pub ok: bool,
}

/// One node's answer in the `RTT` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RttInfo {
    pub node_name: String,
    pub rtts: Vec<RttNodeInfo>,
}

/// A single pairwise estimate inside [`RttInfo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RttNodeInfo {
    pub node_name: String,
    pub rtt_msec: i32,
}

/// Build the agent router.
pub fn build_router(node: Arc<MeshNode>) -> Router {
    Router::new()
        .route("/v1/info", get(info))
        .route("/v1/nodes", get(nodes))
        .route("/v1/wait", post(wait_for_change))
        .route("/v1/tags", get(tag_list).post(tag_set))
        .route("/v1/tags/{key}", axum::routing::delete(tag_delete))
        .route("/v1/rtt", get(rtt_collect))
        .with_state(node)
}

async fn info(State(node): State<Arc<MeshNode>>) -> Json<MeshInfo> {
    let node_count = node.gossip.num_nodes().await.unwrap_or(0);
    let (mesh_creation_ts, node_join_ts) = node.timestamps();
    Json(MeshInfo {
        name: node.mesh_name.clone(),
        node_name: node.node_name.clone(),
        node_count,
        mesh_creation_ts,
        node_join_ts,
    })
}

async fn nodes(State(node): State<Arc<MeshNode>>) -> Json<Vec<MemberInfo>> {
    let members = node.gossip.members().await.unwrap_or_default();
    let rtts = node.gossip.rtt_estimates().await.unwrap_or_default();

    let out = members
        .into_iter()
        .map(|m| {
            let rtt_msec = rtts
                .get(&m.name)
                .map(|d| d.as_millis() as i32)
                .unwrap_or(0);
            MemberInfo {
                rtt_msec,
                addr: m.addr.ip().to_string(),
                status: m.status.to_string(),
                tags: m
                    .tags
                    .iter()
                    .map(|(k, v)| TagPair {
                        key: k.clone(),
                        value: v.clone(),
                    })
                    .collect(),
                node_name: m.name,
            }
        })
        .collect();
    Json(out)
}

/// Long poll: registers an observer and answers on the first change or on
/// timeout, whichever comes first.
async fn wait_for_change(
    State(node): State<Arc<MeshNode>>,
    Json(req): Json<WaitRequest>,
) -> Json<WaitResponse> {
    let (tx, mut rx) = mpsc::channel(4);
    let key = format!("agent-waitforchange-{}", rand::thread_rng().gen::<u64>());
    node.register_observer(key.clone(), tx);

    let response = tokio::select! {
        changed = rx.recv() => WaitResponse {
            was_timeout: false,
            changes_occurred: changed.is_some(),
        },
        _ = tokio::time::sleep(Duration::from_secs(req.timeout_secs)) => WaitResponse {
            was_timeout: true,
            changes_occurred: false,
        },
    };

    node.deregister_observer(&key);
    Json(response)
}

async fn tag_list(State(node): State<Arc<MeshNode>>) -> Json<Vec<TagPair>> {
    let tags = match node.gossip.local_member().await {
        Ok(member) => member.tags,
        Err(_) => HashMap::new(),
    };
    Json(
        tags.into_iter()
            .map(|(key, value)| TagPair { key, value })
            .collect(),
    )
}

/// Set an operator tag. Reserved-key filtering happens at the CLI layer,
/// not here.
async fn tag_set(
    State(node): State<Arc<MeshNode>>,
    Json(req): Json<TagRequest>,
) -> Json<TagResult> {
    debug!(k = %req.key, v = %req.value, "agent: tag requested");

    let mut tags = match node.gossip.local_member().await {
        Ok(member) => member.tags,
        Err(e) => {
            warn!(error = %e, "unable to read local tags");
            return Json(TagResult { ok: false });
        }
    };
    tags.insert(req.key, req.value);

    match node.gossip.set_tags(tags).await {
        Ok(()) => Json(TagResult { ok: true }),
        Err(e) => {
            warn!(error = %e, "unable to set tags");
            Json(TagResult { ok: false })
        }
    }
}

async fn tag_delete(
    State(node): State<Arc<MeshNode>>,
    UrlPath(key): UrlPath<String>,
) -> Json<TagResult> {
    debug!(k = %key, "agent: untag requested");

    let mut tags = match node.gossip.local_member().await {
        Ok(member) => member.tags,
        Err(e) => {
            warn!(error = %e, "unable to read local tags");
            return Json(TagResult { ok: false });
        }
    };
    if tags.remove(&key).is_none() {
        return Json(TagResult { ok: false });
    }

    match node.gossip.set_tags(tags).await {
        Ok(()) => Json(TagResult { ok: true }),
        Err(e) => {
            warn!(error = %e, "unable to set tags");
            Json(TagResult { ok: false })
        }
    }
}

/// Trigger the RTT probe and return the collected responses.
async fn rtt_collect(State(node): State<Arc<MeshNode>>) -> Json<Vec<RttInfo>> {
    debug!("agent: rtt requested");
    let responses = match rtt::collect(&node).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "rtt collection failed");
            Vec::new()
        }
    };

    Json(
        responses
            .into_iter()
            .map(|resp| RttInfo {
                node_name: resp.node,
                rtts: resp
                    .rtts
                    .into_iter()
                    .map(|entry| RttNodeInfo {
                        node_name: entry.node,
                        rtt_msec: entry.rtt_msec,
                    })
                    .collect(),
            })
            .collect(),
    )
}

/// Bind the agent socket, apply ownership/permissions, and serve until
/// shutdown.
pub async fn serve(
    node: Arc<MeshNode>,
    bind_socket: &str,
    bind_socket_id: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let path = Path::new(bind_socket);

    // clean up a stale socket from a previous run
    let _ = std::fs::remove_file(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;

    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))?;
    }
    if !bind_socket_id.is_empty() {
        let (uid, gid) = wgmesh_core::config::parse_uid_gid(bind_socket_id).ok_or_else(|| {
            ServiceError::Server(format!("invalid uid:gid {}", bind_socket_id))
        })?;
        std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
    }

    info!(socket = %bind_socket, "starting agent service");
    let router = build_router(node);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::Server(e.to_string()))?;

    let _ = std::fs::remove_file(path);
    info!("stopped agent service");
    Ok(())
}
