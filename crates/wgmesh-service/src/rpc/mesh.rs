//! Mesh RPC: the two-phase join protocol and the peer listing.
//!
//! Exposed to the internet on the bootstrap node. Errors are carried in the
//! response envelope (`result` + `errorMessage`), transport-level failures
//! map to HTTP status codes.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use wgmesh_overlay::PeerSpec;

use crate::error::{Result, ServiceError};
use crate::node::MeshNode;
use crate::payload::{self, events, tags, AnnouncementKind, PeerAnnouncement};
use crate::token;

/// Result discriminator used by every mesh RPC response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Phase 1 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub mesh_name: String,
}

/// Phase 1 response carrying the short-lived join token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub result: RpcResult,
    #[serde(default)]
    pub join_token: String,
    #[serde(default)]
    pub error_message: String,
}

/// Phase 2 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub pubkey: String,
    pub endpoint_ip: String,
    pub endpoint_port: u16,
    pub mesh_name: String,
    /// Optional; empty means "derive from the assigned mesh IP".
    #[serde(default)]
    pub node_name: String,
}

/// Phase 2 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub result: RpcResult,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub joining_node_mesh_ip: String,
    #[serde(default)]
    pub mesh_cidr: String,
    #[serde(default)]
    pub creation_ts: i64,
    #[serde(default)]
    pub gossip_encryption_key: String,
    #[serde(default)]
    pub gossip_mode_lan: bool,
}

impl JoinResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            result: RpcResult::Error,
            error_message: message.into(),
            joining_node_mesh_ip: String::new(),
            mesh_cidr: String::new(),
            creation_ts: 0,
            gossip_encryption_key: String::new(),
            gossip_mode_lan: false,
        }
    }
}

/// One entry of the peer listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    #[serde(rename = "type")]
    pub kind: String,
    pub pubkey: String,
    pub endpoint_ip: String,
    pub endpoint_port: u16,
    pub mesh_ip: String,
}

/// Shared state of the mesh RPC handlers.
#[derive(Clone)]
pub struct MeshRpcState {
    node: Arc<MeshNode>,
    secret: Arc<Vec<u8>>,
}

impl MeshRpcState {
    pub fn new(node: Arc<MeshNode>) -> Self {
        let secret = token::mesh_secret(node.gossip_key.as_ref());
        Self {
            node,
            secret: Arc::new(secret),
        }
    }
}

/// Build the mesh RPC router.
pub fn build_router(state: MeshRpcState) -> Router {
    Router::new()
        .route("/v1/handshake", post(begin))
        .route("/v1/join", post(join))
        .route("/v1/peers", get(peers))
        .with_state(state)
}

/// Phase 1 — validate the mesh name and issue a bearer token.
async fn begin(
    State(state): State<MeshRpcState>,
    Json(req): Json<HandshakeRequest>,
) -> Json<HandshakeResponse> {
    debug!(mesh = %req.mesh_name, "got handshake request");

    if req.mesh_name != state.node.mesh_name {
        return Json(HandshakeResponse {
            result: RpcResult::Error,
            join_token: String::new(),
            error_message: "Unknown mesh".into(),
        });
    }

    match token::issue(&state.secret, &state.node.mesh_name, &state.node.node_name) {
        Ok(join_token) => Json(HandshakeResponse {
            result: RpcResult::Ok,
            join_token,
            error_message: String::new(),
        }),
        Err(e) => {
            warn!(error = %e, "unable to issue join token");
            Json(HandshakeResponse {
                result: RpcResult::Error,
                join_token: String::new(),
                error_message: "Internal error".into(),
            })
        }
    }
}

/// Phase 2 — verify the token, allocate an address, install the peer and
/// announce it.
async fn join(
    State(state): State<MeshRpcState>,
    headers: HeaderMap,
    Json(req): Json<JoinRequest>,
) -> Json<JoinResponse> {
    debug!(mesh = %req.mesh_name, pubkey = %req.pubkey, "got join request");
    let node = &state.node;

    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(token::bearer_from_header)
        .map(|t| token::verify(&state.secret, t).is_ok())
        .unwrap_or(false);
    if !authorized {
        return Json(JoinResponse::error("error in authorization"));
    }

    if req.mesh_name != node.mesh_name {
        return Json(JoinResponse::error("Unknown mesh"));
    }

    let endpoint_ip: IpAddr = match req.endpoint_ip.parse() {
        Ok(ip) => ip,
        Err(_) => return Json(JoinResponse::error("Invalid endpoint address")),
    };

    let Some(allocator) = node.allocator.as_ref() else {
        return Json(JoinResponse::error("Not a bootstrap node"));
    };

    // allocate → install-peer → broadcast is atomic w.r.t. other joins
    let _guard = node.join_lock.lock().await;

    if !req.node_name.is_empty() {
        match node.is_node_name_in_use(&req.node_name).await {
            Ok(true) => {
                return Json(JoinResponse::error("Requested node name is already in use"))
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "unable to check node name");
                return Json(JoinResponse::error("Internal error"));
            }
        }
    }

    let taken = match node.taken_mesh_ips().await {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "unable to read member addresses");
            return Json(JoinResponse::error("Internal error"));
        }
    };
    let mesh_ip = match allocator.allocate(&taken) {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "address allocation failed");
            return Json(JoinResponse::error("Address range exhausted"));
        }
    };
    node.lease_ip(mesh_ip);

    let spec = PeerSpec {
        public_key: req.pubkey.clone(),
        endpoint_ip,
        endpoint_port: req.endpoint_port,
        mesh_ip,
    };
    match node.tunnel.add_peer(&spec).await {
        Ok(true) => {}
        Ok(false) => {
            node.release_ip(mesh_ip);
            return Json(JoinResponse::error("Peer already present"));
        }
        Err(e) => {
            node.release_ip(mesh_ip);
            warn!(error = %e, "unable to add joining peer");
            return Json(JoinResponse::error("Unable to add peer"));
        }
    }

    info!(ip = %mesh_ip, "node joined mesh");
    debug!(ip = %mesh_ip, pk = %req.pubkey, "node joined mesh");

    let announcement = PeerAnnouncement {
        kind: AnnouncementKind::Join,
        pubkey: req.pubkey,
        endpoint_ip,
        endpoint_port: req.endpoint_port,
        mesh_ip,
    };
    match payload::encode(&announcement) {
        Ok(raw) => {
            if let Err(e) = node.gossip.user_event(events::JOIN, raw).await {
                warn!(error = %e, "unable to broadcast join announcement");
            }
        }
        Err(e) => warn!(error = %e, "unable to encode join announcement"),
    }

    let (creation_ts, _) = node.timestamps();
    Json(JoinResponse {
        result: RpcResult::Ok,
        error_message: String::new(),
        joining_node_mesh_ip: mesh_ip.to_string(),
        mesh_cidr: node.cidr.to_string(),
        creation_ts,
        gossip_encryption_key: node
            .gossip_key
            .map(|k| BASE64.encode(k))
            .unwrap_or_default(),
        gossip_mode_lan: node.lan_mode,
    })
}

/// List all current live members, this node first, derived from gossip
/// tags.
async fn peers(State(state): State<MeshRpcState>) -> Json<Vec<Peer>> {
    let node = &state.node;
    let members = match node.gossip.members().await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "unable to read members");
            return Json(Vec::new());
        }
    };

    let mut out = Vec::new();
    for member in members.iter().filter(|m| m.status.is_live()) {
        let (Some(pk), Some(addr), Some(port), Some(mesh_ip)) = (
            member.tag(tags::PUBKEY),
            member.tag(tags::ADDR),
            member.tag(tags::PORT),
            member.tag(tags::MESH_IP),
        ) else {
            continue;
        };
        let Ok(endpoint_port) = port.parse() else {
            continue;
        };
        out.push(Peer {
            kind: "JOIN".into(),
            pubkey: pk.into(),
            endpoint_ip: addr.into(),
            endpoint_port,
            mesh_ip: mesh_ip.into(),
        });
    }
    Json(out)
}

/// Serve the router in plaintext (dev mode).
pub async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    warn!("starting an insecure mesh RPC service");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::Server(e.to_string()))
}

/// Serve the router behind mutual TLS.
pub async fn serve_tls(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> Result<()> {
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use hyper_util::server::conn::auto::Builder as ConnBuilder;
    use hyper_util::service::TowerToHyperService;

    let acceptor = TlsAcceptor::from(tls);
    debug!("starting TLS mesh RPC service");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "mesh RPC accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            debug!(peer = %peer_addr, error = %e, "TLS handshake failed");
                            return;
                        }
                    };
                    let service = TowerToHyperService::new(router);
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
                        .await
                    {
                        debug!(peer = %peer_addr, error = %e, "mesh RPC connection error");
                    }
                });
            }
        }
    }
    info!("stopped mesh RPC service");
    Ok(())
}
