//! Agent RPC tests driven through the agent router.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use wgmesh_service::rpc::agent::{build_router, MeshInfo, MemberInfo, TagPair, TagResult, WaitResponse};

use common::{bootstrap_params, start_node};

async fn get_json<Resp: serde::de::DeserializeOwned>(app: &Router, uri: &str) -> Resp {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send_json<Resp: serde::de::DeserializeOwned>(
    app: &Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> Resp {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn info_reports_single_bootstrap_node() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node);

    let info: MeshInfo = get_json(&app, "/v1/info").await;
    assert_eq!(info.name, "X");
    assert_eq!(info.node_name, "X0AE80101");
    assert_eq!(info.node_count, 1);
    assert!(info.mesh_creation_ts > 0);
}

#[tokio::test]
async fn nodes_lists_local_member_with_tags() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node);

    let members: Vec<MemberInfo> = get_json(&app, "/v1/nodes").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].status, "alive");
    assert!(members[0]
        .tags
        .iter()
        .any(|t| t.key == "_pk" && t.value == "bootstrap-pk"));
}

#[tokio::test]
async fn tag_untag_roundtrip() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node);

    let set: TagResult = send_json(
        &app,
        "POST",
        "/v1/tags",
        serde_json::json!({ "key": "svc:web", "value": "port=8080" }),
    )
    .await;
    assert!(set.ok);

    let tags: Vec<TagPair> = get_json(&app, "/v1/tags").await;
    assert!(tags.iter().any(|t| t.key == "svc:web" && t.value == "port=8080"));
    // reserved metadata survives operator tag mutations
    assert!(tags.iter().any(|t| t.key == "_pk"));

    let unset: TagResult = send_json(&app, "DELETE", "/v1/tags/svc:web", serde_json::json!({}))
        .await;
    assert!(unset.ok);

    let tags: Vec<TagPair> = get_json(&app, "/v1/tags").await;
    assert!(!tags.iter().any(|t| t.key == "svc:web"));
}

#[tokio::test]
async fn untag_missing_key_reports_not_ok() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node);

    let unset: TagResult =
        send_json(&app, "DELETE", "/v1/tags/nosuch", serde_json::json!({})).await;
    assert!(!unset.ok);
}

#[tokio::test]
async fn wait_for_change_times_out() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node);

    let start = tokio::time::Instant::now();
    let resp: WaitResponse = send_json(
        &app,
        "POST",
        "/v1/wait",
        serde_json::json!({ "timeoutSecs": 1 }),
    )
    .await;
    assert!(resp.was_timeout);
    assert!(!resp.changes_occurred);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn rtt_collection_terminates_within_bound() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let num_nodes = node.gossip.num_nodes().await.unwrap();
    let app = build_router(node);

    let start = tokio::time::Instant::now();
    let _: Vec<wgmesh_service::rpc::agent::RttInfo> = get_json(&app, "/v1/rtt").await;

    let bound = Duration::from_secs(num_nodes as u64 + 3);
    assert!(
        start.elapsed() < bound,
        "rtt collection took {:?}, bound is {:?}",
        start.elapsed(),
        bound
    );
}

#[tokio::test]
async fn wait_for_change_fires_on_change() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;
    let app = build_router(node.clone());

    let waiter = tokio::spawn({
        let app = app.clone();
        async move {
            let resp: WaitResponse = send_json(
                &app,
                "POST",
                "/v1/wait",
                serde_json::json!({ "timeoutSecs": 10 }),
            )
            .await;
            resp
        }
    });

    // let the waiter register its observer, then trigger a change
    tokio::time::sleep(Duration::from_millis(200)).await;
    node.notify_observers();

    let resp = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("wait did not return after a change")
        .unwrap();
    assert!(!resp.was_timeout);
    assert!(resp.changes_occurred);
}
