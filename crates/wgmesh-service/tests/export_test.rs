//! Snapshot exporter integration tests.

mod common;

use wgmesh_service::export::{self, ExportedMemberList};
use wgmesh_service::node::unix_now;

use common::{bootstrap_params, start_node};

#[tokio::test]
async fn snapshot_lists_the_bootstrap_member() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.json");

    export::export_once(&node, &path).await.unwrap();

    let raw = std::fs::read(&path).unwrap();
    let snapshot: ExportedMemberList = serde_json::from_slice(&raw).unwrap();

    assert_eq!(snapshot.members.len(), 1);
    let me = snapshot.members.values().next().unwrap();
    assert_eq!(me.st, "alive");
    assert_eq!(me.tags["_t"], "b");
    assert_eq!(me.tags["_i"], "10.232.1.1");
}

#[tokio::test]
async fn snapshot_last_update_tracks_changes() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.json");

    let before = unix_now();
    node.note_change();
    export::export_once(&node, &path).await.unwrap();

    let raw = std::fs::read(&path).unwrap();
    let snapshot: ExportedMemberList = serde_json::from_slice(&raw).unwrap();
    assert!(
        snapshot.last_update >= before,
        "lastUpdate {} predates the change {}",
        snapshot.last_update,
        before
    );
}

#[tokio::test]
async fn snapshot_file_is_deleted_on_cleanup() {
    let (node, _tunnel, _events) = start_node(bootstrap_params()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.json");

    export::export_once(&node, &path).await.unwrap();
    assert!(path.exists());

    export::delete(&path).await;
    assert!(!path.exists());

    // deleting a missing file is not an error
    export::delete(&path).await;
}
