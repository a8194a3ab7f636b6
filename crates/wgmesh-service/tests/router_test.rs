//! Event-router behavior against a recording tunnel double.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;
use wgmesh_gossip::{Event, MemberStatus, UserEvent};
use wgmesh_overlay::Tunnel;
use wgmesh_service::payload::{
    self, events, AnnouncementKind, PeerAnnouncement,
};
use wgmesh_service::router;

use common::{bootstrap_params, member_with_status, member_with_tags, start_node};

fn join_event(pubkey: &str, mesh_ip: &str) -> Event {
    let ann = PeerAnnouncement {
        kind: AnnouncementKind::Join,
        pubkey: pubkey.into(),
        endpoint_ip: "198.51.100.7".parse().unwrap(),
        endpoint_port: 54540,
        mesh_ip: mesh_ip.parse().unwrap(),
    };
    Event::User(UserEvent {
        name: events::JOIN.into(),
        payload: payload::encode(&ann).unwrap(),
        origin: "bootstrap".into(),
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn join_event_installs_peer() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    tx.send(join_event("pk-new", "10.232.0.7")).await.unwrap();
    settle().await;

    let installed = tunnel.installed();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].public_key, "pk-new");
    assert_eq!(installed[0].allowed_ip(), "10.232.0.7/32");
}

#[tokio::test]
async fn replayed_join_event_is_idempotent() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    tx.send(join_event("pk-a", "10.232.0.7")).await.unwrap();
    tx.send(join_event("pk-b", "10.232.0.8")).await.unwrap();
    // replay the first announcement
    tx.send(join_event("pk-a", "10.232.0.7")).await.unwrap();
    settle().await;

    let installed = tunnel.installed();
    assert_eq!(installed.len(), 2, "replay must not disturb the peer table");
    assert!(installed.iter().any(|p| p.public_key == "pk-a"));
    assert!(installed.iter().any(|p| p.public_key == "pk-b"));
}

#[tokio::test]
async fn member_failed_removes_peer() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    tx.send(join_event("pk-a", "10.232.0.7")).await.unwrap();
    tx.send(join_event("pk-b", "10.232.0.8")).await.unwrap();
    settle().await;
    assert_eq!(tunnel.installed().len(), 2);

    let failed = member_with_status(
        "X0AE80007",
        &[("_pk", "pk-a"), ("_i", "10.232.0.7")],
        MemberStatus::Failed,
    );
    tx.send(Event::MemberFailed(vec![failed])).await.unwrap();
    settle().await;

    let installed = tunnel.installed();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].public_key, "pk-b");
}

#[tokio::test]
async fn member_leave_and_reap_remove_peers() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    tx.send(join_event("pk-a", "10.232.0.7")).await.unwrap();
    tx.send(join_event("pk-b", "10.232.0.8")).await.unwrap();
    settle().await;

    let left = member_with_status(
        "n1",
        &[("_pk", "pk-a")],
        MemberStatus::Left,
    );
    tx.send(Event::MemberLeave(vec![left])).await.unwrap();

    let reaped = member_with_status(
        "n2",
        &[("_pk", "pk-b")],
        MemberStatus::Reaped,
    );
    tx.send(Event::MemberReap(vec![reaped])).await.unwrap();
    settle().await;

    assert!(tunnel.installed().is_empty());
}

#[tokio::test]
async fn member_without_pubkey_tag_is_skipped() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    tx.send(join_event("pk-a", "10.232.0.7")).await.unwrap();
    settle().await;

    // a very late event may carry no tags at all
    let anonymous = member_with_status("ghost", &[], MemberStatus::Failed);
    tx.send(Event::MemberFailed(vec![anonymous])).await.unwrap();
    settle().await;

    assert_eq!(tunnel.installed().len(), 1, "unrelated peer must survive");
}

#[tokio::test]
async fn events_notify_observers_without_blocking() {
    let (node, _tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    let (obs_tx, mut obs_rx) = mpsc::channel(1);
    node.register_observer("test-observer", obs_tx);

    tx.send(Event::MemberJoin(vec![member_with_tags("n1", &[])]))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), obs_rx.recv())
        .await
        .expect("observer was not notified")
        .unwrap();

    // fill the observer buffer and keep routing; the router must not block
    tx.send(Event::MemberJoin(vec![member_with_tags("n2", &[])]))
        .await
        .unwrap();
    tx.send(Event::MemberJoin(vec![member_with_tags("n3", &[])]))
        .await
        .unwrap();
    settle().await;

    let (seq, _) = node.change_state();
    assert!(seq >= 3, "router stalled on a full observer");
}

#[tokio::test]
async fn membership_changes_bump_snapshot_freshness() {
    let (node, _tunnel, _gossip_events) = start_node(bootstrap_params()).await;
    let (tx, rx) = mpsc::channel(16);
    router::spawn(node.clone(), rx);

    let (seq_before, _) = node.change_state();
    tx.send(Event::MemberJoin(vec![member_with_tags("n1", &[])]))
        .await
        .unwrap();
    settle().await;

    let (seq_after, _) = node.change_state();
    assert!(seq_after > seq_before);
}

#[tokio::test]
async fn audit_restores_invariant() {
    let (node, tunnel, _gossip_events) = start_node(bootstrap_params()).await;

    // a stale entry no live member corresponds to
    tunnel
        .add_peer(&wgmesh_overlay::PeerSpec {
            public_key: "stale-pk".into(),
            endpoint_ip: "198.51.100.9".parse().unwrap(),
            endpoint_port: 54540,
            mesh_ip: "10.232.0.99".parse().unwrap(),
        })
        .await
        .unwrap();

    let corrections = router::audit_once(&node).await.unwrap();
    assert_eq!(corrections, 1);
    assert!(tunnel.installed().is_empty());
}
