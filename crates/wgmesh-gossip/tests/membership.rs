//! Membership integration tests over loopback UDP.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use wgmesh_gossip::{Event, Gossip, GossipConfig, GossipHandle, MemberStatus};

fn test_config(name: &str) -> GossipConfig {
    let mut cfg = GossipConfig::new(name, "127.0.0.1:0".parse().unwrap()).lan();
    cfg.probe_interval = Duration::from_millis(100);
    cfg.probe_timeout = Duration::from_millis(300);
    cfg.suspicion_timeout = Duration::from_millis(500);
    cfg.reap_interval = Duration::from_millis(200);
    cfg.leave_propagate_delay = Duration::from_millis(50);
    cfg
}

async fn start(name: &str) -> (GossipHandle, mpsc::Receiver<Event>) {
    Gossip::start(test_config(name)).await.unwrap()
}

/// Poll until `check` passes or the deadline expires.
async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn two_nodes_discover_each_other() {
    let (a, _a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();

    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;
    wait_for("b sees a", || async {
        b.members().await.unwrap().iter().any(|m| m.name == "node-a")
    })
    .await;

    assert_eq!(a.num_nodes().await.unwrap(), 2);
    assert_eq!(b.num_nodes().await.unwrap(), 2);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn join_emits_member_join_event() {
    let (a, mut a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(ev) = a_events.recv().await {
            if let Event::MemberJoin(members) = ev {
                if members.iter().any(|m| m.name == "node-b") {
                    return true;
                }
            }
        }
        false
    })
    .await
    .expect("no MemberJoin within deadline");
    assert!(joined);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn tags_propagate_as_member_update() {
    let (a, mut a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();
    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;

    let tags = HashMap::from([("role".to_string(), "worker".to_string())]);
    b.set_tags(tags).await.unwrap();

    wait_for("tag visible on a", || async {
        a.members()
            .await
            .unwrap()
            .iter()
            .any(|m| m.name == "node-b" && m.tag("role") == Some("worker"))
    })
    .await;

    // the update event surfaced on a's channel
    let mut saw_update = false;
    while let Ok(Some(ev)) =
        tokio::time::timeout(Duration::from_millis(200), a_events.recv()).await
    {
        if matches!(ev, Event::MemberUpdate(_)) {
            saw_update = true;
        }
    }
    assert!(saw_update, "expected a MemberUpdate event");

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn user_events_reach_all_members_and_origin() {
    let (a, mut a_events) = start("node-a").await;
    let (b, mut b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();
    wait_for("b sees a", || async {
        b.members().await.unwrap().iter().any(|m| m.name == "node-a")
    })
    .await;

    b.user_event("_j", b"announce".to_vec()).await.unwrap();

    for (who, events) in [("a", &mut a_events), ("b", &mut b_events)] {
        let got = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(ev) = events.recv().await {
                if let Event::User(ue) = ev {
                    if ue.name == "_j" {
                        assert_eq!(ue.payload, b"announce");
                        assert_eq!(ue.origin, "node-b");
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(got, "user event did not reach {}", who);
    }

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_user_event_rejected() {
    let (a, _events) = start("node-a").await;
    let err = a.user_event("big", vec![0u8; 600]).await.unwrap_err();
    assert!(err.to_string().contains("exceeds limit"));
    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn graceful_leave_emits_member_leave() {
    let (a, mut a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();
    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;

    b.leave().await.unwrap();

    let left = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(ev) = a_events.recv().await {
            if let Event::MemberLeave(members) = ev {
                if members.iter().any(|m| m.name == "node-b") {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(left, "no MemberLeave for node-b");

    wait_for("b marked left on a", || async {
        a.members()
            .await
            .unwrap()
            .iter()
            .any(|m| m.name == "node-b" && m.status == MemberStatus::Left)
    })
    .await;
    assert_eq!(a.num_nodes().await.unwrap(), 1);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn killed_node_is_declared_failed() {
    let (a, mut a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();
    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;

    // hard kill: no leave broadcast
    b.shutdown().await.unwrap();

    let failed = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(ev) = a_events.recv().await {
            if let Event::MemberFailed(members) = ev {
                if members.iter().any(|m| m.name == "node-b") {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(failed, "node-b was never declared failed");

    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn pruned_member_stays_out() {
    let (a, _a_events) = start("node-a").await;
    let (b, _b_events) = start("node-b").await;

    b.join(vec![a.local_addr()]).await.unwrap();
    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;

    b.shutdown().await.unwrap();
    a.remove_member("node-b").await.unwrap();

    assert!(
        !a.members()
            .await
            .unwrap()
            .iter()
            .any(|m| m.name == "node-b"),
        "pruned member still listed"
    );

    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn encrypted_meshes_require_matching_keys() {
    let mut cfg_a = test_config("node-a");
    cfg_a.encryption_key = Some([1u8; 32]);
    let mut cfg_b = test_config("node-b");
    cfg_b.encryption_key = Some([1u8; 32]);
    let mut cfg_c = test_config("node-c");
    cfg_c.encryption_key = Some([2u8; 32]);

    let (a, _a_events) = Gossip::start(cfg_a).await.unwrap();
    let (b, _b_events) = Gossip::start(cfg_b).await.unwrap();
    let (c, _c_events) = Gossip::start(cfg_c).await.unwrap();

    b.join(vec![a.local_addr()]).await.unwrap();
    c.join(vec![a.local_addr()]).await.unwrap();

    wait_for("a sees b", || async {
        a.members().await.unwrap().iter().any(|m| m.name == "node-b")
    })
    .await;

    // c runs a different key; its datagrams never decrypt
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        !a.members()
            .await
            .unwrap()
            .iter()
            .any(|m| m.name == "node-c"),
        "node with wrong key joined the mesh"
    );

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
    c.shutdown().await.unwrap();
}
