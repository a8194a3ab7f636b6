//! Snapshot exporter.
//!
//! When a memberlist file is configured, a 1-second ticker materializes the
//! member and derived-service view to JSON. Work is skipped unless a
//! membership change happened since the last export; writes are
//! last-writer-wins.
//!
//! Service entries are derived from member tags of the form
//! `svc:<name> = k=v,k=v,port=N`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use wgmesh_gossip::Member;

use crate::node::MeshNode;

/// Prefix of service tags.
const SVC_TAG_PREFIX: &str = "svc:";

/// One member in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedMember {
    pub addr: String,
    pub st: String,
    pub rtt: i64,
    pub tags: BTreeMap<String, String>,
}

/// One derived service in the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportedService {
    pub nodes: Vec<String>,
    pub port: u16,
    pub tags: BTreeMap<String, String>,
}

/// The snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedMemberList {
    pub members: BTreeMap<String, ExportedMember>,
    pub services: BTreeMap<String, ExportedService>,
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
}

/// Spawn the periodic export ticker.
pub fn spawn(node: Arc<MeshNode>, path: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut exported_seq = 0u64;
        loop {
            tick.tick().await;
            let (seq, _) = node.change_state();
            if seq <= exported_seq {
                continue;
            }
            match export_once(&node, &path).await {
                Ok(()) => exported_seq = seq,
                Err(e) => error!(error = %e, "unable to write member export"),
            }
        }
    })
}

/// Build and write the snapshot once.
pub async fn export_once(node: &MeshNode, path: &Path) -> crate::Result<()> {
    let members = node.gossip.members().await?;
    let rtts = node.gossip.rtt_estimates().await?;
    let (_, last_update) = node.change_state();

    let snapshot = build_snapshot(&members, |name| {
        rtts.get(name).map(|d| d.as_millis() as i64)
    }, last_update);

    let content = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| crate::ServiceError::Server(e.to_string()))?;
    tokio::fs::write(path, content).await?;
    set_mode(path, 0o640)?;
    debug!(path = %path.display(), "wrote member export");
    Ok(())
}

/// Delete the snapshot file, ignoring a missing one.
pub async fn delete(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

/// Pure snapshot construction from a member list.
pub fn build_snapshot(
    members: &[Member],
    rtt_of: impl Fn(&str) -> Option<i64>,
    last_update: i64,
) -> ExportedMemberList {
    let mut out = ExportedMemberList {
        members: BTreeMap::new(),
        services: BTreeMap::new(),
        last_update,
    };

    for member in members {
        out.members.insert(
            member.name.clone(),
            ExportedMember {
                addr: member.addr.ip().to_string(),
                st: member.status.to_string(),
                rtt: rtt_of(&member.name).unwrap_or(0),
                tags: member.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
        );

        collect_service_tags(member, &mut out);
    }

    out
}

fn collect_service_tags(member: &Member, out: &mut ExportedMemberList) {
    for (key, value) in &member.tags {
        let Some(service_name) = key.strip_prefix(SVC_TAG_PREFIX) else {
            continue;
        };
        if service_name.is_empty() {
            continue;
        }

        let entry = out.services.entry(service_name.to_string()).or_default();
        entry.nodes.push(member.name.clone());

        for item in value.split(',') {
            match item.split_once('=') {
                Some(("port", port)) => {
                    if let Ok(port) = port.parse() {
                        entry.port = port;
                    }
                }
                Some((k, v)) => {
                    entry.tags.insert(k.to_string(), v.to_string());
                }
                None => {
                    if !item.is_empty() {
                        entry.tags.insert(item.to_string(), String::new());
                    }
                }
            }
        }
    }
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wgmesh_gossip::MemberStatus;

    fn member(name: &str, tags: &[(&str, &str)]) -> Member {
        Member {
            name: name.into(),
            addr: "10.232.1.1:5353".parse().unwrap(),
            status: MemberStatus::Alive,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_snapshot_members() {
        let members = vec![member("a", &[("_pk", "k1")]), member("b", &[])];
        let snap = build_snapshot(&members, |_| Some(3), 1234);

        assert_eq!(snap.last_update, 1234);
        assert_eq!(snap.members.len(), 2);
        let a = &snap.members["a"];
        assert_eq!(a.addr, "10.232.1.1");
        assert_eq!(a.st, "alive");
        assert_eq!(a.rtt, 3);
        assert_eq!(a.tags["_pk"], "k1");
    }

    #[test]
    fn test_service_tag_parsing() {
        let members = vec![
            member("a", &[("svc:web", "proto=http,port=8080")]),
            member("b", &[("svc:web", "port=8080")]),
        ];
        let snap = build_snapshot(&members, |_| None, 0);

        let web = &snap.services["web"];
        assert_eq!(web.port, 8080);
        assert_eq!(web.nodes.len(), 2);
        assert!(web.nodes.contains(&"a".to_string()));
        assert_eq!(web.tags["proto"], "http");
    }

    #[test]
    fn test_empty_service_name_skipped() {
        let members = vec![member("a", &[("svc:", "port=1")])];
        let snap = build_snapshot(&members, |_| None, 0);
        assert!(snap.services.is_empty());
    }

    #[test]
    fn test_snapshot_json_schema() {
        let members = vec![member("a", &[])];
        let snap = build_snapshot(&members, |_| None, 77);
        let json = serde_json::to_value(&snap).unwrap();

        assert!(json.get("members").is_some());
        assert!(json.get("services").is_some());
        assert_eq!(json.get("lastUpdate").unwrap().as_i64(), Some(77));
        assert_eq!(
            json["members"]["a"]["st"].as_str(),
            Some("alive"),
        );
    }
}
