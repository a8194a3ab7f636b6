//! Member and event types.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a mesh member as seen by gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Responding to probes.
    Alive,
    /// Missed a probe; may still come back.
    Suspect,
    /// Declared dead by the failure detector.
    Failed,
    /// Announced a graceful leave.
    Left,
    /// Removed from the member list.
    Reaped,
}

impl MemberStatus {
    /// True for statuses that count towards the live node set.
    pub fn is_live(self) -> bool {
        matches!(self, MemberStatus::Alive | MemberStatus::Suspect)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Suspect => "suspect",
            MemberStatus::Failed => "failed",
            MemberStatus::Left => "left",
            MemberStatus::Reaped => "reaped",
        };
        f.write_str(s)
    }
}

/// A mesh member with its gossip address and published tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Node name, unique within the mesh.
    pub name: String,

    /// Gossip transport address (mesh IP, port 5353).
    pub addr: SocketAddr,

    /// Lifecycle status.
    pub status: MemberStatus,

    /// Published tag map. Keys prefixed with `_` are reserved metadata.
    pub tags: HashMap<String, String>,
}

impl Member {
    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// A named broadcast with an opaque payload.
#[derive(Debug, Clone)]
pub struct UserEvent {
    /// Event name, e.g. `_j` for a join announcement.
    pub name: String,

    /// Opaque payload, at most the configured size limit.
    pub payload: Vec<u8>,

    /// Name of the originating node.
    pub origin: String,
}

/// Events delivered to the single consumer of the gossip channel.
#[derive(Debug, Clone)]
pub enum Event {
    /// Members newly seen as alive.
    MemberJoin(Vec<Member>),
    /// Members whose tags changed.
    MemberUpdate(Vec<Member>),
    /// Members that announced a graceful leave.
    MemberLeave(Vec<Member>),
    /// Members declared failed by the failure detector.
    MemberFailed(Vec<Member>),
    /// Members removed by the reaper.
    MemberReap(Vec<Member>),
    /// A user-event broadcast.
    User(UserEvent),
}

impl Event {
    /// Short event kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MemberJoin(_) => "member-join",
            Event::MemberUpdate(_) => "member-update",
            Event::MemberLeave(_) => "member-leave",
            Event::MemberFailed(_) => "member-failed",
            Event::MemberReap(_) => "member-reap",
            Event::User(_) => "user",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_snapshot_vocabulary() {
        assert_eq!(MemberStatus::Alive.to_string(), "alive");
        assert_eq!(MemberStatus::Suspect.to_string(), "suspect");
        assert_eq!(MemberStatus::Failed.to_string(), "failed");
        assert_eq!(MemberStatus::Left.to_string(), "left");
        assert_eq!(MemberStatus::Reaped.to_string(), "reaped");
    }

    #[test]
    fn test_live_statuses() {
        assert!(MemberStatus::Alive.is_live());
        assert!(MemberStatus::Suspect.is_live());
        assert!(!MemberStatus::Failed.is_live());
        assert!(!MemberStatus::Left.is_live());
        assert!(!MemberStatus::Reaped.is_live());
    }
}
