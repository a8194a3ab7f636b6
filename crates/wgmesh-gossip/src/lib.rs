//! Gossip-based membership for wgmesh.
//!
//! Maintains an eventually-consistent member set with per-member metadata
//! tags, SWIM-style failure detection (probe / suspect / fail / reap), a
//! best-effort user-event bus with bounded payloads, and smoothed round-trip
//! distance estimates per member.
//!
//! The engine runs as a single actor task owning all membership state.
//! Callers interact through a cloneable [`GossipHandle`]; membership and
//! user events are delivered on the single-consumer channel returned by
//! [`Gossip::start`].
//!
//! ```ignore
//! let cfg = GossipConfig::new("node-a", "10.232.1.1:5353".parse()?);
//! let (gossip, events) = Gossip::start(cfg).await?;
//!
//! gossip.join(vec!["10.232.1.2:5353".parse()?]).await?;
//! gossip.user_event("_j", payload).await?;
//!
//! while let Some(ev) = events.recv().await {
//!     // translate membership transitions into peer-table mutations
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod member;
pub mod message;

mod crypto;

pub use config::{GossipConfig, GOSSIP_PORT, USER_EVENT_SIZE_LIMIT};
pub use engine::{Gossip, GossipHandle};
pub use error::{GossipError, Result};
pub use member::{Event, Member, MemberStatus, UserEvent};
