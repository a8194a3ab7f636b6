//! The wgmesh node runtime.
//!
//! Ties the gossip membership engine, the WireGuard peer table and the
//! exported snapshot together:
//!
//! - [`node::MeshNode`] owns the gossip handle, the tunnel wrapper and all
//!   shared node state — there are no hidden singletons.
//! - [`router`] consumes the gossip event channel and is the only place
//!   peer-table mutations happen outside the bootstrap's join path.
//! - [`rpc::mesh`] serves the internet-facing join protocol
//!   (handshake / join / peers), optionally behind mutual TLS.
//! - [`rpc::agent`] serves the operator surface on a local Unix socket.
//! - [`export`] materializes the member and service view to a JSON file.
//! - [`rtt`] implements the probe/response protocol for pairwise round-trip
//!   measurements.

pub mod export;
pub mod joiner;
pub mod node;
pub mod payload;
pub mod router;
pub mod rpc;
pub mod rtt;
pub mod stats;
pub mod tls;
pub mod token;

mod error;

pub use error::{Result, ServiceError};
pub use node::{MeshNode, NodeParams};
