//! Gossip error types.

use thiserror::Error;

/// Errors surfaced by the gossip engine.
#[derive(Debug, Error)]
pub enum GossipError {
    /// Failed to bind the gossip transport
    #[error("unable to bind gossip transport on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// User-event payload over the size limit
    #[error("user event payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Wire encode/decode failure
    #[error("wire codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The engine task is gone
    #[error("gossip engine has shut down")]
    EngineGone,

    /// IO error on the transport
    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gossip operations.
pub type Result<T, E = GossipError> = std::result::Result<T, E>;
