//! Service error types.

use thiserror::Error;

/// Errors raised by the node runtime.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Gossip engine error
    #[error("gossip error: {0}")]
    Gossip(#[from] wgmesh_gossip::GossipError),

    /// Tunnel / allocator error
    #[error("overlay error: {0}")]
    Overlay(#[from] wgmesh_overlay::OverlayError),

    /// Join token could not be issued or verified
    #[error("join token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// TLS material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Payload encode/decode failure
    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Server failure
    #[error("server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for service operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
