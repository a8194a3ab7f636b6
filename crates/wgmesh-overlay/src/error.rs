//! Error types for overlay operations.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur during mesh IP allocation or tunnel management.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Invalid CIDR notation
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    /// IPAM range not contained in the mesh range
    #[error("IPAM range {ipam} is not contained in mesh range {cidr}")]
    IpamNotInCidr { ipam: String, cidr: String },

    /// Address pool exhausted
    #[error("no free mesh IP in {0} after bounded retries")]
    AddressExhausted(String),

    /// Range too small to hold any host address
    #[error("range {0} holds no usable host addresses")]
    RangeTooSmall(String),

    /// IP not inside the effective range
    #[error("IP address {0} is not within range {1}")]
    IpNotInRange(Ipv4Addr, String),

    /// Interface already exists
    #[error("a wireguard interface for this mesh already exists: {0}")]
    InterfaceExists(String),

    /// A `wg` or `ip` invocation failed
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for overlay operations.
pub type Result<T, E = OverlayError> = std::result::Result<T, E>;
