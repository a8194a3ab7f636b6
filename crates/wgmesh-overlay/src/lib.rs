//! Mesh IP allocation and WireGuard interface management.
//!
//! The [`allocator`] module hands out unused mesh IPs within the mesh CIDR
//! (optionally restricted to an IPAM sub-range). The [`wireguard`] module
//! drives the kernel WireGuard device through the `ip` and `wg` binaries and
//! exposes the [`wireguard::Tunnel`] trait so that peer-table mutations can
//! be exercised against a test double.

pub mod allocator;
pub mod error;
pub mod wireguard;

pub use allocator::MeshIpAllocator;
pub use error::{OverlayError, Result};
pub use wireguard::{MockTunnel, PeerSpec, Tunnel, WgDevice};
