//! Core configuration and error types shared across the wgmesh crates.
//!
//! A mesh is identified by a short name and parameterized by an IPv4 CIDR.
//! The [`config::Config`] struct mirrors the YAML configuration file and the
//! `WGMESH_*` environment variables; [`config::Config::validate`] enforces
//! every startup gate (mesh name length, private bootstrap IP, port ranges,
//! encryption key size, dev/TLS exclusivity, IPAM containment).

pub mod config;
pub mod error;

pub use config::{
    AgentConfig, BootstrapConfig, Config, JoinConfig, TlsClientConfig, TlsServerConfig,
    WireguardConfig,
};
pub use error::{ConfigError, Result};

/// Maximum length of a mesh name.
pub const MAX_MESH_NAME_LEN: usize = 10;

/// Length in bytes of the symmetric gossip encryption key.
pub const GOSSIP_KEY_LEN: usize = 32;
