//! Node configuration.
//!
//! Configuration is layered: built-in defaults, then `WGMESH_*` environment
//! variables, then an optional YAML file, then command-line flags (applied by
//! the CLI layer). [`Config::validate_bootstrap`] and
//! [`Config::validate_join`] implement the startup gates; both are fatal on
//! failure.

use std::env;
use std::net::Ipv4Addr;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::{GOSSIP_KEY_LEN, MAX_MESH_NAME_LEN};

/// Main configuration struct, mirroring the YAML file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Name of the mesh to form or to join.
    pub mesh_name: String,

    /// Name of this node. Derived from the mesh IP when empty.
    pub node_name: String,

    /// Optional file the member list is exported to.
    pub memberlist_file: String,

    /// Bootstrap-mode settings.
    pub bootstrap: BootstrapConfig,

    /// Join-mode settings.
    pub join: JoinConfig,

    /// Wireguard settings.
    pub wireguard: WireguardConfig,

    /// Local agent settings.
    pub agent: AgentConfig,
}

/// Settings used when running as the bootstrap node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BootstrapConfig {
    /// CIDR range of the mesh, e.g. `10.232.0.0/16`. All mesh IPs are
    /// assigned within this range.
    pub mesh_cidr_range: String,

    /// Optional sub-CIDR of `mesh_cidr_range`; when set, addresses are
    /// assigned from this range only.
    pub mesh_ipam_cidr_range: String,

    /// Mesh IP of the bootstrap node itself. Must be RFC1918.
    pub node_ip: String,

    /// Bind address for the mesh RPC service.
    pub rpc_bind_addr: String,

    /// Bind port for the mesh RPC service.
    pub rpc_bind_port: u16,

    /// Optional TLS material for the mesh RPC service.
    pub rpc_tls: TlsServerConfig,

    /// Optional 32-byte base64 key for symmetric encryption of gossip
    /// traffic.
    pub mesh_encryption_key: String,

    /// LAN probe profile for the gossip cluster. Default is WAN.
    pub gossip_mode_lan: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            mesh_cidr_range: env_str("WGMESH_CIDR_RANGE", "10.232.0.0/16"),
            mesh_ipam_cidr_range: env_str("WGMESH_CIDR_RANGE_IPAM", ""),
            node_ip: env_str("WGMESH_MESH_IP", "10.232.1.1"),
            rpc_bind_addr: env_str("WGMESH_RPC_BIND_ADDR", "0.0.0.0"),
            rpc_bind_port: env_u16("WGMESH_RPC_BIND_PORT", 5000),
            rpc_tls: TlsServerConfig::default(),
            mesh_encryption_key: env_str("WGMESH_ENCRYPTION_KEY", ""),
            gossip_mode_lan: env_bool("WGMESH_GOSSIP_MODE_LAN", false),
        }
    }
}

/// TLS material for the server side of the mesh RPC (mTLS).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TlsServerConfig {
    /// PEM-encoded private key used by the RPC server.
    pub server_key: String,

    /// PEM-encoded certificate used by the RPC server.
    pub server_cert: String,

    /// PEM-encoded CA certificate for verifying client certificates.
    pub ca_cert: String,

    /// Directory of PEM-encoded CA certificates. Mutually exclusive with
    /// `ca_cert`.
    pub ca_path: String,
}

impl Default for TlsServerConfig {
    fn default() -> Self {
        Self {
            server_key: env_str("WGMESH_SERVER_KEY", ""),
            server_cert: env_str("WGMESH_SERVER_CERT", ""),
            ca_cert: env_str("WGMESH_CA_CERT", ""),
            ca_path: env_str("WGMESH_CA_PATH", ""),
        }
    }
}

impl TlsServerConfig {
    /// True when any TLS field is set.
    pub fn any_set(&self) -> bool {
        !self.server_key.is_empty()
            || !self.server_cert.is_empty()
            || !self.ca_cert.is_empty()
            || !self.ca_path.is_empty()
    }
}

/// Settings used when joining an existing mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JoinConfig {
    /// `IP:port` of the bootstrap node's mesh RPC endpoint.
    pub bootstrap_addr: String,

    /// Client-side TLS material.
    pub tls: TlsClientConfig,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            bootstrap_addr: env_str("WGMESH_BOOTSTRAP_ADDR", ""),
            tls: TlsClientConfig::default(),
        }
    }
}

/// TLS material for the client side of the mesh RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TlsClientConfig {
    /// PEM-encoded client private key.
    pub client_key: String,

    /// PEM-encoded client certificate.
    pub client_cert: String,

    /// PEM-encoded CA certificate used to verify the server.
    pub ca_cert: String,
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self {
            client_key: env_str("WGMESH_CLIENT_KEY", ""),
            client_cert: env_str("WGMESH_CLIENT_CERT", ""),
            ca_cert: env_str("WGMESH_CA_CERT", ""),
        }
    }
}

impl TlsClientConfig {
    /// True when any TLS field is set.
    pub fn any_set(&self) -> bool {
        !self.client_key.is_empty() || !self.client_cert.is_empty() || !self.ca_cert.is_empty()
    }
}

/// Wireguard-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WireguardConfig {
    /// External IP address the tunnel listens on. Required; discovery of the
    /// public address is left to the operator or external tooling.
    pub listen_addr: String,

    /// External wireguard listen port.
    pub listen_port: u16,
}

impl Default for WireguardConfig {
    fn default() -> Self {
        Self {
            listen_addr: env_str("WGMESH_WIREGUARD_LISTEN_ADDR", ""),
            listen_port: env_u16("WGMESH_WIREGUARD_LISTEN_PORT", 54540),
        }
    }
}

/// Local agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentConfig {
    /// Unix socket path the agent RPC binds to. Empty disables the agent.
    pub bind_socket: String,

    /// Optional `uid:gid` ownership applied to the bind socket.
    pub bind_socket_id: String,

    /// Unix socket path agent clients connect to.
    pub socket: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_socket: env_str("WGMESH_AGENT_BIND_SOCKET", "/var/run/wgmesh.sock"),
            bind_socket_id: env_str("WGMESH_AGENT_BIND_SOCKET_ID", ""),
            socket: env_str("WGMESH_AGENT_SOCKET", "/var/run/wgmesh.sock"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, layered over the env-seeded
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse the mesh CIDR range.
    pub fn mesh_cidr(&self) -> Result<Ipv4Net> {
        self.bootstrap
            .mesh_cidr_range
            .parse::<Ipv4Net>()
            .map_err(|_| {
                ConfigError::invalid(
                    "bootstrap.mesh-cidr-range",
                    format!(
                        "{} is not a valid IPv4 CIDR range",
                        self.bootstrap.mesh_cidr_range
                    ),
                )
            })
    }

    /// Parse the optional IPAM sub-range. `None` when unset.
    pub fn ipam_cidr(&self) -> Result<Option<Ipv4Net>> {
        if self.bootstrap.mesh_ipam_cidr_range.is_empty() {
            return Ok(None);
        }
        self.bootstrap
            .mesh_ipam_cidr_range
            .parse::<Ipv4Net>()
            .map(Some)
            .map_err(|_| {
                ConfigError::invalid(
                    "bootstrap.mesh-ipam-cidr-range",
                    format!(
                        "{} is not a valid IPv4 CIDR range",
                        self.bootstrap.mesh_ipam_cidr_range
                    ),
                )
            })
    }

    /// Decode the gossip encryption key. `None` when unset.
    pub fn gossip_key(&self) -> Result<Option<[u8; GOSSIP_KEY_LEN]>> {
        if self.bootstrap.mesh_encryption_key.is_empty() {
            return Ok(None);
        }
        let bytes = BASE64
            .decode(&self.bootstrap.mesh_encryption_key)
            .map_err(|_| {
                ConfigError::invalid(
                    "bootstrap.mesh-encryption-key",
                    "must be base64-encoded".to_string(),
                )
            })?;
        let key: [u8; GOSSIP_KEY_LEN] = bytes.try_into().map_err(|_| {
            ConfigError::invalid(
                "bootstrap.mesh-encryption-key",
                format!("must decode to exactly {} bytes", GOSSIP_KEY_LEN),
            )
        })?;
        Ok(Some(key))
    }

    fn validate_common(&self, dev_mode: bool) -> Result<()> {
        if self.mesh_name.len() > MAX_MESH_NAME_LEN {
            return Err(ConfigError::invalid(
                "mesh-name",
                format!("must have maximum length of {}", MAX_MESH_NAME_LEN),
            ));
        }

        if !self.agent.bind_socket_id.is_empty() && parse_uid_gid(&self.agent.bind_socket_id).is_none() {
            return Err(ConfigError::invalid(
                "agent.bind-socket-id",
                format!("{} is not of the form uid:gid", self.agent.bind_socket_id),
            ));
        }

        if dev_mode && !self.bootstrap.mesh_encryption_key.is_empty() {
            return Err(ConfigError::ModeConflict(
                "cannot combine security parameter mesh-encryption-key with dev mode".into(),
            ));
        }

        Ok(())
    }

    /// Validate settings for bootstrap mode.
    pub fn validate_bootstrap(&self, dev_mode: bool) -> Result<()> {
        self.validate_common(dev_mode)?;

        let cidr = self.mesh_cidr()?;
        if let Some(ipam) = self.ipam_cidr()? {
            // the whole IPAM range must sit inside the mesh range
            if !(cidr.contains(&ipam.network()) && cidr.contains(&ipam.broadcast())) {
                return Err(ConfigError::invalid(
                    "bootstrap.mesh-ipam-cidr-range",
                    format!("{} is not contained in {}", ipam, cidr),
                ));
            }
        }

        let node_ip: Ipv4Addr = self.bootstrap.node_ip.parse().map_err(|_| {
            ConfigError::invalid(
                "bootstrap.node-ip",
                format!("{} is not a valid IPv4 address", self.bootstrap.node_ip),
            )
        })?;
        if !is_private_ipv4(node_ip) {
            return Err(ConfigError::invalid(
                "bootstrap.node-ip",
                format!("{} is not RFC1918, must be a private address", node_ip),
            ));
        }

        if self.bootstrap.rpc_bind_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::invalid(
                "bootstrap.rpc-bind-addr",
                format!("{} is not a valid IP address", self.bootstrap.rpc_bind_addr),
            ));
        }

        self.gossip_key()?;

        let tls = &self.bootstrap.rpc_tls;
        if tls.any_set() {
            if tls.server_key.is_empty()
                || tls.server_cert.is_empty()
                || (tls.ca_cert.is_empty() && tls.ca_path.is_empty())
            {
                return Err(ConfigError::ModeConflict(
                    "server-key, server-cert and ca-cert / ca-path must be specified together"
                        .into(),
                ));
            }
            if !tls.ca_cert.is_empty() && !tls.ca_path.is_empty() {
                return Err(ConfigError::ModeConflict(
                    "ca-cert and ca-path are mutually exclusive".into(),
                ));
            }
            if dev_mode {
                return Err(ConfigError::ModeConflict(
                    "cannot combine TLS parameters with dev mode".into(),
                ));
            }
            for (key, path) in [
                ("server-key", &tls.server_key),
                ("server-cert", &tls.server_cert),
            ] {
                if !Path::new(path).is_file() {
                    return Err(ConfigError::invalid(key, format!("{} not found", path)));
                }
            }
            if !tls.ca_cert.is_empty() && !Path::new(&tls.ca_cert).is_file() {
                return Err(ConfigError::invalid(
                    "ca-cert",
                    format!("{} not found", tls.ca_cert),
                ));
            }
            if !tls.ca_path.is_empty() && !Path::new(&tls.ca_path).is_dir() {
                return Err(ConfigError::invalid(
                    "ca-path",
                    format!("{} not found", tls.ca_path),
                ));
            }
        } else if !dev_mode {
            return Err(ConfigError::ModeConflict(
                "must either set dev mode for an insecure setup or provide server-key, \
                 server-cert and ca-cert / ca-path"
                    .into(),
            ));
        }

        Ok(())
    }

    /// Validate settings for join mode.
    pub fn validate_join(&self, dev_mode: bool) -> Result<()> {
        self.validate_common(dev_mode)?;

        if self.mesh_name.is_empty() {
            return Err(ConfigError::Missing("mesh-name".into()));
        }

        let (host, port) = self
            .join
            .bootstrap_addr
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::invalid("join.bootstrap-addr", "must be IP:port"))?;
        if host.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::invalid(
                "join.bootstrap-addr",
                format!("{} is not a valid IPv4 address", host),
            ));
        }
        if port.parse::<u16>().is_err() {
            return Err(ConfigError::invalid(
                "join.bootstrap-addr",
                format!("{} is not a valid port", port),
            ));
        }

        let tls = &self.join.tls;
        if tls.any_set() {
            if tls.client_key.is_empty() || tls.client_cert.is_empty() || tls.ca_cert.is_empty() {
                return Err(ConfigError::ModeConflict(
                    "client-key, client-cert and ca-cert must be specified together".into(),
                ));
            }
            if dev_mode {
                return Err(ConfigError::ModeConflict(
                    "cannot combine TLS parameters with dev mode".into(),
                ));
            }
            for (key, path) in [
                ("client-key", &tls.client_key),
                ("client-cert", &tls.client_cert),
                ("ca-cert", &tls.ca_cert),
            ] {
                if !Path::new(path).is_file() {
                    return Err(ConfigError::invalid(key, format!("{} not found", path)));
                }
            }
        } else if !dev_mode {
            return Err(ConfigError::ModeConflict(
                "must either set dev mode for an insecure setup or provide client-key, \
                 client-cert and ca-cert"
                    .into(),
            ));
        }

        Ok(())
    }
}

/// Check whether an IPv4 address is within the RFC1918 private ranges.
pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let blocks = [
        "10.0.0.0/8".parse::<Ipv4Net>().unwrap(),
        "172.16.0.0/12".parse::<Ipv4Net>().unwrap(),
        "192.168.0.0/16".parse::<Ipv4Net>().unwrap(),
    ];
    blocks.iter().any(|b| b.contains(&ip))
}

/// Parse a `uid:gid` string.
pub fn parse_uid_gid(s: &str) -> Option<(u32, u32)> {
    let (uid, gid) = s.split_once(':')?;
    Some((uid.parse().ok()?, gid.parse().ok()?))
}

fn env_str(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v.parse().unwrap_or(default),
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) if !v.is_empty() => matches!(v.as_str(), "1" | "true" | "on"),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> Config {
        Config {
            mesh_name: "test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.bootstrap.mesh_cidr_range, "10.232.0.0/16");
        assert_eq!(cfg.bootstrap.node_ip, "10.232.1.1");
        assert_eq!(cfg.wireguard.listen_port, 54540);
        assert_eq!(cfg.bootstrap.rpc_bind_port, 5000);
    }

    #[test]
    fn test_validate_bootstrap_dev_ok() {
        let cfg = dev_config();
        cfg.validate_bootstrap(true).unwrap();
    }

    #[test]
    fn test_mesh_name_too_long() {
        let mut cfg = dev_config();
        cfg.mesh_name = "averylongmeshname".into();
        assert!(cfg.validate_bootstrap(true).is_err());
    }

    #[test]
    fn test_rejects_ipv6_cidr() {
        let mut cfg = dev_config();
        cfg.bootstrap.mesh_cidr_range = "fd00::/64".into();
        assert!(cfg.validate_bootstrap(true).is_err());
    }

    #[test]
    fn test_rejects_public_node_ip() {
        let mut cfg = dev_config();
        cfg.bootstrap.node_ip = "8.8.8.8".into();
        assert!(cfg.validate_bootstrap(true).is_err());
    }

    #[test]
    fn test_ipam_must_be_within_cidr() {
        let mut cfg = dev_config();
        cfg.bootstrap.mesh_ipam_cidr_range = "10.233.0.0/24".into();
        assert!(cfg.validate_bootstrap(true).is_err());

        cfg.bootstrap.mesh_ipam_cidr_range = "10.232.4.0/24".into();
        cfg.validate_bootstrap(true).unwrap();
    }

    #[test]
    fn test_encryption_key_must_be_32_bytes() {
        let mut cfg = dev_config();
        cfg.bootstrap.mesh_encryption_key = BASE64.encode([0u8; 16]);
        assert!(cfg.validate_bootstrap(false).is_err());

        cfg.bootstrap.mesh_encryption_key = BASE64.encode([0u8; 32]);
        // still fails: secure mode requires TLS material
        assert!(cfg.validate_bootstrap(false).is_err());
    }

    #[test]
    fn test_dev_mode_excludes_encryption_key() {
        let mut cfg = dev_config();
        cfg.bootstrap.mesh_encryption_key = BASE64.encode([0u8; 32]);
        assert!(cfg.validate_bootstrap(true).is_err());
    }

    #[test]
    fn test_non_dev_requires_tls() {
        let cfg = dev_config();
        assert!(cfg.validate_bootstrap(false).is_err());
    }

    #[test]
    fn test_validate_join() {
        let mut cfg = dev_config();
        cfg.join.bootstrap_addr = "192.168.1.1:5000".into();
        cfg.validate_join(true).unwrap();

        cfg.join.bootstrap_addr = "not-an-addr".into();
        assert!(cfg.validate_join(true).is_err());

        cfg.join.bootstrap_addr = "192.168.1.1:notaport".into();
        assert!(cfg.validate_join(true).is_err());
    }

    #[test]
    fn test_join_requires_mesh_name() {
        let mut cfg = dev_config();
        cfg.mesh_name = String::new();
        cfg.join.bootstrap_addr = "192.168.1.1:5000".into();
        assert!(cfg.validate_join(true).is_err());
    }

    #[test]
    fn test_parse_uid_gid() {
        assert_eq!(parse_uid_gid("1000:1000"), Some((1000, 1000)));
        assert_eq!(parse_uid_gid("1000"), None);
        assert_eq!(parse_uid_gid("a:b"), None);
    }

    #[test]
    fn test_is_private_ipv4() {
        assert!(is_private_ipv4("10.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4("172.16.0.1".parse().unwrap()));
        assert!(is_private_ipv4("192.168.1.1".parse().unwrap()));
        assert!(!is_private_ipv4("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ipv4("172.32.0.1".parse().unwrap()));
    }
}
