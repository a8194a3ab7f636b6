//! CLI argument definitions.
//!
//! Every flag has a `WGMESH_*` environment equivalent; flags win over the
//! environment, the environment wins over the config file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Automatic encrypted overlay mesh networks over WireGuard
#[derive(Parser)]
#[command(name = "wgmesh", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug (trace) logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new mesh as its bootstrap node
    Bootstrap(BootstrapArgs),

    /// Join an existing mesh
    Join(JoinArgs),

    /// Show mesh and node status from a running node's agent
    Info(InfoArgs),

    /// Show, set or delete this node's tags
    Tags(TagsArgs),

    /// Collect pairwise round-trip times across the mesh
    Rtt(RttArgs),

    /// Serve the web dashboard for a running node
    Ui(UiArgs),

    /// Print the version
    Version,
}

#[derive(Args)]
pub struct BootstrapArgs {
    /// Optional YAML configuration file
    #[arg(long, env = "WGMESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the mesh network (max 10 characters)
    #[arg(short = 'n', long = "name", env = "WGMESH_MESH_NAME")]
    pub mesh_name: Option<String>,

    /// Name of this node; derived from the mesh IP when omitted
    #[arg(long, env = "WGMESH_NODE_NAME")]
    pub node_name: Option<String>,

    /// CIDR range of the mesh (internal IPs)
    #[arg(long, env = "WGMESH_CIDR_RANGE")]
    pub cidr: Option<String>,

    /// Sub-range of --cidr this node allocates addresses from
    #[arg(long = "cidr-ipam", env = "WGMESH_CIDR_RANGE_IPAM")]
    pub cidr_ipam: Option<String>,

    /// Mesh IP of the bootstrap node; must be RFC1918
    #[arg(long = "ip", env = "WGMESH_MESH_IP")]
    pub ip: Option<String>,

    /// External wireguard listen address
    #[arg(long, env = "WGMESH_WIREGUARD_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// External wireguard listen port
    #[arg(long, env = "WGMESH_WIREGUARD_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Address to bind the mesh RPC service to
    #[arg(long, env = "WGMESH_RPC_BIND_ADDR")]
    pub rpc_bind_addr: Option<String>,

    /// Port to bind the mesh RPC service to
    #[arg(long, env = "WGMESH_RPC_BIND_PORT")]
    pub rpc_bind_port: Option<u16>,

    /// PEM-encoded private key for the mesh RPC server
    #[arg(long, env = "WGMESH_SERVER_KEY")]
    pub server_key: Option<String>,

    /// PEM-encoded certificate for the mesh RPC server
    #[arg(long, env = "WGMESH_SERVER_CERT")]
    pub server_cert: Option<String>,

    /// PEM-encoded CA certificate for verifying client certificates
    #[arg(long, env = "WGMESH_CA_CERT")]
    pub ca_cert: Option<String>,

    /// Directory of PEM-encoded CA certificates
    #[arg(long, env = "WGMESH_CA_PATH")]
    pub ca_path: Option<String>,

    /// File the current member list is exported to
    #[arg(long, env = "WGMESH_MEMBERLIST_FILE")]
    pub memberlist_file: Option<String>,

    /// 32-byte base64 key for symmetric encryption of mesh-internal traffic
    #[arg(long, env = "WGMESH_ENCRYPTION_KEY")]
    pub mesh_encryption_key: Option<String>,

    /// LAN probe profile for cluster communication (default is WAN)
    #[arg(long)]
    pub gossip_mode_lan: bool,

    /// Development mode: no TLS, no encryption, no authentication
    #[arg(long)]
    pub dev: bool,

    /// Local socket to bind the agent to
    #[arg(long, env = "WGMESH_AGENT_BIND_SOCKET")]
    pub agent_bind_socket: Option<String>,

    /// uid:gid ownership applied to the agent socket
    #[arg(long, env = "WGMESH_AGENT_BIND_SOCKET_ID")]
    pub agent_bind_socket_id: Option<String>,
}

#[derive(Args)]
pub struct JoinArgs {
    /// Optional YAML configuration file
    #[arg(long, env = "WGMESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the mesh network to join
    #[arg(short = 'n', long = "name", env = "WGMESH_MESH_NAME")]
    pub mesh_name: Option<String>,

    /// Name of this node; derived from the assigned mesh IP when omitted
    #[arg(long, env = "WGMESH_NODE_NAME")]
    pub node_name: Option<String>,

    /// IP:port of the bootstrap node's mesh RPC endpoint
    #[arg(long, env = "WGMESH_BOOTSTRAP_ADDR")]
    pub bootstrap_addr: Option<String>,

    /// External wireguard listen address
    #[arg(long, env = "WGMESH_WIREGUARD_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// External wireguard listen port
    #[arg(long, env = "WGMESH_WIREGUARD_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// PEM-encoded client private key
    #[arg(long, env = "WGMESH_CLIENT_KEY")]
    pub client_key: Option<String>,

    /// PEM-encoded client certificate
    #[arg(long, env = "WGMESH_CLIENT_CERT")]
    pub client_cert: Option<String>,

    /// PEM-encoded CA certificate for verifying the server
    #[arg(long, env = "WGMESH_CA_CERT")]
    pub ca_cert: Option<String>,

    /// File the current member list is exported to
    #[arg(long, env = "WGMESH_MEMBERLIST_FILE")]
    pub memberlist_file: Option<String>,

    /// Development mode: no TLS, no encryption, no authentication
    #[arg(long)]
    pub dev: bool,

    /// Local socket to bind the agent to
    #[arg(long, env = "WGMESH_AGENT_BIND_SOCKET")]
    pub agent_bind_socket: Option<String>,

    /// uid:gid ownership applied to the agent socket
    #[arg(long, env = "WGMESH_AGENT_BIND_SOCKET_ID")]
    pub agent_bind_socket_id: Option<String>,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Agent socket to dial
    #[arg(long, env = "WGMESH_AGENT_SOCKET", default_value = "/var/run/wgmesh.sock")]
    pub agent_socket: String,

    /// Watch for changes until interrupted
    #[arg(long)]
    pub watch: bool,
}

#[derive(Args)]
pub struct TagsArgs {
    /// Agent socket to dial
    #[arg(long, env = "WGMESH_AGENT_SOCKET", default_value = "/var/run/wgmesh.sock")]
    pub agent_socket: String,

    /// Set a tag: key=value
    #[arg(long)]
    pub set: Option<String>,

    /// Delete a tag by key
    #[arg(long)]
    pub delete: Option<String>,
}

#[derive(Args)]
pub struct RttArgs {
    /// Agent socket to dial
    #[arg(long, env = "WGMESH_AGENT_SOCKET", default_value = "/var/run/wgmesh.sock")]
    pub agent_socket: String,
}

#[derive(Args)]
pub struct UiArgs {
    /// Agent socket the dashboard reads from
    #[arg(long, env = "WGMESH_AGENT_SOCKET", default_value = "/var/run/wgmesh.sock")]
    pub agent_socket: String,

    /// Address to bind the dashboard to
    #[arg(long, env = "WGMESH_HTTP_BIND_ADDR", default_value = "127.0.0.1")]
    pub http_bind_addr: String,

    /// Port to bind the dashboard to
    #[arg(long, env = "WGMESH_HTTP_BIND_PORT", default_value_t = 9095)]
    pub http_bind_port: u16,
}
