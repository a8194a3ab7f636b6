//! WireGuard kernel device management.
//!
//! Drives the kernel module through the `ip` and `wg` binaries: interface
//! create/up/remove, address and route assignment, and dynamic peer
//! add/remove. Key generation is native (x25519-dalek), no `wg genkey`
//! required.
//!
//! The [`Tunnel`] trait is the seam the event router mutates the peer table
//! through; production code uses [`WgDevice`], tests substitute a recording
//! double.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{OverlayError, Result};

/// A peer entry as installed into the tunnel: public key, remote endpoint,
/// and the peer's mesh IP as the single allowed IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSpec {
    /// Peer's WireGuard public key (base64).
    pub public_key: String,

    /// Peer's remote endpoint IP.
    pub endpoint_ip: IpAddr,

    /// Peer's remote endpoint port.
    pub endpoint_port: u16,

    /// Peer's mesh IP; installed as `<ip>/32` allowed IP.
    pub mesh_ip: Ipv4Addr,
}

impl PeerSpec {
    /// The allowed-IPs value for this peer.
    pub fn allowed_ip(&self) -> String {
        format!("{}/32", self.mesh_ip)
    }

    /// The `host:port` endpoint string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.endpoint_ip, self.endpoint_port)
    }
}

/// Mutating view of the tunnel peer table.
///
/// `add_peer` returns `Ok(false)` when an entry for the public key is
/// already present, mirroring the kernel behavior of treating re-adds as
/// updates; callers decide whether that is an error.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Install a peer entry. Returns `false` if the key was already present.
    async fn add_peer(&self, peer: &PeerSpec) -> Result<bool>;

    /// Remove the peer entry with the given public key.
    async fn remove_peer(&self, public_key: &str) -> Result<()>;

    /// List the public keys of all installed peers.
    async fn peer_keys(&self) -> Result<Vec<String>>;
}

/// Handle to a kernel WireGuard interface named after the mesh
/// (`wg<meshname>`).
#[derive(Debug, Clone)]
pub struct WgDevice {
    interface: String,
    public_key: String,
}

impl WgDevice {
    /// Interface name for a mesh.
    pub fn interface_name(mesh_name: &str) -> String {
        format!("wg{}", mesh_name)
    }

    /// Create the WireGuard interface for a mesh, generate a keypair,
    /// configure the private key and listen port. The interface is not
    /// brought up and carries no address yet.
    ///
    /// Fails with [`OverlayError::InterfaceExists`] when an interface of
    /// that name is already present.
    pub async fn create(mesh_name: &str, listen_port: u16) -> Result<Self> {
        let interface = Self::interface_name(mesh_name);

        if run("ip", &["link", "show", &interface]).await.is_ok() {
            return Err(OverlayError::InterfaceExists(interface));
        }

        run("ip", &["link", "add", "dev", &interface, "type", "wireguard"]).await?;

        let (private_key, public_key) = generate_keys();

        // `wg set private-key` reads the key from a file
        let key_path = format!("/etc/wireguard/{}.key", interface);
        tokio::fs::create_dir_all("/etc/wireguard").await?;
        tokio::fs::write(&key_path, &private_key).await?;
        set_mode(&key_path, 0o600).await?;

        run(
            "wg",
            &[
                "set",
                &interface,
                "private-key",
                &key_path,
                "listen-port",
                &listen_port.to_string(),
            ],
        )
        .await?;

        info!(interface = %interface, port = listen_port, "created wireguard interface");

        Ok(Self {
            interface,
            public_key,
        })
    }

    /// This node's public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Assign the mesh IP to the interface. Idempotent.
    pub async fn assign_address(&self, ip: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let addr = format!("{}/{}", ip, prefix_len);
        match run("ip", &["address", "add", "dev", &self.interface, &addr]).await {
            Ok(_) => Ok(()),
            Err(OverlayError::CommandFailed { stderr, .. }) if stderr.contains("File exists") => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bring the interface up.
    pub async fn up(&self) -> Result<()> {
        run("ip", &["link", "set", "dev", &self.interface, "up"]).await?;
        debug!(interface = %self.interface, "interface up");
        Ok(())
    }

    /// Route the mesh CIDR through the interface. Idempotent.
    pub async fn set_route(&self, cidr: Ipv4Net) -> Result<()> {
        let target = cidr.to_string();
        match run("ip", &["route", "add", &target, "dev", &self.interface]).await {
            Ok(_) => {
                debug!(target = %target, interface = %self.interface, "added route");
                Ok(())
            }
            Err(OverlayError::CommandFailed { stderr, .. }) if stderr.contains("File exists") => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the interface and its key file. Missing interface is not an
    /// error so shutdown paths can call this unconditionally.
    pub async fn remove(&self) -> Result<()> {
        match run("ip", &["link", "delete", "dev", &self.interface]).await {
            Ok(_) => {}
            Err(OverlayError::CommandFailed { stderr, .. })
                if stderr.contains("Cannot find device") => {}
            Err(e) => return Err(e),
        }
        let key_path = format!("/etc/wireguard/{}.key", self.interface);
        let _ = tokio::fs::remove_file(&key_path).await;
        info!(interface = %self.interface, "removed wireguard interface");
        Ok(())
    }
}

#[async_trait]
impl Tunnel for WgDevice {
    async fn add_peer(&self, peer: &PeerSpec) -> Result<bool> {
        let existing = self.peer_keys().await?;
        if existing.iter().any(|k| k == &peer.public_key) {
            return Ok(false);
        }

        run(
            "wg",
            &[
                "set",
                &self.interface,
                "peer",
                &peer.public_key,
                "endpoint",
                &peer.endpoint(),
                "allowed-ips",
                &peer.allowed_ip(),
            ],
        )
        .await?;

        debug!(
            peer = %peer.public_key,
            allowed_ip = %peer.allowed_ip(),
            interface = %self.interface,
            "added peer"
        );
        Ok(true)
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        run(
            "wg",
            &["set", &self.interface, "peer", public_key, "remove"],
        )
        .await?;
        debug!(peer = %public_key, interface = %self.interface, "removed peer");
        Ok(())
    }

    async fn peer_keys(&self) -> Result<Vec<String>> {
        let stdout = run("wg", &["show", &self.interface, "peers"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// In-memory tunnel double recording peer-table mutations.
///
/// Used by router and join-protocol tests in place of [`WgDevice`].
#[derive(Debug, Default)]
pub struct MockTunnel {
    peers: std::sync::Mutex<Vec<PeerSpec>>,
}

impl MockTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the installed peer entries.
    pub fn installed(&self) -> Vec<PeerSpec> {
        self.peers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tunnel for MockTunnel {
    async fn add_peer(&self, peer: &PeerSpec) -> Result<bool> {
        let mut peers = self.peers.lock().unwrap();
        if peers.iter().any(|p| p.public_key == peer.public_key) {
            return Ok(false);
        }
        peers.push(peer.clone());
        Ok(true)
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        self.peers
            .lock()
            .unwrap()
            .retain(|p| p.public_key != public_key);
        Ok(())
    }

    async fn peer_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .peers
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.public_key.clone())
            .collect())
    }
}

/// Generate a WireGuard keypair natively. Returns `(private, public)` in
/// base64.
pub fn generate_keys() -> (String, String) {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rand::rngs::OsRng;
    use x25519_dalek::{PublicKey, StaticSecret};

    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    (
        STANDARD.encode(secret.to_bytes()),
        STANDARD.encode(public.as_bytes()),
    )
}

async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(OverlayError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

async fn set_mode(path: &str, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}
