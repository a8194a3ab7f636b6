//! The `join` command: handshake and join against a bootstrap node,
//! install all current peers, then enter the gossip cluster.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ipnet::Ipv4Net;
use tracing::{debug, info, warn};
use wgmesh_core::Config;
use wgmesh_overlay::{Tunnel, WgDevice};
use wgmesh_service::rpc::mesh::{
    HandshakeRequest, HandshakeResponse, JoinRequest, JoinResponse, Peer, RpcResult,
};
use wgmesh_service::{joiner, MeshNode, NodeParams};

use super::runtime::NodeRuntime;
use crate::cli::JoinArgs;

/// Deadline for each join RPC call.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: JoinArgs) -> Result<()> {
    let (cfg, dev_mode) = merge_config(&args)?;
    cfg.validate_join(dev_mode)?;

    let listen_addr = super::bootstrap::parse_listen_addr(&cfg.wireguard.listen_addr)?;

    let device = WgDevice::create(&cfg.mesh_name, cfg.wireguard.listen_port).await?;
    let result = join_and_serve(&cfg, dev_mode, device.clone(), listen_addr).await;

    if let Err(e) = result {
        // the interface must not outlive a failed join
        let _ = device.remove().await;
        return Err(e);
    }
    Ok(())
}

async fn join_and_serve(
    cfg: &Config,
    dev_mode: bool,
    device: WgDevice,
    listen_addr: IpAddr,
) -> Result<()> {
    let client = build_client(cfg, dev_mode)?;
    let scheme = if dev_mode { "http" } else { "https" };
    let base = format!("{}://{}", scheme, cfg.join.bootstrap_addr);

    // phase 1: handshake
    let handshake: HandshakeResponse = client
        .post(format!("{}/v1/handshake", base))
        .json(&HandshakeRequest {
            mesh_name: cfg.mesh_name.clone(),
        })
        .send()
        .await
        .with_context(|| format!("cannot connect to {}", cfg.join.bootstrap_addr))?
        .json()
        .await
        .context("invalid handshake response")?;
    if handshake.result != RpcResult::Ok {
        bail!(
            "bootstrap node returned handshake error: {}",
            handshake.error_message
        );
    }
    debug!("handshake complete");

    // phase 2: join with the bearer token
    let join: JoinResponse = client
        .post(format!("{}/v1/join", base))
        .bearer_auth(&handshake.join_token)
        .json(&JoinRequest {
            pubkey: device.public_key().to_string(),
            endpoint_ip: listen_addr.to_string(),
            endpoint_port: cfg.wireguard.listen_port,
            mesh_name: cfg.mesh_name.clone(),
            node_name: cfg.node_name.clone(),
        })
        .send()
        .await
        .with_context(|| format!("cannot communicate with endpoint at {}", cfg.join.bootstrap_addr))?
        .json()
        .await
        .context("invalid join response")?;
    if join.result != RpcResult::Ok {
        bail!("unable to join mesh: '{}'", join.error_message);
    }

    let mesh_ip: Ipv4Addr = join
        .joining_node_mesh_ip
        .parse()
        .context("join response carries an invalid mesh IP")?;
    let cidr: Ipv4Net = join
        .mesh_cidr
        .parse()
        .context("join response carries an invalid mesh CIDR")?;
    let gossip_key = decode_gossip_key(dev_mode, &join.gossip_encryption_key)?;
    info!(ip = %mesh_ip, cidr = %cidr, "joined mesh");

    // the assigned address goes onto the interface before any peer traffic
    device.assign_address(mesh_ip, cidr.prefix_len()).await?;

    // fetch all current members and install a peer entry for each of them
    // BEFORE the tunnel comes up and gossip starts; the first entry is the
    // bootstrap node itself
    let peers: Vec<Peer> = client
        .get(format!("{}/v1/peers", base))
        .send()
        .await
        .context("unable to fetch peer list")?
        .json()
        .await
        .context("invalid peer list")?;
    let seeds = joiner::install_peers(&device, &peers).await?;
    info!(peers = seeds.len(), "installed all current peers");

    device.up().await?;
    device.set_route(cidr).await?;

    let params = NodeParams {
        mesh_name: cfg.mesh_name.clone(),
        node_name: cfg.node_name.clone(),
        cidr,
        ipam: None,
        mesh_ip,
        endpoint_ip: listen_addr,
        endpoint_port: cfg.wireguard.listen_port,
        is_bootstrap: false,
        lan_mode: join.gossip_mode_lan,
        dev_mode,
        gossip_key,
        gossip_bind: None,
    };
    let tunnel: Arc<dyn Tunnel> = Arc::new(device.clone());
    let pubkey = device.public_key().to_string();
    let (node, events) = MeshNode::start(params, tunnel, &pubkey).await?;
    node.set_timestamps(join.creation_ts, wgmesh_service::node::unix_now());

    let runtime = NodeRuntime::launch(
        node.clone(),
        events,
        device,
        &cfg.memberlist_file,
        &cfg.agent.bind_socket,
        &cfg.agent.bind_socket_id,
    );

    // every peer entry is in place; only now enter the gossip cluster
    let contacted = node.gossip.join(seeds).await?;
    if contacted == 0 {
        warn!("no gossip seed could be contacted");
    }

    print_banner(cfg, &node, dev_mode);

    super::wait_for_signal().await?;
    runtime.teardown().await
}

fn build_client(cfg: &Config, dev_mode: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(RPC_TIMEOUT);

    if !dev_mode {
        let tls = &cfg.join.tls;
        let ca = std::fs::read(&tls.ca_cert)
            .with_context(|| format!("unable to read {}", tls.ca_cert))?;
        builder = builder.add_root_certificate(
            reqwest::Certificate::from_pem(&ca).context("invalid CA certificate")?,
        );

        let mut identity = std::fs::read(&tls.client_cert)
            .with_context(|| format!("unable to read {}", tls.client_cert))?;
        identity.extend(
            std::fs::read(&tls.client_key)
                .with_context(|| format!("unable to read {}", tls.client_key))?,
        );
        builder = builder
            .identity(reqwest::Identity::from_pem(&identity).context("invalid client identity")?);
    } else {
        warn!("using an insecure connection to the mesh RPC service");
    }

    builder.build().context("unable to build HTTP client")
}

fn decode_gossip_key(dev_mode: bool, encoded: &str) -> Result<Option<[u8; 32]>> {
    if dev_mode || encoded.is_empty() {
        return Ok(None);
    }
    let bytes = BASE64
        .decode(encoded)
        .context("join response carries an invalid gossip key")?;
    let key = bytes
        .try_into()
        .map_err(|_| anyhow!("gossip key must be exactly 32 bytes"))?;
    Ok(Some(key))
}

fn merge_config(args: &JoinArgs) -> Result<(Config, bool)> {
    let mut cfg = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(v) = &args.mesh_name {
        cfg.mesh_name = v.clone();
    }
    if let Some(v) = &args.node_name {
        cfg.node_name = v.clone();
    }
    if let Some(v) = &args.bootstrap_addr {
        cfg.join.bootstrap_addr = v.clone();
    }
    if let Some(v) = &args.listen_addr {
        cfg.wireguard.listen_addr = v.clone();
    }
    if let Some(v) = args.listen_port {
        cfg.wireguard.listen_port = v;
    }
    if let Some(v) = &args.client_key {
        cfg.join.tls.client_key = v.clone();
    }
    if let Some(v) = &args.client_cert {
        cfg.join.tls.client_cert = v.clone();
    }
    if let Some(v) = &args.ca_cert {
        cfg.join.tls.ca_cert = v.clone();
    }
    if let Some(v) = &args.memberlist_file {
        cfg.memberlist_file = v.clone();
    }
    if let Some(v) = &args.agent_bind_socket {
        cfg.agent.bind_socket = v.clone();
    }
    if let Some(v) = &args.agent_bind_socket_id {
        cfg.agent.bind_socket_id = v.clone();
    }

    Ok((cfg, args.dev))
}

fn print_banner(cfg: &Config, node: &MeshNode, dev_mode: bool) {
    println!("** ");
    println!("** Mesh '{}' has been joined.", cfg.mesh_name);
    println!("** ");
    println!("** Mesh name:                   {}", cfg.mesh_name);
    println!("** Mesh CIDR range:             {}", node.cidr);
    println!("** This node's name:            {}", node.node_name);
    println!("** This node's mesh IP:         {}", node.mesh_ip);
    if !cfg.memberlist_file.is_empty() {
        println!("** Mesh node details export to: {}", cfg.memberlist_file);
    }
    println!("** ");
    if dev_mode {
        println!("** This mesh is running in DEVELOPMENT MODE without encryption.");
        println!("** Do not use this in a production setup.");
        println!("** ");
    }
    println!("** To inspect the wireguard interface and its peer data use:");
    println!("** wg show wg{}", cfg.mesh_name);
    println!("** ");
    println!("** To inspect the current mesh status use: wgmesh info");
    println!("** ");
}
