//! The `bootstrap` command: create the wireguard interface, start the
//! gossip cluster and the mesh RPC service, then wait until signalled.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use tokio::net::TcpListener;
use tracing::{info, warn};
use wgmesh_core::Config;
use wgmesh_overlay::{Tunnel, WgDevice};
use wgmesh_service::rpc::mesh::{self, MeshRpcState};
use wgmesh_service::{tls, MeshNode, NodeParams};

use super::runtime::NodeRuntime;
use crate::cli::BootstrapArgs;

pub async fn run(args: BootstrapArgs) -> Result<()> {
    let (cfg, dev_mode) = merge_config(&args)?;
    let cfg = with_mesh_name(cfg);
    cfg.validate_bootstrap(dev_mode)?;

    let cidr = cfg.mesh_cidr()?;
    let ipam = cfg.ipam_cidr()?;
    let mesh_ip: Ipv4Addr = cfg.bootstrap.node_ip.parse().expect("validated");
    let gossip_key = cfg.gossip_key()?;

    let listen_addr: IpAddr = parse_listen_addr(&cfg.wireguard.listen_addr)?;

    // interface up with the mesh IP, then route the whole range through it
    let device = WgDevice::create(&cfg.mesh_name, cfg.wireguard.listen_port).await?;
    let started = setup_and_serve(
        &cfg,
        dev_mode,
        device.clone(),
        cidr,
        ipam,
        mesh_ip,
        listen_addr,
        gossip_key,
    )
    .await;

    if let Err(e) = started {
        // tear the interface down on any setup error
        let _ = device.remove().await;
        return Err(e);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn setup_and_serve(
    cfg: &Config,
    dev_mode: bool,
    device: WgDevice,
    cidr: ipnet::Ipv4Net,
    ipam: Option<ipnet::Ipv4Net>,
    mesh_ip: Ipv4Addr,
    listen_addr: IpAddr,
    gossip_key: Option<[u8; 32]>,
) -> Result<()> {
    device.assign_address(mesh_ip, cidr.prefix_len()).await?;
    device.up().await?;
    device.set_route(cidr).await?;
    let pubkey = device.public_key().to_string();

    let params = NodeParams {
        mesh_name: cfg.mesh_name.clone(),
        node_name: cfg.node_name.clone(),
        cidr,
        ipam,
        mesh_ip,
        endpoint_ip: listen_addr,
        endpoint_port: cfg.wireguard.listen_port,
        is_bootstrap: true,
        lan_mode: cfg.bootstrap.gossip_mode_lan,
        dev_mode,
        gossip_key,
        gossip_bind: None,
    };
    let tunnel: Arc<dyn Tunnel> = Arc::new(device.clone());
    let (node, events) = MeshNode::start(params, tunnel, &pubkey).await?;

    let runtime = NodeRuntime::launch(
        node.clone(),
        events,
        device,
        &cfg.memberlist_file,
        &cfg.agent.bind_socket,
        &cfg.agent.bind_socket_id,
    );

    // internet-facing mesh RPC
    let bind = format!(
        "{}:{}",
        cfg.bootstrap.rpc_bind_addr, cfg.bootstrap.rpc_bind_port
    );
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("unable to bind mesh RPC service on {}", bind))?;
    info!(bind = %bind, "starting mesh RPC service");

    let router = mesh::build_router(MeshRpcState::new(node.clone()));
    let shutdown = runtime.shutdown_future();
    if dev_mode {
        tokio::spawn(async move {
            if let Err(e) = mesh::serve_plain(listener, router, shutdown).await {
                warn!(error = %e, "mesh RPC service failed");
            }
        });
    } else {
        let tls_config = tls::server_config(&cfg.bootstrap.rpc_tls)?;
        tokio::spawn(async move {
            if let Err(e) = mesh::serve_tls(listener, tls_config, router, shutdown).await {
                warn!(error = %e, "mesh RPC service failed");
            }
        });
    }

    print_banner(cfg, &node, dev_mode, &bind);

    super::wait_for_signal().await?;
    runtime.teardown().await
}

fn merge_config(args: &BootstrapArgs) -> Result<(Config, bool)> {
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
    if let Some(v) = &args.cidr {
        cfg.bootstrap.mesh_cidr_range = v.clone();
    }
    if let Some(v) = &args.cidr_ipam {
        cfg.bootstrap.mesh_ipam_cidr_range = v.clone();
    }
    if let Some(v) = &args.ip {
        cfg.bootstrap.node_ip = v.clone();
    }
    if let Some(v) = &args.listen_addr {
        cfg.wireguard.listen_addr = v.clone();
    }
    if let Some(v) = args.listen_port {
        cfg.wireguard.listen_port = v;
    }
    if let Some(v) = &args.rpc_bind_addr {
        cfg.bootstrap.rpc_bind_addr = v.clone();
    }
    if let Some(v) = args.rpc_bind_port {
        cfg.bootstrap.rpc_bind_port = v;
    }
    if let Some(v) = &args.server_key {
        cfg.bootstrap.rpc_tls.server_key = v.clone();
    }
    if let Some(v) = &args.server_cert {
        cfg.bootstrap.rpc_tls.server_cert = v.clone();
    }
    if let Some(v) = &args.ca_cert {
        cfg.bootstrap.rpc_tls.ca_cert = v.clone();
    }
    if let Some(v) = &args.ca_path {
        cfg.bootstrap.rpc_tls.ca_path = v.clone();
    }
    if let Some(v) = &args.memberlist_file {
        cfg.memberlist_file = v.clone();
    }
    if let Some(v) = &args.mesh_encryption_key {
        cfg.bootstrap.mesh_encryption_key = v.clone();
    }
    if args.gossip_mode_lan {
        cfg.bootstrap.gossip_mode_lan = true;
    }
    if let Some(v) = &args.agent_bind_socket {
        cfg.agent.bind_socket = v.clone();
    }
    if let Some(v) = &args.agent_bind_socket_id {
        cfg.agent.bind_socket_id = v.clone();
    }

    Ok((cfg, args.dev))
}

fn with_mesh_name(mut cfg: Config) -> Config {
    if cfg.mesh_name.is_empty() {
        cfg.mesh_name = random_mesh_name();
        warn!(
            mesh_name = %cfg.mesh_name,
            "auto-generated mesh name. Use this as -n parameter when joining the mesh."
        );
    }
    cfg
}

fn random_mesh_name() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| char::from(b'a' + rng.gen_range(0..26)))
        .collect()
}

pub(crate) fn parse_listen_addr(value: &str) -> Result<IpAddr> {
    if value.is_empty() {
        return Err(anyhow!(
            "need --listen-addr: the external address other mesh nodes reach this node at"
        ));
    }
    value
        .parse()
        .map_err(|_| anyhow!("{} is not a valid IP address for --listen-addr", value))
}

fn print_banner(cfg: &Config, node: &MeshNode, dev_mode: bool, rpc_bind: &str) {
    println!("** ");
    println!(
        "** Mesh '{}' has been bootstrapped. Other nodes can join now.",
        cfg.mesh_name
    );
    println!("** ");
    println!("** Mesh name:                   {}", cfg.mesh_name);
    println!("** Mesh CIDR range:             {}", node.cidr);
    println!("** Mesh RPC service endpoint:   {}", rpc_bind);
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
        let display_addr = if cfg.bootstrap.rpc_bind_addr == "0.0.0.0" {
            "<IP_OF_THIS_NODE>".to_string()
        } else {
            cfg.bootstrap.rpc_bind_addr.clone()
        };
        println!("** To have another node join this mesh, use this command:");
        println!(
            "** wgmesh join -v --dev -n {} --bootstrap-addr {}:{}",
            cfg.mesh_name, display_addr, cfg.bootstrap.rpc_bind_port
        );
        println!("** ");
    } else {
        println!("** TLS is enabled for the mesh RPC service");
        println!("** ");
    }
    println!("** To inspect the wireguard interface and its peer data use:");
    println!("** wg show wg{}", cfg.mesh_name);
    println!("** ");
    println!("** To inspect the current mesh status use: wgmesh info");
    println!("** ");
}
