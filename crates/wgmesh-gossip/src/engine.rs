//! The gossip engine actor.
//!
//! A single task owns the member table, the UDP transport and the failure
//! detector; callers talk to it through [`GossipHandle`] commands with
//! oneshot replies. Running all state mutation on one task keeps event
//! order identical to gossip delivery order without locks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::config::GossipConfig;
use crate::crypto::DatagramCipher;
use crate::error::{GossipError, Result};
use crate::member::{Event, Member, MemberStatus, UserEvent};
use crate::message::{self, NodeState, Packet};

/// Upper bound on remembered `(origin, seq)` pairs for user-event dedup.
const SEEN_EVENTS_CAP: usize = 1024;

/// EWMA weight of a new RTT sample.
const RTT_ALPHA: f64 = 0.2;

enum Command {
    Members(oneshot::Sender<Vec<Member>>),
    LocalMember(oneshot::Sender<Member>),
    NumNodes(oneshot::Sender<usize>),
    SetTags(
        HashMap<String, String>,
        oneshot::Sender<()>,
    ),
    UserEvent {
        name: String,
        payload: Vec<u8>,
        resp: oneshot::Sender<Result<()>>,
    },
    Join(Vec<SocketAddr>, oneshot::Sender<usize>),
    RttEstimates(oneshot::Sender<HashMap<String, Duration>>),
    RemoveMember(String, oneshot::Sender<()>),
    Leave(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running gossip engine.
#[derive(Clone)]
pub struct GossipHandle {
    cmd_tx: mpsc::Sender<Command>,
    local_addr: SocketAddr,
}

impl GossipHandle {
    /// The address the transport actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| GossipError::EngineGone)?;
        rx.await.map_err(|_| GossipError::EngineGone)
    }

    /// All known members, this node first.
    pub async fn members(&self) -> Result<Vec<Member>> {
        self.request(Command::Members).await
    }

    /// This node's member entry.
    pub async fn local_member(&self) -> Result<Member> {
        self.request(Command::LocalMember).await
    }

    /// Count of live (alive or suspect) members, including this node.
    pub async fn num_nodes(&self) -> Result<usize> {
        self.request(Command::NumNodes).await
    }

    /// Replace this node's tag map and push the update to the mesh.
    pub async fn set_tags(&self, tags: HashMap<String, String>) -> Result<()> {
        self.request(|tx| Command::SetTags(tags, tx)).await
    }

    /// Broadcast a named user event to every live member (including this
    /// node's own event channel). Best effort.
    pub async fn user_event(&self, name: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        let name = name.into();
        self.request(|tx| Command::UserEvent {
            name,
            payload,
            resp: tx,
        })
        .await?
    }

    /// Push our state to the given seed addresses and ask them to sync back.
    pub async fn join(&self, seeds: Vec<SocketAddr>) -> Result<usize> {
        self.request(|tx| Command::Join(seeds, tx)).await
    }

    /// Smoothed round-trip estimates per member name.
    pub async fn rtt_estimates(&self) -> Result<HashMap<String, Duration>> {
        self.request(Command::RttEstimates).await
    }

    /// Remove a member from the table immediately (prune after the peer
    /// entry has been cleaned up). Tombstones the name against stale
    /// digests.
    pub async fn remove_member(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|tx| Command::RemoveMember(name, tx)).await
    }

    /// Broadcast a graceful-leave intent and wait for the propagation
    /// delay.
    pub async fn leave(&self) -> Result<()> {
        self.request(Command::Leave).await
    }

    /// Stop the engine task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

/// Gossip engine entry point.
pub struct Gossip;

impl Gossip {
    /// Bind the transport and spawn the engine task.
    ///
    /// Returns the command handle and the single-consumer event channel.
    pub async fn start(config: GossipConfig) -> Result<(GossipHandle, mpsc::Receiver<Event>)> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|source| GossipError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = socket.local_addr()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);

        let cipher = config.encryption_key.as_ref().map(DatagramCipher::new);

        let engine = Engine {
            local_name: config.node_name.clone(),
            local_addr,
            local_incarnation: 1,
            local_tags: config.tags.clone(),
            local_status: MemberStatus::Alive,
            cfg: config,
            socket: Arc::new(socket),
            cipher,
            members: HashMap::new(),
            pending_probes: HashMap::new(),
            rtts: HashMap::new(),
            seen_events: HashSet::new(),
            seen_order: VecDeque::new(),
            user_seq: 0,
            tombstones: HashMap::new(),
            leave_intents: HashMap::new(),
            last_reconnect_probe: Instant::now(),
            event_tx,
        };

        info!(addr = %local_addr, node = %engine.local_name, "gossip transport bound");

        tokio::spawn(engine.run(cmd_rx));

        Ok((
            GossipHandle {
                cmd_tx,
                local_addr,
            },
            event_rx,
        ))
    }
}

struct MemberEntry {
    member: Member,
    incarnation: u64,
    suspect_since: Option<Instant>,
    down_since: Option<Instant>,
    last_failed: Option<Instant>,
}

struct Engine {
    cfg: GossipConfig,
    socket: Arc<UdpSocket>,
    cipher: Option<DatagramCipher>,

    local_name: String,
    local_addr: SocketAddr,
    local_incarnation: u64,
    local_tags: HashMap<String, String>,
    local_status: MemberStatus,

    members: HashMap<String, MemberEntry>,
    pending_probes: HashMap<u64, (String, Instant)>,
    rtts: HashMap<String, Duration>,

    seen_events: HashSet<(String, u64)>,
    seen_order: VecDeque<(String, u64)>,
    user_seq: u64,

    tombstones: HashMap<String, (u64, Instant)>,
    leave_intents: HashMap<String, (u64, Instant)>,
    last_reconnect_probe: Instant,

    event_tx: mpsc::Sender<Event>,
}

impl Engine {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        let mut probe_tick = tokio::time::interval(self.cfg.probe_interval);
        let mut reap_tick = tokio::time::interval(self.cfg.reap_interval);
        let mut buf = vec![0u8; message::MAX_PACKET_SIZE as usize];
        let socket = Arc::clone(&self.socket);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                res = socket.recv_from(&mut buf) => {
                    match res {
                        Ok((len, src)) => self.handle_datagram(&buf[..len], src).await,
                        Err(e) => warn!(error = %e, "gossip transport recv error"),
                    }
                }
                _ = probe_tick.tick() => self.probe_cycle().await,
                _ = reap_tick.tick() => self.reap_cycle().await,
            }
        }
        debug!(node = %self.local_name, "gossip engine stopped");
    }

    // -------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Members(tx) => {
                let _ = tx.send(self.member_list());
            }
            Command::LocalMember(tx) => {
                let _ = tx.send(self.local_member());
            }
            Command::NumNodes(tx) => {
                let _ = tx.send(self.num_nodes());
            }
            Command::SetTags(tags, tx) => {
                self.local_tags = tags;
                self.local_incarnation += 1;
                self.push_state_to_all().await;
                self.emit(Event::MemberUpdate(vec![self.local_member()]));
                let _ = tx.send(());
            }
            Command::UserEvent {
                name,
                payload,
                resp,
            } => {
                let result = self.broadcast_user_event(name, payload).await;
                let _ = resp.send(result);
            }
            Command::Join(seeds, tx) => {
                let mut contacted = 0;
                for seed in seeds {
                    if seed == self.local_addr {
                        continue;
                    }
                    let packet = Packet::Sync {
                        from: self.local_state(),
                        members: self.digest(),
                        reply: true,
                    };
                    if self.send_packet(&packet, seed).await {
                        contacted += 1;
                    }
                }
                let _ = tx.send(contacted);
            }
            Command::RttEstimates(tx) => {
                let _ = tx.send(self.rtts.clone());
            }
            Command::RemoveMember(name, tx) => {
                if let Some(entry) = self.members.remove(&name) {
                    self.tombstones
                        .insert(name.clone(), (entry.incarnation, Instant::now()));
                    self.rtts.remove(&name);
                    debug!(node = %name, "pruned member");
                }
                let _ = tx.send(());
            }
            Command::Leave(tx) => {
                self.local_status = MemberStatus::Left;
                let packet = Packet::Leave {
                    name: self.local_name.clone(),
                    incarnation: self.local_incarnation,
                };
                let targets: Vec<SocketAddr> =
                    self.members.values().map(|e| e.member.addr).collect();
                for addr in targets {
                    self.send_packet(&packet, addr).await;
                }
                tokio::time::sleep(self.cfg.leave_propagate_delay).await;
                info!(node = %self.local_name, "left the gossip cluster");
                let _ = tx.send(());
            }
            Command::Shutdown(tx) => {
                let _ = tx.send(());
                return false;
            }
        }
        true
    }

    // -------------------------------------------------------------------
    // Datagram handling
    // -------------------------------------------------------------------

    async fn handle_datagram(&mut self, datagram: &[u8], src: SocketAddr) {
        let plaintext = match &self.cipher {
            Some(cipher) => match cipher.open(datagram) {
                Some(p) => p,
                None => {
                    trace!(src = %src, "dropping undecryptable datagram");
                    return;
                }
            },
            None => datagram.to_vec(),
        };

        let packet = match message::decode(&plaintext) {
            Ok(p) => p,
            Err(e) => {
                trace!(src = %src, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        match packet {
            Packet::Ping { seq, from } => {
                self.merge_node(from);
                let ack = Packet::Ack {
                    seq,
                    from: self.local_state(),
                    members: self.digest(),
                };
                self.send_packet(&ack, src).await;
            }
            Packet::Ack { seq, from, members } => {
                if let Some((name, sent)) = self.pending_probes.remove(&seq) {
                    if name == from.name {
                        self.record_rtt(&name, sent.elapsed());
                    }
                }
                self.mark_alive_direct(&from.name);
                self.merge_node(from);
                for node in members {
                    self.merge_node(node);
                }
            }
            Packet::Sync {
                from,
                members,
                reply,
            } => {
                self.merge_node(from);
                for node in members {
                    self.merge_node(node);
                }
                if reply {
                    let sync = Packet::Sync {
                        from: self.local_state(),
                        members: self.digest(),
                        reply: false,
                    };
                    self.send_packet(&sync, src).await;
                }
            }
            Packet::User {
                origin,
                seq,
                name,
                payload,
            } => {
                if name.len() + payload.len() > self.cfg.query_size_limit {
                    warn!(event = %name, "dropping oversized user event");
                    return;
                }
                self.deliver_user_event(origin, seq, name, payload);
            }
            Packet::Leave { name, incarnation } => {
                self.handle_leave(name, incarnation);
            }
        }
    }

    fn handle_leave(&mut self, name: String, incarnation: u64) {
        if name == self.local_name {
            return;
        }
        match self.members.get_mut(&name) {
            Some(entry) => {
                if entry.member.status == MemberStatus::Left {
                    return;
                }
                entry.incarnation = entry.incarnation.max(incarnation);
                entry.member.status = MemberStatus::Left;
                entry.down_since = Some(Instant::now());
                let member = entry.member.clone();
                info!(node = %name, "member left");
                self.emit(Event::MemberLeave(vec![member]));
            }
            None => {
                // leave for a member we have not seen yet; remember the
                // intent so a late digest does not resurrect it
                self.leave_intents
                    .insert(name, (incarnation, Instant::now()));
            }
        }
    }

    fn deliver_user_event(&mut self, origin: String, seq: u64, name: String, payload: Vec<u8>) {
        let key = (origin.clone(), seq);
        if self.seen_events.contains(&key) {
            return;
        }
        self.seen_events.insert(key.clone());
        self.seen_order.push_back(key);
        while self.seen_order.len() > SEEN_EVENTS_CAP {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen_events.remove(&old);
            }
        }

        trace!(event = %name, origin = %origin, "delivering user event");
        self.emit(Event::User(UserEvent {
            name,
            payload,
            origin,
        }));
    }

    // -------------------------------------------------------------------
    // Failure detection
    // -------------------------------------------------------------------

    async fn probe_cycle(&mut self) {
        let now = Instant::now();

        // expire outstanding probes into suspicion
        let expired: Vec<u64> = self
            .pending_probes
            .iter()
            .filter(|(_, (_, sent))| now.duration_since(*sent) > self.cfg.probe_timeout)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            if let Some((name, _)) = self.pending_probes.remove(&seq) {
                if let Some(entry) = self.members.get_mut(&name) {
                    if entry.member.status == MemberStatus::Alive {
                        entry.member.status = MemberStatus::Suspect;
                        entry.suspect_since = Some(now);
                        debug!(node = %name, "member suspected");
                    }
                }
            }
        }

        // promote long-running suspects to failed
        let mut failed = Vec::new();
        for entry in self.members.values_mut() {
            if entry.member.status == MemberStatus::Suspect {
                if let Some(since) = entry.suspect_since {
                    if now.duration_since(since) > self.cfg.suspicion_timeout {
                        entry.member.status = MemberStatus::Failed;
                        entry.down_since = Some(now);
                        entry.last_failed = Some(now);
                        entry.suspect_since = None;
                        failed.push(entry.member.clone());
                    }
                }
            }
        }
        if !failed.is_empty() {
            for m in &failed {
                info!(node = %m.name, "member failed");
            }
            self.emit(Event::MemberFailed(failed));
        }

        // probe one random live member
        let live: Vec<(String, SocketAddr)> = self
            .members
            .values()
            .filter(|e| e.member.status.is_live())
            .map(|e| (e.member.name.clone(), e.member.addr))
            .collect();
        if let Some((name, addr)) = pick_random(&live) {
            self.send_probe(name, addr).await;
        }

        // occasionally re-probe a failed member for reconnection
        if now.duration_since(self.last_reconnect_probe) > self.cfg.reconnect_interval {
            let failed: Vec<(String, SocketAddr)> = self
                .members
                .values()
                .filter(|e| e.member.status == MemberStatus::Failed)
                .map(|e| (e.member.name.clone(), e.member.addr))
                .collect();
            if let Some((name, addr)) = pick_random(&failed) {
                self.last_reconnect_probe = now;
                self.send_probe(name, addr).await;
            }
        }
    }

    async fn send_probe(&mut self, name: String, addr: SocketAddr) {
        self.user_seq += 1;
        let seq = self.user_seq;
        let ping = Packet::Ping {
            seq,
            from: self.local_state(),
        };
        if self.send_packet(&ping, addr).await {
            self.pending_probes.insert(seq, (name, Instant::now()));
        }
    }

    async fn reap_cycle(&mut self) {
        let now = Instant::now();

        let mut reaped = Vec::new();
        let names: Vec<String> = self.members.keys().cloned().collect();
        for name in names {
            let reap = {
                let entry = &self.members[&name];
                match (entry.member.status, entry.down_since) {
                    (MemberStatus::Failed, Some(since)) => {
                        now.duration_since(since) > self.cfg.reconnect_timeout
                    }
                    (MemberStatus::Left, Some(since)) => {
                        now.duration_since(since) > self.cfg.tombstone_timeout
                    }
                    _ => false,
                }
            };
            if reap {
                if let Some(mut entry) = self.members.remove(&name) {
                    entry.member.status = MemberStatus::Reaped;
                    self.tombstones
                        .insert(name.clone(), (entry.incarnation, now));
                    self.rtts.remove(&name);
                    info!(node = %name, "member reaped");
                    reaped.push(entry.member);
                }
            }
        }
        if !reaped.is_empty() {
            self.emit(Event::MemberReap(reaped));
        }

        self.tombstones
            .retain(|_, (_, at)| now.duration_since(*at) < self.cfg.tombstone_timeout);
        self.leave_intents
            .retain(|_, (_, at)| now.duration_since(*at) < self.cfg.recent_intent_timeout);
    }

    // -------------------------------------------------------------------
    // State merging
    // -------------------------------------------------------------------

    fn merge_node(&mut self, node: NodeState) {
        if node.name == self.local_name {
            // refute any rumor that we are not alive
            if node.incarnation >= self.local_incarnation
                && node.status != MemberStatus::Alive
                && self.local_status == MemberStatus::Alive
            {
                self.local_incarnation = node.incarnation + 1;
            }
            return;
        }

        if let Some((inc, _)) = self.tombstones.get(&node.name) {
            if *inc >= node.incarnation {
                return;
            }
            self.tombstones.remove(&node.name);
        }

        let now = Instant::now();

        if let Some(&(intent_inc, _)) = self.leave_intents.get(&node.name) {
            if intent_inc >= node.incarnation {
                // arrived after its own leave; record as already left
                self.leave_intents.remove(&node.name);
                self.members.insert(
                    node.name.clone(),
                    MemberEntry {
                        member: Member {
                            name: node.name,
                            addr: node.addr,
                            status: MemberStatus::Left,
                            tags: node.tags,
                        },
                        incarnation: intent_inc,
                        suspect_since: None,
                        down_since: Some(now),
                        last_failed: None,
                    },
                );
                return;
            }
            self.leave_intents.remove(&node.name);
        }

        match self.members.get_mut(&node.name) {
            None => {
                let status = node.status;
                let member = Member {
                    name: node.name.clone(),
                    addr: node.addr,
                    status,
                    tags: node.tags,
                };
                self.members.insert(
                    node.name.clone(),
                    MemberEntry {
                        member: member.clone(),
                        incarnation: node.incarnation,
                        suspect_since: None,
                        down_since: (!status.is_live()).then_some(now),
                        last_failed: None,
                    },
                );
                if status.is_live() {
                    info!(node = %member.name, addr = %member.addr, "member joined");
                    self.emit(Event::MemberJoin(vec![member]));
                }
            }
            Some(entry) => {
                if node.incarnation > entry.incarnation {
                    let was_live = entry.member.status.is_live();
                    let tags_changed = entry.member.tags != node.tags;

                    entry.incarnation = node.incarnation;
                    entry.member.addr = node.addr;
                    entry.member.tags = node.tags;

                    match (was_live, node.status.is_live()) {
                        (false, true) => {
                            if let Some(failed_at) = entry.last_failed {
                                if now.duration_since(failed_at) < self.cfg.flap_timeout {
                                    warn!(node = %entry.member.name, "member flapping");
                                }
                            }
                            entry.member.status = MemberStatus::Alive;
                            entry.suspect_since = None;
                            entry.down_since = None;
                            let member = entry.member.clone();
                            self.emit(Event::MemberJoin(vec![member]));
                        }
                        (true, false) => {
                            entry.member.status = node.status;
                            entry.down_since = Some(now);
                            let member = entry.member.clone();
                            match node.status {
                                MemberStatus::Left => {
                                    self.emit(Event::MemberLeave(vec![member]))
                                }
                                _ => self.emit(Event::MemberFailed(vec![member])),
                            }
                        }
                        _ => {
                            entry.member.status = node.status;
                            if tags_changed {
                                let member = entry.member.clone();
                                self.emit(Event::MemberUpdate(vec![member]));
                            }
                        }
                    }
                } else if entry.incarnation == node.incarnation
                    && entry.member.tags.is_empty()
                    && !node.tags.is_empty()
                {
                    // tag publication can race the first digest carrying
                    // the member; fill tags in without a version bump
                    entry.member.tags = node.tags;
                    let member = entry.member.clone();
                    self.emit(Event::MemberUpdate(vec![member]));
                }
            }
        }
    }

    /// An Ack straight from the member proves it is alive regardless of
    /// rumored state.
    fn mark_alive_direct(&mut self, name: &str) {
        if let Some(entry) = self.members.get_mut(name) {
            if !entry.member.status.is_live() || entry.member.status == MemberStatus::Suspect {
                let was_down = !entry.member.status.is_live();
                entry.member.status = MemberStatus::Alive;
                entry.suspect_since = None;
                entry.down_since = None;
                if was_down {
                    let member = entry.member.clone();
                    self.emit(Event::MemberJoin(vec![member]));
                }
            }
        }
    }

    fn record_rtt(&mut self, name: &str, sample: Duration) {
        let updated = match self.rtts.get(name) {
            Some(prev) => prev.mul_f64(1.0 - RTT_ALPHA) + sample.mul_f64(RTT_ALPHA),
            None => sample,
        };
        self.rtts.insert(name.to_string(), updated);
    }

    // -------------------------------------------------------------------
    // Broadcast helpers
    // -------------------------------------------------------------------

    async fn broadcast_user_event(&mut self, name: String, payload: Vec<u8>) -> Result<()> {
        let limit = crate::config::USER_EVENT_SIZE_LIMIT;
        if payload.len() > limit {
            return Err(GossipError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }

        self.user_seq += 1;
        let seq = self.user_seq;
        let packet = Packet::User {
            origin: self.local_name.clone(),
            seq,
            name: name.clone(),
            payload: payload.clone(),
        };

        // local delivery first, then best-effort fan-out
        self.deliver_user_event(self.local_name.clone(), seq, name, payload);

        let targets: Vec<SocketAddr> = self
            .members
            .values()
            .filter(|e| e.member.status.is_live())
            .map(|e| e.member.addr)
            .collect();
        let fan_out = async {
            for addr in targets {
                self.send_packet(&packet, addr).await;
            }
        };
        if tokio::time::timeout(self.cfg.broadcast_timeout, fan_out)
            .await
            .is_err()
        {
            warn!("user event broadcast timed out");
        }
        Ok(())
    }

    async fn push_state_to_all(&mut self) {
        let packet = Packet::Sync {
            from: self.local_state(),
            members: self.digest(),
            reply: false,
        };
        let targets: Vec<SocketAddr> = self
            .members
            .values()
            .filter(|e| e.member.status.is_live())
            .map(|e| e.member.addr)
            .collect();
        for addr in targets {
            self.send_packet(&packet, addr).await;
        }
    }

    async fn send_packet(&self, packet: &Packet, dest: SocketAddr) -> bool {
        let bytes = match message::encode(packet) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "unable to encode gossip packet");
                return false;
            }
        };
        let datagram = match &self.cipher {
            Some(cipher) => match cipher.seal(&bytes) {
                Some(d) => d,
                None => {
                    warn!("unable to seal gossip packet");
                    return false;
                }
            },
            None => bytes,
        };
        match self.socket.send_to(&datagram, dest).await {
            Ok(_) => true,
            Err(e) => {
                debug!(dest = %dest, error = %e, "gossip send failed");
                false
            }
        }
    }

    // -------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------

    fn local_member(&self) -> Member {
        Member {
            name: self.local_name.clone(),
            addr: self.local_addr,
            status: self.local_status,
            tags: self.local_tags.clone(),
        }
    }

    fn local_state(&self) -> NodeState {
        NodeState {
            name: self.local_name.clone(),
            addr: self.local_addr,
            incarnation: self.local_incarnation,
            status: self.local_status,
            tags: self.local_tags.clone(),
        }
    }

    fn member_list(&self) -> Vec<Member> {
        let mut list = vec![self.local_member()];
        list.extend(self.members.values().map(|e| e.member.clone()));
        list
    }

    fn num_nodes(&self) -> usize {
        let self_live = usize::from(self.local_status.is_live());
        self_live
            + self
                .members
                .values()
                .filter(|e| e.member.status.is_live())
                .count()
    }

    fn digest(&self) -> Vec<NodeState> {
        let mut digest = vec![self.local_state()];
        digest.extend(self.members.values().map(|e| NodeState {
            name: e.member.name.clone(),
            addr: e.member.addr,
            incarnation: e.incarnation,
            status: e.member.status,
            tags: e.member.tags.clone(),
        }));
        digest
    }

    fn emit(&self, event: Event) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!(error = %e, "event channel full, dropping gossip event");
        }
    }
}

fn pick_random<T: Clone>(items: &[T]) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..items.len());
    Some(items[idx].clone())
}
