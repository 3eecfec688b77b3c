//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Simulation controller.
//!
//! The controller owns the virtual clock. On every wall-clock interval it
//! checks whether every live router has acknowledged the previous tick; if
//! so, the tick counter advances and a `TICK` is broadcast. Tick responses
//! carry a database fingerprint, and the refcounted set of fingerprints
//! drives the {red, white, orange, green} synchronization coloring.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use num_traits::FromPrimitive;
use ospfd_engine::lsdb::DbStatsSnapshot;
use ospfd_utils::tcppkt::{self, FrameHdr};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::msg::{
    AddrMapEntry, HitlessRestartBody, PingStartBody, SimHello, SimMsgType,
    TICKS_PER_SECOND, TickBody, TrStartBody, decode_db_stats,
};
use crate::topology::Topology;

// Synchronization state of a simulated router.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Color {
    // Not synched.
    White,
    // In synch with the largest group.
    Green,
    // Partially synched.
    Orange,
    // Defunct.
    Red,
}

// Outgoing frame.
type Frame = (u16, u16, Vec<u8>);

// Events funneled into the controller's single state-owning loop.
enum Event {
    Conn(u64, mpsc::UnboundedSender<Frame>),
    Frame(u64, FrameHdr, Bytes),
    Closed(u64),
    TickTimer,
    Command(String),
}

// Per-router bookkeeping.
struct SimNode {
    conn_id: Option<u64>,
    tx: Option<mpsc::UnboundedSender<Frame>>,
    home_port: u16,
    // Received tick response (initialized to true so a freshly attached
    // router doesn't stall the clock).
    got_tick: bool,
    stats: Option<DbStatsSnapshot>,
    color: Color,
    awaiting_htl_restart: bool,
    shutdown_requested: bool,
}

pub struct SimCtl {
    topology: Topology,
    router_cmd: Option<String>,
    listen_addr: SocketAddr,
    nodes: BTreeMap<Ipv4Addr, SimNode>,
    conns: HashMap<u64, mpsc::UnboundedSender<Frame>>,
    conn_owner: HashMap<u64, Ipv4Addr>,
    n_ticks: u64,
    frozen: bool,
    // Refcounted database fingerprints.
    stats_refs: HashMap<DbStatsSnapshot, usize>,
    next_session_id: u16,
}

// ===== impl SimNode =====

impl SimNode {
    fn new() -> SimNode {
        SimNode {
            conn_id: None,
            tx: None,
            home_port: 0,
            got_tick: true,
            stats: None,
            color: Color::Red,
            awaiting_htl_restart: false,
            shutdown_requested: false,
        }
    }

    fn send(&self, msg_type: SimMsgType, subtype: u16, body: Vec<u8>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send((msg_type as u16, subtype, body));
        }
    }

    fn is_alive(&self) -> bool {
        self.tx.is_some()
    }
}

// ===== impl SimCtl =====

impl SimCtl {
    pub fn elapsed_seconds(&self) -> u64 {
        self.n_ticks / TICKS_PER_SECOND
    }

    // The full address map: every interface address maps to its owner, and
    // every network address maps to each attached router.
    fn address_map(&self) -> Vec<AddrMapEntry> {
        let mut entries = vec![];
        for node in &self.topology.routers {
            let Some(sim_node) = self.nodes.get(&node.router_id) else {
                continue;
            };
            if sim_node.home_port == 0 {
                continue;
            }
            for (addr, network) in
                self.topology.router_addrs(node.router_id)
            {
                entries.push(AddrMapEntry {
                    addr,
                    home: node.router_id,
                    port: sim_node.home_port,
                });
                if let Some(network) = network {
                    entries.push(AddrMapEntry {
                        addr: network.network(),
                        home: node.router_id,
                        port: sim_node.home_port,
                    });
                }
            }
        }
        entries
    }

    fn broadcast(&self, msg_type: SimMsgType, subtype: u16, body: &[u8]) {
        for node in self.nodes.values().filter(|node| node.is_alive()) {
            node.send(msg_type, subtype, body.to_vec());
        }
    }

    // Advances the virtual clock iff every live router acknowledged the
    // previous tick.
    fn tick(&mut self) {
        if self.frozen {
            return;
        }
        let all_acked = self
            .nodes
            .values()
            .filter(|node| node.is_alive())
            .all(|node| node.got_tick);
        if !all_acked || self.nodes.values().all(|node| !node.is_alive()) {
            return;
        }

        self.n_ticks += 1;
        for node in self.nodes.values_mut().filter(|node| node.is_alive()) {
            node.got_tick = false;
        }
        let body = TickBody {
            tick: self.n_ticks,
        }
        .encode()
        .to_vec();
        self.broadcast(SimMsgType::Tick, 0, &body);
    }

    // Recolors every node from the current fingerprint equivalence
    // classes: the largest class is green, singleton classes are white,
    // the rest orange; dead routers are red.
    fn recolor(&mut self) {
        let max_class =
            self.stats_refs.values().copied().max().unwrap_or(0);
        for (router_id, node) in &mut self.nodes {
            let new_color = if !node.is_alive() {
                Color::Red
            } else {
                match node
                    .stats
                    .as_ref()
                    .and_then(|stats| self.stats_refs.get(stats))
                {
                    None => Color::White,
                    Some(1) => Color::White,
                    Some(count) if *count == max_class => Color::Green,
                    Some(_) => Color::Orange,
                }
            };
            if new_color != node.color {
                node.color = new_color;
                info!(target: "sim::ui", router = %router_id,
                    color = ?new_color, tick = self.n_ticks, "recolor");
            }
        }
    }

    fn process_frame(&mut self, conn_id: u64, hdr: FrameHdr, mut body: Bytes) {
        let Some(msg_type) = SimMsgType::from_u16(hdr.pkt_type) else {
            warn!(pkt_type = hdr.pkt_type, "unknown message type");
            return;
        };

        match msg_type {
            SimMsgType::Hello => {
                let Ok(hello) = SimHello::decode(&mut body) else {
                    return;
                };
                self.router_attached(conn_id, hello);
            }
            SimMsgType::TickResponse => {
                let Some(router_id) = self.conn_owner.get(&conn_id).copied()
                else {
                    return;
                };
                let Ok(stats) = decode_db_stats(&mut body) else {
                    return;
                };
                let Some(node) = self.nodes.get_mut(&router_id) else {
                    return;
                };
                node.got_tick = true;

                // Update the fingerprint refcounts.
                if let Some(old) = node.stats.replace(stats) {
                    if let Some(count) = self.stats_refs.get_mut(&old) {
                        *count -= 1;
                        if *count == 0 {
                            self.stats_refs.remove(&old);
                        }
                    }
                }
                *self.stats_refs.entry(stats).or_insert(0) += 1;
                self.recolor();
            }
            SimMsgType::LogMsg
            | SimMsgType::EchoReply
            | SimMsgType::IcmpError
            | SimMsgType::TracerouteTtl
            | SimMsgType::TracerouteTmo
            | SimMsgType::TracerouteDone
            | SimMsgType::PrintSession => {
                let router = self.conn_owner.get(&conn_id);
                info!(target: "sim::session", router = ?router,
                    msg_type = ?msg_type, subtype = hdr.subtype,
                    body = %String::from_utf8_lossy(&body), "router report");
            }
            _ => {
                warn!(?msg_type, "unexpected message from router");
            }
        }
    }

    // A router identified itself: push the current tick, its
    // configuration, and the address maps.
    fn router_attached(&mut self, conn_id: u64, hello: SimHello) {
        let Some(tx) = self.conns.get(&conn_id).cloned() else {
            return;
        };
        info!(router = %hello.rtrid, port = hello.myport, "router attached");

        self.conn_owner.insert(conn_id, hello.rtrid);
        let node = self
            .nodes
            .entry(hello.rtrid)
            .or_insert_with(SimNode::new);
        node.conn_id = Some(conn_id);
        node.tx = Some(tx);
        node.home_port = hello.myport;
        node.got_tick = true;

        // First time tick.
        let body = TickBody {
            tick: self.n_ticks,
        }
        .encode()
        .to_vec();
        node.send(SimMsgType::FirstTick, 0, body);

        // Configuration.
        if let Some(router) = self
            .topology
            .routers
            .iter()
            .find(|router| router.router_id == hello.rtrid)
        {
            for item in &router.config {
                let Ok(body) = serde_json::to_vec(item) else {
                    continue;
                };
                let node = self.nodes.get(&hello.rtrid).unwrap();
                node.send(SimMsgType::Config, 0, body);
            }
        }

        // Hitless restart continuation.
        let node = self.nodes.get_mut(&hello.rtrid).unwrap();
        node.awaiting_htl_restart = false;

        // Atomically push the complete address map to the new router, and
        // the updated map to everyone else.
        let map = AddrMapEntry::encode_list(&self.address_map()).to_vec();
        self.broadcast(SimMsgType::AddrMap, 0, &map);

        self.recolor();
    }

    fn conn_closed(&mut self, conn_id: u64) {
        self.conns.remove(&conn_id);
        if let Some(router_id) = self.conn_owner.remove(&conn_id)
            && let Some(node) = self.nodes.get_mut(&router_id)
            && node.conn_id == Some(conn_id)
        {
            warn!(router = %router_id, "router disconnected");
            node.conn_id = None;
            node.tx = None;
            node.got_tick = true;
            if let Some(stats) = node.stats.take()
                && let Some(count) = self.stats_refs.get_mut(&stats)
            {
                *count -= 1;
                if *count == 0 {
                    self.stats_refs.remove(&stats);
                }
            }
            let should_respawn =
                !node.shutdown_requested && !node.awaiting_htl_restart;
            self.recolor();

            // Respawn crashed routers so the simulation can heal; a
            // router performing a hitless restart rebuilds its engine
            // without dropping the connection.
            if should_respawn {
                self.spawn_router(router_id);
            }
        }
    }

    fn spawn_router(&self, router_id: Ipv4Addr) {
        let Some(cmd) = &self.router_cmd else {
            return;
        };
        let mut command = tokio::process::Command::new(cmd);
        command
            .arg("--controller")
            .arg(self.listen_addr.to_string())
            .arg("--router-id")
            .arg(router_id.to_string())
            .stdin(Stdio::null());
        match command.spawn() {
            Ok(_child) => {
                info!(router = %router_id, "spawned router process");
            }
            Err(error) => {
                warn!(router = %router_id, %error,
                    "failed to spawn router process");
            }
        }
    }

    // Operator commands from the controller's standard input.
    fn process_command(&mut self, line: String) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["freeze"] => {
                self.frozen = true;
                info!("virtual clock frozen");
            }
            ["resume"] => {
                self.frozen = false;
                info!("virtual clock resumed");
            }
            ["status"] => {
                for (router_id, node) in &self.nodes {
                    info!(router = %router_id, color = ?node.color,
                        alive = node.is_alive(), tick = self.n_ticks,
                        "status");
                }
            }
            ["shutdown", router] => {
                if let Some(node) = self.node_mut(router) {
                    node.shutdown_requested = true;
                    node.send(SimMsgType::Shutdown, 0, vec![]);
                }
            }
            ["restart", router] => {
                if let Some(node) = self.node_mut(router) {
                    node.send(SimMsgType::Restart, 0, vec![]);
                }
            }
            ["restart-hitless", router, period] => {
                let Ok(period) = period.parse::<u16>() else {
                    return;
                };
                if let Some(node) = self.node_mut(router) {
                    node.awaiting_htl_restart = true;
                    let body = HitlessRestartBody { period }.encode();
                    node.send(
                        SimMsgType::RestartHitless,
                        0,
                        body.to_vec(),
                    );
                }
            }
            ["ping", router, dest] => {
                let Ok(dest) = dest.parse::<Ipv4Addr>() else {
                    return;
                };
                self.next_session_id += 1;
                let id = self.next_session_id;
                if let Some(node) = self.node_mut(router) {
                    let body = PingStartBody {
                        src: None,
                        dest,
                        ttl: 64,
                    };
                    node.send(
                        SimMsgType::StartPing,
                        id,
                        serde_json::to_vec(&body).unwrap_or_default(),
                    );
                }
            }
            ["traceroute", router, dest] => {
                let Ok(dest) = dest.parse::<Ipv4Addr>() else {
                    return;
                };
                self.next_session_id += 1;
                let id = self.next_session_id;
                if let Some(node) = self.node_mut(router) {
                    let body = TrStartBody { dest, max_ttl: 16 };
                    node.send(
                        SimMsgType::StartTr,
                        id,
                        serde_json::to_vec(&body).unwrap_or_default(),
                    );
                }
            }
            ["join", router, phyint, group] => {
                self.group_command(
                    SimMsgType::AddMember,
                    router,
                    phyint,
                    group,
                );
            }
            ["leave", router, phyint, group] => {
                self.group_command(
                    SimMsgType::DelMember,
                    router,
                    phyint,
                    group,
                );
            }
            [] => (),
            _ => {
                warn!(%line, "unknown command");
            }
        }
    }

    fn group_command(
        &mut self,
        msg_type: SimMsgType,
        router: &str,
        phyint: &str,
        group: &str,
    ) {
        let (Ok(phyint), Ok(group)) =
            (phyint.parse::<i32>(), group.parse::<Ipv4Addr>())
        else {
            return;
        };
        if let Some(node) = self.node_mut(router) {
            let body = crate::msg::GroupBody { phyint, group };
            node.send(
                msg_type,
                0,
                serde_json::to_vec(&body).unwrap_or_default(),
            );
        }
    }

    fn node_mut(&mut self, router: &str) -> Option<&mut SimNode> {
        let router_id = router.parse::<Ipv4Addr>().ok()?;
        self.nodes.get_mut(&router_id)
    }
}

// ===== global functions =====

pub async fn run(
    listen: SocketAddr,
    topology: Topology,
    router_cmd: Option<String>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    let listen_addr = listener.local_addr()?;
    info!(%listen_addr, "simulation controller listening");

    let mut ctl = SimCtl {
        topology,
        router_cmd,
        listen_addr,
        nodes: BTreeMap::new(),
        conns: HashMap::new(),
        conn_owner: HashMap::new(),
        n_ticks: 0,
        frozen: false,
        stats_refs: HashMap::new(),
        next_session_id: 0,
    };

    // Pre-create nodes and spawn the router processes.
    for router in ctl.topology.routers.clone() {
        ctl.nodes
            .entry(router.router_id)
            .or_insert_with(SimNode::new);
        ctl.spawn_router(router.router_id);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // Accept loop.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut next_conn_id: u64 = 0;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                next_conn_id += 1;
                spawn_conn_tasks(next_conn_id, stream, event_tx.clone());
            }
        });
    }

    // Wall-clock pacing of the virtual clock.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                1000 / TICKS_PER_SECOND,
            ));
            loop {
                interval.tick().await;
                if event_tx.send(Event::TickTimer).is_err() {
                    break;
                }
            }
        });
    }

    // Operator commands on stdin.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut lines = stdin.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if event_tx.send(Event::Command(line)).is_err() {
                    break;
                }
            }
        });
    }

    // Single state-owning loop.
    while let Some(event) = event_rx.recv().await {
        match event {
            Event::Conn(conn_id, tx) => {
                ctl.conns.insert(conn_id, tx);
            }
            Event::Frame(conn_id, hdr, body) => {
                ctl.process_frame(conn_id, hdr, body);
            }
            Event::Closed(conn_id) => {
                ctl.conn_closed(conn_id);
            }
            Event::TickTimer => {
                ctl.tick();
            }
            Event::Command(line) => {
                ctl.process_command(line);
            }
        }
    }

    Ok(())
}

// Per-connection reader and writer tasks.
fn spawn_conn_tasks(
    conn_id: u64,
    stream: TcpStream,
    event_tx: mpsc::UnboundedSender<Event>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Frame>();

    let _ = event_tx.send(Event::Conn(conn_id, frame_tx));

    // Reader.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                match tcppkt::read_frame(&mut read_half).await {
                    Ok((hdr, body)) => {
                        if event_tx
                            .send(Event::Frame(conn_id, hdr, body))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = event_tx.send(Event::Closed(conn_id));
                        break;
                    }
                }
            }
        });
    }

    // Writer.
    tokio::spawn(async move {
        while let Some((pkt_type, subtype, body)) = frame_rx.recv().await {
            if tcppkt::write_frame(&mut write_half, pkt_type, subtype, &body)
                .await
                .is_err()
            {
                break;
            }
        }
    });
}
