//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Platform adaptation contract.
//!
//! Every concrete platform (real OS, simulator) implements [`SysCalls`].
//! The engine drives the platform to transmit packets and install routes,
//! and reads `elapsed_time` as its sole source of time.

use std::net::Ipv4Addr;
use std::time::Duration;

use ipnetwork::Ipv4Network;

// Gateway selection for an outgoing datagram.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendGateway {
    // Deliver directly to the datagram's IP destination.
    Direct,
    // Deliver to all routers on the segment.
    AllSegment,
    // Deliver to a specific next hop.
    Nexthop(Ipv4Addr),
}

// One equal-cost path of an installed route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MPathEntry {
    pub phyint: i32,
    pub if_addr: Ipv4Addr,
    pub gw: Option<Ipv4Addr>,
}

// Set of equal-cost paths.
pub type MPath = Vec<MPathEntry>;

// Downstream leg of a multicast forwarding cache entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MCacheDownstream {
    pub phyint: i32,
    pub nbr_addr: Option<Ipv4Addr>,
    pub ttl_threshold: u8,
}

// Multicast forwarding cache entry handed to the platform.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MCacheEntry {
    pub upstream: Vec<i32>,
    pub downstream: Vec<MCacheDownstream>,
    pub valid: bool,
}

// Per-interface MD5 sequence number persisted across a hitless restart.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Md5Seq {
    pub phyint: i32,
    pub if_addr: Ipv4Addr,
    pub seqno: u32,
}

// Severity of a structured engine log message forwarded to the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

// System-calls interface consumed by the engine.
pub trait SysCalls {
    // Seconds and milliseconds since the router (or simulation) started.
    // This is the engine's only source of time.
    fn elapsed_time(&self) -> Duration;

    // Transmit a prepared IP datagram out the given physical interface.
    fn sendpkt(&self, pkt: &[u8], phyint: i32, gw: SendGateway);

    // Transmit via a next-hop lookup the platform owns (virtual links).
    fn sendpkt_vl(&self, pkt: &[u8]);

    // Report link operational state.
    fn phy_operational(&self, phyint: i32) -> bool;

    // Arm/disarm per-interface I/O.
    fn phy_open(&self, phyint: i32);
    fn phy_close(&self, phyint: i32);

    // Multicast group membership.
    fn join(&self, group: Ipv4Addr, phyint: i32);
    fn leave(&self, group: Ipv4Addr, phyint: i32);

    // Enable/disable IP forwarding.
    fn ip_forward(&self, enabled: bool);

    // Global / per-interface multicast forwarding.
    fn set_multicast_routing(&self, enabled: bool);
    fn set_multicast_routing_if(&self, phyint: i32, enabled: bool);

    // Install or update a unicast route. An empty `mpath` with a non-empty
    // `old` means delete; `reject` installs a blackhole.
    fn rtadd(
        &self,
        net: Ipv4Network,
        mpath: &MPath,
        old: Option<&MPath>,
        reject: bool,
    );

    // Remove a route.
    fn rtdel(&self, net: Ipv4Network, old: Option<&MPath>);

    // Multicast kernel cache.
    fn add_mcache(&self, src: Ipv4Addr, group: Ipv4Addr, entry: &MCacheEntry);
    fn del_mcache(&self, src: Ipv4Addr, group: Ipv4Addr);

    // Ask the platform to report pre-existing kernel routes through
    // `Instance::remnant_notification`.
    fn upload_remnants(&self);

    // Printable interface name.
    fn phyname(&self, phyint: i32) -> String;

    // Structured log hook.
    fn spflog(&self, level: LogLevel, msg: &str);

    // Persist hitless restart parameters before the process exits.
    fn store_hitless_parms(&self, grace_period: u16, md5_seqs: &[Md5Seq]);

    // Terminate the daemon. During a hitless-restart preparation sequence a
    // zero exit code means "prepared successfully" and the embedding
    // process restarts the engine instead of exiting.
    fn halt(&self, code: i32, msg: &str);
}
