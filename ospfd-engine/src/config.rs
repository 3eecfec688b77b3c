//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Configuration records.
//!
//! All configuration enters the engine through the `cfg_*` entry points on
//! [`crate::instance::Instance`]. A sequence of calls may be bracketed by
//! `cfg_start`/`cfg_done` to form an atomic reconfiguration: items not
//! re-asserted inside the bracket are deleted when the transaction ends.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::packet::auth::AuthKey;

// Global configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgOspf {
    pub router_id: Ipv4Addr,
    // AS-external LSA ceiling; zero disables the limit.
    pub ext_lsdb_limit: u32,
    // Seconds to wait before leaving overflow state.
    pub exit_overflow_interval: u32,
    // Maximum simultaneous Database Exchange neighbors; zero means no cap.
    pub max_dbx_nbrs: u16,
    // Maximum equal-cost paths per routing table entry.
    pub max_paths: u8,
    // Milliseconds between an SPF trigger and the SPF run.
    pub spf_delay_ms: u32,
    // Seconds between forced refreshes of self-originated LSAs; zero
    // disables periodic refresh beyond the architectural LSRefreshTime.
    pub refresh_rate: u32,
    pub mospf_enabled: bool,
    pub inter_area_mc: bool,
}

// Per-area configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgArea {
    pub area_id: Ipv4Addr,
    pub stub: bool,
    // Default route cost advertised into a stub area.
    pub default_cost: u32,
    pub import_summaries: bool,
    pub demand: bool,
}

// Interface type as configured.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CfgIfcType {
    Broadcast,
    NonBroadcast,
    PointToPoint,
    PointToMultipoint,
    Loopback,
}

// Multicast forwarding mode on an interface.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum McFwdMode {
    #[default]
    Blocked,
    Multicast,
    Unicast,
}

// Per-interface configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgIfc {
    pub phyint: i32,
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub area_id: Ipv4Addr,
    pub if_type: CfgIfcType,
    pub mtu: u16,
    pub cost: u16,
    pub hello_interval: u16,
    pub dead_interval: u32,
    pub poll_interval: u32,
    pub rxmt_interval: u16,
    pub transmit_delay: u16,
    pub priority: u8,
    pub passive: bool,
    pub demand: bool,
    pub mc_fwd: McFwdMode,
    pub auth_type: CfgAuthType,
    // Simple password, when auth_type is Simple.
    #[serde(default)]
    pub passwd: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum CfgAuthType {
    #[default]
    Null,
    Simple,
    Cryptographic,
}

// Statically configured neighbor (NBMA and point-to-multipoint).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgNbr {
    pub phyint: i32,
    pub if_addr: Ipv4Addr,
    pub nbr_addr: Ipv4Addr,
    pub dr_eligible: bool,
}

// Configured area address range.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgRnge {
    pub area_id: Ipv4Addr,
    pub net: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub no_advertise: bool,
}

// Directly attached host advertised as a stub link.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgHost {
    pub area_id: Ipv4Addr,
    pub net: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub cost: u16,
}

// Virtual link configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgVL {
    pub transit_area: Ipv4Addr,
    pub endpoint_id: Ipv4Addr,
    pub hello_interval: u16,
    pub dead_interval: u32,
    pub rxmt_interval: u16,
    pub transmit_delay: u16,
    pub auth_type: CfgAuthType,
    #[serde(default)]
    pub passwd: Vec<u8>,
}

// Redistributed external route.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgExRt {
    pub net: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub type2: bool,
    pub metric: u32,
    pub gw: Option<Ipv4Addr>,
    pub phyint: Option<i32>,
    pub tag: u32,
    pub mc_source: bool,
}

// Cryptographic authentication key for an interface.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CfgAuKey {
    pub phyint: i32,
    pub if_addr: Ipv4Addr,
    pub key: AuthKey,
}

// Any single configuration item, as carried over the simulator's control
// channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ConfigItem {
    Ospf(CfgOspf),
    Area(CfgArea),
    Ifc(CfgIfc),
    Nbr(CfgNbr),
    Rnge(CfgRnge),
    Host(CfgHost),
    VL(CfgVL),
    ExRt(CfgExRt),
    AuKey(CfgAuKey),
}

// Keys identifying configuration items for deletion.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ConfigItemKey {
    Area { area_id: Ipv4Addr },
    Ifc { phyint: i32, addr: Ipv4Addr },
    Nbr { phyint: i32, nbr_addr: Ipv4Addr },
    Rnge { area_id: Ipv4Addr, net: Ipv4Addr, mask: Ipv4Addr },
    Host { area_id: Ipv4Addr, net: Ipv4Addr, mask: Ipv4Addr },
    VL { transit_area: Ipv4Addr, endpoint_id: Ipv4Addr },
    ExRt { net: Ipv4Addr, mask: Ipv4Addr },
    AuKey { phyint: i32, if_addr: Ipv4Addr, key_id: u8 },
}

// ===== impl CfgOspf =====

impl CfgOspf {
    pub fn new(router_id: Ipv4Addr) -> CfgOspf {
        CfgOspf {
            router_id,
            ext_lsdb_limit: 0,
            exit_overflow_interval: 300,
            max_dbx_nbrs: 0,
            max_paths: 4,
            spf_delay_ms: 0,
            refresh_rate: 0,
            mospf_enabled: false,
            inter_area_mc: false,
        }
    }
}

// ===== impl CfgIfc =====

impl CfgIfc {
    pub fn new(
        phyint: i32,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
        area_id: Ipv4Addr,
        if_type: CfgIfcType,
    ) -> CfgIfc {
        CfgIfc {
            phyint,
            addr,
            mask,
            area_id,
            if_type,
            mtu: 1500,
            cost: 1,
            hello_interval: 10,
            dead_interval: 40,
            poll_interval: 120,
            rxmt_interval: 5,
            transmit_delay: 1,
            priority: 1,
            passive: false,
            demand: false,
            mc_fwd: McFwdMode::default(),
            auth_type: CfgAuthType::default(),
            passwd: vec![],
        }
    }
}
