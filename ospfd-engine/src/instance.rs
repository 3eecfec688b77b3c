//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use ipnetwork::Ipv4Network;

use crate::area::{Host, Range};
use crate::collections::{
    AreaId, Areas, Arena, InterfaceId, LsaEntryId, Lsdb, LsdbId, NeighborId,
    VL_PHYINT,
};
use crate::config::{
    CfgAuKey, CfgArea, CfgExRt, CfgHost, CfgIfc, CfgIfcType, CfgNbr, CfgOspf,
    CfgRnge, CfgVL, ConfigItem, ConfigItemKey,
};
use crate::debug::{Debug, InstanceInactiveReason, InterfaceInactiveReason, LsaFlushReason};
use crate::gr::GrRestart;
use crate::interface::{Interface, InterfaceType, StaticNbr, Vlink, ism};
use crate::lsdb::{DbStatsSnapshot, LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, RxmtPacketType, nsm};
use crate::packet::Options;
use crate::packet::auth::AuthMethod;
use crate::packet::lsa::{LsaBody, LsaKey};
use crate::route::RouteNet;
use crate::sys::{MCacheEntry, Md5Seq, SysCalls};
use crate::timer::TimerCtl;

// Timer handles are instantiated over the protocol message type.
pub type TimeoutTask = crate::timer::TimeoutTask<ProtocolMsg>;
pub type IntervalTask = crate::timer::IntervalTask<ProtocolMsg>;

// Internal protocol events. Timer firings and deferred work are funneled
// through a single queue so that all processing is serialized in arrival
// order.
#[derive(Clone, Debug)]
pub enum ProtocolMsg {
    IsmEvent {
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    },
    NsmEvent {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    },
    HelloInterval {
        area_id: AreaId,
        iface_id: InterfaceId,
        addr: Option<Ipv4Addr>,
    },
    SendLsUpdate {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    },
    RxmtInterval {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        packet_type: RxmtPacketType,
    },
    DelayedAck {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    DbDescFree {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    LsaOrigEvent {
        event: LsaOriginateEvent,
    },
    LsaOrigCheck {
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    },
    LsaOrigDelayed {
        lsdb_id: LsdbId,
        lsa_key: LsaKey,
    },
    LsaFlush {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    },
    LsaRefresh {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
    LsaExpiry {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
    LsdbMaxAgeSweep {
        lsdb_id: LsdbId,
    },
    SpfTimer,
    GracePeriod {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    GrExitCheck {
        timed_out: bool,
    },
    ExitOverflow,
    AdjacencyCheck,
    ShutdownTimer,
}

// Engine context: all state lives here, passed explicitly to every call.
pub struct Instance {
    pub config: InstanceCfg,
    pub state: Option<InstanceState>,
    pub arenas: InstanceArenas,
    pub tx: InstanceTx,
    // Configuration transaction bookkeeping.
    cfg_gen: u32,
    cfg_in_transaction: bool,
}

// Global configuration, resolved from `cfg_ospf` and friends.
#[derive(Debug)]
pub struct InstanceCfg {
    pub enabled: bool,
    pub router_id: Ipv4Addr,
    pub ext_lsdb_limit: u32,
    pub exit_overflow_interval: u32,
    pub max_dbx_nbrs: u16,
    pub max_paths: u8,
    pub spf_delay_ms: u32,
    pub refresh_rate: u32,
    pub mospf_enabled: bool,
    pub inter_area_mc: bool,
    pub ext_routes: BTreeMap<Ipv4Network, ExtRouteCfg>,
}

#[derive(Clone, Debug)]
pub struct ExtRouteCfg {
    pub type2: bool,
    pub metric: u32,
    pub gw: Option<Ipv4Addr>,
    pub phyint: Option<i32>,
    pub tag: u32,
    pub mc_source: bool,
    pub cfg_gen: u32,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb,
    // Routing table.
    pub rib: BTreeMap<Ipv4Network, RouteNet>,
    // SPF data.
    pub spf_delay_timer: Option<TimeoutTask>,
    pub spf_run_count: u32,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    pub bad_packet_count: u32,
    // Number of neighbors currently undergoing Database Exchange.
    pub dbx_nbr_count: usize,
    // AS-external overflow state (RFC 1765).
    pub overflow: bool,
    pub overflow_exit_timer: Option<TimeoutTask>,
    // Number of neighbors performing a graceful restart.
    pub gr_helper_count: usize,
    // Restarting-side graceful restart state.
    pub gr_restart: Option<GrRestart>,
    // Multicast forwarding cache.
    pub mospf_cache: BTreeMap<(Ipv4Addr, Ipv4Addr), MCacheEntry>,
    // Remnant kernel routes reported by the platform.
    pub remnants: BTreeSet<Ipv4Network>,
    // Monitor opaque-LSA subscription.
    pub opaque_client: Option<u8>,
    pub opaque_notifications: VecDeque<(Ipv4Addr, bytes::Bytes)>,
    // Delayed shutdown.
    pub shutdown_timer: Option<TimeoutTask>,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

// Handles shared by the whole engine: the event queue, the timer wheel and
// the platform.
pub struct InstanceTx {
    events: RefCell<VecDeque<ProtocolMsg>>,
    pub timers: TimerCtl<ProtocolMsg>,
    pub sys: Rc<dyn SysCalls>,
}

// Borrowed view of an active instance.
pub struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceTx,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(sys: Rc<dyn SysCalls>) -> Instance {
        Debug::InstanceCreate.log();

        let tx = InstanceTx {
            events: RefCell::new(VecDeque::new()),
            timers: TimerCtl::new(),
            sys,
        };
        // The platform clock may be far from zero when the engine is
        // bootstrapped after a hitless restart.
        tx.timers.sync(tx.sys.elapsed_time());

        Instance {
            config: InstanceCfg {
                enabled: false,
                router_id: Ipv4Addr::UNSPECIFIED,
                ext_lsdb_limit: 0,
                exit_overflow_interval: 300,
                max_dbx_nbrs: 0,
                max_paths: 4,
                spf_delay_ms: 0,
                refresh_rate: 0,
                mospf_enabled: false,
                inter_area_mc: false,
                ext_routes: Default::default(),
            },
            state: None,
            arenas: Default::default(),
            tx,
            cfg_gen: 0,
            cfg_in_transaction: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn router_id(&self) -> Ipv4Addr {
        self.config.router_id
    }

    // ===== time =====

    // Advances all internal timers to the current elapsed-time reading.
    pub fn tick(&mut self) {
        self.sync_clock();
        loop {
            let Some(msg) = self.tx.timers.poll_due() else {
                break;
            };
            self.tx.push(msg);
            self.run();
        }
    }

    // Milliseconds until the next timer firing.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.tx.timers.timeout_ms()
    }

    fn sync_clock(&self) {
        self.tx.timers.sync(self.tx.sys.elapsed_time());
    }

    // ===== packet input =====

    // Classifies and processes a received IP datagram.
    pub fn receive_ip_packet(&mut self, phyint: i32, data: &[u8]) {
        self.sync_clock();
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) = crate::events::process_ip_packet(
                &mut instance,
                arenas,
                phyint,
                data,
            )
        {
            instance.state.bad_packet_count += 1;
            error.log();
        }
        self.run();
    }

    // ===== configuration =====

    pub fn cfg_start(&mut self) {
        self.cfg_gen += 1;
        self.cfg_in_transaction = true;
    }

    // Ends an atomic reconfiguration: any items not re-asserted since
    // `cfg_start` are deleted.
    pub fn cfg_done(&mut self) {
        if !self.cfg_in_transaction {
            return;
        }
        self.cfg_in_transaction = false;
        let cfg_gen = self.cfg_gen;

        // Sweep stale external routes.
        let stale: Vec<_> = self
            .config
            .ext_routes
            .iter()
            .filter(|(_, ext)| ext.cfg_gen != cfg_gen)
            .map(|(prefix, _)| *prefix)
            .collect();
        for prefix in stale {
            self.config.ext_routes.remove(&prefix);
        }

        // Sweep stale interfaces and areas.
        let mut stale_ifaces = vec![];
        let mut stale_areas = vec![];
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &mut self.arenas.areas[area_idx];
            area.ranges.retain(|_, range| range.cfg_gen == cfg_gen);
            area.hosts.retain(|_, host| host.cfg_gen == cfg_gen);

            for iface_idx in area.interfaces.indexes() {
                let iface = &self.arenas.interfaces[iface_idx];
                if iface.cfg_gen != cfg_gen {
                    stale_ifaces.push((area_idx, iface_idx));
                }
            }
            if area.cfg_gen != cfg_gen {
                stale_areas.push(area_idx);
            }
        }
        for (area_idx, iface_idx) in stale_ifaces {
            self.delete_interface(area_idx, iface_idx);
        }
        for area_idx in stale_areas {
            let area = &self.arenas.areas[area_idx];
            if area.interfaces.count() == 0 {
                self.arenas.areas.delete(area_idx);
            }
        }

        self.update();
        self.tx.lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        self.run();
    }

    pub fn cfg_ospf(&mut self, cfg: CfgOspf) {
        self.config.enabled = true;
        self.config.router_id = cfg.router_id;
        self.config.ext_lsdb_limit = cfg.ext_lsdb_limit;
        self.config.exit_overflow_interval = cfg.exit_overflow_interval;
        self.config.max_dbx_nbrs = cfg.max_dbx_nbrs;
        self.config.max_paths = cfg.max_paths.max(1);
        self.config.spf_delay_ms = cfg.spf_delay_ms;
        self.config.refresh_rate = cfg.refresh_rate;
        self.config.mospf_enabled = cfg.mospf_enabled;
        self.config.inter_area_mc = cfg.inter_area_mc;

        self.update();
        self.run();
    }

    pub fn cfg_area(&mut self, cfg: CfgArea) {
        let cfg_gen = self.cfg_gen;
        let area_idx = self.area_find_or_create(cfg.area_id);
        let area = &mut self.arenas.areas[area_idx];
        area.cfg_gen = cfg_gen;
        area.config.stub = cfg.stub;
        area.config.default_cost = cfg.default_cost;
        area.config.import_summaries = cfg.import_summaries;
        area.config.demand = cfg.demand;
        self.run();
    }

    pub fn cfg_ifc(&mut self, cfg: CfgIfc) {
        let cfg_gen = self.cfg_gen;

        // Areas are implicitly created by the interfaces referring to
        // them.
        let area_idx = self.area_find_or_create(cfg.area_id);

        let area = &mut self.arenas.areas[area_idx];
        let iface_idx = area
            .interfaces
            .get_by_addr(&self.arenas.interfaces, cfg.phyint, cfg.addr)
            .map(|(iface_idx, _)| iface_idx);
        let iface_idx = match iface_idx {
            Some(iface_idx) => iface_idx,
            None => {
                area.interfaces
                    .insert(&mut self.arenas.interfaces, cfg.phyint, cfg.addr)
                    .0
            }
        };
        let iface = &mut self.arenas.interfaces[iface_idx];

        iface.cfg_gen = cfg_gen;
        iface.config.if_type = match cfg.if_type {
            CfgIfcType::Broadcast => InterfaceType::Broadcast,
            CfgIfcType::NonBroadcast => InterfaceType::NonBroadcast,
            CfgIfcType::PointToPoint => InterfaceType::PointToPoint,
            CfgIfcType::PointToMultipoint => InterfaceType::PointToMultipoint,
            CfgIfcType::Loopback => InterfaceType::Loopback,
        };
        iface.config.mask = cfg.mask;
        iface.config.mtu = cfg.mtu;
        iface.config.cost = cfg.cost.max(1);
        iface.config.hello_interval = cfg.hello_interval;
        iface.config.dead_interval = cfg.dead_interval;
        iface.config.poll_interval = cfg.poll_interval;
        iface.config.rxmt_interval = cfg.rxmt_interval.max(1);
        iface.config.transmit_delay = cfg.transmit_delay.max(1);
        iface.config.priority = cfg.priority;
        iface.config.passive = cfg.passive;
        iface.config.demand = cfg.demand;
        iface.config.mc_fwd = cfg.mc_fwd;
        iface.config.auth = match cfg.auth_type {
            crate::config::CfgAuthType::Null => None,
            crate::config::CfgAuthType::Simple => {
                Some(AuthMethod::Simple(cfg.passwd.clone()))
            }
            crate::config::CfgAuthType::Cryptographic => {
                // Keys arrive separately through `cfg_auth_key`; keep any
                // already configured.
                match iface.config.auth.take() {
                    Some(auth @ AuthMethod::Cryptographic(_)) => Some(auth),
                    _ => Some(AuthMethod::Cryptographic(vec![])),
                }
            }
        };
        iface.system.operational =
            self.tx.sys.phy_operational(cfg.phyint);

        self.update();
        self.run();
    }

    pub fn cfg_nbr(&mut self, cfg: CfgNbr) {
        let cfg_gen = self.cfg_gen;
        if let Some((_, iface)) = self.find_iface_mut(cfg.phyint, cfg.if_addr)
        {
            iface.config.static_nbrs.insert(
                cfg.nbr_addr,
                StaticNbr {
                    dr_eligible: cfg.dr_eligible,
                    cfg_gen,
                },
            );
        }
        self.run();
    }

    pub fn cfg_range(&mut self, cfg: CfgRnge) {
        let cfg_gen = self.cfg_gen;
        if let Some((_, area)) =
            self.arenas.areas.get_mut_by_area_id(cfg.area_id)
            && let Some(prefix) =
                ospfd_utils::ip::network_from_mask(cfg.net, cfg.mask)
        {
            area.ranges.insert(
                prefix,
                Range {
                    no_advertise: cfg.no_advertise,
                    cfg_gen,
                },
            );
        }
        self.run();
    }

    pub fn cfg_host(&mut self, cfg: CfgHost) {
        let cfg_gen = self.cfg_gen;
        if let Some(prefix) =
            ospfd_utils::ip::network_from_mask(cfg.net, cfg.mask)
            && let Some((_, area)) =
                self.arenas.areas.get_mut_by_area_id(cfg.area_id)
        {
            let area_id = area.id;
            area.hosts.insert(
                prefix,
                Host {
                    cost: cfg.cost,
                    cfg_gen,
                },
            );
            self.tx.lsa_orig_event(LsaOriginateEvent::AreaStart {
                area_id,
            });
        }
        self.run();
    }

    pub fn cfg_vl(&mut self, cfg: CfgVL) {
        let cfg_gen = self.cfg_gen;

        // Virtual links attach to the backbone area.
        let area_idx = self.area_find_or_create(Ipv4Addr::UNSPECIFIED);

        let area = &mut self.arenas.areas[area_idx];
        let iface_idx = area
            .interfaces
            .get_by_addr(&self.arenas.interfaces, VL_PHYINT, cfg.endpoint_id)
            .map(|(iface_idx, _)| iface_idx);
        let iface_idx = match iface_idx {
            Some(iface_idx) => iface_idx,
            None => {
                area.interfaces
                    .insert(
                        &mut self.arenas.interfaces,
                        VL_PHYINT,
                        cfg.endpoint_id,
                    )
                    .0
            }
        };
        let iface = &mut self.arenas.interfaces[iface_idx];

        iface.cfg_gen = cfg_gen;
        iface.config.if_type = InterfaceType::VirtualLink;
        iface.config.hello_interval = cfg.hello_interval;
        iface.config.dead_interval = cfg.dead_interval;
        iface.config.rxmt_interval = cfg.rxmt_interval.max(1);
        iface.config.transmit_delay = cfg.transmit_delay.max(1);
        iface.config.auth = match cfg.auth_type {
            crate::config::CfgAuthType::Null => None,
            crate::config::CfgAuthType::Simple => {
                Some(AuthMethod::Simple(cfg.passwd.clone()))
            }
            crate::config::CfgAuthType::Cryptographic => {
                Some(AuthMethod::Cryptographic(vec![]))
            }
        };
        iface.vlink = Some(Vlink {
            transit_area: cfg.transit_area,
            endpoint_id: cfg.endpoint_id,
            src_addr: None,
            dst_addr: None,
        });

        self.update();
        self.run();
    }

    pub fn cfg_ext_rt(&mut self, cfg: CfgExRt) {
        let cfg_gen = self.cfg_gen;
        if let Some(prefix) =
            ospfd_utils::ip::network_from_mask(cfg.net, cfg.mask)
        {
            self.config.ext_routes.insert(
                prefix,
                ExtRouteCfg {
                    type2: cfg.type2,
                    metric: cfg.metric,
                    gw: cfg.gw,
                    phyint: cfg.phyint,
                    tag: cfg.tag,
                    mc_source: cfg.mc_source,
                    cfg_gen,
                },
            );
            self.tx.lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        }
        self.run();
    }

    pub fn cfg_auth_key(&mut self, cfg: CfgAuKey) {
        if let Some((_, iface)) = self.find_iface_mut(cfg.phyint, cfg.if_addr)
        {
            let keys = match &mut iface.config.auth {
                Some(AuthMethod::Cryptographic(keys)) => keys,
                _ => {
                    iface.config.auth =
                        Some(AuthMethod::Cryptographic(vec![]));
                    match &mut iface.config.auth {
                        Some(AuthMethod::Cryptographic(keys)) => keys,
                        _ => unreachable!(),
                    }
                }
            };
            keys.retain(|key| key.id != cfg.key.id);
            keys.push(cfg.key);
        }
        self.run();
    }

    // Deletes a single configuration item.
    pub fn cfg_delete(&mut self, key: ConfigItemKey) {
        match key {
            ConfigItemKey::Area { area_id } => {
                if let Some((area_idx, area)) =
                    self.arenas.areas.get_by_area_id(area_id)
                {
                    for iface_idx in
                        area.interfaces.indexes().collect::<Vec<_>>()
                    {
                        self.delete_interface(area_idx, iface_idx);
                    }
                    self.arenas.areas.delete(area_idx);
                }
            }
            ConfigItemKey::Ifc { phyint, addr } => {
                if let Some((area_idx, iface_idx)) =
                    self.find_iface_idx(phyint, addr)
                {
                    self.delete_interface(area_idx, iface_idx);
                }
            }
            ConfigItemKey::Nbr { phyint, nbr_addr } => {
                for (_, iface) in self.arenas.interfaces.iter_mut() {
                    if iface.phyint == phyint {
                        iface.config.static_nbrs.remove(&nbr_addr);
                    }
                }
            }
            ConfigItemKey::Rnge {
                area_id,
                net,
                mask,
            } => {
                if let Some((_, area)) =
                    self.arenas.areas.get_mut_by_area_id(area_id)
                    && let Some(prefix) =
                        ospfd_utils::ip::network_from_mask(net, mask)
                {
                    area.ranges.remove(&prefix);
                }
            }
            ConfigItemKey::Host {
                area_id,
                net,
                mask,
            } => {
                if let Some((_, area)) =
                    self.arenas.areas.get_mut_by_area_id(area_id)
                    && let Some(prefix) =
                        ospfd_utils::ip::network_from_mask(net, mask)
                {
                    area.hosts.remove(&prefix);
                }
            }
            ConfigItemKey::VL { endpoint_id, .. } => {
                if let Some((area_idx, iface_idx)) =
                    self.find_iface_idx(VL_PHYINT, endpoint_id)
                {
                    self.delete_interface(area_idx, iface_idx);
                }
            }
            ConfigItemKey::ExRt { net, mask } => {
                if let Some(prefix) =
                    ospfd_utils::ip::network_from_mask(net, mask)
                {
                    self.config.ext_routes.remove(&prefix);
                    self.tx.lsa_orig_event(
                        LsaOriginateEvent::ExternalRoutesChange,
                    );
                }
            }
            ConfigItemKey::AuKey {
                phyint,
                if_addr,
                key_id,
            } => {
                if let Some((_, iface)) = self.find_iface_mut(phyint, if_addr)
                    && let Some(AuthMethod::Cryptographic(keys)) =
                        &mut iface.config.auth
                {
                    keys.retain(|key| key.id != key_id);
                }
            }
        }
        self.run();
    }

    // Applies a configuration item received over the simulator's control
    // channel.
    pub fn apply(&mut self, item: ConfigItem) {
        match item {
            ConfigItem::Ospf(cfg) => self.cfg_ospf(cfg),
            ConfigItem::Area(cfg) => self.cfg_area(cfg),
            ConfigItem::Ifc(cfg) => self.cfg_ifc(cfg),
            ConfigItem::Nbr(cfg) => self.cfg_nbr(cfg),
            ConfigItem::Rnge(cfg) => self.cfg_range(cfg),
            ConfigItem::Host(cfg) => self.cfg_host(cfg),
            ConfigItem::VL(cfg) => self.cfg_vl(cfg),
            ConfigItem::ExRt(cfg) => self.cfg_ext_rt(cfg),
            ConfigItem::AuKey(cfg) => self.cfg_auth_key(cfg),
        }
    }

    // ===== platform indications =====

    pub fn phy_up(&mut self, phyint: i32) {
        self.sync_clock();
        self.set_phy_state(phyint, true);
    }

    pub fn phy_down(&mut self, phyint: i32) {
        self.sync_clock();
        self.set_phy_state(phyint, false);
    }

    fn set_phy_state(&mut self, phyint: i32, operational: bool) {
        for (_, iface) in self.arenas.interfaces.iter_mut() {
            if iface.phyint == phyint {
                iface.system.operational = operational;
            }
        }
        self.update();
        self.run();
    }

    pub fn join_indication(&mut self, group: Ipv4Addr, phyint: i32) {
        self.membership_update(group, phyint, true);
    }

    pub fn leave_indication(&mut self, group: Ipv4Addr, phyint: i32) {
        self.membership_update(group, phyint, false);
    }

    fn membership_update(&mut self, group: Ipv4Addr, phyint: i32, join: bool) {
        self.sync_clock();
        let mut changed_areas = vec![];
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &self.arenas.areas[area_idx];
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let iface = &mut self.arenas.interfaces[iface_idx];
                if iface.phyint != phyint {
                    continue;
                }
                let changed = if join {
                    iface.state.group_membership.insert(group)
                } else {
                    iface.state.group_membership.remove(&group)
                };
                if changed {
                    changed_areas.push(area.id);
                }
            }
        }
        for area_id in changed_areas {
            self.tx.lsa_orig_event(LsaOriginateEvent::GroupMembershipChange {
                area_id,
            });
        }
        self.run();
    }

    // The platform reports a pre-existing kernel route; the engine deletes
    // it after the next routing table calculation unless it would have
    // installed it itself.
    pub fn remnant_notification(&mut self, net: Ipv4Network) {
        if let Some(state) = &mut self.state {
            state.remnants.insert(net);
        }
    }

    // A kernel route was deleted behind the engine's back; reinstall it if
    // it's still wanted.
    pub fn krt_delete_notification(&mut self, net: Ipv4Network) {
        self.sync_clock();
        if let Some((instance, _)) = self.as_up()
            && let Some(route) = instance.state.rib.get(&net)
            && route
                .flags
                .contains(crate::route::RouteNetFlags::INSTALLED)
        {
            instance.tx.sys.rtadd(
                net,
                &crate::route::mpath_from_nexthops(&route.nexthops),
                None,
                route.flags.contains(crate::route::RouteNetFlags::REJECT),
            );
        }
    }

    // ===== hitless restart =====

    // Prepares a hitless restart: grace-LSAs are originated, restart
    // parameters persisted, and `halt(0)` signals readiness.
    pub fn hitless_restart(&mut self, grace_period: u16) {
        self.sync_clock();
        if let Some((mut instance, arenas)) = self.as_up() {
            crate::gr::restart_prepare(&mut instance, arenas, grace_period);
        }
        self.run();
    }

    // Bootstraps the restarting role on a rebuilt engine: the clock is
    // preserved by the platform, and the persisted MD5 sequence numbers
    // are restored.
    pub fn hitless_restore(
        &mut self,
        grace_period: u16,
        md5_seqs: &[Md5Seq],
    ) {
        self.sync_clock();
        crate::gr::restore_md5_seqnos(&mut self.arenas, md5_seqs);
        if let Some((mut instance, _)) = self.as_up() {
            crate::gr::restart_enter(&mut instance, grace_period);
        }
        self.run();
    }

    // ===== shutdown =====

    // Starts an orderly shutdown: self-originated LSAs are flushed and the
    // platform is halted after the given delay.
    pub fn shutdown(&mut self, delay_secs: u16) {
        self.sync_clock();
        if let Some((mut instance, arenas)) = self.as_up() {
            Debug::InstanceStop(InstanceInactiveReason::Shutdown).log();
            crate::lsdb::flush_all_self_originated(&mut instance, arenas);
            if delay_secs > 0 {
                let task = instance.tx.timers.timeout(
                    Duration::from_secs(delay_secs as u64),
                    ProtocolMsg::ShutdownTimer,
                );
                instance.state.shutdown_timer = Some(task);
            }
        }
        self.run();

        // With no delay, halt right away; otherwise the shutdown timer
        // performs the single halt when it fires.
        if delay_secs == 0 {
            self.tx.sys.halt(0, "shutdown complete");
        }
    }

    // ===== multicast =====

    pub fn mclookup(
        &mut self,
        src: Ipv4Addr,
        group: Ipv4Addr,
    ) -> MCacheEntry {
        self.sync_clock();
        match self.as_up() {
            Some((mut instance, arenas)) => {
                crate::mospf::mclookup(&mut instance, arenas, src, group)
            }
            None => MCacheEntry::default(),
        }
    }

    // ===== queries =====

    // Database fingerprint reported in simulator tick responses.
    pub fn db_stats(&self) -> DbStatsSnapshot {
        match &self.state {
            Some(state) => crate::lsdb::db_stats(&state.lsdb, &self.arenas.areas),
            None => DbStatsSnapshot {
                n_exlsas: 0,
                ex_dbxsum: 0,
                area_id: Ipv4Addr::UNSPECIFIED,
                n_lsas: 0,
                dbxsum: 0,
            },
        }
    }

    // Drains pending opaque-LSA notifications for the registered monitor
    // client.
    pub fn poll_opaque_notifications(
        &mut self,
    ) -> Vec<(u8, Ipv4Addr, bytes::Bytes)> {
        let Some(state) = &mut self.state else {
            return vec![];
        };
        let Some(client_id) = state.opaque_client else {
            return vec![];
        };
        state
            .opaque_notifications
            .drain(..)
            .map(|(area_id, raw)| (client_id, area_id, raw))
            .collect()
    }

    // ===== internals =====

    // Checks if the instance needs to be started or stopped, then brings
    // interfaces in line with the configuration.
    fn update(&mut self) {
        if self.is_ready().is_ok() && !self.is_active() {
            self.start();
        }

        // Update all interfaces.
        if let Some((mut instance, arenas)) = self.as_up() {
            crate::events::update_all_interfaces(&mut instance, arenas);
        }
    }

    fn is_ready(&self) -> Result<(), InstanceInactiveReason> {
        if !self.config.enabled {
            return Err(InstanceInactiveReason::AdminDown);
        }
        if self.config.router_id == Ipv4Addr::UNSPECIFIED {
            return Err(InstanceInactiveReason::MissingRouterId);
        }

        Ok(())
    }

    fn start(&mut self) {
        Debug::InstanceStart.log();

        self.sync_clock();
        self.state = Some(InstanceState {
            router_id: self.config.router_id,
            lsdb: Default::default(),
            rib: Default::default(),
            spf_delay_timer: None,
            spf_run_count: 0,
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            bad_packet_count: 0,
            dbx_nbr_count: 0,
            overflow: false,
            overflow_exit_timer: None,
            gr_helper_count: 0,
            gr_restart: None,
            mospf_cache: Default::default(),
            remnants: Default::default(),
            opaque_client: None,
            opaque_notifications: Default::default(),
            shutdown_timer: None,
        });

        // Enable forwarding and ask the platform for pre-existing routes.
        self.tx.sys.ip_forward(true);
        if self.config.mospf_enabled {
            self.tx.sys.set_multicast_routing(true);
        }
        self.tx.sys.upload_remnants();

        // Originate the initial LSAs.
        for area in self.arenas.areas.iter() {
            self.tx.lsa_orig_event(LsaOriginateEvent::AreaStart {
                area_id: area.id,
            });
        }
        self.tx.lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
    }

    fn area_find_or_create(
        &mut self,
        area_id: Ipv4Addr,
    ) -> crate::collections::AreaIndex {
        let area_idx = self
            .arenas
            .areas
            .get_by_area_id(area_id)
            .map(|(area_idx, _)| area_idx);
        match area_idx {
            Some(area_idx) => area_idx,
            None => {
                let cfg_gen = self.cfg_gen;
                let (area_idx, area) = self.arenas.areas.insert(area_id);
                area.cfg_gen = cfg_gen;
                area_idx
            }
        }
    }

    fn delete_interface(
        &mut self,
        area_idx: crate::collections::AreaIndex,
        iface_idx: crate::collections::InterfaceIndex,
    ) {
        if let Some((mut instance, arenas)) = self.as_up() {
            let area = &arenas.areas[area_idx];
            let iface = &mut arenas.interfaces[iface_idx];
            iface.fsm(
                area,
                &mut instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
                ism::Event::InterfaceDown(
                    InterfaceInactiveReason::Deconfigured,
                ),
            );
        }
        let area = &mut self.arenas.areas[area_idx];
        area.interfaces
            .delete(&mut self.arenas.interfaces, iface_idx);
        self.run();
    }

    fn find_iface_idx(
        &self,
        phyint: i32,
        addr: Ipv4Addr,
    ) -> Option<(crate::collections::AreaIndex, crate::collections::InterfaceIndex)>
    {
        for area_idx in self.arenas.areas.indexes() {
            let area = &self.arenas.areas[area_idx];
            if let Some((iface_idx, _)) =
                area.interfaces
                    .get_by_addr(&self.arenas.interfaces, phyint, addr)
            {
                return Some((area_idx, iface_idx));
            }
        }
        None
    }

    fn find_iface_mut(
        &mut self,
        phyint: i32,
        addr: Ipv4Addr,
    ) -> Option<(crate::collections::InterfaceIndex, &mut Interface)> {
        let (_, iface_idx) = self.find_iface_idx(phyint, addr)?;
        Some((iface_idx, &mut self.arenas.interfaces[iface_idx]))
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut InstanceArenas)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                config: &self.config,
                state,
                tx: &self.tx,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }

    // Drains the internal event queue, processing events in arrival
    // order. Timer firings occur between I/O processings, never
    // concurrently.
    pub(crate) fn run(&mut self) {
        loop {
            let msg = self.tx.events.borrow_mut().pop_front();
            let Some(msg) = msg else {
                break;
            };
            if let Some((mut instance, arenas)) = self.as_up()
                && let Err(error) = crate::events::process_protocol_msg(
                    &mut instance,
                    arenas,
                    msg,
                )
            {
                error.log();
            }
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        Debug::InstanceDelete.log();
    }
}

// ===== impl InstanceTx =====

impl InstanceTx {
    pub(crate) fn push(&self, msg: ProtocolMsg) {
        self.events.borrow_mut().push_back(msg);
    }

    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        self.push(ProtocolMsg::IsmEvent {
            area_id,
            iface_id,
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        self.push(ProtocolMsg::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        self.push(ProtocolMsg::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        self.push(ProtocolMsg::LsaOrigEvent { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        self.push(ProtocolMsg::LsaOrigCheck {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        self.push(ProtocolMsg::LsaFlush {
            lsdb_id,
            lse_id,
            reason,
        });
    }
}
