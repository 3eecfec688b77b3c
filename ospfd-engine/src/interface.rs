//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use ism::{Event, State};

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, Lsdb, Neighbors};
use crate::config::McFwdMode;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, InterfaceCfgError};
use crate::instance::{InstanceUpView, IntervalTask, ProtocolMsg, TimeoutTask};
use crate::lsdb::LsaOriginateEvent;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::auth::{AuthEncodeCtx, AuthMethod};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, Options, Packet};

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub phyint: i32,
    pub addr: Ipv4Addr,
    pub cfg_gen: u32,
    pub config: InterfaceCfg,
    pub system: InterfaceSys,
    pub state: InterfaceState,
    // Virtual link endpoint data, when this is a virtual link.
    pub vlink: Option<Vlink>,
}

#[derive(Debug)]
pub struct InterfaceCfg {
    pub if_type: InterfaceType,
    pub mask: Ipv4Addr,
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
    pub auth: Option<AuthMethod>,
    // Statically configured neighbors (NBMA and point-to-multipoint).
    pub static_nbrs: BTreeMap<Ipv4Addr, StaticNbr>,
}

#[derive(Debug, Default)]
pub struct InterfaceSys {
    pub operational: bool,
}

#[derive(Debug, Default)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // The network DR/BDR, identified by interface address.
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // LSDB of link-scope LSAs.
    pub lsdb: Lsdb,
    pub network_lsa_self: Option<LsaKey>,
    // Cryptographic authentication sequence number.
    pub crypt_seqno: u32,
    // Locally joined multicast groups (MOSPF).
    pub group_membership: BTreeSet<Ipv4Addr>,
    // Statistics.
    pub event_count: u32,
    // Timers.
    pub tasks: InterfaceTasks,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    pub hello_interval: Option<IntervalTask>,
    pub nbma_poll_interval: HashMap<Ipv4Addr, IntervalTask>,
    pub wait_timer: Option<TimeoutTask>,
    pub ls_update_timer: Option<TimeoutTask>,
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceType {
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    VirtualLink,
    Loopback,
}

#[derive(Clone, Copy, Debug)]
pub struct StaticNbr {
    pub dr_eligible: bool,
    pub cfg_gen: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Vlink {
    pub transit_area: Ipv4Addr,
    pub endpoint_id: Ipv4Addr,
    // Addresses resolved through the transit area's routing table.
    pub src_addr: Option<Ipv4Addr>,
    pub dst_addr: Option<Ipv4Addr>,
}

#[derive(Clone, Copy, Debug)]
struct DrCandidate {
    router_id: Ipv4Addr,
    net_id: Ipv4Addr,
    dr: Option<Ipv4Addr>,
    bdr: Option<Ipv4Addr>,
    priority: u8,
}

// Interface state machine.
pub mod ism {
    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(
        id: InterfaceId,
        phyint: i32,
        addr: Ipv4Addr,
    ) -> Interface {
        Debug::InterfaceCreate(phyint, addr).log();

        Interface {
            id,
            phyint,
            addr,
            cfg_gen: 0,
            config: InterfaceCfg {
                if_type: InterfaceType::Broadcast,
                mask: Ipv4Addr::BROADCAST,
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
                auth: None,
                static_nbrs: Default::default(),
            },
            system: Default::default(),
            state: Default::default(),
            vlink: None,
        }
    }

    // Checks if the interface needs to be started or stopped in response to
    // a configuration or physical-layer event.
    pub(crate) fn update(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<crate::lsdb::LsaEntry>,
    ) {
        let event = match self.is_ready() {
            Ok(()) => {
                let ism_state = self.state.ism_state;
                if self.config.if_type == InterfaceType::Loopback {
                    if ism_state == State::Loopback {
                        return;
                    }
                    Event::LoopInd
                } else if ism_state == State::Loopback {
                    Event::UnloopInd
                } else if ism_state == State::Down {
                    Event::InterfaceUp
                } else {
                    return;
                }
            }
            Err(reason) if !self.is_down() => Event::InterfaceDown(reason),
            _ => return,
        };

        self.fsm(area, instance, neighbors, lsa_entries, event);
    }

    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.system.operational {
            return Err(InterfaceInactiveReason::OperationalDown);
        }

        Ok(())
    }

    fn start(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
    ) -> State {
        Debug::InterfaceStart(self.phyint, self.addr).log();

        if !self.is_passive() {
            // Arm per-interface I/O and join AllSPFRouters.
            if self.config.if_type != InterfaceType::VirtualLink {
                instance.tx.sys.phy_open(self.phyint);
                instance.tx.sys.join(
                    crate::network::MulticastAddr::AllSpfRtrs.addr(),
                    self.phyint,
                );
                if self.config.mc_fwd != McFwdMode::Blocked {
                    instance.tx.sys.set_multicast_routing_if(self.phyint, true);
                }
            }

            // Start Hello Tx timer, and send the first Hello right away.
            self.hello_interval_start(area, instance);
            instance.tx.push(ProtocolMsg::HelloInterval {
                area_id: area.id,
                iface_id: self.id,
                addr: None,
            });
        }

        // Get new ISM state.
        let new_ism_state = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => State::PointToPoint,
            InterfaceType::Loopback => State::Loopback,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if self.config.priority == 0 {
                    State::DrOther
                } else {
                    State::Waiting
                }
            }
        };

        if new_ism_state == State::Waiting {
            // Start wait timer.
            let task = instance.tx.timers.timeout(
                Duration::from_secs(self.config.dead_interval as u64),
                ProtocolMsg::IsmEvent {
                    area_id: area.id,
                    iface_id: self.id,
                    event: Event::WaitTimer,
                },
            );
            self.state.tasks.wait_timer = Some(task);

            if self.config.if_type == InterfaceType::NonBroadcast {
                // Examine the configured list of neighbors and generate the
                // Start event for each one eligible to become DR. The
                // neighbor's Router ID is learned from its first Hello.
                let eligible = self
                    .config
                    .static_nbrs
                    .iter()
                    .filter(|(_, snbr)| snbr.dr_eligible)
                    .map(|(addr, _)| *addr)
                    .collect::<Vec<_>>();
                for addr in eligible {
                    let (_, nbr) =
                        self.state.neighbors.insert(neighbors, addr, addr);
                    let nbr_id = nbr.id;
                    instance.tx.nsm_event(
                        area.id,
                        self.id,
                        nbr_id,
                        nsm::Event::Start,
                    );
                }
            }
        }

        new_ism_state
    }

    // Stop interface if it's active.
    fn stop(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<crate::lsdb::LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(self.phyint, self.addr, reason).log();

        // Kill all neighbors.
        let event = match reason {
            InterfaceInactiveReason::OperationalDown => nsm::Event::LinkDown,
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Disarm per-interface I/O.
        if !self.is_passive()
            && self.config.if_type != InterfaceType::VirtualLink
        {
            if self.config.mc_fwd != McFwdMode::Blocked {
                instance.tx.sys.set_multicast_routing_if(self.phyint, false);
            }
            instance.tx.sys.leave(
                crate::network::MulticastAddr::AllSpfRtrs.addr(),
                self.phyint,
            );
            instance.tx.sys.phy_close(self.phyint);
        }

        // Reset interface state.
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        // NOTE: the link-scope LSDB is preserved.
        self.state.tasks = Default::default();
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.config.passive || self.config.if_type == InterfaceType::Loopback
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    // The interface's primary network.
    pub(crate) fn network(&self) -> Option<Ipv4Network> {
        ospfd_utils::ip::network_from_mask(self.addr, self.config.mask)
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<crate::lsdb::LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                // Start interface.
                self.start(area, instance, neighbors)
            }
            (State::Waiting, Event::NbrChange) => {
                // This is an unspecified event but it can happen during
                // normal operation, so ignore it gracefully instead of
                // logging an error.
                return;
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;

                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (_, Event::InterfaceDown(reason)) => {
                // Stop interface.
                self.stop(area, instance, neighbors, lsa_entries, *reason);
                State::Down
            }
            (_, Event::LoopInd) => {
                self.stop(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    InterfaceInactiveReason::LoopedBack,
                );
                State::Loopback
            }
            (State::Loopback, Event::UnloopInd) => {
                // No actions are necessary.
                State::Down
            }
            _ => {
                Error::IsmUnexpectedEvent(self.state.ism_state, event).log();
                return;
            }
        };

        // Check for FSM state change.
        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(area, instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance.tx.lsa_orig_event(LsaOriginateEvent::InterfaceStateChange {
            area_id: area.id,
            iface_id: self.id,
        });
        if self.state.ism_state == State::Dr || new_ism_state == State::Dr {
            instance.tx.lsa_orig_event(LsaOriginateEvent::InterfaceDrChange {
                area_id: area.id,
                iface_id: self.id,
            });
        }

        // Effectively transition to the new FSM state.
        Debug::IsmTransition(&self.state.ism_state, &new_ism_state).log();
        self.state.ism_state = new_ism_state;

        // Join or leave AllDRouters as necessary.
        if self.config.if_type == InterfaceType::Broadcast {
            let all_dr = crate::network::MulticastAddr::AllDrRtrs.addr();
            if self.is_dr_or_backup() {
                instance.tx.sys.join(all_dr, self.phyint);
            } else {
                instance.tx.sys.leave(all_dr, self.phyint);
            }
        }

        self.state.event_count += 1;
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = instance.tx.timers.interval(
            Duration::from_secs(self.config.hello_interval as u64),
            ProtocolMsg::HelloInterval {
                area_id: area.id,
                iface_id: self.id,
                addr: None,
            },
        );
        self.state.tasks.hello_interval = Some(task);
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        addr: Ipv4Addr,
    ) {
        let task = instance.tx.timers.interval(
            Duration::from_secs(self.config.poll_interval as u64),
            ProtocolMsg::HelloInterval {
                area_id: area.id,
                iface_id: self.id,
                addr: Some(addr),
            },
        );
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: Ipv4Addr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    fn dr_election(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        let router_id = instance.state.router_id;
        let net_id = self.addr;

        // Step 1: note the current values for the network's Designated
        // Router and Backup Designated Router.
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        // Step 2: calculate the new Backup Designated Router.
        let calc_bdr = |iface: &Interface| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr != Some(rtr.net_id))
                .filter(|rtr| rtr.bdr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .or_else(|| {
                    iface
                        .dr_eligible_routers(router_id, net_id, neighbors)
                        .filter(|rtr| rtr.dr != Some(rtr.net_id))
                        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                })
                .map(|rtr| rtr.net_id)
        };
        let mut new_bdr = calc_bdr(self);

        // Step 3: calculate the new Designated Router.
        let calc_dr = |iface: &Interface, new_bdr: Option<Ipv4Addr>| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .map(|rtr| rtr.net_id)
                .or(new_bdr)
        };
        let mut new_dr = calc_dr(self, new_bdr);
        self.state.dr = new_dr;
        self.state.bdr = new_bdr;

        // Step 4: check if the router is the new DR/BDR or no longer the
        // DR/BDR, and repeat steps 2 and 3 if so.
        if (new_dr == Some(net_id) || old_dr == Some(net_id))
            && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            new_bdr = calc_bdr(self);
            new_dr = calc_dr(self, new_bdr);
            self.state.dr = new_dr;
            self.state.bdr = new_bdr;
        }

        // Step 5: set the interface state accordingly.
        Debug::IsmDrElection(old_dr, new_dr, old_bdr, new_bdr).log();
        let next_state = if new_dr == Some(net_id) {
            State::Dr
        } else if new_bdr == Some(net_id) {
            State::Backup
        } else {
            State::DrOther
        };

        // Step 6: on an NBMA network where the router itself has just become
        // DR or BDR, start sending Hellos to the DR-ineligible neighbors.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(next_state, State::Dr | State::Backup)
        {
            for nbr_id in self
                .config
                .static_nbrs
                .iter()
                .filter(|(_, snbr)| !snbr.dr_eligible)
                .filter_map(|(addr, _)| {
                    self.state
                        .neighbors
                        .iter(neighbors)
                        .find(|nbr| nbr.src == *addr)
                })
                .map(|nbr| nbr.id)
                .collect::<Vec<_>>()
            {
                instance.tx.nsm_event(
                    area.id,
                    self.id,
                    nbr_id,
                    nsm::Event::Start,
                );
            }
        }

        // Step 7: if the DR or BDR changes, invoke the AdjOK? event on all
        // neighbors whose state is at least 2-Way.
        if new_dr != old_dr || new_bdr != old_bdr {
            for nbr_id in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
                .map(|nbr| nbr.id)
                .collect::<Vec<_>>()
            {
                instance.tx.nsm_event(
                    area.id,
                    self.id,
                    nbr_id,
                    nsm::Event::AdjOk,
                );
            }
        }

        // If the DR changed, reoriginate LSAs that might have been affected.
        if new_dr != old_dr {
            instance.tx.lsa_orig_event(LsaOriginateEvent::InterfaceDrChange {
                area_id: area.id,
                iface_id: self.id,
            });
        }

        next_state
    }

    fn dr_eligible_routers<'a>(
        &'a self,
        router_id: Ipv4Addr,
        net_id: Ipv4Addr,
        neighbors: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = DrCandidate> + 'a {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });

        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.src,
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });

        myself.into_iter().chain(nbrs)
    }

    // Whether an adjacency should be established with the given neighbor.
    pub(crate) fn need_adjacency(&self, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink
            | InterfaceType::Loopback => true,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr.src)
                    || self.state.bdr == Some(nbr.src)
            }
        }
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Start LS Update timeout if necessary.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = instance.tx.timers.timeout(
                Duration::from_millis(100),
                ProtocolMsg::SendLsUpdate {
                    area_id: area.id,
                    iface_id: self.id,
                    nbr_id: None,
                },
            );
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = instance.tx.timers.timeout(
                Duration::from_secs(1),
                ProtocolMsg::DelayedAck {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    // Generates an OSPF Hello packet for this interface.
    pub(crate) fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> Packet {
        let network_mask = match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => {
                Ipv4Addr::UNSPECIFIED
            }
            _ => self.config.mask,
        };

        Packet::Hello(Hello {
            hdr: crate::packet::PacketHdr::new(
                crate::packet::PacketType::Hello,
                instance.state.router_id,
                if self.config.if_type == InterfaceType::VirtualLink {
                    Ipv4Addr::UNSPECIFIED
                } else {
                    area.area_id
                },
            ),
            network_mask,
            hello_interval: self.config.hello_interval,
            options: self.hello_options(area, instance),
            priority: self.config.priority,
            dead_interval: self.config.dead_interval,
            dr: self.state.dr,
            bdr: self.state.bdr,
            neighbors: self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Init)
                .map(|nbr| nbr.router_id)
                .collect(),
        })
    }

    fn hello_options(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> Options {
        let mut options = area.options(instance.config);
        if self.config.demand {
            options.insert(Options::DC);
        }
        options
    }

    // Performs the RFC 2328 Section 10.5 sanity checks on a received Hello.
    pub(crate) fn validate_hello(
        &self,
        hello: &Hello,
    ) -> Result<(), InterfaceCfgError> {
        // The network mask is not checked on point-to-point and virtual
        // links.
        if self.is_broadcast_or_nbma() && hello.network_mask != self.config.mask
        {
            return Err(InterfaceCfgError::HelloMaskMismatch(
                hello.network_mask,
                self.config.mask,
            ));
        }

        if hello.hello_interval != self.config.hello_interval {
            return Err(InterfaceCfgError::HelloIntervalMismatch(
                hello.hello_interval,
                self.config.hello_interval,
            ));
        }

        if hello.dead_interval != self.config.dead_interval {
            return Err(InterfaceCfgError::DeadIntervalMismatch(
                hello.dead_interval,
                self.config.dead_interval,
            ));
        }

        Ok(())
    }

    // Maximum OSPF packet size that can be sent on this interface.
    pub(crate) fn max_packet_size(&self) -> u16 {
        let mut max = self.config.mtu
            - crate::packet::ip::Ipv4Hdr::BASE_LENGTH as u16;
        if matches!(self.config.auth, Some(AuthMethod::Cryptographic(_))) {
            max -= crate::packet::auth::MD5_DIGEST_LENGTH as u16;
        }
        max
    }

    // Builds the authentication context used to sign an outgoing packet.
    pub(crate) fn auth_encode_ctx(&mut self, now_secs: u32) -> Option<AuthEncodeCtx<'_>> {
        match &self.config.auth {
            None => None,
            Some(AuthMethod::Simple(passwd)) => {
                Some(AuthEncodeCtx::Simple(passwd))
            }
            Some(method @ AuthMethod::Cryptographic(_)) => {
                // The sequence number must be non-decreasing across
                // restarts; engine elapsed time provides that, with a
                // per-interface counter breaking ties within one second.
                self.state.crypt_seqno =
                    std::cmp::max(self.state.crypt_seqno + 1, now_secs);
                let key = method.generate_key(now_secs)?;
                Some(AuthEncodeCtx::Cryptographic {
                    key,
                    seqno: self.state.crypt_seqno,
                })
            }
        }
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(self.phyint, self.addr).log();
    }
}
