//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use nsm::{Event, State};
use rand::RngCore;

use crate::area::Area;
use crate::collections::{Arena, NeighborId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceUpView, IntervalTask, ProtocolMsg, TimeoutTask};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::output;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::lsa_opaque::GrReason;
use crate::packet::{DbDesc, DbDescFlags, Options, Packet};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub priority: u8,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<Packet>,
    // Last accepted cryptographic sequence number.
    pub auth_seqno: Option<u32>,

    // Waiting for a Database Exchange slot to free up.
    pub adj_pending: bool,

    pub event_count: u32,

    pub gr: Option<NeighborGrHelper>,
    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

#[derive(Clone, Copy, Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug)]
pub struct NeighborGrHelper {
    pub restart_reason: GrReason,
    pub grace_period: TimeoutTask,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Neighbor state machine.
pub mod nsm {
    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        Neighbor {
            id,
            router_id,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no: rand::rng().next_u32(),
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            auth_seqno: None,
            adj_pending: false,
            event_count: 0,
            gr: None,
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    pub(crate) fn fsm(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let new_state = match (self.state, &event) {
            (State::Down, Event::Start) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Attempt)
            }
            (State::Attempt | State::Down, Event::HelloRcvd) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Init)
            }
            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => {
                self.inactivity_timer_reset(iface, area, instance);
                None
            }
            (State::Init, Event::TwoWayRcvd) | (State::TwoWay, Event::AdjOk) => {
                if !iface.need_adjacency(self) {
                    Some(State::TwoWay)
                } else if !dbx_slot_available(instance) {
                    // Adjacency throttling: remain in 2-Way until a
                    // Database Exchange slot is free.
                    self.adj_pending = true;
                    Some(State::TwoWay)
                } else {
                    self.adj_pending = false;
                    self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                    self.dd_flags.insert(
                        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
                    );
                    output::send_dbdesc(self, iface, area, instance);
                    Some(State::ExStart)
                }
            }
            (State::ExStart, Event::NegotiationDone) => {
                // List the contents of the entire LSDB in the summary list.
                let options = self.options;
                let lsas: Vec<_> = iface
                    .state
                    .lsdb
                    .iter(lsa_entries)
                    .chain(area.state.lsdb.iter(lsa_entries))
                    .chain(instance.state.lsdb.iter(lsa_entries))
                    .map(|(_, lse)| lse)
                    // Filter out LSAs this neighbor cannot accept.
                    .filter(|lse| {
                        crate::lsdb::lsa_type_is_valid(
                            Some(area),
                            options,
                            lse.data.hdr.lsa_type,
                        )
                    })
                    .map(|lse| lse.data.clone())
                    .collect();
                for lsa in lsas {
                    let lsa_key = lsa.hdr.key();
                    if lsa.hdr.is_maxage() {
                        self.lists.ls_rxmt.insert(lsa_key, lsa.clone());
                        self.rxmt_lsupd_start_check(iface, area, instance);
                    } else {
                        self.lists.db_summary.insert(lsa_key, lsa.clone());
                    }
                }

                self.dd_flags.remove(DbDescFlags::I);
                Some(State::Exchange)
            }
            (State::Exchange, Event::ExchangeDone) => {
                if self.lists.ls_request_pending.is_empty()
                    && self.lists.ls_request.is_empty()
                {
                    Some(State::Full)
                } else {
                    // Wait for outstanding LS Requests to be responded.
                    Some(State::Loading)
                }
            }
            (State::Loading, Event::LoadingDone) => Some(State::Full),
            (
                State::ExStart | State::Exchange | State::Loading | State::Full,
                Event::AdjOk,
            ) => {
                if iface.need_adjacency(self) {
                    None
                } else {
                    self.reset_adjacency();
                    Some(State::TwoWay)
                }
            }
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => {
                self.reset_adjacency();
                self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                self.dd_flags
                    .insert(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS);
                output::send_dbdesc(self, iface, area, instance);
                Some(State::ExStart)
            }
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                self.reset_adjacency();
                self.tasks.inactivity_timer = None;

                // When acting as a graceful restart helper for the
                // neighbor, keep its state once the Inactivity Timer event
                // is triggered. If the neighbor fails to restart before the
                // grace period expires, it will be removed.
                if event == Event::InactivityTimer && self.gr.is_some() {
                    None
                } else {
                    Some(State::Down)
                }
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => {
                self.reset_adjacency();

                if self.gr.is_some() {
                    None
                } else {
                    Some(State::Init)
                }
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::TwoWayRcvd,
            ) => None,
            (State::Init, Event::OneWayRcvd) => None,
            _ => {
                Error::NsmUnexpectedEvent(self.router_id, self.state, event)
                    .log();
                return;
            }
        };

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state
        {
            self.fsm_state_change(iface, area, instance, event, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        event: Event,
        new_state: State,
    ) {
        // Check for bidirectional communication change.
        if new_state >= State::TwoWay && self.state < State::TwoWay
            || new_state < State::TwoWay && self.state >= State::TwoWay
        {
            // Trigger the NeighborChange event on broadcast/NBMA networks.
            if iface.is_broadcast_or_nbma() {
                instance.tx.ism_event(
                    area.id,
                    iface.id,
                    ism::Event::NbrChange,
                );
            }
        }

        // Check if the neighbor changed to/from the FULL state.
        if (new_state == State::Full || self.state == State::Full)
            && self.gr.is_none()
        {
            // (Re)originate LSAs that might have been affected.
            instance.tx.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // Maintain the count of neighbors undergoing Database Exchange,
        // used by the adjacency throttling logic.
        let dbx = |state: State| {
            matches!(state, State::ExStart | State::Exchange | State::Loading)
        };
        if dbx(new_state) && !dbx(self.state) {
            instance.state.dbx_nbr_count += 1;
        } else if !dbx(new_state) && dbx(self.state) {
            instance.state.dbx_nbr_count =
                instance.state.dbx_nbr_count.saturating_sub(1);
            instance.tx.push(ProtocolMsg::AdjacencyCheck);
        }

        // On NBMA networks, a dead neighbor may still need Hellos at the
        // reduced PollInterval rate.
        if iface.config.if_type == InterfaceType::NonBroadcast {
            if new_state == State::Down && event == Event::InactivityTimer {
                if iface.config.static_nbrs.contains_key(&self.src) {
                    iface.nbma_poll_interval_start(area, instance, self.src);
                }
            } else if self.state == State::Down {
                iface.nbma_poll_interval_stop(self.src);
            }
        }

        // Effectively transition to the new FSM state.
        Debug::NsmTransition(self.router_id, &self.state, &new_state).log();
        self.state = new_state;

        // Update statistics.
        self.event_count += 1;
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        // Check if all pending LSA requests were received.
        if self.lists.ls_request_pending.is_empty() {
            // Stop the LS Request rxmt task.
            self.rxmt_lsreq_stop();

            // Check if there are new LSAs to request.
            if !self.lists.ls_request.is_empty() {
                output::send_lsreq(self, iface, area, instance);
            } else if self.state == State::Loading {
                // Database loading has completed.
                instance.tx.nsm_event(
                    area.id,
                    iface.id,
                    self.id,
                    Event::LoadingDone,
                );
            }
        }
    }

    fn reset_adjacency(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.adj_pending = false;
        self.lists = Default::default();
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &DbDesc) -> bool {
        if let Some(last_rcvd_dbdesc) = &self.last_rcvd_dbdesc
            && last_rcvd_dbdesc.options == dbdesc.options
            && last_rcvd_dbdesc.dd_flags == dbdesc.dd_flags
            && last_rcvd_dbdesc.dd_seq_no == dbdesc.dd_seq_no
        {
            return true;
        }

        false
    }

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = instance.tx.timers.timeout(
            Duration::from_secs(iface.config.dead_interval as u64),
            ProtocolMsg::NsmEvent {
                area_id: area.id,
                iface_id: iface.id,
                nbr_id: self.id,
                event: Event::InactivityTimer,
            },
        );
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if let Some(inactivity_timer) = self.tasks.inactivity_timer.as_mut() {
            inactivity_timer.reset(None);
        } else {
            self.inactivity_timer_start(iface, area, instance);
        }
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = instance.tx.timers.interval(
            Duration::from_secs(iface.config.rxmt_interval as u64),
            ProtocolMsg::RxmtInterval {
                area_id: area.id,
                iface_id: iface.id,
                nbr_id: self.id,
                packet_type: RxmtPacketType::DbDesc,
            },
        );
        self.tasks.rxmt_dbdesc = Some(task);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = instance.tx.timers.interval(
            Duration::from_secs(iface.config.rxmt_interval as u64),
            ProtocolMsg::RxmtInterval {
                area_id: area.id,
                iface_id: iface.id,
                nbr_id: self.id,
                packet_type: RxmtPacketType::LsRequest,
            },
        );
        self.tasks.rxmt_lsreq = Some(task);
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
    ) {
        if !self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_none() {
            let task = instance.tx.timers.interval(
                Duration::from_secs(iface.config.rxmt_interval as u64),
                ProtocolMsg::RxmtInterval {
                    area_id: area.id,
                    iface_id: iface.id,
                    nbr_id: self.id,
                    packet_type: RxmtPacketType::LsUpdate,
                },
            );
            self.tasks.rxmt_lsupd = Some(task);
        }
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        if self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some() {
            self.tasks.rxmt_lsupd = None;
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}

// ===== global functions =====

// Returns whether a new neighbor may start Database Exchange, honoring the
// configured cap on simultaneous exchanges.
pub(crate) fn dbx_slot_available(instance: &InstanceUpView<'_>) -> bool {
    let max = instance.config.max_dbx_nbrs;
    max == 0 || instance.state.dbx_nbr_count < max as usize
}
