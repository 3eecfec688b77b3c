//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{debug, debug_span};

use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::Packet;
use crate::packet::lsa::LsaHdr;
use crate::packet::lsa_opaque::GrReason;
use crate::spf;

// OSPF debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceCreate,
    InstanceDelete,
    InstanceStart,
    InstanceStop(InstanceInactiveReason),
    InterfaceCreate(i32, Ipv4Addr),
    InterfaceDelete(i32, Ipv4Addr),
    InterfaceStart(i32, Ipv4Addr),
    InterfaceStop(i32, Ipv4Addr, InterfaceInactiveReason),
    IsmEvent(&'a ism::State, &'a ism::Event),
    IsmTransition(&'a ism::State, &'a ism::State),
    IsmDrElection(
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
        Option<Ipv4Addr>,
    ),
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    PacketRx(i32, &'a Ipv4Addr, &'a Ipv4Addr, &'a Packet),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    PacketTx(i32, &'a Packet),
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaOriginateMinInterval(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    LsaRefresh(&'a LsaHdr),
    LsaDiscard(Ipv4Addr, &'a LsaHdr),
    LsaMinArrivalDiscard(Ipv4Addr, &'a LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a LsaHdr),
    QuestionableAck(Ipv4Addr, &'a LsaHdr),
    SpfScheduled(spf::SpfTrigger),
    SpfRun(u32),
    GrHelperEnter(Ipv4Addr, GrReason, u32),
    GrHelperExit(Ipv4Addr, crate::gr::GrExitReason),
    GrHelperReject(Ipv4Addr, GrRejectReason),
    GrRestartEnter(u16),
    GrRestartExit(crate::gr::GrExitReason),
    OverflowEnter,
    OverflowExit,
    McCacheBuild(Ipv4Addr, Ipv4Addr),
    McCacheInvalidate,
}

// Reason why an OSPF instance is inactive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstanceInactiveReason {
    AdminDown,
    MissingRouterId,
    Resetting,
    Shutdown,
}

// Reason why OSPF is inactive on an interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceInactiveReason {
    InstanceDown,
    AdminDown,
    OperationalDown,
    Deconfigured,
    Resetting,
    LoopedBack,
}

// Reason why a SeqNumberMismatch event was generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    InvalidLsaType,
    UnexpectedDbDesc,
}

// Reason why an LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
}

// Reason why a helper-mode request was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrRejectReason {
    NeighborNotFull,
    TopologyChange,
    GracePeriodExpired,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Logs the message using the `tracing` facilities.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate
            | Debug::InstanceDelete
            | Debug::InstanceStart => {
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                debug!(%reason, "{}", self);
            }
            Debug::InterfaceCreate(phyint, addr)
            | Debug::InterfaceDelete(phyint, addr)
            | Debug::InterfaceStart(phyint, addr) => {
                debug!(%phyint, %addr, "{}", self);
            }
            Debug::InterfaceStop(phyint, addr, reason) => {
                debug!(%phyint, %addr, %reason, "{}", self);
            }
            Debug::IsmEvent(state, event) => {
                debug_span!("fsm").in_scope(|| {
                    debug!(?state, ?event, "{}", self);
                });
            }
            Debug::IsmTransition(old_state, new_state) => {
                debug_span!("fsm").in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self);
                });
            }
            Debug::IsmDrElection(old_dr, new_dr, old_bdr, new_bdr) => {
                debug!(?old_dr, ?new_dr, ?old_bdr, ?new_bdr, "{}", self);
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::NsmEvent(router_id, state, event) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    });
                });
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    });
                });
            }
            Debug::PacketRx(phyint, src, dst, packet) => {
                debug_span!("input").in_scope(|| {
                    debug!(%phyint, %src, %dst, ?packet, "{}", self);
                });
            }
            Debug::PacketRxIgnore(router_id, state) => {
                debug!(%router_id, ?state, "{}", self);
            }
            Debug::PacketTx(phyint, packet) => {
                debug_span!("output").in_scope(|| {
                    debug!(%phyint, ?packet, "{}", self);
                });
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr) => {
                debug!(?lsa_hdr, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(?lsa_hdr, ?reason, "{}", self);
            }
            Debug::LsaDiscard(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr)
            | Debug::QuestionableAck(router_id, lsa_hdr) => {
                debug!(%router_id, ?lsa_hdr, "{}", self);
            }
            Debug::SpfScheduled(trigger) => {
                debug!(?trigger, "{}", self);
            }
            Debug::SpfRun(run_count) => {
                debug!(%run_count, "{}", self);
            }
            Debug::GrHelperEnter(router_id, reason, grace_period) => {
                debug!(%router_id, %reason, %grace_period, "{}", self);
            }
            Debug::GrHelperExit(router_id, reason) => {
                debug!(%router_id, %reason, "{}", self);
            }
            Debug::GrHelperReject(router_id, reason) => {
                debug!(%router_id, ?reason, "{}", self);
            }
            Debug::GrRestartEnter(grace_period) => {
                debug!(%grace_period, "{}", self);
            }
            Debug::GrRestartExit(reason) => {
                debug!(%reason, "{}", self);
            }
            Debug::OverflowEnter | Debug::OverflowExit => {
                debug!("{}", self);
            }
            Debug::McCacheBuild(src, group) => {
                debug!(%src, %group, "{}", self);
            }
            Debug::McCacheInvalidate => {
                debug!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => write!(f, "instance created"),
            Debug::InstanceDelete => write!(f, "instance deleted"),
            Debug::InstanceStart => write!(f, "starting instance"),
            Debug::InstanceStop(..) => write!(f, "stopping instance"),
            Debug::InterfaceCreate(..) => write!(f, "interface created"),
            Debug::InterfaceDelete(..) => write!(f, "interface deleted"),
            Debug::InterfaceStart(..) => write!(f, "starting interface"),
            Debug::InterfaceStop(..) => write!(f, "stopping interface"),
            Debug::IsmEvent(..) => write!(f, "event"),
            Debug::IsmTransition(..) => write!(f, "state transition"),
            Debug::IsmDrElection(..) => write!(f, "DR election"),
            Debug::NeighborCreate(..) => write!(f, "neighbor created"),
            Debug::NeighborDelete(..) => write!(f, "neighbor deleted"),
            Debug::NsmEvent(..) => write!(f, "event"),
            Debug::NsmTransition(..) => write!(f, "state transition"),
            Debug::PacketRx(..) | Debug::PacketTx(..) => write!(f, "packet"),
            Debug::PacketRxIgnore(..) => {
                write!(f, "packet ignored due to neighbor state")
            }
            Debug::LsaInstall(..) => write!(f, "installing LSA"),
            Debug::LsaOriginate(..) => write!(f, "originating LSA"),
            Debug::LsaOriginateMinInterval(..) => {
                write!(f, "delaying LSA origination due to MinLSInterval")
            }
            Debug::LsaFlush(..) => write!(f, "flushing LSA"),
            Debug::LsaRefresh(..) => write!(f, "refreshing LSA"),
            Debug::LsaDiscard(..) => write!(f, "discarding LSA"),
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA due to MinLSArrival")
            }
            Debug::LsaSelfOriginated(..) => {
                write!(f, "received self-originated LSA")
            }
            Debug::QuestionableAck(..) => write!(f, "questionable ack"),
            Debug::SpfScheduled(..) => write!(f, "SPF scheduled"),
            Debug::SpfRun(..) => write!(f, "SPF run"),
            Debug::GrHelperEnter(..) => write!(f, "entering helper mode"),
            Debug::GrHelperExit(..) => write!(f, "exiting helper mode"),
            Debug::GrHelperReject(..) => {
                write!(f, "rejecting helper-mode request")
            }
            Debug::GrRestartEnter(..) => {
                write!(f, "starting graceful restart")
            }
            Debug::GrRestartExit(..) => {
                write!(f, "finishing graceful restart")
            }
            Debug::OverflowEnter => write!(f, "entering overflow state"),
            Debug::OverflowExit => write!(f, "exiting overflow state"),
            Debug::McCacheBuild(..) => {
                write!(f, "building multicast cache entry")
            }
            Debug::McCacheInvalidate => {
                write!(f, "invalidating multicast cache")
            }
        }
    }
}

impl std::fmt::Display for InstanceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InstanceInactiveReason::MissingRouterId => {
                write!(f, "missing router-id")
            }
            InstanceInactiveReason::Resetting => write!(f, "resetting"),
            InstanceInactiveReason::Shutdown => write!(f, "shutting down"),
        }
    }
}

impl std::fmt::Display for InterfaceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceInactiveReason::InstanceDown => {
                write!(f, "OSPF instance down")
            }
            InterfaceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InterfaceInactiveReason::OperationalDown => {
                write!(f, "operational status down")
            }
            InterfaceInactiveReason::Deconfigured => write!(f, "deconfigured"),
            InterfaceInactiveReason::Resetting => write!(f, "resetting"),
            InterfaceInactiveReason::LoopedBack => write!(f, "looped back"),
        }
    }
}
