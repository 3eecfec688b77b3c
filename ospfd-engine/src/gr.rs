//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Hitless (graceful) restart, RFC 3623.
//!
//! Both roles are implemented: the restarting router originates grace-LSAs
//! and freezes SPF so the pre-restart forwarding state survives, while a
//! helper keeps a restarting neighbor listed as fully adjacent for the
//! duration of its grace period.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::area::Area;
use crate::collections::LsdbIndex;
use crate::debug::{Debug, GrRejectReason, LsaFlushReason};
use crate::instance::{InstanceArenas, InstanceUpView, ProtocolMsg, TimeoutTask};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{self, LsaEntryFlags, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborGrHelper, nsm};
use crate::packet::lsa::{LsaBody, LsaType, LsaTypeCode};
use crate::packet::lsa_opaque::{
    GrIfAddrTlv, GrReason, GrReasonTlv, GracePeriodTlv, LsaGrace, LsaOpaque,
    LsaOpaqueType, OpaqueLsaId,
};
use crate::sys::Md5Seq;

// Restarting-side state.
#[derive(Debug)]
pub struct GrRestart {
    pub grace_period: u16,
    pub exit_timer: TimeoutTask,
}

// OSPF Graceful Restart exit reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrExitReason {
    Completed,
    TimedOut,
    TopologyChanged,
}

// ===== impl GrExitReason =====

impl std::fmt::Display for GrExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrExitReason::Completed => {
                write!(f, "completed")
            }
            GrExitReason::TimedOut => {
                write!(f, "timed out")
            }
            GrExitReason::TopologyChanged => {
                write!(f, "topology changed")
            }
        }
    }
}

// ===== helper side =====

pub(crate) fn helper_process_grace_lsa(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    lsa_age: u16,
    is_maxage: bool,
    grace_period: u32,
    reason: GrReason,
    instance: &mut InstanceUpView<'_>,
) {
    if is_maxage {
        // Exit from the helper mode.
        if nbr.gr.is_some() {
            helper_exit(nbr, iface, area, GrExitReason::Completed, instance);
        }
        return;
    }

    // Calculate the remaining grace period.
    let remn_grace_period = grace_period.saturating_sub(lsa_age as u32);

    // If we're already helping this neighbor, just restart the grace
    // period timeout.
    if let Some(gr) = &mut nbr.gr {
        gr.grace_period
            .reset(Some(Duration::from_secs(remn_grace_period.into())));
        return;
    }

    // Check if the neighbor is fully adjacent.
    if nbr.state != nsm::State::Full {
        let reason = GrRejectReason::NeighborNotFull;
        Debug::GrHelperReject(nbr.router_id, reason).log();
        return;
    }

    // Check for topology changes in the LSDB since the neighbor restarted.
    if nbr
        .lists
        .ls_rxmt
        .values()
        .any(|lsa| lsa.hdr.lsa_type.is_gr_topology_info())
    {
        let reason = GrRejectReason::TopologyChange;
        Debug::GrHelperReject(nbr.router_id, reason).log();
        return;
    }

    // Check if the grace period has already expired.
    if lsa_age as u32 >= grace_period {
        let reason = GrRejectReason::GracePeriodExpired;
        Debug::GrHelperReject(nbr.router_id, reason).log();
        return;
    }

    // All checks have passed. Enter helper mode.
    helper_enter(nbr, iface, area, remn_grace_period, reason, instance);
}

// A topology change outside of the (helper, restarter) pair forces the
// helper relationship to end.
pub(crate) fn helper_process_topology_change(
    lsa_type: Option<LsaType>,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];
            for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>()
            {
                let nbr = &mut arenas.neighbors[nbr_idx];
                if nbr.gr.is_none() {
                    continue;
                }

                // Check if the LSA would have been flooded to the
                // neighbor.
                if let Some(lsa_type) = lsa_type
                    && !lsdb::lsa_type_is_valid(Some(area), None, lsa_type)
                {
                    continue;
                }

                helper_exit(
                    nbr,
                    iface,
                    area,
                    GrExitReason::TopologyChanged,
                    instance,
                );
            }
        }
    }
}

pub(crate) fn helper_exit(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    reason: GrExitReason,
    instance: &mut InstanceUpView<'_>,
) {
    Debug::GrHelperExit(nbr.router_id, reason).log();

    // Stop the grace period timeout.
    nbr.gr = None;

    // Recalculate the Designated Router for the segment.
    if iface.is_broadcast_or_nbma() {
        instance
            .tx
            .ism_event(area.id, iface.id, ism::Event::NbrChange);
    }

    // Reoriginate the Router-LSA and, if needed, the Network-LSA for the
    // segment's OSPF area.
    instance.tx.lsa_orig_event(LsaOriginateEvent::GrHelperExit {
        area_id: area.id,
        iface_id: iface.id,
    });

    // Decrement the count of neighbors performing a graceful restart.
    instance.state.gr_helper_count =
        instance.state.gr_helper_count.saturating_sub(1);
}

fn helper_enter(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    grace_period: u32,
    restart_reason: GrReason,
    instance: &mut InstanceUpView<'_>,
) {
    Debug::GrHelperEnter(nbr.router_id, restart_reason, grace_period).log();

    // Start the grace period timeout.
    let grace_period_task = instance.tx.timers.timeout(
        Duration::from_secs(grace_period.into()),
        ProtocolMsg::GracePeriod {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: nbr.id,
        },
    );

    // Store information that this neighbor is undergoing a graceful
    // restart.
    nbr.gr = Some(NeighborGrHelper {
        restart_reason,
        grace_period: grace_period_task,
    });

    // Increment the count of neighbors performing a graceful restart.
    instance.state.gr_helper_count += 1;
}

// ===== restarting side =====

// Prepares a hitless restart: originates one grace-LSA per operational
// interface, persists the restart parameter block, and signals the
// platform that preparation is complete.
pub(crate) fn restart_prepare(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    grace_period: u16,
) {
    Debug::GrRestartEnter(grace_period).log();

    // Originate grace-LSAs.
    let lsa_id: Ipv4Addr =
        OpaqueLsaId::new(LsaOpaqueType::Grace as u8, 0).into();
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        let options = area.options(instance.config);
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];
            if iface.is_down() || iface.is_passive() {
                continue;
            }

            let grace = LsaGrace {
                grace_period: Some(GracePeriodTlv::new(grace_period as u32)),
                gr_reason: Some(GrReasonTlv::new(
                    GrReason::SoftwareRestart as u8,
                )),
                addr: Some(GrIfAddrTlv::new(iface.addr)),
            };
            let lsa_body = LsaBody::OpaqueLink(LsaOpaque::Grace(grace));
            let lsdb_idx = LsdbIndex::Link(area_idx, iface_idx);
            lsdb::originate_check(
                instance, arenas, lsdb_idx, options, lsa_id, lsa_body,
            );
        }
    }

    // Flush pending LS Updates so the grace-LSAs actually hit the wire
    // before the process goes away.
    crate::events::flush_pending_lsupd(instance, arenas);

    // Persist the restart parameters.
    let md5_seqs: Vec<Md5Seq> = arenas
        .areas
        .iter()
        .flat_map(|area| area.interfaces.iter(&arenas.interfaces))
        .map(|iface| Md5Seq {
            phyint: iface.phyint,
            if_addr: iface.addr,
            seqno: iface.state.crypt_seqno,
        })
        .collect();
    instance.tx.sys.store_hitless_parms(grace_period, &md5_seqs);

    // During a hitless-restart preparation sequence, halt signals
    // "prepared successfully" and the embedding process restarts the
    // engine.
    instance.tx.sys.halt(0, "hitless restart prepared");
}

// Enters the restarting role on a freshly bootstrapped engine: SPF and
// route installation stay frozen until the grace period ends or all
// pre-restart adjacencies are re-established.
pub(crate) fn restart_enter(
    instance: &mut InstanceUpView<'_>,
    grace_period: u16,
) {
    Debug::GrRestartEnter(grace_period).log();

    let exit_timer = instance.tx.timers.timeout(
        Duration::from_secs(grace_period as u64),
        ProtocolMsg::GrExitCheck { timed_out: true },
    );
    instance.state.gr_restart = Some(GrRestart {
        grace_period,
        exit_timer,
    });
}

// Checks whether the graceful restart can complete: every neighbor must
// have re-reached Full state.
pub(crate) fn restart_check_done(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    timed_out: bool,
) {
    if instance.state.gr_restart.is_none() {
        return;
    }

    if timed_out {
        restart_exit(instance, arenas, GrExitReason::TimedOut);
        return;
    }

    let all_full = arenas
        .areas
        .iter()
        .flat_map(|area| area.interfaces.iter(&arenas.interfaces))
        .filter(|iface| !iface.is_down() && !iface.is_passive())
        .flat_map(|iface| iface.state.neighbors.iter(&arenas.neighbors))
        .all(|nbr| nbr.state == nsm::State::Full);
    let any_nbr = arenas
        .areas
        .iter()
        .flat_map(|area| area.interfaces.iter(&arenas.interfaces))
        .any(|iface| iface.state.neighbors.count() > 0);

    if all_full && any_nbr {
        restart_exit(instance, arenas, GrExitReason::Completed);
    }
}

// Leaves the restarting role: flush the grace-LSAs, reoriginate the
// router's own LSAs and resume SPF and route installation.
fn restart_exit(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    reason: GrExitReason,
) {
    Debug::GrRestartExit(reason).log();
    instance.state.gr_restart = None;

    // Flush self-originated grace-LSAs.
    let mut idxs = vec![];
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            idxs.extend(
                iface
                    .state
                    .lsdb
                    .iter_by_type_advrtr(
                        &arenas.lsa_entries,
                        LsaTypeCode::OpaqueLink.into(),
                        instance.state.router_id,
                    )
                    .filter(|(_, lse)| {
                        lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                    })
                    .map(|(lse_idx, _)| {
                        (LsdbIndex::Link(area_idx, iface_idx), lse_idx)
                    }),
            );
        }
    }
    for (lsdb_idx, lse_idx) in idxs {
        lsdb::flush(
            instance,
            arenas,
            lsdb_idx,
            lse_idx,
            LsaFlushReason::PrematureAging,
        );
    }

    // Reoriginate the router's own LSAs and recompute routes.
    for area in arenas.areas.iter() {
        lsdb::lsa_orig_router(area, instance, arenas);
        lsdb::lsa_orig_group_membership(area, instance, arenas);
    }
    lsdb::lsa_orig_external(instance, arenas);
    crate::spf::schedule(instance, crate::spf::SpfTrigger::GrExit);
}

// Restores the interface MD5 sequence numbers persisted before the
// restart.
pub(crate) fn restore_md5_seqnos(
    arenas: &mut InstanceArenas,
    md5_seqs: &[Md5Seq],
) {
    for seq in md5_seqs {
        for (_, iface) in arenas.interfaces.iter_mut() {
            if iface.phyint == seq.phyint && iface.addr == seq.if_addr {
                iface.state.crypt_seqno = seq.seqno;
            }
        }
    }
}

// Grace-LSAs received on a virtual link are not meaningful; the helper
// side only runs on real interfaces.
pub(crate) fn helper_applicable(iface: &Interface) -> bool {
    iface.config.if_type != InterfaceType::VirtualLink
}
