//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use ipnetwork::Ipv4Network;

use crate::area::Area;
use crate::collections::{
    AreaId, Arena, InterfaceId, LsaEntryId, LsaEntryIndex, LsdbId, LsdbIndex,
    lsdb_get, lsdb_index, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::gr;
use crate::instance::{InstanceArenas, InstanceTx, InstanceUpView, TimeoutTask};
use crate::interface::{Interface, InterfaceType, ism};
use crate::neighbor::nsm;
use crate::packet::Options;
use crate::packet::lsa::{
    GmVertexType, GroupMbrEntry, Lsa, LsaAsExternal, LsaAsExternalFlags,
    LsaBody, LsaGroupMembership, LsaKey, LsaNetwork, LsaRouter,
    LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaType, LsaTypeCode,
};
use crate::spf;

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_DO_NOT_AGE: u16 = 0x8000;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;
pub const LSA_MAXAGE_SWEEP_INTERVAL: u64 = 5;
pub const MAX_LINK_METRIC: u16 = 0xffff;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSA data.
    pub data: Arc<Lsa>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub expiry_timer: Option<TimeoutTask>,
    // Refresh timer that triggers every LSRefreshTime seconds.
    pub refresh_timer: Option<TimeoutTask>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Clone, Debug)]
pub enum LsaOriginateEvent {
    AreaStart { area_id: AreaId },
    InterfaceStateChange { area_id: AreaId, iface_id: InterfaceId },
    InterfaceDrChange { area_id: AreaId, iface_id: InterfaceId },
    NeighborToFromFull { area_id: AreaId, iface_id: InterfaceId },
    SelfOriginatedLsaRcvd { lsdb_id: LsdbId, lse_id: LsaEntryId },
    ExternalRoutesChange,
    GroupMembershipChange { area_id: AreaId },
    GrHelperExit { area_id: AreaId, iface_id: InterfaceId },
}

#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(
        lsdb_id: LsdbId,
        id: LsaEntryId,
        data: Arc<Lsa>,
        tx: &InstanceTx,
    ) -> LsaEntry {
        // DoNotAge LSAs are not aged out.
        let expiry_timer = (!data.hdr.is_maxage() && !data.hdr.is_dna())
            .then(|| {
                let remaining = LSA_MAX_AGE.saturating_sub(data.hdr.age());
                tx.timers.timeout(
                    Duration::from_secs(remaining as u64),
                    crate::instance::ProtocolMsg::LsaExpiry { lsdb_id, lse_id: id },
                )
            });

        LsaEntry {
            id,
            data,
            expiry_timer,
            refresh_timer: None,
            flags: Default::default(),
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub(crate) fn lsa_compare(
    a: &crate::packet::lsa::LsaHdr,
    b: &crate::packet::lsa::LsaHdr,
) -> Ordering {
    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age().abs_diff(b.age()) > LSA_MAX_AGE_DIFF {
        return b.age().cmp(&a.age());
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of
// RFC 2328, determining whether their contents are identical.
fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = crate::packet::lsa::LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry, now: Duration) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(base_time) => {
            now.saturating_sub(base_time).as_secs() < LSA_MIN_ARRIVAL
        }
        None => false,
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds
// ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry, now: Duration) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(base_time) => {
            now.saturating_sub(base_time).as_secs() < LSA_MIN_INTERVAL
        }
        None => false,
    }
}

// Checks whether the provided area and/or neighbor can accept the given
// LSA type.
pub(crate) fn lsa_type_is_valid(
    area: Option<&Area>,
    nbr_options: Option<Options>,
    lsa_type: LsaType,
) -> bool {
    // Reject LSAs of unknown type.
    if lsa_type.type_code().is_none() {
        return false;
    }

    if let Some(nbr_options) = nbr_options {
        // Opaque LSAs are only flooded to opaque-capable neighbors.
        if lsa_type.is_opaque() && !nbr_options.contains(Options::O) {
            return false;
        }
        // Group-membership-LSAs are only flooded to multicast-capable
        // neighbors.
        if lsa_type.type_code() == Some(LsaTypeCode::GroupMembership)
            && !nbr_options.contains(Options::MC)
        {
            return false;
        }
    }

    // Reject AS-scope LSAs and type-4 summaries on stub areas.
    if let Some(area) = area
        && area.config.stub
        && matches!(
            lsa_type.type_code(),
            Some(
                LsaTypeCode::SummaryRouter
                    | LsaTypeCode::AsExternal
                    | LsaTypeCode::OpaqueAs
            )
        )
    {
        return false;
    }

    true
}

// Checks whether the LSA is self-originated.
pub(crate) fn lsa_is_self_originated(
    lsa: &Lsa,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
) -> bool {
    // 1) The LSA's Advertising Router is equal to the router's own Router
    // ID.
    if lsa.hdr.adv_rtr == router_id {
        return true;
    }

    // 2) The LSA is a network-LSA and its Link State ID is equal to one of
    // the router's own IP interface addresses.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && interfaces
            .iter()
            .any(|(_, iface)| lsa.hdr.lsa_id == iface.addr)
    {
        return true;
    }

    false
}

// Installs the provided LSA to the specified LSDB.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    // Lookup LSDB.
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // Remove old instance of the LSA.
    let old_lsa = match lsdb.get(&arenas.lsa_entries, &lsa.hdr.key()) {
        Some((old_lse_idx, old_lse)) => {
            let old_lsa = old_lse.data.clone();
            lsdb.delete(&mut arenas.lsa_entries, old_lse_idx);
            Some(old_lsa)
        }
        None => None,
    };

    // Add LSA entry to LSDB.
    let (lse_idx, lse) =
        lsdb.insert(&mut arenas.lsa_entries, lsdb_id, lsa.clone(), instance.tx);

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(
        &lse.data,
        instance.state.router_id,
        &arenas.interfaces,
    ) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }
    let self_originated = lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED);

    // Keep track of self-originated Network-LSAs in the corresponding
    // interface structures, allowing them to be flushed later even after
    // an address change.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && lsa.hdr.adv_rtr == instance.state.router_id
        && let LsdbIndex::Area(area_idx) = lsdb_idx
    {
        let area = &arenas.areas[area_idx];
        let iface_idx = area
            .interfaces
            .indexes()
            .find(|iface_idx| {
                arenas.interfaces[*iface_idx].addr == lsa.hdr.lsa_id
            });
        if let Some(iface_idx) = iface_idx {
            let iface = &mut arenas.interfaces[iface_idx];
            if lsa.hdr.is_maxage() {
                iface.state.network_lsa_self = None;
            } else {
                iface.state.network_lsa_self = Some(lsa.hdr.key());
            }
        }
    }

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance,
    // if present. If there is no difference, there is no need to
    // recalculate the routing table".
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa
        && lsa_same_contents(old_lsa, &lsa)
    {
        content_change = false;
    }
    let lsa_type = lsa.hdr.lsa_type;
    let self_orig_summary = self_originated
        && matches!(
            lsa_type.type_code(),
            Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter)
        );
    let route_recalc =
        content_change && !lsa.body.is_unknown() && !self_orig_summary;

    // Push asynchronous opaque-LSA notifications to the registered
    // monitor client.
    if lsa.hdr.lsa_type.is_opaque() && instance.state.opaque_client.is_some()
    {
        let area_id = match lsdb_idx {
            LsdbIndex::Link(area_idx, _) | LsdbIndex::Area(area_idx) => {
                arenas.areas[area_idx].area_id
            }
            LsdbIndex::As => Ipv4Addr::UNSPECIFIED,
        };
        instance
            .state
            .opaque_notifications
            .push_back((area_id, lsa.raw.clone()));
    }

    // A network topology change forces the termination of helper mode.
    if content_change
        && lsa.hdr.lsa_type.is_gr_topology_info()
        && instance.state.gr_helper_count > 0
    {
        gr::helper_process_topology_change(
            Some(lsa.hdr.lsa_type),
            instance,
            arenas,
        );
    }

    // Any LSDB change invalidates the multicast forwarding cache.
    crate::mospf::cache_invalidate(instance);

    // Received AS-external-LSAs count against the overflow ceiling.
    if lsa_type.type_code() == Some(LsaTypeCode::AsExternal)
        && !self_originated
    {
        overflow_check(instance, arenas);
    }

    // Schedule SPF run if necessary.
    if route_recalc {
        spf::schedule(instance, spf::SpfTrigger::LsaChange);
    }

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    mut lsa: Lsa,
) {
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. As soon as that flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
        && lsa.hdr.seq_no == LSA_MAX_SEQ_NO + 1
    {
        // Record LSA that will be originated later and then flush the
        // existing instance.
        match lsdb.seqno_wrapping.entry(lsa_key) {
            hash_map::Entry::Occupied(mut o) => {
                *o.get_mut() = lsa;
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(lsa);
            }
        }
        let reason = LsaFlushReason::PrematureAging;
        flush(instance, arenas, lsdb_idx, old_lse_idx, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    lsa.base_time = Some(instance.tx.timers.now());
    let lse_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    let lsa = arenas.lsa_entries[lse_idx].data.clone();
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lsa,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;

    // Schedule LSA refreshing.
    let lse = &mut arenas.lsa_entries[lse_idx];
    let refresh_interval = if instance.config.refresh_rate != 0 {
        instance.config.refresh_rate as u64
    } else {
        LSA_REFRESH_TIME as u64
    };
    let refresh_timer = instance.tx.timers.timeout(
        Duration::from_secs(refresh_interval),
        crate::instance::ProtocolMsg::LsaRefresh {
            lsdb_id,
            lse_id: lse.id,
        },
    );
    lse.refresh_timer = Some(refresh_timer);
}

// Attempts to originate the provided LSA, but only if it passes a few
// checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let now = instance.tx.timers.now();
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);

    // Get next sequence number.
    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no.wrapping_add(1))
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // If an LSA with identical contents already exists in the LSDB,
        // skip originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse, now)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    let ldo = o.get_mut();
                    ldo.data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let timeout = instance.tx.timers.timeout(
                        Duration::from_secs(LSA_MIN_INTERVAL),
                        crate::instance::ProtocolMsg::LsaOrigDelayed {
                            lsdb_id,
                            lsa_key,
                        },
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_idx, lsa);
}

// Flushes LSA from the LSDB.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Disarm timers.
    lse.expiry_timer = None;
    lse.refresh_timer = None;

    // Set the LSA age to MaxAge.
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route calculations.
    let lse_idx = install(instance, arenas, lsdb_idx, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    let lsa = lse.data.clone();
    let _ = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lsa,
        None,
    );

    // Remove pending LSA origination, if any.
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    lsdb.delayed_orig.remove(&lsa.hdr.key());
}

// Flushes all self-originated LSAs from the LSDB.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    // AS-scope LSAs.
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (LsdbIndex::As, lse_idx)),
    );

    // Area- and link-scope LSAs.
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, lse)| {
                    lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .map(|(lse_idx, _)| (LsdbIndex::Area(area_idx), lse_idx)),
        );

        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            idxs.extend(
                iface
                    .state
                    .lsdb
                    .iter(&arenas.lsa_entries)
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
        flush(instance, arenas, lsdb_idx, lse_idx, reason);
    }
}

// Removes old instances of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];

        // Filter by LSA area.
        match lsdb_idx {
            LsdbIndex::Link(lsdb_area_idx, _)
            | LsdbIndex::Area(lsdb_area_idx) => {
                if area_idx != lsdb_area_idx {
                    continue;
                }
            }
            _ => (),
        }

        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];

            // Filter by LSA interface.
            if let LsdbIndex::Link(_, lsdb_iface_idx) = lsdb_idx
                && iface_idx != lsdb_iface_idx
            {
                continue;
            }

            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];

                // Remove LSA from the rxmt list as long as it's an older
                // version.
                if let btree_map::Entry::Occupied(o) =
                    nbr.lists.ls_rxmt.entry(lsa.hdr.key())
                {
                    let old_lsa = o.get();
                    if lsa_compare(&old_lsa.hdr, &lsa.hdr) == Ordering::Less {
                        o.remove();
                        nbr.rxmt_lsupd_stop_check();
                    }
                }
            }
        }
    }
}

// ===== LSA origination event dispatch =====

// Originates or flushes the required LSAs in response to an LSA
// origination event.
pub(crate) fn lsa_orig_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::AreaStart { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
            lsa_orig_group_membership(area, instance, arenas);
        }
        LsaOriginateEvent::InterfaceStateChange { .. } => {
            // (Re)originate Router-LSAs in all areas since the ABR status
            // might have changed.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceDrChange { area_id, iface_id }
        | LsaOriginateEvent::NeighborToFromFull { area_id, iface_id }
        | LsaOriginateEvent::GrHelperExit { area_id, iface_id } => {
            // (Re)originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
        LsaOriginateEvent::ExternalRoutesChange => {
            // The ASBR status (E-bit) advertised in the Router-LSAs may
            // have changed.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }
            lsa_orig_external(instance, arenas);
        }
        LsaOriginateEvent::GroupMembershipChange { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_group_membership(area, instance, arenas);
        }
    }

    Ok(())
}

// (Re)originates this router's Router-LSA into the given area.
pub(crate) fn lsa_orig_router(
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let options = area.options(instance.config);

    // Router-LSA's flags.
    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if !instance.config.ext_routes.is_empty() && !area.config.stub {
        flags.insert(LsaRouterFlags::E);
    }

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
    {
        // Interfaces in Loopback state advertise their address as a stub
        // link.
        if iface.state.ism_state == ism::State::Loopback {
            links.push(LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                iface.addr,
                Ipv4Addr::BROADCAST,
                0,
            ));
            continue;
        }

        let mut add_stub_link = false;
        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                // Add a Type-1 link (p2p) for each fully adjacent neighbor.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        nbr.router_id,
                        iface.addr,
                        iface.config.cost,
                    ));
                }
                add_stub_link = true;
            }
            InterfaceType::VirtualLink => {
                if let Some(vlink) = &iface.vlink
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
                {
                    flags.insert(LsaRouterFlags::V);
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::VirtualLink,
                        vlink.endpoint_id,
                        vlink.src_addr.unwrap_or(iface.addr),
                        iface.config.cost,
                    ));
                }
            }
            InterfaceType::Loopback => {
                links.push(LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    iface.addr,
                    Ipv4Addr::BROADCAST,
                    0,
                ));
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let dr_is_full = iface
                    .state
                    .dr
                    .map(|dr| {
                        // Either we are the DR with at least one full
                        // neighbor, or our adjacency to the DR is full.
                        if dr == iface.addr {
                            iface
                                .state
                                .neighbors
                                .iter(&arenas.neighbors)
                                .any(|nbr| nbr.state == nsm::State::Full)
                        } else {
                            iface
                                .state
                                .neighbors
                                .iter(&arenas.neighbors)
                                .any(|nbr| {
                                    nbr.src == dr
                                        && nbr.state == nsm::State::Full
                                })
                        }
                    })
                    .unwrap_or(false);

                if iface.state.ism_state == ism::State::Waiting || !dr_is_full
                {
                    add_stub_link = true;
                } else {
                    // Add a Type-2 (transit) link.
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::TransitNetwork,
                        iface.state.dr.unwrap(),
                        iface.addr,
                        iface.config.cost,
                    ));
                }
            }
        }

        if add_stub_link
            && let Some(network) = iface.network()
        {
            links.push(LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                network.ip(),
                network.mask(),
                iface.config.cost,
            ));
        }
    }

    // Add configured hosts as stub links.
    for (host, host_cfg) in &area.hosts {
        links.push(LsaRouterLink::new(
            LsaRouterLinkType::StubNetwork,
            host.ip(),
            host.mask(),
            host_cfg.cost,
        ));
    }

    let lsa_body = LsaBody::Router(LsaRouter { flags, links });
    instance.tx.lsa_orig_check(
        lsdb_id,
        options,
        instance.state.router_id,
        lsa_body,
    );
}

// (Re)originates the Network-LSA for a segment this router is DR of.
fn lsa_orig_network(
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let options = area.options(instance.config);

    // The Link State ID for a network-LSA is the IP interface address of
    // the Designated Router.
    let lsa_id = iface.addr;
    let mask = iface.config.mask;

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    let lsa_body = LsaBody::Network(LsaNetwork {
        mask,
        attached_rtrs,
    });
    instance.tx.lsa_orig_check(lsdb_id, options, lsa_id, lsa_body);
}

fn lsa_flush_network(
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    if let Some(lsa_key) = &iface.state.network_lsa_self
        && let Some((_, lse)) = area.state.lsdb.get(&arenas.lsa_entries, lsa_key)
    {
        instance.tx.lsa_flush(
            LsdbId::Area(area.id),
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

// (Re)originates or flushes the group-membership-LSAs for the given area,
// one per multicast group with local members (RFC 1584 section 10).
pub(crate) fn lsa_orig_group_membership(
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    if !instance.config.mospf_enabled {
        return;
    }

    let lsdb_id = LsdbId::Area(area.id);
    let options = area.options(instance.config);
    let router_id = instance.state.router_id;

    // Collect the set of groups with members on this area's interfaces,
    // together with the advertised vertices.
    let mut groups: std::collections::BTreeMap<Ipv4Addr, Vec<GroupMbrEntry>> =
        Default::default();
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        .filter(|iface| !iface.is_down())
    {
        for group in &iface.state.group_membership {
            let entries = groups.entry(*group).or_default();
            // When DR of a transit network with members, advertise the
            // network vertex; otherwise advertise the router vertex.
            let entry = if iface.state.ism_state == ism::State::Dr {
                GroupMbrEntry::new(GmVertexType::TransitNetwork, iface.addr)
            } else {
                GroupMbrEntry::new(GmVertexType::Router, router_id)
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }

    // Originate one LSA per group.
    for (group, entries) in &groups {
        let lsa_body =
            LsaBody::GroupMembership(LsaGroupMembership {
                entries: entries.clone(),
            });
        instance.tx.lsa_orig_check(lsdb_id, options, *group, lsa_body);
    }

    // Flush self-originated group-membership-LSAs for groups with no
    // remaining members.
    for (_, lse) in area.state.lsdb.iter_by_type_advrtr(
        &arenas.lsa_entries,
        LsaTypeCode::GroupMembership.into(),
        router_id,
    ) {
        if !groups.contains_key(&lse.data.hdr.lsa_id) {
            instance.tx.lsa_flush(
                lsdb_id,
                lse.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }
}

// (Re)originates AS-external-LSAs for the configured external routes and
// flushes withdrawn ones. Handles the RFC 1765 overflow state: once the
// configured ceiling of non-default AS-external-LSAs is reached, further
// origination is suspended until `exit_overflow_interval` elapses.
pub(crate) fn lsa_orig_external(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let router_id = instance.state.router_id;
    let options = Options::E;
    let limit = instance.config.ext_lsdb_limit;

    let mut count = non_default_external_count(instance, arenas);
    let ext_routes = instance.config.ext_routes.clone();
    for (prefix, ext) in &ext_routes {
        let default = prefix.ip() == Ipv4Addr::UNSPECIFIED;
        let lsa_key = LsaKey::new(
            LsaTypeCode::AsExternal.into(),
            router_id,
            prefix.ip(),
        );
        let already_advertised = instance
            .state
            .lsdb
            .get(&arenas.lsa_entries, &lsa_key)
            .is_some_and(|(_, lse)| !lse.data.hdr.is_maxage());

        // While in overflow state, origination of new non-default
        // AS-external-LSAs is suspended.
        if !default && !already_advertised {
            if instance.state.overflow {
                continue;
            }
            if limit != 0 && count >= limit as usize {
                enter_overflow(instance);
                continue;
            }
            count += 1;
        }

        let mut flags = LsaAsExternalFlags::empty();
        if ext.type2 {
            flags.insert(LsaAsExternalFlags::E);
        }
        if ext.mc_source {
            flags.insert(LsaAsExternalFlags::MC);
        }
        let lsa_body = LsaBody::AsExternal(LsaAsExternal {
            mask: prefix.mask(),
            flags,
            metric: ext.metric & LSA_INFINITY,
            fwd_addr: ext.gw,
            tag: ext.tag,
        });
        instance.tx.lsa_orig_check(
            LsdbId::As,
            options,
            prefix.ip(),
            lsa_body,
        );
    }

    // Flush AS-external-LSAs whose routes were deconfigured.
    for (_, lse) in instance.state.lsdb.iter_by_type_advrtr(
        &arenas.lsa_entries,
        LsaTypeCode::AsExternal.into(),
        router_id,
    ) {
        let advertised = ext_routes.iter().any(|(prefix, _)| {
            prefix.ip() == lse.data.hdr.lsa_id
                && Some(prefix.mask())
                    == lse.data.body.as_as_external().map(|ext| ext.mask)
        });
        if !advertised {
            instance.tx.lsa_flush(
                LsdbId::As,
                lse.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }
}

// Non-default, non-MaxAge AS-external-LSAs currently in the database.
fn non_default_external_count(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) -> usize {
    instance
        .state
        .lsdb
        .iter_by_type(&arenas.lsa_entries, LsaTypeCode::AsExternal.into())
        .filter(|(_, lse)| lse.data.hdr.lsa_id != Ipv4Addr::UNSPECIFIED)
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        .count()
}

// Enters overflow state and schedules its exit.
pub(crate) fn enter_overflow(instance: &mut InstanceUpView<'_>) {
    if instance.state.overflow {
        return;
    }
    Debug::OverflowEnter.log();
    instance.state.overflow = true;

    let interval = instance.config.exit_overflow_interval;
    if interval != 0 {
        let task = instance.tx.timers.timeout(
            Duration::from_secs(interval as u64),
            crate::instance::ProtocolMsg::ExitOverflow,
        );
        instance.state.overflow_exit_timer = Some(task);
    }
}

// Checks the AS-external ceiling after installing a received
// AS-external-LSA.
pub(crate) fn overflow_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let limit = instance.config.ext_lsdb_limit;
    if limit == 0 || instance.state.overflow {
        return;
    }
    if non_default_external_count(instance, arenas) > limit as usize {
        enter_overflow(instance);
    }
}

// Checks if a received self-originated LSA needs to be reoriginated or
// flushed.
fn process_self_originated_lsa(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_id,
    )?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    let lsa = &lse.data;

    match lsa.hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            if let LsdbIndex::Area(area_idx) = lsdb_idx {
                let area = &arenas.areas[area_idx];
                lsa_orig_router(area, instance, arenas);
            }
        }
        Some(LsaTypeCode::Network) => {
            if let LsdbIndex::Area(area_idx) = lsdb_idx {
                let area = &arenas.areas[area_idx];

                // Check if the router is still the DR for the network.
                if let Some(iface) = area
                    .interfaces
                    .iter(&arenas.interfaces)
                    .find(|iface| iface.addr == lsa.hdr.lsa_id)
                    .filter(|iface| iface.state.ism_state == ism::State::Dr)
                    .filter(|_| lsa.hdr.adv_rtr == instance.state.router_id)
                {
                    lsa_orig_network(iface, area, instance, arenas);
                } else {
                    flush = true;
                }
            }
        }
        Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter) => {
            // These LSAs will be either reoriginated or flushed once SPF
            // runs and the routing table is computed.
        }
        Some(LsaTypeCode::AsExternal) => {
            let advertised = instance.config.ext_routes.keys().any(|prefix| {
                prefix.ip() == lsa.hdr.lsa_id
            });
            if advertised {
                lsa_orig_external(instance, arenas);
            } else {
                flush = true;
            }
        }
        Some(LsaTypeCode::GroupMembership) => {
            if let LsdbIndex::Area(area_idx) = lsdb_idx {
                let area = &arenas.areas[area_idx];
                lsa_orig_group_membership(area, instance, arenas);
            }
        }
        Some(
            LsaTypeCode::OpaqueLink
            | LsaTypeCode::OpaqueArea
            | LsaTypeCode::OpaqueAs,
        ) => {
            flush = true;
        }
        None => {
            flush = true;
        }
    }

    if flush {
        // Effectively flush the received self-originated LSA.
        let (_, lsdb) = lsdb_get(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            &lsdb_id,
        )?;
        let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
        instance.tx.lsa_flush(
            lsdb_id,
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }

    Ok(())
}

// Originates the summary-LSAs computed from the routing table into every
// area, flushing the ones that are no longer advertised.
pub(crate) fn update_all_summaries(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    asbrs: &std::collections::BTreeMap<Ipv4Addr, crate::route::RouteRtr>,
) {
    // Only ABRs originate summaries.
    let is_abr = arenas.areas.is_abr(&arenas.interfaces);
    let router_id = instance.state.router_id;
    let rib = instance.state.rib.clone();

    for area_id in
        arenas.areas.iter().map(|area| area.id).collect::<Vec<_>>()
    {
        let summaries = if is_abr {
            crate::area::compute_summaries(area_id, &rib, &arenas.areas, asbrs)
        } else {
            vec![]
        };

        let Ok((_, area)) = arenas.areas.get_by_id(area_id) else {
            continue;
        };
        let lsdb_id = LsdbId::Area(area.id);
        let options = area.options(instance.config);

        // Originate the computed summaries.
        let mut advertised: std::collections::BTreeSet<LsaKey> =
            Default::default();
        for (lsa_id, body) in summaries {
            advertised.insert(LsaKey::new(body.lsa_type(), router_id, lsa_id));
            instance.tx.lsa_orig_check(lsdb_id, options, lsa_id, body);
        }

        // Flush the stale ones.
        for lsa_type in
            [LsaTypeCode::SummaryNetwork, LsaTypeCode::SummaryRouter]
        {
            for (_, lse) in area.state.lsdb.iter_by_type_advrtr(
                &arenas.lsa_entries,
                lsa_type.into(),
                router_id,
            ) {
                if !advertised.contains(&lse.data.hdr.key()) {
                    instance.tx.lsa_flush(
                        lsdb_id,
                        lse.id,
                        LsaFlushReason::PrematureAging,
                    );
                }
            }
        }
    }
}

// Returns the DBStats fingerprint of the lowest-numbered area: two routers
// hold identical fingerprints iff their LSDBs are identical.
pub(crate) fn db_stats(
    instance_lsdb: &crate::collections::Lsdb,
    areas: &crate::collections::Areas,
) -> DbStatsSnapshot {
    let first_area = areas.iter().next();
    DbStatsSnapshot {
        n_exlsas: instance_lsdb
            .lsa_count_by_type(LsaTypeCode::AsExternal.into()),
        ex_dbxsum: instance_lsdb
            .cksum_sum_by_type(LsaTypeCode::AsExternal.into()),
        area_id: first_area
            .map(|area| area.area_id)
            .unwrap_or(Ipv4Addr::UNSPECIFIED),
        n_lsas: first_area
            .map(|area| area.state.lsdb.lsa_count())
            .unwrap_or(0),
        dbxsum: first_area
            .map(|area| area.state.lsdb.cksum_sum())
            .unwrap_or(0),
    }
}

// Database fingerprint reported to the simulation controller.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DbStatsSnapshot {
    pub n_exlsas: u32,
    pub ex_dbxsum: u32,
    pub area_id: Ipv4Addr,
    pub n_lsas: u32,
    pub dbxsum: u32,
}

// External-route helper used by route computation.
pub(crate) fn external_lsas<'a>(
    instance_lsdb: &'a crate::collections::Lsdb,
    lsa_entries: &'a Arena<LsaEntry>,
) -> impl Iterator<Item = (&'a Lsa, Ipv4Network)> + 'a {
    instance_lsdb
        .iter_by_type(lsa_entries, LsaTypeCode::AsExternal.into())
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        .filter_map(|(_, lse)| {
            let ext = lse.data.body.as_as_external()?;
            let prefix =
                ospfd_utils::ip::network_from_mask(lse.data.hdr.lsa_id, ext.mask)?;
            Some((lse.data.as_ref(), prefix))
        })
}
