//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{
    AreaId, AreaIndex, Arena, InterfaceId, InterfaceIndex, LsaEntryId,
    LsdbId, LsdbIndex, NeighborId, NeighborIndex, lsdb_get, lsdb_get_mut,
    lsdb_index,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::flood::flood;
use crate::gr::{self, GrExitReason};
use crate::instance::{InstanceArenas, InstanceUpView, ProtocolMsg};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{self, LsaEntryFlags, LsaOriginateEvent};
use crate::neighbor::{
    LastDbDesc, Neighbor, RxmtPacketType, dbx_slot_available, nsm,
};
use crate::network::{ALL_DR_RTRS, ALL_SPF_RTRS};
use crate::output;
use crate::packet::igmp::{IgmpPkt, IgmpType};
use crate::packet::ip::{IPPROTO_IGMP, IPPROTO_OSPF, Ipv4Hdr};
use crate::packet::lsa::{Lsa, LsaKey, LsaScope, LsaTypeCode};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Packet,
    PacketType, auth::AuthDecodeCtx,
};
use crate::spf;

// ===== IP packet receipt =====

// Classifies a received IP datagram by protocol and dispatches it.
pub(crate) fn process_ip_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    phyint: i32,
    data: &[u8],
) -> Result<(), Error> {
    let ip_hdr = Ipv4Hdr::decode(data)
        .map_err(Error::PacketDecodeError)?;
    let payload = &data[ip_hdr.hdr_len as usize
        ..(ip_hdr.total_len as usize).min(data.len())];

    match ip_hdr.protocol {
        IPPROTO_OSPF => {
            process_ospf_packet(instance, arenas, phyint, &ip_hdr, payload)
        }
        IPPROTO_IGMP => {
            process_igmp_packet(instance, arenas, phyint, payload)
        }
        // Other protocols are the platform's business.
        _ => Ok(()),
    }
}

fn process_igmp_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    phyint: i32,
    payload: &[u8],
) -> Result<(), Error> {
    let igmp = IgmpPkt::decode(payload).map_err(Error::PacketDecodeError)?;

    // Track local group membership per interface; changes trigger
    // group-membership-LSA (re)origination.
    let join = match igmp.igmp_type {
        IgmpType::V1MembershipReport | IgmpType::V2MembershipReport => true,
        IgmpType::LeaveGroup => false,
        IgmpType::MembershipQuery => return Ok(()),
    };

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &mut arenas.interfaces[iface_idx];
            if iface.phyint != phyint {
                continue;
            }
            let changed = if join {
                iface.state.group_membership.insert(igmp.group)
            } else {
                iface.state.group_membership.remove(&igmp.group)
            };
            if changed {
                instance.tx.push(ProtocolMsg::LsaOrigEvent {
                    event: LsaOriginateEvent::GroupMembershipChange {
                        area_id: area.id,
                    },
                });
            }
        }
    }

    Ok(())
}

fn process_ospf_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    phyint: i32,
    ip_hdr: &Ipv4Hdr,
    payload: &[u8],
) -> Result<(), Error> {
    let src = ip_hdr.src;
    let dst = ip_hdr.dst;

    // Locate the receiving interface.
    let (area_idx, iface_idx) =
        find_receiving_iface(arenas, phyint, ip_hdr, payload)
            .ok_or(Error::PhyintNotFound(phyint))?;
    let area = &arenas.areas[area_idx];
    let iface = &mut arenas.interfaces[iface_idx];

    // Ignore packets received on inoperational or passive interfaces.
    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    // Validate IP destination address.
    if dst != iface.addr
        && dst != ALL_SPF_RTRS
        && !(dst == ALL_DR_RTRS && iface.is_dr_or_backup())
        && iface.config.if_type != InterfaceType::VirtualLink
    {
        return Err(Error::InvalidDstAddr(dst));
    }

    // Decode and authenticate the OSPF packet.
    let now_secs = instance.tx.timers.now().as_secs() as u32;
    let auth_ctx = iface.config.auth.as_ref().map(|method| AuthDecodeCtx {
        method,
        now: now_secs,
    });
    let packet = Packet::decode(payload, auth_ctx.as_ref())
        .map_err(Error::PacketDecodeError)?;
    let pkt_type = packet.hdr().pkt_type;
    let router_id = packet.hdr().router_id;

    // Check for Area ID mismatch. Packets on virtual links carry the
    // backbone Area ID.
    let expected_area_id =
        if iface.config.if_type == InterfaceType::VirtualLink {
            Ipv4Addr::UNSPECIFIED
        } else {
            area.area_id
        };
    if packet.hdr().area_id != expected_area_id {
        return Err(Error::InterfaceCfgError(
            iface.phyint,
            src,
            pkt_type,
            InterfaceCfgError::AreaIdMismatch(
                packet.hdr().area_id,
                expected_area_id,
            ),
        ));
    }

    // Perform authentication sequence number validation.
    if let Some(auth_seqno) = packet.hdr().auth_seqno
        && let Some(nbr_idx) =
            get_neighbor_idx(iface, src, router_id, &arenas.neighbors)
    {
        let nbr = &mut arenas.neighbors[nbr_idx];
        // Discard the packet if its sequence number is lower than the
        // recorded sequence number in the sender's neighbor data
        // structure.
        if let Some(nbr_auth_seqno) = nbr.auth_seqno
            && auth_seqno < nbr_auth_seqno
        {
            return Err(Error::PacketAuthInvalidSeqno(src, auth_seqno));
        }
        nbr.auth_seqno = Some(auth_seqno);
    }

    // Log received packet.
    Debug::PacketRx(phyint, &src, &dst, &packet).log();

    if let Packet::Hello(pkt) = packet {
        process_packet_hello(
            iface,
            area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
            src,
            pkt,
        )
    } else {
        // Non-Hello packets not matching any active neighbor are
        // discarded.
        let nbr_idx =
            get_neighbor_idx(iface, src, router_id, &arenas.neighbors)
                .ok_or(Error::UnknownNeighbor(src, router_id))?;

        match packet {
            Packet::Hello(_) => unreachable!(),
            Packet::DbDesc(pkt) => {
                let nbr = &mut arenas.neighbors[nbr_idx];
                process_packet_dbdesc(
                    nbr,
                    iface,
                    area,
                    instance,
                    &arenas.lsa_entries,
                    src,
                    pkt,
                )
            }
            Packet::LsRequest(pkt) => {
                let nbr = &mut arenas.neighbors[nbr_idx];
                process_packet_lsreq(
                    nbr,
                    iface,
                    area,
                    instance,
                    &arenas.lsa_entries,
                    pkt,
                )
            }
            Packet::LsUpdate(pkt) => process_packet_lsupd(
                nbr_idx, iface_idx, area_idx, instance, arenas, src, pkt,
            ),
            Packet::LsAck(pkt) => {
                let nbr = &mut arenas.neighbors[nbr_idx];
                process_packet_lsack(nbr, pkt)
            }
        }
    }
}

// Finds the interface a received OSPF packet belongs to: the interface on
// the arrival phyint whose network contains the source (or any interface
// on the phyint for point-to-point links), falling back to a virtual link
// identified by the sender's Router ID.
fn find_receiving_iface(
    arenas: &InstanceArenas,
    phyint: i32,
    ip_hdr: &Ipv4Hdr,
    payload: &[u8],
) -> Option<(AreaIndex, InterfaceIndex)> {
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            if iface.phyint != phyint {
                continue;
            }
            match iface.config.if_type {
                InterfaceType::PointToPoint
                | InterfaceType::PointToMultipoint => {
                    return Some((area_idx, iface_idx));
                }
                _ => {
                    if let Some(network) = iface.network()
                        && (network.contains(ip_hdr.src)
                            || ip_hdr.src == iface.addr)
                    {
                        return Some((area_idx, iface_idx));
                    }
                }
            }
        }
    }

    // Virtual link: match on the sender's Router ID, carried in the OSPF
    // header.
    if payload.len() >= 12 {
        let sender = Ipv4Addr::new(
            payload[4], payload[5], payload[6], payload[7],
        );
        let area_id =
            Ipv4Addr::new(payload[8], payload[9], payload[10], payload[11]);
        if area_id == Ipv4Addr::UNSPECIFIED {
            for area_idx in arenas.areas.indexes() {
                let area = &arenas.areas[area_idx];
                for iface_idx in area.interfaces.indexes() {
                    let iface = &arenas.interfaces[iface_idx];
                    if let Some(vlink) = &iface.vlink
                        && vlink.endpoint_id == sender
                    {
                        return Some((area_idx, iface_idx));
                    }
                }
            }
        }
    }

    None
}

// Finds a neighbor by source address, or by Router ID on point-to-point
// and virtual links.
fn get_neighbor_idx(
    iface: &Interface,
    src: Ipv4Addr,
    router_id: Ipv4Addr,
    neighbors: &Arena<Neighbor>,
) -> Option<NeighborIndex> {
    match iface.config.if_type {
        InterfaceType::PointToPoint | InterfaceType::VirtualLink => iface
            .state
            .neighbors
            .get_by_router_id(neighbors, router_id)
            .map(|(nbr_idx, _)| nbr_idx),
        _ => iface
            .state
            .neighbors
            .get_by_addr(neighbors, src)
            .map(|(nbr_idx, _)| nbr_idx),
    }
}

fn process_packet_hello(
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa_entries: &Arena<crate::lsdb::LsaEntry>,
    src: Ipv4Addr,
    hello: Hello,
) -> Result<(), Error> {
    // Perform all the required sanity checks.
    process_packet_hello_sanity_checks(iface, area, instance, &hello)
        .map_err(|error| {
            Error::InterfaceCfgError(
                iface.phyint,
                src,
                PacketType::Hello,
                error,
            )
        })?;

    // Find or create new neighbor.
    let nbr_idx = get_neighbor_idx(iface, src, hello.hdr.router_id, neighbors);
    let (nbr_idx, nbr) = match nbr_idx {
        Some(nbr_idx) => (nbr_idx, &mut neighbors[nbr_idx]),
        None => {
            // Create new neighbor.
            let (nbr_idx, nbr) = iface.state.neighbors.insert(
                neighbors,
                hello.hdr.router_id,
                src,
            );

            // Initialize neighbor values.
            nbr.priority = hello.priority;
            if iface.is_broadcast_or_nbma() {
                nbr.dr = hello.dr;
                nbr.bdr = hello.bdr;
            }

            (nbr_idx, nbr)
        }
    };

    // Keep the Router ID learned from the latest Hello (the initial value
    // of statically configured NBMA neighbors is a placeholder).
    if nbr.router_id != hello.hdr.router_id {
        let router_id = hello.hdr.router_id;
        iface
            .state
            .neighbors
            .update_router_id(nbr_idx, nbr, router_id);
    }

    // Update neighbor's source address (point-to-point address changes).
    nbr.src = src;

    // Trigger the HelloReceived event.
    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::HelloRcvd);

    // Trigger the 1-WayReceived or the 2-WayReceived event.
    if hello
        .neighbors
        .iter()
        .any(|id| *id == instance.state.router_id)
    {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);
    } else {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::OneWayRcvd);

        // Update neighbor values.
        if iface.is_broadcast_or_nbma() {
            nbr.priority = hello.priority;
            nbr.dr = hello.dr;
            nbr.bdr = hello.bdr;
        }

        return Ok(());
    }

    // Examine the rest of the Hello packet (ignored on point-to-multipoint
    // interfaces as per errata 4022 of RFC 2328).
    if iface.is_broadcast_or_nbma() {
        // Check for Router Priority change.
        if hello.priority != nbr.priority {
            nbr.priority = hello.priority;
            instance
                .tx
                .ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        // Check for DR/BDR changes.
        let nbr_net_id = nbr.src;
        if iface.state.ism_state == ism::State::Waiting
            && ((hello.dr == Some(nbr_net_id) && hello.bdr.is_none())
                || hello.bdr == Some(nbr_net_id))
        {
            instance
                .tx
                .ism_event(area.id, iface.id, ism::Event::BackupSeen);
        }
        if (hello.dr == Some(nbr_net_id) && nbr.dr != Some(nbr_net_id))
            || (hello.dr != Some(nbr_net_id) && nbr.dr == Some(nbr_net_id))
            || (hello.bdr == Some(nbr_net_id) && nbr.bdr != Some(nbr_net_id))
            || (hello.bdr != Some(nbr_net_id)
                && nbr.bdr == Some(nbr_net_id))
        {
            instance
                .tx
                .ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        // Update neighbor's DR/BDR.
        nbr.dr = hello.dr;
        nbr.bdr = hello.bdr;
    }

    Ok(())
}

fn process_packet_hello_sanity_checks(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    hello: &Hello,
) -> Result<(), InterfaceCfgError> {
    // Interface parameter checks.
    iface.validate_hello(hello)?;

    // Check for ExternalRoutingCapability mismatch.
    let e_bit = hello.options.contains(crate::packet::Options::E);
    if e_bit == area.config.stub {
        return Err(InterfaceCfgError::ExternalRoutingCapabilityMismatch(
            e_bit,
        ));
    }

    // Check for duplicate Router ID.
    if hello.hdr.router_id == instance.state.router_id {
        return Err(InterfaceCfgError::DuplicateRouterId(
            hello.hdr.router_id,
        ));
    }

    Ok(())
}

fn process_packet_dbdesc(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    lsa_entries: &Arena<crate::lsdb::LsaEntry>,
    src: Ipv4Addr,
    dbdesc: DbDesc,
) -> Result<(), Error> {
    // MTU mismatch check (virtual links advertise an MTU of zero).
    if dbdesc.mtu != 0 && dbdesc.mtu > iface.config.mtu {
        return Err(Error::InterfaceCfgError(
            iface.phyint,
            src,
            PacketType::DbDesc,
            InterfaceCfgError::MtuMismatch(dbdesc.mtu),
        ));
    }

    // Further processing depends on the neighbor's state.
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                let event = nsm::Event::TwoWayRcvd;
                nbr.fsm(iface, area, instance, lsa_entries, event);
                if nbr.state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            if dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs.is_empty()
                && dbdesc.hdr.router_id > instance.state.router_id
            {
                // Set the master/slave bit to slave, and set the neighbor
                // data structure's DD sequence number to that specified by
                // the master.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no;
            } else if !dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no == nbr.dd_seq_no
                && dbdesc.hdr.router_id < instance.state.router_id
            {
                // In this case the router is Master.
            } else {
                // Ignore the packet.
                return Ok(());
            }

            nbr.options = Some(dbdesc.options);
            let event = nsm::Event::NegotiationDone;
            nbr.fsm(iface, area, instance, lsa_entries, event);
        }
        nsm::State::Exchange => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave needs to retransmit the last Database
                // Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface, instance);
                }

                return Ok(());
            }

            // Sanity checks.
            let last_rcvd_dbdesc = nbr.last_rcvd_dbdesc.as_ref().unwrap();
            if dbdesc.dd_flags.contains(DbDescFlags::I)
                || dbdesc.dd_flags.contains(DbDescFlags::MS)
                    != last_rcvd_dbdesc.dd_flags.contains(DbDescFlags::MS)
            {
                let reason = SeqNoMismatchReason::InconsistentFlags;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if dbdesc.options != last_rcvd_dbdesc.options {
                let reason = SeqNoMismatchReason::InconsistentOptions;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if (nbr.dd_flags.contains(DbDescFlags::MS)
                && dbdesc.dd_seq_no != nbr.dd_seq_no)
                || (!nbr.dd_flags.contains(DbDescFlags::MS)
                    && dbdesc.dd_seq_no != nbr.dd_seq_no.wrapping_add(1))
            {
                let reason = SeqNoMismatchReason::InconsistentSeqNo;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave must respond to duplicates by repeating the
                // last Database Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface, instance);
                }

                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }
    }

    // If we got this far it means the packet was accepted. Stop the
    // retransmission interval in case it's active.
    nbr.rxmt_dbdesc_stop();

    // Now iterate over all LSA headers.
    for lsa_hdr in &dbdesc.lsa_hdrs {
        // Check if the LSA is valid for this area and neighbor.
        if !lsdb::lsa_type_is_valid(Some(area), nbr.options, lsa_hdr.lsa_type)
        {
            let reason = SeqNoMismatchReason::InvalidLsaType;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }

        // RFC 5243: "If the Database summary list contains an instance of
        // the LSA that is the same as or less recent than the listed LSA,
        // the LSA is removed from the Database summary list".
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) =
            nbr.lists.db_summary.entry(lsa_key)
        {
            let db_summ_lsa = o.get();
            if lsdb::lsa_compare(&db_summ_lsa.hdr, lsa_hdr)
                != Ordering::Greater
            {
                o.remove();
            }
        }

        // Put the LSA on the Link state request list if it's not present
        // on the LSDB, or if the local copy is less recent than the
        // received one.
        let lsdb = match lsa_hdr.lsa_type.scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => unreachable!(),
        };
        if let Some((_, lse)) = lsdb.get(lsa_entries, &lsa_key)
            && lsdb::lsa_compare(&lse.data.hdr, lsa_hdr) != Ordering::Less
        {
            continue;
        }
        nbr.lists.ls_request.insert(lsa_key, *lsa_hdr);
    }

    // Start sending Link State Request packets.
    if !nbr.lists.ls_request.is_empty()
        && nbr.lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // Further processing depends on whether the router is master or slave.
    let mut exchange_done = false;
    if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        } else {
            output::send_dbdesc(nbr, iface, area, instance);
        }
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no;

        output::send_dbdesc(nbr, iface, area, instance);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        }
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::ExchangeDone);

        // The slave must wait RouterDeadInterval seconds before freeing
        // the last Database Description packet. Reception of a Database
        // Description packet from the master after this interval will
        // generate a SeqNumberMismatch neighbor event.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            let task = instance.tx.timers.timeout(
                std::time::Duration::from_secs(
                    iface.config.dead_interval as u64,
                ),
                ProtocolMsg::DbDescFree {
                    area_id: area.id,
                    iface_id: iface.id,
                    nbr_id: nbr.id,
                },
            );
            nbr.tasks.dbdesc_free_timer = Some(task);
        }
    }

    // Save last received Database Description packet.
    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options,
        dd_flags: dbdesc.dd_flags,
        dd_seq_no: dbdesc.dd_seq_no,
    });

    Ok(())
}

fn process_packet_lsreq(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    lsa_entries: &Arena<crate::lsdb::LsaEntry>,
    ls_req: LsRequest,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all request entries.
    for lsa_key in &ls_req.entries {
        // Locate LSA in the LSDB.
        let lsdb = match lsa_key.lsa_type.scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => continue,
        };

        if let Some((_, lse)) = lsdb.get(lsa_entries, lsa_key) {
            // Copy LSA for transmission to the neighbor.
            let lsa = lse.data.clone();
            nbr.lists.ls_update.insert(*lsa_key, lsa);
        } else {
            // Something has gone wrong with the Database Exchange process.
            nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
            return Ok(());
        }
    }

    // Schedule transmission of new LS Update.
    if !nbr.lists.ls_update.is_empty() {
        instance.tx.send_lsupd(area.id, iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv4Addr,
    ls_upd: LsUpdate,
) -> Result<(), Error> {
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Process all LSAs contained in the packet.
    for lsa in ls_upd.lsas {
        let stop = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, area_idx, instance, arenas, src, lsa,
        );
        if stop {
            break;
        }
    }

    Ok(())
}

fn process_packet_lsupd_lsa(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv4Addr,
    mut lsa: Lsa,
) -> bool {
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];
    let now = instance.tx.timers.now();

    // (1) Validate the LSA (not only the checksum as specified by the
    // RFC).
    if let Err(error) = lsa.validate() {
        // Log why the LSA is being discarded, and count it as a neighbor
        // error.
        let _ = error;
        Debug::LsaDiscard(nbr.router_id, &lsa.hdr).log();
        instance.state.bad_packet_count += 1;
        return false;
    }

    // (2-3) Check if the LSA type is valid for this area and neighbor.
    if !lsdb::lsa_type_is_valid(Some(area), nbr.options, lsa.hdr.lsa_type) {
        return false;
    }

    // (5) Find the instance of this LSA that is currently contained in
    // the router's link state database.
    let lsdb_idx = match lsa.hdr.lsa_type.scope() {
        LsaScope::Link => LsdbIndex::Link(area_idx, iface_idx),
        LsaScope::Area => LsdbIndex::Area(area_idx),
        LsaScope::As => LsdbIndex::As,
        LsaScope::Unknown => return false,
    };
    let lsdb = match lsdb_idx {
        LsdbIndex::Link(_, _) => &iface.state.lsdb,
        LsdbIndex::Area(_) => &area.state.lsdb,
        LsdbIndex::As => &instance.state.lsdb,
    };
    let lsa_key = lsa.hdr.key();
    let lse = lsdb.get(&arenas.lsa_entries, &lsa_key).map(|(_, lse)| lse);

    // (4) If the LSA's LS age is equal to MaxAge, and there is currently
    // no instance of the LSA in the router's link state database, and
    // none of router's neighbors are in states Exchange or Loading.
    if lsa.hdr.is_maxage()
        && lse.is_none()
        && instance.state.dbx_nbr_count == 0
    {
        // Acknowledge the receipt of the LSA.
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        return false;
    }

    // (5 cont.) There is no database copy, or the received LSA is more
    // recent than the database copy.
    let lsa_cmp = lse.map(|lse| lsdb::lsa_compare(&lse.data.hdr, &lsa.hdr));
    if matches!(lsa_cmp, None | Some(Ordering::Less)) {
        // (5.a) MinLSArrival check.
        if let Some(lse) = lse
            && lsdb::lsa_min_arrival_check(lse, now)
        {
            Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
            return false;
        }

        // Stamp the arrival time and move the LSA into a
        // reference-counting pointer.
        lsa.base_time = Some(now);
        let lsa = Arc::new(lsa);

        // (5.b) Immediately flood the new LSA out some subset of the
        // router's interfaces.
        let flood_src = Some((iface_idx, nbr_idx));
        let flooded_back = flood(
            instance,
            &arenas.areas,
            &mut arenas.interfaces,
            &mut arenas.neighbors,
            lsdb_idx,
            &lsa,
            flood_src,
        );

        // (5.c) Removal from Link state retransmission lists is handled
        // by the LSA installation process.

        // (5.d) Install the new LSA in the link state database (replacing
        // the current database copy).
        let lse_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
        let lse = &mut arenas.lsa_entries[lse_idx];
        lse.flags.insert(LsaEntryFlags::RECEIVED);
        let self_originated =
            lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED);
        let lsa = lse.data.clone();

        // Update statistics.
        instance.state.rx_lsa_count += 1;

        // (5.e) Possibly acknowledge the receipt of the LSA by sending a
        // Link State Acknowledgment packet.
        let nbr = &mut arenas.neighbors[nbr_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        let area = &arenas.areas[area_idx];
        let nbr_router_id = nbr.router_id;
        if !flooded_back
            && (iface.state.ism_state != ism::State::Backup
                || iface.state.dr == Some(nbr.src))
        {
            // Enqueue delayed ack.
            iface.enqueue_delayed_ack(area, instance, &lsa.hdr);
        }

        // Grace-LSA processing.
        if let Some((grace_period, reason, addr)) = lsa.body.as_grace()
            && gr::helper_applicable(iface)
        {
            // On broadcast, NBMA and point-to-multipoint segments, the
            // restarting neighbor is identified by the IP interface
            // address in the body of the grace-LSA.
            let gr_nbr_idx = match addr {
                Some(addr) => iface
                    .state
                    .neighbors
                    .get_by_addr(&arenas.neighbors, addr)
                    .map(|(nbr_idx, _)| nbr_idx),
                None => Some(nbr_idx),
            };
            let nbr = gr_nbr_idx.map(|nbr_idx| &mut arenas.neighbors[nbr_idx]);

            if let Some(nbr) = nbr {
                gr::helper_process_grace_lsa(
                    nbr,
                    iface,
                    area,
                    lsa.age(now),
                    lsa.hdr.is_maxage(),
                    grace_period,
                    reason,
                    instance,
                );
            }
        }

        // (5.f) Check if this is a self-originated LSA.
        if self_originated {
            Debug::LsaSelfOriginated(nbr_router_id, &lsa.hdr).log();

            // (Re)originate or flush self-originated LSA.
            let (lsdb_id, _) = lsdb_index(
                &instance.state.lsdb,
                &arenas.areas,
                &arenas.interfaces,
                lsdb_idx,
            );
            let lse_id = arenas.lsa_entries[lse_idx].id;
            instance.tx.lsa_orig_event(
                LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id },
            );
        }

        return false;
    }

    // (6) Check if the received LSA is the same instance as the database
    // copy (i.e., neither one is more recent).
    let nbr = &mut arenas.neighbors[nbr_idx];
    let lse = lse.unwrap();
    let lse_data_hdr = lse.data.hdr;
    let lse_min_arrival = lsdb::lsa_min_arrival_check(lse, now);
    let lse_data = lse.data.clone();
    if lsa_cmp == Some(Ordering::Equal) {
        // Check if this LSA can be handled as an implied acknowledgment.
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            o.remove();
            nbr.rxmt_lsupd_stop_check();

            if iface.state.ism_state == ism::State::Backup
                && iface.state.dr == Some(nbr.src)
            {
                // Enqueue delayed ack.
                iface.enqueue_delayed_ack(area, instance, &lsa.hdr);
            }
        } else {
            // Send direct ack.
            output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        }

        return false;
    }

    // (7) If there is an instance of the LSA on the sending neighbor's
    // Link state request list, an error has occurred in the Database
    // Exchange process.
    if nbr.lists.ls_request.contains_key(&lsa_key)
        || nbr.lists.ls_request_pending.contains_key(&lsa_key)
    {
        // Restart the Database Exchange process.
        nbr.fsm(
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            nsm::Event::BadLsReq,
        );

        // Stop processing the Link State Update packet.
        return true;
    }

    // (8) The database copy is more recent.
    //
    // If the database copy has LS age equal to MaxAge and LS sequence
    // number equal to MaxSequenceNumber, simply discard the received LSA
    // without acknowledging it.
    if lse_data_hdr.is_maxage()
        && lse_data_hdr.seq_no == lsdb::LSA_MAX_SEQ_NO
    {
        return false;
    }
    if !lse_min_arrival {
        // Send the database copy back to the sending neighbor,
        // encapsulated within a Link State Update Packet.
        nbr.lists.ls_update.insert(lsa_key, lse_data);
        instance.tx.send_lsupd(area.id, iface.id, Some(nbr.id));
    } else {
        Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
    }

    false
}

fn process_packet_lsack(nbr: &mut Neighbor, ls_ack: LsAck) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all LSA headers.
    for lsa_hdr in &ls_ack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            let lsa = o.get();
            if lsdb::lsa_compare(&lsa.hdr, lsa_hdr) == Ordering::Equal {
                o.remove();
                nbr.rxmt_lsupd_stop_check();
            } else {
                Debug::QuestionableAck(nbr.router_id, lsa_hdr).log();
            }
        }
    }

    Ok(())
}

// ===== protocol event dispatch =====

pub(crate) fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolMsg,
) -> Result<(), Error> {
    match msg {
        ProtocolMsg::IsmEvent {
            area_id,
            iface_id,
            event,
        } => process_ism_event(instance, arenas, area_id, iface_id, event)?,
        ProtocolMsg::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        } => process_nsm_event(
            instance, arenas, area_id, iface_id, nbr_id, event,
        )?,
        ProtocolMsg::HelloInterval {
            area_id,
            iface_id,
            addr,
        } => process_hello_interval(instance, arenas, area_id, iface_id, addr)?,
        ProtocolMsg::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        } => process_send_lsupd(instance, arenas, area_id, iface_id, nbr_id)?,
        ProtocolMsg::RxmtInterval {
            area_id,
            iface_id,
            nbr_id,
            packet_type,
        } => process_packet_rxmt(
            instance, arenas, area_id, iface_id, nbr_id, packet_type,
        )?,
        ProtocolMsg::DelayedAck { area_id, iface_id } => {
            process_delayed_ack_timeout(instance, arenas, area_id, iface_id)?
        }
        ProtocolMsg::DbDescFree {
            area_id,
            iface_id,
            nbr_id,
        } => process_dbdesc_free(instance, arenas, area_id, iface_id, nbr_id)?,
        ProtocolMsg::LsaOrigEvent { event } => {
            lsdb::lsa_orig_event(instance, arenas, event)?
        }
        ProtocolMsg::LsaOrigCheck {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        } => process_lsa_orig_check(
            instance, arenas, lsdb_id, options, lsa_id, lsa_body,
        )?,
        ProtocolMsg::LsaOrigDelayed { lsdb_id, lsa_key } => {
            process_lsa_orig_delayed_timer(instance, arenas, lsdb_id, lsa_key)?
        }
        ProtocolMsg::LsaFlush {
            lsdb_id,
            lse_id,
            reason,
        } => process_lsa_flush(instance, arenas, lsdb_id, lse_id, reason)?,
        ProtocolMsg::LsaRefresh { lsdb_id, lse_id } => {
            process_lsa_refresh(instance, arenas, lsdb_id, lse_id)?
        }
        ProtocolMsg::LsaExpiry { lsdb_id, lse_id } => process_lsa_flush(
            instance,
            arenas,
            lsdb_id,
            lse_id,
            LsaFlushReason::Expiry,
        )?,
        ProtocolMsg::LsdbMaxAgeSweep { lsdb_id } => {
            process_lsdb_maxage_sweep_interval(instance, arenas, lsdb_id)?
        }
        ProtocolMsg::SpfTimer => spf::run(instance, arenas),
        ProtocolMsg::GracePeriod {
            area_id,
            iface_id,
            nbr_id,
        } => process_grace_period_timeout(
            instance, arenas, area_id, iface_id, nbr_id,
        )?,
        ProtocolMsg::GrExitCheck { timed_out } => {
            gr::restart_check_done(instance, arenas, timed_out)
        }
        ProtocolMsg::ExitOverflow => process_exit_overflow(instance, arenas),
        ProtocolMsg::AdjacencyCheck => {
            process_adjacency_check(instance, arenas)
        }
        ProtocolMsg::ShutdownTimer => {
            instance.state.shutdown_timer = None;
            instance.tx.sys.halt(0, "shutdown complete");
        }
    }

    Ok(())
}

// ===== Interface FSM event =====

pub(crate) fn process_ism_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    event: ism::Event,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    // Invoke FSM event.
    iface.fsm(
        area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    event: nsm::Event,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    // Invoke FSM event.
    nbr.fsm(iface, area, instance, &arenas.lsa_entries, event);
    if nbr.state == nsm::State::Down {
        // Effectively delete the neighbor.
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);
    }

    Ok(())
}

// ===== Hello transmission =====

fn process_hello_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    addr: Option<Ipv4Addr>,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    output::send_hello(iface, area, instance, &arenas.neighbors, addr);

    Ok(())
}

// ===== Request to send LS Update =====

pub(crate) fn process_send_lsupd(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: Option<NeighborId>,
) -> Result<(), Error> {
    // Lookup area, interface and optional neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let nbr_idx = match nbr_id {
        Some(nbr_id) => {
            let (nbr_idx, _) = iface
                .state
                .neighbors
                .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;
            Some(nbr_idx)
        }
        None => None,
    };

    // Send LS Update.
    iface.state.tasks.ls_update_timer = None;
    output::send_lsupd(nbr_idx, iface, area, instance, &mut arenas.neighbors);

    Ok(())
}

// ===== Packet retransmission =====

fn process_packet_rxmt(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    packet_type: RxmtPacketType,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    // Retransmit packet.
    match packet_type {
        RxmtPacketType::DbDesc => {
            output::rxmt_dbdesc(nbr, iface, instance);
        }
        RxmtPacketType::LsRequest => {
            output::rxmt_lsreq(nbr, iface, area, instance);
        }
        RxmtPacketType::LsUpdate => {
            output::rxmt_lsupd(nbr, iface, area, instance);
        }
    }

    Ok(())
}

// ===== Delayed Ack timeout =====

fn process_delayed_ack_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    // Send delayed LS Ack.
    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, area, instance, &arenas.neighbors);

    Ok(())
}

// ===== Free last sent/received Database Description packets =====

fn process_dbdesc_free(
    _instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    // Free last sent/received Database Description packets.
    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== LSA origination check =====

fn process_lsa_orig_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    options: crate::packet::Options,
    lsa_id: Ipv4Addr,
    lsa_body: crate::packet::lsa::LsaBody,
) -> Result<(), Error> {
    // While restarting gracefully, only grace-LSAs may be originated: the
    // pre-restart LSAs must keep flowing unchanged.
    if instance.state.gr_restart.is_some()
        && lsa_body.lsa_type().type_code() != Some(LsaTypeCode::OpaqueLink)
    {
        return Ok(());
    }

    // Lookup LSDB.
    let (lsdb_idx, _) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_id,
    )?;

    // Attempt to originate LSA.
    lsdb::originate_check(instance, arenas, lsdb_idx, options, lsa_id, lsa_body);

    Ok(())
}

// ===== LSA delayed origination timer =====

fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    // Lookup LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_id,
    )?;

    // Originate LSA.
    if let Some(ldo) = lsdb.delayed_orig.remove(&lsa_key) {
        lsdb::originate(instance, arenas, lsdb_idx, ldo.data);
    }

    Ok(())
}

// ===== LSA flush event =====

fn process_lsa_flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    reason: LsaFlushReason,
) -> Result<(), Error> {
    // Lookup LSA entry and its corresponding LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_id,
    )?;
    let (lse_idx, _) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;

    // Flush LSA.
    lsdb::flush(instance, arenas, lsdb_idx, lse_idx, reason);

    Ok(())
}

// ===== LSA refresh event =====

fn process_lsa_refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    // Lookup LSA entry and its corresponding LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_id,
    )?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;

    Debug::LsaRefresh(&lse.data.hdr).log();

    // Periodic refresh is suppressed on demand circuits (DoNotAge).
    if lse.data.hdr.is_dna() {
        return Ok(());
    }

    // Originate new instance of the LSA.
    let lsa = Lsa::new(
        0,
        lse.data.hdr.options,
        lse.data.hdr.lsa_id,
        lse.data.hdr.adv_rtr,
        lse.data.hdr.seq_no.wrapping_add(1),
        lse.data.body.clone(),
    );
    lsdb::originate(instance, arenas, lsdb_idx, lsa);

    Ok(())
}

// ===== LSDB MaxAge sweep timer =====

fn process_lsdb_maxage_sweep_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
) -> Result<(), Error> {
    // Skip discarding MaxAge LSAs if any of the router's neighbors are in
    // states Exchange or Loading.
    if instance.state.dbx_nbr_count != 0 {
        return Ok(());
    }

    // Get list of MaxAge LSAs that are no longer contained on any neighbor
    // LS retransmission lists.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_id,
    )?;
    let removable: Vec<_> = lsdb
        .maxage_lsas
        .iter()
        .copied()
        .filter(|lse_idx| {
            let lse = &arenas.lsa_entries[*lse_idx];
            !arenas.neighbors.iter().any(|(_, nbr)| {
                nbr.lists
                    .ls_rxmt
                    .get(&lse.data.hdr.key())
                    .filter(|rxmt_lsa| Arc::ptr_eq(&lse.data, rxmt_lsa))
                    .is_some()
            })
        })
        .collect();

    for lse_idx in removable {
        let (_, lsdb) = lsdb_get_mut(
            &mut instance.state.lsdb,
            &mut arenas.areas,
            &mut arenas.interfaces,
            &lsdb_id,
        )?;
        let lse = &arenas.lsa_entries[lse_idx];

        // Delete or originate new instance of the LSA depending whether
        // it's wrapping its sequence number.
        if let Some(lsa) = lsdb.seqno_wrapping.remove(&lse.data.hdr.key()) {
            let lsa = Lsa::new(
                0,
                lsa.hdr.options,
                lsa.hdr.lsa_id,
                lsa.hdr.adv_rtr,
                lsdb::LSA_INIT_SEQ_NO,
                lsa.body.clone(),
            );
            lsdb.delete(&mut arenas.lsa_entries, lse_idx);
            lsdb::originate(instance, arenas, lsdb_idx, lsa);
        } else {
            lsdb.delete(&mut arenas.lsa_entries, lse_idx);
        }
    }

    Ok(())
}

// ===== Grace period timeout =====

fn process_grace_period_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    if nbr.gr.is_some() {
        // Exit from the helper mode.
        gr::helper_exit(nbr, iface, area, GrExitReason::TimedOut, instance);

        // Delete the neighbor.
        instance.tx.nsm_event(
            area.id,
            iface.id,
            nbr.id,
            nsm::Event::InactivityTimer,
        );
    }

    Ok(())
}

// ===== Overflow exit =====

fn process_exit_overflow(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    if !instance.state.overflow {
        return;
    }

    Debug::OverflowExit.log();
    instance.state.overflow = false;
    instance.state.overflow_exit_timer = None;

    // Resume origination of the configured external routes.
    lsdb::lsa_orig_external(instance, arenas);
}

// ===== Adjacency throttling =====

// A Database Exchange slot was freed: promote one neighbor that has been
// waiting in 2-Way.
fn process_adjacency_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    if !dbx_slot_available(instance) {
        return;
    }

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];
            for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>()
            {
                let nbr = &arenas.neighbors[nbr_idx];
                if nbr.state == nsm::State::TwoWay && nbr.adj_pending {
                    instance.tx.nsm_event(
                        area.id,
                        iface.id,
                        nbr.id,
                        nsm::Event::AdjOk,
                    );
                    return;
                }
            }
        }
    }
}

// ===== helpers shared with the instance =====

// Brings every interface in line with its configuration and physical
// state.
pub(crate) fn update_all_interfaces(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &mut arenas.interfaces[iface_idx];
            iface.update(
                area,
                instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
        }
    }
}

// Transmits all pending LS Updates immediately.
pub(crate) fn flush_pending_lsupd(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &mut arenas.interfaces[iface_idx];
            if iface.is_down() {
                continue;
            }
            if !iface.state.ls_update_list.is_empty() {
                iface.state.tasks.ls_update_timer = None;
                output::send_lsupd(
                    None,
                    iface,
                    area,
                    instance,
                    &mut arenas.neighbors,
                );
            }
        }
    }
}
