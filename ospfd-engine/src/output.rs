//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use smallvec::{SmallVec, smallvec};

use crate::area::Area;
use crate::collections::{Arena, NeighborIndex};
use crate::debug::Debug;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::network::MulticastAddr;
use crate::packet::ip::{IPPROTO_OSPF, Ipv4Hdr};
use crate::packet::lsa::LsaHdr;
use crate::packet::{
    DbDesc, DbDescFlags, LsAck, LsRequest, LsUpdate, Packet, PacketHdr,
    PacketType,
};
use crate::sys::SendGateway;

// ===== Hello packets =====

pub(crate) fn send_hello(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
    poll_addr: Option<Ipv4Addr>,
) {
    let packet = iface.generate_hello(area, instance, neighbors);

    let dst: SmallVec<[Ipv4Addr; 4]> = match poll_addr {
        // NBMA poll of a single dead neighbor.
        Some(addr) => smallvec![addr],
        None => match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::Broadcast => {
                smallvec![MulticastAddr::AllSpfRtrs.addr()]
            }
            InterfaceType::NonBroadcast
            | InterfaceType::PointToMultipoint => {
                iface.config.static_nbrs.keys().copied().collect()
            }
            InterfaceType::VirtualLink => smallvec![Ipv4Addr::UNSPECIFIED],
            InterfaceType::Loopback => return,
        },
    };

    transmit(iface, instance, &packet, &dst);
}

// ===== Database Description packets =====

pub(crate) fn send_dbdesc(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    // Calculate maximum packet size.
    let max_size =
        iface.max_packet_size() - PacketHdr::LENGTH - DbDesc::BASE_LENGTH;

    // Append as many LSA headers as possible while on the Exchange state.
    let now = instance.tx.timers.now();
    let mut total = 0;
    let mut lsa_hdrs = vec![];
    while total + LsaHdr::LENGTH <= max_size {
        match nbr.lists.db_summary.pop_first() {
            Some((_, lsa)) => {
                total += LsaHdr::LENGTH;

                // Update LSA age.
                let mut lsa_hdr = lsa.hdr;
                lsa_hdr.age = lsa.age(now);
                lsa_hdrs.push(lsa_hdr);
            }
            None => break,
        }
    }

    // Clear the M-bit if there's no more data to send.
    if !nbr.dd_flags.contains(DbDescFlags::I) && nbr.lists.db_summary.is_empty()
    {
        nbr.dd_flags.remove(DbDescFlags::M);
    }

    // Generate Database Description packet.
    let pkt_hdr = PacketHdr::new(
        PacketType::DbDesc,
        instance.state.router_id,
        area.area_id,
    );
    let packet = Packet::DbDesc(DbDesc {
        hdr: pkt_hdr,
        options: area.options(instance.config),
        mtu: if iface.config.if_type == InterfaceType::VirtualLink {
            0
        } else {
            iface.config.mtu
        },
        dd_flags: nbr.dd_flags,
        dd_seq_no: nbr.dd_seq_no,
        lsa_hdrs,
    });

    // Transmit packet and remember it for retransmissions.
    let dst = send_dest_nbr(nbr, iface);
    nbr.last_sent_dbdesc = Some(packet.clone());
    transmit(iface, instance, &packet, &dst);

    // Start retransmission interval in two cases:
    // * The router is master
    // * When sending the initial database description packet
    if nbr.dd_flags.intersects(DbDescFlags::MS | DbDescFlags::I) {
        nbr.rxmt_dbdesc_start(iface, area, instance);
    }
}

pub(crate) fn rxmt_dbdesc(
    nbr: &Neighbor,
    iface: &mut Interface,
    instance: &InstanceUpView<'_>,
) {
    if let Some(packet) = nbr.last_sent_dbdesc.clone() {
        let dst = send_dest_nbr(nbr, iface);
        transmit(iface, instance, &packet, &dst);
    }
}

// ===== LS Request packets =====

pub(crate) fn send_lsreq(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    // Calculate maximum packet size.
    let max_size = iface.max_packet_size() - PacketHdr::LENGTH;

    // Append as many LS Request entries as possible in a single packet.
    let mut total = 0;
    while total + LsRequest::ENTRY_LENGTH < max_size {
        match nbr.lists.ls_request.pop_first() {
            Some((lsa_key, lsa_hdr)) => {
                nbr.lists.ls_request_pending.insert(lsa_key, lsa_hdr);
                total += LsRequest::ENTRY_LENGTH;
            }
            None => break,
        }
    }

    send_lsreq_pending(nbr, iface, area, instance);

    // Start retransmission interval.
    nbr.rxmt_lsreq_start(iface, area, instance);
}

pub(crate) fn rxmt_lsreq(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    send_lsreq_pending(nbr, iface, area, instance);
}

fn send_lsreq_pending(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    // Generate Link State Request packet.
    let pkt_hdr = PacketHdr::new(
        PacketType::LsRequest,
        instance.state.router_id,
        area.area_id,
    );
    let entries = nbr.lists.ls_request_pending.keys().copied().collect();
    let packet = Packet::LsRequest(LsRequest {
        hdr: pkt_hdr,
        entries,
    });

    let dst = send_dest_nbr(nbr, iface);
    transmit(iface, instance, &packet, &dst);
}

// ===== LS Update packets =====

pub(crate) fn send_lsupd(
    nbr_idx: Option<NeighborIndex>,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
) {
    // Initialize destination address(es).
    let dst = send_dest_iface(iface, neighbors);

    // Calculate maximum packet size.
    let max_size = iface.max_packet_size()
        - PacketHdr::LENGTH
        - LsUpdate::BASE_LENGTH;

    // Get list of LSAs enqueued for transmission.
    let ls_update_list = match nbr_idx {
        Some(nbr_idx) => {
            let nbr = &mut neighbors[nbr_idx];
            &mut nbr.lists.ls_update
        }
        None => &mut iface.state.ls_update_list,
    };
    let mut ls_update_list = std::mem::take(ls_update_list);
    let now = instance.tx.timers.now();

    // Send as many LS Updates as necessary.
    while !ls_update_list.is_empty() {
        // Append as many LSAs as possible in a single packet.
        let mut total = 0;
        let mut lsas = vec![];
        while let Some(o) = ls_update_list.first_entry() {
            let lsa = o.get();
            // If a single LSA is bigger than the maximum packet size,
            // there's nothing we can do other than relying on IP-level
            // fragmentation.
            if lsa.hdr.length <= max_size && total + lsa.hdr.length > max_size
            {
                break;
            }
            total += lsa.hdr.length;

            // Update LSA age before transmission.
            let lsa = o.remove();
            let mut lsa = (*lsa).clone();
            let age = std::cmp::min(
                lsa.age(now).saturating_add(iface.config.transmit_delay),
                lsdb::LSA_MAX_AGE,
            );
            lsa.set_age(age, Some(now));
            lsas.push(lsa);
        }

        // Generate Link State Update packet.
        let pkt_hdr = PacketHdr::new(
            PacketType::LsUpdate,
            instance.state.router_id,
            area.area_id,
        );
        let packet = Packet::LsUpdate(LsUpdate { hdr: pkt_hdr, lsas });

        transmit(iface, instance, &packet, &dst);
    }
}

pub(crate) fn rxmt_lsupd(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    let dst = send_dest_nbr(nbr, iface);

    // Calculate maximum packet size.
    let max_size = iface.max_packet_size()
        - PacketHdr::LENGTH
        - LsUpdate::BASE_LENGTH;

    // Append as many LSAs as possible in a single packet.
    let now = instance.tx.timers.now();
    let mut total = 0;
    let mut lsas = vec![];
    for lsa in nbr.lists.ls_rxmt.values() {
        if lsa.hdr.length <= max_size && total + lsa.hdr.length > max_size {
            break;
        }
        total += lsa.hdr.length;

        // Update LSA age before transmission.
        let mut lsa = (**lsa).clone();
        let age = std::cmp::min(
            lsa.age(now).saturating_add(iface.config.transmit_delay),
            lsdb::LSA_MAX_AGE,
        );
        lsa.set_age(age, Some(now));
        lsas.push(lsa);
    }

    // Generate Link State Update packet.
    let pkt_hdr = PacketHdr::new(
        PacketType::LsUpdate,
        instance.state.router_id,
        area.area_id,
    );
    let packet = Packet::LsUpdate(LsUpdate { hdr: pkt_hdr, lsas });

    transmit(iface, instance, &packet, &dst);
}

// ===== LS Ack packets =====

pub(crate) fn send_lsack_direct(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
) {
    // Generate Link State Ack packet.
    let pkt_hdr = PacketHdr::new(
        PacketType::LsAck,
        instance.state.router_id,
        area.area_id,
    );
    let packet = Packet::LsAck(LsAck {
        hdr: pkt_hdr,
        lsa_hdrs: vec![*lsa_hdr],
    });

    let dst = send_dest_nbr(nbr, iface);
    transmit(iface, instance, &packet, &dst);
}

pub(crate) fn send_lsack_delayed(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
) {
    // Initialize destination address(es).
    let dst = send_dest_iface(iface, neighbors);

    // Calculate maximum packet size.
    let max_size = iface.max_packet_size() - PacketHdr::LENGTH;

    // Send as many LS Acks as necessary.
    while !iface.state.ls_ack_list.is_empty() {
        // Append as many LSA headers as possible in a single packet.
        let mut total = 0;
        let mut lsa_hdrs = vec![];
        while total + LsaHdr::LENGTH <= max_size {
            match iface.state.ls_ack_list.pop_first() {
                Some((_, lsa_hdr)) => {
                    total += LsaHdr::LENGTH;
                    lsa_hdrs.push(lsa_hdr);
                }
                None => break,
            }
        }

        // Generate Link State Ack packet.
        let pkt_hdr = PacketHdr::new(
            PacketType::LsAck,
            instance.state.router_id,
            area.area_id,
        );
        let packet = Packet::LsAck(LsAck {
            hdr: pkt_hdr,
            lsa_hdrs,
        });

        transmit(iface, instance, &packet, &dst);
    }
}

// ===== helper functions =====

// Returns destination used to send a packet directly to the given neighbor.
fn send_dest_nbr(
    nbr: &Neighbor,
    iface: &Interface,
) -> SmallVec<[Ipv4Addr; 4]> {
    match iface.config.if_type {
        InterfaceType::PointToPoint => {
            smallvec![MulticastAddr::AllSpfRtrs.addr()]
        }
        InterfaceType::VirtualLink => smallvec![Ipv4Addr::UNSPECIFIED],
        _ => smallvec![nbr.src],
    }
}

// Returns a destination used to send a packet to all adjacent neighbors
// associated with the given interface.
fn send_dest_iface(
    iface: &Interface,
    neighbors: &Arena<Neighbor>,
) -> SmallVec<[Ipv4Addr; 4]> {
    match iface.config.if_type {
        InterfaceType::Broadcast => {
            let addr = if matches!(
                iface.state.ism_state,
                ism::State::Dr | ism::State::Backup
            ) {
                MulticastAddr::AllSpfRtrs
            } else {
                MulticastAddr::AllDrRtrs
            };
            smallvec![addr.addr()]
        }
        InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
            // On non-broadcast networks, separate LS Update and delayed LS
            // Ack packets must be sent, as unicasts, to each adjacent
            // neighbor.
            iface
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Exchange)
                .map(|nbr| nbr.src)
                .collect()
        }
        InterfaceType::PointToPoint => {
            smallvec![MulticastAddr::AllSpfRtrs.addr()]
        }
        InterfaceType::VirtualLink => smallvec![Ipv4Addr::UNSPECIFIED],
        InterfaceType::Loopback => SmallVec::new(),
    }
}

// Encodes the packet, wraps it in an IP datagram and hands it to the
// platform once per destination.
fn transmit(
    iface: &mut Interface,
    instance: &InstanceUpView<'_>,
    packet: &Packet,
    dst: &[Ipv4Addr],
) {
    Debug::PacketTx(iface.phyint, packet).log();

    let now_secs = instance.tx.timers.now().as_secs() as u32;
    let data = {
        let auth = iface.auth_encode_ctx(now_secs);
        packet.encode(auth)
    };

    send_encoded(iface, instance, &data, dst);
}

fn send_encoded(
    iface: &Interface,
    instance: &InstanceUpView<'_>,
    data: &[u8],
    dst: &[Ipv4Addr],
) {
    if iface.config.if_type == InterfaceType::VirtualLink {
        // Virtual links send through a next-hop lookup the platform owns.
        let Some(vlink) = &iface.vlink else {
            return;
        };
        let (Some(src), Some(dst)) = (vlink.src_addr, vlink.dst_addr) else {
            return;
        };
        let hdr = Ipv4Hdr::new(0, 64, IPPROTO_OSPF, src, dst);
        instance.tx.sys.sendpkt_vl(&hdr.build_packet(data));
        return;
    }

    for addr in dst {
        let hdr = Ipv4Hdr::new(0, 1, IPPROTO_OSPF, iface.addr, *addr);
        instance.tx.sys.sendpkt(
            &hdr.build_packet(data),
            iface.phyint,
            SendGateway::Direct,
        );
    }
}
