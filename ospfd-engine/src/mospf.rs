//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! MOSPF multicast forwarding-cache computation (RFC 1584).
//!
//! Cache entries are built on demand when a multicast datagram arrives for
//! a (source, group) pair with no existing entry, and are invalidated
//! whenever the LSDB changes.

use std::net::Ipv4Addr;

use crate::config::McFwdMode;
use crate::debug::Debug;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::packet::lsa::{GmVertexType, LsaTypeCode};
use crate::route;
use crate::sys::{MCacheDownstream, MCacheEntry};

// ===== global functions =====

// Computes (or returns the cached) multicast forwarding cache entry for
// the given datagram source and destination group.
pub(crate) fn mclookup(
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
    src: Ipv4Addr,
    group: Ipv4Addr,
) -> MCacheEntry {
    if let Some(entry) = instance.state.mospf_cache.get(&(src, group)) {
        return entry.clone();
    }

    let entry = build_cache_entry(instance, arenas, src, group);
    Debug::McCacheBuild(src, group).log();

    instance.tx.sys.add_mcache(src, group, &entry);
    instance
        .state
        .mospf_cache
        .insert((src, group), entry.clone());

    entry
}

// Invalidates the whole multicast forwarding cache. Entries are rebuilt
// lazily on the next matching datagram.
pub(crate) fn cache_invalidate(instance: &mut InstanceUpView<'_>) {
    if instance.state.mospf_cache.is_empty() {
        return;
    }

    Debug::McCacheInvalidate.log();
    for (src, group) in
        std::mem::take(&mut instance.state.mospf_cache).into_keys()
    {
        instance.tx.sys.del_mcache(src, group);
    }
}

// ===== helper functions =====

// Runs the RFC 1584 "up-tree" computation: the upstream interface is the
// reverse-path interface toward the datagram source; downstream interfaces
// are those leading to group members, found in the local group database
// and in the area's group-membership-LSAs.
fn build_cache_entry(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    src: Ipv4Addr,
    group: Ipv4Addr,
) -> MCacheEntry {
    if !instance.config.mospf_enabled {
        return MCacheEntry::default();
    }

    // Identify the source network via the source address.
    let Some((_, src_route)) = route::best_match(&instance.state.rib, src)
    else {
        // Unreachable source: install a negative cache entry so that
        // subsequent datagrams are dropped cheaply.
        return MCacheEntry::default();
    };
    let upstream: Vec<i32> = src_route
        .nexthops
        .values()
        .map(|nexthop| nexthop.phyint)
        .collect();

    // Collect the routers and transit networks that advertised membership
    // for this group.
    let mut member_rtrs: std::collections::BTreeSet<Ipv4Addr> =
        Default::default();
    let mut member_nets: std::collections::BTreeSet<Ipv4Addr> =
        Default::default();
    for area in arenas.areas.iter() {
        for (_, lse) in area.state.lsdb.iter_by_type(
            &arenas.lsa_entries,
            LsaTypeCode::GroupMembership.into(),
        ) {
            if lse.data.hdr.lsa_id != group || lse.data.hdr.is_maxage() {
                continue;
            }
            let Some(gm) = lse.data.body.as_group_membership() else {
                continue;
            };
            for entry in &gm.entries {
                match entry.vertex_type {
                    GmVertexType::Router => {
                        member_rtrs.insert(entry.vertex_id);
                    }
                    GmVertexType::TransitNetwork => {
                        member_nets.insert(entry.vertex_id);
                    }
                }
            }
        }
    }

    // Derive the downstream (interface, neighbor, TTL) tuples.
    let mut downstream = vec![];
    for area in arenas.areas.iter() {
        for iface in area
            .interfaces
            .iter(&arenas.interfaces)
            .filter(|iface| !iface.is_down())
            .filter(|iface| iface.config.mc_fwd != McFwdMode::Blocked)
            .filter(|iface| !upstream.contains(&iface.phyint))
        {
            // Local members on the attached network.
            let local_members =
                iface.state.group_membership.contains(&group);

            // A downstream neighbor that leads to a member, per the
            // area's shortest-path tree.
            let nbr_toward_member = iface
                .state
                .neighbors
                .iter(&arenas.neighbors)
                .find(|nbr| {
                    nbr.state == crate::neighbor::nsm::State::Full
                        && (member_rtrs.contains(&nbr.router_id)
                            || area.state.spt.keys().any(|vid| {
                                matches!(vid,
                                    crate::spf::VertexId::Network(net)
                                        if member_nets.contains(net))
                            }))
                });

            if local_members || nbr_toward_member.is_some() {
                downstream.push(MCacheDownstream {
                    phyint: iface.phyint,
                    nbr_addr: match iface.config.mc_fwd {
                        // Unicast mode sends a separate copy to each
                        // downstream neighbor.
                        McFwdMode::Unicast => {
                            nbr_toward_member.map(|nbr| nbr.src)
                        }
                        _ => None,
                    },
                    ttl_threshold: 1,
                });
            }
        }
    }

    MCacheEntry {
        upstream,
        downstream,
        valid: true,
    }
}
