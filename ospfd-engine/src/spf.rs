//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use crate::area::Area;
use crate::collections::{AreaIndex, Arena, InterfaceIndex};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView, ProtocolMsg};
use crate::interface::Interface;
use crate::lsdb::LsaEntry;
use crate::neighbor::Neighbor;
use crate::packet::lsa::{
    Lsa, LsaKey, LsaRouterLinkType, LsaTypeCode,
};
use crate::route::{Nexthop, Nexthops};

// What caused an SPF run to be scheduled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpfTrigger {
    LsaChange,
    ConfigChange,
    GrExit,
}

// SPF vertex identifier.
//
// Network vertices sort before router vertices so that, on equal cost,
// networks are pulled from the candidate list first (RFC 2328 section
// 16.1, step 2c).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum VertexId {
    Network(Ipv4Addr),
    Router(Ipv4Addr),
}

// SPF vertex.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub id: VertexId,
    pub lsa: Arc<Lsa>,
    pub distance: u32,
    pub hops: u16,
    pub nexthops: Nexthops,
}

// Link extracted from a vertex's LSA.
#[derive(Clone, Copy, Debug)]
struct SpfLink {
    id: VertexId,
    cost: u16,
    // For links departing the root: the root's own interface address.
    link_data: Option<Ipv4Addr>,
}

// ===== global functions =====

// Schedules an SPF run. The delay collapses bursts of LSDB changes into a
// single computation.
pub(crate) fn schedule(instance: &mut InstanceUpView<'_>, trigger: SpfTrigger) {
    // SPF and routing-table updates are frozen for the duration of a
    // graceful restart so that the pre-restart forwarding state survives.
    if instance.state.gr_restart.is_some() {
        return;
    }

    if instance.state.spf_delay_timer.is_some() {
        return;
    }

    Debug::SpfScheduled(trigger).log();

    // A zero delay still goes through the timer wheel: the run happens on
    // the next clock advance, collapsing bursts of triggers into a single
    // computation.
    let delay = Duration::from_millis(instance.config.spf_delay_ms as u64);
    let task = instance.tx.timers.timeout(delay, ProtocolMsg::SpfTimer);
    instance.state.spf_delay_timer = Some(task);
}

// This is the SPF main function.
pub(crate) fn run(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    instance.state.spf_delay_timer = None;

    // Run Dijkstra in every attached area.
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        run_area(
            area_idx,
            instance,
            &mut arenas.areas,
            &arenas.interfaces,
            &arenas.neighbors,
            &arenas.lsa_entries,
        );
    }

    // Update statistics.
    instance.state.spf_run_count += 1;
    Debug::SpfRun(instance.state.spf_run_count).log();

    // Resolve virtual links through their transit areas.
    resolve_virtual_links(arenas);

    // Rebuild the routing table from the new shortest-path trees.
    crate::route::update_rib(instance, arenas);
}

// ===== helper functions =====

fn run_area(
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    areas: &mut crate::collections::Areas,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let area = &mut areas[area_idx];
    area.state.transit_capability = false;

    // Get root vertex.
    let root_vid = VertexId::Router(instance.state.router_id);
    let root_key = LsaKey::new(
        LsaTypeCode::Router.into(),
        instance.state.router_id,
        instance.state.router_id,
    );
    let root_lsa = match area
        .state
        .lsdb
        .get(lsa_entries, &root_key)
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
    {
        Some((_, lse)) => lse.data.clone(),
        None => {
            Error::SpfRootNotFound(area.area_id).log();
            area.state.spt = Default::default();
            area.state.routers.clear();
            return;
        }
    };
    let root_v = Vertex {
        id: root_vid,
        lsa: root_lsa,
        distance: 0,
        hops: 0,
        nexthops: Default::default(),
    };

    // Initialize SPT and candidate list.
    let mut spt: BTreeMap<VertexId, Vertex> = BTreeMap::new();
    let mut cand_list: BTreeMap<(u32, VertexId), Vertex> = BTreeMap::new();
    cand_list.insert((root_v.distance, root_v.id), root_v);

    // Clear the area's router routing table.
    area.state.routers.clear();

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        // Add vertex to SPT.
        spt.insert(vertex.id, vertex);
        let vertex = spt.get(&vertex_id).unwrap();

        if let Some(router) = vertex.lsa.body.as_router() {
            // Record routes to ABRs and ASBRs.
            if router.flags.intersects(
                crate::packet::lsa::LsaRouterFlags::B
                    | crate::packet::lsa::LsaRouterFlags::E,
            ) && vertex.id != VertexId::Router(instance.state.router_id)
            {
                let route = crate::route::RouteRtr {
                    area_id: area.area_id,
                    flags: router.flags,
                    metric: vertex.distance,
                    nexthops: vertex.nexthops.clone(),
                };
                area.state
                    .routers
                    .insert(vertex.lsa.hdr.adv_rtr, route);
            }

            // Set TransitCapability.
            if router
                .flags
                .contains(crate::packet::lsa::LsaRouterFlags::V)
            {
                area.state.transit_capability = true;
            }
        }

        // Iterate over all links described by the vertex's LSA.
        for link in lsa_links(&vertex.lsa) {
            // Check if the LSAs are mutually linked.
            let Some(link_lsa) = vertex_lsa_find(link.id, area, lsa_entries)
            else {
                continue;
            };
            if !lsa_links(&link_lsa)
                .iter()
                .any(|rlink| rlink.id == vertex.id)
            {
                continue;
            }

            // Check if the link's vertex is already on the shortest-path
            // tree.
            if spt.contains_key(&link.id) {
                continue;
            }

            // Calculate distance to the link's vertex.
            let distance = vertex.distance.saturating_add(link.cost as u32);

            // Increment number of hops to the root.
            let mut hops = vertex.hops;
            if matches!(link.id, VertexId::Router(_)) {
                hops = hops.saturating_add(1);
            }

            // Check if this vertex is already present on the candidate
            // list.
            if let Some((cand_key, cand_distance)) = cand_list
                .iter()
                .find(|(_, cand_v)| cand_v.id == link.id)
                .map(|(cand_key, cand_v)| (*cand_key, cand_v.distance))
            {
                match distance.cmp(&cand_distance) {
                    std::cmp::Ordering::Less => {
                        // Remove vertex since its key has changed. It will
                        // be re-added with the correct key below.
                        cand_list.remove(&cand_key);
                    }
                    std::cmp::Ordering::Equal => {}
                    std::cmp::Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }

            // Compute the nexthops contributed by this link before
            // touching the candidate entry.
            let nexthops = calc_nexthops(
                vertex,
                link,
                &link_lsa,
                area,
                interfaces,
                neighbors,
            );

            let cand_v = cand_list
                .entry((distance, link.id))
                .or_insert_with(|| Vertex {
                    id: link.id,
                    lsa: link_lsa.clone(),
                    distance,
                    hops,
                    nexthops: Default::default(),
                });

            // Merge equal-cost paths, honoring the configured ECMP limit.
            for nexthop in nexthops {
                if cand_v.nexthops.len()
                    >= instance.config.max_paths as usize
                {
                    break;
                }
                cand_v
                    .nexthops
                    .entry((nexthop.phyint, nexthop.addr))
                    .or_insert(nexthop);
            }
        }
    }

    // Update area's SPT.
    area.state.spt = spt;
    area.state.spf_run_count += 1;
}

// Extracts the topological links from a router or network LSA.
fn lsa_links(lsa: &Arc<Lsa>) -> Vec<SpfLink> {
    let mut links = vec![];
    match &lsa.body {
        crate::packet::lsa::LsaBody::Router(router) => {
            for link in &router.links {
                match link.link_type {
                    LsaRouterLinkType::PointToPoint
                    | LsaRouterLinkType::VirtualLink => {
                        links.push(SpfLink {
                            id: VertexId::Router(link.link_id),
                            cost: link.metric,
                            link_data: Some(link.link_data),
                        });
                    }
                    LsaRouterLinkType::TransitNetwork => {
                        links.push(SpfLink {
                            id: VertexId::Network(link.link_id),
                            cost: link.metric,
                            link_data: Some(link.link_data),
                        });
                    }
                    LsaRouterLinkType::StubNetwork => {
                        // Stub links are processed after the SPT is built.
                    }
                }
            }
        }
        crate::packet::lsa::LsaBody::Network(network) => {
            for rtr in &network.attached_rtrs {
                links.push(SpfLink {
                    id: VertexId::Router(*rtr),
                    cost: 0,
                    link_data: None,
                });
            }
        }
        _ => (),
    }
    links
}

// Finds the LSA backing the given vertex.
fn vertex_lsa_find(
    id: VertexId,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> Option<Arc<Lsa>> {
    match id {
        VertexId::Router(router_id) => {
            let key = LsaKey::new(
                LsaTypeCode::Router.into(),
                router_id,
                router_id,
            );
            area.state
                .lsdb
                .get(lsa_entries, &key)
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .map(|(_, lse)| lse.data.clone())
        }
        VertexId::Network(dr_addr) => area
            .state
            .lsdb
            .iter_by_type(lsa_entries, LsaTypeCode::Network.into())
            .filter(|(_, lse)| !lse.data.hdr.is_maxage())
            .find(|(_, lse)| lse.data.hdr.lsa_id == dr_addr)
            .map(|(_, lse)| lse.data.clone()),
    }
}

// Computes the set of nexthops used to reach the given destination vertex.
fn calc_nexthops(
    parent: &Vertex,
    link: SpfLink,
    dest_lsa: &Arc<Lsa>,
    area: &Area,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) -> Vec<Nexthop> {
    let mut nexthops = vec![];

    if parent.hops == 0 && parent.nexthops.is_empty() {
        // The parent vertex is the root: the link departs a local
        // interface identified by the link data.
        let Some(link_data) = link.link_data else {
            return nexthops;
        };
        let Some(iface) = area
            .interfaces
            .iter(interfaces)
            .find(|iface| iface.addr == link_data)
        else {
            return nexthops;
        };

        match link.id {
            VertexId::Network(_) => {
                // Directly attached network.
                nexthops.push(Nexthop {
                    phyint: iface.phyint,
                    iface_id: iface.id,
                    if_addr: iface.addr,
                    addr: None,
                    nbr_router_id: None,
                });
            }
            VertexId::Router(router_id) => {
                // Point-to-point or virtual neighbor: deliver to the
                // neighbor's source address.
                let addr = iface
                    .state
                    .neighbors
                    .iter(neighbors)
                    .find(|nbr| nbr.router_id == router_id)
                    .map(|nbr| nbr.src);
                nexthops.push(Nexthop {
                    phyint: iface.phyint,
                    iface_id: iface.id,
                    if_addr: iface.addr,
                    addr,
                    nbr_router_id: Some(router_id),
                });
            }
        }
    } else if parent.hops == 0 {
        // The parent is a network that directly connects the calculating
        // router to the destination router: the nexthop address is the
        // destination's interface address on that network.
        let VertexId::Network(net_id) = parent.id else {
            return nexthops;
        };
        let gw = dest_lsa.body.as_router().and_then(|router| {
            router
                .links
                .iter()
                .find(|rlink| {
                    rlink.link_type == LsaRouterLinkType::TransitNetwork
                        && rlink.link_id == net_id
                })
                .map(|rlink| rlink.link_data)
        });
        for nexthop in parent.nexthops.values() {
            nexthops.push(Nexthop {
                phyint: nexthop.phyint,
                iface_id: nexthop.iface_id,
                if_addr: nexthop.if_addr,
                addr: gw,
                nbr_router_id: match link.id {
                    VertexId::Router(router_id) => Some(router_id),
                    VertexId::Network(_) => None,
                },
            });
        }
    } else {
        // There is at least one intervening router: the destination simply
        // inherits the set of next hops from the parent.
        nexthops.extend(parent.nexthops.values().copied());
    }

    nexthops
}

// Marks virtual links operational when their endpoints are reachable
// through the configured transit areas, resolving source and destination
// addresses.
fn resolve_virtual_links(arenas: &mut InstanceArenas) {
    // Collect endpoint data from the transit areas first.
    let mut updates: Vec<(InterfaceIndex, Option<(Ipv4Addr, Ipv4Addr, u32)>)> =
        vec![];

    for area in arenas.areas.iter() {
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            let Some(vlink) = &iface.vlink else {
                continue;
            };

            let resolved = arenas
                .areas
                .get_by_area_id(vlink.transit_area)
                .filter(|(_, transit_area)| !transit_area.config.stub)
                .and_then(|(_, transit_area)| {
                    let route =
                        transit_area.state.routers.get(&vlink.endpoint_id)?;
                    let nexthop = route.nexthops.values().next()?;
                    // The virtual neighbor's address is learned from its
                    // Hello packets once the link comes up; until then the
                    // endpoint's nexthop address is used.
                    let dst = nexthop.addr.unwrap_or(vlink.endpoint_id);
                    Some((nexthop.if_addr, dst, route.metric))
                });
            updates.push((iface_idx, resolved));
        }
    }

    for (iface_idx, resolved) in updates {
        let iface = &mut arenas.interfaces[iface_idx];
        match resolved {
            Some((src, dst, cost)) => {
                if let Some(vlink) = &mut iface.vlink {
                    vlink.src_addr = Some(src);
                    vlink.dst_addr = Some(dst);
                }
                iface.config.cost = cost.min(u16::MAX as u32) as u16;
                iface.system.operational = true;
            }
            None => {
                iface.system.operational = false;
            }
        }
    }
}
