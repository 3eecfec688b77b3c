//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::net::Ipv4Addr;

use bitflags::bitflags;
use ipnetwork::Ipv4Network;

use crate::collections::InterfaceId;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::lsdb;
use crate::packet::lsa::{
    LsaAsExternalFlags, LsaKey, LsaRouterFlags, LsaTypeCode,
};
use crate::spf::VertexId;
use crate::sys::{MPath, MPathEntry};

// Network routing table entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteNet {
    pub area_id: Option<Ipv4Addr>,
    pub origin: Option<LsaKey>,
    pub path_type: PathType,
    pub metric: u32,
    pub type2_metric: Option<u32>,
    pub tag: Option<u32>,
    pub nexthops: Nexthops,
    pub flags: RouteNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RouteNetFlags: u8 {
        const CONNECTED = 0x01;
        const INSTALLED = 0x02;
        const REJECT = 0x04;
    }
}

// Router routing table entry (ABRs and ASBRs).
#[derive(Clone, Debug)]
pub struct RouteRtr {
    pub area_id: Ipv4Addr,
    pub flags: LsaRouterFlags,
    pub metric: u32,
    pub nexthops: Nexthops,
}

// OSPF path types in decreasing order of preference.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathType {
    IntraArea,
    InterArea,
    Type1External,
    Type2External,
}

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Nexthop {
    pub phyint: i32,
    pub iface_id: InterfaceId,
    pub if_addr: Ipv4Addr,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
    // Router-ID of the remote neighbor (`None` for connected routes).
    pub nbr_router_id: Option<Ipv4Addr>,
}

// Ordered list of nexthops, keyed so that equal-cost merges are
// deterministic regardless of insertion order.
pub type Nexthops = BTreeMap<(i32, Option<Ipv4Addr>), Nexthop>;

// ===== impl RouteNet =====

impl RouteNet {
    pub(crate) fn metric(&self) -> u32 {
        self.metric
    }

    // Printable path type for the monitor protocol.
    pub(crate) fn type_str(&self) -> &'static str {
        match self.path_type {
            PathType::IntraArea => "SPF",
            PathType::InterArea => "SPIA",
            PathType::Type1External => "SPE1",
            PathType::Type2External => "SPE2",
        }
    }
}

// ===== global functions =====

// Longest-prefix-match lookup.
//
// Applied to a fixed routing table, the result is independent of route
// insertion order: prefixes are compared from most to least specific, and
// the table itself is an ordered map.
pub fn best_match(
    rib: &BTreeMap<Ipv4Network, RouteNet>,
    addr: Ipv4Addr,
) -> Option<(&Ipv4Network, &RouteNet)> {
    for plen in (0..=32).rev() {
        let Ok(prefix) = Ipv4Network::new(addr, plen) else {
            continue;
        };
        let prefix = apply_mask(prefix);
        if let Some((prefix, route)) = rib.get_key_value(&prefix) {
            // Unreachable and rejected entries do not match.
            if route.nexthops.is_empty()
                && !route.flags.contains(RouteNetFlags::CONNECTED)
            {
                continue;
            }
            if route.flags.contains(RouteNetFlags::REJECT) {
                return None;
            }
            return Some((prefix, route));
        }
    }

    None
}

fn apply_mask(prefix: Ipv4Network) -> Ipv4Network {
    Ipv4Network::new(prefix.network(), prefix.prefix()).unwrap()
}

// Rebuilds the routing table from the areas' shortest-path trees, then
// synchronizes the platform's forwarding table.
pub(crate) fn update_rib(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let mut new_rib: BTreeMap<Ipv4Network, RouteNet> = BTreeMap::new();
    let router_id = instance.state.router_id;
    let max_paths = instance.config.max_paths;

    // 1) Intra-area routes (RFC 2328 section 16.1).
    for area in arenas.areas.iter() {
        for vertex in area.state.spt.values() {
            match vertex.id {
                VertexId::Network(_) => {
                    let Some(network) = vertex.lsa.body.as_network() else {
                        continue;
                    };
                    let Some(prefix) = ospfd_utils::ip::network_from_mask(
                        vertex.lsa.hdr.lsa_id,
                        network.mask,
                    ) else {
                        continue;
                    };

                    let mut flags = RouteNetFlags::empty();
                    if vertex
                        .nexthops
                        .values()
                        .any(|nexthop| nexthop.addr.is_none())
                    {
                        flags.insert(RouteNetFlags::CONNECTED);
                    }
                    let route = RouteNet {
                        area_id: Some(area.area_id),
                        origin: Some(vertex.lsa.hdr.key()),
                        path_type: PathType::IntraArea,
                        metric: vertex.distance,
                        type2_metric: None,
                        tag: None,
                        nexthops: vertex.nexthops.clone(),
                        flags,
                    };
                    route_update(&mut new_rib, prefix, route, max_paths);
                }
                VertexId::Router(vertex_router_id) => {
                    // Stub links contribute leaf routes.
                    let Some(router) = vertex.lsa.body.as_router() else {
                        continue;
                    };
                    for link in router.links.iter().filter(|link| {
                        link.link_type
                            == crate::packet::lsa::LsaRouterLinkType::StubNetwork
                    }) {
                        let Some(prefix) = ospfd_utils::ip::network_from_mask(
                            link.link_id,
                            link.link_data,
                        ) else {
                            continue;
                        };

                        let mut flags = RouteNetFlags::empty();
                        let nexthops = if vertex_router_id == router_id {
                            // Our own stub link: directly attached.
                            flags.insert(RouteNetFlags::CONNECTED);
                            connected_nexthops(area, arenas, prefix)
                        } else {
                            vertex.nexthops.clone()
                        };

                        let route = RouteNet {
                            area_id: Some(area.area_id),
                            origin: Some(vertex.lsa.hdr.key()),
                            path_type: PathType::IntraArea,
                            metric: vertex
                                .distance
                                .saturating_add(link.metric as u32),
                            type2_metric: None,
                            tag: None,
                            nexthops,
                            flags,
                        };
                        route_update(&mut new_rib, prefix, route, max_paths);
                    }
                }
            }
        }
    }

    // 2) Inter-area routes (section 16.2).
    for area in arenas.areas.iter() {
        for (_, lse) in area.state.lsdb.iter_by_type(
            &arenas.lsa_entries,
            LsaTypeCode::SummaryNetwork.into(),
        ) {
            let lsa = &lse.data;
            if lsa.hdr.is_maxage()
                || lsa.hdr.adv_rtr == router_id
            {
                continue;
            }
            let Some(summary) = lsa.body.as_summary_network() else {
                continue;
            };
            if summary.metric >= lsdb::LSA_INFINITY {
                continue;
            }
            let Some(prefix) = ospfd_utils::ip::network_from_mask(
                lsa.hdr.lsa_id,
                summary.mask,
            ) else {
                continue;
            };

            // The advertising ABR must be reachable within the area.
            let Some(abr) = area
                .state
                .routers
                .get(&lsa.hdr.adv_rtr)
                .filter(|abr| abr.flags.contains(LsaRouterFlags::B))
            else {
                continue;
            };

            let route = RouteNet {
                area_id: Some(area.area_id),
                origin: Some(lsa.hdr.key()),
                path_type: PathType::InterArea,
                metric: abr.metric.saturating_add(summary.metric),
                type2_metric: None,
                tag: None,
                nexthops: abr.nexthops.clone(),
                flags: RouteNetFlags::empty(),
            };
            route_update(&mut new_rib, prefix, route, max_paths);
        }
    }

    // 3) Routes to ASBRs, intra-area and inter-area (section 16.2 applied
    // to type-4 summaries).
    let mut asbrs: BTreeMap<Ipv4Addr, RouteRtr> = BTreeMap::new();
    for area in arenas.areas.iter() {
        for (asbr_id, route) in area
            .state
            .routers
            .iter()
            .filter(|(_, route)| route.flags.contains(LsaRouterFlags::E))
        {
            match asbrs.entry(*asbr_id) {
                btree_map::Entry::Vacant(v) => {
                    v.insert(route.clone());
                }
                btree_map::Entry::Occupied(mut o) => {
                    if route.metric < o.get().metric {
                        o.insert(route.clone());
                    }
                }
            }
        }

        for (_, lse) in area.state.lsdb.iter_by_type(
            &arenas.lsa_entries,
            LsaTypeCode::SummaryRouter.into(),
        ) {
            let lsa = &lse.data;
            if lsa.hdr.is_maxage() || lsa.hdr.adv_rtr == router_id {
                continue;
            }
            let Some(summary) = lsa.body.as_summary_router() else {
                continue;
            };
            if summary.metric >= lsdb::LSA_INFINITY {
                continue;
            }
            let Some(abr) = area
                .state
                .routers
                .get(&lsa.hdr.adv_rtr)
                .filter(|abr| abr.flags.contains(LsaRouterFlags::B))
            else {
                continue;
            };

            let metric = abr.metric.saturating_add(summary.metric);
            let candidate = RouteRtr {
                area_id: area.area_id,
                flags: LsaRouterFlags::E,
                metric,
                nexthops: abr.nexthops.clone(),
            };
            match asbrs.entry(lsa.hdr.lsa_id) {
                btree_map::Entry::Vacant(v) => {
                    v.insert(candidate);
                }
                btree_map::Entry::Occupied(mut o) => {
                    if metric < o.get().metric {
                        o.insert(candidate);
                    }
                }
            }
        }
    }

    // 4) AS-external routes (section 16.4), with forwarding address
    // resolution.
    for (lsa, prefix) in
        lsdb::external_lsas(&instance.state.lsdb, &arenas.lsa_entries)
    {
        if lsa.hdr.adv_rtr == router_id {
            continue;
        }
        let Some(ext) = lsa.body.as_as_external() else {
            continue;
        };
        if ext.metric >= lsdb::LSA_INFINITY {
            continue;
        }

        // Resolve the path to the LSA's origin.
        let (base_metric, nexthops) = match ext.fwd_addr {
            Some(fwd_addr) => {
                // The forwarding address must be reachable via an
                // intra-area or inter-area path.
                let Some((_, fwd_route)) = best_match(&new_rib, fwd_addr)
                    .filter(|(_, route)| {
                        matches!(
                            route.path_type,
                            PathType::IntraArea | PathType::InterArea
                        )
                    })
                else {
                    continue;
                };
                // Forward through the route toward the forwarding address,
                // pointing each nexthop at it when directly attached.
                let nexthops = fwd_route
                    .nexthops
                    .values()
                    .map(|nexthop| {
                        let mut nexthop = *nexthop;
                        if nexthop.addr.is_none() {
                            nexthop.addr = Some(fwd_addr);
                        }
                        nexthop
                    })
                    .map(|nexthop| ((nexthop.phyint, nexthop.addr), nexthop))
                    .collect();
                (fwd_route.metric, nexthops)
            }
            None => {
                let Some(asbr) = asbrs.get(&lsa.hdr.adv_rtr) else {
                    continue;
                };
                (asbr.metric, asbr.nexthops.clone())
            }
        };

        let type2 = ext.flags.contains(LsaAsExternalFlags::E);
        let route = RouteNet {
            area_id: None,
            origin: Some(lsa.hdr.key()),
            path_type: if type2 {
                PathType::Type2External
            } else {
                PathType::Type1External
            },
            metric: if type2 {
                base_metric
            } else {
                base_metric.saturating_add(ext.metric)
            },
            type2_metric: type2.then_some(ext.metric),
            tag: Some(ext.tag),
            nexthops,
            flags: RouteNetFlags::empty(),
        };
        route_update(&mut new_rib, prefix, route, max_paths);
    }

    // Synchronize the platform's forwarding table and store the new RIB.
    let old_rib = std::mem::take(&mut instance.state.rib);
    update_global_rib(&mut new_rib, old_rib, instance);
    instance.state.rib = new_rib;

    // Reclaim remnant kernel routes the engine would not have installed.
    let remnants = std::mem::take(&mut instance.state.remnants);
    for remnant in remnants {
        if !instance.state.rib.contains_key(&remnant) {
            instance.tx.sys.rtdel(remnant, None);
        }
    }

    // (Re)originate inter-area summaries derived from the new table.
    lsdb::update_all_summaries(instance, arenas, &asbrs);

    // Refresh group-membership origination (DR status may have changed)
    // and let MOSPF rebuild its cache lazily.
    crate::mospf::cache_invalidate(instance);
}

// Nexthops for a directly attached network.
fn connected_nexthops(
    area: &crate::area::Area,
    arenas: &InstanceArenas,
    prefix: Ipv4Network,
) -> Nexthops {
    area.interfaces
        .iter(&arenas.interfaces)
        .filter(|iface| !iface.is_down())
        .filter(|iface| iface.network() == Some(prefix))
        .map(|iface| {
            (
                (iface.phyint, None),
                Nexthop {
                    phyint: iface.phyint,
                    iface_id: iface.id,
                    if_addr: iface.addr,
                    addr: None,
                    nbr_router_id: None,
                },
            )
        })
        .collect()
}

// Adds a route to the routing table, merging equal-cost paths and keeping
// only the preferred path type.
fn route_update(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    prefix: Ipv4Network,
    route: RouteNet,
    max_paths: u8,
) {
    let route = match rib.entry(prefix) {
        btree_map::Entry::Occupied(o) => {
            let curr_route = o.into_mut();

            match route_compare(&route, curr_route) {
                Ordering::Less => {
                    // Overwrite the current routing table entry, but
                    // preserve the flag indicating whether the route is
                    // installed or not.
                    let installed =
                        curr_route.flags.contains(RouteNetFlags::INSTALLED);
                    *curr_route = route;
                    if installed {
                        curr_route.flags.insert(RouteNetFlags::INSTALLED);
                    }
                }
                Ordering::Equal => {
                    // Merge nexthops.
                    curr_route.nexthops.extend(route.nexthops);
                }
                Ordering::Greater => {
                    // Ignore less preferred route.
                }
            }

            curr_route
        }
        btree_map::Entry::Vacant(v) => v.insert(route),
    };

    // Honor configured maximum number of ECMP paths.
    if route.nexthops.len() > max_paths as usize {
        route.nexthops = route
            .nexthops
            .iter()
            .map(|(k, v)| (*k, *v))
            .take(max_paths as usize)
            .collect();
    }
}

// Compares two routes for the same destination; ties follow the path type
// ordering intra-area < inter-area < external type-1 < external type-2.
fn route_compare(a: &RouteNet, b: &RouteNet) -> Ordering {
    let cmp = a.path_type.cmp(&b.path_type);
    if cmp != Ordering::Equal {
        return cmp;
    }

    match a.path_type {
        PathType::IntraArea | PathType::InterArea | PathType::Type1External => {
            a.metric.cmp(&b.metric)
        }
        PathType::Type2External => {
            let cmp = a.type2_metric.cmp(&b.type2_metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            a.metric.cmp(&b.metric)
        }
    }
}

// Updates OSPF routes in the platform's forwarding table.
//
// This step is done at the end of the routing table calculation to prevent
// transient states from affecting the forwarding plane.
fn update_global_rib(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    mut old_rib: BTreeMap<Ipv4Network, RouteNet>,
    instance: &mut InstanceUpView<'_>,
) {
    // Install new routes or routes that have changed.
    for (prefix, route) in rib.iter_mut() {
        let mut old_mpath: Option<MPath> = None;

        // Remove route from the old RIB if it's present.
        if let Some(old_route) = old_rib.remove(prefix) {
            // Skip reinstalling the route if it hasn't changed.
            if old_route.metric() == route.metric()
                && old_route.tag == route.tag
                && old_route.nexthops == route.nexthops
            {
                if old_route.flags.contains(RouteNetFlags::INSTALLED) {
                    route.flags.insert(RouteNetFlags::INSTALLED);
                }
                continue;
            }
            if old_route.flags.contains(RouteNetFlags::INSTALLED) {
                old_mpath = Some(mpath_from_nexthops(&old_route.nexthops));
            }
        }

        // Connected routes are the platform's own business; everything
        // else is pushed down.
        if !route.flags.contains(RouteNetFlags::CONNECTED)
            && !route.nexthops.is_empty()
        {
            instance.tx.sys.rtadd(
                *prefix,
                &mpath_from_nexthops(&route.nexthops),
                old_mpath.as_ref(),
                route.flags.contains(RouteNetFlags::REJECT),
            );
            route.flags.insert(RouteNetFlags::INSTALLED);
        } else if route.flags.contains(RouteNetFlags::INSTALLED) {
            instance.tx.sys.rtdel(*prefix, old_mpath.as_ref());
            route.flags.remove(RouteNetFlags::INSTALLED);
        }
    }

    // Uninstall routes that are no longer available.
    for (dest, route) in old_rib
        .into_iter()
        .filter(|(_, route)| route.flags.contains(RouteNetFlags::INSTALLED))
    {
        instance
            .tx
            .sys
            .rtdel(dest, Some(&mpath_from_nexthops(&route.nexthops)));
    }
}

pub(crate) fn mpath_from_nexthops(nexthops: &Nexthops) -> MPath {
    nexthops
        .values()
        .map(|nexthop| MPathEntry {
            phyint: nexthop.phyint,
            if_addr: nexthop.if_addr,
            gw: nexthop.addr,
        })
        .collect()
}
