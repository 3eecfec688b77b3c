//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::collections::{AreaId, Arena, Interfaces, Lsdb};
use crate::instance::InstanceCfg;
use crate::interface::Interface;
use crate::packet::Options;
use crate::route::{PathType, RouteNet, RouteRtr};
use crate::spf::{Vertex, VertexId};

#[derive(Debug)]
pub struct Area {
    pub id: AreaId,
    pub area_id: Ipv4Addr,
    pub cfg_gen: u32,
    pub config: AreaCfg,
    // Configured address ranges.
    pub ranges: BTreeMap<Ipv4Network, Range>,
    // Configured directly attached hosts.
    pub hosts: BTreeMap<Ipv4Network, Host>,
    // Interfaces attached to this area.
    pub interfaces: Interfaces,
    pub state: AreaState,
}

#[derive(Debug)]
pub struct AreaCfg {
    pub stub: bool,
    // Cost of the default summary advertised into a stub area.
    pub default_cost: u32,
    pub import_summaries: bool,
    pub demand: bool,
}

#[derive(Debug, Default)]
pub struct AreaState {
    // Area-scope LSDB.
    pub lsdb: Lsdb,
    // Shortest-path tree from the last SPF run.
    pub spt: BTreeMap<VertexId, Vertex>,
    // Intra-area routes to routers (ABRs and ASBRs).
    pub routers: BTreeMap<Ipv4Addr, RouteRtr>,
    // Whether the area can carry data traffic that neither originates nor
    // terminates in the area itself.
    pub transit_capability: bool,
    pub spf_run_count: u32,
}

#[derive(Debug)]
pub struct Range {
    pub no_advertise: bool,
    pub cfg_gen: u32,
}

#[derive(Debug)]
pub struct Host {
    pub cost: u16,
    pub cfg_gen: u32,
}

// ===== impl Area =====

impl Area {
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Area {
        Area {
            id,
            area_id,
            cfg_gen: 0,
            config: AreaCfg {
                stub: false,
                default_cost: 1,
                import_summaries: true,
                demand: false,
            },
            ranges: Default::default(),
            hosts: Default::default(),
            interfaces: Default::default(),
            state: Default::default(),
        }
    }

    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }

    // An area is active when at least one of its interfaces is up.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    pub(crate) fn active_interface_count(
        &self,
        interfaces: &Arena<Interface>,
    ) -> usize {
        self.interfaces
            .iter(interfaces)
            .filter(|iface| !iface.is_down())
            .count()
    }

    // Options advertised in packets and LSAs originated into this area.
    pub(crate) fn options(&self, config: &InstanceCfg) -> Options {
        let mut options = Options::empty();
        if !self.config.stub {
            options.insert(Options::E);
        }
        if config.mospf_enabled {
            options.insert(Options::MC);
        }
        options.insert(Options::O);
        options
    }

    // Returns the configured range containing the given network, if any.
    pub(crate) fn find_range(&self, prefix: &Ipv4Network) -> Option<(&Ipv4Network, &Range)> {
        self.ranges
            .iter()
            .find(|(range, _)| range.is_supernet_of(*prefix))
    }

    // Number of reachable routers in the area.
    pub(crate) fn reachable_router_count(&self) -> usize {
        self.state.routers.len()
    }
}

// ===== global functions =====

// Computes the inter-area summaries advertised into the given area, derived
// from the routing table. Called at the end of each routing table
// calculation; the caller originates the returned LSAs and flushes stale
// ones.
//
// Contained intra-area routes are collapsed into configured ranges unless
// the range is marked "no-advertise".
pub(crate) fn compute_summaries(
    area_id: AreaId,
    rib: &BTreeMap<Ipv4Network, RouteNet>,
    areas: &crate::collections::Areas,
    asbrs: &BTreeMap<Ipv4Addr, RouteRtr>,
) -> Vec<(Ipv4Addr, crate::packet::lsa::LsaBody)> {
    let mut summaries = vec![];
    let Ok((_, area)) = areas.get_by_id(area_id) else {
        return summaries;
    };

    // Inter-area routing information is not advertised into stub areas
    // beyond the default summary, and only ABRs originate summaries at all.
    if !area.config.import_summaries {
        if area.config.stub {
            summaries.push((
                Ipv4Addr::UNSPECIFIED,
                crate::packet::lsa::LsaBody::SummaryNetwork(
                    crate::packet::lsa::LsaSummary {
                        mask: Ipv4Addr::UNSPECIFIED,
                        metric: area.config.default_cost,
                    },
                ),
            ));
        }
        return summaries;
    }

    // Summarize network routes, collapsing ranges.
    let mut advertised: BTreeMap<Ipv4Network, u32> = BTreeMap::new();
    for (prefix, route) in rib.iter() {
        // Only intra-area and inter-area routes are summarized, and
        // inter-area routes are never re-advertised into the backbone.
        match route.path_type {
            PathType::IntraArea => (),
            PathType::InterArea => {
                if area.is_backbone() {
                    continue;
                }
            }
            _ => continue,
        }

        // Do not advertise a route back into its own area.
        if route.area_id == Some(area.area_id) {
            continue;
        }

        // Check whether the route falls into a configured range of its
        // source area.
        let src_area = route
            .area_id
            .and_then(|src_area_id| areas.get_by_area_id(src_area_id))
            .map(|(_, area)| area);
        if let Some(src_area) = src_area
            && let Some((range, range_cfg)) = src_area.find_range(prefix)
        {
            if range_cfg.no_advertise {
                continue;
            }
            // Advertise the whole range at the cost of its most expensive
            // component.
            let entry = advertised.entry(*range).or_insert(0);
            *entry = (*entry).max(route.metric);
            continue;
        }

        advertised.insert(*prefix, route.metric);
    }

    for (prefix, metric) in advertised {
        summaries.push((
            prefix.ip(),
            crate::packet::lsa::LsaBody::SummaryNetwork(
                crate::packet::lsa::LsaSummary {
                    mask: prefix.mask(),
                    metric,
                },
            ),
        ));
    }

    // Summarize routes to ASBRs (type-4 summaries).
    for (router_id, route) in asbrs.iter() {
        if route.area_id == area.area_id {
            continue;
        }
        summaries.push((
            *router_id,
            crate::packet::lsa::LsaBody::SummaryRouter(
                crate::packet::lsa::LsaSummary {
                    mask: Ipv4Addr::BROADCAST,
                    metric: route.metric,
                },
            ),
        ));
    }

    summaries
}
