//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Monitor request servicing.
//!
//! Monitoring is read-only and stateless per request. When `exact` is
//! zero the engine returns the item following the supplied key, enabling
//! full-table walks; a non-zero `retcode` signals "no such item" or "end
//! of table".

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ospfd_monitor::{
    AreaRsp, IfcRsp, LsaRsp, MonHdr, MonRequest, MonResponse, MonRqIfc,
    MonRqLsa, MonRqNbr, MonRqRte, MonRqVL, NbrRsp, OSPF_MON_VERSION, RteHop,
    RteRsp, StatRsp,
};

use crate::area::Area;
use crate::instance::Instance;
use crate::interface::{Interface, InterfaceType, ism};
use crate::neighbor::nsm;
use crate::packet::lsa::{LsaKey, LsaType, LsaTypeCode};

// Version numbers reported in the statistics response.
const VERSION_MAJOR: u8 = 0;
const VERSION_MINOR: u8 = 3;

// ===== impl Instance =====

impl Instance {
    // Services a single monitor request.
    pub fn monitor(
        &mut self,
        hdr: MonHdr,
        request: MonRequest,
    ) -> (MonHdr, MonResponse) {
        let mut rsp_hdr = MonHdr {
            version: OSPF_MON_VERSION,
            retcode: 0,
            exact: hdr.exact,
            id: hdr.id,
        };

        if hdr.version != OSPF_MON_VERSION || self.state.is_none() {
            rsp_hdr.retcode = 1;
            return (rsp_hdr, MonResponse::Empty);
        }

        let exact = hdr.exact != 0;
        let response = match request {
            MonRequest::Stat => Some(self.monitor_stat()),
            MonRequest::Area(rq) => self.monitor_area(rq.area_id, exact),
            MonRequest::Ifc(rq) => self.monitor_ifc(rq, exact),
            MonRequest::VL(rq) => self.monitor_vl(rq, exact),
            MonRequest::Nbr(rq) => self.monitor_nbr(rq, exact),
            MonRequest::Lsa(rq) => self.monitor_lsa(rq, exact),
            MonRequest::Rte(rq) => self.monitor_rte(rq, exact),
            MonRequest::OpqReg => {
                let state = self.state.as_mut().unwrap();
                state.opaque_client = Some(hdr.id);
                Some(MonResponse::Empty)
            }
            MonRequest::OpqNext(rq) => self.monitor_opq_next(rq),
        };

        match response {
            Some(response) => (rsp_hdr, response),
            None => {
                rsp_hdr.retcode = 1;
                (rsp_hdr, MonResponse::Empty)
            }
        }
    }

    fn monitor_stat(&self) -> MonResponse {
        let state = self.state.as_ref().unwrap();
        MonResponse::Stat(StatRsp {
            router_id: state.router_id,
            n_aselsas: state
                .lsdb
                .lsa_count_by_type(LsaTypeCode::AsExternal.into()),
            asexsum: state
                .lsdb
                .cksum_sum_by_type(LsaTypeCode::AsExternal.into()),
            n_ase_import: self.config.ext_routes.len() as u32,
            extdb_limit: self.config.ext_lsdb_limit,
            n_dijkstra: state.spf_run_count,
            n_area: self.arenas.areas.count() as u16,
            n_dbx_nbrs: state.dbx_nbr_count as u16,
            mospf: self.config.mospf_enabled as u8,
            inter_area_mc: self.config.inter_area_mc as u8,
            overflow_state: state.overflow as u8,
            vmajor: VERSION_MAJOR,
            vminor: VERSION_MINOR,
        })
    }

    fn monitor_area(
        &self,
        area_id: Ipv4Addr,
        exact: bool,
    ) -> Option<MonResponse> {
        let area = if exact {
            self.arenas
                .areas
                .get_by_area_id(area_id)
                .map(|(_, area)| area)?
        } else {
            let next_id = self.arenas.areas.next_area_id(area_id)?;
            self.arenas
                .areas
                .get_by_area_id(next_id)
                .map(|(_, area)| area)?
        };

        let lsdb = &area.state.lsdb;
        Some(MonResponse::Area(AreaRsp {
            area_id: area.area_id,
            n_ifcs: area.active_interface_count(&self.arenas.interfaces)
                as u16,
            n_cfgifcs: area.interfaces.count() as u16,
            n_routers: area.reachable_router_count() as u16,
            n_rtrlsas: lsdb.lsa_count_by_type(LsaTypeCode::Router.into())
                as u16,
            n_netlsas: lsdb.lsa_count_by_type(LsaTypeCode::Network.into())
                as u16,
            n_summlsas: lsdb
                .lsa_count_by_type(LsaTypeCode::SummaryNetwork.into())
                as u16,
            n_asbrlsas: lsdb
                .lsa_count_by_type(LsaTypeCode::SummaryRouter.into())
                as u16,
            n_grplsas: lsdb
                .lsa_count_by_type(LsaTypeCode::GroupMembership.into())
                as u16,
            dbxsum: lsdb.cksum_sum(),
            transit: area.state.transit_capability as u8,
            demand: area.config.demand as u8,
            stub: area.config.stub as u8,
            import_summ: area.config.import_summaries as u8,
            n_ranges: area.ranges.len() as u32,
        }))
    }

    // Interfaces across all areas, ordered by (phyint, address).
    fn iface_table(&self) -> BTreeMap<(i32, Ipv4Addr), (&Area, &Interface)> {
        self.arenas
            .areas
            .iter()
            .flat_map(|area| {
                area.interfaces
                    .iter(&self.arenas.interfaces)
                    .map(move |iface| (area, iface))
            })
            .map(|(area, iface)| ((iface.phyint, iface.addr), (area, iface)))
            .collect()
    }

    fn monitor_ifc(
        &self,
        rq: MonRqIfc,
        exact: bool,
    ) -> Option<MonResponse> {
        let table = self.iface_table();
        let (area, iface) = if exact {
            table.get(&(rq.phyint, rq.if_addr)).copied()?
        } else {
            use std::ops::Bound::{Excluded, Unbounded};
            table
                .range((Excluded((rq.phyint, rq.if_addr)), Unbounded))
                .next()
                .map(|(_, value)| *value)?
        };

        Some(MonResponse::Ifc(self.ifc_response(area, iface)))
    }

    fn monitor_vl(&self, rq: MonRqVL, exact: bool) -> Option<MonResponse> {
        let vlinks: BTreeMap<(Ipv4Addr, Ipv4Addr), (&Area, &Interface)> = self
            .iface_table()
            .into_values()
            .filter_map(|(area, iface)| {
                iface.vlink.as_ref().map(|vlink| {
                    ((vlink.transit_area, vlink.endpoint_id), (area, iface))
                })
            })
            .collect();

        let (area, iface) = if exact {
            vlinks.get(&(rq.transit_area, rq.endpoint_id)).copied()?
        } else {
            use std::ops::Bound::{Excluded, Unbounded};
            vlinks
                .range((
                    Excluded((rq.transit_area, rq.endpoint_id)),
                    Unbounded,
                ))
                .next()
                .map(|(_, value)| *value)?
        };

        Some(MonResponse::Ifc(self.ifc_response(area, iface)))
    }

    fn ifc_response(&self, area: &Area, iface: &Interface) -> IfcRsp {
        let neighbors = &self.arenas.neighbors;
        IfcRsp {
            if_addr: iface.addr,
            if_phyint: iface.phyint,
            if_mask: iface.config.mask,
            area_id: area.area_id,
            transit_id: iface
                .vlink
                .as_ref()
                .map(|vlink| vlink.transit_area)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            endpt_id: iface
                .vlink
                .as_ref()
                .map(|vlink| vlink.endpoint_id)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            if_dint: iface.config.dead_interval,
            if_pint: iface.config.poll_interval,
            if_dr: iface.state.dr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            if_bdr: iface.state.bdr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            mtu: iface.config.mtu,
            if_cost: iface.config.cost,
            if_hint: iface.config.hello_interval,
            if_autype: match &iface.config.auth {
                None => 0,
                Some(crate::packet::auth::AuthMethod::Simple(_)) => 1,
                Some(crate::packet::auth::AuthMethod::Cryptographic(_)) => 2,
            },
            if_rxmt: iface.config.rxmt_interval as u8,
            if_xdelay: iface.config.transmit_delay as u8,
            if_drpri: iface.config.priority,
            if_demand: iface.config.demand as u8,
            if_mcfwd: iface.config.mc_fwd as u8,
            if_nnbrs: iface.state.neighbors.count() as u8,
            if_nfull: iface
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state == nsm::State::Full)
                .count() as u8,
            if_state: ism_state_str(iface.state.ism_state).to_owned(),
            if_type: if_type_str(iface.config.if_type).to_owned(),
            phyname: self.tx.sys.phyname(iface.phyint),
        }
    }

    fn monitor_nbr(&self, rq: MonRqNbr, exact: bool) -> Option<MonResponse> {
        // Neighbors across all interfaces, ordered by (phyint, address).
        let table: BTreeMap<(i32, Ipv4Addr), _> = self
            .iface_table()
            .into_values()
            .flat_map(|(area, iface)| {
                iface
                    .state
                    .neighbors
                    .iter(&self.arenas.neighbors)
                    .map(move |nbr| {
                        ((iface.phyint, nbr.src), (area, iface, nbr))
                    })
            })
            .collect();

        let (_, iface, nbr) = if exact {
            table.get(&(rq.phyint, rq.nbr_addr)).copied()?
        } else {
            use std::ops::Bound::{Excluded, Unbounded};
            table
                .range((Excluded((rq.phyint, rq.nbr_addr)), Unbounded))
                .next()
                .map(|(_, value)| *value)?
        };

        Some(MonResponse::Nbr(NbrRsp {
            n_addr: nbr.src,
            n_id: nbr.router_id,
            phyint: iface.phyint,
            transit_id: iface
                .vlink
                .as_ref()
                .map(|vlink| vlink.transit_area)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            endpt_id: iface
                .vlink
                .as_ref()
                .map(|vlink| vlink.endpoint_id)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
            n_ddlst: nbr.lists.db_summary.len() as u32,
            n_rqlst: (nbr.lists.ls_request.len()
                + nbr.lists.ls_request_pending.len()) as u32,
            rxmt_count: nbr.lists.ls_rxmt.len() as u32,
            n_dr: nbr.dr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            n_bdr: nbr.bdr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            n_opts: nbr.options.map(|options| options.bits()).unwrap_or(0),
            n_imms: nbr
                .last_rcvd_dbdesc
                .as_ref()
                .map(|dbdesc| dbdesc.dd_flags.bits())
                .unwrap_or(0),
            n_adj_pend: nbr.adj_pending as u8,
            n_pri: nbr.priority,
            n_state: nsm_state_str(nbr.state).to_owned(),
            phyname: self.tx.sys.phyname(iface.phyint),
        }))
    }

    fn monitor_lsa(&self, rq: MonRqLsa, exact: bool) -> Option<MonResponse> {
        let lsa_type = LsaType(rq.ls_type as u8);
        let key = LsaKey::new(lsa_type, rq.adv_rtr, rq.ls_id);

        let lsdb = match lsa_type.scope() {
            crate::packet::lsa::LsaScope::As => {
                &self.state.as_ref().unwrap().lsdb
            }
            _ => {
                let (_, area) =
                    self.arenas.areas.get_by_area_id(rq.area_id)?;
                &area.state.lsdb
            }
        };

        let lse = if exact {
            lsdb.get(&self.arenas.lsa_entries, &key).map(|(_, lse)| lse)?
        } else {
            lsdb.get_next(&self.arenas.lsa_entries, &key)
                .map(|(_, lse)| lse)?
        };

        Some(MonResponse::Lsa(LsaRsp {
            area_id: rq.area_id,
            ls_type: lse.data.hdr.lsa_type.0 as u32,
            ls_id: lse.data.hdr.lsa_id,
            adv_rtr: lse.data.hdr.adv_rtr,
            lsa: lse.data.raw.clone(),
        }))
    }

    fn monitor_rte(&self, rq: MonRqRte, exact: bool) -> Option<MonResponse> {
        let state = self.state.as_ref().unwrap();
        let prefix = ospfd_utils::ip::network_from_mask(rq.net, rq.mask)?;

        let (prefix, route) = if exact {
            state.rib.get_key_value(&prefix)?
        } else {
            use std::ops::Bound::{Excluded, Unbounded};
            state.rib.range((Excluded(prefix), Unbounded)).next()?
        };

        Some(MonResponse::Rte(RteRsp {
            net: prefix.ip(),
            mask: prefix.mask(),
            rt_type: route.type_str().to_owned(),
            cost: route.metric,
            o_cost: route.type2_metric.unwrap_or(0),
            tag: route.tag.unwrap_or(0),
            hops: route
                .nexthops
                .values()
                .map(|nexthop| RteHop {
                    phyname: self.tx.sys.phyname(nexthop.phyint),
                    gw: nexthop.addr.unwrap_or(Ipv4Addr::UNSPECIFIED),
                })
                .collect(),
        }))
    }

    fn monitor_opq_next(&self, rq: MonRqLsa) -> Option<MonResponse> {
        // Walk the opaque types in increasing scope order: link, area, AS.
        let key = LsaKey::new(
            LsaType(rq.ls_type as u8),
            rq.adv_rtr,
            rq.ls_id,
        );

        // Area-scope opaque LSAs.
        for area in self.arenas.areas.iter() {
            if area.area_id < rq.area_id {
                continue;
            }
            let from = if area.area_id == rq.area_id {
                key
            } else {
                LsaKey::new(
                    LsaTypeCode::OpaqueLink.into(),
                    Ipv4Addr::UNSPECIFIED,
                    Ipv4Addr::UNSPECIFIED,
                )
            };
            if let Some((_, lse)) = area
                .state
                .lsdb
                .get_next(&self.arenas.lsa_entries, &from)
                .filter(|(_, lse)| lse.data.hdr.lsa_type.is_opaque())
            {
                return Some(MonResponse::Lsa(LsaRsp {
                    area_id: area.area_id,
                    ls_type: lse.data.hdr.lsa_type.0 as u32,
                    ls_id: lse.data.hdr.lsa_id,
                    adv_rtr: lse.data.hdr.adv_rtr,
                    lsa: lse.data.raw.clone(),
                }));
            }
        }

        // AS-scope opaque LSAs.
        let state = self.state.as_ref().unwrap();
        state
            .lsdb
            .get_next(&self.arenas.lsa_entries, &key)
            .filter(|(_, lse)| lse.data.hdr.lsa_type.is_opaque())
            .map(|(_, lse)| {
                MonResponse::Lsa(LsaRsp {
                    area_id: Ipv4Addr::UNSPECIFIED,
                    ls_type: lse.data.hdr.lsa_type.0 as u32,
                    ls_id: lse.data.hdr.lsa_id,
                    adv_rtr: lse.data.hdr.adv_rtr,
                    lsa: lse.data.raw.clone(),
                })
            })
    }
}

// ===== helper functions =====

fn ism_state_str(state: ism::State) -> &'static str {
    match state {
        ism::State::Down => "Down",
        ism::State::Loopback => "Loopbk",
        ism::State::Waiting => "Waiting",
        ism::State::PointToPoint => "P-P",
        ism::State::DrOther => "DROther",
        ism::State::Backup => "Backup",
        ism::State::Dr => "DR",
    }
}

fn nsm_state_str(state: nsm::State) -> &'static str {
    match state {
        nsm::State::Down => "Down",
        nsm::State::Attempt => "Attempt",
        nsm::State::Init => "Init",
        nsm::State::TwoWay => "2-Way",
        nsm::State::ExStart => "ExStart",
        nsm::State::Exchange => "Exchang",
        nsm::State::Loading => "Loading",
        nsm::State::Full => "Full",
    }
}

fn if_type_str(if_type: InterfaceType) -> &'static str {
    match if_type {
        InterfaceType::Broadcast => "Brdcst",
        InterfaceType::NonBroadcast => "NBMA",
        InterfaceType::PointToMultipoint => "P-MP",
        InterfaceType::PointToPoint => "P-P",
        InterfaceType::VirtualLink => "VL",
        InterfaceType::Loopback => "Loopbk",
    }
}
