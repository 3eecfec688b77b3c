//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Monitor protocol messages.
//!
//! A monitor connection is a framed TCP stream (`ospfd_utils::tcppkt`)
//! carrying read-only requests and their responses. Requests hold just
//! enough information to identify the element; when `exact` is zero the
//! responder returns the next element after the supplied key instead of an
//! exact match. A non-zero `retcode` signals "no such item" or "end of
//! table".

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospfd_utils::bytes::{BytesExt, BytesMutExt};

pub const OSPF_MON_VERSION: u8 = 1;

// Fixed-length string fields.
pub const MON_RTYPELEN: usize = 8;
pub const MON_PHYLEN: usize = 16;
pub const MON_STATELEN: usize = 8;
pub const MON_ITYPELEN: usize = 8;

// Maximum number of equal-cost paths reported per routing table entry.
pub const MON_MAXPATH: usize = 4;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum MonMsgType {
    ReqStat = 1,
    ReqArea = 2,
    ReqIfc = 3,
    ReqVL = 4,
    ReqNbr = 5,
    ReqVLNbr = 6,
    ReqLsa = 7,
    ReqRte = 8,
    ReqOpqReg = 9,
    ReqOpqNext = 10,

    RspStat = 100,
    RspArea = 101,
    RspIfc = 102,
    RspNbr = 103,
    RspLsa = 104,
    RspRte = 105,
    RspOpqLsa = 106,
}

// Header common to requests and responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonHdr {
    pub version: u8,
    pub retcode: u8,
    pub exact: u8,
    pub id: u8,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MonRequest {
    Stat,
    Area(MonRqArea),
    Ifc(MonRqIfc),
    VL(MonRqVL),
    Nbr(MonRqNbr),
    Lsa(MonRqLsa),
    Rte(MonRqRte),
    OpqReg,
    OpqNext(MonRqLsa),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqArea {
    pub area_id: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqIfc {
    pub phyint: i32,
    pub if_addr: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqVL {
    pub transit_area: Ipv4Addr,
    pub endpoint_id: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqNbr {
    pub phyint: i32,
    pub nbr_addr: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqLsa {
    pub area_id: Ipv4Addr,
    pub ls_type: u32,
    pub ls_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonRqRte {
    pub net: Ipv4Addr,
    pub mask: Ipv4Addr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MonResponse {
    Stat(StatRsp),
    Area(AreaRsp),
    Ifc(IfcRsp),
    Nbr(NbrRsp),
    Lsa(LsaRsp),
    Rte(RteRsp),
    // End of table or no such item; carried by the header retcode alone.
    Empty,
}

// Global statistics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatRsp {
    pub router_id: Ipv4Addr,
    pub n_aselsas: u32,
    pub asexsum: u32,
    pub n_ase_import: u32,
    pub extdb_limit: u32,
    pub n_dijkstra: u32,
    pub n_area: u16,
    pub n_dbx_nbrs: u16,
    pub mospf: u8,
    pub inter_area_mc: u8,
    pub overflow_state: u8,
    pub vmajor: u8,
    pub vminor: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AreaRsp {
    pub area_id: Ipv4Addr,
    pub n_ifcs: u16,
    pub n_cfgifcs: u16,
    pub n_routers: u16,
    pub n_rtrlsas: u16,
    pub n_netlsas: u16,
    pub n_summlsas: u16,
    pub n_asbrlsas: u16,
    pub n_grplsas: u16,
    pub dbxsum: u32,
    pub transit: u8,
    pub demand: u8,
    pub stub: u8,
    pub import_summ: u8,
    pub n_ranges: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IfcRsp {
    pub if_addr: Ipv4Addr,
    pub if_phyint: i32,
    pub if_mask: Ipv4Addr,
    pub area_id: Ipv4Addr,
    pub transit_id: Ipv4Addr,
    pub endpt_id: Ipv4Addr,
    pub if_dint: u32,
    pub if_pint: u32,
    pub if_dr: Ipv4Addr,
    pub if_bdr: Ipv4Addr,
    pub mtu: u16,
    pub if_cost: u16,
    pub if_hint: u16,
    pub if_autype: u16,
    pub if_rxmt: u8,
    pub if_xdelay: u8,
    pub if_drpri: u8,
    pub if_demand: u8,
    pub if_mcfwd: u8,
    pub if_nnbrs: u8,
    pub if_nfull: u8,
    pub if_state: String,
    pub if_type: String,
    pub phyname: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NbrRsp {
    pub n_addr: Ipv4Addr,
    pub n_id: Ipv4Addr,
    pub phyint: i32,
    pub transit_id: Ipv4Addr,
    pub endpt_id: Ipv4Addr,
    pub n_ddlst: u32,
    pub n_rqlst: u32,
    pub rxmt_count: u32,
    pub n_dr: Ipv4Addr,
    pub n_bdr: Ipv4Addr,
    pub n_opts: u8,
    pub n_imms: u8,
    pub n_adj_pend: u8,
    pub n_pri: u8,
    pub n_state: String,
    pub phyname: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RteRsp {
    pub net: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub rt_type: String,
    pub cost: u32,
    pub o_cost: u32,
    pub tag: u32,
    pub hops: Vec<RteHop>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RteHop {
    pub phyname: String,
    pub gw: Ipv4Addr,
}

// An LSA response carries its database key followed by the raw LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaRsp {
    pub area_id: Ipv4Addr,
    pub ls_type: u32,
    pub ls_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub lsa: Bytes,
}

// ===== impl MonHdr =====

impl MonHdr {
    pub const LENGTH: usize = 4;

    pub fn request(exact: bool, id: u8) -> MonHdr {
        MonHdr {
            version: OSPF_MON_VERSION,
            retcode: 0,
            exact: exact as u8,
            id,
        }
    }

    pub fn decode(buf: &mut Bytes) -> Result<MonHdr, TryGetError> {
        Ok(MonHdr {
            version: buf.try_get_u8()?,
            retcode: buf.try_get_u8()?,
            exact: buf.try_get_u8()?,
            id: buf.try_get_u8()?,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.retcode);
        buf.put_u8(self.exact);
        buf.put_u8(self.id);
    }
}

// ===== impl MonRequest =====

impl MonRequest {
    pub fn msg_type(&self) -> MonMsgType {
        match self {
            MonRequest::Stat => MonMsgType::ReqStat,
            MonRequest::Area(_) => MonMsgType::ReqArea,
            MonRequest::Ifc(_) => MonMsgType::ReqIfc,
            MonRequest::VL(_) => MonMsgType::ReqVL,
            MonRequest::Nbr(_) => MonMsgType::ReqNbr,
            MonRequest::Lsa(_) => MonMsgType::ReqLsa,
            MonRequest::Rte(_) => MonMsgType::ReqRte,
            MonRequest::OpqReg => MonMsgType::ReqOpqReg,
            MonRequest::OpqNext(_) => MonMsgType::ReqOpqNext,
        }
    }

    pub fn decode(
        msg_type: u16,
        buf: &mut Bytes,
    ) -> Result<(MonHdr, MonRequest), TryGetError> {
        let hdr = MonHdr::decode(buf)?;
        let request = match MonMsgType::from_u16(msg_type) {
            Some(MonMsgType::ReqStat) => MonRequest::Stat,
            Some(MonMsgType::ReqArea) => MonRequest::Area(MonRqArea {
                area_id: buf.try_get_ipv4()?,
            }),
            Some(MonMsgType::ReqIfc) => MonRequest::Ifc(MonRqIfc {
                phyint: buf.try_get_u32()? as i32,
                if_addr: buf.try_get_ipv4()?,
            }),
            Some(MonMsgType::ReqVL) => MonRequest::VL(MonRqVL {
                transit_area: buf.try_get_ipv4()?,
                endpoint_id: buf.try_get_ipv4()?,
            }),
            Some(MonMsgType::ReqNbr | MonMsgType::ReqVLNbr) => {
                MonRequest::Nbr(MonRqNbr {
                    phyint: buf.try_get_u32()? as i32,
                    nbr_addr: buf.try_get_ipv4()?,
                })
            }
            Some(MonMsgType::ReqLsa) => {
                MonRequest::Lsa(Self::decode_lsa_key(buf)?)
            }
            Some(MonMsgType::ReqRte) => MonRequest::Rte(MonRqRte {
                net: buf.try_get_ipv4()?,
                mask: buf.try_get_ipv4()?,
            }),
            Some(MonMsgType::ReqOpqReg) => MonRequest::OpqReg,
            Some(MonMsgType::ReqOpqNext) => {
                MonRequest::OpqNext(Self::decode_lsa_key(buf)?)
            }
            _ => {
                // Unknown request types surface as a short read.
                return Err(TryGetError {
                    requested: 1,
                    available: 0,
                });
            }
        };
        Ok((hdr, request))
    }

    fn decode_lsa_key(buf: &mut Bytes) -> Result<MonRqLsa, TryGetError> {
        Ok(MonRqLsa {
            area_id: buf.try_get_ipv4()?,
            ls_type: buf.try_get_u32()?,
            ls_id: buf.try_get_ipv4()?,
            adv_rtr: buf.try_get_ipv4()?,
        })
    }

    pub fn encode(&self, hdr: &MonHdr) -> Bytes {
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        match self {
            MonRequest::Stat | MonRequest::OpqReg => (),
            MonRequest::Area(rq) => buf.put_ipv4(&rq.area_id),
            MonRequest::Ifc(rq) => {
                buf.put_u32(rq.phyint as u32);
                buf.put_ipv4(&rq.if_addr);
            }
            MonRequest::VL(rq) => {
                buf.put_ipv4(&rq.transit_area);
                buf.put_ipv4(&rq.endpoint_id);
            }
            MonRequest::Nbr(rq) => {
                buf.put_u32(rq.phyint as u32);
                buf.put_ipv4(&rq.nbr_addr);
            }
            MonRequest::Lsa(rq) | MonRequest::OpqNext(rq) => {
                encode_lsa_key(&mut buf, rq)
            }
            MonRequest::Rte(rq) => {
                buf.put_ipv4(&rq.net);
                buf.put_ipv4(&rq.mask);
            }
        }
        buf.freeze()
    }
}

// ===== impl MonResponse =====

impl MonResponse {
    pub fn msg_type(&self) -> MonMsgType {
        match self {
            MonResponse::Stat(_) => MonMsgType::RspStat,
            MonResponse::Area(_) => MonMsgType::RspArea,
            MonResponse::Ifc(_) => MonMsgType::RspIfc,
            MonResponse::Nbr(_) => MonMsgType::RspNbr,
            MonResponse::Lsa(_) => MonMsgType::RspLsa,
            MonResponse::Rte(_) => MonMsgType::RspRte,
            MonResponse::Empty => MonMsgType::RspStat,
        }
    }

    pub fn encode(&self, hdr: &MonHdr) -> Bytes {
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        match self {
            MonResponse::Empty => (),
            MonResponse::Stat(rsp) => {
                buf.put_ipv4(&rsp.router_id);
                buf.put_u32(rsp.n_aselsas);
                buf.put_u32(rsp.asexsum);
                buf.put_u32(rsp.n_ase_import);
                buf.put_u32(rsp.extdb_limit);
                buf.put_u32(rsp.n_dijkstra);
                buf.put_u16(rsp.n_area);
                buf.put_u16(rsp.n_dbx_nbrs);
                buf.put_u8(rsp.mospf);
                buf.put_u8(rsp.inter_area_mc);
                buf.put_u8(rsp.overflow_state);
                buf.put_u8(rsp.vmajor);
                buf.put_u8(rsp.vminor);
                // Alignment padding.
                buf.put_slice(&[0; 3]);
            }
            MonResponse::Area(rsp) => {
                buf.put_ipv4(&rsp.area_id);
                buf.put_u16(rsp.n_ifcs);
                buf.put_u16(rsp.n_cfgifcs);
                buf.put_u16(rsp.n_routers);
                buf.put_u16(rsp.n_rtrlsas);
                buf.put_u16(rsp.n_netlsas);
                buf.put_u16(rsp.n_summlsas);
                buf.put_u16(rsp.n_asbrlsas);
                buf.put_u16(rsp.n_grplsas);
                buf.put_u32(rsp.dbxsum);
                buf.put_u8(rsp.transit);
                buf.put_u8(rsp.demand);
                buf.put_u8(rsp.stub);
                buf.put_u8(rsp.import_summ);
                buf.put_u32(rsp.n_ranges);
            }
            MonResponse::Ifc(rsp) => {
                buf.put_ipv4(&rsp.if_addr);
                buf.put_u32(rsp.if_phyint as u32);
                buf.put_ipv4(&rsp.if_mask);
                buf.put_ipv4(&rsp.area_id);
                buf.put_ipv4(&rsp.transit_id);
                buf.put_ipv4(&rsp.endpt_id);
                buf.put_u32(rsp.if_dint);
                buf.put_u32(rsp.if_pint);
                buf.put_ipv4(&rsp.if_dr);
                buf.put_ipv4(&rsp.if_bdr);
                buf.put_u16(rsp.mtu);
                buf.put_u16(rsp.if_cost);
                buf.put_u16(rsp.if_hint);
                buf.put_u16(rsp.if_autype);
                buf.put_u8(rsp.if_rxmt);
                buf.put_u8(rsp.if_xdelay);
                buf.put_u8(rsp.if_drpri);
                buf.put_u8(rsp.if_demand);
                buf.put_u8(rsp.if_mcfwd);
                buf.put_u8(rsp.if_nnbrs);
                buf.put_u8(rsp.if_nfull);
                buf.put_u8(0);
                put_fixed_str(&mut buf, &rsp.if_state, MON_STATELEN);
                put_fixed_str(&mut buf, &rsp.if_type, MON_ITYPELEN);
                put_fixed_str(&mut buf, &rsp.phyname, MON_PHYLEN);
            }
            MonResponse::Nbr(rsp) => {
                buf.put_ipv4(&rsp.n_addr);
                buf.put_ipv4(&rsp.n_id);
                buf.put_u32(rsp.phyint as u32);
                buf.put_ipv4(&rsp.transit_id);
                buf.put_ipv4(&rsp.endpt_id);
                buf.put_u32(rsp.n_ddlst);
                buf.put_u32(rsp.n_rqlst);
                buf.put_u32(rsp.rxmt_count);
                buf.put_ipv4(&rsp.n_dr);
                buf.put_ipv4(&rsp.n_bdr);
                buf.put_u8(rsp.n_opts);
                buf.put_u8(rsp.n_imms);
                buf.put_u8(rsp.n_adj_pend);
                buf.put_u8(rsp.n_pri);
                put_fixed_str(&mut buf, &rsp.n_state, MON_STATELEN);
                put_fixed_str(&mut buf, &rsp.phyname, MON_PHYLEN);
            }
            MonResponse::Rte(rsp) => {
                buf.put_ipv4(&rsp.net);
                buf.put_ipv4(&rsp.mask);
                put_fixed_str(&mut buf, &rsp.rt_type, MON_RTYPELEN);
                buf.put_u32(rsp.cost);
                buf.put_u32(rsp.o_cost);
                buf.put_u32(rsp.tag);
                buf.put_u32(rsp.hops.len() as u32);
                for hop in rsp.hops.iter().take(MON_MAXPATH) {
                    put_fixed_str(&mut buf, &hop.phyname, MON_PHYLEN);
                    buf.put_ipv4(&hop.gw);
                }
            }
            MonResponse::Lsa(rsp) => {
                buf.put_ipv4(&rsp.area_id);
                buf.put_u32(rsp.ls_type);
                buf.put_ipv4(&rsp.ls_id);
                buf.put_ipv4(&rsp.adv_rtr);
                buf.put_slice(&rsp.lsa);
            }
        }
        buf.freeze()
    }

    pub fn decode(
        msg_type: u16,
        buf: &mut Bytes,
    ) -> Result<(MonHdr, MonResponse), TryGetError> {
        let hdr = MonHdr::decode(buf)?;
        if hdr.retcode != 0 {
            return Ok((hdr, MonResponse::Empty));
        }
        let response = match MonMsgType::from_u16(msg_type) {
            Some(MonMsgType::RspStat) => MonResponse::Stat(StatRsp {
                router_id: buf.try_get_ipv4()?,
                n_aselsas: buf.try_get_u32()?,
                asexsum: buf.try_get_u32()?,
                n_ase_import: buf.try_get_u32()?,
                extdb_limit: buf.try_get_u32()?,
                n_dijkstra: buf.try_get_u32()?,
                n_area: buf.try_get_u16()?,
                n_dbx_nbrs: buf.try_get_u16()?,
                mospf: buf.try_get_u8()?,
                inter_area_mc: buf.try_get_u8()?,
                overflow_state: buf.try_get_u8()?,
                vmajor: buf.try_get_u8()?,
                vminor: buf.try_get_u8()?,
            }),
            Some(MonMsgType::RspArea) => MonResponse::Area(AreaRsp {
                area_id: buf.try_get_ipv4()?,
                n_ifcs: buf.try_get_u16()?,
                n_cfgifcs: buf.try_get_u16()?,
                n_routers: buf.try_get_u16()?,
                n_rtrlsas: buf.try_get_u16()?,
                n_netlsas: buf.try_get_u16()?,
                n_summlsas: buf.try_get_u16()?,
                n_asbrlsas: buf.try_get_u16()?,
                n_grplsas: buf.try_get_u16()?,
                dbxsum: buf.try_get_u32()?,
                transit: buf.try_get_u8()?,
                demand: buf.try_get_u8()?,
                stub: buf.try_get_u8()?,
                import_summ: buf.try_get_u8()?,
                n_ranges: buf.try_get_u32()?,
            }),
            Some(MonMsgType::RspIfc) => MonResponse::Ifc(IfcRsp {
                if_addr: buf.try_get_ipv4()?,
                if_phyint: buf.try_get_u32()? as i32,
                if_mask: buf.try_get_ipv4()?,
                area_id: buf.try_get_ipv4()?,
                transit_id: buf.try_get_ipv4()?,
                endpt_id: buf.try_get_ipv4()?,
                if_dint: buf.try_get_u32()?,
                if_pint: buf.try_get_u32()?,
                if_dr: buf.try_get_ipv4()?,
                if_bdr: buf.try_get_ipv4()?,
                mtu: buf.try_get_u16()?,
                if_cost: buf.try_get_u16()?,
                if_hint: buf.try_get_u16()?,
                if_autype: buf.try_get_u16()?,
                if_rxmt: buf.try_get_u8()?,
                if_xdelay: buf.try_get_u8()?,
                if_drpri: buf.try_get_u8()?,
                if_demand: buf.try_get_u8()?,
                if_mcfwd: buf.try_get_u8()?,
                if_nnbrs: buf.try_get_u8()?,
                if_nfull: {
                    let n_full = buf.try_get_u8()?;
                    let _pad = buf.try_get_u8()?;
                    n_full
                },
                if_state: get_fixed_str(buf, MON_STATELEN)?,
                if_type: get_fixed_str(buf, MON_ITYPELEN)?,
                phyname: get_fixed_str(buf, MON_PHYLEN)?,
            }),
            Some(MonMsgType::RspNbr) => MonResponse::Nbr(NbrRsp {
                n_addr: buf.try_get_ipv4()?,
                n_id: buf.try_get_ipv4()?,
                phyint: buf.try_get_u32()? as i32,
                transit_id: buf.try_get_ipv4()?,
                endpt_id: buf.try_get_ipv4()?,
                n_ddlst: buf.try_get_u32()?,
                n_rqlst: buf.try_get_u32()?,
                rxmt_count: buf.try_get_u32()?,
                n_dr: buf.try_get_ipv4()?,
                n_bdr: buf.try_get_ipv4()?,
                n_opts: buf.try_get_u8()?,
                n_imms: buf.try_get_u8()?,
                n_adj_pend: buf.try_get_u8()?,
                n_pri: buf.try_get_u8()?,
                n_state: get_fixed_str(buf, MON_STATELEN)?,
                phyname: get_fixed_str(buf, MON_PHYLEN)?,
            }),
            Some(MonMsgType::RspRte) => {
                let net = buf.try_get_ipv4()?;
                let mask = buf.try_get_ipv4()?;
                let rt_type = get_fixed_str(buf, MON_RTYPELEN)?;
                let cost = buf.try_get_u32()?;
                let o_cost = buf.try_get_u32()?;
                let tag = buf.try_get_u32()?;
                let npaths = buf.try_get_u32()? as usize;
                let mut hops = vec![];
                for _ in 0..npaths.min(MON_MAXPATH) {
                    hops.push(RteHop {
                        phyname: get_fixed_str(buf, MON_PHYLEN)?,
                        gw: buf.try_get_ipv4()?,
                    });
                }
                MonResponse::Rte(RteRsp {
                    net,
                    mask,
                    rt_type,
                    cost,
                    o_cost,
                    tag,
                    hops,
                })
            }
            Some(MonMsgType::RspLsa | MonMsgType::RspOpqLsa) => {
                MonResponse::Lsa(LsaRsp {
                    area_id: buf.try_get_ipv4()?,
                    ls_type: buf.try_get_u32()?,
                    ls_id: buf.try_get_ipv4()?,
                    adv_rtr: buf.try_get_ipv4()?,
                    lsa: buf.copy_to_bytes(buf.remaining()),
                })
            }
            _ => MonResponse::Empty,
        };
        Ok((hdr, response))
    }
}

// ===== global functions =====

// Response type code matching a given request type, used for end-of-table
// responses that carry no body.
pub fn response_type_for(req_type: u16) -> u16 {
    match MonMsgType::from_u16(req_type) {
        Some(MonMsgType::ReqStat) => MonMsgType::RspStat as u16,
        Some(MonMsgType::ReqArea) => MonMsgType::RspArea as u16,
        Some(MonMsgType::ReqIfc | MonMsgType::ReqVL) => {
            MonMsgType::RspIfc as u16
        }
        Some(MonMsgType::ReqNbr | MonMsgType::ReqVLNbr) => {
            MonMsgType::RspNbr as u16
        }
        Some(MonMsgType::ReqLsa) => MonMsgType::RspLsa as u16,
        Some(MonMsgType::ReqRte) => MonMsgType::RspRte as u16,
        Some(MonMsgType::ReqOpqReg | MonMsgType::ReqOpqNext) => {
            MonMsgType::RspOpqLsa as u16
        }
        _ => MonMsgType::RspStat as u16,
    }
}

// ===== helper functions =====

fn encode_lsa_key(buf: &mut BytesMut, rq: &MonRqLsa) {
    buf.put_ipv4(&rq.area_id);
    buf.put_u32(rq.ls_type);
    buf.put_ipv4(&rq.ls_id);
    buf.put_ipv4(&rq.adv_rtr);
}

fn put_fixed_str(buf: &mut BytesMut, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, len - n);
}

fn get_fixed_str(buf: &mut Bytes, len: usize) -> Result<String, TryGetError> {
    let mut field = vec![0u8; len];
    buf.try_copy_to_slice(&mut field)?;
    let end = field.iter().position(|b| *b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&field[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let hdr = MonHdr::request(false, 7);
        let request = MonRequest::Area(MonRqArea {
            area_id: Ipv4Addr::new(0, 0, 0, 1),
        });
        let mut bytes = request.encode(&hdr);
        let (hdr2, request2) =
            MonRequest::decode(request.msg_type() as u16, &mut bytes).unwrap();
        assert_eq!(hdr, hdr2);
        assert_eq!(request, request2);
    }

    #[test]
    fn response_roundtrip() {
        let hdr = MonHdr {
            version: OSPF_MON_VERSION,
            retcode: 0,
            exact: 1,
            id: 3,
        };
        let response = MonResponse::Rte(RteRsp {
            net: Ipv4Addr::new(10, 1, 1, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            rt_type: "SPF".to_owned(),
            cost: 30,
            o_cost: 0,
            tag: 0,
            hops: vec![RteHop {
                phyname: "eth0".to_owned(),
                gw: Ipv4Addr::new(10, 1, 1, 2),
            }],
        });
        let mut bytes = response.encode(&hdr);
        let (hdr2, response2) =
            MonResponse::decode(response.msg_type() as u16, &mut bytes)
                .unwrap();
        assert_eq!(hdr, hdr2);
        assert_eq!(response, response2);
    }

    #[test]
    fn nonzero_retcode_is_empty() {
        let hdr = MonHdr {
            version: OSPF_MON_VERSION,
            retcode: 1,
            exact: 0,
            id: 0,
        };
        let mut bytes = MonResponse::Empty.encode(&hdr);
        let (hdr2, response) =
            MonResponse::decode(MonMsgType::RspArea as u16, &mut bytes)
                .unwrap();
        assert_eq!(hdr2.retcode, 1);
        assert_eq!(response, MonResponse::Empty);
    }
}
