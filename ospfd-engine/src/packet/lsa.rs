//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospfd_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};

use crate::lsdb::{LSA_DO_NOT_AGE, LSA_MAX_AGE, LSA_RESERVED_SEQ_NO};
use crate::packet::Options;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};
use crate::packet::lsa_opaque::{GrReason, LsaOpaque};

// OSPFv2 LSA type.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LsaType(pub u8);

// OSPFv2 LSA type code.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-5
#[derive(Clone, Copy, Debug, Eq, Ord, FromPrimitive, PartialEq, PartialOrd)]
pub enum LsaTypeCode {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryRouter = 4,
    AsExternal = 5,
    GroupMembership = 6,
    OpaqueLink = 9,
    OpaqueArea = 10,
    OpaqueAs = 11,
}

// OSPF LSA scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaScope {
    Link,
    Area,
    As,
    Unknown,
}

// OSPF LSA key. It serves both as a global LSA identifier and as a key to
// store LSAs in an LSDB.
//
// Please be aware that modifying the order of the fields will impact
// operations such as iterating over LSDBs.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub adv_rtr: Ipv4Addr,
    pub lsa_id: Ipv4Addr,
}

//
// OSPFv2 LSA header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            LS age             |    Options    |    LS type    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Link State ID                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Advertising Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     LS sequence number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         LS checksum           |             length            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LsaHdr {
    pub age: u16,
    pub options: Options,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    pub cksum: u16,
    pub length: u16,
}

// OSPF LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lsa {
    // LSA raw bytes.
    pub raw: Bytes,
    // LSA header.
    pub hdr: LsaHdr,
    // LSA body.
    pub body: LsaBody,
    // Engine elapsed time at which the LSA was created or received. When
    // combined with the Age field in the LSA header, the actual LSA age can
    // be determined.
    pub base_time: Option<Duration>,
}

// OSPFv2 LSA body.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum LsaBody {
    Router(LsaRouter),
    Network(LsaNetwork),
    SummaryNetwork(LsaSummary),
    SummaryRouter(LsaSummary),
    AsExternal(LsaAsExternal),
    GroupMembership(LsaGroupMembership),
    OpaqueLink(LsaOpaque),
    OpaqueArea(LsaOpaque),
    OpaqueAs(LsaOpaque),
    Unknown(LsaUnknown),
}

//
// OSPFv2 Router-LSA.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

// OSPFv2 Router Properties Registry.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaRouterFlags: u8 {
        const B = 0x01;
        const E = 0x02;
        const V = 0x04;
        const W = 0x08;
    }
}

// OSPFv2 Router-LSA link type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum LsaRouterLinkType {
    PointToPoint = 0x01,
    TransitNetwork = 0x02,
    StubNetwork = 0x03,
    VirtualLink = 0x04,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

//
// OSPFv2 Network-LSA.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaNetwork {
    pub mask: Ipv4Addr,
    pub attached_rtrs: BTreeSet<Ipv4Addr>,
}

//
// OSPFv2 Summary-LSA (types 3 and 4).
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaSummary {
    pub mask: Ipv4Addr,
    pub metric: u32,
}

//
// OSPFv2 AS-External-LSA.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaAsExternal {
    pub mask: Ipv4Addr,
    pub flags: LsaAsExternalFlags,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaAsExternalFlags: u8 {
        const E = 0x80;
        const MC = 0x40;
    }
}

//
// MOSPF Group-Membership-LSA (RFC 1584 A.1).
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaGroupMembership {
    pub entries: Vec<GroupMbrEntry>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
pub struct GroupMbrEntry {
    pub vertex_type: GmVertexType,
    pub vertex_id: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
pub enum GmVertexType {
    Router = 1,
    TransitNetwork = 2,
}

//
// OSPFv2 Unknown LSA.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaUnknown {
    pub data: Bytes,
}

// ===== impl LsaType =====

impl LsaType {
    pub fn type_code(&self) -> Option<LsaTypeCode> {
        LsaTypeCode::from_u8(self.0)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::OpaqueLink
                    | LsaTypeCode::OpaqueArea
                    | LsaTypeCode::OpaqueAs
            )
        )
    }

    pub fn scope(&self) -> LsaScope {
        match self.type_code() {
            Some(LsaTypeCode::OpaqueLink) => LsaScope::Link,
            Some(
                LsaTypeCode::Router
                | LsaTypeCode::Network
                | LsaTypeCode::SummaryNetwork
                | LsaTypeCode::SummaryRouter
                | LsaTypeCode::GroupMembership
                | LsaTypeCode::OpaqueArea,
            ) => LsaScope::Area,
            Some(LsaTypeCode::AsExternal | LsaTypeCode::OpaqueAs) => {
                LsaScope::As
            }
            None => LsaScope::Unknown,
        }
    }

    // Returns whether the LSA type, as seen from the Graceful Restart
    // perspective, corresponds to topology-related information.
    pub fn is_gr_topology_info(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::Router
                    | LsaTypeCode::Network
                    | LsaTypeCode::SummaryNetwork
                    | LsaTypeCode::SummaryRouter
                    | LsaTypeCode::AsExternal
            )
        )
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LsaTypeCode> for LsaType {
    fn from(code: LsaTypeCode) -> LsaType {
        LsaType(code as u8)
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    pub fn new(
        age: u16,
        options: Options,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
    ) -> LsaHdr {
        LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum: 0,
            length: 0,
        }
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<LsaHdr> {
        let age = buf.try_get_u16()?;
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let lsa_type = LsaType(buf.try_get_u8()?);
        let lsa_id = buf.try_get_ipv4()?;
        let adv_rtr = buf.try_get_ipv4()?;
        let seq_no = buf.try_get_u32()?;
        let cksum = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;

        Ok(LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.lsa_type.0);
        buf.put_ipv4(&self.lsa_id);
        buf.put_ipv4(&self.adv_rtr);
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    // Age with the DoNotAge bit masked off.
    pub fn age(&self) -> u16 {
        self.age & !LSA_DO_NOT_AGE
    }

    pub fn is_dna(&self) -> bool {
        self.age & LSA_DO_NOT_AGE != 0
    }

    pub fn is_maxage(&self) -> bool {
        self.age() == LSA_MAX_AGE
    }

    pub fn key(&self) -> LsaKey {
        LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr: self.adv_rtr,
            lsa_id: self.lsa_id,
        }
    }
}

// ===== impl Lsa =====

impl Lsa {
    // LSA maximum length.
    //
    // Opt for a conservative value to avoid packet fragmentation even in
    // low-MTU links.
    pub const MAX_LENGTH: usize = 1024;

    pub fn new(
        age: u16,
        options: Options,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: LsaBody,
    ) -> Lsa {
        // Build LSA header (the length and checksum are computed later).
        let hdr =
            LsaHdr::new(age, options, body.lsa_type(), lsa_id, adv_rtr, seq_no);

        // Build full LSA and encode it.
        let mut lsa = Lsa {
            raw: Default::default(),
            hdr,
            body,
            base_time: None,
        };
        lsa.encode();
        lsa
    }

    // Returns the LSA age at the given elapsed time.
    pub fn age(&self, now: Duration) -> u16 {
        if self.hdr.is_dna() {
            return self.hdr.age();
        }
        match self.base_time {
            Some(base_time) => {
                let elapsed = now.saturating_sub(base_time).as_secs();
                let elapsed = u16::try_from(elapsed).unwrap_or(u16::MAX);
                std::cmp::min(
                    self.hdr.age().saturating_add(elapsed),
                    LSA_MAX_AGE,
                )
            }
            None => self.hdr.age(),
        }
    }

    // Updates the LSA age.
    pub(crate) fn set_age(&mut self, age: u16, now: Option<Duration>) {
        // Update header.
        self.hdr.age = age;

        // Update raw data.
        let mut raw = BytesMut::from(self.raw.as_ref());
        raw[0..2].copy_from_slice(&age.to_be_bytes());
        self.raw = raw.freeze();

        // Update base time.
        self.base_time = now;
    }

    // Sets the LSA age to MaxAge.
    pub(crate) fn set_maxage(&mut self) {
        self.set_age(LSA_MAX_AGE, None);
    }

    // Decodes LSA from a bytes buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Lsa> {
        // Decode LSA header.
        let buf_orig = buf.clone();
        if buf.remaining() < LsaHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }
        let hdr = LsaHdr::decode(buf)?;
        let lsa_len = hdr.length;
        if lsa_len < LsaHdr::LENGTH {
            return Err(DecodeError::InvalidLsaLength);
        }
        let lsa_body_len = lsa_len - LsaHdr::LENGTH;

        // Decode LSA body.
        if buf.remaining() < lsa_body_len as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mut buf_lsa = buf.copy_to_bytes(lsa_body_len as usize);
        let body = LsaBody::decode(hdr.lsa_type, hdr.lsa_id, &mut buf_lsa)?;

        Ok(Lsa {
            raw: buf_orig.slice(0..lsa_len as usize),
            hdr,
            body,
            base_time: None,
        })
    }

    // Encodes LSA into a bytes buffer.
    pub(crate) fn encode(&mut self) {
        // Encode LSA in network byte order.
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            self.hdr.encode(&mut buf);
            self.body.encode(&mut buf);

            // Rewrite LSA length.
            let lsa_len = buf.len() as u16;
            buf[18..20].copy_from_slice(&lsa_len.to_be_bytes());
            self.hdr.length = lsa_len;

            // Compute LSA checksum.
            let cksum = Self::checksum(&buf[2..(lsa_len as usize)]);
            buf[16..18].copy_from_slice(&cksum);
            self.hdr.cksum = u16::from_be_bytes(cksum);

            // Store LSA raw data.
            self.raw = buf.clone().freeze();
        });
    }

    pub(crate) fn validate(&self) -> Result<(), LsaValidationError> {
        // Validate LSA header.
        if self.hdr.age() > LSA_MAX_AGE {
            return Err(LsaValidationError::InvalidLsaAge);
        }
        if self.hdr.seq_no == LSA_RESERVED_SEQ_NO {
            return Err(LsaValidationError::InvalidLsaSeqNo);
        }
        if !self.is_checksum_valid() {
            return Err(LsaValidationError::InvalidChecksum);
        }

        // The Link State ID of a Router-LSA must be the router's own ID.
        if self.hdr.lsa_type.type_code() == Some(LsaTypeCode::Router)
            && self.hdr.lsa_id != self.hdr.adv_rtr
        {
            return Err(LsaValidationError::Ospfv2RouterLsaIdMismatch);
        }

        Ok(())
    }

    fn checksum(data: &[u8]) -> [u8; 2] {
        let checksum = fletcher::calc_fletcher16(data);
        let mut checkbyte0 = (checksum & 0x00FF) as i32;
        let mut checkbyte1 = ((checksum >> 8) & 0x00FF) as i32;

        // Adjust checksum value using scaling factor.
        let sop = data.len() as u16 - 15;
        let mut x = (sop as i32 * checkbyte0 - checkbyte1) % 255;
        if x <= 0 {
            x += 255;
        }
        checkbyte1 = 510 - checkbyte0 - x;
        if checkbyte1 > 255 {
            checkbyte1 -= 255;
        }
        checkbyte0 = x;
        [checkbyte0 as u8, checkbyte1 as u8]
    }

    // Checks if the checksum is valid.
    pub(crate) fn is_checksum_valid(&self) -> bool {
        // Skip the Age field.
        fletcher::calc_fletcher16(&self.raw[2..(self.hdr.length as usize)])
            == 0
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub fn lsa_type(&self) -> LsaType {
        match self {
            LsaBody::Router(_) => LsaTypeCode::Router.into(),
            LsaBody::Network(_) => LsaTypeCode::Network.into(),
            LsaBody::SummaryNetwork(_) => LsaTypeCode::SummaryNetwork.into(),
            LsaBody::SummaryRouter(_) => LsaTypeCode::SummaryRouter.into(),
            LsaBody::AsExternal(_) => LsaTypeCode::AsExternal.into(),
            LsaBody::GroupMembership(_) => {
                LsaTypeCode::GroupMembership.into()
            }
            LsaBody::OpaqueLink(_) => LsaTypeCode::OpaqueLink.into(),
            LsaBody::OpaqueArea(_) => LsaTypeCode::OpaqueArea.into(),
            LsaBody::OpaqueAs(_) => LsaTypeCode::OpaqueAs.into(),
            LsaBody::Unknown(_) => LsaType(0),
        }
    }

    // Returns the grace-LSA parameters when applicable.
    pub fn as_grace(&self) -> Option<(u32, GrReason, Option<Ipv4Addr>)> {
        let opaque = match self {
            LsaBody::OpaqueLink(opaque) => opaque,
            _ => return None,
        };
        let grace = opaque.as_grace()?;
        Some((
            grace.grace_period?.get(),
            grace
                .gr_reason
                .map(|reason| reason.get())
                .unwrap_or(GrReason::Unknown),
            grace.addr.map(|addr| addr.get()),
        ))
    }

    fn decode(
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<LsaBody> {
        let body = match lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                let flags =
                    LsaRouterFlags::from_bits_truncate(buf.try_get_u8()?);
                let _ = buf.try_get_u8()?;
                let links_cnt = buf.try_get_u16()?;
                let mut links = vec![];
                for _ in 0..links_cnt {
                    let link_id = buf.try_get_ipv4()?;
                    let link_data = buf.try_get_ipv4()?;
                    let link_type = buf.try_get_u8()?;
                    let Some(link_type) =
                        LsaRouterLinkType::from_u8(link_type)
                    else {
                        return Err(DecodeError::UnknownRouterLinkType(
                            link_type,
                        ));
                    };
                    // TOS metrics are obsolete and skipped.
                    let tos_cnt = buf.try_get_u8()?;
                    let metric = buf.try_get_u16()?;
                    for _ in 0..tos_cnt {
                        let _ = buf.try_get_u32()?;
                    }
                    links.push(LsaRouterLink {
                        link_type,
                        link_id,
                        link_data,
                        metric,
                    });
                }
                LsaBody::Router(LsaRouter { flags, links })
            }
            Some(LsaTypeCode::Network) => {
                let mask = buf.try_get_ipv4()?;
                let mut attached_rtrs = BTreeSet::new();
                let rtrs_cnt = buf.remaining() / 4;
                for _ in 0..rtrs_cnt {
                    attached_rtrs.insert(buf.try_get_ipv4()?);
                }
                LsaBody::Network(LsaNetwork {
                    mask,
                    attached_rtrs,
                })
            }
            Some(LsaTypeCode::SummaryNetwork) => {
                let mask = buf.try_get_ipv4()?;
                let metric = buf.try_get_u32()? & 0x00ffffff;
                LsaBody::SummaryNetwork(LsaSummary { mask, metric })
            }
            Some(LsaTypeCode::SummaryRouter) => {
                let mask = buf.try_get_ipv4()?;
                let metric = buf.try_get_u32()? & 0x00ffffff;
                LsaBody::SummaryRouter(LsaSummary { mask, metric })
            }
            Some(LsaTypeCode::AsExternal) => {
                let mask = buf.try_get_ipv4()?;
                let e_metric = buf.try_get_u32()?;
                let flags =
                    LsaAsExternalFlags::from_bits_truncate(
                        (e_metric >> 24) as u8,
                    );
                let metric = e_metric & 0x00ffffff;
                let fwd_addr = buf.try_get_opt_ipv4()?;
                let tag = buf.try_get_u32()?;
                LsaBody::AsExternal(LsaAsExternal {
                    mask,
                    flags,
                    metric,
                    fwd_addr,
                    tag,
                })
            }
            Some(LsaTypeCode::GroupMembership) => {
                let mut entries = vec![];
                let entries_cnt = buf.remaining() / 8;
                for _ in 0..entries_cnt {
                    let vertex_type = buf.try_get_u32()?;
                    let vertex_id = buf.try_get_ipv4()?;
                    let Some(vertex_type) =
                        GmVertexType::from_u32(vertex_type)
                    else {
                        continue;
                    };
                    entries.push(GroupMbrEntry {
                        vertex_type,
                        vertex_id,
                    });
                }
                LsaBody::GroupMembership(LsaGroupMembership { entries })
            }
            Some(LsaTypeCode::OpaqueLink) => {
                LsaBody::OpaqueLink(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueArea) => {
                LsaBody::OpaqueArea(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueAs) => {
                LsaBody::OpaqueAs(LsaOpaque::decode(lsa_id, buf)?)
            }
            None => LsaBody::Unknown(LsaUnknown {
                data: buf.copy_to_bytes(buf.remaining()),
            }),
        };

        Ok(body)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => {
                buf.put_u8(lsa.flags.bits());
                buf.put_u8(0);
                buf.put_u16(lsa.links.len() as u16);
                for link in &lsa.links {
                    buf.put_ipv4(&link.link_id);
                    buf.put_ipv4(&link.link_data);
                    buf.put_u8(link.link_type as u8);
                    buf.put_u8(0);
                    buf.put_u16(link.metric);
                }
            }
            LsaBody::Network(lsa) => {
                buf.put_ipv4(&lsa.mask);
                for rtr in &lsa.attached_rtrs {
                    buf.put_ipv4(rtr);
                }
            }
            LsaBody::SummaryNetwork(lsa) | LsaBody::SummaryRouter(lsa) => {
                buf.put_ipv4(&lsa.mask);
                buf.put_u32(lsa.metric & 0x00ffffff);
            }
            LsaBody::AsExternal(lsa) => {
                buf.put_ipv4(&lsa.mask);
                buf.put_u32(
                    ((lsa.flags.bits() as u32) << 24)
                        | (lsa.metric & 0x00ffffff),
                );
                buf.put_ipv4(
                    &lsa.fwd_addr.unwrap_or(Ipv4Addr::UNSPECIFIED),
                );
                buf.put_u32(lsa.tag);
            }
            LsaBody::GroupMembership(lsa) => {
                for entry in &lsa.entries {
                    buf.put_u32(entry.vertex_type as u32);
                    buf.put_ipv4(&entry.vertex_id);
                }
            }
            LsaBody::OpaqueLink(opaque)
            | LsaBody::OpaqueArea(opaque)
            | LsaBody::OpaqueAs(opaque) => {
                opaque.encode(buf);
            }
            LsaBody::Unknown(lsa) => {
                buf.put_slice(&lsa.data);
            }
        }
    }
}
