//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod auth;
pub mod error;
pub mod igmp;
pub mod ip;
pub mod lsa;
pub mod lsa_opaque;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospfd_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use ospfd_utils::ip::Ipv4AddrExt;

use crate::packet::auth::{
    AUTH_FIELD_LENGTH, AuthDecodeCtx, AuthEncodeCtx, AuthMethod,
    MD5_DIGEST_LENGTH,
};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};

// OSPF version number.
pub const OSPF_VERSION: u8 = 2;

// OSPF packet type.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-3
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
pub enum PacketType {
    Hello = 1,
    DbDesc = 2,
    LsRequest = 3,
    LsUpdate = 4,
    LsAck = 5,
}

// OSPFv2 Options field.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-1
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Options: u8 {
        const E = 0x02;
        const MC = 0x04;
        const NP = 0x08;
        const EA = 0x10;
        const DC = 0x20;
        const O = 0x40;
    }
}

// Database Description flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// OSPFv2 authentication type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum AuthType {
    Null = 0x00,
    Simple = 0x01,
    Cryptographic = 0x02,
}

//
// OSPFv2 packet header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Version #   |     Type      |         Packet length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Router ID                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Area ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |             AuType            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    // Cryptographic sequence number of the received packet.
    pub auth_seqno: Option<u32>,
}

// OSPFv2 packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

//
// OSPFv2 Hello packet.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: Options,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

//
// OSPFv2 Database Description packet.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

//
// OSPFv2 Link State Request packet.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

//
// OSPFv2 Link State Update packet.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

//
// OSPFv2 Link State Acknowledgment packet.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const LENGTH: u16 = 24;
    pub const CKSUM_RANGE: std::ops::Range<usize> = 12..14;
    pub const AUTH_RANGE: std::ops::Range<usize> = 16..24;

    pub fn new(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
    ) -> PacketHdr {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
            auth_seqno: None,
        }
    }

    fn encode(&self, buf: &mut BytesMut, auth: Option<&AuthEncodeCtx<'_>>) {
        buf.put_u8(OSPF_VERSION);
        buf.put_u8(self.pkt_type as u8);
        // The length will be rewritten later.
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_ipv4(&self.area_id);
        // The checksum will be computed later.
        buf.put_u16(0);
        match auth {
            None => {
                buf.put_u16(AuthType::Null as u16);
                buf.put_u64(0);
            }
            Some(AuthEncodeCtx::Simple(_)) => {
                buf.put_u16(AuthType::Simple as u16);
                // The password is inserted after the checksum is computed.
                buf.put_u64(0);
            }
            Some(AuthEncodeCtx::Cryptographic { key, seqno }) => {
                buf.put_u16(AuthType::Cryptographic as u16);
                buf.put_u16(0);
                buf.put_u8(key.id);
                buf.put_u8(MD5_DIGEST_LENGTH);
                buf.put_u32(*seqno);
            }
        }
    }
}

// ===== impl Packet =====

impl Packet {
    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }

    pub fn pkt_type(&self) -> PacketType {
        self.hdr().pkt_type
    }

    // Decodes a packet from the OSPF payload of an IP datagram.
    pub fn decode(
        data: &[u8],
        auth: Option<&AuthDecodeCtx<'_>>,
    ) -> DecodeResult<Packet> {
        let hdr_len = PacketHdr::LENGTH as usize;
        if data.len() < hdr_len {
            return Err(DecodeError::IncompletePacket);
        }

        // Parse and validate the fixed header fields.
        let version = data[0];
        if version != OSPF_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let Some(pkt_type) = PacketType::from_u8(data[1]) else {
            return Err(DecodeError::UnknownPacketType(data[1]));
        };
        let pkt_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        let min_len = hdr_len
            + match pkt_type {
                PacketType::Hello => Hello::BASE_LENGTH as usize,
                PacketType::DbDesc => DbDesc::BASE_LENGTH as usize,
                PacketType::LsUpdate => LsUpdate::BASE_LENGTH as usize,
                PacketType::LsRequest | PacketType::LsAck => 0,
            };
        if pkt_len < min_len || pkt_len > data.len() {
            return Err(DecodeError::InvalidLength(pkt_len as u16));
        }

        let router_id = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
        if !router_id.is_usable() {
            return Err(DecodeError::InvalidRouterId(router_id));
        }
        let area_id = Ipv4Addr::new(data[8], data[9], data[10], data[11]);

        // Authenticate and verify the checksum.
        let au_type = u16::from_be_bytes([data[14], data[15]]);
        let auth_seqno = match AuthType::from_u16(au_type) {
            Some(AuthType::Null) => {
                if auth.is_some() {
                    return Err(DecodeError::AuthTypeMismatch);
                }
                verify_cksum(&data[..pkt_len])?;
                None
            }
            Some(AuthType::Simple) => {
                let Some(auth) = auth else {
                    return Err(DecodeError::AuthTypeMismatch);
                };
                let AuthMethod::Simple(passwd) = auth.method else {
                    return Err(DecodeError::AuthTypeMismatch);
                };
                verify_cksum(&data[..pkt_len])?;
                let mut expected = [0u8; AUTH_FIELD_LENGTH];
                let len = passwd.len().min(AUTH_FIELD_LENGTH);
                expected[..len].copy_from_slice(&passwd[..len]);
                if data[PacketHdr::AUTH_RANGE] != expected {
                    return Err(DecodeError::AuthError);
                }
                None
            }
            Some(AuthType::Cryptographic) => {
                let Some(auth) = auth else {
                    return Err(DecodeError::AuthTypeMismatch);
                };
                let key_id = data[18];
                let auth_len = data[19];
                let seqno = u32::from_be_bytes([
                    data[20], data[21], data[22], data[23],
                ]);
                if auth_len != MD5_DIGEST_LENGTH
                    || data.len() < pkt_len + auth_len as usize
                {
                    return Err(DecodeError::AuthLenError(auth_len));
                }
                let key = auth
                    .method
                    .accept_key(key_id, auth.now)
                    .ok_or(DecodeError::AuthKeyIdNotFound(key_id))?;
                let digest_rx = &data[pkt_len..pkt_len + auth_len as usize];
                let digest =
                    auth::message_digest(&data[..pkt_len], &key.key);
                if digest_rx != digest {
                    return Err(DecodeError::AuthError);
                }
                Some(seqno)
            }
            None => return Err(DecodeError::UnsupportedAuthType(au_type)),
        };

        let hdr = PacketHdr {
            pkt_type,
            router_id,
            area_id,
            auth_seqno,
        };

        // Decode the packet body.
        let mut buf = Bytes::copy_from_slice(&data[hdr_len..pkt_len]);
        match pkt_type {
            PacketType::Hello => Hello::decode(hdr, &mut buf),
            PacketType::DbDesc => DbDesc::decode(hdr, &mut buf),
            PacketType::LsRequest => LsRequest::decode(hdr, &mut buf),
            PacketType::LsUpdate => LsUpdate::decode(hdr, &mut buf),
            PacketType::LsAck => LsAck::decode(hdr, &mut buf),
        }
    }

    pub fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        match self {
            Packet::Hello(pkt) => pkt.encode(auth),
            Packet::DbDesc(pkt) => pkt.encode(auth),
            Packet::LsRequest(pkt) => pkt.encode(auth),
            Packet::LsUpdate(pkt) => pkt.encode(auth),
            Packet::LsAck(pkt) => pkt.encode(auth),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Hello => write!(f, "Hello"),
            PacketType::DbDesc => write!(f, "Database Description"),
            PacketType::LsRequest => write!(f, "Link State Request"),
            PacketType::LsUpdate => write!(f, "Link State Update"),
            PacketType::LsAck => write!(f, "Link State Ack"),
        }
    }
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Packet> {
        let network_mask = buf.try_get_ipv4()?;
        let hello_interval = buf.try_get_u16()?;
        // Ignore unknown options.
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let priority = buf.try_get_u8()?;
        let dead_interval = buf.try_get_u32()?;
        let dr = buf.try_get_opt_ipv4()?;
        let bdr = buf.try_get_opt_ipv4()?;

        // Parse list of neighbors.
        let mut neighbors = BTreeSet::new();
        let nbrs_cnt = buf.remaining() / 4;
        for _ in 0..nbrs_cnt {
            let nbr = buf.try_get_ipv4()?;
            neighbors.insert(nbr);
        }

        Ok(Packet::Hello(Hello {
            hdr,
            network_mask,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        }))
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr, auth.as_ref());

            buf.put_ipv4(&self.network_mask);
            buf.put_u16(self.hello_interval);
            buf.put_u8(self.options.bits());
            buf.put_u8(self.priority);
            buf.put_u32(self.dead_interval);
            buf.put_ipv4(&self.dr.unwrap_or(Ipv4Addr::UNSPECIFIED));
            buf.put_ipv4(&self.bdr.unwrap_or(Ipv4Addr::UNSPECIFIED));
            for nbr in &self.neighbors {
                buf.put_ipv4(nbr);
            }

            packet_encode_end(buf, auth.as_ref())
        })
    }
}

// ===== impl DbDesc =====

impl DbDesc {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Packet> {
        let mtu = buf.try_get_u16()?;
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let dd_flags = DbDescFlags::from_bits_truncate(buf.try_get_u8()?);
        let dd_seq_no = buf.try_get_u32()?;

        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            let lsa_hdr = LsaHdr::decode(buf)?;
            lsa_hdrs.push(lsa_hdr);
        }

        Ok(Packet::DbDesc(DbDesc {
            hdr,
            mtu,
            options,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
        }))
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr, auth.as_ref());

            buf.put_u16(self.mtu);
            buf.put_u8(self.options.bits());
            buf.put_u8(self.dd_flags.bits());
            buf.put_u32(self.dd_seq_no);
            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf, auth.as_ref())
        })
    }
}

// ===== impl LsRequest =====

impl LsRequest {
    pub const ENTRY_LENGTH: u16 = 12;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Packet> {
        // Parse list of LSA global IDs.
        let mut entries = vec![];
        let entries_cnt = buf.remaining() / LsRequest::ENTRY_LENGTH as usize;
        for _ in 0..entries_cnt {
            let lsa_type = LsaType(buf.try_get_u32()? as u8);
            let lsa_id = buf.try_get_ipv4()?;
            let adv_rtr = buf.try_get_ipv4()?;
            entries.push(LsaKey {
                lsa_type,
                adv_rtr,
                lsa_id,
            });
        }

        Ok(Packet::LsRequest(LsRequest { hdr, entries }))
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr, auth.as_ref());

            for entry in &self.entries {
                buf.put_u32(entry.lsa_type.0 as u32);
                buf.put_ipv4(&entry.lsa_id);
                buf.put_ipv4(&entry.adv_rtr);
            }

            packet_encode_end(buf, auth.as_ref())
        })
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Packet> {
        // Parse list of LSAs.
        let mut lsas = vec![];
        let lsas_cnt = buf.try_get_u32()?;
        for _ in 0..lsas_cnt {
            match Lsa::decode(buf) {
                Ok(lsa) => lsas.push(lsa),
                Err(error) => error.log(),
            }
        }

        Ok(Packet::LsUpdate(LsUpdate { hdr, lsas }))
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr, auth.as_ref());

            buf.put_u32(self.lsas.len() as u32);
            for lsa in &self.lsas {
                buf.put_slice(&lsa.raw);
            }

            packet_encode_end(buf, auth.as_ref())
        })
    }
}

// ===== impl LsAck =====

impl LsAck {
    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Packet> {
        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            let lsa_hdr = LsaHdr::decode(buf)?;
            lsa_hdrs.push(lsa_hdr);
        }

        Ok(Packet::LsAck(LsAck { hdr, lsa_hdrs }))
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr, auth.as_ref());

            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf, auth.as_ref())
        })
    }
}

// ===== helper functions =====

fn packet_encode_start<'a>(
    buf: &'a RefCell<BytesMut>,
    hdr: &PacketHdr,
    auth: Option<&AuthEncodeCtx<'_>>,
) -> RefMut<'a, BytesMut> {
    let mut buf = buf.borrow_mut();
    buf.clear();
    hdr.encode(&mut buf, auth);
    buf
}

fn packet_encode_end(
    mut buf: RefMut<'_, BytesMut>,
    auth: Option<&AuthEncodeCtx<'_>>,
) -> Bytes {
    // Rewrite the packet length (excludes the authentication trailer).
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());

    match auth {
        Some(AuthEncodeCtx::Cryptographic { key, .. }) => {
            // The checksum is not used with cryptographic authentication.
            auth::encode_trailer(&mut buf, key);
        }
        Some(AuthEncodeCtx::Simple(passwd)) => {
            update_cksum(&mut buf);
            let mut field = [0u8; AUTH_FIELD_LENGTH];
            let len = passwd.len().min(AUTH_FIELD_LENGTH);
            field[..len].copy_from_slice(&passwd[..len]);
            buf[PacketHdr::AUTH_RANGE].copy_from_slice(&field);
        }
        None => update_cksum(&mut buf),
    }

    buf.clone().freeze()
}

fn update_cksum(buf: &mut BytesMut) {
    let mut cksum = Checksum::new();
    cksum.add_bytes(buf);
    buf[PacketHdr::CKSUM_RANGE].copy_from_slice(&cksum.checksum());
}

fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
    let mut cksum = Checksum::new();
    cksum.add_bytes(&data[0..PacketHdr::AUTH_RANGE.start]);
    cksum.add_bytes(&data[PacketHdr::AUTH_RANGE.end..]);
    if cksum.checksum() != [0; 2] {
        return Err(DecodeError::InvalidChecksum);
    }

    Ok(())
}
