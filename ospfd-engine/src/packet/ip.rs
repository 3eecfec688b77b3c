//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use internet_checksum::Checksum;

use crate::packet::error::{DecodeError, DecodeResult};

// IP protocol numbers handled by the engine and the simulation harness.
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_IGMP: u8 = 2;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_OSPF: u8 = 89;

//
// IPv4 header (RFC 791), options preserved but not interpreted.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ipv4Hdr {
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    // Offset of the payload within the datagram (IHL * 4).
    pub hdr_len: u8,
}

// ===== impl Ipv4Hdr =====

impl Ipv4Hdr {
    pub const BASE_LENGTH: usize = 20;

    pub fn new(
        total_len: u16,
        ttl: u8,
        protocol: u8,
        src: Ipv4Addr,
        dst: Ipv4Addr,
    ) -> Ipv4Hdr {
        Ipv4Hdr {
            tos: 0,
            total_len,
            id: 0,
            ttl,
            protocol,
            src,
            dst,
            hdr_len: Self::BASE_LENGTH as u8,
        }
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Ipv4Hdr> {
        if data.len() < Self::BASE_LENGTH {
            return Err(DecodeError::IncompletePacket);
        }
        let version = data[0] >> 4;
        let hdr_len = (data[0] & 0x0f) << 2;
        if version != 4
            || (hdr_len as usize) < Self::BASE_LENGTH
            || (hdr_len as usize) > data.len()
        {
            return Err(DecodeError::InvalidIpHdr);
        }
        let total_len = u16::from_be_bytes([data[2], data[3]]);
        if (total_len as usize) < hdr_len as usize {
            return Err(DecodeError::InvalidIpHdr);
        }

        Ok(Ipv4Hdr {
            tos: data[1],
            total_len,
            id: u16::from_be_bytes([data[4], data[5]]),
            ttl: data[8],
            protocol: data[9],
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            hdr_len,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u8(0x45);
        buf.put_u8(self.tos);
        buf.put_u16(self.total_len);
        buf.put_u16(self.id);
        // Flags and fragment offset.
        buf.put_u16(0);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        // The checksum is computed in place.
        buf.put_u16(0);
        buf.put_slice(&self.src.octets());
        buf.put_slice(&self.dst.octets());

        let mut cksum = Checksum::new();
        cksum.add_bytes(&buf[start..start + Self::BASE_LENGTH]);
        let cksum = cksum.checksum();
        buf[start + 10..start + 12].copy_from_slice(&cksum);
    }

    // Builds a full datagram from this header and a payload.
    pub fn build_packet(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf =
            BytesMut::with_capacity(Self::BASE_LENGTH + payload.len());
        let mut hdr = *self;
        hdr.total_len = (Self::BASE_LENGTH + payload.len()) as u16;
        hdr.encode(&mut buf);
        buf.put_slice(payload);
        buf.to_vec()
    }
}
