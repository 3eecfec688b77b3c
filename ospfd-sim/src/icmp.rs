//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! ICMP emulation for the simulated routers: echo/echo-reply for ping
//! sessions, TTL-exceeded and unreachable errors for traceroute.

use bytes::{BufMut, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum IcmpType {
    EchoReply = 0,
    Unreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

//
// ICMP message. Echo messages use the id/seq fields; error messages carry
// the offending IP header + 8 bytes in the payload instead.
//
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IcmpPkt {
    pub icmp_type: IcmpType,
    pub code: u8,
    pub id: u16,
    pub seq: u16,
    pub payload: Vec<u8>,
}

// ===== impl IcmpPkt =====

impl IcmpPkt {
    pub const HDR_LENGTH: usize = 8;

    pub fn echo_request(id: u16, seq: u16) -> IcmpPkt {
        IcmpPkt {
            icmp_type: IcmpType::EchoRequest,
            code: 0,
            id,
            seq,
            payload: vec![],
        }
    }

    pub fn echo_reply(request: &IcmpPkt) -> IcmpPkt {
        IcmpPkt {
            icmp_type: IcmpType::EchoReply,
            code: 0,
            id: request.id,
            seq: request.seq,
            payload: request.payload.clone(),
        }
    }

    // Builds an ICMP error carrying the offending datagram's IP header
    // plus the first 8 bytes of its payload.
    pub fn error(icmp_type: IcmpType, code: u8, offending: &[u8]) -> IcmpPkt {
        let quoted = offending.len().min(28);
        IcmpPkt {
            icmp_type,
            code,
            id: 0,
            seq: 0,
            payload: offending[..quoted].to_vec(),
        }
    }

    pub fn decode(data: &[u8]) -> Option<IcmpPkt> {
        if data.len() < Self::HDR_LENGTH {
            return None;
        }

        // Verify checksum.
        let mut cksum = Checksum::new();
        cksum.add_bytes(data);
        if cksum.checksum() != [0; 2] {
            return None;
        }

        let icmp_type = IcmpType::from_u8(data[0])?;
        Some(IcmpPkt {
            icmp_type,
            code: data[1],
            id: u16::from_be_bytes([data[4], data[5]]),
            seq: u16::from_be_bytes([data[6], data[7]]),
            payload: data[Self::HDR_LENGTH..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            BytesMut::with_capacity(Self::HDR_LENGTH + self.payload.len());
        buf.put_u8(self.icmp_type as u8);
        buf.put_u8(self.code);
        buf.put_u16(0);
        buf.put_u16(self.id);
        buf.put_u16(self.seq);
        buf.put_slice(&self.payload);

        let mut cksum = Checksum::new();
        cksum.add_bytes(&buf);
        let cksum = cksum.checksum();
        buf[2..4].copy_from_slice(&cksum);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_roundtrip() {
        let request = IcmpPkt::echo_request(7, 3);
        let decoded = IcmpPkt::decode(&request.encode()).unwrap();
        assert_eq!(request, decoded);

        let reply = IcmpPkt::echo_reply(&decoded);
        assert_eq!(reply.icmp_type, IcmpType::EchoReply);
        assert_eq!(reply.id, 7);
        assert_eq!(reply.seq, 3);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut data = IcmpPkt::echo_request(1, 1).encode();
        data[4] ^= 0xff;
        assert!(IcmpPkt::decode(&data).is_none());
    }
}
