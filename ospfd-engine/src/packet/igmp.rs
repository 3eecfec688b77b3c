//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::packet::error::{DecodeError, DecodeResult};

// IGMPv2 message types (RFC 2236).
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum IgmpType {
    MembershipQuery = 0x11,
    V1MembershipReport = 0x12,
    V2MembershipReport = 0x16,
    LeaveGroup = 0x17,
}

//
// IGMPv2 message.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IgmpPkt {
    pub igmp_type: IgmpType,
    pub max_resp_time: u8,
    pub group: Ipv4Addr,
}

// ===== impl IgmpPkt =====

impl IgmpPkt {
    pub const LENGTH: usize = 8;

    pub fn decode(data: &[u8]) -> DecodeResult<IgmpPkt> {
        if data.len() < Self::LENGTH {
            return Err(DecodeError::IncompletePacket);
        }

        // Verify checksum.
        let mut cksum = Checksum::new();
        cksum.add_bytes(&data[..Self::LENGTH]);
        if cksum.checksum() != [0; 2] {
            return Err(DecodeError::InvalidChecksum);
        }

        let Some(igmp_type) = IgmpType::from_u8(data[0]) else {
            return Err(DecodeError::UnknownPacketType(data[0]));
        };

        Ok(IgmpPkt {
            igmp_type,
            max_resp_time: data[1],
            group: Ipv4Addr::new(data[4], data[5], data[6], data[7]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::LENGTH);
        buf.put_u8(self.igmp_type as u8);
        buf.put_u8(self.max_resp_time);
        buf.put_u16(0);
        buf.put_slice(&self.group.octets());

        let mut cksum = Checksum::new();
        cksum.add_bytes(&buf);
        let cksum = cksum.checksum();
        buf[2..4].copy_from_slice(&cksum);
        buf.to_vec()
    }
}
