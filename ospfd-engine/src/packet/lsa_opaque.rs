//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospfd_utils::bytes::{BytesExt, BytesMutExt};

use crate::packet::error::DecodeResult;

// OSPFv2 opaque LSA types.
//
// IANA registry:
// https://www.iana.org/assignments/ospf-opaque-types/ospf-opaque-types.xhtml
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum LsaOpaqueType {
    Grace = 3,
}

// Opaque LSA Link State ID: opaque type in the first octet, opaque ID in
// the remaining 24 bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct OpaqueLsaId {
    pub opaque_type: u8,
    pub opaque_id: u32,
}

// OSPFv2 opaque LSA body.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum LsaOpaque {
    Grace(LsaGrace),
    Unknown(LsaUnknownOpaque),
}

//
// Grace-LSA (RFC 3623).
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LsaGrace {
    pub grace_period: Option<GracePeriodTlv>,
    pub gr_reason: Option<GrReasonTlv>,
    pub addr: Option<GrIfAddrTlv>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct GracePeriodTlv(u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct GrReasonTlv(u8);

#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct GrIfAddrTlv(Ipv4Addr);

// Grace-LSA's restart reason.
#[derive(Clone, Copy, Debug, Default, Eq, FromPrimitive, PartialEq)]
pub enum GrReason {
    #[default]
    Unknown = 0,
    SoftwareRestart = 1,
    SoftwareUpgrade = 2,
    ControlProcessorSwitchover = 3,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsaUnknownOpaque {
    pub data: Bytes,
}

// Grace-LSA TLV types.
const GRACE_TLV_PERIOD: u16 = 1;
const GRACE_TLV_REASON: u16 = 2;
const GRACE_TLV_ADDR: u16 = 3;

// ===== impl OpaqueLsaId =====

impl From<Ipv4Addr> for OpaqueLsaId {
    fn from(lsa_id: Ipv4Addr) -> OpaqueLsaId {
        let bits: u32 = lsa_id.into();
        OpaqueLsaId {
            opaque_type: (bits >> 24) as u8,
            opaque_id: bits & 0x00ffffff,
        }
    }
}

impl From<OpaqueLsaId> for Ipv4Addr {
    fn from(opaque: OpaqueLsaId) -> Ipv4Addr {
        Ipv4Addr::from(
            ((opaque.opaque_type as u32) << 24) | (opaque.opaque_id & 0x00ffffff),
        )
    }
}

// ===== impl LsaOpaque =====

impl LsaOpaque {
    pub(crate) fn decode(
        lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<LsaOpaque> {
        let opaque_id = OpaqueLsaId::from(lsa_id);
        let opaque = match LsaOpaqueType::from_u8(opaque_id.opaque_type) {
            Some(LsaOpaqueType::Grace) => {
                LsaOpaque::Grace(LsaGrace::decode(buf)?)
            }
            None => LsaOpaque::Unknown(LsaUnknownOpaque {
                data: buf.copy_to_bytes(buf.remaining()),
            }),
        };

        Ok(opaque)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaOpaque::Grace(grace) => grace.encode(buf),
            LsaOpaque::Unknown(unknown) => buf.put_slice(&unknown.data),
        }
    }
}

// ===== impl LsaGrace =====

impl LsaGrace {
    fn decode(buf: &mut Bytes) -> DecodeResult<LsaGrace> {
        let mut grace = LsaGrace::default();

        while buf.remaining() >= 4 {
            let tlv_type = buf.try_get_u16()?;
            let tlv_len = buf.try_get_u16()?;
            let tlv_wlen = ((tlv_len as usize) + 3) & !3;
            if buf.remaining() < tlv_wlen {
                break;
            }
            let mut value = buf.copy_to_bytes(tlv_wlen);
            match tlv_type {
                GRACE_TLV_PERIOD => {
                    grace.grace_period =
                        Some(GracePeriodTlv(value.try_get_u32()?));
                }
                GRACE_TLV_REASON => {
                    grace.gr_reason = Some(GrReasonTlv(value.try_get_u8()?));
                }
                GRACE_TLV_ADDR => {
                    grace.addr = Some(GrIfAddrTlv(value.try_get_ipv4()?));
                }
                _ => {
                    // Unknown TLVs are ignored.
                }
            }
        }

        Ok(grace)
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(period) = &self.grace_period {
            buf.put_u16(GRACE_TLV_PERIOD);
            buf.put_u16(4);
            buf.put_u32(period.0);
        }
        if let Some(reason) = &self.gr_reason {
            buf.put_u16(GRACE_TLV_REASON);
            buf.put_u16(1);
            buf.put_u8(reason.0);
            buf.put_bytes(0, 3);
        }
        if let Some(addr) = &self.addr {
            buf.put_u16(GRACE_TLV_ADDR);
            buf.put_u16(4);
            buf.put_ipv4(&addr.0);
        }
    }
}

// ===== impl GracePeriodTlv =====

impl GracePeriodTlv {
    pub fn get(&self) -> u32 {
        self.0
    }
}

// ===== impl GrReasonTlv =====

impl GrReasonTlv {
    pub fn get(&self) -> GrReason {
        GrReason::from_u8(self.0).unwrap_or(GrReason::Unknown)
    }
}

// ===== impl GrIfAddrTlv =====

impl GrIfAddrTlv {
    pub fn get(&self) -> Ipv4Addr {
        self.0
    }
}

// ===== impl GrReason =====

impl std::fmt::Display for GrReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrReason::Unknown => write!(f, "unknown"),
            GrReason::SoftwareRestart => write!(f, "software restart"),
            GrReason::SoftwareUpgrade => write!(f, "software upgrade"),
            GrReason::ControlProcessorSwitchover => {
                write!(f, "control processor switchover")
            }
        }
    }
}
