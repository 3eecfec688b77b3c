//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Simulator control protocol.
//!
//! Frames on the controller-to-router TCP connection use the shared
//! `tcppkt` framing. Hot-path bodies (ticks, address maps, database
//! fingerprints) are fixed binary layouts; configuration and session
//! commands are JSON-encoded, since they are rare and structurally rich.

use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use num_derive::FromPrimitive;
use ospfd_engine::lsdb::DbStatsSnapshot;
use ospfd_utils::bytes::{BytesExt, BytesMutExt};
use serde::{Deserialize, Serialize};

// Simulated time granularity.
pub const TICKS_PER_SECOND: u64 = 20;
// Simulated link delay (milliseconds).
pub const LINK_DELAY_MS: u64 = 10;

// Message types exchanged between the simulation controller and the
// individual simulated routers.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum SimMsgType {
    // From controller to simulated routers.
    FirstTick = 1,
    Tick = 2,
    Config = 3,
    ConfigDel = 4,
    AddrMap = 5,
    Shutdown = 6,
    StartPing = 7,
    StopPing = 8,
    StartTr = 9,
    StopTr = 10,
    AddMember = 11,
    DelMember = 12,
    StartMtrace = 13,
    Restart = 14,
    RestartHitless = 15,

    // Responses from simulated routers.
    Hello = 100,
    TickResponse = 101,
    LogMsg = 102,
    EchoReply = 103,
    IcmpError = 104,
    TracerouteTtl = 105,
    TracerouteTmo = 106,
    TracerouteDone = 107,
    PrintSession = 108,
}

// Tick message carrying the simulator's version of time, so that all the
// simulated routers can agree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TickBody {
    pub tick: u64,
}

// Initial identification sent by a simulated router: its OSPF Router ID
// and the UDP port on which it wants unicast delivery.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimHello {
    pub rtrid: Ipv4Addr,
    pub myport: u16,
}

// One entry of the global address map: an IPv4 address (or network
// address) mapped to the owning router and the port listening for it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddrMapEntry {
    pub addr: Ipv4Addr,
    pub home: Ipv4Addr,
    pub port: u16,
}

// Body of the hitless restart command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HitlessRestartBody {
    pub period: u16,
}

// JSON-encoded session command and response bodies.

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PingStartBody {
    pub src: Option<Ipv4Addr>,
    pub dest: Ipv4Addr,
    pub ttl: u8,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TrStartBody {
    pub dest: Ipv4Addr,
    pub max_ttl: u8,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct MtraceStartBody {
    pub src: Ipv4Addr,
    pub group: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GroupBody {
    pub phyint: i32,
    pub group: Ipv4Addr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogMsgBody {
    pub level: u8,
    pub msg: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct EchoReplyBody {
    pub src: Ipv4Addr,
    pub msd: u32,
    pub icmp_seq: u16,
    pub ttl: u8,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct IcmpErrBody {
    pub src: Ipv4Addr,
    pub icmp_type: u8,
    pub code: u8,
    pub icmp_seq: u16,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TrTtlBody {
    pub ttl: u8,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrintSessionBody {
    pub line: String,
}

// Header prepended to every inter-router simulated datagram: the sender's
// transmission timestamp and the outbound physical interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimPktHdr {
    pub ts_sec: u32,
    pub ts_msec: u32,
    pub phyint: i32,
}

// ===== impl TickBody =====

impl TickBody {
    pub fn decode(buf: &mut Bytes) -> Result<TickBody, TryGetError> {
        Ok(TickBody {
            tick: buf.try_get_u64()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64(self.tick);
        buf.freeze()
    }
}

// ===== impl SimHello =====

impl SimHello {
    pub fn decode(buf: &mut Bytes) -> Result<SimHello, TryGetError> {
        Ok(SimHello {
            rtrid: buf.try_get_ipv4()?,
            myport: buf.try_get_u16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_ipv4(&self.rtrid);
        buf.put_u16(self.myport);
        buf.freeze()
    }
}

// ===== impl AddrMapEntry =====

impl AddrMapEntry {
    pub const LENGTH: usize = 10;

    pub fn decode_list(
        buf: &mut Bytes,
    ) -> Result<Vec<AddrMapEntry>, TryGetError> {
        let mut entries = vec![];
        while buf.remaining() >= Self::LENGTH {
            entries.push(AddrMapEntry {
                addr: buf.try_get_ipv4()?,
                home: buf.try_get_ipv4()?,
                port: buf.try_get_u16()?,
            });
        }
        Ok(entries)
    }

    pub fn encode_list(entries: &[AddrMapEntry]) -> Bytes {
        let mut buf = BytesMut::with_capacity(entries.len() * Self::LENGTH);
        for entry in entries {
            buf.put_ipv4(&entry.addr);
            buf.put_ipv4(&entry.home);
            buf.put_u16(entry.port);
        }
        buf.freeze()
    }
}

// ===== impl HitlessRestartBody =====

impl HitlessRestartBody {
    pub fn decode(buf: &mut Bytes) -> Result<HitlessRestartBody, TryGetError> {
        Ok(HitlessRestartBody {
            period: buf.try_get_u16()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u16(self.period);
        buf.freeze()
    }
}

// ===== impl SimPktHdr =====

impl SimPktHdr {
    pub const LENGTH: usize = 12;

    pub fn new(ts: Duration, phyint: i32) -> SimPktHdr {
        SimPktHdr {
            ts_sec: ts.as_secs() as u32,
            ts_msec: ts.subsec_millis(),
            phyint,
        }
    }

    pub fn timestamp(&self) -> Duration {
        Duration::from_secs(self.ts_sec as u64)
            + Duration::from_millis(self.ts_msec as u64)
    }

    pub fn decode(data: &[u8]) -> Option<(SimPktHdr, &[u8])> {
        if data.len() < Self::LENGTH {
            return None;
        }
        let hdr = SimPktHdr {
            ts_sec: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            ts_msec: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            phyint: i32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };
        Some((hdr, &data[Self::LENGTH..]))
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LENGTH + payload.len());
        buf.extend_from_slice(&self.ts_sec.to_be_bytes());
        buf.extend_from_slice(&self.ts_msec.to_be_bytes());
        buf.extend_from_slice(&self.phyint.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }
}

// ===== global functions =====

// Database fingerprint codec used in tick responses.
pub fn encode_db_stats(stats: &DbStatsSnapshot) -> Bytes {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u32(stats.n_exlsas);
    buf.put_u32(stats.ex_dbxsum);
    buf.put_ipv4(&stats.area_id);
    buf.put_u32(stats.n_lsas);
    buf.put_u32(stats.dbxsum);
    buf.freeze()
}

pub fn decode_db_stats(
    buf: &mut Bytes,
) -> Result<DbStatsSnapshot, TryGetError> {
    Ok(DbStatsSnapshot {
        n_exlsas: buf.try_get_u32()?,
        ex_dbxsum: buf.try_get_u32()?,
        area_id: buf.try_get_ipv4()?,
        n_lsas: buf.try_get_u32()?,
        dbxsum: buf.try_get_u32()?,
    })
}

// The tick a packet timestamped `ts` becomes visible at, given the fixed
// link delay.
pub fn delivery_tick(ts: Duration) -> u64 {
    let ms = ts.as_millis() as u64 + LINK_DELAY_MS;
    ms.div_ceil(1000 / TICKS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_stats_roundtrip() {
        let stats = DbStatsSnapshot {
            n_exlsas: 3,
            ex_dbxsum: 0xdeadbeef,
            area_id: Ipv4Addr::new(0, 0, 0, 1),
            n_lsas: 42,
            dbxsum: 0x12345678,
        };
        let mut buf = encode_db_stats(&stats);
        assert_eq!(decode_db_stats(&mut buf).unwrap(), stats);
    }

    #[test]
    fn sim_pkt_hdr_roundtrip() {
        let hdr = SimPktHdr::new(Duration::from_millis(1250), 2);
        let data = hdr.encode(b"payload");
        let (hdr2, payload) = SimPktHdr::decode(&data).unwrap();
        assert_eq!(hdr, hdr2);
        assert_eq!(payload, b"payload");
        assert_eq!(hdr2.timestamp(), Duration::from_millis(1250));
    }

    #[test]
    fn delivery_tick_honors_link_delay() {
        // A packet sent at t=0 is visible at the first tick boundary at or
        // after the link delay.
        assert_eq!(delivery_tick(Duration::ZERO), 1);
        // One sent at t=1s lands at tick 21, not 20.
        assert_eq!(delivery_tick(Duration::from_secs(1)), 21);
    }

    #[test]
    fn addr_map_roundtrip() {
        let entries = vec![
            AddrMapEntry {
                addr: Ipv4Addr::new(10, 1, 1, 1),
                home: Ipv4Addr::new(1, 1, 1, 1),
                port: 4000,
            },
            AddrMapEntry {
                addr: Ipv4Addr::new(10, 1, 1, 0),
                home: Ipv4Addr::new(2, 2, 2, 2),
                port: 4001,
            },
        ];
        let mut buf = AddrMapEntry::encode_list(&entries);
        assert_eq!(AddrMapEntry::decode_list(&mut buf).unwrap(), entries);
    }
}
