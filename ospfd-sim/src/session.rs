//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Ping, traceroute and multicast-traceroute sessions.
//!
//! Sessions are driven entirely by the virtual clock: probes fire on tick
//! boundaries and responses are matched against outstanding probes. All
//! three variants share the same retransmission pattern with an iteration
//! cap of two; an ICMP error response at a given TTL terminates that TTL's
//! probing immediately.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::icmp::IcmpType;
use crate::msg::{
    EchoReplyBody, IcmpErrBody, PrintSessionBody, SimMsgType, TICKS_PER_SECOND,
    TrTtlBody,
};

// Maximum number of retransmissions of a probe.
pub const MAXITER: u8 = 2;

// Ticks between periodic probes (one second).
const PROBE_INTERVAL: u64 = TICKS_PER_SECOND;
// Ticks before an unanswered probe is retransmitted (two seconds).
const PROBE_TIMEOUT: u64 = 2 * TICKS_PER_SECOND;

// What a session wants done, interpreted by the router harness.
#[derive(Clone, Debug)]
pub enum SessionAction {
    // Send an ICMP echo request.
    Probe {
        dest: Ipv4Addr,
        src: Option<Ipv4Addr>,
        ttl: u8,
        id: u16,
        seq: u16,
    },
    // Report a frame to the controller.
    Frame {
        msg_type: SimMsgType,
        subtype: u16,
        body: Vec<u8>,
    },
    // The session has completed.
    Terminate,
}

// Ping session: echoes sent on a one-second timer until stopped.
#[derive(Debug)]
pub struct PingSession {
    pub id: u16,
    pub src: Option<Ipv4Addr>,
    pub dest: Ipv4Addr,
    pub ttl: u8,
    seqno: u16,
    next_fire: u64,
    outstanding: BTreeMap<u16, u64>,
}

// Traceroute session: probes sent per TTL, advancing on a response or
// after MAXITER unanswered probes.
#[derive(Debug)]
pub struct TrSession {
    pub id: u16,
    pub dest: Ipv4Addr,
    pub max_ttl: u8,
    ttl: u8,
    iteration: u8,
    seqno: u16,
    probe_sent: Option<u64>,
}

// Multicast traceroute session: walks the reverse-path toward the source
// the same way a unicast traceroute walks toward its destination.
#[derive(Debug)]
pub struct MtraceSession {
    pub id: u16,
    pub group: Ipv4Addr,
    pub src: Ipv4Addr,
    inner: TrSession,
}

// ===== impl PingSession =====

impl PingSession {
    pub fn new(
        id: u16,
        src: Option<Ipv4Addr>,
        dest: Ipv4Addr,
        ttl: u8,
    ) -> PingSession {
        PingSession {
            id,
            src,
            dest,
            ttl,
            seqno: 0,
            next_fire: 0,
            outstanding: BTreeMap::new(),
        }
    }

    pub fn tick(&mut self, tick: u64) -> Vec<SessionAction> {
        if tick < self.next_fire {
            return vec![];
        }
        self.next_fire = tick + PROBE_INTERVAL;
        self.seqno = self.seqno.wrapping_add(1);
        self.outstanding.insert(self.seqno, tick);
        // Bound the amount of unanswered state.
        while self.outstanding.len() > 16 {
            self.outstanding.pop_first();
        }

        vec![SessionAction::Probe {
            dest: self.dest,
            src: self.src,
            ttl: self.ttl,
            id: self.id,
            seq: self.seqno,
        }]
    }

    pub fn echo_reply_received(
        &mut self,
        tick: u64,
        from: Ipv4Addr,
        seq: u16,
        ttl: u8,
    ) -> Vec<SessionAction> {
        let Some(sent) = self.outstanding.remove(&seq) else {
            return vec![];
        };
        let msd = (tick.saturating_sub(sent)) * (1000 / TICKS_PER_SECOND);
        let body = EchoReplyBody {
            src: from,
            msd: msd as u32,
            icmp_seq: seq,
            ttl,
        };
        vec![SessionAction::Frame {
            msg_type: SimMsgType::EchoReply,
            subtype: self.id,
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }]
    }

    pub fn error_received(
        &mut self,
        from: Ipv4Addr,
        icmp_type: IcmpType,
        code: u8,
        seq: u16,
    ) -> Vec<SessionAction> {
        let body = IcmpErrBody {
            src: from,
            icmp_type: icmp_type as u8,
            code,
            icmp_seq: seq,
        };
        vec![SessionAction::Frame {
            msg_type: SimMsgType::IcmpError,
            subtype: self.id,
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }]
    }
}

// ===== impl TrSession =====

impl TrSession {
    pub fn new(id: u16, dest: Ipv4Addr, max_ttl: u8) -> TrSession {
        TrSession {
            id,
            dest,
            max_ttl,
            ttl: 0,
            iteration: 0,
            seqno: 0,
            probe_sent: None,
        }
    }

    pub fn tick(&mut self, tick: u64) -> Vec<SessionAction> {
        match self.probe_sent {
            None => self.next_ttl(tick),
            Some(sent) if tick.saturating_sub(sent) >= PROBE_TIMEOUT => {
                // Unanswered probe.
                self.iteration += 1;
                if self.iteration >= MAXITER {
                    // Give up on this TTL.
                    let mut actions = vec![SessionAction::Frame {
                        msg_type: SimMsgType::TracerouteTmo,
                        subtype: self.id,
                        body: serde_json::to_vec(&TrTtlBody {
                            ttl: self.ttl,
                        })
                        .unwrap_or_default(),
                    }];
                    actions.extend(self.next_ttl(tick));
                    actions
                } else {
                    self.send_probe(tick)
                }
            }
            Some(_) => vec![],
        }
    }

    fn next_ttl(&mut self, tick: u64) -> Vec<SessionAction> {
        if self.ttl >= self.max_ttl {
            self.probe_sent = None;
            return vec![
                SessionAction::Frame {
                    msg_type: SimMsgType::TracerouteDone,
                    subtype: self.id,
                    body: vec![],
                },
                SessionAction::Terminate,
            ];
        }
        self.ttl += 1;
        self.iteration = 0;

        let mut actions = vec![SessionAction::Frame {
            msg_type: SimMsgType::TracerouteTtl,
            subtype: self.id,
            body: serde_json::to_vec(&TrTtlBody { ttl: self.ttl })
                .unwrap_or_default(),
        }];
        actions.extend(self.send_probe(tick));
        actions
    }

    fn send_probe(&mut self, tick: u64) -> Vec<SessionAction> {
        self.seqno = self.seqno.wrapping_add(1);
        self.probe_sent = Some(tick);
        vec![SessionAction::Probe {
            dest: self.dest,
            src: None,
            ttl: self.ttl,
            id: self.id,
            seq: self.seqno,
        }]
    }

    // A TTL-exceeded error names the hop at the current TTL; errors
    // terminate the current TTL immediately (no trailing probe is sent).
    pub fn error_received(
        &mut self,
        tick: u64,
        from: Ipv4Addr,
        icmp_type: IcmpType,
    ) -> Vec<SessionAction> {
        let mut actions = vec![SessionAction::Frame {
            msg_type: SimMsgType::PrintSession,
            subtype: self.id,
            body: serde_json::to_vec(&PrintSessionBody {
                line: format!("{} hops {} ({from})", self.ttl, self.dest),
            })
            .unwrap_or_default(),
        }];

        match icmp_type {
            IcmpType::TimeExceeded => {
                self.probe_sent = None;
                actions.extend(self.tick(tick));
            }
            _ => {
                // Unreachable (or anything else): the trace is over.
                actions.push(SessionAction::Frame {
                    msg_type: SimMsgType::TracerouteDone,
                    subtype: self.id,
                    body: vec![],
                });
                actions.push(SessionAction::Terminate);
            }
        }
        actions
    }

    // The destination answered: the trace completed.
    pub fn echo_reply_received(&mut self, from: Ipv4Addr) -> Vec<SessionAction> {
        vec![
            SessionAction::Frame {
                msg_type: SimMsgType::PrintSession,
                subtype: self.id,
                body: serde_json::to_vec(&PrintSessionBody {
                    line: format!("{} hops {} reached", self.ttl, from),
                })
                .unwrap_or_default(),
            },
            SessionAction::Frame {
                msg_type: SimMsgType::TracerouteDone,
                subtype: self.id,
                body: vec![],
            },
            SessionAction::Terminate,
        ]
    }
}

// ===== impl MtraceSession =====

impl MtraceSession {
    pub fn new(
        id: u16,
        src: Ipv4Addr,
        group: Ipv4Addr,
        max_ttl: u8,
    ) -> MtraceSession {
        MtraceSession {
            id,
            group,
            src,
            inner: TrSession::new(id, src, max_ttl),
        }
    }

    pub fn tick(&mut self, tick: u64) -> Vec<SessionAction> {
        self.inner.tick(tick)
    }

    pub fn error_received(
        &mut self,
        tick: u64,
        from: Ipv4Addr,
        icmp_type: IcmpType,
    ) -> Vec<SessionAction> {
        self.inner.error_received(tick, from, icmp_type)
    }

    pub fn echo_reply_received(&mut self, from: Ipv4Addr) -> Vec<SessionAction> {
        self.inner.echo_reply_received(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_fires_every_second() {
        let mut ping =
            PingSession::new(1, None, Ipv4Addr::new(10, 1, 1, 2), 64);
        assert_eq!(ping.tick(0).len(), 1);
        assert!(ping.tick(1).is_empty());
        assert_eq!(ping.tick(PROBE_INTERVAL).len(), 1);
    }

    #[test]
    fn traceroute_retries_then_advances() {
        let mut tr = TrSession::new(1, Ipv4Addr::new(10, 1, 1, 2), 2);

        // First probe at TTL 1.
        let actions = tr.tick(0);
        assert!(actions.iter().any(|action| matches!(
            action,
            SessionAction::Probe { ttl: 1, .. }
        )));

        // Unanswered: one retry, then a timeout report and TTL 2.
        let actions = tr.tick(PROBE_TIMEOUT);
        assert!(actions.iter().any(|action| matches!(
            action,
            SessionAction::Probe { ttl: 1, .. }
        )));
        let actions = tr.tick(2 * PROBE_TIMEOUT);
        assert!(actions.iter().any(|action| matches!(
            action,
            SessionAction::Frame {
                msg_type: SimMsgType::TracerouteTmo,
                ..
            }
        )));
        assert!(actions.iter().any(|action| matches!(
            action,
            SessionAction::Probe { ttl: 2, .. }
        )));
    }

    #[test]
    fn unreachable_ends_trace_immediately() {
        let mut tr = TrSession::new(1, Ipv4Addr::new(10, 1, 1, 2), 10);
        let _ = tr.tick(0);
        let actions = tr.error_received(
            1,
            Ipv4Addr::new(10, 1, 1, 1),
            IcmpType::Unreachable,
        );
        assert!(actions
            .iter()
            .any(|action| matches!(action, SessionAction::Terminate)));
    }
}
