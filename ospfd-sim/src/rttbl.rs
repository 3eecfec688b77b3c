//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Routing table kept within a simulated OSPF router.
//!
//! The harness deliberately does not use the engine's table, so that
//! hitless restart scenarios can be simulated: the engine may be torn down
//! and rebuilt while forwarding through this table continues.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use ospfd_engine::sys::MPath;
use prefix_trie::PrefixMap;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimRte {
    pub reachable: bool,
    pub reject: bool,
    pub mpath: MPath,
}

#[derive(Debug, Default)]
pub struct SimRttbl {
    routes: PrefixMap<Ipv4Network, SimRte>,
}

// ===== impl SimRttbl =====

impl SimRttbl {
    pub fn add(&mut self, net: Ipv4Network, rte: SimRte) {
        self.routes.insert(net, rte);
    }

    pub fn del(&mut self, net: Ipv4Network) {
        self.routes.remove(&net);
    }

    // Longest-prefix match; unreachable entries do not match.
    pub fn best_match(&self, addr: Ipv4Addr) -> Option<&SimRte> {
        let mut plen = 32;
        loop {
            let prefix = Ipv4Network::new(addr, plen).ok()?;
            let (matched, rte) = self.routes.get_lpm(&prefix)?;
            if rte.reachable {
                return Some(rte);
            }
            // Skip past unreachable covering prefixes.
            if matched.prefix() == 0 {
                return None;
            }
            plen = matched.prefix() - 1;
        }
    }

    // All installed prefixes.
    pub fn nets(&self) -> Vec<Ipv4Network> {
        self.routes.iter().map(|(prefix, _)| *prefix).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.iter().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rte(reachable: bool) -> SimRte {
        SimRte {
            reachable,
            reject: false,
            mpath: vec![],
        }
    }

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let mut rttbl = SimRttbl::default();
        rttbl.add(net("10.0.0.0/8"), rte(true));
        rttbl.add(net("10.1.0.0/16"), rte(true));
        rttbl.add(net("10.1.1.0/24"), rte(true));

        let matched = rttbl
            .best_match(Ipv4Addr::new(10, 1, 1, 5))
            .expect("route expected");
        assert!(matched.reachable);

        // The /24 does not cover this address; the /16 does.
        assert!(rttbl.best_match(Ipv4Addr::new(10, 1, 2, 5)).is_some());
        assert!(rttbl.best_match(Ipv4Addr::new(192, 168, 1, 1)).is_none());
    }

    #[test]
    fn unreachable_entries_skipped() {
        let mut rttbl = SimRttbl::default();
        rttbl.add(net("10.0.0.0/8"), rte(true));
        rttbl.add(net("10.1.1.0/24"), rte(false));

        // The more specific entry is unreachable; fall back to the /8.
        let matched = rttbl
            .best_match(Ipv4Addr::new(10, 1, 1, 5))
            .expect("fallback expected");
        assert!(matched.reachable);
    }

    #[test]
    fn delete_removes() {
        let mut rttbl = SimRttbl::default();
        rttbl.add(net("10.1.1.0/24"), rte(true));
        rttbl.del(net("10.1.1.0/24"));
        assert!(rttbl.best_match(Ipv4Addr::new(10, 1, 1, 5)).is_none());
        assert!(rttbl.is_empty());
    }
}
