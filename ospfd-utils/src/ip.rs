//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;

    // Returns true if this is an usable address.
    fn is_usable(&self) -> bool;

    // Converts this IPv4 address into a host prefix network.
    fn to_host_prefix(&self) -> Ipv4Network;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Apply mask to prefix.
    #[must_use]
    fn apply_mask(&self) -> Ipv4Network;

    // Returns true if this is a host prefix.
    fn is_host_prefix(&self) -> bool;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;

    fn is_usable(&self) -> bool {
        !(self.is_loopback() || self.is_multicast() || self.is_broadcast())
            && !self.is_unspecified()
    }

    fn to_host_prefix(&self) -> Ipv4Network {
        Ipv4Network::new(*self, <Ipv4Network as Ipv4NetworkExt>::MAX_PREFIXLEN).unwrap()
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn apply_mask(&self) -> Ipv4Network {
        Ipv4Network::new(self.network(), self.prefix()).unwrap()
    }

    fn is_host_prefix(&self) -> bool {
        self.prefix() == Self::MAX_PREFIXLEN
    }
}

// ===== global functions =====

// Builds a network from an address and a dotted-quad mask, normalizing the
// host bits away. Non-contiguous masks are rejected.
pub fn network_from_mask(
    addr: Ipv4Addr,
    mask: Ipv4Addr,
) -> Option<Ipv4Network> {
    let prefix = ipnetwork::ipv4_mask_to_prefix(mask).ok()?;
    let net = Ipv4Network::new(addr, prefix).ok()?;
    Some(net.apply_mask())
}
