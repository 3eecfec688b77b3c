//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use smallvec::SmallVec;

// OSPF multicast groups.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Destination of an outgoing OSPF packet: the physical interface plus one
// or more IP destinations (multi-destination sends cover NBMA and
// point-to-multipoint segments).
#[derive(Clone, Debug)]
pub struct SendDestination {
    pub phyint: i32,
    pub addrs: SmallVec<[Ipv4Addr; 4]>,
}

pub static ALL_SPF_RTRS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);
pub static ALL_DR_RTRS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 6);

// ===== impl MulticastAddr =====

impl MulticastAddr {
    pub fn addr(&self) -> Ipv4Addr {
        match self {
            MulticastAddr::AllSpfRtrs => ALL_SPF_RTRS,
            MulticastAddr::AllDrRtrs => ALL_DR_RTRS,
        }
    }
}

// ===== impl SendDestination =====

impl SendDestination {
    pub fn new(
        phyint: i32,
        addrs: SmallVec<[Ipv4Addr; 4]>,
    ) -> SendDestination {
        SendDestination { phyint, addrs }
    }
}
