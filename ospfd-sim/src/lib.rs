//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Discrete-event OSPF simulation fabric.
//!
//! A central controller drives a population of simulated routers in
//! lock-step virtual time. Each router process runs one protocol engine
//! behind a simulated platform: outbound datagrams are relayed over UDP to
//! the destination router's port, and virtual time advances only when
//! every router has acknowledged the previous tick.

pub mod controller;
pub mod icmp;
pub mod msg;
pub mod router;
pub mod rttbl;
pub mod session;
pub mod topology;
