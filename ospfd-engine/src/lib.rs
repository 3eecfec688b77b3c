//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Protocol-independent OSPFv2 routing engine.
//!
//! The engine is a pure state machine: it performs no I/O of its own and
//! never reads the wall clock. All interaction with the outside world goes
//! through the [`sys::SysCalls`] platform contract, and time is advanced by
//! the embedding process through [`instance::Instance::tick`].

pub mod area;
pub mod collections;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod flood;
pub mod gr;
pub mod instance;
pub mod interface;
pub mod lsdb;
pub mod monitor;
pub mod mospf;
pub mod neighbor;
pub mod network;
pub mod output;
pub mod packet;
pub mod route;
pub mod spf;
pub mod sys;
pub mod timer;
