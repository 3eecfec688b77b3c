//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

//! Topology file loading.
//!
//! The controller reads a JSON description of the simulated network. The
//! per-router configuration uses the same `ConfigItem` records the engine
//! consumes, so configuration ingestion stays a thin shim over the `cfg_*`
//! entry points.

use std::net::Ipv4Addr;
use std::path::Path;

use ipnetwork::Ipv4Network;
use ospfd_engine::config::ConfigItem;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Topology {
    pub routers: Vec<RouterNode>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouterNode {
    pub router_id: Ipv4Addr,
    pub config: Vec<ConfigItem>,
}

// ===== impl Topology =====

impl Topology {
    pub fn load(path: &Path) -> std::io::Result<Topology> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(std::io::Error::other)
    }

    // Interface addresses of a router, with their networks.
    pub fn router_addrs(
        &self,
        router_id: Ipv4Addr,
    ) -> Vec<(Ipv4Addr, Option<Ipv4Network>)> {
        self.routers
            .iter()
            .filter(|node| node.router_id == router_id)
            .flat_map(|node| node.config.iter())
            .filter_map(|item| match item {
                ConfigItem::Ifc(ifc) => Some((
                    ifc.addr,
                    ospfd_utils::ip::network_from_mask(ifc.addr, ifc.mask),
                )),
                _ => None,
            })
            .collect()
    }
}
