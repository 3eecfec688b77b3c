//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use ospfd_sim::router;
use tracing_subscriber::EnvFilter;

// One simulated OSPF router.
#[derive(Debug, Parser)]
#[command(name = "ospfd-simrtr")]
struct Args {
    // Address of the simulation controller.
    #[arg(long)]
    controller: SocketAddr,

    // OSPF Router ID of this simulated router.
    #[arg(long)]
    router_id: Ipv4Addr,
}

// The protocol engine is strictly single-threaded; everything runs on a
// current-thread runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    router::run(args.controller, args.router_id).await
}
