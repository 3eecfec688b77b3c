//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use ospfd_sim::controller;
use ospfd_sim::topology::Topology;
use tracing_subscriber::EnvFilter;

// OSPF routing simulator controller.
#[derive(Debug, Parser)]
#[command(name = "ospfd-sim")]
struct Args {
    // Topology description file (JSON).
    topology: PathBuf,

    // Address to listen on for router control connections.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: SocketAddr,

    // Path to the simulated router binary; when unset, router processes
    // must be started externally.
    #[arg(long, default_value = "ospfd-simrtr")]
    router_cmd: String,

    // Do not spawn router processes.
    #[arg(long)]
    no_spawn: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let topology = Topology::load(&args.topology)?;
    let router_cmd = (!args.no_spawn).then_some(args.router_cmd);

    controller::run(args.listen, topology, router_cmd).await
}
