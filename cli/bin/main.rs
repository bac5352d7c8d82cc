// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod cmdline;

use crate::cmdline::{Cmdline, Command};
use clap::Parser;
use miette::{Context, IntoDiagnostic};
use topology::{TopoGraph, TopologyDesc};
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

fn init_logging(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load(cmdline: &Cmdline) -> miette::Result<TopoGraph> {
    let desc = TopologyDesc::load(&cmdline.topology)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to load {}", cmdline.topology.display()))?;
    TopoGraph::from_desc(&desc)
        .into_diagnostic()
        .wrap_err("Invalid topology")
}

fn main() -> miette::Result<()> {
    let cmdline = Cmdline::parse();
    init_logging(cmdline.log_level);
    let graph = load(&cmdline)?;
    debug!(
        "Loaded {} nodes and {} edges from {}",
        graph.num_nodes(),
        graph.num_edges(),
        cmdline.topology.display()
    );

    match cmdline.command {
        Command::Nodes => {
            for node in graph.get_nodes(|_| true) {
                println!("{node}");
            }
        }
        Command::Dot => print!("{}", graph.to_dot()),
        Command::Route { src, dst, dot } => {
            let route = graph
                .get_route(&src.node(), &dst.node())
                .into_diagnostic()?;
            if dot {
                print!("{}", route.to_dot());
            } else {
                println!("{route}");
                println!("distance: {}", route.distance());
            }
        }
        Command::BestRoute { src_type, dst } => {
            let route = graph
                .get_best_route(|node| node.node_type() == src_type, &dst.node())
                .into_diagnostic()?;
            if route.is_empty() {
                return Err(miette::miette!(
                    "No {} node can reach {}",
                    src_type,
                    dst.node()
                ));
            }
            println!("{route}");
            println!("distance: {}", route.distance());
        }
    }
    Ok(())
}
