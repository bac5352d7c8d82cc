// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cmd line of rfnoc-topo

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topology::{NodeKey, NodeType};
use tracing::Level;

#[derive(Parser)]
#[command(name = "rfnoc-topo")]
#[command(about = "Inspect the topology graph of an RFNoC session", long_about = None)]
pub struct Cmdline {
    #[arg(
        long,
        short,
        value_name = "FILE",
        help = "YAML description of the nodes and edges of the topology"
    )]
    pub topology: PathBuf,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value_t = Level::WARN,
        help = "Default log level. RUST_LOG takes precedence"
    )]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the nodes of the topology
    Nodes,
    /// Print the topology in DOT format
    Dot,
    /// Print the shortest route between two nodes
    Route {
        #[arg(value_name = "SRC", help = "Source node, as device:type:inst")]
        src: NodeKey,
        #[arg(value_name = "DST", help = "Destination node, as device:type:inst")]
        dst: NodeKey,
        #[arg(long, help = "Print the route in DOT format")]
        dot: bool,
    },
    /// Print the shortest route to a node from any node of a type
    BestRoute {
        #[arg(long, value_name = "TYPE", help = "Type of the source nodes: xbar, sep, xport or virtual")]
        src_type: NodeType,
        #[arg(value_name = "DST", help = "Destination node, as device:type:inst")]
        dst: NodeKey,
    },
}
