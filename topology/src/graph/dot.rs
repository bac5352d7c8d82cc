// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Graphviz rendering of the topology graph

use super::TopoGraph;
use crate::node::NodeType;
use std::fmt::Display;

const GRAPH_NAME: &str = "rfnoc_topo_graph";

fn shape(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Invalid => "circle",
        NodeType::Xbar => "hexagon",
        NodeType::StrmEp => "house",
        NodeType::Xport => "diamond",
        NodeType::Virtual => "box",
    }
}

/// Graphviz rendering of a graph.
struct Dot<'a>(&'a TopoGraph);

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "digraph {GRAPH_NAME} {{")?;
        writeln!(f, "rankdir=TB;")?;
        writeln!(f, "node [colorscheme=paired12];")?;
        for (n, vertex) in self.0.vertices.iter().enumerate() {
            let node = &vertex.node;
            writeln!(
                f,
                " {n} [label=\"{node}\",shape={},color={}];",
                shape(node.node_type()),
                node.device_id() % 12
            )?;
        }
        for vertex in &self.0.vertices {
            for &e in &vertex.out_edges {
                let entry = &self.0.edges[e];
                writeln!(
                    f,
                    " {} -> {} [xlabel=\"{}\"];",
                    entry.src,
                    entry.dst,
                    entry.edge.get_weight()
                )?;
            }
        }
        writeln!(f, "}}")
    }
}

impl TopoGraph {
    /// Render the graph in graphviz (dot) format. Nodes are identified by their insertion index
    /// and colored by device.
    #[must_use]
    pub fn to_dot(&self) -> String {
        Dot(self).to_string()
    }
}
