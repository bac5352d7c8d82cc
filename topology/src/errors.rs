// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology errors

use crate::edge::Port;
use crate::node::TopoNode;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Cannot add edge: source node {0} is not in the graph")]
    UnknownSourceNode(TopoNode),
    #[error("Cannot add edge: port {1} of source node {0} is already in use")]
    SourcePortInUse(TopoNode, Port),
    #[error("Cannot add edge: port {1} of destination node {0} is already in use")]
    DestinationPortInUse(TopoNode, Port),
    #[error("Cannot {verb}: node {node} is not in the graph")]
    NodeNotFound { verb: &'static str, node: TopoNode },
    #[error("No route from {0} to {1}")]
    NoRoute(TopoNode, TopoNode),
    #[error("No edge from {0} to {1}")]
    NoEdge(TopoNode, TopoNode),
    #[error("Node {0} has no outgoing edge on port {1}")]
    NoEdgeForPort(TopoNode, Port),
    #[error("Invalid node reference '{0}': expected device:type:inst")]
    InvalidNodeKey(String),
    #[error("Failed to parse topology description: {0}")]
    Description(String),
}
