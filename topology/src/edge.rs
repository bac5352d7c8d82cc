// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Edges of the topology graph

use crate::node::{NodeType, TopoNode};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The weight (cost) of an edge.
pub type Weight = u32;

/// The type of an edge in the data-flow graph
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Uninitialized edge
    #[default]
    #[strum(to_string = "invalid")]
    Invalid,
    /// Terminates a route. Never stored in a graph.
    #[strum(to_string = "end-of-route")]
    EndOfRoute,
    /// Transport adapter (on the device) to a stream endpoint within the session, or vice-versa
    #[strum(to_string = "host")]
    Host,
    /// Direct AXIS connection between two nodes on the same FPGA, e.g. stream endpoint to
    /// crossbar
    #[strum(to_string = "on-chip")]
    OnChip,
    /// Direct AXIS connection between two FPGAs, e.g. crossbar to crossbar via Aurora
    #[strum(to_string = "off-chip")]
    OffChip,
    /// Leaves the device over an Ethernet transport adapter and is routed to another device over
    /// an external network. Needs additional routing information to function.
    #[strum(to_string = "ethernet")]
    Ethernet,
}

/// A port on either side of an edge.
///
/// Ports only matter on crossbars. Other nodes use [`Port::Any`], which is never considered to
/// be in use.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    #[default]
    Any,
    Num(u32),
}

impl Port {
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Port::Any)
    }

    /// True if both ports are concrete and equal. [`Port::Any`] never conflicts.
    #[must_use]
    pub fn conflicts_with(&self, other: Port) -> bool {
        matches!((self, other), (Port::Num(a), Port::Num(b)) if *a == b)
    }
}

impl From<u32> for Port {
    fn from(port: u32) -> Self {
        Port::Num(port)
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Port::Any => write!(f, "*"),
            Port::Num(n) => write!(f, "{n}"),
        }
    }
}

/// A directed edge from the output port of a node to the input port of another node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopoEdge {
    pub edge_type: EdgeType,
    pub src_port: Port,
    pub dst_port: Port,
    /// Cost of traversing this edge. Only change it through
    /// [`crate::TopoGraph::update_weight`] once the edge is in a graph.
    pub weight: Weight,
}

impl Default for TopoEdge {
    fn default() -> Self {
        Self {
            edge_type: EdgeType::Invalid,
            src_port: Port::Any,
            dst_port: Port::Any,
            weight: 1,
        }
    }
}

impl TopoEdge {
    #[must_use]
    pub fn new(edge_type: EdgeType, src_port: impl Into<Port>, dst_port: impl Into<Port>) -> Self {
        Self {
            edge_type,
            src_port: src_port.into(),
            dst_port: dst_port.into(),
            ..Default::default()
        }
    }

    /// Build an edge between two nodes, deriving its type from the nodes.
    #[must_use]
    pub fn between(
        src: &TopoNode,
        dst: &TopoNode,
        src_port: impl Into<Port>,
        dst_port: impl Into<Port>,
    ) -> Self {
        let same_device = src.device_id() == dst.device_id();
        let edge_type = if !src.is_local_sep && same_device {
            EdgeType::OnChip
        } else if src.is_local_sep || dst.is_local_sep {
            EdgeType::Host
        } else if src.node_type() == NodeType::Xbar && dst.node_type() == NodeType::Xbar {
            EdgeType::OffChip
        } else if src.node_type() == NodeType::Xport && dst.node_type() == NodeType::Xport {
            EdgeType::Ethernet
        } else {
            EdgeType::Invalid
        };
        Self::new(edge_type, src_port, dst_port)
    }

    /// The sentinel edge of the last hop of a route.
    #[must_use]
    pub fn end_of_route() -> Self {
        Self::new(EdgeType::EndOfRoute, Port::Any, Port::Any)
    }

    #[must_use]
    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = weight;
        self
    }

    /// Effective cost of this edge. The end-of-route sentinel costs nothing.
    #[must_use]
    pub fn get_weight(&self) -> Weight {
        match self.edge_type {
            EdgeType::EndOfRoute => 0,
            _ => self.weight,
        }
    }

    /// The same edge, going the other way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            src_port: self.dst_port,
            dst_port: self.src_port,
            ..self.clone()
        }
    }
}

impl Display for TopoEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}->{} (weight {})",
            self.edge_type,
            self.src_port,
            self.dst_port,
            self.get_weight()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_inference() {
        let xbar0 = TopoNode::new(1, NodeType::Xbar, 0);
        let sep0 = TopoNode::new(1, NodeType::StrmEp, 0);
        let xbar1 = TopoNode::new(2, NodeType::Xbar, 0);
        let xport0 = TopoNode::new(1, NodeType::Xport, 0);
        let xport1 = TopoNode::new(2, NodeType::Xport, 0);
        let host = TopoNode::sep(9, 7, true, None);

        assert_eq!(TopoEdge::between(&xbar0, &sep0, 0, 0).edge_type, EdgeType::OnChip);
        assert_eq!(TopoEdge::between(&xbar0, &xbar1, 3, 3).edge_type, EdgeType::OffChip);
        assert_eq!(TopoEdge::between(&xport0, &xport1, 0, 0).edge_type, EdgeType::Ethernet);
        // local SEPs connect over the host
        assert_eq!(TopoEdge::between(&host, &xport0, Port::Any, 0).edge_type, EdgeType::Host);
        assert_eq!(TopoEdge::between(&xport0, &host, 0, Port::Any).edge_type, EdgeType::Host);
        assert_eq!(TopoEdge::between(&sep0, &xbar1, 0, 0).edge_type, EdgeType::Invalid);
    }

    #[test]
    fn test_edge_weight() {
        let edge = TopoEdge::new(EdgeType::OnChip, 0, 1).with_weight(7);
        assert_eq!(edge.get_weight(), 7);
        assert_eq!(TopoEdge::default().get_weight(), 1);
        assert_eq!(TopoEdge::end_of_route().with_weight(9).get_weight(), 0);
    }

    #[test]
    fn test_edge_reversed_and_ports() {
        let edge = TopoEdge::new(EdgeType::OffChip, 2, Port::Any).with_weight(3);
        let rev = edge.reversed();
        assert_eq!(rev.src_port, Port::Any);
        assert_eq!(rev.dst_port, Port::Num(2));
        assert_eq!(rev.weight, 3);
        assert_eq!(rev.edge_type, EdgeType::OffChip);

        assert!(Port::Num(2).conflicts_with(Port::Num(2)));
        assert!(!Port::Num(2).conflicts_with(Port::Num(3)));
        assert!(!Port::Any.conflicts_with(Port::Any));
        assert!(!Port::Num(2).conflicts_with(Port::Any));
    }
}
