// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routes through the topology graph

use crate::edge::{EdgeType, TopoEdge};
use crate::node::TopoNode;
use std::fmt::Display;

/// One hop of a [`Route`]: a node and the edge leaving it towards the next hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteElement {
    pub node: TopoNode,
    pub edge: TopoEdge,
}

/// An ordered sequence of hops from a source node to a destination node.
///
/// The edge of the last hop is always [`EdgeType::EndOfRoute`]. A route with no hops means
/// there is no connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Route(Vec<RouteElement>);

impl Route {
    #[must_use]
    pub fn new(hops: Vec<RouteElement>) -> Self {
        Self(hops)
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn hops(&self) -> &[RouteElement] {
        &self.0
    }
    pub fn iter(&self) -> impl Iterator<Item = &RouteElement> {
        self.0.iter()
    }
    #[must_use]
    pub fn source(&self) -> Option<&TopoNode> {
        self.0.first().map(|hop| &hop.node)
    }
    #[must_use]
    pub fn destination(&self) -> Option<&TopoNode> {
        self.0.last().map(|hop| &hop.node)
    }

    /// Sum of the effective weights of all the hops.
    #[must_use]
    pub fn distance(&self) -> u64 {
        self.0.iter().map(|hop| u64::from(hop.edge.get_weight())).sum()
    }

    /// Render the route in graphviz format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        RouteDot(self).to_string()
    }
}

struct RouteDot<'a>(&'a Route);

impl Display for RouteDot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "digraph rfnoc_route {{")?;
        writeln!(f, "rankdir=LR;")?;
        for (n, hop) in self.0.iter().enumerate() {
            writeln!(f, " {n} [label=\"{}\"];", hop.node)?;
        }
        for (n, hop) in self.0.iter().enumerate() {
            if hop.edge.edge_type != EdgeType::EndOfRoute {
                writeln!(f, " {n} -> {} [xlabel=\"{}\"];", n + 1, hop.edge.get_weight())?;
            }
        }
        writeln!(f, "}}")
    }
}

impl<'a> IntoIterator for &'a Route {
    type Item = &'a RouteElement;
    type IntoIter = std::slice::Iter<'a, RouteElement>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<empty>");
        }
        for hop in &self.0 {
            write!(f, "{},", hop.node)?;
            let port = hop.edge.src_port;
            match hop.edge.edge_type {
                EdgeType::OnChip => write!(f, "{port}->")?,
                EdgeType::OffChip => write!(f, "{port}-=->")?,
                EdgeType::Host => write!(f, "{port}-H->")?,
                EdgeType::Ethernet => write!(f, "{port}-ETH->")?,
                EdgeType::EndOfRoute | EdgeType::Invalid => {}
            }
        }
        Ok(())
    }
}
