// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The RFNoC topology graph.
//!
//! Every node that data can flow through in a session (crossbars, stream endpoints, transport
//! adapters and virtual endpoints) is a vertex of a directed graph, and every physical or
//! logical connection between them is a weighted edge. The graph answers reachability and
//! shortest-route queries, which are used to decide how to connect stream endpoints.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod desc;
mod edge;
mod errors;
mod graph;
mod node;
mod route;

pub use desc::{EdgeDesc, NodeDesc, NodeKey, TopologyDesc};
pub use edge::{EdgeType, Port, TopoEdge, Weight};
pub use errors::TopologyError;
pub use graph::TopoGraph;
pub use node::{DeviceId, EndpointId, NULL_DEVICE_ID, NodeHash, NodeInst, NodeType, TopoNode};
pub use route::{Route, RouteElement};

/// Log target of the topology graph.
pub const LOG_TARGET: &str = "rfnoc-topo";
