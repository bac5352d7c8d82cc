// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology descriptions, to build a [`TopoGraph`] from YAML text.
//!
//! ```yaml
//! nodes:
//!   - { device: 1, type: xbar, inst: 0, extended_info: 4 }
//!   - { device: 1, type: sep, inst: 0, epid: 2 }
//! edges:
//!   - { src: "1:xbar:0", dst: "1:sep:0", src_port: 0, dst_port: 0, bidirectional: true }
//! ```
//!
//! Nodes are referred to by `device:type:inst`. Edges without a `type` get one inferred from the
//! nodes they connect.

use crate::LOG_TARGET;
use crate::edge::{EdgeType, Port, TopoEdge, Weight};
use crate::errors::TopologyError;
use crate::graph::TopoGraph;
use crate::node::{DeviceId, EndpointId, NodeInst, NodeType, TopoNode};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
#[allow(unused)]
use tracing::{debug, error, info};

/// Reference to a node by its identity, written `device:type:inst`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeKey {
    pub device: DeviceId,
    pub node_type: NodeType,
    pub inst: NodeInst,
}

impl NodeKey {
    /// A node with this identity and no extra information.
    #[must_use]
    pub fn node(&self) -> TopoNode {
        TopoNode::new(self.device, self.node_type, self.inst)
    }
}

impl FromStr for NodeKey {
    type Err = TopologyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TopologyError::InvalidNodeKey(s.to_owned());
        let mut parts = s.trim().split(':');
        let (Some(device), Some(node_type), Some(inst), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(NodeKey {
            device: device.parse().map_err(|_| invalid())?,
            node_type: node_type.parse().map_err(|_| invalid())?,
            inst: inst.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for NodeKey {
    type Error = TopologyError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeKey> for String {
    fn from(key: NodeKey) -> Self {
        key.to_string()
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.device, self.node_type, self.inst)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDesc {
    pub device: DeviceId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub inst: NodeInst,
    #[serde(default)]
    pub extended_info: u32,
    #[serde(default)]
    pub epid: Option<EndpointId>,
    #[serde(default)]
    pub local: bool,
}

impl From<&NodeDesc> for TopoNode {
    fn from(desc: &NodeDesc) -> Self {
        let mut node =
            TopoNode::new(desc.device, desc.node_type, desc.inst).with_extended_info(desc.extended_info);
        node.epid = desc.epid;
        node.is_local_sep = desc.local;
        node
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDesc {
    pub src: NodeKey,
    pub dst: NodeKey,
    #[serde(default)]
    pub src_port: Port,
    #[serde(default)]
    pub dst_port: Port,
    #[serde(default, rename = "type")]
    pub edge_type: Option<EdgeType>,
    #[serde(default)]
    pub weight: Option<Weight>,
    #[serde(default)]
    pub bidirectional: bool,
}

/// A full topology: nodes first, then the edges between them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyDesc {
    #[serde(default)]
    pub nodes: Vec<NodeDesc>,
    #[serde(default)]
    pub edges: Vec<EdgeDesc>,
}

impl TopologyDesc {
    pub fn from_yaml(yaml: &str) -> Result<Self, TopologyError> {
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            error!(target: LOG_TARGET, "Failed to deserialize topology: {e}");
            TopologyError::Description(e.to_string())
        })
    }

    /// Read the file at `path` and deserialize it from YAML.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            error!(target: LOG_TARGET, "Failed to read topology from {}: {e}", path.display());
            TopologyError::Description(format!("{}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }
}

impl TopoGraph {
    /// Build a graph from a description. All the nodes are added before the edges, in the order
    /// they are given.
    pub fn from_desc(desc: &TopologyDesc) -> Result<Self, TopologyError> {
        let mut graph = TopoGraph::new();
        for node in &desc.nodes {
            if !graph.add_node(TopoNode::from(node)) {
                debug!(target: LOG_TARGET, "Ignoring duplicate node {}:{}:{}", node.device, node.node_type, node.inst);
            }
        }
        for edge in &desc.edges {
            // use the stored nodes so that the local flag takes part in type inference
            let src = graph.get_node(&edge.src.node()).cloned().unwrap_or_else(|| edge.src.node());
            let dst = graph.get_node(&edge.dst.node()).cloned().unwrap_or_else(|| edge.dst.node());
            let mut topo_edge = match edge.edge_type {
                Some(edge_type) => TopoEdge::new(edge_type, edge.src_port, edge.dst_port),
                None => TopoEdge::between(&src, &dst, edge.src_port, edge.dst_port),
            };
            if let Some(weight) = edge.weight {
                topo_edge = topo_edge.with_weight(weight);
            }
            if edge.bidirectional {
                graph.add_biedge(&src, &dst, topo_edge)?;
            } else {
                graph.add_edge(&src, &dst, topo_edge)?;
            }
        }
        info!(
            target: LOG_TARGET,
            "Built topology graph with {} nodes and {} edges",
            graph.num_nodes(),
            graph.num_edges()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use pretty_assertions::assert_eq;

    const TOPOLOGY: &str = r#"
nodes:
  - { device: 1, type: sep, inst: 512, local: true, epid: 1 }
  - { device: 1, type: xport, inst: 0 }
  - { device: 1, type: xbar, inst: 0, extended_info: 4 }
  - { device: 1, type: sep, inst: 0, epid: 2 }
  - { device: 1, type: sep, inst: 1, epid: 3 }
edges:
  - { src: "1:sep:512", dst: "1:xport:0", bidirectional: true }
  - { src: "1:xport:0", dst: "1:xbar:0", src_port: 0, dst_port: 0, bidirectional: true }
  - { src: "1:xbar:0", dst: "1:sep:0", src_port: 1, dst_port: 0, bidirectional: true }
  - { src: "1:xbar:0", dst: "1:sep:1", src_port: 2, dst_port: 0, bidirectional: true, weight: 3 }
  - { src: "1:sep:0", dst: "2:xbar:0", src_port: 1, dst_port: 0, type: off_chip }
"#;

    #[test]
    fn test_node_key() {
        let key = NodeKey::from_str("1:xbar:0").unwrap();
        assert_eq!(key.node(), TopoNode::new(1, NodeType::Xbar, 0));
        assert_eq!(key.to_string(), "1:xbar:0");
        assert_eq!(NodeKey::from_str(" 2:strm_ep:3 ").unwrap().to_string(), "2:sep:3");
        for bad in ["1:xbar", "1:xbar:0:0", "x:xbar:0", "1:radio:0", "1:xbar:-1", ""] {
            assert_eq!(
                NodeKey::from_str(bad),
                Err(TopologyError::InvalidNodeKey(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_build_from_yaml() {
        let desc = TopologyDesc::from_yaml(TOPOLOGY).unwrap();
        assert_eq!(desc.nodes.len(), 5);
        assert_eq!(desc.edges[1].src_port, Port::Num(0));
        assert_eq!(desc.edges[0].src_port, Port::Any);

        let graph = TopoGraph::from_desc(&desc).unwrap();
        // the off-chip edge adds the remote crossbar
        assert_eq!(graph.num_nodes(), 6);
        assert_eq!(graph.num_edges(), 9);

        let host = TopoNode::sep(1, 512, true, None);
        let xport = TopoNode::new(1, NodeType::Xport, 0);
        let xbar = TopoNode::new(1, NodeType::Xbar, 0);
        let sep1 = TopoNode::new(1, NodeType::StrmEp, 1);
        assert_eq!(graph.get_edge(&host, &xport).unwrap().edge_type, EdgeType::Host);
        assert_eq!(graph.get_edge(&xport, &host).unwrap().edge_type, EdgeType::Host);
        assert_eq!(graph.get_edge(&xport, &xbar).unwrap().edge_type, EdgeType::OnChip);
        assert_eq!(graph.get_edge(&sep1, &xbar).unwrap().weight, 3);
        assert_eq!(graph.get_node(&xbar).unwrap().extended_info, 4);
        assert_eq!(graph.get_node(&sep1).unwrap().epid, Some(3));

        let route: Route = graph.get_route(&host, &sep1).unwrap();
        assert_eq!(
            route.to_string(),
            "device[local]:1/sep:512,*-H->device:1/xport:0,0->device:1/xbar:0,2->device:1/sep:1,"
        );
        assert_eq!(route.distance(), 5);
    }

    #[test]
    fn test_bad_descriptions() {
        assert!(matches!(
            TopologyDesc::from_yaml("nodes: [ { device: 1, type: radio, inst: 0 } ]"),
            Err(TopologyError::Description(_))
        ));
        assert!(matches!(
            TopologyDesc::from_yaml("edges: [ { src: \"1:xbar\", dst: \"1:sep:0\" } ]"),
            Err(TopologyError::Description(_))
        ));

        // edges from undeclared nodes are rejected
        let desc = TopologyDesc::from_yaml("edges: [ { src: \"1:xbar:0\", dst: \"1:sep:0\" } ]").unwrap();
        assert_eq!(
            TopoGraph::from_desc(&desc).unwrap_err(),
            TopologyError::UnknownSourceNode(TopoNode::new(1, NodeType::Xbar, 0))
        );

        // port clash
        let desc = TopologyDesc::from_yaml(
            r#"
nodes: [ { device: 1, type: xbar, inst: 0 } ]
edges:
  - { src: "1:xbar:0", dst: "1:sep:0", src_port: 1 }
  - { src: "1:xbar:0", dst: "1:sep:1", src_port: 1 }
"#,
        )
        .unwrap();
        assert!(matches!(
            TopoGraph::from_desc(&desc),
            Err(TopologyError::SourcePortInUse(_, Port::Num(1)))
        ));

        assert!(TopologyDesc::load(Path::new("/nonexistent/topology.yaml")).is_err());
    }
}
