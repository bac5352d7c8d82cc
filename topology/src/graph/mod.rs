// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The topology graph: a directed, weighted multigraph of the nodes of all devices in a session
//! and the edges connecting them.

mod dot;

use crate::LOG_TARGET;
use crate::edge::{Port, TopoEdge, Weight};
use crate::errors::TopologyError;
use crate::node::{NodeHash, TopoNode};
use crate::route::{Route, RouteElement};
use ahash::RandomState;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Index of a vertex. Vertices are never removed, so this is also the insertion order.
type VertexIdx = usize;
/// Index of an edge in the edge list.
type EdgeIdx = usize;

#[derive(Debug, Clone)]
struct Vertex {
    node: TopoNode,
    out_edges: Vec<EdgeIdx>,
    in_edges: Vec<EdgeIdx>,
}

#[derive(Debug, Clone)]
struct EdgeEntry {
    src: VertexIdx,
    dst: VertexIdx,
    edge: TopoEdge,
}

/// The topology graph.
///
/// Edges are kept in a single list indexed by edge index. That list is the only place where
/// edge weights are stored: routing, distances and the graphviz rendering all read from it.
#[derive(Debug, Clone)]
pub struct TopoGraph {
    vertices: Vec<Vertex>,
    edges: Vec<EdgeEntry>,
    node_map: HashMap<NodeHash, VertexIdx, RandomState>,
}

impl Default for TopoGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TopoGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            node_map: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.vertices.len()
    }
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
    #[must_use]
    pub fn contains(&self, node: &TopoNode) -> bool {
        self.node_map.contains_key(&node.unique_id())
    }

    /// The stored copy of a node, with its current non-identifying fields.
    #[must_use]
    pub fn get_node(&self, node_id: &TopoNode) -> Option<&TopoNode> {
        self.vertex_of(node_id).map(|idx| &self.vertices[idx].node)
    }

    fn vertex_of(&self, node: &TopoNode) -> Option<VertexIdx> {
        self.node_map.get(&node.unique_id()).copied()
    }

    fn lookup(&self, node: &TopoNode, verb: &'static str) -> Result<VertexIdx, TopologyError> {
        self.vertex_of(node).ok_or_else(|| {
            error!(target: LOG_TARGET, "Cannot {verb}: node {node} not found in topology graph");
            TopologyError::NodeNotFound {
                verb,
                node: node.clone(),
            }
        })
    }

    /// Add a node to the graph. Returns false if a node with the same identity was already
    /// present, in which case the graph is left unchanged.
    pub fn add_node(&mut self, node: TopoNode) -> bool {
        let id = node.unique_id();
        if self.node_map.contains_key(&id) {
            return false;
        }
        trace!(target: LOG_TARGET, "Adding node {node}");
        self.node_map.insert(id, self.vertices.len());
        self.vertices.push(Vertex {
            node,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        });
        true
    }

    /// Check that `edge` can go from `src` to `dst` without reusing a concrete port. Nodes that
    /// are not in the graph have no port in use.
    fn check_ports(
        &self,
        src: &TopoNode,
        dst: &TopoNode,
        edge: &TopoEdge,
    ) -> Result<(), TopologyError> {
        if let Some(src_idx) = self.vertex_of(src)
            && self.vertices[src_idx]
                .out_edges
                .iter()
                .any(|&e| self.edges[e].edge.src_port.conflicts_with(edge.src_port))
        {
            error!(target: LOG_TARGET, "Attempting to reconnect source port {} of node {src}", edge.src_port);
            return Err(TopologyError::SourcePortInUse(src.clone(), edge.src_port));
        }
        if let Some(dst_idx) = self.vertex_of(dst)
            && self.vertices[dst_idx]
                .in_edges
                .iter()
                .any(|&e| self.edges[e].edge.dst_port.conflicts_with(edge.dst_port))
        {
            error!(target: LOG_TARGET, "Attempting to reconnect destination port {} of node {dst}", edge.dst_port);
            return Err(TopologyError::DestinationPortInUse(dst.clone(), edge.dst_port));
        }
        Ok(())
    }

    fn known_source(&self, src: &TopoNode) -> Result<VertexIdx, TopologyError> {
        self.vertex_of(src).ok_or_else(|| {
            error!(target: LOG_TARGET, "Attempting to add a route from unknown source node {src}");
            TopologyError::UnknownSourceNode(src.clone())
        })
    }

    /// Store an edge whose ports have been checked.
    fn insert_edge(&mut self, src_idx: VertexIdx, dst: &TopoNode, edge: TopoEdge) -> bool {
        let added = self.add_node(dst.clone());
        let dst_idx = self.node_map[&dst.unique_id()];
        let edge_idx = self.edges.len();
        debug!(
            target: LOG_TARGET,
            "Adding edge #{edge_idx} {} -> {dst}: {edge}",
            self.vertices[src_idx].node
        );
        self.edges.push(EdgeEntry {
            src: src_idx,
            dst: dst_idx,
            edge,
        });
        self.vertices[src_idx].out_edges.push(edge_idx);
        self.vertices[dst_idx].in_edges.push(edge_idx);
        added
    }

    /// Add a directed edge from `src` to `dst`.
    ///
    /// The source node must already be in the graph. The destination node is added if needed,
    /// and the return value tells whether it was new. Concrete ports can only be used by one
    /// edge on each side; [`Port::Any`] can be reused. On error the graph is left unchanged.
    pub fn add_edge(
        &mut self,
        src: &TopoNode,
        dst: &TopoNode,
        edge: TopoEdge,
    ) -> Result<bool, TopologyError> {
        let src_idx = self.known_source(src)?;
        self.check_ports(src, dst, &edge)?;
        Ok(self.insert_edge(src_idx, dst, edge))
    }

    /// Add an edge from `src` to `dst` and its reverse, with the ports swapped. Both edges are
    /// checked before any is added, so on error the graph is left unchanged.
    ///
    /// Returns whether `dst` was newly added.
    pub fn add_biedge(
        &mut self,
        src: &TopoNode,
        dst: &TopoNode,
        edge: TopoEdge,
    ) -> Result<bool, TopologyError> {
        let src_idx = self.known_source(src)?;
        let reverse = edge.reversed();
        self.check_ports(src, dst, &edge)?;
        self.check_ports(dst, src, &reverse)?;
        // a loop uses both ports of the same node on each side
        if src == dst && edge.src_port.conflicts_with(reverse.src_port) {
            error!(target: LOG_TARGET, "Attempting to reconnect source port {} of node {src}", reverse.src_port);
            return Err(TopologyError::SourcePortInUse(src.clone(), reverse.src_port));
        }
        let added = self.insert_edge(src_idx, dst, edge);
        let dst_idx = self.node_map[&dst.unique_id()];
        self.insert_edge(dst_idx, src, reverse);
        Ok(added)
    }

    fn assert_route(
        &self,
        src: &TopoNode,
        dst: &TopoNode,
        verb: &'static str,
    ) -> Result<(VertexIdx, VertexIdx), TopologyError> {
        Ok((self.lookup(src, verb)?, self.lookup(dst, verb)?))
    }

    /// Breadth-first search from `start`, stopping as soon as `visit` returns true.
    /// Returns true if the search was stopped.
    fn bfs(&self, start: VertexIdx, mut visit: impl FnMut(VertexIdx) -> bool) -> bool {
        let mut discovered = vec![false; self.vertices.len()];
        let mut frontier = VecDeque::from([start]);
        discovered[start] = true;
        if visit(start) {
            return true;
        }
        while let Some(v) = frontier.pop_front() {
            for &e in &self.vertices[v].out_edges {
                let next = self.edges[e].dst;
                if discovered[next] {
                    continue;
                }
                discovered[next] = true;
                if visit(next) {
                    return true;
                }
                frontier.push_back(next);
            }
        }
        false
    }

    /// Tell whether `dst` can be reached from `src` following the direction of the edges.
    pub fn has_route(&self, src: &TopoNode, dst: &TopoNode) -> Result<bool, TopologyError> {
        let (src_idx, dst_idx) = self.assert_route(src, dst, "check route")?;
        Ok(self.bfs(src_idx, |v| v == dst_idx))
    }

    /// Single-source shortest paths from `src`. Returns, for every vertex, the index of the edge
    /// through which it is reached on a shortest path. The source and unreachable vertices have
    /// none.
    fn shortest_paths(&self, src: VertexIdx) -> Vec<Option<EdgeIdx>> {
        let mut dist: Vec<Option<u64>> = vec![None; self.vertices.len()];
        let mut pred: Vec<Option<EdgeIdx>> = vec![None; self.vertices.len()];
        let mut done = vec![false; self.vertices.len()];
        let mut queue: PriorityQueue<VertexIdx, Reverse<(u64, VertexIdx)>, RandomState> =
            PriorityQueue::with_hasher(RandomState::with_seed(0));

        dist[src] = Some(0);
        queue.push(src, Reverse((0, src)));
        while let Some((v, Reverse((d, _)))) = queue.pop() {
            done[v] = true;
            for &e in &self.vertices[v].out_edges {
                let entry = &self.edges[e];
                let next = entry.dst;
                if done[next] {
                    continue;
                }
                let candidate = d + u64::from(entry.edge.get_weight());
                if dist[next].is_none_or(|current| candidate < current) {
                    dist[next] = Some(candidate);
                    pred[next] = Some(e);
                    queue.push_increase(next, Reverse((candidate, next)));
                }
            }
        }
        pred
    }

    /// Shortest route from `src` to `dst`.
    ///
    /// Each hop carries the stored edge leaving its node, the last hop carries an end-of-route
    /// edge. Among routes of equal length the one through earlier inserted nodes wins.
    pub fn get_route(&self, src: &TopoNode, dst: &TopoNode) -> Result<Route, TopologyError> {
        let (src_idx, dst_idx) = self.assert_route(src, dst, "get route")?;
        let pred = self.shortest_paths(src_idx);

        if src_idx != dst_idx && pred[dst_idx].is_none() {
            error!(target: LOG_TARGET, "Cannot create route from {src} to {dst}, no route was found");
            return Err(TopologyError::NoRoute(src.clone(), dst.clone()));
        }

        let mut hops = vec![RouteElement {
            node: self.vertices[dst_idx].node.clone(),
            edge: TopoEdge::end_of_route(),
        }];
        let mut current = dst_idx;
        while current != src_idx {
            let Some(e) = pred[current] else {
                error!(target: LOG_TARGET, "Broken predecessor chain at {}", self.vertices[current].node);
                return Err(TopologyError::NoRoute(src.clone(), dst.clone()));
            };
            let entry = &self.edges[e];
            hops.push(RouteElement {
                node: self.vertices[entry.src].node.clone(),
                edge: entry.edge.clone(),
            });
            current = entry.src;
        }
        hops.reverse();
        Ok(Route::new(hops))
    }

    /// Shortest route to `dst` from any of the nodes selected by `src_filter`.
    ///
    /// Candidates that cannot reach `dst` are skipped. Candidates are tried in insertion order
    /// and the first one with the smallest distance wins. If no candidate reaches `dst` the
    /// route is empty.
    pub fn get_best_route(
        &self,
        src_filter: impl Fn(&TopoNode) -> bool,
        dst: &TopoNode,
    ) -> Result<Route, TopologyError> {
        self.lookup(dst, "get best route")?;
        let mut best: Option<(u64, Route)> = None;
        for vertex in self.vertices.iter().filter(|v| src_filter(&v.node)) {
            if !self.has_route(&vertex.node, dst)? {
                continue;
            }
            let route = self.get_route(&vertex.node, dst)?;
            let distance = route.distance();
            if best.as_ref().is_none_or(|(shortest, _)| distance < *shortest) {
                best = Some((distance, route));
            }
        }
        Ok(best.map(|(_, route)| route).unwrap_or_default())
    }

    /// Length of the shortest route from `src` to `dst`.
    pub fn get_distance(&self, src: &TopoNode, dst: &TopoNode) -> Result<u64, TopologyError> {
        Ok(self.get_route(src, dst)?.distance())
    }

    /// The first edge (in insertion order) going directly from `src` to `dst`.
    pub fn get_edge(&self, src: &TopoNode, dst: &TopoNode) -> Result<TopoEdge, TopologyError> {
        let (src_idx, dst_idx) = self.assert_route(src, dst, "get edge")?;
        self.vertices[src_idx]
            .out_edges
            .iter()
            .map(|&e| &self.edges[e])
            .find(|entry| entry.dst == dst_idx)
            .map(|entry| entry.edge.clone())
            .ok_or_else(|| {
                error!(target: LOG_TARGET, "Failed to find edge between {src} and {dst}");
                TopologyError::NoEdge(src.clone(), dst.clone())
            })
    }

    /// All the nodes matching `filter`, in insertion order.
    pub fn get_nodes(&self, filter: impl Fn(&TopoNode) -> bool) -> Vec<TopoNode> {
        self.vertices
            .iter()
            .map(|v| &v.node)
            .filter(|node| filter(node))
            .cloned()
            .collect()
    }

    /// All the nodes matching `filter` that can be reached from `src`, in breadth-first
    /// discovery order. `src` itself is never part of the result.
    pub fn get_connected_nodes(
        &self,
        src: &TopoNode,
        filter: impl Fn(&TopoNode) -> bool,
    ) -> Result<Vec<TopoNode>, TopologyError> {
        let src_idx = self.lookup(src, "get connected nodes")?;
        let mut found = Vec::new();
        self.bfs(src_idx, |v| {
            let node = &self.vertices[v].node;
            if v != src_idx && filter(node) {
                found.push(node.clone());
            }
            false
        });
        Ok(found)
    }

    /// Mutable access to the stored copy of a node, to update its non-identifying fields.
    pub fn access_node(&mut self, node_id: &TopoNode) -> Result<&mut TopoNode, TopologyError> {
        let idx = self.lookup(node_id, "access node")?;
        Ok(&mut self.vertices[idx].node)
    }

    /// Change the weight of the first outgoing edge of `src` which uses `src_port`.
    pub fn update_weight(
        &mut self,
        src: &TopoNode,
        src_port: Port,
        new_weight: Weight,
    ) -> Result<(), TopologyError> {
        let src_idx = self.lookup(src, "update weight")?;
        let Some(&e) = self.vertices[src_idx]
            .out_edges
            .iter()
            .find(|&&e| self.edges[e].edge.src_port == src_port)
        else {
            error!(target: LOG_TARGET, "Could not find edge for node {src}, source port {src_port}");
            return Err(TopologyError::NoEdgeForPort(src.clone(), src_port));
        };
        debug!(
            target: LOG_TARGET,
            "Updating weight of edge #{e} from {src} port {src_port}: {} -> {new_weight}",
            self.edges[e].edge.weight
        );
        self.edges[e].edge.weight = new_weight;
        Ok(())
    }
}
