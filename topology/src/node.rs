// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Nodes of the topology graph

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

/// Identifies the device (motherboard) a node lives on.
pub type DeviceId = u16;

/// Instance number of a node within its device.
pub type NodeInst = u16;

/// Stream endpoint ID.
pub type EndpointId = u16;

/// The device id that no real device ever gets.
pub const NULL_DEVICE_ID: DeviceId = 0;

/// The hash type returned by [`TopoNode::unique_id`].
pub type NodeHash = u64;

/// The type of a node in the data-flow graph.
///
/// The discriminants match the node type codes reported by the FPGA.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum NodeType {
    /// The FPGA never reports a node of this type
    #[default]
    #[strum(to_string = "unknown", serialize = "invalid")]
    #[serde(alias = "unknown")]
    Invalid = 0,
    /// CHDR crossbar
    #[strum(to_string = "xbar")]
    Xbar = 1,
    /// Stream endpoint
    #[strum(to_string = "sep", serialize = "strm_ep")]
    #[serde(rename = "sep", alias = "strm_ep")]
    StrmEp = 2,
    /// Transport adapter
    #[strum(to_string = "xport")]
    Xport = 3,
    /// Endpoint outside of the session's devices. Has no FPGA counterpart.
    #[strum(to_string = "virtual")]
    Virtual = 100,
}

/// A node in the topology graph: a crossbar, stream endpoint, transport adapter or virtual
/// endpoint.
///
/// The identity of a node is given by its device id, its type and its instance number. The
/// remaining fields carry extra information which does not take part in comparisons and may be
/// updated in place through [`crate::TopoGraph::access_node`].
#[derive(Clone, Debug, Default)]
pub struct TopoNode {
    device_id: DeviceId,
    node_type: NodeType,
    inst: NodeInst,
    /// Type-dependent extra information: number of ports of a crossbar, data/ctrl capabilities
    /// of a stream endpoint, transport subtype of a transport adapter.
    pub extended_info: u32,
    /// Endpoint id. Only meaningful for stream endpoints and virtual nodes.
    pub epid: Option<EndpointId>,
    /// True for stream endpoints which live within this session (host side).
    pub is_local_sep: bool,
}

impl TopoNode {
    #[must_use]
    pub fn new(device_id: DeviceId, node_type: NodeType, inst: NodeInst) -> Self {
        Self {
            device_id,
            node_type,
            inst,
            extended_info: 0,
            epid: None,
            is_local_sep: false,
        }
    }

    /// Build a stream endpoint node.
    #[must_use]
    pub fn sep(device_id: DeviceId, inst: NodeInst, is_local: bool, epid: Option<EndpointId>) -> Self {
        Self {
            epid,
            is_local_sep: is_local,
            ..Self::new(device_id, NodeType::StrmEp, inst)
        }
    }

    #[must_use]
    pub fn with_extended_info(mut self, extended_info: u32) -> Self {
        self.extended_info = extended_info;
        self
    }

    #[must_use]
    pub fn with_epid(mut self, epid: EndpointId) -> Self {
        self.epid = Some(epid);
        self
    }

    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }
    #[must_use]
    pub fn inst(&self) -> NodeInst {
        self.inst
    }

    /// Stream endpoint address of this node.
    #[must_use]
    pub fn sep_addr(&self) -> (DeviceId, NodeInst) {
        (self.device_id, self.inst)
    }

    /// Hash of the identifying fields. Equal nodes always produce the same value.
    #[must_use]
    pub fn unique_id(&self) -> NodeHash {
        u64::from(self.inst) + (u64::from(self.device_id) << 16) + ((self.node_type as u64) << 32)
    }
}

impl PartialEq for TopoNode {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id() == other.unique_id()
    }
}
impl Eq for TopoNode {}

impl Hash for TopoNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id().hash(state);
    }
}

impl PartialOrd for TopoNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TopoNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.unique_id().cmp(&other.unique_id())
    }
}

impl Display for TopoNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = if self.is_local_sep { "[local]" } else { "" };
        write!(
            f,
            "device{local}:{}/{}:{}",
            self.device_id, self.node_type, self.inst
        )
    }
}
