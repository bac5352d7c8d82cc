// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! I/O service errors

use crate::link::{LinkPairKey, LinkType};
use args::DeviceArgsError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IoServiceError {
    #[error("Links {0} are not connected to any I/O service")]
    NotConnected(LinkPairKey),
    #[error("Unsupported link type: {0}")]
    UnsupportedLinkType(LinkType),
    #[error("A {0} connection requires a {1} link")]
    MissingLink(LinkType, &'static str),
    #[error("Block option on offload thread is not supported when the transport multiplexes links")]
    MuxNotSupported,
    #[error("{0} link already attached to I/O service")]
    LinkAlreadyAttached(&'static str),
    #[error("{0} link is not attached to I/O service")]
    LinkNotAttached(&'static str),
    #[error("Blocking offload I/O services support a single client type")]
    BlockingBothClients,
    #[error("Invalid I/O service configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    InvalidArgs(#[from] DeviceArgsError),
    #[error("Offload worker failure: {0}")]
    Worker(String),
}
