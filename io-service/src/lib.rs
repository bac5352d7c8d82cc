// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! I/O services for host transport links.
//!
//! An I/O service moves frames on the receive and send links attached to it, either inline in
//! the thread of its caller or in a dedicated offload thread that blocks or polls. The managers
//! in [`mgr`] decide, per pair of links, which service the links are attached to.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod args;
mod errors;
pub mod link;
pub mod mgr;
pub mod service;

pub use crate::args::{IoServiceArgs, IoServiceArgsBuilder, merge_io_service_dev_args};
pub use errors::IoServiceError;
pub use link::{
    AdapterId, LinkPair, LinkPairKey, LinkType, RecvLink, RecvLinkHandle, SendLink, SendLinkHandle,
};
pub use mgr::{
    BlockingIoServiceMgr, InlineIoServiceMgr, IoServiceManager, IoServiceMgr, IoServiceStrategy,
    PollingIoServiceMgr,
};
pub use service::{
    ClientType, InlineIoService, IoService, IoServiceHandle, IoServiceKind, OffloadIoService,
    OffloadParams, OffloadParamsBuilder, WaitMode,
};

/// Log target of the I/O service managers.
pub const MGR_LOG_TARGET: &str = "io-srv";

/// Log target of the offload workers.
pub const OFFLOAD_LOG_TARGET: &str = "io-srv-offload";
