// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! I/O service managers.
//!
//! A manager decides which I/O service the links of a streamer are attached to. There is one
//! manager per strategy (inline, blocking offload and polling offload) and a composite
//! [`IoServiceManager`] which picks the strategy from the configuration and the link type.

mod blocking;
mod composite;
mod inline;
mod polling;

pub use blocking::BlockingIoServiceMgr;
pub use composite::{IoServiceManager, IoServiceStrategy};
pub use inline::InlineIoServiceMgr;
pub use polling::PollingIoServiceMgr;

use crate::args::IoServiceArgs;
use crate::errors::IoServiceError;
use crate::link::{LinkPair, LinkType};
use crate::service::IoServiceHandle;

/// Connects pairs of links to I/O services.
pub trait IoServiceMgr: Send + Sync {
    /// Attach the links to an I/O service and return that service. The pair must be given to
    /// [`IoServiceMgr::disconnect_links`] once for every successful connect.
    fn connect_links(
        &self,
        links: &LinkPair,
        link_type: LinkType,
        args: &IoServiceArgs,
        streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError>;

    /// Release a connection made by [`IoServiceMgr::connect_links`].
    fn disconnect_links(&self, links: &LinkPair) -> Result<(), IoServiceError>;
}
