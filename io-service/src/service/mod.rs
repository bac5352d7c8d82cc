// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! I/O services: execution contexts that move frames on the links attached to them.

mod inline;
mod offload;

pub use inline::InlineIoService;
pub use offload::{ClientType, OffloadIoService, OffloadParams, OffloadParamsBuilder, WaitMode};

use crate::errors::IoServiceError;
use crate::link::{LinkPair, RecvLinkHandle, SendLinkHandle};
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum IoServiceKind {
    /// Serviced in the caller's thread
    #[strum(to_string = "inline")]
    Inline,
    /// Serviced by a worker thread waiting for work
    #[strum(to_string = "blocking offload")]
    BlockingOffload,
    /// Serviced by a worker thread spinning for work
    #[strum(to_string = "polling offload")]
    PollingOffload,
}

/// An execution context for links.
///
/// A link can be attached to a given service only once, and must be detached from the same
/// service it was attached to.
pub trait IoService: Send + Sync + Debug {
    fn kind(&self) -> IoServiceKind;
    fn attach_recv_link(&self, link: RecvLinkHandle) -> Result<(), IoServiceError>;
    fn attach_send_link(&self, link: SendLinkHandle) -> Result<(), IoServiceError>;
    fn detach_recv_link(&self, link: &RecvLinkHandle) -> Result<(), IoServiceError>;
    fn detach_send_link(&self, link: &SendLinkHandle) -> Result<(), IoServiceError>;
    fn num_recv_links(&self) -> usize;
    fn num_send_links(&self) -> usize;
}

/// Shared handle to an I/O service.
pub type IoServiceHandle = Arc<dyn IoService>;

/// Attach both links of a pair. Nothing stays attached if this fails.
pub(crate) fn attach_pair(io_srv: &dyn IoService, pair: &LinkPair) -> Result<(), IoServiceError> {
    if let Some(recv) = &pair.recv {
        io_srv.attach_recv_link(recv.clone())?;
    }
    if let Some(send) = &pair.send
        && let Err(e) = io_srv.attach_send_link(send.clone())
    {
        if let Some(recv) = &pair.recv {
            io_srv.detach_recv_link(recv)?;
        }
        return Err(e);
    }
    Ok(())
}

/// Detach both links of a pair.
pub(crate) fn detach_pair(io_srv: &dyn IoService, pair: &LinkPair) -> Result<(), IoServiceError> {
    if let Some(recv) = &pair.recv {
        io_srv.detach_recv_link(recv)?;
    }
    if let Some(send) = &pair.send {
        io_srv.detach_send_link(send)?;
    }
    Ok(())
}
