// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inline I/O service manager

use super::IoServiceMgr;
use crate::MGR_LOG_TARGET;
use crate::args::IoServiceArgs;
use crate::errors::IoServiceError;
use crate::link::{LinkPair, LinkPairKey, LinkType};
use crate::service::{InlineIoService, IoServiceHandle, attach_pair, detach_pair};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info};

#[derive(Debug)]
struct Connection {
    links: LinkPair,
    io_srv: IoServiceHandle,
    mux_refs: usize,
}

/// Creates an inline I/O service for every new pair of links. A pair that is connected again
/// (muxed links) shares the service it already has.
#[derive(Debug)]
pub struct InlineIoServiceMgr {
    connections: Mutex<HashMap<LinkPairKey, Connection, RandomState>>,
}

impl Default for InlineIoServiceMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineIoServiceMgr {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::with_hasher(RandomState::with_seed(0))),
        }
    }

    /// Number of live I/O services
    #[must_use]
    pub fn num_io_services(&self) -> usize {
        self.connections.lock().len()
    }

    /// Number of connections, counting every connect of muxed links
    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.connections.lock().values().map(|c| c.mux_refs).sum()
    }
}

impl IoServiceMgr for InlineIoServiceMgr {
    fn connect_links(
        &self,
        links: &LinkPair,
        _link_type: LinkType,
        _args: &IoServiceArgs,
        _streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError> {
        let key = links.key();
        let mut connections = self.connections.lock();
        if let Some(connection) = connections.get_mut(&key) {
            connection.mux_refs += 1;
            debug!(target: MGR_LOG_TARGET, "Muxing links {key} on inline I/O service (refs: {})", connection.mux_refs);
            return Ok(connection.io_srv.clone());
        }

        let io_srv: IoServiceHandle = Arc::new(InlineIoService::new());
        attach_pair(io_srv.as_ref(), links)?;
        debug!(target: MGR_LOG_TARGET, "Connected links {key} to new inline I/O service");
        connections.insert(
            key,
            Connection {
                links: links.clone(),
                io_srv: io_srv.clone(),
                mux_refs: 1,
            },
        );
        Ok(io_srv)
    }

    fn disconnect_links(&self, links: &LinkPair) -> Result<(), IoServiceError> {
        let key = links.key();
        let mut connections = self.connections.lock();
        let Some(connection) = connections.get_mut(&key) else {
            error!(target: MGR_LOG_TARGET, "Cannot disconnect links {key}: not connected");
            return Err(IoServiceError::NotConnected(key));
        };
        connection.mux_refs -= 1;
        if connection.mux_refs > 0 {
            return Ok(());
        }
        if let Some(connection) = connections.remove(&key) {
            detach_pair(connection.io_srv.as_ref(), &connection.links)?;
            debug!(target: MGR_LOG_TARGET, "Disconnected links {key} from inline I/O service");
        }
        Ok(())
    }
}
