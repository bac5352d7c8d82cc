// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Blocking offload I/O service manager

use super::IoServiceMgr;
use crate::MGR_LOG_TARGET;
use crate::args::{IoServiceArgs, cpu_for};
use crate::errors::IoServiceError;
use crate::link::{AdapterId, LinkPair, LinkPairKey, LinkType};
use crate::service::{
    ClientType, IoServiceHandle, OffloadIoService, OffloadParams, WaitMode, attach_pair,
    detach_pair,
};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info};

#[derive(Debug)]
struct Connection {
    links: LinkPair,
    streamer_id: String,
    adapter_id: AdapterId,
}

/// An offload service owned by a streamer, for one transport adapter.
#[derive(Debug)]
struct AdapterService {
    adapter_id: AdapterId,
    thread_index: usize,
    io_srv: IoServiceHandle,
    connections: usize,
}

#[derive(Debug)]
struct State {
    connections: HashMap<LinkPairKey, Connection, RandomState>,
    streamers: HashMap<String, Vec<AdapterService>, RandomState>,
}

/// Creates one blocking offload I/O service per transport adapter used by a streamer. Different
/// streamers never share services. Muxed links are not supported.
#[derive(Debug)]
pub struct BlockingIoServiceMgr {
    state: Mutex<State>,
}

impl Default for BlockingIoServiceMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingIoServiceMgr {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                connections: HashMap::with_hasher(RandomState::with_seed(0)),
                streamers: HashMap::with_hasher(RandomState::with_seed(0)),
            }),
        }
    }

    #[must_use]
    pub fn num_io_services(&self) -> usize {
        self.state.lock().streamers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    fn new_io_service(
        args: &IoServiceArgs,
        link_type: LinkType,
        streamer_id: &str,
        thread_index: usize,
    ) -> Result<IoServiceHandle, IoServiceError> {
        let (client_type, cpus) = match link_type {
            LinkType::RxData => (ClientType::RecvOnly, &args.recv_offload_thread_cpu),
            _ => (ClientType::SendOnly, &args.send_offload_thread_cpu),
        };
        let cpu = cpu_for(cpus, thread_index);
        info!(
            target: MGR_LOG_TARGET,
            "Creating new blocking I/O service for {link_type}, cpu affinity: {}",
            cpu.map_or_else(|| "none".to_string(), |cpu| cpu.to_string())
        );
        let params = OffloadParams {
            wait_mode: WaitMode::Block,
            client_type,
            cpu_affinity: cpu.into_iter().collect(),
            thread_name: format!("io-srv-blk-{streamer_id}-{thread_index}"),
        };
        Ok(Arc::new(OffloadIoService::new(params)?))
    }
}

impl IoServiceMgr for BlockingIoServiceMgr {
    fn connect_links(
        &self,
        links: &LinkPair,
        link_type: LinkType,
        args: &IoServiceArgs,
        streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError> {
        let adapter_id = match link_type {
            LinkType::RxData => links.recv.as_ref().map(|l| l.recv_adapter_id()),
            LinkType::TxData => links.send.as_ref().map(|l| l.send_adapter_id()),
            LinkType::Ctrl | LinkType::AsyncMsg => {
                error!(target: MGR_LOG_TARGET, "Blocking I/O services only handle data links, not {link_type}");
                return Err(IoServiceError::UnsupportedLinkType(link_type));
            }
        };
        let Some(adapter_id) = adapter_id else {
            let missing = if link_type == LinkType::RxData { "recv" } else { "send" };
            error!(target: MGR_LOG_TARGET, "Cannot connect {link_type} links without a {missing} link");
            return Err(IoServiceError::MissingLink(link_type, missing));
        };

        let key = links.key();
        let mut state = self.state.lock();
        if state.connections.contains_key(&key) {
            error!(target: MGR_LOG_TARGET, "Links {key} are already connected to a blocking I/O service");
            return Err(IoServiceError::MuxNotSupported);
        }

        let services = state.streamers.entry(streamer_id.to_owned()).or_default();
        let io_srv = if let Some(service) = services.iter_mut().find(|s| s.adapter_id == adapter_id) {
            attach_pair(service.io_srv.as_ref(), links)?;
            service.connections += 1;
            service.io_srv.clone()
        } else {
            let thread_index = (0..)
                .find(|index| services.iter().all(|s| s.thread_index != *index))
                .unwrap_or(services.len());
            let created = Self::new_io_service(args, link_type, streamer_id, thread_index)
                .and_then(|io_srv| attach_pair(io_srv.as_ref(), links).map(|()| io_srv));
            let io_srv = match created {
                Ok(io_srv) => io_srv,
                Err(e) => {
                    if services.is_empty() {
                        state.streamers.remove(streamer_id);
                    }
                    return Err(e);
                }
            };
            services.push(AdapterService {
                adapter_id,
                thread_index,
                io_srv: io_srv.clone(),
                connections: 1,
            });
            io_srv
        };

        debug!(target: MGR_LOG_TARGET, "Connected {link_type} links {key} of streamer {streamer_id} on {adapter_id}");
        state.connections.insert(
            key,
            Connection {
                links: links.clone(),
                streamer_id: streamer_id.to_owned(),
                adapter_id,
            },
        );
        Ok(io_srv)
    }

    fn disconnect_links(&self, links: &LinkPair) -> Result<(), IoServiceError> {
        let key = links.key();
        let mut state = self.state.lock();
        let Some(connection) = state.connections.remove(&key) else {
            error!(target: MGR_LOG_TARGET, "Cannot disconnect links {key}: not connected");
            return Err(IoServiceError::NotConnected(key));
        };
        let Some(services) = state.streamers.get_mut(&connection.streamer_id) else {
            error!(target: MGR_LOG_TARGET, "No I/O services for streamer {}", connection.streamer_id);
            return Err(IoServiceError::NotConnected(key));
        };
        let Some(pos) = services
            .iter()
            .position(|s| s.adapter_id == connection.adapter_id)
        else {
            error!(target: MGR_LOG_TARGET, "Streamer {} has no I/O service for {}", connection.streamer_id, connection.adapter_id);
            return Err(IoServiceError::NotConnected(key));
        };

        let service = &mut services[pos];
        let detached = detach_pair(service.io_srv.as_ref(), &connection.links);
        service.connections -= 1;
        if service.connections == 0 {
            debug!(
                target: MGR_LOG_TARGET,
                "Releasing blocking I/O service {} of streamer {}",
                service.thread_index,
                connection.streamer_id
            );
            services.remove(pos);
        }
        if services.is_empty() {
            state.streamers.remove(&connection.streamer_id);
        }
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::test_links::{TestLink, recv, send};
    use crate::service::IoServiceKind;
    use tracing_test::traced_test;

    fn rx(link: &Arc<TestLink>) -> LinkPair {
        LinkPair::recv_only(recv(link))
    }

    #[test]
    fn test_one_service_per_adapter() {
        let mgr = BlockingIoServiceMgr::new();
        let args = IoServiceArgs::default();
        let ch0 = TestLink::new(1);
        let ch1 = TestLink::new(1);
        let ch2 = TestLink::new(2);

        let s0 = mgr.connect_links(&rx(&ch0), LinkType::RxData, &args, "strm1").unwrap();
        let s1 = mgr.connect_links(&rx(&ch1), LinkType::RxData, &args, "strm1").unwrap();
        assert!(Arc::ptr_eq(&s0, &s1));
        assert_eq!(s0.kind(), IoServiceKind::BlockingOffload);
        assert_eq!(s0.num_recv_links(), 2);
        assert_eq!(mgr.num_io_services(), 1);

        // another adapter, another thread
        let s2 = mgr.connect_links(&rx(&ch2), LinkType::RxData, &args, "strm1").unwrap();
        assert!(!Arc::ptr_eq(&s0, &s2));
        assert_eq!(mgr.num_io_services(), 2);

        // another streamer never shares
        let ch3 = TestLink::new(1);
        let s3 = mgr.connect_links(&rx(&ch3), LinkType::RxData, &args, "strm2").unwrap();
        assert!(!Arc::ptr_eq(&s0, &s3));
        assert_eq!(mgr.num_io_services(), 3);
        assert_eq!(mgr.num_connections(), 4);

        mgr.disconnect_links(&rx(&ch0)).unwrap();
        assert_eq!(mgr.num_io_services(), 3);
        assert_eq!(s0.num_recv_links(), 1);
        mgr.disconnect_links(&rx(&ch1)).unwrap();
        assert_eq!(mgr.num_io_services(), 2);
        mgr.disconnect_links(&rx(&ch2)).unwrap();
        mgr.disconnect_links(&rx(&ch3)).unwrap();
        assert_eq!(mgr.num_io_services(), 0);
        assert_eq!(mgr.num_connections(), 0);
    }

    #[test]
    #[traced_test]
    fn test_rejections() {
        let mgr = BlockingIoServiceMgr::new();
        let args = IoServiceArgs::default();
        let link = TestLink::new(1);
        let pair = LinkPair::new(Some(recv(&link)), Some(send(&link)));

        assert_eq!(
            mgr.connect_links(&pair, LinkType::Ctrl, &args, "s").unwrap_err(),
            IoServiceError::UnsupportedLinkType(LinkType::Ctrl)
        );
        assert_eq!(
            mgr.connect_links(&LinkPair::send_only(send(&link)), LinkType::RxData, &args, "s")
                .unwrap_err(),
            IoServiceError::MissingLink(LinkType::RxData, "recv")
        );
        assert!(logs_contain("without a recv link"));

        let io_srv = mgr.connect_links(&pair, LinkType::TxData, &args, "s").unwrap();
        assert_eq!((io_srv.num_recv_links(), io_srv.num_send_links()), (1, 1));
        assert_eq!(
            mgr.connect_links(&pair, LinkType::TxData, &args, "s").unwrap_err(),
            IoServiceError::MuxNotSupported
        );
        assert_eq!(mgr.num_connections(), 1);

        mgr.disconnect_links(&pair).unwrap();
        assert_eq!(
            mgr.disconnect_links(&pair),
            Err(IoServiceError::NotConnected(pair.key()))
        );
    }

    #[test]
    fn test_thread_index_reuse_and_cpu() {
        let mgr = BlockingIoServiceMgr::new();
        let args = IoServiceArgs {
            recv_offload_thread_cpu: vec![Some(0), Some(0)],
            ..Default::default()
        };
        let a = TestLink::new(1);
        let b = TestLink::new(2);
        let c = TestLink::new(3);
        mgr.connect_links(&rx(&a), LinkType::RxData, &args, "s").unwrap();
        mgr.connect_links(&rx(&b), LinkType::RxData, &args, "s").unwrap();
        mgr.disconnect_links(&rx(&a)).unwrap();
        // index 0 is free again
        mgr.connect_links(&rx(&c), LinkType::RxData, &args, "s").unwrap();
        let state = mgr.state.lock();
        let mut indexes: Vec<_> = state.streamers["s"]
            .iter()
            .map(|s| (s.adapter_id, s.thread_index))
            .collect();
        indexes.sort();
        assert_eq!(indexes, vec![(AdapterId(2), 1), (AdapterId(3), 0)]);
    }
}
