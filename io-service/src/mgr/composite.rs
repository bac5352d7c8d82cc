// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The I/O service manager of a device: picks a strategy for every connection and delegates to
//! the manager of that strategy.

use super::{BlockingIoServiceMgr, InlineIoServiceMgr, IoServiceMgr, PollingIoServiceMgr};
use crate::MGR_LOG_TARGET;
use crate::args::{IoServiceArgs, merge_io_service_dev_args};
use crate::errors::IoServiceError;
use crate::link::{LinkPair, LinkPairKey, LinkType};
use crate::service::{IoServiceHandle, WaitMode};
use ahash::RandomState;
use args::DeviceArgs;
use parking_lot::Mutex;
use std::collections::HashMap;
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Where the links of a connection are serviced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IoServiceStrategy {
    Inline,
    Blocking,
    Polling,
}

#[derive(Debug)]
struct Connection {
    strategy: IoServiceStrategy,
    refs: usize,
}

/// Connects the links of all the streamers of a device.
///
/// Control links are always serviced inline. Data links are offloaded when the configuration
/// asks for it in their direction, as long as their buffers may be released out of order.
#[derive(Debug)]
pub struct IoServiceManager {
    device_args: DeviceArgs,
    inline: InlineIoServiceMgr,
    blocking: BlockingIoServiceMgr,
    polling: PollingIoServiceMgr,
    connections: Mutex<HashMap<LinkPairKey, Connection, RandomState>>,
}

impl IoServiceManager {
    /// Create the manager of a device. `device_args` is the base for the configuration of every
    /// streamer connected with [`IoServiceManager::connect_links_with_stream_args`].
    #[must_use]
    pub fn new(device_args: DeviceArgs) -> Self {
        Self {
            device_args,
            inline: InlineIoServiceMgr::new(),
            blocking: BlockingIoServiceMgr::new(),
            polling: PollingIoServiceMgr::new(),
            connections: Mutex::new(HashMap::with_hasher(RandomState::with_seed(0))),
        }
    }

    #[must_use]
    pub fn device_args(&self) -> &DeviceArgs {
        &self.device_args
    }

    /// The strategy links are connected with, if they are.
    #[must_use]
    pub fn strategy_of(&self, links: &LinkPair) -> Option<IoServiceStrategy> {
        self.connections.lock().get(&links.key()).map(|c| c.strategy)
    }

    /// Number of live I/O services, over all strategies
    #[must_use]
    pub fn num_io_services(&self) -> usize {
        self.inline.num_io_services()
            + self.blocking.num_io_services()
            + self.polling.num_io_services()
    }

    /// Connect links with the configuration of the device, overridden by the I/O service keys
    /// of `stream_args`. Keys given by neither take their value from `defaults`.
    pub fn connect_links_with_stream_args(
        &self,
        links: &LinkPair,
        link_type: LinkType,
        defaults: &IoServiceArgs,
        stream_args: &DeviceArgs,
        streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError> {
        let merged = merge_io_service_dev_args(&self.device_args, stream_args);
        let args = IoServiceArgs::read(&merged, defaults)?;
        self.connect_links(links, link_type, &args, streamer_id)
    }

    fn select_strategy(links: &LinkPair, link_type: LinkType, args: &IoServiceArgs) -> IoServiceStrategy {
        let (offload, wait_mode) = match link_type {
            LinkType::RxData => (args.recv_offload, args.recv_offload_wait_mode),
            LinkType::TxData => (args.send_offload, args.send_offload_wait_mode),
            LinkType::Ctrl | LinkType::AsyncMsg => return IoServiceStrategy::Inline,
        };
        if !offload {
            return IoServiceStrategy::Inline;
        }
        if !links.out_of_order_supported() {
            warn!(
                target: MGR_LOG_TARGET,
                "Cannot offload {link_type} links {}: buffers must be released in order. Using inline I/O service",
                links.key()
            );
            return IoServiceStrategy::Inline;
        }
        match wait_mode {
            WaitMode::Block => IoServiceStrategy::Blocking,
            WaitMode::Poll => IoServiceStrategy::Polling,
        }
    }

    fn mgr(&self, strategy: IoServiceStrategy) -> &dyn IoServiceMgr {
        match strategy {
            IoServiceStrategy::Inline => &self.inline,
            IoServiceStrategy::Blocking => &self.blocking,
            IoServiceStrategy::Polling => &self.polling,
        }
    }
}

impl IoServiceMgr for IoServiceManager {
    fn connect_links(
        &self,
        links: &LinkPair,
        link_type: LinkType,
        args: &IoServiceArgs,
        streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError> {
        if link_type == LinkType::AsyncMsg {
            error!(target: MGR_LOG_TARGET, "Cannot connect {link_type} links: not supported");
            return Err(IoServiceError::UnsupportedLinkType(link_type));
        }

        let key = links.key();
        let mut connections = self.connections.lock();
        let strategy = match connections.get(&key) {
            Some(connection) => connection.strategy,
            None => Self::select_strategy(links, link_type, args),
        };
        debug!(target: MGR_LOG_TARGET, "Connecting {link_type} links {key} of streamer '{streamer_id}' with {strategy} strategy");
        let io_srv = self
            .mgr(strategy)
            .connect_links(links, link_type, args, streamer_id)?;
        connections
            .entry(key)
            .or_insert(Connection { strategy, refs: 0 })
            .refs += 1;
        Ok(io_srv)
    }

    fn disconnect_links(&self, links: &LinkPair) -> Result<(), IoServiceError> {
        let key = links.key();
        let mut connections = self.connections.lock();
        let Some(connection) = connections.get_mut(&key) else {
            error!(target: MGR_LOG_TARGET, "Cannot disconnect links {key}: not connected");
            return Err(IoServiceError::NotConnected(key));
        };
        let strategy = connection.strategy;
        // strategies release their reference even when detaching the links fails
        connection.refs -= 1;
        if connection.refs == 0 {
            connections.remove(&key);
        }
        self.mgr(strategy).disconnect_links(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::test_links::{TestLink, recv, send};
    use crate::service::IoServiceKind;
    use std::str::FromStr;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn pair(link: &Arc<TestLink>) -> LinkPair {
        LinkPair::new(Some(recv(link)), Some(send(link)))
    }

    fn offload(recv_mode: WaitMode, send_mode: WaitMode) -> IoServiceArgs {
        IoServiceArgs {
            recv_offload: true,
            send_offload: true,
            recv_offload_wait_mode: recv_mode,
            send_offload_wait_mode: send_mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_strategy_per_link_type() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let args = offload(WaitMode::Block, WaitMode::Poll);

        let ctrl = TestLink::new(0);
        let io_srv = mgr.connect_links(&pair(&ctrl), LinkType::Ctrl, &args, "").unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::Inline);
        assert_eq!(mgr.strategy_of(&pair(&ctrl)), Some(IoServiceStrategy::Inline));

        let rx = TestLink::new(1);
        let rx_pair = LinkPair::recv_only(recv(&rx));
        let io_srv = mgr.connect_links(&rx_pair, LinkType::RxData, &args, "s0").unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::BlockingOffload);

        let tx = TestLink::new(1);
        let tx_pair = pair(&tx);
        let io_srv = mgr.connect_links(&tx_pair, LinkType::TxData, &args, "s0").unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::PollingOffload);
        assert_eq!(mgr.num_io_services(), 3);

        // no offload requested
        let plain = TestLink::new(1);
        let io_srv = mgr
            .connect_links(&pair(&plain), LinkType::RxData, &IoServiceArgs::default(), "s1")
            .unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::Inline);

        for p in [pair(&ctrl), rx_pair, tx_pair, pair(&plain)] {
            mgr.disconnect_links(&p).unwrap();
            assert_eq!(mgr.strategy_of(&p), None);
        }
        assert_eq!(mgr.num_io_services(), 0);
    }

    #[test]
    #[traced_test]
    fn test_async_msg_rejected() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let link = TestLink::new(0);
        assert_eq!(
            mgr.connect_links(&pair(&link), LinkType::AsyncMsg, &IoServiceArgs::default(), "")
                .unwrap_err(),
            IoServiceError::UnsupportedLinkType(LinkType::AsyncMsg)
        );
        assert!(logs_contain("not supported"));
        assert_eq!(mgr.num_io_services(), 0);
    }

    #[test]
    #[traced_test]
    fn test_in_order_links_are_not_offloaded() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let link = TestLink::in_order(0);
        let p = pair(&link);
        let io_srv = mgr
            .connect_links(&p, LinkType::RxData, &offload(WaitMode::Poll, WaitMode::Poll), "s")
            .unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::Inline);
        assert!(logs_contain("buffers must be released in order"));
        mgr.disconnect_links(&p).unwrap();
    }

    #[test]
    fn test_muxed_links_keep_their_strategy() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let link = TestLink::new(0);
        let p = pair(&link);
        let first = mgr
            .connect_links(&p, LinkType::RxData, &offload(WaitMode::Poll, WaitMode::Poll), "s")
            .unwrap();
        // the configuration of the second connect does not matter anymore
        let second = mgr
            .connect_links(&p, LinkType::Ctrl, &IoServiceArgs::default(), "s")
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mgr.strategy_of(&p), Some(IoServiceStrategy::Polling));

        mgr.disconnect_links(&p).unwrap();
        assert_eq!(mgr.strategy_of(&p), Some(IoServiceStrategy::Polling));
        mgr.disconnect_links(&p).unwrap();
        assert_eq!(mgr.strategy_of(&p), None);
        assert_eq!(
            mgr.disconnect_links(&p),
            Err(IoServiceError::NotConnected(p.key()))
        );
    }

    #[test]
    fn test_failed_connect_is_not_recorded() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let link = TestLink::new(0);
        let p = LinkPair::send_only(send(&link));
        assert_eq!(
            mgr.connect_links(&p, LinkType::RxData, &offload(WaitMode::Block, WaitMode::Block), "s")
                .unwrap_err(),
            IoServiceError::MissingLink(LinkType::RxData, "recv")
        );
        assert_eq!(mgr.strategy_of(&p), None);
    }

    #[test]
    fn test_failed_disconnect_releases_the_pair() {
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let link = TestLink::new(0);
        let p = pair(&link);
        let io_srv = mgr
            .connect_links(&p, LinkType::Ctrl, &IoServiceArgs::default(), "s")
            .unwrap();
        // the recv link goes away behind the manager's back
        io_srv.detach_recv_link(&recv(&link)).unwrap();
        assert_eq!(
            mgr.disconnect_links(&p),
            Err(IoServiceError::LinkNotAttached("Recv"))
        );
        // neither the composite nor the strategy holds the pair anymore
        assert_eq!(mgr.strategy_of(&p), None);
        assert_eq!(mgr.num_io_services(), 0);
        assert!(
            mgr.connect_links(&p, LinkType::Ctrl, &IoServiceArgs::default(), "s")
                .is_ok()
        );
        assert_eq!(mgr.strategy_of(&p), Some(IoServiceStrategy::Inline));
    }

    #[test]
    fn test_concurrent_streamers() {
        const STREAMERS: usize = 8;
        const CYCLES: usize = 20;
        let mgr = IoServiceManager::new(DeviceArgs::new());
        let args = IoServiceArgs {
            num_poll_offload_threads: 2,
            ..offload(WaitMode::Poll, WaitMode::Block)
        };

        std::thread::scope(|scope| {
            for streamer in 0..STREAMERS {
                let (mgr, args) = (&mgr, &args);
                scope.spawn(move || {
                    let streamer_id = format!("streamer-{streamer}");
                    let adapter = u32::try_from(streamer).unwrap();
                    for _ in 0..CYCLES {
                        let ctrl = pair(&TestLink::new(adapter));
                        let rx = LinkPair::recv_only(recv(&TestLink::new(adapter)));
                        let tx = pair(&TestLink::new(adapter));

                        let ctrl_srv = mgr.connect_links(&ctrl, LinkType::Ctrl, args, &streamer_id).unwrap();
                        let rx_srv = mgr.connect_links(&rx, LinkType::RxData, args, &streamer_id).unwrap();
                        let tx_srv = mgr.connect_links(&tx, LinkType::TxData, args, &streamer_id).unwrap();
                        assert_eq!(ctrl_srv.kind(), IoServiceKind::Inline);
                        assert_eq!(rx_srv.kind(), IoServiceKind::PollingOffload);
                        assert_eq!(tx_srv.kind(), IoServiceKind::BlockingOffload);

                        // muxed connects of the inline and polling pairs
                        let again = mgr.connect_links(&ctrl, LinkType::Ctrl, args, &streamer_id).unwrap();
                        assert!(Arc::ptr_eq(&ctrl_srv, &again));
                        let again = mgr.connect_links(&rx, LinkType::RxData, args, &streamer_id).unwrap();
                        assert!(Arc::ptr_eq(&rx_srv, &again));

                        for p in [&ctrl, &ctrl, &rx, &rx, &tx] {
                            mgr.disconnect_links(p).unwrap();
                        }
                        for p in [&ctrl, &rx, &tx] {
                            assert_eq!(mgr.strategy_of(p), None);
                        }
                    }
                });
            }
        });

        assert_eq!(mgr.num_io_services(), 0);
        assert_eq!(mgr.connections.lock().len(), 0);
    }

    #[test]
    fn test_stream_args_override_device_args() {
        let dev = DeviceArgs::from_str("addr=192.168.10.2,recv_offload=1,recv_offload_wait_mode=poll")
            .unwrap();
        let mgr = IoServiceManager::new(dev);
        let defaults = IoServiceArgs::default();
        let a = TestLink::new(0);
        let io_srv = mgr
            .connect_links_with_stream_args(&pair(&a), LinkType::RxData, &defaults, &DeviceArgs::new(), "s0")
            .unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::PollingOffload);

        let b = TestLink::new(0);
        let stream = DeviceArgs::from_str("recv_offload=0").unwrap();
        let io_srv = mgr
            .connect_links_with_stream_args(&pair(&b), LinkType::RxData, &defaults, &stream, "s1")
            .unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::Inline);

        let c = TestLink::new(0);
        let bad = DeviceArgs::from_str("num_poll_offload_threads=0").unwrap();
        assert!(
            mgr.connect_links_with_stream_args(&pair(&c), LinkType::RxData, &defaults, &bad, "s2")
                .is_err()
        );

        // defaults apply to keys given by neither
        let d = TestLink::new(0);
        let send_defaults = IoServiceArgs {
            send_offload: true,
            ..Default::default()
        };
        let io_srv = mgr
            .connect_links_with_stream_args(&pair(&d), LinkType::TxData, &send_defaults, &DeviceArgs::new(), "s3")
            .unwrap();
        assert_eq!(io_srv.kind(), IoServiceKind::BlockingOffload);
    }
}
