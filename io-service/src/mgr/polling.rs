// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Polling offload I/O service manager

use super::IoServiceMgr;
use crate::MGR_LOG_TARGET;
use crate::args::{IoServiceArgs, cpu_for};
use crate::errors::IoServiceError;
use crate::link::{LinkPair, LinkPairKey, LinkType};
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
struct PollWorker {
    thread_index: usize,
    io_srv: IoServiceHandle,
    connections: usize,
}

#[derive(Debug)]
struct Connection {
    links: LinkPair,
    thread_index: usize,
    mux_refs: usize,
}

#[derive(Debug)]
struct State {
    workers: Vec<PollWorker>,
    connections: HashMap<LinkPairKey, Connection, RandomState>,
}

/// Spreads links over a pool of polling offload workers shared by every streamer of a device.
///
/// New workers are started until `num_poll_offload_threads` are running. After that, links go to
/// the worker with the fewest connections. Muxed links stay on the worker they were first given.
#[derive(Debug)]
pub struct PollingIoServiceMgr {
    state: Mutex<State>,
}

impl Default for PollingIoServiceMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingIoServiceMgr {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                workers: Vec::new(),
                connections: HashMap::with_hasher(RandomState::with_seed(0)),
            }),
        }
    }

    /// Number of running polling workers
    #[must_use]
    pub fn num_io_services(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// Number of connections, counting every connect of muxed links
    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.state.lock().connections.values().map(|c| c.mux_refs).sum()
    }

    /// Connections of each worker, by thread index
    #[must_use]
    pub fn worker_loads(&self) -> Vec<(usize, usize)> {
        let state = self.state.lock();
        let mut loads: Vec<_> = state
            .workers
            .iter()
            .map(|w| (w.thread_index, w.connections))
            .collect();
        loads.sort_unstable();
        loads
    }

    fn new_worker(args: &IoServiceArgs, thread_index: usize) -> Result<PollWorker, IoServiceError> {
        let cpu = cpu_for(&args.poll_offload_thread_cpu, thread_index);
        info!(
            target: MGR_LOG_TARGET,
            "Creating new polling I/O service, cpu affinity: {}",
            cpu.map_or_else(|| "none".to_string(), |cpu| cpu.to_string())
        );
        let params = OffloadParams {
            wait_mode: WaitMode::Poll,
            client_type: ClientType::Both,
            cpu_affinity: cpu.into_iter().collect(),
            thread_name: format!("io-srv-poll-{thread_index}"),
        };
        Ok(PollWorker {
            thread_index,
            io_srv: Arc::new(OffloadIoService::new(params)?),
            connections: 0,
        })
    }
}

impl State {
    /// Position of the worker the next new pair goes to, starting one if the pool is not full.
    fn select_worker(&mut self, args: &IoServiceArgs) -> Result<usize, IoServiceError> {
        if self.workers.len() < args.num_poll_offload_threads {
            let thread_index = (0..)
                .find(|index| self.workers.iter().all(|w| w.thread_index != *index))
                .unwrap_or(self.workers.len());
            self.workers
                .push(PollingIoServiceMgr::new_worker(args, thread_index)?);
            return Ok(self.workers.len() - 1);
        }
        self.workers
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| (w.connections, w.thread_index))
            .map(|(pos, _)| pos)
            .ok_or_else(|| {
                error!(target: MGR_LOG_TARGET, "No polling I/O service available");
                IoServiceError::InvalidConfig("no polling offload threads".to_string())
            })
    }

    fn worker_mut(&mut self, thread_index: usize) -> Option<&mut PollWorker> {
        self.workers
            .iter_mut()
            .find(|w| w.thread_index == thread_index)
    }
}

impl IoServiceMgr for PollingIoServiceMgr {
    fn connect_links(
        &self,
        links: &LinkPair,
        _link_type: LinkType,
        args: &IoServiceArgs,
        _streamer_id: &str,
    ) -> Result<IoServiceHandle, IoServiceError> {
        let key = links.key();
        let mut state = self.state.lock();

        if let Some(thread_index) = state.connections.get(&key).map(|c| c.thread_index) {
            let Some(worker) = state.worker_mut(thread_index) else {
                error!(target: MGR_LOG_TARGET, "Polling I/O service {thread_index} of links {key} is gone");
                return Err(IoServiceError::NotConnected(key));
            };
            worker.connections += 1;
            let io_srv = worker.io_srv.clone();
            if let Some(connection) = state.connections.get_mut(&key) {
                connection.mux_refs += 1;
                debug!(target: MGR_LOG_TARGET, "Muxing links {key} on polling I/O service {thread_index} (refs: {})", connection.mux_refs);
            }
            return Ok(io_srv);
        }

        let pos = state.select_worker(args)?;
        let worker = &mut state.workers[pos];
        if let Err(e) = attach_pair(worker.io_srv.as_ref(), links) {
            if worker.connections == 0 {
                state.workers.remove(pos);
            }
            return Err(e);
        }
        worker.connections += 1;
        let thread_index = worker.thread_index;
        let io_srv = worker.io_srv.clone();
        debug!(target: MGR_LOG_TARGET, "Connected links {key} to polling I/O service {thread_index}");
        state.connections.insert(
            key,
            Connection {
                links: links.clone(),
                thread_index,
                mux_refs: 1,
            },
        );
        Ok(io_srv)
    }

    fn disconnect_links(&self, links: &LinkPair) -> Result<(), IoServiceError> {
        let key = links.key();
        let mut state = self.state.lock();
        let Some(connection) = state.connections.get_mut(&key) else {
            error!(target: MGR_LOG_TARGET, "Cannot disconnect links {key}: not connected");
            return Err(IoServiceError::NotConnected(key));
        };
        connection.mux_refs -= 1;
        let thread_index = connection.thread_index;
        let last = connection.mux_refs == 0;
        let removed = if last {
            state.connections.remove(&key)
        } else {
            None
        };

        let Some(pos) = state
            .workers
            .iter()
            .position(|w| w.thread_index == thread_index)
        else {
            error!(target: MGR_LOG_TARGET, "Polling I/O service {thread_index} of links {key} is gone");
            return Err(IoServiceError::NotConnected(key));
        };
        let worker = &mut state.workers[pos];
        worker.connections -= 1;
        let detached = match removed {
            Some(connection) => detach_pair(worker.io_srv.as_ref(), &connection.links),
            None => Ok(()),
        };
        if worker.connections == 0 {
            debug!(target: MGR_LOG_TARGET, "Releasing polling I/O service {thread_index}");
            state.workers.remove(pos);
        }
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::test_links::{TestLink, recv, send};
    use crate::service::IoServiceKind;

    fn pair(link: &Arc<TestLink>) -> LinkPair {
        LinkPair::new(Some(recv(link)), Some(send(link)))
    }

    fn args(threads: usize) -> IoServiceArgs {
        IoServiceArgs {
            num_poll_offload_threads: threads,
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_fills_then_balances() {
        let mgr = PollingIoServiceMgr::new();
        let args = args(2);
        let links: Vec<_> = (0..4).map(|_| TestLink::new(0)).collect();

        let s0 = mgr.connect_links(&pair(&links[0]), LinkType::RxData, &args, "a").unwrap();
        assert_eq!(s0.kind(), IoServiceKind::PollingOffload);
        let s1 = mgr.connect_links(&pair(&links[1]), LinkType::TxData, &args, "b").unwrap();
        assert!(!Arc::ptr_eq(&s0, &s1));
        assert_eq!(mgr.worker_loads(), vec![(0, 1), (1, 1)]);

        // pool is full: ties go to the lowest thread index
        let s2 = mgr.connect_links(&pair(&links[2]), LinkType::RxData, &args, "c").unwrap();
        assert!(Arc::ptr_eq(&s0, &s2));
        let s3 = mgr.connect_links(&pair(&links[3]), LinkType::RxData, &args, "c").unwrap();
        assert!(Arc::ptr_eq(&s1, &s3));
        assert_eq!(mgr.worker_loads(), vec![(0, 2), (1, 2)]);

        mgr.disconnect_links(&pair(&links[0])).unwrap();
        mgr.disconnect_links(&pair(&links[2])).unwrap();
        assert_eq!(mgr.worker_loads(), vec![(1, 2)]);
        assert_eq!(mgr.num_io_services(), 1);

        // a free slot starts a worker with the lowest unused index
        let s4 = mgr.connect_links(&pair(&links[0]), LinkType::RxData, &args, "a").unwrap();
        assert!(!Arc::ptr_eq(&s1, &s4));
        assert_eq!(mgr.worker_loads(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_least_loaded_worker() {
        let mgr = PollingIoServiceMgr::new();
        let args = args(2);
        let links: Vec<_> = (0..4).map(|_| TestLink::new(0)).collect();
        for link in &links[..3] {
            mgr.connect_links(&pair(link), LinkType::RxData, &args, "s").unwrap();
        }
        assert_eq!(mgr.worker_loads(), vec![(0, 2), (1, 1)]);
        let s1 = mgr.connect_links(&pair(&links[3]), LinkType::RxData, &args, "s").unwrap();
        assert_eq!(mgr.worker_loads(), vec![(0, 2), (1, 2)]);
        assert_eq!(s1.num_recv_links(), 2);
    }

    #[test]
    fn test_muxed_links() {
        let mgr = PollingIoServiceMgr::new();
        let args = args(1);
        let link = TestLink::new(0);
        let p = pair(&link);
        let first = mgr.connect_links(&p, LinkType::Ctrl, &args, "s").unwrap();
        let second = mgr.connect_links(&p, LinkType::Ctrl, &args, "s").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.num_recv_links(), 1);
        assert_eq!(mgr.worker_loads(), vec![(0, 2)]);
        assert_eq!(mgr.num_connections(), 2);

        mgr.disconnect_links(&p).unwrap();
        assert_eq!(mgr.worker_loads(), vec![(0, 1)]);
        assert_eq!(first.num_recv_links(), 1);
        mgr.disconnect_links(&p).unwrap();
        assert_eq!(mgr.num_io_services(), 0);
        assert_eq!(first.num_recv_links(), 0);
        assert_eq!(
            mgr.disconnect_links(&p),
            Err(IoServiceError::NotConnected(p.key()))
        );
    }
}
