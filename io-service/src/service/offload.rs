// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Offload I/O service: a worker thread servicing links on behalf of its clients.

use super::{InlineIoService, IoService, IoServiceKind};
use crate::OFFLOAD_LOG_TARGET;
use crate::errors::IoServiceError;
use crate::link::{RecvLinkHandle, SendLinkHandle};
use derive_builder::Builder;
use kanal::{ReceiveErrorTimeout, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// How long a blocking worker waits when its links had nothing to do.
///
/// Links that can wait for frames share this time and wake the worker as soon as a frame is
/// ready; attach and detach requests may be delayed by up to this long. When no link can wait,
/// the worker waits for requests instead, so a frame arriving on such a link may wait up to
/// this long to be serviced.
const BLOCKING_TIMEOUT: Duration = Duration::from_millis(100);

/// How an offload worker waits for work.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WaitMode {
    /// Sleep until there is work
    #[default]
    Block,
    /// Spin on the links
    Poll,
}

/// Which links an offload worker services.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum ClientType {
    #[strum(to_string = "recv only")]
    RecvOnly,
    #[strum(to_string = "send only")]
    SendOnly,
    #[default]
    #[strum(to_string = "send and recv")]
    Both,
}

/// Parameters of an offload I/O service.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OffloadParams {
    #[builder(default = WaitMode::Poll)]
    pub wait_mode: WaitMode,

    #[builder(default)]
    pub client_type: ClientType,

    /// CPUs the worker thread may run on. Empty means no restriction.
    #[builder(default)]
    pub cpu_affinity: Vec<usize>,

    #[builder(setter(into), default = "io-srv-offload".to_string())]
    pub thread_name: String,
}

impl OffloadParamsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.wait_mode == Some(WaitMode::Block) && self.client_type == Some(ClientType::Both) {
            return Err(IoServiceError::BlockingBothClients.to_string());
        }
        Ok(())
    }
}

type Reply = Sender<Result<(), IoServiceError>>;

enum Request {
    AttachRecv(RecvLinkHandle, Reply),
    AttachSend(SendLinkHandle, Reply),
    DetachRecv(RecvLinkHandle, Reply),
    DetachSend(SendLinkHandle, Reply),
    Shutdown,
}

/// An I/O service backed by a dedicated worker thread.
///
/// Attach and detach requests are executed by the worker, in between servicing passes, and the
/// caller waits until they are done. Dropping the service stops the worker.
pub struct OffloadIoService {
    params: OffloadParams,
    inline: Arc<InlineIoService>,
    requests: Sender<Request>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for OffloadIoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadIoService")
            .field("params", &self.params)
            .field("inline", &self.inline)
            .finish_non_exhaustive()
    }
}

impl OffloadIoService {
    pub fn new(params: OffloadParams) -> Result<Self, IoServiceError> {
        if params.wait_mode == WaitMode::Block && params.client_type == ClientType::Both {
            error!(target: OFFLOAD_LOG_TARGET, "Blocking offload I/O services cannot have both send and recv clients");
            return Err(IoServiceError::BlockingBothClients);
        }
        let inline = Arc::new(InlineIoService::new());
        let (requests, incoming) = kanal::unbounded();
        let worker = Worker {
            params: params.clone(),
            inline: inline.clone(),
            requests: incoming,
        };
        let handle = std::thread::Builder::new()
            .name(params.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                error!(target: OFFLOAD_LOG_TARGET, "Failed to spawn offload worker {}: {e}", params.thread_name);
                IoServiceError::Worker(e.to_string())
            })?;
        Ok(Self {
            params,
            inline,
            requests,
            worker: Mutex::new(Some(handle)),
        })
    }

    #[must_use]
    pub fn params(&self) -> &OffloadParams {
        &self.params
    }

    /// Send a request to the worker and wait for its outcome.
    fn request(&self, make: impl FnOnce(Reply) -> Request) -> Result<(), IoServiceError> {
        let (reply, outcome) = kanal::bounded(1);
        self.requests.send(make(reply)).map_err(|e| {
            error!(target: OFFLOAD_LOG_TARGET, "Failed to push request to {}: {e}", self.params.thread_name);
            IoServiceError::Worker(e.to_string())
        })?;
        outcome.recv().map_err(|e| {
            error!(target: OFFLOAD_LOG_TARGET, "No reply from {}: {e}", self.params.thread_name);
            IoServiceError::Worker(e.to_string())
        })?
    }
}

impl IoService for OffloadIoService {
    fn kind(&self) -> IoServiceKind {
        match self.params.wait_mode {
            WaitMode::Block => IoServiceKind::BlockingOffload,
            WaitMode::Poll => IoServiceKind::PollingOffload,
        }
    }
    fn attach_recv_link(&self, link: RecvLinkHandle) -> Result<(), IoServiceError> {
        self.request(|reply| Request::AttachRecv(link, reply))
    }
    fn attach_send_link(&self, link: SendLinkHandle) -> Result<(), IoServiceError> {
        self.request(|reply| Request::AttachSend(link, reply))
    }
    fn detach_recv_link(&self, link: &RecvLinkHandle) -> Result<(), IoServiceError> {
        self.request(|reply| Request::DetachRecv(link.clone(), reply))
    }
    fn detach_send_link(&self, link: &SendLinkHandle) -> Result<(), IoServiceError> {
        self.request(|reply| Request::DetachSend(link.clone(), reply))
    }
    fn num_recv_links(&self) -> usize {
        self.inline.num_recv_links()
    }
    fn num_send_links(&self) -> usize {
        self.inline.num_send_links()
    }
}

impl Drop for OffloadIoService {
    fn drop(&mut self) {
        if let Err(e) = self.requests.send(Request::Shutdown) {
            warn!(target: OFFLOAD_LOG_TARGET, "Could not stop {}: {e}", self.params.thread_name);
        }
        if let Some(handle) = self.worker.lock().take()
            && handle.join().is_err()
        {
            error!(target: OFFLOAD_LOG_TARGET, "Offload worker {} panicked", self.params.thread_name);
        }
    }
}

struct Worker {
    params: OffloadParams,
    inline: Arc<InlineIoService>,
    requests: Receiver<Request>,
}

impl Worker {
    fn run(self) {
        let name = self.params.thread_name.as_str();
        info!(target: OFFLOAD_LOG_TARGET, worker = name, "Offload worker started ({} wait, {} clients)", self.params.wait_mode, self.params.client_type);
        set_cpu_affinity(&self.params.cpu_affinity);
        loop {
            // requests first, so that attach/detach are never starved by busy links
            loop {
                match self.requests.try_recv() {
                    Ok(Some(request)) => {
                        if !self.handle(request) {
                            info!(target: OFFLOAD_LOG_TARGET, worker = name, "Offload worker stopped");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        info!(target: OFFLOAD_LOG_TARGET, worker = name, "Request channel closed, offload worker stopped");
                        return;
                    }
                }
            }
            if self.service() > 0 {
                continue;
            }
            if self.params.wait_mode == WaitMode::Poll {
                std::thread::yield_now();
                continue;
            }
            // links that can wait wake the worker as soon as they have frames
            if self.wait_on_links().is_none() {
                match self.requests.recv_timeout(BLOCKING_TIMEOUT) {
                    Ok(request) => {
                        if !self.handle(request) {
                            info!(target: OFFLOAD_LOG_TARGET, worker = name, "Offload worker stopped");
                            return;
                        }
                    }
                    Err(ReceiveErrorTimeout::Timeout) => {}
                    Err(_) => {
                        info!(target: OFFLOAD_LOG_TARGET, worker = name, "Request channel closed, offload worker stopped");
                        return;
                    }
                }
            }
        }
    }

    fn service(&self) -> usize {
        match self.params.client_type {
            ClientType::RecvOnly => self.inline.service_recv(),
            ClientType::SendOnly => self.inline.service_send(),
            ClientType::Both => self.inline.service(),
        }
    }

    /// Block on the links until one of them has work or the timeout expires.
    fn wait_on_links(&self) -> Option<usize> {
        match self.params.client_type {
            ClientType::RecvOnly => self.inline.wait_recv(BLOCKING_TIMEOUT),
            ClientType::SendOnly => self.inline.wait_send(BLOCKING_TIMEOUT),
            ClientType::Both => None,
        }
    }

    /// Execute a request. Returns false if the worker must stop.
    fn handle(&self, request: Request) -> bool {
        let (outcome, reply) = match request {
            Request::AttachRecv(link, reply) => (self.inline.attach_recv_link(link), reply),
            Request::AttachSend(link, reply) => (self.inline.attach_send_link(link), reply),
            Request::DetachRecv(link, reply) => (self.inline.detach_recv_link(&link), reply),
            Request::DetachSend(link, reply) => (self.inline.detach_send_link(&link), reply),
            Request::Shutdown => return false,
        };
        if reply.send(outcome).is_err() {
            warn!(target: OFFLOAD_LOG_TARGET, "Requester of {} went away", self.params.thread_name);
        }
        true
    }
}

/// Pin the calling thread to the given CPUs.
#[cfg(target_os = "linux")]
fn set_cpu_affinity(cpus: &[usize]) {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    if cpus.is_empty() {
        return;
    }
    let mut set = CpuSet::new();
    for &cpu in cpus {
        if let Err(e) = set.set(cpu) {
            warn!(target: OFFLOAD_LOG_TARGET, "Cannot pin to cpu {cpu}: {e}");
            return;
        }
    }
    match sched_setaffinity(Pid::from_raw(0), &set) {
        Ok(()) => debug!(target: OFFLOAD_LOG_TARGET, "Pinned to cpus {cpus:?}"),
        Err(e) => warn!(target: OFFLOAD_LOG_TARGET, "Failed to set cpu affinity {cpus:?}: {e}"),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(cpus: &[usize]) {
    if !cpus.is_empty() {
        warn!(target: OFFLOAD_LOG_TARGET, "Cpu affinity not supported on this platform, ignoring {cpus:?}");
    }
}
