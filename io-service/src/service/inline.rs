// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inline I/O service

use super::{IoService, IoServiceKind};
use crate::errors::IoServiceError;
use crate::link::{RecvLinkHandle, SendLinkHandle, recv_link_id, send_link_id};
use parking_lot::Mutex;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, trace};

#[derive(Debug, Default)]
struct AttachedLinks {
    recv: Vec<RecvLinkHandle>,
    send: Vec<SendLinkHandle>,
}

/// An I/O service without a thread of its own: links are serviced by whoever calls
/// [`InlineIoService::service`].
#[derive(Debug, Default)]
pub struct InlineIoService {
    links: Mutex<AttachedLinks>,
}

impl InlineIoService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One receive pass over all the recv links. Returns the number of frames moved.
    pub fn service_recv(&self) -> usize {
        // links are serviced without holding the lock
        let links = self.links.lock().recv.clone();
        links.iter().map(|link| link.service_recv()).sum()
    }

    /// One send pass over all the send links. Returns the number of frames moved.
    pub fn service_send(&self) -> usize {
        let links = self.links.lock().send.clone();
        links.iter().map(|link| link.service_send()).sum()
    }

    /// One pass over all the links.
    pub fn service(&self) -> usize {
        self.service_recv() + self.service_send()
    }

    /// A receive pass in which every recv link may wait for frames, sharing `timeout` between
    /// them. `None` if no link can wait.
    pub fn wait_recv(&self, timeout: Duration) -> Option<usize> {
        let links = self.links.lock().recv.clone();
        let timeout = share(timeout, links.len());
        links
            .iter()
            .filter_map(|link| link.wait_recv(timeout))
            .reduce(|a, b| a + b)
    }

    /// A send pass in which every send link may wait, sharing `timeout` between them. `None` if
    /// no link can wait.
    pub fn wait_send(&self, timeout: Duration) -> Option<usize> {
        let links = self.links.lock().send.clone();
        let timeout = share(timeout, links.len());
        links
            .iter()
            .filter_map(|link| link.wait_send(timeout))
            .reduce(|a, b| a + b)
    }
}

fn share(timeout: Duration, links: usize) -> Duration {
    u32::try_from(links)
        .ok()
        .filter(|&n| n > 0)
        .map_or(timeout, |n| timeout / n)
}

impl IoService for InlineIoService {
    fn kind(&self) -> IoServiceKind {
        IoServiceKind::Inline
    }

    fn attach_recv_link(&self, link: RecvLinkHandle) -> Result<(), IoServiceError> {
        let mut links = self.links.lock();
        let id = recv_link_id(&link);
        if links.recv.iter().any(|l| recv_link_id(l) == id) {
            error!("Recv link {id:#x} already attached to I/O service");
            return Err(IoServiceError::LinkAlreadyAttached("Recv"));
        }
        trace!("Attaching recv link {id:#x}");
        links.recv.push(link);
        Ok(())
    }

    fn attach_send_link(&self, link: SendLinkHandle) -> Result<(), IoServiceError> {
        let mut links = self.links.lock();
        let id = send_link_id(&link);
        if links.send.iter().any(|l| send_link_id(l) == id) {
            error!("Send link {id:#x} already attached to I/O service");
            return Err(IoServiceError::LinkAlreadyAttached("Send"));
        }
        trace!("Attaching send link {id:#x}");
        links.send.push(link);
        Ok(())
    }

    fn detach_recv_link(&self, link: &RecvLinkHandle) -> Result<(), IoServiceError> {
        let mut links = self.links.lock();
        let id = recv_link_id(link);
        let Some(pos) = links.recv.iter().position(|l| recv_link_id(l) == id) else {
            error!("Recv link {id:#x} is not attached to I/O service");
            return Err(IoServiceError::LinkNotAttached("Recv"));
        };
        trace!("Detaching recv link {id:#x}");
        links.recv.remove(pos);
        Ok(())
    }

    fn detach_send_link(&self, link: &SendLinkHandle) -> Result<(), IoServiceError> {
        let mut links = self.links.lock();
        let id = send_link_id(link);
        let Some(pos) = links.send.iter().position(|l| send_link_id(l) == id) else {
            error!("Send link {id:#x} is not attached to I/O service");
            return Err(IoServiceError::LinkNotAttached("Send"));
        };
        trace!("Detaching send link {id:#x}");
        links.send.remove(pos);
        Ok(())
    }

    fn num_recv_links(&self) -> usize {
        self.links.lock().recv.len()
    }

    fn num_send_links(&self) -> usize {
        self.links.lock().send.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkPair;
    use crate::link::test_links::{TestLink, recv, send};
    use crate::service::{attach_pair, detach_pair};
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_attach_detach() {
        let link = TestLink::new(0);
        let srv = InlineIoService::new();
        srv.attach_recv_link(recv(&link)).unwrap();
        srv.attach_send_link(send(&link)).unwrap();
        assert_eq!((srv.num_recv_links(), srv.num_send_links()), (1, 1));

        assert_eq!(
            srv.attach_recv_link(recv(&link)),
            Err(IoServiceError::LinkAlreadyAttached("Recv"))
        );
        assert!(logs_contain("already attached"));

        srv.detach_recv_link(&recv(&link)).unwrap();
        assert_eq!(
            srv.detach_recv_link(&recv(&link)),
            Err(IoServiceError::LinkNotAttached("Recv"))
        );
        srv.detach_send_link(&send(&link)).unwrap();
        assert_eq!((srv.num_recv_links(), srv.num_send_links()), (0, 0));
    }

    #[test]
    fn test_attach_pair_is_all_or_nothing() {
        let a = TestLink::new(0);
        let b = TestLink::new(0);
        let srv = InlineIoService::new();
        srv.attach_send_link(send(&b)).unwrap();

        // the send link is taken: the recv link must not stay attached
        let pair = LinkPair::new(Some(recv(&a)), Some(send(&b)));
        assert!(attach_pair(&srv, &pair).is_err());
        assert_eq!((srv.num_recv_links(), srv.num_send_links()), (0, 1));

        let pair = LinkPair::new(Some(recv(&a)), Some(send(&a)));
        attach_pair(&srv, &pair).unwrap();
        assert_eq!((srv.num_recv_links(), srv.num_send_links()), (1, 2));
        detach_pair(&srv, &pair).unwrap();
        assert_eq!((srv.num_recv_links(), srv.num_send_links()), (0, 1));
    }

    #[test]
    fn test_service_pass() {
        let a = TestLink::new(0);
        let b = TestLink::new(1);
        let srv = InlineIoService::new();
        srv.attach_recv_link(recv(&a)).unwrap();
        srv.attach_recv_link(recv(&b)).unwrap();
        srv.attach_send_link(send(&b)).unwrap();

        srv.service();
        srv.service_recv();
        assert_eq!((a.recv_calls(), a.send_calls()), (2, 0));
        assert_eq!((b.recv_calls(), b.send_calls()), (2, 1));
    }

    #[test]
    fn test_wait_pass_needs_a_waiting_link() {
        let a = TestLink::new(0);
        let srv = InlineIoService::new();
        assert_eq!(srv.wait_recv(Duration::from_millis(10)), None);
        srv.attach_recv_link(recv(&a)).unwrap();
        srv.attach_send_link(send(&a)).unwrap();
        // test links cannot wait, and are not serviced by a wait pass
        assert_eq!(srv.wait_recv(Duration::from_millis(10)), None);
        assert_eq!(srv.wait_send(Duration::from_millis(10)), None);
        assert_eq!((a.recv_calls(), a.send_calls()), (0, 0));
        assert_eq!(share(Duration::from_millis(100), 4), Duration::from_millis(25));
        assert_eq!(share(Duration::from_millis(100), 0), Duration::from_millis(100));
    }
}
