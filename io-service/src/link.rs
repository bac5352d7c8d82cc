// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host-side transport links

use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;

/// Identifies the transport adapter a link goes through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(pub u32);

impl Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "adapter-{}", self.0)
    }
}

/// A link frames are received from.
pub trait RecvLink: Send + Sync + Debug {
    fn recv_adapter_id(&self) -> AdapterId;

    /// Whether receive buffers may be released in a different order than they were handed out.
    fn supports_recv_buff_out_of_order(&self) -> bool {
        true
    }

    /// Do one unit of receive work. Returns the number of frames moved.
    fn service_recv(&self) -> usize {
        0
    }

    /// Wait up to `timeout` for a frame to arrive, then do one unit of receive work. Returns the
    /// number of frames moved, or `None` if the link cannot wait for frames.
    fn wait_recv(&self, _timeout: Duration) -> Option<usize> {
        None
    }
}

/// A link frames are sent to.
pub trait SendLink: Send + Sync + Debug {
    fn send_adapter_id(&self) -> AdapterId;

    /// Whether send buffers may be released in a different order than they were handed out.
    fn supports_send_buff_out_of_order(&self) -> bool {
        true
    }

    /// Do one unit of send work. Returns the number of frames moved.
    fn service_send(&self) -> usize {
        0
    }

    /// Wait up to `timeout` for a frame to be ready to go, then do one unit of send work.
    /// Returns the number of frames moved, or `None` if the link cannot wait.
    fn wait_send(&self, _timeout: Duration) -> Option<usize> {
        None
    }
}

pub type RecvLinkHandle = Arc<dyn RecvLink>;
pub type SendLinkHandle = Arc<dyn SendLink>;

/// What a pair of links is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum LinkType {
    #[strum(to_string = "control")]
    Ctrl,
    #[strum(to_string = "async message")]
    AsyncMsg,
    #[strum(to_string = "RX data")]
    RxData,
    #[strum(to_string = "TX data")]
    TxData,
}

/// Identity of a link: the address of the shared link object.
pub(crate) fn recv_link_id(link: &RecvLinkHandle) -> usize {
    Arc::as_ptr(link).cast::<()>().addr()
}
pub(crate) fn send_link_id(link: &SendLinkHandle) -> usize {
    Arc::as_ptr(link).cast::<()>().addr()
}

/// A receive link and a send link that are connected together. Either may be missing.
#[derive(Clone, Debug, Default)]
pub struct LinkPair {
    pub recv: Option<RecvLinkHandle>,
    pub send: Option<SendLinkHandle>,
}

/// Key identifying a [`LinkPair`] by the identity of its links.
///
/// Only meaningful while the links are alive: whoever stores a key also keeps the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkPairKey {
    recv: Option<usize>,
    send: Option<usize>,
}

impl Display for LinkPairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_id = |id: Option<usize>| id.map_or_else(|| "-".to_string(), |id| format!("{id:#x}"));
        write!(f, "(recv: {}, send: {})", fmt_id(self.recv), fmt_id(self.send))
    }
}

impl LinkPair {
    #[must_use]
    pub fn new(recv: Option<RecvLinkHandle>, send: Option<SendLinkHandle>) -> Self {
        Self { recv, send }
    }
    #[must_use]
    pub fn recv_only(recv: RecvLinkHandle) -> Self {
        Self::new(Some(recv), None)
    }
    #[must_use]
    pub fn send_only(send: SendLinkHandle) -> Self {
        Self::new(None, Some(send))
    }

    #[must_use]
    pub fn key(&self) -> LinkPairKey {
        LinkPairKey {
            recv: self.recv.as_ref().map(recv_link_id),
            send: self.send.as_ref().map(send_link_id),
        }
    }

    /// False if any of the links requires buffers to be released in order.
    #[must_use]
    pub fn out_of_order_supported(&self) -> bool {
        self.recv
            .as_ref()
            .is_none_or(|link| link.supports_recv_buff_out_of_order())
            && self
                .send
                .as_ref()
                .is_none_or(|link| link.supports_send_buff_out_of_order())
    }
}


#[cfg(test)]
mod tests {
    use super::test_links::{TestLink, recv, send};
    use super::*;

    #[test]
    fn test_link_pair_identity() {
        let a = TestLink::new(1);
        let b = TestLink::new(1);
        let pair = LinkPair::new(Some(recv(&a)), Some(send(&a)));
        let same = LinkPair::new(Some(recv(&a)), Some(send(&a)));
        let other = LinkPair::new(Some(recv(&b)), Some(send(&a)));
        assert_eq!(pair.key(), same.key());
        assert_ne!(pair.key(), other.key());
        assert_ne!(LinkPair::recv_only(recv(&a)).key(), pair.key());
        assert_ne!(LinkPair::recv_only(recv(&a)).key(), LinkPair::send_only(send(&a)).key());
        assert_eq!(LinkPair::default().key(), LinkPair::new(None, None).key());
    }

    #[test]
    fn test_out_of_order_support() {
        let ooo = TestLink::new(1);
        let in_order = TestLink::in_order(1);
        assert!(LinkPair::new(Some(recv(&ooo)), Some(send(&ooo))).out_of_order_supported());
        assert!(!LinkPair::new(Some(recv(&ooo)), Some(send(&in_order))).out_of_order_supported());
        assert!(!LinkPair::recv_only(recv(&in_order)).out_of_order_supported());
        assert!(LinkPair::default().out_of_order_supported());
    }
}
