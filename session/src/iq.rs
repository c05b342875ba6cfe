// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Correlation of IQ requests with their responses.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use minidom::Element;
use tokio::sync::oneshot;

use xmpp_addr::BareAddr;
use xmpp_stanza::stanza_error::StanzaError;

use crate::error::Error;

/// An IQ response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IqResponse {
    /// Payload of a `type="result"` response.
    Result(Option<Element>),

    /// Payload of a `type="error"` response.
    Error(StanzaError),
}

/// The key under which a pending request waits: the bare remote address
/// the request went to (`None` for the session's peer itself) and the
/// request id.
pub(crate) type IqKey = (Option<BareAddr>, String);

type IqMap = BTreeMap<IqKey, IqResponseSink>;

struct IqMapEntryHandle {
    key: IqKey,
    map: Weak<Mutex<IqMap>>,
}

impl Drop for IqMapEntryHandle {
    fn drop(&mut self) {
        let Some(map) = self.map.upgrade() else {
            return;
        };
        let Some(mut map) = map.lock().ok() else {
            return;
        };
        map.remove(&self.key);
    }
}

/// Handle for awaiting an IQ response.
///
/// An `Ok(_)` result does **not** imply a successful remote operation: it
/// may carry an [`IqResponse::Error`].
///
/// There is no internal deadline. Combine the token with
/// [`tokio::time::timeout`] for a bounded wait; dropping (cancelling) it
/// removes the pending entry, and a response arriving after that is
/// discarded.
pub struct IqResponseToken {
    entry: Option<IqMapEntryHandle>,
    inner: oneshot::Receiver<Result<IqResponse, Error>>,
}

impl Future for IqResponseToken {
    type Output = Result<IqResponse, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(Ok(v)) => {
                // Drop the map entry handle to release the key.
                this.entry.take();
                Poll::Ready(v)
            }
            Poll::Ready(Err(_)) => {
                log::warn!("IQ tracker dropped a response sink without completing it");
                this.entry.take();
                Poll::Ready(Err(Error::Disconnected))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct IqResponseSink {
    inner: oneshot::Sender<Result<IqResponse, Error>>,
}

impl IqResponseSink {
    fn complete(self, resp: Result<IqResponse, Error>) {
        let _: Result<_, _> = self.inner.send(resp);
    }
}

/// Tracks outstanding IQ requests and delivers their responses.
pub(crate) struct IqTracker {
    map: Arc<Mutex<IqMap>>,
}

impl IqTracker {
    pub(crate) fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(IqMap::new())),
        }
    }

    /// Allocate the waiter for `key`.
    ///
    /// The entry must exist before the request is written, so that a fast
    /// peer cannot respond into a void. Fails with
    /// [`Error::DuplicateIqId`] if the key is already pending.
    pub(crate) fn register(&self, key: IqKey) -> Result<IqResponseToken, Error> {
        let mut map = self.map.lock().unwrap();
        if map.contains_key(&key) {
            return Err(Error::DuplicateIqId);
        }
        let (tx, rx) = oneshot::channel();
        map.insert(key.clone(), IqResponseSink { inner: tx });
        Ok(IqResponseToken {
            entry: Some(IqMapEntryHandle {
                key,
                map: Arc::downgrade(&self.map),
            }),
            inner: rx,
        })
    }

    /// Hand a response to the waiter for `key`, if any.
    ///
    /// Returns `false` when no entry matches; the caller then treats the
    /// stanza as ordinary inbound traffic.
    pub(crate) fn deliver(&self, key: &IqKey, resp: IqResponse) -> bool {
        let mut map = self.map.lock().unwrap();
        match map.remove(key) {
            Some(sink) => {
                sink.complete(Ok(resp));
                true
            }
            None => {
                log::trace!(
                    "no pending iq for id {:?} from {:?}; leaving it to the mux",
                    key.1,
                    key.0,
                );
                false
            }
        }
    }

    /// Whether any request is pending under this id, regardless of the
    /// addressing part of the key.
    pub(crate) fn has_pending_id(&self, id: &str) -> bool {
        let map = self.map.lock().unwrap();
        map.keys().any(|(_, pending)| pending == id)
    }

    /// Fail every outstanding waiter with [`Error::Disconnected`].
    pub(crate) fn shutdown(&self) {
        let mut map = self.map.lock().unwrap();
        for (_, sink) in std::mem::take(&mut *map) {
            sink.complete(Err(Error::Disconnected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(remote: Option<&str>, id: &str) -> IqKey {
        (remote.map(|r| r.parse().unwrap()), id.to_owned())
    }

    #[tokio::test]
    async fn register_deliver_roundtrip() {
        let tracker = IqTracker::new();
        let token = tracker.register(key(None, "1")).unwrap();
        assert!(tracker.deliver(&key(None, "1"), IqResponse::Result(None)));
        match token.await {
            Ok(IqResponse::Result(None)) => (),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let tracker = IqTracker::new();
        let _token = tracker.register(key(None, "1")).unwrap();
        match tracker.register(key(None, "1")) {
            Err(Error::DuplicateIqId) => (),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        // Different addressing tuple, same id: distinct key.
        tracker.register(key(Some("a@x.lit"), "1")).unwrap();
    }

    #[test]
    fn drop_removes_entry() {
        let tracker = IqTracker::new();
        let token = tracker.register(key(None, "1")).unwrap();
        drop(token);
        // Late delivery finds nothing.
        assert!(!tracker.deliver(&key(None, "1"), IqResponse::Result(None)));
        // The key is free again.
        tracker.register(key(None, "1")).unwrap();
    }

    #[test]
    fn mismatched_address_is_not_delivered() {
        let tracker = IqTracker::new();
        let _token = tracker.register(key(Some("a@x.lit"), "1")).unwrap();
        assert!(!tracker.deliver(&key(Some("b@x.lit"), "1"), IqResponse::Result(None)));
        assert!(!tracker.deliver(&key(None, "1"), IqResponse::Result(None)));
    }

    #[tokio::test]
    async fn shutdown_fails_all_waiters() {
        let tracker = IqTracker::new();
        let token_a = tracker.register(key(None, "a")).unwrap();
        let token_b = tracker.register(key(Some("a@x.lit"), "b")).unwrap();
        tracker.shutdown();
        assert!(matches!(token_a.await, Err(Error::Disconnected)));
        assert!(matches!(token_b.await, Err(Error::Disconnected)));
    }

    #[test]
    fn pending_id_lookup_ignores_address() {
        let tracker = IqTracker::new();
        let _token = tracker.register(key(Some("a@x.lit"), "42")).unwrap();
        assert!(tracker.has_pending_id("42"));
        assert!(!tracker.has_pending_id("43"));
    }
}
