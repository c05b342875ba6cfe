// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dispatch of inbound stanzas to registered handlers.
//!
//! Handlers are keyed by (stanza kind, type, payload name), where the
//! payload name is the qualified name of the stanza's first child
//! element. `None` in either position is a wildcard. Lookup tries, in
//! order: the exact key, (type, any payload), (any type, payload), and
//! the kind's default.
//!
//! Handlers run synchronously on the serve loop, strictly in wire order.
//! A handler must not await an IQ response on the same session inline;
//! that response can only be read by the serve loop it would be blocking.
//! Spawn a task for request/response conversations.

use core::fmt;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;

use futures::future::BoxFuture;

use xmpp_stanza::iq::{Iq, IqType};
use xmpp_stanza::message::{Message, MessageType};
use xmpp_stanza::presence::{Presence, PresenceType};
use xmpp_stanza::stanza_error::StanzaError;
use xmpp_stanza::stream_error::StreamError;

use crate::session::Session;

/// The dispatch classes of an IQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IqKind {
    /// `type="get"`
    Get,
    /// `type="set"`
    Set,
    /// `type="result"`
    Result,
    /// `type="error"`
    Error,
}

impl IqKind {
    pub(crate) fn of(payload: &IqType) -> IqKind {
        match payload {
            IqType::Get(_) => IqKind::Get,
            IqType::Set(_) => IqKind::Set,
            IqType::Result(_) => IqKind::Result,
            IqType::Error(_) => IqKind::Error,
        }
    }
}

/// A payload's qualified name: (namespace, local name).
pub type PayloadName = (String, String);

/// What a handler may fail with, and what the engine does about it.
pub enum HandlerError {
    /// A stanza-level problem; in reply to an IQ `get`/`set` the engine
    /// sends an error-typed IQ with this error, otherwise it is logged.
    Stanza(StanzaError),

    /// A stream-level problem; the engine writes it out and terminates
    /// the session.
    Stream(StreamError),

    /// Anything else; converted to an `undefined-condition` stream error.
    Other(Box<dyn StdError + Send + Sync>),
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandlerError::Stanza(e) => write!(f, "Stanza({})", e),
            HandlerError::Stream(e) => write!(f, "Stream({})", e),
            HandlerError::Other(e) => write!(f, "Other({})", e),
        }
    }
}

impl From<StanzaError> for HandlerError {
    fn from(e: StanzaError) -> Self {
        HandlerError::Stanza(e)
    }
}

impl From<StreamError> for HandlerError {
    fn from(e: StreamError) -> Self {
        HandlerError::Stream(e)
    }
}

type Handler<T> = Box<dyn Fn(Session, T) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A handler for inbound messages.
pub type MessageHandler = Handler<Message>;
/// A handler for inbound presences.
pub type PresenceHandler = Handler<Presence>;
/// A handler for inbound IQs.
pub type IqHandler = Handler<Iq>;

fn wrap<T, F, Fut>(f: F) -> Handler<T>
where
    F: Fn(Session, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |session, stanza| Box::pin(f(session, stanza)))
}

type Key<K> = (Option<K>, Option<PayloadName>);

fn lookup<'m, K: Copy + Eq + std::hash::Hash, T>(
    map: &'m HashMap<Key<K>, Handler<T>>,
    type_: K,
    payload: Option<&PayloadName>,
) -> Option<&'m Handler<T>> {
    if let Some(payload) = payload {
        if let Some(handler) = map.get(&(Some(type_), Some(payload.clone()))) {
            return Some(handler);
        }
    }
    if let Some(handler) = map.get(&(Some(type_), None)) {
        return Some(handler);
    }
    if let Some(payload) = payload {
        if let Some(handler) = map.get(&(None, Some(payload.clone()))) {
            return Some(handler);
        }
    }
    map.get(&(None, None))
}

/// The inbound stanza dispatcher.
///
/// Built once, before the serve loop starts; registration is not
/// possible on a live session.
#[derive(Default)]
pub struct Mux {
    messages: HashMap<Key<MessageType>, MessageHandler>,
    presences: HashMap<Key<PresenceType>, PresenceHandler>,
    iqs: HashMap<Key<IqKind>, IqHandler>,
}

impl Mux {
    /// Start building a mux.
    pub fn builder() -> MuxBuilder {
        MuxBuilder { mux: Mux::default() }
    }

    pub(crate) fn message_handler(
        &self,
        type_: MessageType,
        payload: Option<&PayloadName>,
    ) -> Option<&MessageHandler> {
        lookup(&self.messages, type_, payload)
    }

    pub(crate) fn presence_handler(
        &self,
        type_: PresenceType,
        payload: Option<&PayloadName>,
    ) -> Option<&PresenceHandler> {
        lookup(&self.presences, type_, payload)
    }

    pub(crate) fn iq_handler(
        &self,
        kind: IqKind,
        payload: Option<&PayloadName>,
    ) -> Option<&IqHandler> {
        lookup(&self.iqs, kind, payload)
    }
}

/// Builder for [`Mux`].
pub struct MuxBuilder {
    mux: Mux,
}

impl MuxBuilder {
    /// Register a message handler. `None` is a wildcard in either
    /// position.
    pub fn message<F, Fut>(
        mut self,
        type_: Option<MessageType>,
        payload: Option<(&str, &str)>,
        handler: F,
    ) -> Self
    where
        F: Fn(Session, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let payload = payload.map(|(ns, name)| (ns.to_owned(), name.to_owned()));
        self.mux.messages.insert((type_, payload), wrap(handler));
        self
    }

    /// Register a presence handler. `None` is a wildcard in either
    /// position.
    pub fn presence<F, Fut>(
        mut self,
        type_: Option<PresenceType>,
        payload: Option<(&str, &str)>,
        handler: F,
    ) -> Self
    where
        F: Fn(Session, Presence) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let payload = payload.map(|(ns, name)| (ns.to_owned(), name.to_owned()));
        self.mux.presences.insert((type_, payload), wrap(handler));
        self
    }

    /// Register an IQ handler. `None` is a wildcard in either position.
    ///
    /// A `get` or `set` for which no handler matches at dispatch time is
    /// answered with a `service-unavailable` error by the engine.
    pub fn iq<F, Fut>(
        mut self,
        kind: Option<IqKind>,
        payload: Option<(&str, &str)>,
        handler: F,
    ) -> Self
    where
        F: Fn(Session, Iq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let payload = payload.map(|(ns, name)| (ns.to_owned(), name.to_owned()));
        self.mux.iqs.insert((kind, payload), wrap(handler));
        self
    }

    /// Finish building.
    pub fn build(self) -> Mux {
        self.mux
    }
}
