// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session engine: stream lifecycle, concurrent sending, and the
//! serve loop that routes inbound stanzas.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

use minidom::Element;
use xmpp_addr::Addr;
use xmpp_stanza::iq::{Iq, IqType};
use xmpp_stanza::message::Message;
use xmpp_stanza::presence::Presence;
use xmpp_stanza::stanza_error::{Condition as StanzaCondition, ErrorType, StanzaError};
use xmpp_stanza::stream_error::{Condition as StreamCondition, StreamError};
use xmpp_stanza::{ns, rebase_ns, Stanza};

use crate::codec::{Framing, Packet, XmppCodec};
use crate::connection::{Connection, Timeouts};
use crate::error::{Error, ProtocolError};
use crate::framing::{recv_features, recv_header, reframe, send_header, StreamHeader, StreamInfo};
use crate::iq::{IqKey, IqResponse, IqTracker};
use crate::mux::{HandlerError, IqKind, Mux, PayloadName};
use crate::negotiate::{
    initiator_round, responder_round, FeatureSet, NegotiationState, Round,
};
use crate::state::SessionState;

/// Generate a random stanza id: 128 bits from a cryptographic source,
/// hex-formatted.
pub(crate) fn make_id() -> String {
    let id: u128 = rand::thread_rng().gen();
    format!("{:032x}", id)
}

/// Static configuration of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server-to-server rather than client-to-server.
    pub s2s: bool,

    /// The `xml:lang` to announce on our stream header.
    pub lang: Option<String>,

    /// Stream framing variant.
    pub framing: Framing,

    /// Read deadlines for the serve loop.
    pub timeouts: Timeouts,

    /// Whether a stream header `to` which does not match our address is
    /// fatal for initiated (client) sessions. Responders always treat it
    /// as fatal.
    pub strict_to: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            s2s: false,
            lang: None,
            framing: Framing::Stream,
            timeouts: Timeouts::default(),
            strict_to: false,
        }
    }
}

impl SessionConfig {
    fn default_ns(&self) -> &'static str {
        if self.s2s {
            ns::JABBER_SERVER
        } else {
            ns::JABBER_CLIENT
        }
    }
}

struct Inner {
    config: SessionConfig,
    ns: &'static str,
    state: RwLock<SessionState>,
    local: Addr,
    remote: Addr,
    info: StreamInfo,
    tx: Mutex<SplitSink<Framed<Connection, XmppCodec>, Packet>>,
    rx: Mutex<SplitStream<Framed<Connection, XmppCodec>>>,
    /// An element the negotiator read past the end of negotiation; the
    /// serve loop processes it before touching the wire.
    leftover: std::sync::Mutex<Option<Element>>,
    tracker: IqTracker,
    mux: Mux,
}

/// A negotiated XMPP session.
///
/// Cheap to clone; all clones refer to the same stream. Any task may
/// send concurrently — one outbound stanza at a time hits the wire — but
/// only one [`serve`][`Session::serve`] loop reads the input.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Connect and negotiate as the initiator of a client-to-server or
    /// server-to-server stream.
    ///
    /// Loops over stream rounds: exchange headers, read the feature
    /// listing, run the negotiator, apply its bits, swap the transport
    /// and restart when asked, until the stream is ready.
    pub async fn negotiate_client(
        conn: Connection,
        local: Addr,
        remote: Addr,
        features: &FeatureSet,
        mux: Mux,
        config: SessionConfig,
    ) -> Result<Session, Error> {
        let mut initial = SessionState::empty();
        if config.s2s {
            initial |= SessionState::S2S;
        }
        if conn.is_secure() {
            initial |= SessionState::SECURE;
        }
        Session::establish(conn, initial, local, remote, features, mux, config).await
    }

    /// Accept and negotiate as the responder of a stream.
    ///
    /// `local` is the address we serve; the peer's address is learned
    /// during authentication and binding.
    pub async fn negotiate_server(
        conn: Connection,
        local: Addr,
        features: &FeatureSet,
        mux: Mux,
        config: SessionConfig,
    ) -> Result<Session, Error> {
        let mut initial = SessionState::RECEIVED;
        if config.s2s {
            initial |= SessionState::S2S;
        }
        if conn.is_secure() {
            initial |= SessionState::SECURE;
        }
        let remote = Addr::from_parts(None, local.domain(), None)?;
        Session::establish(conn, initial, local, remote, features, mux, config).await
    }

    async fn establish(
        conn: Connection,
        initial: SessionState,
        local: Addr,
        remote: Addr,
        features: &FeatureSet,
        mux: Mux,
        config: SessionConfig,
    ) -> Result<Session, Error> {
        let framing = config.framing;
        let default_ns = config.default_ns();
        let responder = initial.contains(SessionState::RECEIVED);

        let mut ctx = NegotiationState {
            state: initial,
            local,
            remote,
            lang: config.lang.clone(),
            negotiated: Default::default(),
        };
        let mut peer_from: Option<Addr> = None;
        let mut framed = Framed::new(conn, XmppCodec::new(framing));
        let mut info;

        loop {
            if responder {
                info = recv_header(&mut framed, framing, default_ns, false).await?;
                if let Some(to) = &info.to {
                    if to.domain() != ctx.local.domain() {
                        return Err(ProtocolError::MismatchedTo.into());
                    }
                }
                check_from_stability(&mut peer_from, &info)?;
                send_header(
                    &mut framed,
                    StreamHeader {
                        to: info.from.clone(),
                        from: Some(ctx.local.clone()),
                        id: Some(make_id()),
                        lang: config.lang.clone(),
                    },
                    framing,
                    default_ns,
                )
                .await?;
            } else {
                send_header(
                    &mut framed,
                    StreamHeader {
                        to: Some(ctx.remote.clone()),
                        // Identify ourselves only once the stream is
                        // authenticated.
                        from: if ctx.state.contains(SessionState::AUTHN) {
                            Some(ctx.local.clone())
                        } else {
                            None
                        },
                        id: None,
                        lang: config.lang.clone(),
                    },
                    framing,
                    default_ns,
                )
                .await?;
                info = recv_header(&mut framed, framing, default_ns, true).await?;
                check_from_stability(&mut peer_from, &info)?;
                if config.strict_to {
                    if let Some(to) = &info.to {
                        if to.to_bare() != ctx.local.to_bare() {
                            return Err(ProtocolError::MismatchedTo.into());
                        }
                    }
                }
            }

            let (round, new_ctx) = if responder {
                responder_round(framed, features, ctx).await?
            } else {
                let features_elem = recv_features(&mut framed).await?;
                initiator_round(framed, features_elem, features, ctx).await?
            };
            ctx = new_ctx;

            match round {
                Round::Replace(conn) => {
                    framed = Framed::new(conn, XmppCodec::new(framing));
                }
                Round::Restart(old) => {
                    framed = reframe(old, framing);
                }
                Round::Ready(framed, leftover) => {
                    log::debug!(
                        "session ready: {:?}, local={}, remote={}",
                        ctx.state,
                        ctx.local,
                        ctx.remote
                    );
                    let (tx, rx) = framed.split();
                    return Ok(Session {
                        inner: Arc::new(Inner {
                            ns: default_ns,
                            config,
                            state: RwLock::new(ctx.state),
                            local: ctx.local,
                            remote: ctx.remote,
                            info,
                            tx: Mutex::new(tx),
                            rx: Mutex::new(rx),
                            leftover: std::sync::Mutex::new(leftover),
                            tracker: IqTracker::new(),
                            mux,
                        }),
                    });
                }
            }
        }
    }

    /// Log into a server as a client with an address and password.
    ///
    /// The whole default client path in one call: SRV discovery and
    /// dialing, STARTTLS with the platform trust roots, SASL with the
    /// usual mechanisms, server-assigned resource binding.
    pub async fn login(addr: Addr, password: &str, mux: Mux) -> Result<Session, Error> {
        let username = addr.local().ok_or(Error::Addr(
            xmpp_addr::InvalidAddr::EmptyLocal,
        ))?;
        let conn = crate::connect::Dialer::client().dial(addr.domain()).await?;
        let connector = crate::connect::tls_connector()?;
        let credentials = sasl::common::Credentials::default()
            .with_username(username)
            .with_password(password);
        let features = FeatureSet::new()
            .with(crate::negotiate::StartTls::client(connector))
            .with(crate::negotiate::Sasl::client(credentials))
            .with(crate::negotiate::Bind::client(
                addr.resource().map(str::to_owned),
            ));
        let remote = Addr::from_parts(None, addr.domain(), None)?;
        Session::negotiate_client(conn, addr, remote, &features, mux, SessionConfig::default())
            .await
    }

    /// Assemble a session from a stream negotiated by other means.
    ///
    /// This is the seam for bespoke handshake preludes (the legacy
    /// component protocol, pre-RFC "old SSL" setups): whatever ran on
    /// `conn` before, the engine takes over with `state` as the
    /// session's bits. `state` should include
    /// [`READY`][`SessionState::READY`], or sending will be the only
    /// thing the session is good for.
    pub fn from_negotiated(
        conn: Connection,
        state: SessionState,
        local: Addr,
        remote: Addr,
        mux: Mux,
        config: SessionConfig,
    ) -> Session {
        let default_ns = config.default_ns();
        let framing = config.framing;
        let (tx, rx) = Framed::new(conn, XmppCodec::new(framing)).split();
        Session {
            inner: Arc::new(Inner {
                ns: default_ns,
                config,
                state: RwLock::new(state),
                local,
                remote,
                info: StreamInfo::default(),
                tx: Mutex::new(tx),
                rx: Mutex::new(rx),
                leftover: std::sync::Mutex::new(None),
                tracker: IqTracker::new(),
                mux,
            }),
        }
    }

    /// The current state bits.
    pub fn state(&self) -> SessionState {
        *self.inner.state.read().unwrap()
    }

    fn set_state(&self, bits: SessionState) {
        self.inner.state.write().unwrap().insert(bits);
    }

    /// Our address (after binding, the bound full address).
    pub fn local(&self) -> &Addr {
        &self.inner.local
    }

    /// The peer's address.
    pub fn remote(&self) -> &Addr {
        &self.inner.remote
    }

    /// The values from the peer's most recent stream header.
    pub fn stream_info(&self) -> &StreamInfo {
        &self.inner.info
    }

    async fn write(&self, packet: Packet) -> Result<(), Error> {
        let mut tx = self.inner.tx.lock().await;
        if self.state().contains(SessionState::OUTPUT_CLOSED) {
            return Err(Error::OutputClosed);
        }
        tx.send(packet).await
    }

    /// Send a stanza.
    pub async fn send(&self, stanza: impl Into<Stanza>) -> Result<(), Error> {
        self.send_element(Element::from(stanza.into())).await
    }

    /// Send a raw element, which must be a stanza start (`message`,
    /// `presence` or `iq` in a stanza namespace) or the send fails with
    /// [`Error::NotStanza`].
    ///
    /// An `iq` without an id gets a fresh random one.
    pub async fn send_element(&self, mut elem: Element) -> Result<(), Error> {
        if !Stanza::is_stanza(&elem) {
            return Err(Error::NotStanza);
        }
        if elem.name() == "iq" && elem.attr("id").map_or(true, str::is_empty) {
            elem.set_attr("id", make_id());
        }
        if self.inner.ns == ns::JABBER_SERVER && elem.ns() == ns::JABBER_CLIENT {
            elem = rebase_ns(&elem, ns::JABBER_CLIENT, ns::JABBER_SERVER);
        }
        self.write(Packet::Stanza(elem)).await
    }

    /// Send an IQ.
    ///
    /// For `result` and `error` IQs this behaves like [`send`][`Session::send`]
    /// and returns `None`. For `get` and `set` it registers the waiter
    /// before anything hits the wire, sends, and suspends until the
    /// response arrives or the session closes. Wrap the call in
    /// [`tokio::time::timeout`] for a deadline; cancellation removes the
    /// pending entry and a late response is discarded.
    pub async fn send_iq(&self, mut iq: Iq) -> Result<Option<IqResponse>, Error> {
        if !iq.payload.is_request() {
            self.send(iq).await?;
            return Ok(None);
        }
        if iq.id.as_deref().map_or(true, str::is_empty) {
            iq.id = Some(make_id());
        }
        let key = self.iq_key(iq.to.as_ref(), iq.id.clone().unwrap_or_default());
        let token = self.inner.tracker.register(key)?;
        self.send(iq).await?;
        token.await.map(Some)
    }

    /// The correlation key for an IQ addressed to `addr`.
    ///
    /// Addresses are compared bare-for-bare, and the session's own peer
    /// is represented as `None` so that responses which omit `from`
    /// match requests sent without `to`, and vice versa.
    fn iq_key(&self, addr: Option<&Addr>, id: String) -> IqKey {
        let remote_bare = self.inner.remote.to_bare();
        let addr = addr
            .map(|addr| addr.to_bare())
            .filter(|bare| *bare != remote_bare);
        (addr, id)
    }

    /// Close the output stream by sending the stream footer.
    ///
    /// Idempotent: the footer is written exactly once, later calls are
    /// no-ops. The underlying transport stays open; it belongs to
    /// whoever created it. Sends racing with `close` either make it out
    /// before the footer or fail with [`Error::OutputClosed`].
    pub async fn close(&self) -> Result<(), Error> {
        let mut tx = self.inner.tx.lock().await;
        if self.state().contains(SessionState::OUTPUT_CLOSED) {
            return Ok(());
        }
        self.set_state(SessionState::OUTPUT_CLOSED);
        tx.send(Packet::StreamEnd).await
    }

    /// Write a stream error and close the output. Best-effort: failures
    /// to write are ignored, the error condition is what matters.
    async fn abort(&self, error: StreamError) {
        let mut tx = self.inner.tx.lock().await;
        if self.state().contains(SessionState::OUTPUT_CLOSED) {
            return;
        }
        self.set_state(SessionState::OUTPUT_CLOSED);
        let _ = tx.send(Packet::Stanza(error.into())).await;
        let _ = tx.send(Packet::StreamEnd).await;
    }

    /// Serve the input stream.
    ///
    /// The single reader of the session: reads stream-level tokens,
    /// completes pending IQs, dispatches everything else to the mux.
    /// Returns `Ok(())` when the peer closes its stream cleanly. Pending
    /// IQ waiters are failed when the loop exits, however it exits.
    pub async fn serve(&self) -> Result<(), Error> {
        let mut rx = self.inner.rx.lock().await;
        if self.state().contains(SessionState::INPUT_CLOSED) {
            return Err(Error::InputClosed);
        }
        let result = self.serve_loop(&mut *rx).await;
        self.inner.tracker.shutdown();
        result
    }

    async fn serve_loop(
        &self,
        rx: &mut SplitStream<Framed<Connection, XmppCodec>>,
    ) -> Result<(), Error> {
        let timeouts = self.inner.config.timeouts;
        let leftover = self.inner.leftover.lock().unwrap().take();
        if let Some(elem) = leftover {
            self.handle_element(elem).await?;
        }
        loop {
            let item = match tokio::time::timeout(timeouts.read_timeout, rx.next()).await {
                Ok(item) => item,
                Err(_) => {
                    // Silence. Prod the peer with a whitespace keepalive
                    // and give it one more grace period.
                    let _ = self.write(Packet::Text(" ".to_owned())).await;
                    match tokio::time::timeout(timeouts.response_timeout, rx.next()).await {
                        Ok(item) => item,
                        Err(_) => {
                            return Err(Error::Io(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "read and response timeouts elapsed",
                            )));
                        }
                    }
                }
            };

            match item {
                None => {
                    self.set_state(SessionState::INPUT_CLOSED);
                    return Err(Error::Disconnected);
                }
                Some(Err(e)) => {
                    self.set_state(SessionState::INPUT_CLOSED);
                    if matches!(e, Error::Protocol(ProtocolError::Parser(_))) {
                        self.abort(StreamError::new(StreamCondition::NotWellFormed))
                            .await;
                    }
                    return Err(e);
                }
                Some(Ok(Packet::Text(_))) => (),
                Some(Ok(Packet::StreamEnd)) => {
                    self.set_state(SessionState::INPUT_CLOSED);
                    let _ = self.close().await;
                    return Ok(());
                }
                Some(Ok(Packet::StreamStart(_))) => {
                    self.abort(StreamError::new(StreamCondition::InvalidXml))
                        .await;
                    return Err(ProtocolError::InvalidStreamStart.into());
                }
                Some(Ok(Packet::Stanza(elem))) => {
                    self.handle_element(elem).await?;
                }
            }
        }
    }

    async fn handle_element(&self, elem: Element) -> Result<(), Error> {
        if elem.is("error", ns::STREAM) {
            self.set_state(SessionState::INPUT_CLOSED);
            return Err(Error::Stream(StreamError::try_from(elem)?));
        }
        if !Stanza::is_stanza(&elem) {
            self.abort(StreamError::new(StreamCondition::UnsupportedStanzaType))
                .await;
            return Err(ProtocolError::UnsupportedStanzaType.into());
        }

        let elem = self.normalize_from(elem);
        if elem.name() != "iq" {
            if let Some(id) = elem.attr("id") {
                if self.inner.tracker.has_pending_id(id) {
                    // Only an iq completes an iq; this one goes through
                    // the mux like any other stanza.
                    log::trace!("{} with id {:?} of a pending iq request", elem.name(), id);
                }
            }
        }
        // The payload name is the first child's qualified name, peeked
        // before typed parsing for the mux lookup.
        let payload: Option<PayloadName> = elem
            .children()
            .next()
            .map(|child| (child.ns(), child.name().to_owned()));

        match elem.name() {
            "iq" => self.handle_iq(elem, payload).await,
            "message" => self.handle_message(elem, payload).await,
            "presence" => self.handle_presence(elem, payload).await,
            _ => unreachable!(),
        }
    }

    /// RFC 6120 allows the peer to omit `from` when it equals our bare
    /// peer address; normalizing the other direction spares handlers the
    /// case analysis.
    fn normalize_from(&self, elem: Element) -> Element {
        let Some(from) = elem.attr("from") else {
            return elem;
        };
        let Ok(addr) = from.parse::<Addr>() else {
            return elem;
        };
        if !addr.is_bare() || addr.to_bare() != self.inner.remote.to_bare() {
            return elem;
        }
        let mut builder = Element::builder(elem.name(), elem.ns());
        for (name, value) in elem.attrs() {
            if name != "from" {
                builder = builder.attr(name, value);
            }
        }
        for node in elem.nodes() {
            builder = match node {
                minidom::Node::Element(child) => builder.append(child.clone()),
                minidom::Node::Text(text) => builder.append(text.clone()),
            };
        }
        builder.build()
    }

    async fn handle_iq(&self, elem: Element, payload: Option<PayloadName>) -> Result<(), Error> {
        let iq = match Iq::try_from(elem.clone()) {
            Ok(iq) => iq,
            Err(e) => {
                log::warn!("dropping malformed iq: {}", e);
                self.reply_bad_request(&elem).await;
                return Ok(());
            }
        };

        // Responses are checked against the pending-request table first;
        // only an `iq` can complete an `iq` request, and only with a
        // matching addressing tuple.
        if let Some(id) = &iq.id {
            let response = match &iq.payload {
                IqType::Result(payload) => Some(IqResponse::Result(payload.clone())),
                IqType::Error(error) => Some(IqResponse::Error(error.clone())),
                _ => None,
            };
            if let Some(response) = response {
                let key = self.iq_key(iq.from.as_ref(), id.clone());
                if self.inner.tracker.deliver(&key, response) {
                    return Ok(());
                }
            }
        }

        let kind = IqKind::of(&iq.payload);
        let handler = self.inner.mux.iq_handler(kind, payload.as_ref());
        match handler {
            Some(handler) => {
                let reply_to = iq.clone();
                let outcome = self.run_handler(handler(self.clone(), iq)).await;
                self.conclude(outcome, Some(&reply_to)).await
            }
            None => {
                if iq.payload.is_request() {
                    let reply = iq.reply_error(StanzaError::service_unavailable());
                    let _ = self.send(reply).await;
                }
                Ok(())
            }
        }
    }

    async fn handle_message(
        &self,
        elem: Element,
        payload: Option<PayloadName>,
    ) -> Result<(), Error> {
        let message = match Message::try_from(elem) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("dropping malformed message: {}", e);
                return Ok(());
            }
        };
        match self.inner.mux.message_handler(message.type_, payload.as_ref()) {
            Some(handler) => {
                let outcome = self.run_handler(handler(self.clone(), message)).await;
                self.conclude(outcome, None).await
            }
            None => Ok(()),
        }
    }

    async fn handle_presence(
        &self,
        elem: Element,
        payload: Option<PayloadName>,
    ) -> Result<(), Error> {
        let presence = match Presence::try_from(elem) {
            Ok(presence) => presence,
            Err(e) => {
                log::warn!("dropping malformed presence: {}", e);
                return Ok(());
            }
        };
        match self
            .inner
            .mux
            .presence_handler(presence.type_, payload.as_ref())
        {
            Some(handler) => {
                let outcome = self.run_handler(handler(self.clone(), presence)).await;
                self.conclude(outcome, None).await
            }
            None => Ok(()),
        }
    }

    /// Run one handler, converting a panic into a handler error so the
    /// serve loop can turn it into a stream error instead of unwinding
    /// through the session internals.
    async fn run_handler(
        &self,
        fut: futures::future::BoxFuture<'static, Result<(), HandlerError>>,
    ) -> Result<(), HandlerError> {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let text = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_owned());
                Err(HandlerError::Other(text.into()))
            }
        }
    }

    /// Apply the error semantics of a finished handler.
    async fn conclude(
        &self,
        outcome: Result<(), HandlerError>,
        source: Option<&Iq>,
    ) -> Result<(), Error> {
        match outcome {
            Ok(()) => Ok(()),
            Err(HandlerError::Stream(error)) => {
                self.abort(error.clone()).await;
                Err(Error::Stream(error))
            }
            Err(HandlerError::Stanza(error)) => {
                match source {
                    Some(iq) if iq.payload.is_request() => {
                        let _ = self.send(iq.reply_error(error)).await;
                    }
                    _ => log::warn!("handler stanza error with nothing to reply to: {}", error),
                }
                Ok(())
            }
            Err(HandlerError::Other(e)) => {
                log::error!("handler failed: {}", e);
                let error = StreamError::new(StreamCondition::UndefinedCondition);
                self.abort(error.clone()).await;
                Err(Error::Stream(error))
            }
        }
    }

    async fn reply_bad_request(&self, elem: &Element) {
        let type_ = elem.attr("type").unwrap_or_default();
        if type_ != "get" && type_ != "set" {
            return;
        }
        let to = elem.attr("from").and_then(|from| from.parse().ok());
        let reply = Iq {
            from: None,
            to,
            id: elem.attr("id").map(str::to_owned),
            payload: IqType::Error(StanzaError::new(
                ErrorType::Modify,
                StanzaCondition::BadRequest,
                "en",
                "could not parse iq stanza",
            )),
        };
        let _ = self.send(reply).await;
    }
}

fn check_from_stability(previous: &mut Option<Addr>, info: &StreamInfo) -> Result<(), Error> {
    if let (Some(prev), Some(now)) = (previous.as_ref(), info.from.as_ref()) {
        if prev != now {
            return Err(ProtocolError::PeerChangedIdentity.into());
        }
    }
    if info.from.is_some() {
        *previous = info.from.clone();
    }
    Ok(())
}
