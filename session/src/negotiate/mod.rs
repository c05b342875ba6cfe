// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream feature negotiation.
//!
//! Each feature is a descriptor with three steps: an advertisement step
//! (what the responder lists), a parse step (what the initiator reads out
//! of the listing), and a negotiation step (the wire exchange itself,
//! which yields state bits and possibly a replacement transport).
//! Descriptors carry no per-session state and may be shared.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio_util::codec::Framed;

use minidom::Element;
use xmpp_addr::Addr;
use xmpp_stanza::{ns, stream_error::StreamError};

use crate::codec::{Packet, XmppCodec};
use crate::connection::Connection;
use crate::error::{Error, ProtocolError};
use crate::state::SessionState;

mod bidi;
mod bind;
mod compress;
mod sasl;
mod starttls;

pub use self::bidi::Bidi;
pub use self::bind::Bind;
pub use self::compress::Compress;
pub use self::sasl::Sasl;
pub use self::starttls::StartTls;

/// What a feature's negotiation step produced.
pub struct Negotiated {
    /// State bits to set on the session.
    pub bits: SessionState,

    /// A replacement transport; the engine rebuilds its tokenizers on it
    /// and restarts the stream.
    pub transport: Option<Connection>,

    /// Whether a stream restart is required even without a transport
    /// replacement.
    pub restart: bool,
}

impl Negotiated {
    /// Nothing changed: no bits, no transport, no restart.
    pub fn nothing() -> Negotiated {
        Negotiated {
            bits: SessionState::empty(),
            transport: None,
            restart: false,
        }
    }

    /// Set bits and restart the stream.
    pub fn restart(bits: SessionState) -> Negotiated {
        Negotiated {
            bits,
            transport: None,
            restart: true,
        }
    }

    /// Set bits and replace the transport (implies a restart).
    pub fn replace(bits: SessionState, transport: Connection) -> Negotiated {
        Negotiated {
            bits,
            transport: Some(transport),
            restart: true,
        }
    }
}

/// Mutable negotiation context threaded through the rounds.
pub(crate) struct NegotiationState {
    pub(crate) state: SessionState,
    pub(crate) local: Addr,
    pub(crate) remote: Addr,
    pub(crate) lang: Option<String>,
    /// Completed features, with the session state right after each
    /// completed. A feature re-advertised while the state is unchanged
    /// means the peer is looping.
    pub(crate) negotiated: HashMap<(&'static str, &'static str), SessionState>,
}

/// The wire handle a feature negotiates over.
///
/// Wraps the framed stream during negotiation and carries the addresses
/// and state bits a feature may need or update.
pub struct FeatureStream {
    pub(crate) framed: Option<Framed<Connection, XmppCodec>>,
    pub(crate) ctx: NegotiationState,
}

impl FeatureStream {
    /// The current session state bits.
    pub fn state(&self) -> SessionState {
        self.ctx.state
    }

    /// Whether we are the responder of this stream.
    pub fn is_responder(&self) -> bool {
        self.ctx.state.contains(SessionState::RECEIVED)
    }

    /// Our address.
    pub fn local(&self) -> &Addr {
        &self.ctx.local
    }

    /// The peer's address.
    pub fn remote(&self) -> &Addr {
        &self.ctx.remote
    }

    /// The negotiated stream language, if any.
    pub fn lang(&self) -> Option<&str> {
        self.ctx.lang.as_deref()
    }

    /// Replace our address (resource binding does this).
    pub fn set_local(&mut self, addr: Addr) {
        self.ctx.local = addr;
    }

    /// Replace the peer's address (server-side authentication and
    /// binding do this).
    pub fn set_remote(&mut self, addr: Addr) {
        self.ctx.remote = addr;
    }

    /// Send one element.
    pub async fn send(&mut self, elem: Element) -> Result<(), Error> {
        let framed = self.framed.as_mut().ok_or(Error::InvalidState)?;
        framed.send(Packet::Stanza(elem)).await
    }

    /// Receive the next element, skipping whitespace.
    ///
    /// A stream error is decoded and returned as terminal; a stream
    /// footer or EOF means the peer hung up mid-negotiation.
    pub async fn recv(&mut self) -> Result<Element, Error> {
        let framed = self.framed.as_mut().ok_or(Error::InvalidState)?;
        loop {
            match framed.next().await {
                Some(Ok(Packet::Stanza(elem))) => {
                    if elem.is("error", ns::STREAM) {
                        return Err(Error::Stream(StreamError::try_from(elem)?));
                    }
                    return Ok(elem);
                }
                Some(Ok(Packet::Text(_))) => (),
                Some(Ok(Packet::StreamStart(_))) => {
                    return Err(ProtocolError::InvalidStreamStart.into());
                }
                Some(Ok(Packet::StreamEnd)) => return Err(Error::Disconnected),
                Some(Err(e)) => return Err(e),
                None => return Err(Error::Disconnected),
            }
        }
    }

    /// Take the underlying transport out for an upgrade (TLS,
    /// compression). The stream restarts afterwards, so the parser state
    /// that is dropped with it has no further use.
    pub fn take_connection(&mut self) -> Result<Connection, Error> {
        Ok(self
            .framed
            .take()
            .ok_or(Error::InvalidState)?
            .into_inner())
    }
}

/// A pluggable stream feature.
pub trait StreamFeature: Send + Sync {
    /// The qualified name (namespace, local) of the advertisement
    /// element.
    fn name(&self) -> (&'static str, &'static str);

    /// Bits that must be set before this feature may be listed or
    /// selected.
    fn needs(&self) -> SessionState {
        SessionState::empty()
    }

    /// Bits that must be clear before this feature may be listed or
    /// selected.
    fn prohibits(&self) -> SessionState {
        SessionState::empty()
    }

    /// Whether we consider this feature mandatory-to-negotiate when the
    /// peer offers it.
    fn mandatory(&self) -> bool {
        false
    }

    /// Whether this feature must have completed before the session can
    /// become ready.
    fn required_for_ready(&self, _state: SessionState) -> bool {
        false
    }

    /// The responder's list step: the advertisement element and whether
    /// it is mandatory. `None` suppresses the feature for this listing.
    fn advertise(&self, state: SessionState) -> Option<(Element, bool)>;

    /// The initiator's parse step: whether the peer marked this offer as
    /// required.
    fn offer_required(&self, _offer: &Element) -> bool {
        false
    }

    /// Whether an element received by the responder selects this
    /// feature. Defaults to matching the advertisement's qualified name.
    fn recognizes(&self, elem: &Element) -> bool {
        let (ns, name) = self.name();
        elem.is(name, ns)
    }

    /// Drive the negotiation to completion.
    ///
    /// On the initiator side `input` is the peer's advertisement child;
    /// on the responder side it is the element with which the initiator
    /// selected the feature.
    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>>;
}

/// An ordered collection of features; order is the selection preference
/// among non-mandatory features.
#[derive(Default, Clone)]
pub struct FeatureSet {
    features: Vec<Arc<dyn StreamFeature>>,
}

impl FeatureSet {
    /// An empty set.
    pub fn new() -> FeatureSet {
        FeatureSet::default()
    }

    /// Append a feature.
    pub fn with<F: StreamFeature + 'static>(mut self, feature: F) -> FeatureSet {
        self.features.push(Arc::new(feature));
        self
    }

    /// Iterate the features in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn StreamFeature>> {
        self.features.iter()
    }
}

fn eligible(feature: &dyn StreamFeature, ctx: &NegotiationState) -> bool {
    ctx.state.contains(feature.needs())
        && !ctx.state.intersects(feature.prohibits())
        && !ctx.negotiated.contains_key(&feature.name())
}

pub(crate) fn ready(registry: &FeatureSet, ctx: &NegotiationState) -> bool {
    ctx.state.contains(SessionState::AUTHN)
        && registry.iter().all(|feature| {
            !feature.required_for_ready(ctx.state)
                || ctx.negotiated.contains_key(&feature.name())
        })
}

/// Pick the next feature to negotiate from the peer's offers.
///
/// Priority: a mandatory feature the peer marked required, then a
/// mandatory feature of ours, then anything else in registration order.
fn select<'r>(
    registry: &'r FeatureSet,
    offers: &HashMap<(String, String), Element>,
    ctx: &NegotiationState,
) -> Result<Option<(&'r Arc<dyn StreamFeature>, Element)>, Error> {
    // A feature the peer advertises again although negotiating it did
    // not advance the state is a loop, not progress.
    for feature in registry.iter() {
        let (fns, fname) = feature.name();
        if let Some(after) = ctx.negotiated.get(&feature.name()) {
            if *after == ctx.state && offers.contains_key(&(fns.to_owned(), fname.to_owned())) {
                return Err(ProtocolError::FeaturesOutOfOrder.into());
            }
        }
    }

    let offer_of = |feature: &Arc<dyn StreamFeature>| {
        let (fns, fname) = feature.name();
        offers.get(&(fns.to_owned(), fname.to_owned())).cloned()
    };

    for feature in registry.iter() {
        if !eligible(&**feature, ctx) || !feature.mandatory() {
            continue;
        }
        if let Some(offer) = offer_of(feature) {
            if feature.offer_required(&offer) {
                return Ok(Some((feature, offer)));
            }
        }
    }
    for feature in registry.iter() {
        if !eligible(&**feature, ctx) || !feature.mandatory() {
            continue;
        }
        if let Some(offer) = offer_of(feature) {
            return Ok(Some((feature, offer)));
        }
    }
    for feature in registry.iter() {
        if !eligible(&**feature, ctx) {
            continue;
        }
        if let Some(offer) = offer_of(feature) {
            return Ok(Some((feature, offer)));
        }
    }
    Ok(None)
}

/// How one stream round ended.
pub(crate) enum Round {
    /// Restart the stream on the same transport.
    Restart(Framed<Connection, XmppCodec>),
    /// Restart the stream on a replacement transport.
    Replace(Connection),
    /// Negotiation is complete; the session is ready. The initiator may
    /// have started sending stanzas before the responder knew it was
    /// done with the listing; such an element rides along here.
    Ready(Framed<Connection, XmppCodec>, Option<Element>),
}

/// Run one initiator-side round: consume the peer's feature listing and
/// negotiate until a restart is needed or nothing is left to do.
pub(crate) async fn initiator_round(
    framed: Framed<Connection, XmppCodec>,
    features_elem: Element,
    registry: &FeatureSet,
    ctx: NegotiationState,
) -> Result<(Round, NegotiationState), Error> {
    let mut offers: HashMap<(String, String), Element> = features_elem
        .children()
        .map(|child| ((child.ns(), child.name().to_owned()), child.clone()))
        .collect();

    let mut fs = FeatureStream {
        framed: Some(framed),
        ctx,
    };

    loop {
        let selected = select(registry, &offers, &fs.ctx)?;
        let Some((feature, offer)) = selected else {
            break;
        };
        let qname = feature.name();
        log::debug!("negotiating stream feature {{{}}}{}", qname.0, qname.1);

        let outcome = feature.negotiate(&mut fs, offer).await?;
        fs.ctx.state |= outcome.bits;
        fs.ctx.negotiated.insert(qname, fs.ctx.state);
        offers.remove(&(qname.0.to_owned(), qname.1.to_owned()));

        if let Some(conn) = outcome.transport {
            return Ok((Round::Replace(conn), fs.ctx));
        }
        if outcome.restart {
            let framed = fs.framed.take().ok_or(Error::InvalidState)?;
            return Ok((Round::Restart(framed), fs.ctx));
        }
    }

    if ready(registry, &fs.ctx) {
        fs.ctx.state |= SessionState::READY;
        let framed = fs.framed.take().ok_or(Error::InvalidState)?;
        return Ok((Round::Ready(framed, None), fs.ctx));
    }
    Err(ProtocolError::NegotiationStalled.into())
}

/// Run one responder-side round: send our feature listing, then answer
/// the initiator's selections.
pub(crate) async fn responder_round(
    mut framed: Framed<Connection, XmppCodec>,
    registry: &FeatureSet,
    ctx: NegotiationState,
) -> Result<(Round, NegotiationState), Error> {
    let mut listing = Vec::new();
    let mut advertised = false;
    for feature in registry.iter() {
        if !eligible(&**feature, &ctx) {
            continue;
        }
        if let Some((elem, _mandatory)) = feature.advertise(ctx.state) {
            listing.push(elem);
            advertised = true;
        }
    }
    framed
        .send(Packet::Stanza(
            Element::builder("features", ns::STREAM)
                .append_all(listing)
                .build(),
        ))
        .await?;

    let mut fs = FeatureStream {
        framed: Some(framed),
        ctx,
    };

    if !advertised {
        if ready(registry, &fs.ctx) {
            fs.ctx.state |= SessionState::READY;
            let framed = fs.framed.take().ok_or(Error::InvalidState)?;
            return Ok((Round::Ready(framed, None), fs.ctx));
        }
        return Err(ProtocolError::NegotiationStalled.into());
    }

    loop {
        let elem = fs.recv().await?;
        let feature = registry
            .iter()
            .find(|feature| eligible(&***feature, &fs.ctx) && feature.recognizes(&elem));
        let Some(feature) = feature else {
            // Everything still listed was optional and the initiator
            // went straight to stanzas; negotiation is over and the
            // element must not be lost.
            if ready(registry, &fs.ctx) {
                fs.ctx.state |= SessionState::READY;
                let framed = fs.framed.take().ok_or(Error::InvalidState)?;
                return Ok((Round::Ready(framed, Some(elem)), fs.ctx));
            }
            return Err(ProtocolError::UnsupportedStanzaType.into());
        };
        let qname = feature.name();
        log::debug!("answering stream feature {{{}}}{}", qname.0, qname.1);

        let outcome = feature.negotiate(&mut fs, elem).await?;
        fs.ctx.state |= outcome.bits;
        fs.ctx.negotiated.insert(qname, fs.ctx.state);

        if let Some(conn) = outcome.transport {
            return Ok((Round::Replace(conn), fs.ctx));
        }
        if outcome.restart {
            let framed = fs.framed.take().ok_or(Error::InvalidState)?;
            return Ok((Round::Restart(framed), fs.ctx));
        }
        if ready(registry, &fs.ctx) {
            fs.ctx.state |= SessionState::READY;
            let framed = fs.framed.take().ok_or(Error::InvalidState)?;
            return Ok((Round::Ready(framed, None), fs.ctx));
        }
    }
}
