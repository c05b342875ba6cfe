// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bidirectional s2s stream feature (XEP-0288).

use futures::future::BoxFuture;
use futures::FutureExt;

use minidom::Element;
use xmpp_stanza::bidi as nonza;
use xmpp_stanza::ns;

use crate::error::Error;
use crate::negotiate::{FeatureStream, Negotiated, StreamFeature};
use crate::state::SessionState;

/// Bidirectional server-to-server streams: the initiator declares that
/// it will accept stanzas over its outgoing stream. There is no reply
/// and no state bit; the declaration itself is the whole exchange.
pub struct Bidi;

impl StreamFeature for Bidi {
    fn name(&self) -> (&'static str, &'static str) {
        (ns::BIDI_FEATURE, "bidi")
    }

    fn needs(&self) -> SessionState {
        SessionState::S2S
    }

    fn advertise(&self, _state: SessionState) -> Option<(Element, bool)> {
        Some((nonza::BidiFeature.into(), false))
    }

    fn recognizes(&self, elem: &Element) -> bool {
        elem.is("bidi", ns::BIDI)
    }

    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        _input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>> {
        async move {
            if !stream.is_responder() {
                stream.send(nonza::Bidi.into()).await?;
            }
            Ok(Negotiated::nothing())
        }
        .boxed()
    }
}
