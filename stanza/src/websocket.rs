// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! WebSocket framing elements, RFC 7395.
//!
//! Over the WebSocket subprotocol, `<open/>` and `<close/>` stand in for
//! the `<stream:stream>` header and footer.

use minidom::Element;
use xmpp_addr::BareAddr;

use crate::error::Error;
use crate::ns;

/// The stream opening for WebSocket framing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Open {
    /// The entity opening this stream.
    pub from: Option<BareAddr>,

    /// The entity this stream is addressed to.
    pub to: Option<BareAddr>,

    /// The stream id.
    pub id: Option<String>,

    /// The XMPP version in use.
    pub version: Option<String>,

    /// The default language of subsequent stanzas.
    pub lang: Option<String>,
}

impl Open {
    /// Create a client-to-server `<open/>`.
    pub fn new(to: BareAddr) -> Open {
        Open {
            from: None,
            to: Some(to),
            id: None,
            version: Some("1.0".to_owned()),
            lang: None,
        }
    }

    /// Set the `from` attribute.
    pub fn with_from(mut self, from: BareAddr) -> Open {
        self.from = Some(from);
        self
    }

    /// Set the `id` attribute.
    pub fn with_id<I: Into<String>>(mut self, id: I) -> Open {
        self.id = Some(id.into());
        self
    }

    /// Whether the version matches the expected one.
    pub fn is_version(&self, version: &str) -> bool {
        self.version.as_deref() == Some(version)
    }
}

impl TryFrom<Element> for Open {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Open, Error> {
        check_self!(elem, "open", WEBSOCKET);
        Ok(Open {
            from: get_attr!(elem, "from", Option),
            to: get_attr!(elem, "to", Option),
            id: elem.attr("id").map(str::to_owned),
            version: elem.attr("version").map(str::to_owned),
            lang: elem.attr("xml:lang").map(str::to_owned),
        })
    }
}

impl From<Open> for Element {
    fn from(open: Open) -> Element {
        Element::builder("open", ns::WEBSOCKET)
            .attr("from", open.from)
            .attr("to", open.to)
            .attr("id", open.id)
            .attr("version", open.version)
            .attr("xml:lang", open.lang)
            .build()
    }
}

/// The stream closing for WebSocket framing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Close {
    /// URI of an alternative endpoint, if the peer is redirecting.
    pub see_other_uri: Option<String>,
}

impl TryFrom<Element> for Close {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Close, Error> {
        check_self!(elem, "close", WEBSOCKET);
        Ok(Close {
            see_other_uri: elem.attr("see-other-uri").map(str::to_owned),
        })
    }
}

impl From<Close> for Element {
    fn from(close: Close) -> Element {
        Element::builder("close", ns::WEBSOCKET)
            .attr("see-other-uri", close.see_other_uri)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_open() {
        let elem: Element = "<open xmlns='urn:ietf:params:xml:ns:xmpp-framing'/>"
            .parse()
            .unwrap();
        let open = Open::try_from(elem).unwrap();
        assert_eq!(open.to, None);
        assert_eq!(open.version, None);
    }

    #[test]
    fn open_round_trip() {
        let open = Open::new("shakespeare.lit".parse().unwrap()).with_id("ws-1");
        let elem = Element::from(open.clone());
        assert_eq!(Open::try_from(elem).unwrap(), open);
    }

    #[test]
    fn close_with_redirect() {
        let elem: Element = "<close xmlns='urn:ietf:params:xml:ns:xmpp-framing' see-other-uri='wss://otherendpoint.example/xmpp-bind'/>"
            .parse()
            .unwrap();
        let close = Close::try_from(elem).unwrap();
        assert_eq!(
            close.see_other_uri.as_deref(),
            Some("wss://otherendpoint.example/xmpp-bind")
        );
    }
}
