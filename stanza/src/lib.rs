// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed XMPP wire elements.
//!
//! Each module implements `TryFrom<Element>` on its types, taking a minidom
//! [`Element`] and producing a typed value or an [`error::Error`], and the
//! reverse `From<T> for Element` conversion for what goes on the wire.
//!
//! Stanza types accept both the `jabber:client` and `jabber:server` default
//! namespaces on input and serialize as `jabber:client`; use
//! [`rebase_ns`] to move a built element onto a server-to-server stream.

#![warn(missing_docs)]

pub use minidom;
pub use minidom::Element;
pub use xmpp_addr as addr;

/// XML namespace definitions used through XMPP.
pub mod ns;

#[macro_use]
mod util;

/// Conversion error type.
pub mod error;

/// RFC 6120: resource binding
pub mod bind;
/// RFC 6120: Info/Query stanza
pub mod iq;
/// RFC 6120: message stanza
pub mod message;
/// RFC 6120: presence stanza
pub mod presence;
/// RFC 6120: SASL negotiation
pub mod sasl;
/// RFC 6120: stanza errors
pub mod stanza_error;
/// RFC 6120: STARTTLS negotiation
pub mod starttls;
/// RFC 6120: stream errors
pub mod stream_error;
/// RFC 6120: stream features
pub mod stream_features;

/// RFC 7395: WebSocket framing elements
pub mod websocket;

/// XEP-0138: stream compression
pub mod compress;

/// XEP-0199: XMPP ping
pub mod ping;

/// XEP-0288: bidirectional server-to-server streams
pub mod bidi;

mod stanza;

pub use crate::stanza::Stanza;

/// Rewrite the default stanza namespace of an element tree.
///
/// Elements whose namespace equals `from` are rebuilt with namespace `to`,
/// recursively; payloads in other namespaces are untouched. Stanza types
/// serialize in `jabber:client`, so sending them on a `jabber:server`
/// stream takes one rebase.
pub fn rebase_ns(elem: &Element, from: &str, to: &str) -> Element {
    if elem.ns() != from {
        return elem.clone();
    }
    let mut builder = Element::builder(elem.name(), to);
    for (name, value) in elem.attrs() {
        builder = builder.attr(name, value);
    }
    for node in elem.nodes() {
        builder = match node {
            minidom::Node::Element(child) => builder.append(rebase_ns(child, from, to)),
            minidom::Node::Text(text) => builder.append(text.clone()),
        };
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_rewrites_only_the_default_ns() {
        let elem: Element = "<iq xmlns='jabber:client' type='get' id='1'><ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();
        let rebased = rebase_ns(&elem, ns::JABBER_CLIENT, ns::JABBER_SERVER);
        assert!(rebased.is("iq", ns::JABBER_SERVER));
        assert_eq!(rebased.attr("id"), Some("1"));
        let child = rebased.children().next().unwrap();
        assert!(child.is("ping", ns::PING));
    }

    #[test]
    fn rebase_descends_into_same_ns_children() {
        let elem: Element =
            "<message xmlns='jabber:client'><body>hello</body></message>"
                .parse()
                .unwrap();
        let rebased = rebase_ns(&elem, ns::JABBER_CLIENT, ns::JABBER_SERVER);
        let body = rebased.children().next().unwrap();
        assert!(body.is("body", ns::JABBER_SERVER));
        assert_eq!(body.text(), "hello");
    }
}
