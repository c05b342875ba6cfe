// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream header exchange and validation.

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use tokio_util::codec::{Framed, FramedParts};

use minidom::Element;
use xmpp_addr::Addr;
use xmpp_stanza::{ns, stream_error::StreamError};

use crate::codec::{Framing, Packet, XmppCodec};
use crate::connection::Connection;
use crate::error::{Error, ProtocolError};

/// The values parsed from a received stream header.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    /// The `to` attribute.
    pub to: Option<Addr>,

    /// The `from` attribute.
    pub from: Option<Addr>,

    /// The stream id.
    pub id: Option<String>,

    /// The default language of the stream.
    pub lang: Option<String>,

    /// The default namespace (`jabber:client` or `jabber:server`).
    pub ns: String,
}

/// The attributes of the header we send.
#[derive(Debug, Clone, Default)]
pub struct StreamHeader {
    /// The `to` attribute.
    pub to: Option<Addr>,

    /// The `from` attribute.
    pub from: Option<Addr>,

    /// The stream id; responders generate one.
    pub id: Option<String>,

    /// The `xml:lang` attribute.
    pub lang: Option<String>,
}

impl StreamHeader {
    pub(crate) fn into_attrs(self, framing: Framing, default_ns: &str) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        match framing {
            Framing::Stream => {
                attrs.insert("xmlns".to_owned(), default_ns.to_owned());
                attrs.insert("xmlns:stream".to_owned(), ns::STREAM.to_owned());
            }
            Framing::WebSocket => {
                attrs.insert("xmlns".to_owned(), ns::WEBSOCKET.to_owned());
            }
        }
        attrs.insert("version".to_owned(), "1.0".to_owned());
        if let Some(to) = self.to {
            attrs.insert("to".to_owned(), to.to_string());
        }
        if let Some(from) = self.from {
            attrs.insert("from".to_owned(), from.to_string());
        }
        if let Some(id) = self.id {
            attrs.insert("id".to_owned(), id);
        }
        if let Some(lang) = self.lang {
            attrs.insert("xml:lang".to_owned(), lang);
        }
        attrs
    }
}

/// Validate a received stream header.
///
/// The codec has already checked the element itself; this validates the
/// attributes: the declared namespaces, the `1.0` version, and, for
/// initiators, the id the responder is required to assign.
pub(crate) fn parse_stream_start(
    attrs: &HashMap<String, String>,
    framing: Framing,
    expected_ns: &str,
    initiator: bool,
) -> Result<StreamInfo, Error> {
    match framing {
        Framing::Stream => {
            match attrs.get("xmlns:stream") {
                Some(stream_ns) if stream_ns == ns::STREAM => (),
                _ => return Err(ProtocolError::InvalidStreamHeader.into()),
            }
            match attrs.get("xmlns") {
                None => return Err(ProtocolError::NoStreamNamespace.into()),
                Some(default_ns) if default_ns != expected_ns => {
                    return Err(ProtocolError::InvalidStreamNamespace.into());
                }
                Some(_) => (),
            }
        }
        Framing::WebSocket => match attrs.get("xmlns") {
            Some(default_ns) if default_ns == ns::WEBSOCKET => (),
            _ => return Err(ProtocolError::InvalidStreamNamespace.into()),
        },
    }

    match attrs.get("version") {
        Some(version) if version == "1.0" => (),
        _ => return Err(ProtocolError::UnsupportedVersion.into()),
    }

    let id = attrs.get("id").filter(|id| !id.is_empty()).cloned();
    if initiator && id.is_none() {
        return Err(ProtocolError::NoStreamId.into());
    }

    let to = attrs
        .get("to")
        .map(|to| to.parse::<Addr>())
        .transpose()?;
    let from = attrs
        .get("from")
        .map(|from| from.parse::<Addr>())
        .transpose()?;

    Ok(StreamInfo {
        to,
        from,
        id,
        lang: attrs.get("xml:lang").cloned(),
        ns: expected_ns.to_owned(),
    })
}

/// Send our stream header.
pub(crate) async fn send_header(
    framed: &mut Framed<Connection, XmppCodec>,
    header: StreamHeader,
    framing: Framing,
    default_ns: &str,
) -> Result<(), Error> {
    framed
        .send(Packet::StreamStart(header.into_attrs(framing, default_ns)))
        .await
}

/// Receive and validate the peer's stream header.
pub(crate) async fn recv_header(
    framed: &mut Framed<Connection, XmppCodec>,
    framing: Framing,
    expected_ns: &str,
    initiator: bool,
) -> Result<StreamInfo, Error> {
    loop {
        match framed.next().await {
            Some(Ok(Packet::StreamStart(attrs))) => {
                return parse_stream_start(&attrs, framing, expected_ns, initiator);
            }
            Some(Ok(Packet::Text(_))) => (),
            Some(Ok(Packet::Stanza(_))) | Some(Ok(Packet::StreamEnd)) => {
                return Err(ProtocolError::InvalidStreamHeader.into());
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Disconnected),
        }
    }
}

/// Receive the `<stream:features/>` listing which follows a header.
///
/// A `<stream:error/>` in its place is decoded and returned as the
/// terminal error it is.
pub(crate) async fn recv_features(
    framed: &mut Framed<Connection, XmppCodec>,
) -> Result<Element, Error> {
    loop {
        match framed.next().await {
            Some(Ok(Packet::Stanza(elem))) => {
                if elem.is("error", ns::STREAM) {
                    return Err(Error::Stream(StreamError::try_from(elem)?));
                }
                if elem.is("features", ns::STREAM) {
                    return Ok(elem);
                }
                return Err(ProtocolError::UnexpectedToken.into());
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

/// Rebuild the framer around the same transport with fresh tokenizer
/// state, keeping bytes that were read but not yet parsed.
///
/// This is the stream-restart primitive: the responder may have sent the
/// beginning of the new stream right after the element that triggered the
/// restart, and those bytes must not be lost with the old parser.
pub(crate) fn reframe(
    framed: Framed<Connection, XmppCodec>,
    framing: Framing,
) -> Framed<Connection, XmppCodec> {
    let parts = framed.into_parts();
    let mut fresh = FramedParts::new(parts.io, XmppCodec::new(framing));
    fresh.read_buf = parts.read_buf;
    Framed::from_parts(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_header() {
        let attrs = attrs(&[
            ("xmlns", "jabber:client"),
            ("xmlns:stream", ns::STREAM),
            ("version", "1.0"),
            ("id", "abc"),
            ("from", "shakespeare.lit"),
        ]);
        let info =
            parse_stream_start(&attrs, Framing::Stream, ns::JABBER_CLIENT, true).unwrap();
        assert_eq!(info.id.as_deref(), Some("abc"));
        assert_eq!(info.from.unwrap().as_str(), "shakespeare.lit");
    }

    #[test]
    fn initiator_requires_id() {
        let attrs = attrs(&[
            ("xmlns", "jabber:client"),
            ("xmlns:stream", ns::STREAM),
            ("version", "1.0"),
        ]);
        match parse_stream_start(&attrs, Framing::Stream, ns::JABBER_CLIENT, true) {
            Err(Error::Protocol(ProtocolError::NoStreamId)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        // The responder side accepts a header without id.
        parse_stream_start(&attrs, Framing::Stream, ns::JABBER_CLIENT, false).unwrap();
    }

    #[test]
    fn version_must_be_1_0() {
        let attrs = attrs(&[
            ("xmlns", "jabber:client"),
            ("xmlns:stream", ns::STREAM),
            ("version", "0.9"),
            ("id", "abc"),
        ]);
        match parse_stream_start(&attrs, Framing::Stream, ns::JABBER_CLIENT, true) {
            Err(Error::Protocol(ProtocolError::UnsupportedVersion)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn wrong_default_ns_is_rejected() {
        let attrs = attrs(&[
            ("xmlns", "jabber:server"),
            ("xmlns:stream", ns::STREAM),
            ("version", "1.0"),
            ("id", "abc"),
        ]);
        match parse_stream_start(&attrs, Framing::Stream, ns::JABBER_CLIENT, true) {
            Err(Error::Protocol(ProtocolError::InvalidStreamNamespace)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn websocket_header() {
        let attrs = attrs(&[("xmlns", ns::WEBSOCKET), ("version", "1.0"), ("id", "w1")]);
        let info =
            parse_stream_start(&attrs, Framing::WebSocket, ns::JABBER_CLIENT, true).unwrap();
        assert_eq!(info.id.as_deref(), Some("w1"));
        assert_eq!(info.ns, ns::JABBER_CLIENT);
    }
}
