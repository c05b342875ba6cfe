// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML stream parser and serializer for XMPP.
//!
//! Stream headers are produced as raw bytes rather than through a generic
//! XML encoder: the prefixed `stream:` namespace of the header cannot be
//! round-tripped by a naive serializer, and the header is an unclosed
//! start tag anyway.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;

use bytes::{BufMut, BytesMut};
use log::debug;
use minidom::tree_builder::TreeBuilder;
use minidom::Element;
use rxml::{Lexer, PushDriver, RawParser};
use tokio_util::codec::{Decoder, Encoder};

use xmpp_stanza::ns;

use crate::error::{Error, ProtocolError};

/// The two framing variants of RFC 6120 and RFC 7395.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `<stream:stream>` header and `</stream:stream>` footer.
    Stream,

    /// Self-delimiting `<open/>` and `<close/>` elements.
    WebSocket,
}

/// Anything that can appear at the top level of an XMPP byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A stream header, as a map of its attributes (including the
    /// namespace declarations as `xmlns` / `xmlns:stream`).
    StreamStart(HashMap<String, String>),
    /// A complete stanza or nonza
    Stanza(Element),
    /// Plain text (think whitespace keep-alive)
    Text(String),
    /// The stream footer
    StreamEnd,
}

/// Stateful encoder/decoder between a byte stream and [`Packet`]s.
pub struct XmppCodec {
    framing: Framing,
    driver: PushDriver<RawParser>,
    stanza_builder: TreeBuilder,
}

impl XmppCodec {
    /// Construct a codec for the given framing variant.
    pub fn new(framing: Framing) -> Self {
        XmppCodec {
            framing,
            driver: PushDriver::wrap(Lexer::new(), RawParser::new()),
            stanza_builder: TreeBuilder::new(),
        }
    }

    /// Drop all tokenizer state, as required across a stream restart.
    fn reset(&mut self) {
        self.driver = PushDriver::wrap(Lexer::new(), RawParser::new());
        self.stanza_builder = TreeBuilder::new();
    }

    fn header_attrs(root: &Element) -> HashMap<String, String> {
        root.attrs()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .chain(
                root.prefixes
                    .declared_prefixes()
                    .iter()
                    .map(|(prefix, namespace)| {
                        (
                            prefix
                                .as_ref()
                                .map(|prefix| format!("xmlns:{}", prefix))
                                .unwrap_or_else(|| "xmlns".to_owned()),
                            namespace.clone(),
                        )
                    }),
            )
            .collect()
    }
}

impl Decoder for XmppCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let token = match self.driver.parse(buf, false) {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(rxml::Error::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(minidom::Error::from(e).into()),
            };

            let had_root = self.stanza_builder.depth() > 0;
            self.stanza_builder.process_event(token).map_err(Error::from)?;
            let has_root = self.stanza_builder.depth() > 0;

            match self.framing {
                Framing::Stream => {
                    if !had_root && has_root {
                        let root = self.stanza_builder.top().unwrap();
                        if !root.is("stream", ns::STREAM) {
                            return Err(ProtocolError::InvalidStreamHeader.into());
                        }
                        let attrs = Self::header_attrs(root);
                        debug!("<< {}", String::from(root));
                        return Ok(Some(Packet::StreamStart(attrs)));
                    } else if self.stanza_builder.depth() == 1 {
                        self.driver.release_temporaries();

                        if let Some(stanza) = self.stanza_builder.unshift_child() {
                            debug!("<< {}", String::from(&stanza));
                            return Ok(Some(Packet::Stanza(stanza)));
                        }
                    } else if self.stanza_builder.root.take().is_some() {
                        self.driver.release_temporaries();

                        debug!("<< </stream:stream>");
                        return Ok(Some(Packet::StreamEnd));
                    }
                }
                Framing::WebSocket => {
                    // Each framing-level element is its own document root;
                    // the tokenizer is re-armed after every completed one.
                    if self.stanza_builder.depth() > 0 {
                        continue;
                    }
                    if let Some(root) = self.stanza_builder.root.take() {
                        self.reset();
                        debug!("<< {}", String::from(&root));
                        if root.is("open", ns::WEBSOCKET) {
                            return Ok(Some(Packet::StreamStart(Self::header_attrs(&root))));
                        } else if root.is("close", ns::WEBSOCKET) {
                            return Ok(Some(Packet::StreamEnd));
                        } else {
                            return Ok(Some(Packet::Stanza(root)));
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode(buf)
    }
}

impl Encoder<Packet> for XmppCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let remaining = dst.capacity() - dst.len();
        let max_stanza_size: usize = 2usize.pow(16);
        if remaining < max_stanza_size {
            dst.reserve(max_stanza_size - remaining);
        }

        fn to_io_err<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> io::Error {
            io::Error::new(io::ErrorKind::InvalidInput, e)
        }

        match item {
            Packet::StreamStart(attrs) => {
                let mut buf = String::new();
                match self.framing {
                    Framing::Stream => {
                        buf.push_str("<?xml version='1.0'?><stream:stream");
                        for (name, value) in attrs {
                            write!(buf, " {}='{}'", name, escape(&value)).map_err(to_io_err)?;
                        }
                        buf.push('>');
                    }
                    Framing::WebSocket => {
                        buf.push_str("<open");
                        for (name, value) in attrs {
                            write!(buf, " {}='{}'", name, escape(&value)).map_err(to_io_err)?;
                        }
                        buf.push_str("/>");
                    }
                }
                debug!(">> {}", buf);
                dst.put_slice(buf.as_bytes());
            }
            Packet::Stanza(stanza) => {
                stanza
                    .write_to(&mut WriteBytes::new(dst))
                    .map_err(|e| to_io_err(format!("{}", e)))?;
                debug!(">> {}", String::from(&stanza));
            }
            Packet::Text(text) => {
                let escaped = escape(&text);
                dst.put_slice(escaped.as_bytes());
                debug!(">> {}", escaped);
            }
            Packet::StreamEnd => match self.framing {
                Framing::Stream => {
                    dst.put_slice(b"</stream:stream>");
                    debug!(">> </stream:stream>");
                }
                Framing::WebSocket => {
                    let close = format!("<close xmlns='{}'/>", ns::WEBSOCKET);
                    dst.put_slice(close.as_bytes());
                    debug!(">> {}", close);
                }
            },
        }

        Ok(())
    }
}

/// XML-escape a text or attribute value.
pub(crate) fn escape(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '\'' => result.push_str("&apos;"),
            '"' => result.push_str("&quot;"),
            o => result.push(o),
        }
    }
    result
}

/// `BytesMut` implements `std::fmt::Write` but not `std::io::Write`; the
/// latter is what minidom's `Element::write_to` wants.
struct WriteBytes<'a> {
    dst: &'a mut BytesMut,
}

impl<'a> WriteBytes<'a> {
    fn new(dst: &'a mut BytesMut) -> Self {
        WriteBytes { dst }
    }
}

impl<'a> std::io::Write for WriteBytes<'a> {
    fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, std::io::Error> {
        self.dst.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::result::Result<(), std::io::Error> {
        Ok(())
    }
}
