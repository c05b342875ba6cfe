// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stream compression feature (XEP-0138).
//!
//! This module speaks the negotiation protocol; the compressed transport
//! itself is produced by a caller-supplied wrapper, since which codec to
//! use (and whether to link one at all) is the application's call.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use minidom::Element;
use xmpp_stanza::compress as nonza;
use xmpp_stanza::ns;

use crate::connection::Connection;
use crate::error::{Error, ProtocolError};
use crate::negotiate::{FeatureStream, Negotiated, StreamFeature};
use crate::state::SessionState;

/// Wraps a transport in the negotiated compression method.
pub type CompressTransport =
    Arc<dyn Fn(Connection, &str) -> Result<Connection, Error> + Send + Sync>;

/// Stream compression: negotiate a method, wrap the transport, restart.
pub struct Compress {
    methods: Vec<String>,
    wrap: CompressTransport,
}

impl Compress {
    /// A compression feature supporting `methods`, using `wrap` to
    /// produce the compressed transport after a successful exchange.
    pub fn new(methods: Vec<String>, wrap: CompressTransport) -> Compress {
        Compress { methods, wrap }
    }

    async fn negotiate_client(
        &self,
        stream: &mut FeatureStream,
        offer: Element,
    ) -> Result<Negotiated, Error> {
        let offered = nonza::CompressionFeature::try_from(offer).map_err(ProtocolError::Parsers)?;
        let Some(method) = self
            .methods
            .iter()
            .find(|method| offered.methods.contains(*method))
            .cloned()
        else {
            log::debug!("no compression method in common; skipping");
            return Ok(Negotiated::nothing());
        };

        stream
            .send(
                nonza::Compress {
                    method: method.clone(),
                }
                .into(),
            )
            .await?;

        let elem = stream.recv().await?;
        if elem.is("compressed", ns::COMPRESS) {
            let conn = stream.take_connection()?;
            let wrapped = (self.wrap)(conn, &method)?;
            Ok(Negotiated::replace(SessionState::empty(), wrapped))
        } else if elem.is("failure", ns::COMPRESS) {
            // Compression failure is not stream-fatal; continue without.
            log::warn!("peer refused compression method {}", method);
            Ok(Negotiated::nothing())
        } else {
            Err(ProtocolError::UnsupportedStanzaType.into())
        }
    }

    async fn negotiate_server(
        &self,
        stream: &mut FeatureStream,
        input: Element,
    ) -> Result<Negotiated, Error> {
        let request = nonza::Compress::try_from(input).map_err(ProtocolError::Parsers)?;
        if !self.methods.contains(&request.method) {
            stream
                .send(
                    nonza::Failure {
                        condition: nonza::FailureCondition::UnsupportedMethod,
                    }
                    .into(),
                )
                .await?;
            return Ok(Negotiated::nothing());
        }
        stream.send(nonza::Compressed.into()).await?;
        let conn = stream.take_connection()?;
        let wrapped = (self.wrap)(conn, &request.method)?;
        Ok(Negotiated::replace(SessionState::empty(), wrapped))
    }
}

impl StreamFeature for Compress {
    fn name(&self) -> (&'static str, &'static str) {
        (ns::COMPRESS_FEATURE, "compression")
    }

    fn prohibits(&self) -> SessionState {
        SessionState::READY
    }

    fn advertise(&self, _state: SessionState) -> Option<(Element, bool)> {
        Some((
            nonza::CompressionFeature {
                methods: self.methods.clone(),
            }
            .into(),
            false,
        ))
    }

    fn recognizes(&self, elem: &Element) -> bool {
        elem.is("compress", ns::COMPRESS)
    }

    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>> {
        async move {
            if stream.is_responder() {
                self.negotiate_server(stream, input).await
            } else {
                self.negotiate_client(stream, input).await
            }
        }
        .boxed()
    }
}
