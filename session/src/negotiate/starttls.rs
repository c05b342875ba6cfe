// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The STARTTLS stream feature.

use std::io;

use futures::future::BoxFuture;
use futures::FutureExt;

use minidom::Element;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use xmpp_stanza::ns;
use xmpp_stanza::starttls as nonza;

use crate::connection::Connection;
use crate::error::{Error, ProtocolError};
use crate::negotiate::{FeatureStream, Negotiated, StreamFeature};
use crate::state::SessionState;

enum Role {
    Client(TlsConnector),
    Server(TlsAcceptor),
}

/// STARTTLS (RFC 6120 §5): upgrade the transport to TLS and restart the
/// stream.
pub struct StartTls {
    required: bool,
    role: Role,
}

impl StartTls {
    /// The initiator side: request TLS and connect with `connector`.
    pub fn client(connector: TlsConnector) -> StartTls {
        StartTls {
            required: false,
            role: Role::Client(connector),
        }
    }

    /// The responder side: advertise TLS (with `<required/>` if asked)
    /// and accept the handshake with `acceptor`.
    pub fn server(acceptor: TlsAcceptor, required: bool) -> StartTls {
        StartTls {
            required,
            role: Role::Server(acceptor),
        }
    }

    async fn negotiate_client(
        &self,
        stream: &mut FeatureStream,
        connector: &TlsConnector,
    ) -> Result<Negotiated, Error> {
        stream.send(nonza::Request.into()).await?;

        let elem = stream.recv().await?;
        if elem.is("proceed", ns::TLS) {
            let domain = stream.remote().domain().to_owned();
            let name = ServerName::try_from(domain)
                .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
            let conn = stream.take_connection()?;
            let tls = connector.connect(name, conn).await?;
            Ok(Negotiated::replace(
                SessionState::SECURE,
                Connection::secure(tls),
            ))
        } else if elem.is("failure", ns::TLS) {
            Err(ProtocolError::TlsRefused.into())
        } else {
            Err(ProtocolError::UnsupportedStanzaType.into())
        }
    }

    async fn negotiate_server(
        &self,
        stream: &mut FeatureStream,
        acceptor: &TlsAcceptor,
        input: Element,
    ) -> Result<Negotiated, Error> {
        if nonza::Request::try_from(input).is_err() {
            return Err(ProtocolError::UnsupportedStanzaType.into());
        }
        stream.send(nonza::Proceed.into()).await?;
        let conn = stream.take_connection()?;
        let tls = acceptor.accept(conn).await?;
        Ok(Negotiated::replace(
            SessionState::SECURE,
            Connection::secure(tls),
        ))
    }
}

impl StreamFeature for StartTls {
    fn name(&self) -> (&'static str, &'static str) {
        (ns::TLS, "starttls")
    }

    fn prohibits(&self) -> SessionState {
        SessionState::SECURE
    }

    fn mandatory(&self) -> bool {
        true
    }

    fn advertise(&self, _state: SessionState) -> Option<(Element, bool)> {
        Some((
            nonza::StartTls {
                required: self.required,
            }
            .into(),
            self.required,
        ))
    }

    fn offer_required(&self, offer: &Element) -> bool {
        nonza::StartTls::try_from(offer.clone())
            .map(|starttls| starttls.required)
            .unwrap_or(false)
    }

    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>> {
        async move {
            match &self.role {
                Role::Client(connector) => self.negotiate_client(stream, connector).await,
                Role::Server(acceptor) => self.negotiate_server(stream, acceptor, input).await,
            }
        }
        .boxed()
    }
}
