// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The SASL stream feature.
//!
//! Mechanism internals come from the `sasl` crate; this module only
//! drives the `<auth/>` / `<challenge/>` / `<response/>` exchange.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use futures::FutureExt;

use minidom::Element;
use sasl::client::mechanisms::{Anonymous, Plain, Scram};
use sasl::client::Mechanism;
use sasl::common::scram::{Sha1, Sha256};
use sasl::common::{Credentials, Identity};
use sasl::server::{Mechanism as ServerMechanism, Response as ServerResponse};

use xmpp_addr::Addr;
use xmpp_stanza::ns;
use xmpp_stanza::sasl as nonza;

use crate::error::{AuthError, Error, ProtocolError};
use crate::negotiate::{FeatureStream, Negotiated, StreamFeature};
use crate::state::SessionState;

/// A boxed server-side mechanism factory; one mechanism instance is
/// created per authentication attempt.
pub type ServerMechanismFactory =
    Box<dyn Fn() -> Box<dyn ServerMechanism + Send> + Send + Sync>;

enum Role {
    Client { credentials: Credentials },
    Server { mechanisms: Vec<ServerMechanismFactory> },
}

/// SASL authentication (RFC 6120 §6): authenticate the stream and
/// restart it.
pub struct Sasl {
    role: Role,
}

impl Sasl {
    /// The initiator side, authenticating with `credentials`.
    ///
    /// Mechanisms supported locally, strongest first: SCRAM-SHA-256,
    /// SCRAM-SHA-1, PLAIN, ANONYMOUS. The peer's advertisement order
    /// decides which one runs.
    pub fn client(credentials: Credentials) -> Sasl {
        Sasl {
            role: Role::Client { credentials },
        }
    }

    /// The responder side, offering the given mechanisms.
    pub fn server(mechanisms: Vec<ServerMechanismFactory>) -> Sasl {
        Sasl {
            role: Role::Server { mechanisms },
        }
    }

    async fn negotiate_client(
        &self,
        stream: &mut FeatureStream,
        credentials: &Credentials,
        offer: Element,
    ) -> Result<Negotiated, Error> {
        let offered = nonza::Mechanisms::try_from(offer).map_err(ProtocolError::Parsers)?;

        // First peer-offered mechanism we support; the peer lists
        // strongest first.
        let mut mechanism: Option<Box<dyn Mechanism + Send>> = None;
        for name in &offered.mechanisms {
            if let Some(m) = client_mechanism(name, credentials) {
                mechanism = Some(m);
                break;
            }
        }
        let Some(mut mechanism) = mechanism else {
            return Err(AuthError::NoMechanism.into());
        };
        log::debug!("authenticating with SASL mechanism {}", mechanism.name());

        let initial = mechanism.initial();
        stream
            .send(
                nonza::Auth {
                    mechanism: mechanism.name().to_owned(),
                    data: initial,
                }
                .into(),
            )
            .await?;

        loop {
            let elem = stream.recv().await?;
            if elem.is("challenge", ns::SASL) {
                let challenge =
                    nonza::Challenge::try_from(elem).map_err(ProtocolError::Parsers)?;
                let response = mechanism
                    .response(&challenge.data)
                    .map_err(AuthError::Mechanism)?;
                stream.send(nonza::Response { data: response }.into()).await?;
            } else if elem.is("success", ns::SASL) {
                let success = nonza::Success::try_from(elem).map_err(ProtocolError::Parsers)?;
                mechanism
                    .success(&success.data)
                    .map_err(AuthError::Mechanism)?;
                return Ok(Negotiated::restart(SessionState::AUTHN));
            } else if elem.is("failure", ns::SASL) {
                let failure = nonza::Failure::try_from(elem).map_err(ProtocolError::Parsers)?;
                return Err(AuthError::Fail(failure).into());
            } else {
                return Err(ProtocolError::UnsupportedStanzaType.into());
            }
        }
    }

    async fn negotiate_server(
        &self,
        stream: &mut FeatureStream,
        mechanisms: &[ServerMechanismFactory],
        input: Element,
    ) -> Result<Negotiated, Error> {
        let auth = nonza::Auth::try_from(input).map_err(ProtocolError::Parsers)?;

        let factory = mechanisms
            .iter()
            .find(|factory| factory().name() == auth.mechanism);
        let Some(factory) = factory else {
            let failure = failure(nonza::Condition::InvalidMechanism);
            stream.send(failure.clone().into()).await?;
            return Err(AuthError::Fail(failure).into());
        };
        let mut mechanism = factory();
        let mut payload = auth.data;

        loop {
            match mechanism.respond(&payload) {
                Ok(ServerResponse::Success(identity, data)) => {
                    stream.send(nonza::Success { data }.into()).await?;
                    if let Identity::Username(username) = identity {
                        // Mechanisms may authenticate identities which are
                        // not valid localparts (ANONYMOUS hands out opaque
                        // tokens); those leave the peer address alone.
                        match Addr::from_parts(Some(&username), stream.local().domain(), None) {
                            Ok(authed) => stream.set_remote(authed),
                            Err(e) => log::debug!(
                                "authenticated identity {:?} is not an address localpart: {}",
                                username,
                                e
                            ),
                        }
                    }
                    return Ok(Negotiated::restart(SessionState::AUTHN));
                }
                Ok(ServerResponse::Proceed(data)) => {
                    stream.send(nonza::Challenge { data }.into()).await?;
                    let elem = stream.recv().await?;
                    if elem.is("response", ns::SASL) {
                        payload = nonza::Response::try_from(elem)
                            .map_err(ProtocolError::Parsers)?
                            .data;
                    } else if elem.is("abort", ns::SASL) {
                        let failure = failure(nonza::Condition::Aborted);
                        stream.send(failure.clone().into()).await?;
                        return Err(AuthError::Fail(failure).into());
                    } else {
                        return Err(ProtocolError::UnsupportedStanzaType.into());
                    }
                }
                Err(e) => {
                    stream
                        .send(failure(nonza::Condition::NotAuthorized).into())
                        .await?;
                    return Err(AuthError::ServerMechanism(e).into());
                }
            }
        }
    }
}

fn failure(condition: nonza::Condition) -> nonza::Failure {
    nonza::Failure {
        condition,
        texts: BTreeMap::new(),
    }
}

fn client_mechanism(
    name: &str,
    credentials: &Credentials,
) -> Option<Box<dyn Mechanism + Send>> {
    match name {
        "SCRAM-SHA-256" => Scram::<Sha256>::from_credentials(credentials.clone())
            .ok()
            .map(|m| Box::new(m) as Box<dyn Mechanism + Send>),
        "SCRAM-SHA-1" => Scram::<Sha1>::from_credentials(credentials.clone())
            .ok()
            .map(|m| Box::new(m) as Box<dyn Mechanism + Send>),
        "PLAIN" => Plain::from_credentials(credentials.clone())
            .ok()
            .map(|m| Box::new(m) as Box<dyn Mechanism + Send>),
        "ANONYMOUS" => Some(Box::new(Anonymous::new())),
        _ => None,
    }
}

impl StreamFeature for Sasl {
    fn name(&self) -> (&'static str, &'static str) {
        (ns::SASL, "mechanisms")
    }

    fn prohibits(&self) -> SessionState {
        SessionState::AUTHN
    }

    fn mandatory(&self) -> bool {
        true
    }

    fn offer_required(&self, _offer: &Element) -> bool {
        // Authentication is mandatory-to-negotiate even though the
        // listing carries no <required/> marker.
        true
    }

    fn advertise(&self, _state: SessionState) -> Option<(Element, bool)> {
        let Role::Server { mechanisms } = &self.role else {
            return None;
        };
        let names = mechanisms
            .iter()
            .map(|factory| factory().name().to_owned())
            .collect();
        Some((nonza::Mechanisms { mechanisms: names }.into(), true))
    }

    fn recognizes(&self, elem: &Element) -> bool {
        elem.is("auth", ns::SASL)
    }

    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>> {
        async move {
            match &self.role {
                Role::Client { credentials } => {
                    self.negotiate_client(stream, credentials, input).await
                }
                Role::Server { mechanisms } => {
                    self.negotiate_server(stream, mechanisms, input).await
                }
            }
        }
        .boxed()
    }
}
