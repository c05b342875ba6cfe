// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The resource binding stream feature.

use futures::future::BoxFuture;
use futures::FutureExt;

use minidom::Element;
use xmpp_addr::FullAddr;
use xmpp_stanza::bind::{BindQuery, BindResponse};
use xmpp_stanza::iq::{Iq, IqType};
use xmpp_stanza::{ns, Stanza};

use crate::error::{Error, ProtocolError};
use crate::negotiate::{FeatureStream, Negotiated, StreamFeature};
use crate::session::make_id;
use crate::state::SessionState;

/// How the responder picks the resource to assign.
pub type AssignResource = Box<dyn Fn(Option<String>) -> String + Send + Sync>;

enum Role {
    Client { resource: Option<String> },
    Server { assign: AssignResource },
}

/// Resource binding (RFC 6120 §7): obtain the session's full address.
///
/// On success the bound address replaces the session's local address
/// (initiator) or the peer's address (responder).
pub struct Bind {
    role: Role,
}

impl Bind {
    /// The initiator side, optionally asking for a specific resource.
    pub fn client(resource: Option<String>) -> Bind {
        Bind {
            role: Role::Client { resource },
        }
    }

    /// The responder side; `assign` turns the (optional) requested
    /// resource into the one actually bound.
    pub fn server(assign: AssignResource) -> Bind {
        Bind {
            role: Role::Server { assign },
        }
    }

    /// A responder which assigns random resources, ignoring requests.
    pub fn server_random() -> Bind {
        Bind::server(Box::new(|_| make_id()))
    }

    async fn negotiate_client(
        &self,
        stream: &mut FeatureStream,
        resource: &Option<String>,
    ) -> Result<Negotiated, Error> {
        let request = Iq::set(BindQuery::new(resource.clone()).into()).with_id(make_id());
        let id = request.id.clone().unwrap_or_default();
        stream.send(request.into()).await?;

        loop {
            let elem = stream.recv().await?;
            let Ok(reply) = Iq::try_from(elem) else {
                continue;
            };
            if reply.id.as_deref() != Some(&id) {
                continue;
            }
            return match reply.payload {
                IqType::Result(Some(payload)) => {
                    let bound = BindResponse::try_from(payload)
                        .map_err(|_| ProtocolError::InvalidBindResponse)?;
                    log::debug!("bound to {}", bound.addr);
                    stream.set_local(bound.addr.into());
                    Ok(Negotiated::nothing())
                }
                IqType::Error(error) => Err(Error::Stanza(error)),
                _ => Err(ProtocolError::InvalidBindResponse.into()),
            };
        }
    }

    async fn negotiate_server(
        &self,
        stream: &mut FeatureStream,
        assign: &AssignResource,
        input: Element,
    ) -> Result<Negotiated, Error> {
        let request = Iq::try_from(input).map_err(ProtocolError::Parsers)?;
        let IqType::Set(ref payload) = request.payload else {
            return Err(ProtocolError::UnsupportedStanzaType.into());
        };
        let query = BindQuery::try_from(payload.clone()).map_err(ProtocolError::Parsers)?;

        let resource = assign(query.resource);
        let peer = stream.remote();
        let bound = FullAddr::from_parts(peer.local(), peer.domain(), &resource)?;

        let reply = request.reply_result(Some(BindResponse { addr: bound.clone() }.into()));
        stream.send(reply.into()).await?;
        log::debug!("assigned {}", bound);
        stream.set_remote(bound.into());
        Ok(Negotiated::nothing())
    }
}

impl StreamFeature for Bind {
    fn name(&self) -> (&'static str, &'static str) {
        (ns::BIND, "bind")
    }

    fn needs(&self) -> SessionState {
        SessionState::AUTHN
    }

    fn prohibits(&self) -> SessionState {
        SessionState::S2S
    }

    fn mandatory(&self) -> bool {
        true
    }

    fn required_for_ready(&self, state: SessionState) -> bool {
        !state.contains(SessionState::S2S)
    }

    fn advertise(&self, _state: SessionState) -> Option<(Element, bool)> {
        Some((Element::bare("bind", ns::BIND), true))
    }

    fn offer_required(&self, _offer: &Element) -> bool {
        true
    }

    fn recognizes(&self, elem: &Element) -> bool {
        Stanza::is_stanza(elem)
            && elem.name() == "iq"
            && elem.children().any(|child| child.is("bind", ns::BIND))
    }

    fn negotiate<'a>(
        &'a self,
        stream: &'a mut FeatureStream,
        input: Element,
    ) -> BoxFuture<'a, Result<Negotiated, Error>> {
        async move {
            match &self.role {
                Role::Client { resource } => self.negotiate_client(stream, resource).await,
                Role::Server { assign } => self.negotiate_server(stream, assign, input).await,
            }
        }
        .boxed()
    }
}
