// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<iq/>` stanza: a request/response pair with strict id correlation.

use minidom::Element;
use xmpp_addr::Addr;

use crate::error::Error;
use crate::ns;
use crate::stanza_error::StanzaError;

/// The payload of an `<iq/>`, determined by its `type` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum IqType {
    /// A request for information, carrying exactly one payload element.
    Get(Element),

    /// A request to change state, carrying exactly one payload element.
    Set(Element),

    /// A positive reply, optionally carrying a payload element.
    Result(Option<Element>),

    /// A negative reply.
    Error(StanzaError),
}

impl IqType {
    /// The wire value of the `type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            IqType::Get(_) => "get",
            IqType::Set(_) => "set",
            IqType::Result(_) => "result",
            IqType::Error(_) => "error",
        }
    }

    /// Whether this is a request (`get` or `set`) which expects a reply.
    pub fn is_request(&self) -> bool {
        matches!(self, IqType::Get(_) | IqType::Set(_))
    }
}

/// An Info/Query stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    /// The sender of this stanza.
    pub from: Option<Addr>,

    /// The recipient of this stanza.
    pub to: Option<Addr>,

    /// The id of this stanza. Requests sent without an id get one
    /// assigned by the session before they hit the wire.
    pub id: Option<String>,

    /// The type and payload.
    pub payload: IqType,
}

impl Iq {
    /// Create a `get` request around the given payload.
    pub fn get(payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: None,
            payload: IqType::Get(payload),
        }
    }

    /// Create a `set` request around the given payload.
    pub fn set(payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: None,
            payload: IqType::Set(payload),
        }
    }

    /// Set the recipient.
    pub fn with_to(mut self, to: Addr) -> Iq {
        self.to = Some(to);
        self
    }

    /// Set the sender.
    pub fn with_from(mut self, from: Addr) -> Iq {
        self.from = Some(from);
        self
    }

    /// Set the id.
    pub fn with_id<I: Into<String>>(mut self, id: I) -> Iq {
        self.id = Some(id.into());
        self
    }

    /// Build the `result` reply to this request: addresses swapped, id
    /// echoed.
    pub fn reply_result(&self, payload: Option<Element>) -> Iq {
        Iq {
            from: self.to.clone(),
            to: self.from.clone(),
            id: self.id.clone(),
            payload: IqType::Result(payload),
        }
    }

    /// Build the `error` reply to this request: addresses swapped, id
    /// echoed.
    pub fn reply_error(&self, error: StanzaError) -> Iq {
        Iq {
            from: self.to.clone(),
            to: self.from.clone(),
            id: self.id.clone(),
            payload: IqType::Error(error),
        }
    }
}

impl TryFrom<Element> for Iq {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Iq, Error> {
        if elem.name() != "iq" || !ns::is_stanza_ns(&elem.ns()) {
            return Err(Error::TypeMismatch);
        }
        let from = get_attr!(elem, "from", Option);
        let to = get_attr!(elem, "to", Option);
        let id = elem.attr("id").map(str::to_owned);
        let type_: &str = match elem.attr("type") {
            Some(type_) => type_,
            None => {
                return Err(Error::ParseError("Iq element requires a 'type' attribute."));
            }
        };

        let payload = match type_ {
            "get" | "set" => {
                let mut children = elem.children();
                let payload = children
                    .next()
                    .ok_or(Error::ParseError("Wrong number of children in iq element."))?
                    .clone();
                if children.next().is_some() {
                    return Err(Error::ParseError("Wrong number of children in iq element."));
                }
                if type_ == "get" {
                    IqType::Get(payload)
                } else {
                    IqType::Set(payload)
                }
            }
            "result" => {
                let mut children = elem.children();
                let payload = children.next().cloned();
                if children.next().is_some() {
                    return Err(Error::ParseError("Wrong number of children in iq element."));
                }
                IqType::Result(payload)
            }
            "error" => {
                // An error reply may echo the original payload next to the
                // <error/> element; the echo is dropped here.
                let mut error = None;
                for child in elem.children() {
                    if child.name() == "error" && ns::is_stanza_ns(&child.ns()) {
                        if error.is_some() {
                            return Err(Error::ParseError(
                                "Iq must not have more than one error element.",
                            ));
                        }
                        error = Some(StanzaError::try_from(child.clone())?);
                    }
                }
                match error {
                    Some(error) => IqType::Error(error),
                    None => {
                        return Err(Error::ParseError(
                            "Error iq must have an error element.",
                        ));
                    }
                }
            }
            _ => {
                return Err(Error::ParseError("Invalid 'type' attribute on iq element."));
            }
        };

        Ok(Iq {
            from,
            to,
            id,
            payload,
        })
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let type_ = iq.payload.as_str();
        let builder = Element::builder("iq", ns::JABBER_CLIENT)
            .attr("from", iq.from)
            .attr("to", iq.to)
            .attr("id", iq.id)
            .attr("type", type_);
        match iq.payload {
            IqType::Get(payload) | IqType::Set(payload) => builder.append(payload),
            IqType::Result(Some(payload)) => builder.append(payload),
            IqType::Result(None) => builder,
            IqType::Error(error) => builder.append(Element::from(error)),
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stanza_error::{Condition, ErrorType};

    #[test]
    fn type_is_required() {
        let elem: Element = "<iq xmlns='jabber:client'/>".parse().unwrap();
        match Iq::try_from(elem).unwrap_err() {
            Error::ParseError(s) => assert_eq!(s, "Iq element requires a 'type' attribute."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn get_needs_exactly_one_child() {
        let elem: Element = "<iq xmlns='jabber:client' type='get'><ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        match iq.payload {
            IqType::Get(payload) => assert!(payload.is("ping", ns::PING)),
            other => panic!("unexpected payload: {:?}", other),
        }

        let elem: Element = "<iq xmlns='jabber:client' type='get'/>".parse().unwrap();
        assert!(Iq::try_from(elem).is_err());
    }

    #[test]
    fn empty_result() {
        let elem: Element = "<iq xmlns='jabber:client' type='result' id='42'/>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        assert_eq!(iq.id.as_deref(), Some("42"));
        assert_eq!(iq.payload, IqType::Result(None));
    }

    #[test]
    fn error_reply_keeps_condition_and_drops_echo() {
        let elem: Element = "<iq xmlns='jabber:client' type='error' id='7'>
            <ping xmlns='urn:xmpp:ping'/>
            <error type='cancel'>
                <service-unavailable xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>
            </error>
        </iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        match iq.payload {
            IqType::Error(error) => {
                assert_eq!(error.type_, ErrorType::Cancel);
                assert_eq!(error.condition, Condition::ServiceUnavailable);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn addresses_are_parsed() {
        let elem: Element =
            "<iq xmlns='jabber:client' type='result' id='1' from='a@x.lit/r' to='b@x.lit'/>"
                .parse()
                .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        assert_eq!(iq.from.unwrap().as_str(), "a@x.lit/r");
        assert_eq!(iq.to.unwrap().as_str(), "b@x.lit");
    }

    #[test]
    fn reply_swaps_addresses() {
        let elem: Element =
            "<iq xmlns='jabber:client' type='get' id='9' from='a@x.lit/r' to='x.lit'><ping xmlns='urn:xmpp:ping'/></iq>"
                .parse()
                .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        let reply = iq.reply_result(None);
        assert_eq!(reply.from.as_ref().unwrap().as_str(), "x.lit");
        assert_eq!(reply.to.as_ref().unwrap().as_str(), "a@x.lit/r");
        assert_eq!(reply.id.as_deref(), Some("9"));
    }

    #[test]
    fn round_trip() {
        let iq = Iq::get(Element::bare("ping", ns::PING))
            .with_to("x.lit".parse().unwrap())
            .with_id("ping-1");
        let elem = Element::from(iq.clone());
        assert_eq!(elem.attr("type"), Some("get"));
        let back = Iq::try_from(elem).unwrap();
        assert_eq!(iq, back);
    }
}
