// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! STARTTLS negotiation elements, RFC 6120 §5.

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// The STARTTLS stream feature advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTls {
    /// Whether the responder requires TLS before anything else.
    pub required: bool,
}

impl TryFrom<Element> for StartTls {
    type Error = Error;

    fn try_from(elem: Element) -> Result<StartTls, Error> {
        check_self!(elem, "starttls", TLS);
        let mut required = false;
        for child in elem.children() {
            if child.is("required", ns::TLS) {
                required = true;
            } else {
                return Err(Error::ParseError("Unknown child in starttls element."));
            }
        }
        Ok(StartTls { required })
    }
}

impl From<StartTls> for Element {
    fn from(starttls: StartTls) -> Element {
        Element::builder("starttls", ns::TLS)
            .append_all(if starttls.required {
                Some(Element::builder("required", ns::TLS))
            } else {
                None
            })
            .build()
    }
}

/// The initiator's request to start TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request;

impl TryFrom<Element> for Request {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Request, Error> {
        check_self!(elem, "starttls", TLS);
        Ok(Request)
    }
}

impl From<Request> for Element {
    fn from(_: Request) -> Element {
        Element::bare("starttls", ns::TLS)
    }
}

/// The responder's permission to proceed with the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proceed;

impl TryFrom<Element> for Proceed {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Proceed, Error> {
        check_self!(elem, "proceed", TLS);
        Ok(Proceed)
    }
}

impl From<Proceed> for Element {
    fn from(_: Proceed) -> Element {
        Element::bare("proceed", ns::TLS)
    }
}

/// The responder's refusal; the stream is over after this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure;

impl TryFrom<Element> for Failure {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failure, Error> {
        check_self!(elem, "failure", TLS);
        Ok(Failure)
    }
}

impl From<Failure> for Element {
    fn from(_: Failure) -> Element {
        Element::bare("failure", ns::TLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_with_required() {
        let elem: Element =
            "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>"
                .parse()
                .unwrap();
        let starttls = StartTls::try_from(elem).unwrap();
        assert!(starttls.required);
    }

    #[test]
    fn feature_optional() {
        let elem: Element = "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
            .parse()
            .unwrap();
        let starttls = StartTls::try_from(elem).unwrap();
        assert!(!starttls.required);
    }

    #[test]
    fn proceed_and_failure() {
        let elem: Element = "<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
            .parse()
            .unwrap();
        Proceed::try_from(elem).unwrap();
        let elem: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
            .parse()
            .unwrap();
        Failure::try_from(elem).unwrap();
        let elem: Element = "<proceed xmlns='urn:xmpp:wrong'/>".parse().unwrap();
        assert!(Proceed::try_from(elem).is_err());
    }
}
