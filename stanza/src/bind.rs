// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Resource binding, RFC 6120 §7: the process by which a client obtains a
//! full address and may start exchanging stanzas.

use core::str::FromStr;

use minidom::Element;
use xmpp_addr::FullAddr;

use crate::error::Error;
use crate::ns;

/// The resource binding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindQuery {
    /// The resource the client would like; the server may assign a
    /// different one. `None` asks the server to pick.
    pub resource: Option<String>,
}

impl BindQuery {
    /// Create a binding request.
    pub fn new(resource: Option<String>) -> BindQuery {
        BindQuery { resource }
    }
}

impl TryFrom<Element> for BindQuery {
    type Error = Error;

    fn try_from(elem: Element) -> Result<BindQuery, Error> {
        check_self!(elem, "bind", BIND);
        check_no_attributes!(elem, "bind");

        let mut resource = None;
        for child in elem.children() {
            if resource.is_some() {
                return Err(Error::ParseError("Bind can only have one child."));
            }
            if child.is("resource", ns::BIND) {
                check_no_attributes!(child, "resource");
                check_no_children!(child, "resource");
                resource = Some(child.text());
            } else {
                return Err(Error::ParseError("Unknown element in bind request."));
            }
        }

        Ok(BindQuery { resource })
    }
}

impl From<BindQuery> for Element {
    fn from(bind: BindQuery) -> Element {
        Element::builder("bind", ns::BIND)
            .append_all(
                bind.resource
                    .map(|resource| Element::builder("resource", ns::BIND).append(resource)),
            )
            .build()
    }
}

/// The binding result, carrying the server-assigned full address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResponse {
    /// The full address assigned to this session.
    pub addr: FullAddr,
}

impl From<BindResponse> for FullAddr {
    fn from(bind: BindResponse) -> FullAddr {
        bind.addr
    }
}

impl TryFrom<Element> for BindResponse {
    type Error = Error;

    fn try_from(elem: Element) -> Result<BindResponse, Error> {
        check_self!(elem, "bind", BIND);
        check_no_attributes!(elem, "bind");

        let mut addr = None;
        for child in elem.children() {
            if addr.is_some() {
                return Err(Error::ParseError("Bind can only have one child."));
            }
            if child.is("jid", ns::BIND) {
                check_no_attributes!(child, "jid");
                check_no_children!(child, "jid");
                addr = Some(FullAddr::from_str(&child.text()).map_err(Error::text_parse_error)?);
            } else {
                return Err(Error::ParseError("Unknown element in bind response."));
            }
        }

        Ok(BindResponse {
            addr: addr.ok_or(Error::ParseError(
                "Bind response must contain a jid element.",
            ))?,
        })
    }
}

impl From<BindResponse> for Element {
    fn from(bind: BindResponse) -> Element {
        Element::builder("bind", ns::BIND)
            .append(Element::builder("jid", ns::BIND).append(bind.addr.as_str().to_owned()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_resource() {
        let elem: Element = "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>"
            .parse()
            .unwrap();
        let bind = BindQuery::try_from(elem).unwrap();
        assert_eq!(bind.resource, None);
    }

    #[test]
    fn request_with_resource() {
        let elem: Element =
            "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><resource>stage</resource></bind>"
                .parse()
                .unwrap();
        let bind = BindQuery::try_from(elem).unwrap();
        assert_eq!(bind.resource.as_deref(), Some("stage"));
    }

    #[test]
    fn response_carries_full_address() {
        let elem: Element = "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>feste@shakespeare.lit/stage</jid></bind>"
            .parse()
            .unwrap();
        let bind = BindResponse::try_from(elem).unwrap();
        assert_eq!(bind.addr.as_str(), "feste@shakespeare.lit/stage");
    }

    #[test]
    fn response_requires_jid() {
        let elem: Element = "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>"
            .parse()
            .unwrap();
        assert!(BindResponse::try_from(elem).is_err());
    }

    #[test]
    fn invalid_resource_element() {
        let elem: Element = "<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><resource attr='x'>r</resource></bind>"
            .parse()
            .unwrap();
        assert!(BindQuery::try_from(elem).is_err());
    }

    #[test]
    fn round_trip() {
        let bind = BindQuery::new(Some("stage".to_owned()));
        let elem = Element::from(bind.clone());
        assert_eq!(BindQuery::try_from(elem).unwrap(), bind);
    }
}
