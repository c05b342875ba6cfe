// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stanza-level errors, as defined in RFC 6120 §8.3.
//!
//! A stanza error is local to one stanza: in reply to an `iq` of type `get`
//! or `set` it is carried inside an error-typed `iq`, in messages and
//! presences it rides along as an `<error/>` child.

use core::fmt;
use std::collections::BTreeMap;

use minidom::Element;
use xmpp_addr::Addr;

use crate::error::Error;
use crate::ns;

generate_attribute!(
    /// The type of a stanza error, which hints how the sender should react.
    ErrorType, "type", {
        /// Retry after providing credentials.
        Auth => "auth",

        /// Do not retry (the error cannot be remedied).
        Cancel => "cancel",

        /// Proceed (the condition was only a warning).
        Continue => "continue",

        /// Retry after changing the data sent.
        Modify => "modify",

        /// Retry after waiting (the error is temporary).
        Wait => "wait",
    }
);

/// The defined stanza error conditions of RFC 6120 §8.3.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The stanza contains XML that does not conform to the appropriate
    /// schema or cannot be processed.
    BadRequest,

    /// Access cannot be granted because an existing resource exists with
    /// the same name or address.
    Conflict,

    /// The feature represented in the stanza is not implemented by the
    /// recipient.
    FeatureNotImplemented,

    /// The requesting entity does not possess the necessary permissions.
    Forbidden,

    /// The recipient can no longer be contacted at this address; the new
    /// address, if known, is carried as text.
    Gone {
        /// The new address of the entity, if available.
        new_address: Option<String>,
    },

    /// The server experienced an internal error while processing.
    InternalServerError,

    /// The addressed entity or item cannot be found.
    ItemNotFound,

    /// An address communicated in the stanza violates the address rules.
    JidMalformed,

    /// The request does not meet criteria defined by the recipient.
    NotAcceptable,

    /// No entity is allowed to perform the action.
    NotAllowed,

    /// The sender must provide proper credentials first.
    NotAuthorized,

    /// The entity violated some local service policy.
    PolicyViolation,

    /// The intended recipient is temporarily unavailable.
    RecipientUnavailable,

    /// Requests are redirected to another entity, carried as text.
    Redirect {
        /// The address to contact instead, if available.
        new_address: Option<String>,
    },

    /// Prior registration is necessary before using this service.
    RegistrationRequired,

    /// A remote server needed to fulfill the request does not exist or
    /// cannot be resolved.
    RemoteServerNotFound,

    /// A remote server was resolved but could not be reached in time.
    RemoteServerTimeout,

    /// The recipient lacks the resources to service the request.
    ResourceConstraint,

    /// The recipient does not provide the requested service.
    ServiceUnavailable,

    /// A prior subscription is necessary before using this service.
    SubscriptionRequired,

    /// None of the other conditions apply.
    UndefinedCondition,

    /// The request was understood but not expected at this time.
    UnexpectedRequest,
}

impl Condition {
    /// The element name of this condition.
    pub fn name(&self) -> &'static str {
        match self {
            Condition::BadRequest => "bad-request",
            Condition::Conflict => "conflict",
            Condition::FeatureNotImplemented => "feature-not-implemented",
            Condition::Forbidden => "forbidden",
            Condition::Gone { .. } => "gone",
            Condition::InternalServerError => "internal-server-error",
            Condition::ItemNotFound => "item-not-found",
            Condition::JidMalformed => "jid-malformed",
            Condition::NotAcceptable => "not-acceptable",
            Condition::NotAllowed => "not-allowed",
            Condition::NotAuthorized => "not-authorized",
            Condition::PolicyViolation => "policy-violation",
            Condition::RecipientUnavailable => "recipient-unavailable",
            Condition::Redirect { .. } => "redirect",
            Condition::RegistrationRequired => "registration-required",
            Condition::RemoteServerNotFound => "remote-server-not-found",
            Condition::RemoteServerTimeout => "remote-server-timeout",
            Condition::ResourceConstraint => "resource-constraint",
            Condition::ServiceUnavailable => "service-unavailable",
            Condition::SubscriptionRequired => "subscription-required",
            Condition::UndefinedCondition => "undefined-condition",
            Condition::UnexpectedRequest => "unexpected-request",
        }
    }

    pub(crate) fn from_element(elem: &Element) -> Result<Condition, Error> {
        if !elem.has_ns(ns::XMPP_STANZAS) {
            return Err(Error::TypeMismatch);
        }
        let text_payload = || {
            let text = elem.text();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        };
        Ok(match elem.name() {
            "bad-request" => Condition::BadRequest,
            "conflict" => Condition::Conflict,
            "feature-not-implemented" => Condition::FeatureNotImplemented,
            "forbidden" => Condition::Forbidden,
            "gone" => Condition::Gone {
                new_address: text_payload(),
            },
            "internal-server-error" => Condition::InternalServerError,
            "item-not-found" => Condition::ItemNotFound,
            "jid-malformed" => Condition::JidMalformed,
            "not-acceptable" => Condition::NotAcceptable,
            "not-allowed" => Condition::NotAllowed,
            "not-authorized" => Condition::NotAuthorized,
            "policy-violation" => Condition::PolicyViolation,
            "recipient-unavailable" => Condition::RecipientUnavailable,
            "redirect" => Condition::Redirect {
                new_address: text_payload(),
            },
            "registration-required" => Condition::RegistrationRequired,
            "remote-server-not-found" => Condition::RemoteServerNotFound,
            "remote-server-timeout" => Condition::RemoteServerTimeout,
            "resource-constraint" => Condition::ResourceConstraint,
            "service-unavailable" => Condition::ServiceUnavailable,
            "subscription-required" => Condition::SubscriptionRequired,
            "undefined-condition" => Condition::UndefinedCondition,
            "unexpected-request" => Condition::UnexpectedRequest,
            _ => return Err(Error::ParseError("Unknown stanza error condition.")),
        })
    }
}

impl From<&Condition> for Element {
    fn from(condition: &Condition) -> Element {
        let builder = Element::builder(condition.name(), ns::XMPP_STANZAS);
        match condition {
            Condition::Gone {
                new_address: Some(addr),
            }
            | Condition::Redirect {
                new_address: Some(addr),
            } => builder.append(addr.clone()).build(),
            _ => builder.build(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stanza-level error.
#[derive(Debug, Clone, PartialEq)]
pub struct StanzaError {
    /// The type of this error.
    pub type_: ErrorType,

    /// The entity which set this error.
    pub by: Option<Addr>,

    /// The defined condition of this error.
    pub condition: Condition,

    /// Human-readable descriptions, keyed by `xml:lang`.
    pub texts: BTreeMap<String, String>,

    /// An application-specific extension element.
    pub other: Option<Element>,
}

impl StanzaError {
    /// Create a new stanza error with one localized text.
    pub fn new<L, T>(type_: ErrorType, condition: Condition, lang: L, text: T) -> StanzaError
    where
        L: Into<String>,
        T: Into<String>,
    {
        StanzaError {
            type_,
            by: None,
            condition,
            texts: {
                let mut map = BTreeMap::new();
                map.insert(lang.into(), text.into());
                map
            },
            other: None,
        }
    }

    /// The canned reply for stanzas nobody handles.
    pub fn service_unavailable() -> StanzaError {
        StanzaError {
            type_: ErrorType::Cancel,
            by: None,
            condition: Condition::ServiceUnavailable,
            texts: BTreeMap::new(),
            other: None,
        }
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.condition, self.type_)?;
        if let Some(text) = self.texts.values().next() {
            write!(f, ": {}", text)?;
        }
        Ok(())
    }
}

impl std::error::Error for StanzaError {}

impl TryFrom<Element> for StanzaError {
    type Error = Error;

    fn try_from(elem: Element) -> Result<StanzaError, Error> {
        if elem.name() != "error" || !ns::is_stanza_ns(&elem.ns()) {
            return Err(Error::TypeMismatch);
        }
        // The legacy numeric `code` attribute is tolerated but dropped.
        check_no_unknown_attributes!(elem, "error", ["type", "by", "code"]);

        let type_ = get_attr!(elem, "type", Required);
        let by = get_attr!(elem, "by", Option);
        let mut condition = None;
        let mut texts = BTreeMap::new();
        let mut other = None;

        for child in elem.children() {
            if child.is("text", ns::XMPP_STANZAS) {
                check_no_children!(child, "text");
                check_no_unknown_attributes!(child, "text", ["xml:lang"]);
                let lang = child.attr("xml:lang").unwrap_or_default().to_owned();
                if texts.insert(lang, child.text()).is_some() {
                    return Err(Error::ParseError(
                        "Text element present twice for the same xml:lang.",
                    ));
                }
            } else if child.has_ns(ns::XMPP_STANZAS) {
                if condition.is_some() {
                    return Err(Error::ParseError(
                        "Error must not have more than one defined condition.",
                    ));
                }
                condition = Some(Condition::from_element(child)?);
            } else {
                if other.is_some() {
                    return Err(Error::ParseError(
                        "Error must not have more than one application-specific element.",
                    ));
                }
                other = Some(child.clone());
            }
        }

        Ok(StanzaError {
            type_,
            by,
            condition: condition
                .ok_or(Error::ParseError("Error must have a defined condition."))?,
            texts,
            other,
        })
    }
}

impl From<StanzaError> for Element {
    fn from(err: StanzaError) -> Element {
        Element::builder("error", ns::JABBER_CLIENT)
            .attr("type", err.type_)
            .attr("by", err.by)
            .append(Element::from(&err.condition))
            .append_all(err.texts.into_iter().map(|(lang, text)| {
                Element::builder("text", ns::XMPP_STANZAS)
                    .attr(
                        "xml:lang",
                        if lang.is_empty() { None } else { Some(lang) },
                    )
                    .append(text)
            }))
            .append_all(err.other)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let elem: Element = "<error xmlns='jabber:client' type='cancel'><undefined-condition xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>"
            .parse()
            .unwrap();
        let error = StanzaError::try_from(elem).unwrap();
        assert_eq!(error.type_, ErrorType::Cancel);
        assert_eq!(error.condition, Condition::UndefinedCondition);
    }

    #[test]
    fn type_is_required() {
        let elem: Element = "<error xmlns='jabber:client'><forbidden xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>"
            .parse()
            .unwrap();
        match StanzaError::try_from(elem).unwrap_err() {
            Error::ParseError(s) => assert_eq!(s, "Required attribute 'type' missing."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn condition_is_required() {
        let elem: Element = "<error xmlns='jabber:client' type='cancel'/>".parse().unwrap();
        match StanzaError::try_from(elem).unwrap_err() {
            Error::ParseError(s) => assert_eq!(s, "Error must have a defined condition."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn gone_carries_new_address() {
        let elem: Element = "<error xmlns='jabber:client' type='cancel'><gone xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'>xmpp:room@muc.example.org?join</gone></error>"
            .parse()
            .unwrap();
        let error = StanzaError::try_from(elem).unwrap();
        assert_eq!(
            error.condition,
            Condition::Gone {
                new_address: Some("xmpp:room@muc.example.org?join".to_owned()),
            }
        );
    }

    #[test]
    fn localized_texts() {
        let elem: Element = "<error xmlns='jabber:client' type='wait'>
            <resource-constraint xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>
            <text xmlns='urn:ietf:params:xml:ns:xmpp-stanzas' xml:lang='en'>Busy</text>
        </error>"
            .parse()
            .unwrap();
        let error = StanzaError::try_from(elem).unwrap();
        assert_eq!(error.texts["en"], "Busy");
    }

    #[test]
    fn round_trip() {
        let error = StanzaError::new(
            ErrorType::Cancel,
            Condition::ItemNotFound,
            "en",
            "No such node",
        );
        let elem = Element::from(error.clone());
        let back = StanzaError::try_from(elem).unwrap();
        assert_eq!(error, back);
    }
}
