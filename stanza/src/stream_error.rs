// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream-level errors, as defined in RFC 6120 §4.9.
//!
//! A stream error is terminal: the entity that detects the problem sends
//! `<stream:error/>`, closes its stream, and the session is over.

use core::fmt;

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// The defined stream error conditions of RFC 6120 §4.9.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The entity has sent XML that cannot be processed.
    BadFormat,

    /// The entity has sent a namespace prefix that is unsupported.
    BadNamespacePrefix,

    /// A new stream conflicts with an existing stream for this entity.
    Conflict,

    /// The peer has not responded to data sent over the stream.
    ConnectionTimeout,

    /// The `to` address names an FQDN no longer serviced here.
    HostGone,

    /// The `to` address names an FQDN not serviced here.
    HostUnknown,

    /// A stanza between servers lacks a valid `to` or `from` address.
    ImproperAddressing,

    /// The server suffered an internal error.
    InternalServerError,

    /// The `from` address does not match an authorized identity.
    InvalidFrom,

    /// The stream or default namespace is not a supported one.
    InvalidNamespace,

    /// The entity has sent invalid XML to a validating server.
    InvalidXml,

    /// The entity attempted to send data before the stream was
    /// authenticated or authorized for it.
    NotAuthorized,

    /// The entity has sent XML that violates well-formedness rules.
    NotWellFormed,

    /// The entity has violated some local service policy.
    PolicyViolation,

    /// A remote entity needed for authentication or authorization could
    /// not be reached.
    RemoteConnectionFailed,

    /// The stream is being closed so that security state can be
    /// renegotiated from scratch.
    Reset,

    /// The server lacks the resources to service the stream.
    ResourceConstraint,

    /// The entity has sent restricted XML features such as a comment,
    /// processing instruction, DTD subset, or entity reference.
    RestrictedXml,

    /// Traffic is being redirected to another host; the alternate
    /// `domainpart[:port]` is carried as text.
    SeeOtherHost(String),

    /// The server is being shut down.
    SystemShutdown,

    /// None of the other conditions apply.
    UndefinedCondition,

    /// The stream encoding is not supported.
    UnsupportedEncoding,

    /// A mandatory-to-negotiate feature is not supported by the peer.
    UnsupportedFeature,

    /// A first-level child of the stream was not understood.
    UnsupportedStanzaType,

    /// The `version` attribute names an unsupported version.
    UnsupportedVersion,
}

impl Condition {
    /// The element name of this condition.
    pub fn name(&self) -> &'static str {
        match self {
            Condition::BadFormat => "bad-format",
            Condition::BadNamespacePrefix => "bad-namespace-prefix",
            Condition::Conflict => "conflict",
            Condition::ConnectionTimeout => "connection-timeout",
            Condition::HostGone => "host-gone",
            Condition::HostUnknown => "host-unknown",
            Condition::ImproperAddressing => "improper-addressing",
            Condition::InternalServerError => "internal-server-error",
            Condition::InvalidFrom => "invalid-from",
            Condition::InvalidNamespace => "invalid-namespace",
            Condition::InvalidXml => "invalid-xml",
            Condition::NotAuthorized => "not-authorized",
            Condition::NotWellFormed => "not-well-formed",
            Condition::PolicyViolation => "policy-violation",
            Condition::RemoteConnectionFailed => "remote-connection-failed",
            Condition::Reset => "reset",
            Condition::ResourceConstraint => "resource-constraint",
            Condition::RestrictedXml => "restricted-xml",
            Condition::SeeOtherHost(_) => "see-other-host",
            Condition::SystemShutdown => "system-shutdown",
            Condition::UndefinedCondition => "undefined-condition",
            Condition::UnsupportedEncoding => "unsupported-encoding",
            Condition::UnsupportedFeature => "unsupported-feature",
            Condition::UnsupportedStanzaType => "unsupported-stanza-type",
            Condition::UnsupportedVersion => "unsupported-version",
        }
    }

    fn from_element(elem: &Element) -> Result<Condition, Error> {
        if !elem.has_ns(ns::XMPP_STREAMS) {
            return Err(Error::TypeMismatch);
        }
        Ok(match elem.name() {
            "bad-format" => Condition::BadFormat,
            "bad-namespace-prefix" => Condition::BadNamespacePrefix,
            "conflict" => Condition::Conflict,
            "connection-timeout" => Condition::ConnectionTimeout,
            "host-gone" => Condition::HostGone,
            "host-unknown" => Condition::HostUnknown,
            "improper-addressing" => Condition::ImproperAddressing,
            "internal-server-error" => Condition::InternalServerError,
            "invalid-from" => Condition::InvalidFrom,
            "invalid-namespace" => Condition::InvalidNamespace,
            "invalid-xml" => Condition::InvalidXml,
            "not-authorized" => Condition::NotAuthorized,
            "not-well-formed" => Condition::NotWellFormed,
            "policy-violation" => Condition::PolicyViolation,
            "remote-connection-failed" => Condition::RemoteConnectionFailed,
            "reset" => Condition::Reset,
            "resource-constraint" => Condition::ResourceConstraint,
            "restricted-xml" => Condition::RestrictedXml,
            "see-other-host" => Condition::SeeOtherHost(elem.text()),
            "system-shutdown" => Condition::SystemShutdown,
            "undefined-condition" => Condition::UndefinedCondition,
            "unsupported-encoding" => Condition::UnsupportedEncoding,
            "unsupported-feature" => Condition::UnsupportedFeature,
            "unsupported-stanza-type" => Condition::UnsupportedStanzaType,
            "unsupported-version" => Condition::UnsupportedVersion,
            _ => return Err(Error::ParseError("Unknown stream error condition.")),
        })
    }
}

impl From<&Condition> for Element {
    fn from(condition: &Condition) -> Element {
        let builder = Element::builder(condition.name(), ns::XMPP_STREAMS);
        match condition {
            Condition::SeeOtherHost(host) => builder.append(host.clone()).build(),
            _ => builder.build(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Condition::SeeOtherHost(host) => write!(f, "see-other-host: {}", host),
            _ => f.write_str(self.name()),
        }
    }
}

/// A stream-level error.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    /// The defined condition which triggered this error.
    pub condition: Condition,

    /// Optional error text: `xml:lang` tag and content.
    pub text: Option<(Option<String>, String)>,

    /// Optional application-specific elements refining the condition.
    pub application_specific: Vec<Element>,
}

impl StreamError {
    /// Create a stream error with only a condition.
    pub fn new(condition: Condition) -> StreamError {
        StreamError {
            condition,
            text: None,
            application_specific: Vec::new(),
        }
    }

    /// Attach untagged error text.
    pub fn with_text<T: Into<String>>(mut self, text: T) -> StreamError {
        self.text = Some((None, text.into()));
        self
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.condition, f)?;
        if let Some((_, ref text)) = self.text {
            write!(f, " ({:?})", text)?;
        }
        Ok(())
    }
}

impl std::error::Error for StreamError {}

impl TryFrom<Element> for StreamError {
    type Error = Error;

    fn try_from(elem: Element) -> Result<StreamError, Error> {
        check_self!(elem, "error", STREAM);

        let mut condition = None;
        let mut text = None;
        let mut application_specific = Vec::new();

        for child in elem.children() {
            if child.is("text", ns::XMPP_STREAMS) {
                if text.is_some() {
                    return Err(Error::ParseError(
                        "Stream error must not have more than one text element.",
                    ));
                }
                let lang = child.attr("xml:lang").map(str::to_owned);
                text = Some((lang, child.text()));
            } else if child.has_ns(ns::XMPP_STREAMS) {
                if condition.is_some() {
                    return Err(Error::ParseError(
                        "Stream error must not have more than one defined condition.",
                    ));
                }
                condition = Some(Condition::from_element(child)?);
            } else {
                application_specific.push(child.clone());
            }
        }

        Ok(StreamError {
            // Peers that send a bare `<stream:error/>` are out there.
            condition: condition.unwrap_or(Condition::UndefinedCondition),
            text,
            application_specific,
        })
    }
}

impl From<StreamError> for Element {
    fn from(err: StreamError) -> Element {
        Element::builder("error", ns::STREAM)
            .append(Element::from(&err.condition))
            .append_all(err.text.map(|(lang, text)| {
                Element::builder("text", ns::XMPP_STREAMS)
                    .attr("xml:lang", lang)
                    .append(text)
            }))
            .append_all(err.application_specific)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_not_well_formed() {
        let elem: Element = "<error xmlns='http://etherx.jabber.org/streams'><not-well-formed xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></error>"
            .parse()
            .unwrap();
        let error = StreamError::try_from(elem).unwrap();
        assert_eq!(error.condition, Condition::NotWellFormed);
        assert_eq!(error.text, None);
    }

    #[test]
    fn parse_with_text() {
        let elem: Element = "<error xmlns='http://etherx.jabber.org/streams'>
            <system-shutdown xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>
            <text xmlns='urn:ietf:params:xml:ns:xmpp-streams' xml:lang='en'>Going down</text>
        </error>"
            .parse()
            .unwrap();
        let error = StreamError::try_from(elem).unwrap();
        assert_eq!(error.condition, Condition::SystemShutdown);
        assert_eq!(
            error.text,
            Some((Some("en".to_owned()), "Going down".to_owned()))
        );
    }

    #[test]
    fn see_other_host_carries_target() {
        let elem: Element = "<error xmlns='http://etherx.jabber.org/streams'><see-other-host xmlns='urn:ietf:params:xml:ns:xmpp-streams'>alt.shakespeare.lit:5222</see-other-host></error>"
            .parse()
            .unwrap();
        let error = StreamError::try_from(elem).unwrap();
        assert_eq!(
            error.condition,
            Condition::SeeOtherHost("alt.shakespeare.lit:5222".to_owned())
        );
    }

    #[test]
    fn round_trip() {
        let error = StreamError::new(Condition::PolicyViolation).with_text("too many stanzas");
        let elem = Element::from(error.clone());
        let back = StreamError::try_from(elem).unwrap();
        assert_eq!(error, back);
    }
}
