// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SASL negotiation elements, RFC 6120 §6.
//!
//! Mechanism names are carried as plain strings; which mechanisms exist and
//! how they compute their payloads is the business of the SASL
//! implementation, not the wire layer.

use core::fmt;
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use minidom::Element;

use crate::error::Error;
use crate::ns;

/// Encode a SASL payload; a zero-length payload is transmitted as `=`
/// (RFC 6120 §6.4.2).
fn encode_payload(data: &[u8]) -> String {
    if data.is_empty() {
        "=".to_owned()
    } else {
        BASE64.encode(data)
    }
}

/// Decode a SASL payload; both `=` and empty text mean zero bytes.
fn decode_payload(text: &str) -> Result<Vec<u8>, Error> {
    if text.is_empty() || text == "=" {
        return Ok(Vec::new());
    }
    Ok(BASE64.decode(text)?)
}

/// The SASL mechanism list stream feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mechanisms {
    /// Advertised mechanism names, in the responder's preference order
    /// (strongest first).
    pub mechanisms: Vec<String>,
}

impl TryFrom<Element> for Mechanisms {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Mechanisms, Error> {
        check_self!(elem, "mechanisms", SASL);
        let mut mechanisms = Vec::new();
        for child in elem.children() {
            if !child.is("mechanism", ns::SASL) {
                return Err(Error::ParseError("Unknown child in mechanisms element."));
            }
            mechanisms.push(child.text());
        }
        Ok(Mechanisms { mechanisms })
    }
}

impl From<Mechanisms> for Element {
    fn from(mechanisms: Mechanisms) -> Element {
        Element::builder("mechanisms", ns::SASL)
            .append_all(
                mechanisms
                    .mechanisms
                    .into_iter()
                    .map(|m| Element::builder("mechanism", ns::SASL).append(m)),
            )
            .build()
    }
}

/// Mechanism selection and initial response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    /// The selected mechanism name.
    pub mechanism: String,

    /// The initial response, possibly empty.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Auth {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Auth, Error> {
        check_self!(elem, "auth", SASL);
        let mechanism = elem
            .attr("mechanism")
            .ok_or(Error::ParseError(
                "Required attribute 'mechanism' missing.",
            ))?
            .to_owned();
        Ok(Auth {
            mechanism,
            data: decode_payload(&elem.text())?,
        })
    }
}

impl From<Auth> for Element {
    fn from(auth: Auth) -> Element {
        Element::builder("auth", ns::SASL)
            .attr("mechanism", auth.mechanism)
            .append(encode_payload(&auth.data))
            .build()
    }
}

/// A server challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The challenge payload.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Challenge {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Challenge, Error> {
        check_self!(elem, "challenge", SASL);
        Ok(Challenge {
            data: decode_payload(&elem.text())?,
        })
    }
}

impl From<Challenge> for Element {
    fn from(challenge: Challenge) -> Element {
        Element::builder("challenge", ns::SASL)
            .append(encode_payload(&challenge.data))
            .build()
    }
}

/// A client response to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The response payload.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Response {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Response, Error> {
        check_self!(elem, "response", SASL);
        Ok(Response {
            data: decode_payload(&elem.text())?,
        })
    }
}

impl From<Response> for Element {
    fn from(response: Response) -> Element {
        Element::builder("response", ns::SASL)
            .append(encode_payload(&response.data))
            .build()
    }
}

/// Abortion of the authentication exchange by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort;

impl TryFrom<Element> for Abort {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Abort, Error> {
        check_self!(elem, "abort", SASL);
        Ok(Abort)
    }
}

impl From<Abort> for Element {
    fn from(_: Abort) -> Element {
        Element::bare("abort", ns::SASL)
    }
}

/// Successful authentication, with optional additional data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success {
    /// Additional data (e.g. the SCRAM server signature).
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Success {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Success, Error> {
        check_self!(elem, "success", SASL);
        Ok(Success {
            data: decode_payload(&elem.text())?,
        })
    }
}

impl From<Success> for Element {
    fn from(success: Success) -> Element {
        let builder = Element::builder("success", ns::SASL);
        if success.data.is_empty() {
            builder.build()
        } else {
            builder.append(BASE64.encode(&success.data)).build()
        }
    }
}

/// The defined SASL failure conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The client aborted the exchange.
    Aborted,

    /// The account is disabled.
    AccountDisabled,

    /// The credentials have expired.
    CredentialsExpired,

    /// Encryption must be negotiated before this mechanism may be used.
    EncryptionRequired,

    /// The base64 data sent by the client is invalid.
    IncorrectEncoding,

    /// The authorization identity is invalid.
    InvalidAuthzid,

    /// The requested mechanism is not supported.
    InvalidMechanism,

    /// The request was malformed.
    MalformedRequest,

    /// The requested mechanism is weaker than the server allows.
    MechanismTooWeak,

    /// The credentials are wrong.
    NotAuthorized,

    /// A temporary server-side failure; retrying may help.
    TemporaryAuthFailure,
}

impl Condition {
    /// The element name of this condition.
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Aborted => "aborted",
            Condition::AccountDisabled => "account-disabled",
            Condition::CredentialsExpired => "credentials-expired",
            Condition::EncryptionRequired => "encryption-required",
            Condition::IncorrectEncoding => "incorrect-encoding",
            Condition::InvalidAuthzid => "invalid-authzid",
            Condition::InvalidMechanism => "invalid-mechanism",
            Condition::MalformedRequest => "malformed-request",
            Condition::MechanismTooWeak => "mechanism-too-weak",
            Condition::NotAuthorized => "not-authorized",
            Condition::TemporaryAuthFailure => "temporary-auth-failure",
        }
    }

    fn from_element(elem: &Element) -> Result<Condition, Error> {
        if !elem.has_ns(ns::SASL) {
            return Err(Error::TypeMismatch);
        }
        Ok(match elem.name() {
            "aborted" => Condition::Aborted,
            "account-disabled" => Condition::AccountDisabled,
            "credentials-expired" => Condition::CredentialsExpired,
            "encryption-required" => Condition::EncryptionRequired,
            "incorrect-encoding" => Condition::IncorrectEncoding,
            "invalid-authzid" => Condition::InvalidAuthzid,
            "invalid-mechanism" => Condition::InvalidMechanism,
            "malformed-request" => Condition::MalformedRequest,
            "mechanism-too-weak" => Condition::MechanismTooWeak,
            "not-authorized" => Condition::NotAuthorized,
            "temporary-auth-failure" => Condition::TemporaryAuthFailure,
            _ => return Err(Error::ParseError("Unknown SASL failure condition.")),
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failed authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The defined condition.
    pub condition: Condition,

    /// Human-readable explanations, keyed by `xml:lang`.
    pub texts: BTreeMap<String, String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SASL failure: {}", self.condition)?;
        if let Some(text) = self.texts.values().next() {
            write!(f, " ({})", text)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

impl TryFrom<Element> for Failure {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failure, Error> {
        check_self!(elem, "failure", SASL);
        let mut condition = None;
        let mut texts = BTreeMap::new();
        for child in elem.children() {
            if child.is("text", ns::SASL) {
                let lang = child.attr("xml:lang").unwrap_or_default().to_owned();
                if texts.insert(lang, child.text()).is_some() {
                    return Err(Error::ParseError(
                        "Text element present twice for the same xml:lang.",
                    ));
                }
            } else {
                if condition.is_some() {
                    return Err(Error::ParseError(
                        "Failure must not have more than one defined condition.",
                    ));
                }
                condition = Some(Condition::from_element(child)?);
            }
        }
        Ok(Failure {
            condition: condition
                .ok_or(Error::ParseError("Failure must have a defined condition."))?,
            texts,
        })
    }
}

impl From<Failure> for Element {
    fn from(failure: Failure) -> Element {
        Element::builder("failure", ns::SASL)
            .append(Element::bare(failure.condition.name(), ns::SASL))
            .append_all(failure.texts.into_iter().map(|(lang, text)| {
                Element::builder("text", ns::SASL)
                    .attr("xml:lang", if lang.is_empty() { None } else { Some(lang) })
                    .append(text)
            }))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_list_keeps_order() {
        let elem: Element = "<mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>
            <mechanism>SCRAM-SHA-1</mechanism>
            <mechanism>PLAIN</mechanism>
        </mechanisms>"
            .parse()
            .unwrap();
        let mechanisms = Mechanisms::try_from(elem).unwrap();
        assert_eq!(mechanisms.mechanisms, ["SCRAM-SHA-1", "PLAIN"]);
    }

    #[test]
    fn empty_initial_response_is_equals_sign() {
        let auth = Auth {
            mechanism: "EXTERNAL".to_owned(),
            data: Vec::new(),
        };
        let elem = Element::from(auth);
        assert_eq!(elem.text(), "=");
        let back = Auth::try_from(elem).unwrap();
        assert!(back.data.is_empty());
    }

    #[test]
    fn auth_payload_is_base64() {
        let auth = Auth {
            mechanism: "PLAIN".to_owned(),
            data: b"\0juliet\0s3crEt".to_vec(),
        };
        let elem = Element::from(auth.clone());
        assert_eq!(elem.text(), "AGp1bGlldABzM2NyRXQ=");
        assert_eq!(Auth::try_from(elem).unwrap(), auth);
    }

    #[test]
    fn failure_with_condition() {
        let elem: Element =
            "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><aborted/></failure>"
                .parse()
                .unwrap();
        let failure = Failure::try_from(elem).unwrap();
        assert_eq!(failure.condition, Condition::Aborted);
        assert!(failure.texts.is_empty());
    }

    #[test]
    fn failure_with_text() {
        let elem: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>
            <account-disabled/>
            <text xml:lang='en'>Call 212-555-1212 for assistance.</text>
        </failure>"
            .parse()
            .unwrap();
        let failure = Failure::try_from(elem).unwrap();
        assert_eq!(failure.condition, Condition::AccountDisabled);
        assert_eq!(failure.texts["en"], "Call 212-555-1212 for assistance.");
    }

    #[test]
    fn success_may_carry_data() {
        let elem: Element = "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>dj1zaWc=</success>"
            .parse()
            .unwrap();
        let success = Success::try_from(elem).unwrap();
        assert_eq!(success.data, b"v=sig");
    }
}
