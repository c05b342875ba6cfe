// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<stream:features/>` listing sent by the responder after each
//! stream header.

use minidom::Element;

use crate::compress::CompressionFeature;
use crate::error::Error;
use crate::ns;
use crate::sasl::Mechanisms;
use crate::starttls::StartTls;

/// The parsed form of a `<stream:features/>` listing.
///
/// The feature negotiator works on the raw child elements; this type is
/// the convenient read-only view for callers who want to inspect what a
/// peer offered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFeatures {
    /// STARTTLS advertisement.
    pub starttls: Option<StartTls>,

    /// SASL mechanism list.
    pub mechanisms: Mechanisms,

    /// Whether resource binding is offered.
    pub bind: bool,

    /// Whether a bidirectional s2s stream is offered.
    pub bidi: bool,

    /// Stream compression advertisement.
    pub compression: Option<CompressionFeature>,

    /// Any other advertised features.
    pub others: Vec<Element>,
}

impl StreamFeatures {
    /// Whether the peer offers STARTTLS.
    pub fn can_starttls(&self) -> bool {
        self.starttls.is_some()
    }

    /// Whether the peer offers the given SASL mechanism.
    pub fn can_sasl(&self, mechanism: &str) -> bool {
        self.mechanisms
            .mechanisms
            .iter()
            .any(|m| m == mechanism)
    }

    /// Whether the peer offers resource binding.
    pub fn can_bind(&self) -> bool {
        self.bind
    }
}

impl TryFrom<Element> for StreamFeatures {
    type Error = Error;

    fn try_from(elem: Element) -> Result<StreamFeatures, Error> {
        check_self!(elem, "features", STREAM);
        let mut features = StreamFeatures::default();
        for child in elem.children() {
            if child.is("starttls", ns::TLS) {
                features.starttls = Some(StartTls::try_from(child.clone())?);
            } else if child.is("mechanisms", ns::SASL) {
                features.mechanisms = Mechanisms::try_from(child.clone())?;
            } else if child.is("bind", ns::BIND) {
                features.bind = true;
            } else if child.is("bidi", ns::BIDI_FEATURE) {
                features.bidi = true;
            } else if child.is("compression", ns::COMPRESS_FEATURE) {
                features.compression = Some(CompressionFeature::try_from(child.clone())?);
            } else {
                features.others.push(child.clone());
            }
        }
        Ok(features)
    }
}

impl From<StreamFeatures> for Element {
    fn from(features: StreamFeatures) -> Element {
        Element::builder("features", ns::STREAM)
            .append_all(features.starttls.map(Element::from))
            .append_all(if features.mechanisms.mechanisms.is_empty() {
                None
            } else {
                Some(Element::from(features.mechanisms))
            })
            .append_all(if features.bind {
                Some(Element::bare("bind", ns::BIND))
            } else {
                None
            })
            .append_all(if features.bidi {
                Some(Element::bare("bidi", ns::BIDI_FEATURE))
            } else {
                None
            })
            .append_all(features.compression.map(Element::from))
            .append_all(features.others)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typical_pre_tls_listing() {
        let elem: Element = "<features xmlns='http://etherx.jabber.org/streams'>
            <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>
        </features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert!(features.can_starttls());
        assert!(features.starttls.as_ref().unwrap().required);
        assert!(!features.can_bind());
    }

    #[test]
    fn parse_typical_post_tls_listing() {
        let elem: Element = "<features xmlns='http://etherx.jabber.org/streams'>
            <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>
                <mechanism>SCRAM-SHA-1</mechanism>
                <mechanism>PLAIN</mechanism>
            </mechanisms>
        </features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert!(features.can_sasl("PLAIN"));
        assert!(features.can_sasl("SCRAM-SHA-1"));
        assert!(!features.can_sasl("EXTERNAL"));
    }

    #[test]
    fn parse_post_auth_listing() {
        let elem: Element = "<features xmlns='http://etherx.jabber.org/streams'>
            <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>
        </features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert!(features.can_bind());
    }

    #[test]
    fn unknown_features_are_kept() {
        let elem: Element = "<features xmlns='http://etherx.jabber.org/streams'>
            <sm xmlns='urn:xmpp:sm:3'/>
        </features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert_eq!(features.others.len(), 1);
    }

    #[test]
    fn empty_listing_round_trip() {
        let features = StreamFeatures::default();
        let elem = Element::from(features.clone());
        assert_eq!(StreamFeatures::try_from(elem).unwrap(), features);
    }
}
