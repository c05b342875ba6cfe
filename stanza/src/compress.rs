// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream compression elements, XEP-0138.

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// The compression stream feature advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionFeature {
    /// Advertised compression method names (e.g. `zlib`).
    pub methods: Vec<String>,
}

impl TryFrom<Element> for CompressionFeature {
    type Error = Error;

    fn try_from(elem: Element) -> Result<CompressionFeature, Error> {
        check_self!(elem, "compression", COMPRESS_FEATURE);
        let mut methods = Vec::new();
        for child in elem.children() {
            if !child.is("method", ns::COMPRESS_FEATURE) {
                return Err(Error::ParseError("Unknown child in compression element."));
            }
            methods.push(child.text());
        }
        Ok(CompressionFeature { methods })
    }
}

impl From<CompressionFeature> for Element {
    fn from(feature: CompressionFeature) -> Element {
        Element::builder("compression", ns::COMPRESS_FEATURE)
            .append_all(
                feature
                    .methods
                    .into_iter()
                    .map(|m| Element::builder("method", ns::COMPRESS_FEATURE).append(m)),
            )
            .build()
    }
}

/// The initiator's request to compress the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compress {
    /// The selected method.
    pub method: String,
}

impl TryFrom<Element> for Compress {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Compress, Error> {
        check_self!(elem, "compress", COMPRESS);
        let mut method = None;
        for child in elem.children() {
            if !child.is("method", ns::COMPRESS) || method.is_some() {
                return Err(Error::ParseError("Compress must have exactly one method."));
            }
            method = Some(child.text());
        }
        Ok(Compress {
            method: method.ok_or(Error::ParseError("Compress must have exactly one method."))?,
        })
    }
}

impl From<Compress> for Element {
    fn from(compress: Compress) -> Element {
        Element::builder("compress", ns::COMPRESS)
            .append(Element::builder("method", ns::COMPRESS).append(compress.method))
            .build()
    }
}

/// Acknowledgement that the stream is compressed from here on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed;

impl TryFrom<Element> for Compressed {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Compressed, Error> {
        check_self!(elem, "compressed", COMPRESS);
        Ok(Compressed)
    }
}

impl From<Compressed> for Element {
    fn from(_: Compressed) -> Element {
        Element::bare("compressed", ns::COMPRESS)
    }
}

/// The defined compression failure conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCondition {
    /// Negotiation failed for reasons unrelated to the method.
    SetupFailed,

    /// A processing error occurred after negotiation.
    ProcessingFailed,

    /// The requested method is not supported.
    UnsupportedMethod,
}

impl FailureCondition {
    fn name(&self) -> &'static str {
        match self {
            FailureCondition::SetupFailed => "setup-failed",
            FailureCondition::ProcessingFailed => "processing-failed",
            FailureCondition::UnsupportedMethod => "unsupported-method",
        }
    }
}

/// Refusal or failure to compress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The defined condition.
    pub condition: FailureCondition,
}

impl TryFrom<Element> for Failure {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failure, Error> {
        check_self!(elem, "failure", COMPRESS);
        let mut condition = None;
        for child in elem.children() {
            if !child.has_ns(ns::COMPRESS) || condition.is_some() {
                return Err(Error::ParseError(
                    "Failure must have exactly one condition.",
                ));
            }
            condition = Some(match child.name() {
                "setup-failed" => FailureCondition::SetupFailed,
                "processing-failed" => FailureCondition::ProcessingFailed,
                "unsupported-method" => FailureCondition::UnsupportedMethod,
                _ => {
                    return Err(Error::ParseError("Unknown compression failure condition."));
                }
            });
        }
        Ok(Failure {
            condition: condition.ok_or(Error::ParseError(
                "Failure must have exactly one condition.",
            ))?,
        })
    }
}

impl From<Failure> for Element {
    fn from(failure: Failure) -> Element {
        Element::builder("failure", ns::COMPRESS)
            .append(Element::bare(failure.condition.name(), ns::COMPRESS))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_lists_methods() {
        let elem: Element = "<compression xmlns='http://jabber.org/features/compress'><method>zlib</method></compression>"
            .parse()
            .unwrap();
        let feature = CompressionFeature::try_from(elem).unwrap();
        assert_eq!(feature.methods, ["zlib"]);
    }

    #[test]
    fn compress_round_trip() {
        let compress = Compress {
            method: "zlib".to_owned(),
        };
        let elem = Element::from(compress.clone());
        assert_eq!(Compress::try_from(elem).unwrap(), compress);
    }

    #[test]
    fn failure_condition() {
        let elem: Element = "<failure xmlns='http://jabber.org/protocol/compress'><unsupported-method/></failure>"
            .parse()
            .unwrap();
        let failure = Failure::try_from(elem).unwrap();
        assert_eq!(failure.condition, FailureCondition::UnsupportedMethod);
    }
}
