// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bidirectional server-to-server stream elements, XEP-0288.

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// The bidi stream feature advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidiFeature;

impl TryFrom<Element> for BidiFeature {
    type Error = Error;

    fn try_from(elem: Element) -> Result<BidiFeature, Error> {
        check_self!(elem, "bidi", BIDI_FEATURE);
        Ok(BidiFeature)
    }
}

impl From<BidiFeature> for Element {
    fn from(_: BidiFeature) -> Element {
        Element::bare("bidi", ns::BIDI_FEATURE)
    }
}

/// The initiator's declaration that it will use the stream
/// bidirectionally. There is no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bidi;

impl TryFrom<Element> for Bidi {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Bidi, Error> {
        check_self!(elem, "bidi", BIDI);
        Ok(Bidi)
    }
}

impl From<Bidi> for Element {
    fn from(_: Bidi) -> Element {
        Element::bare("bidi", ns::BIDI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_and_nonza_use_distinct_namespaces() {
        let elem: Element = "<bidi xmlns='urn:xmpp:features:bidi'/>".parse().unwrap();
        BidiFeature::try_from(elem.clone()).unwrap();
        assert!(Bidi::try_from(elem).is_err());

        let elem: Element = "<bidi xmlns='urn:xmpp:bidi'/>".parse().unwrap();
        Bidi::try_from(elem.clone()).unwrap();
        assert!(BidiFeature::try_from(elem).is_err());
    }
}
