// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XMPP ping, XEP-0199.

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// A ping request payload. The reply is an empty `result` iq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping;

impl TryFrom<Element> for Ping {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Ping, Error> {
        check_self!(elem, "ping", PING);
        check_no_attributes!(elem, "ping");
        check_no_children!(elem, "ping");
        Ok(Ping)
    }
}

impl From<Ping> for Element {
    fn from(_: Ping) -> Element {
        Element::bare("ping", ns::PING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let elem: Element = "<ping xmlns='urn:xmpp:ping'/>".parse().unwrap();
        Ping::try_from(elem).unwrap();
    }

    #[test]
    fn rejects_content() {
        let elem: Element = "<ping xmlns='urn:xmpp:ping'><coucou/></ping>".parse().unwrap();
        assert!(Ping::try_from(elem).is_err());
    }
}
