// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The union of the three stanza kinds.

use minidom::Element;
use xmpp_addr::Addr;

use crate::error::Error;
use crate::iq::Iq;
use crate::message::Message;
use crate::ns;
use crate::presence::Presence;

/// Any top-level stanza of an XMPP stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    /// An `<iq/>` stanza.
    Iq(Iq),

    /// A `<message/>` stanza.
    Message(Message),

    /// A `<presence/>` stanza.
    Presence(Presence),
}

impl Stanza {
    /// The local name of this stanza kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Stanza::Iq(_) => "iq",
            Stanza::Message(_) => "message",
            Stanza::Presence(_) => "presence",
        }
    }

    /// The id, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Stanza::Iq(iq) => iq.id.as_deref(),
            Stanza::Message(message) => message.id.as_deref(),
            Stanza::Presence(presence) => presence.id.as_deref(),
        }
    }

    /// The sender, if any.
    pub fn from(&self) -> Option<&Addr> {
        match self {
            Stanza::Iq(iq) => iq.from.as_ref(),
            Stanza::Message(message) => message.from.as_ref(),
            Stanza::Presence(presence) => presence.from.as_ref(),
        }
    }

    /// The recipient, if any.
    pub fn to(&self) -> Option<&Addr> {
        match self {
            Stanza::Iq(iq) => iq.to.as_ref(),
            Stanza::Message(message) => message.to.as_ref(),
            Stanza::Presence(presence) => presence.to.as_ref(),
        }
    }

    /// Whether an element has the name and namespace of a stanza.
    pub fn is_stanza(elem: &Element) -> bool {
        matches!(elem.name(), "iq" | "message" | "presence") && ns::is_stanza_ns(&elem.ns())
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Stanza {
        Stanza::Iq(iq)
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Stanza {
        Stanza::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Stanza {
        Stanza::Presence(presence)
    }
}

impl TryFrom<Element> for Stanza {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Stanza, Error> {
        if !ns::is_stanza_ns(&elem.ns()) {
            return Err(Error::TypeMismatch);
        }
        Ok(match elem.name() {
            "iq" => Stanza::Iq(Iq::try_from(elem)?),
            "message" => Stanza::Message(Message::try_from(elem)?),
            "presence" => Stanza::Presence(Presence::try_from(elem)?),
            _ => return Err(Error::TypeMismatch),
        })
    }
}

impl From<Stanza> for Element {
    fn from(stanza: Stanza) -> Element {
        match stanza {
            Stanza::Iq(iq) => iq.into(),
            Stanza::Message(message) => message.into(),
            Stanza::Presence(presence) => presence.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let elem: Element = "<message xmlns='jabber:client'><body>hi</body></message>"
            .parse()
            .unwrap();
        assert!(Stanza::is_stanza(&elem));
        match Stanza::try_from(elem).unwrap() {
            Stanza::Message(message) => assert_eq!(message.body(), Some("hi")),
            other => panic!("unexpected stanza: {:?}", other),
        }
    }

    #[test]
    fn nonzas_are_rejected() {
        let elem: Element = "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"
            .parse()
            .unwrap();
        assert!(!Stanza::is_stanza(&elem));
        assert!(Stanza::try_from(elem).is_err());
    }
}
