// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<message/>` stanza.

use std::collections::BTreeMap;

use minidom::Element;
use xmpp_addr::Addr;

use crate::error::Error;
use crate::ns;

generate_attribute!(
    /// The type of a message.
    MessageType, "type", {
        /// Standalone message.
        Normal => "normal",

        /// One-to-one chat.
        Chat => "chat",

        /// Multi-user chat.
        Groupchat => "groupchat",

        /// Automated alert or broadcast, no reply expected.
        Headline => "headline",

        /// An error in reply to a previously sent message.
        Error => "error",
    }, Default = Normal
);

/// A message stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The sender of this message.
    pub from: Option<Addr>,

    /// The recipient of this message.
    pub to: Option<Addr>,

    /// The id of this message.
    pub id: Option<String>,

    /// The type of this message.
    pub type_: MessageType,

    /// Subjects keyed by `xml:lang` (empty key for untagged).
    pub subjects: BTreeMap<String, String>,

    /// Bodies keyed by `xml:lang` (empty key for untagged).
    pub bodies: BTreeMap<String, String>,

    /// Conversation thread id.
    pub thread: Option<String>,

    /// Any other payload elements, in document order.
    pub payloads: Vec<Element>,
}

impl Message {
    /// Create an empty message of the given type.
    pub fn new(type_: MessageType) -> Message {
        Message {
            from: None,
            to: None,
            id: None,
            type_,
            subjects: BTreeMap::new(),
            bodies: BTreeMap::new(),
            thread: None,
            payloads: Vec::new(),
        }
    }

    /// Create a chat message with one untagged body.
    pub fn chat<B: Into<String>>(to: Addr, body: B) -> Message {
        let mut message = Message::new(MessageType::Chat);
        message.to = Some(to);
        message.bodies.insert(String::new(), body.into());
        message
    }

    /// The untagged body, or the first body if all are tagged.
    pub fn body(&self) -> Option<&str> {
        self.bodies
            .get("")
            .or_else(|| self.bodies.values().next())
            .map(String::as_str)
    }
}

fn lang_of(elem: &Element) -> String {
    elem.attr("xml:lang").unwrap_or_default().to_owned()
}

impl TryFrom<Element> for Message {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Message, Error> {
        if elem.name() != "message" || !ns::is_stanza_ns(&elem.ns()) {
            return Err(Error::TypeMismatch);
        }
        let mut message = Message {
            from: get_attr!(elem, "from", Option),
            to: get_attr!(elem, "to", Option),
            id: elem.attr("id").map(str::to_owned),
            type_: get_attr!(elem, "type", Default),
            subjects: BTreeMap::new(),
            bodies: BTreeMap::new(),
            thread: None,
            payloads: Vec::new(),
        };
        for child in elem.children() {
            if child.name() == "body" && ns::is_stanza_ns(&child.ns()) {
                if message.bodies.insert(lang_of(child), child.text()).is_some() {
                    return Err(Error::ParseError(
                        "Body element present twice for the same xml:lang.",
                    ));
                }
            } else if child.name() == "subject" && ns::is_stanza_ns(&child.ns()) {
                if message
                    .subjects
                    .insert(lang_of(child), child.text())
                    .is_some()
                {
                    return Err(Error::ParseError(
                        "Subject element present twice for the same xml:lang.",
                    ));
                }
            } else if child.name() == "thread" && ns::is_stanza_ns(&child.ns()) {
                if message.thread.is_some() {
                    return Err(Error::ParseError("Thread element present twice."));
                }
                message.thread = Some(child.text());
            } else {
                message.payloads.push(child.clone());
            }
        }
        Ok(message)
    }
}

impl From<Message> for Element {
    fn from(message: Message) -> Element {
        Element::builder("message", ns::JABBER_CLIENT)
            .attr("from", message.from)
            .attr("to", message.to)
            .attr("id", message.id)
            .attr("type", message.type_)
            .append_all(message.subjects.into_iter().map(|(lang, subject)| {
                Element::builder("subject", ns::JABBER_CLIENT)
                    .attr("xml:lang", if lang.is_empty() { None } else { Some(lang) })
                    .append(subject)
            }))
            .append_all(message.bodies.into_iter().map(|(lang, body)| {
                Element::builder("body", ns::JABBER_CLIENT)
                    .attr("xml:lang", if lang.is_empty() { None } else { Some(lang) })
                    .append(body)
            }))
            .append_all(
                message
                    .thread
                    .map(|thread| Element::builder("thread", ns::JABBER_CLIENT).append(thread)),
            )
            .append_all(message.payloads)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat() {
        let elem: Element =
            "<message xmlns='jabber:client' from='a@x.lit/r' type='chat'><body>hi</body></message>"
                .parse()
                .unwrap();
        let message = Message::try_from(elem).unwrap();
        assert_eq!(message.type_, MessageType::Chat);
        assert_eq!(message.body(), Some("hi"));
    }

    #[test]
    fn absent_type_means_normal() {
        let elem: Element = "<message xmlns='jabber:client'/>".parse().unwrap();
        let message = Message::try_from(elem).unwrap();
        assert_eq!(message.type_, MessageType::Normal);
    }

    #[test]
    fn normal_type_is_not_serialized() {
        let elem = Element::from(Message::new(MessageType::Normal));
        assert_eq!(elem.attr("type"), None);
        let elem = Element::from(Message::new(MessageType::Chat));
        assert_eq!(elem.attr("type"), Some("chat"));
    }

    #[test]
    fn localized_bodies() {
        let elem: Element = "<message xmlns='jabber:client' type='chat'>
            <body xml:lang='de'>Hallo</body>
            <body xml:lang='en'>Hello</body>
        </message>"
            .parse()
            .unwrap();
        let message = Message::try_from(elem).unwrap();
        assert_eq!(message.bodies["de"], "Hallo");
        assert_eq!(message.bodies["en"], "Hello");
    }

    #[test]
    fn unknown_children_become_payloads() {
        let elem: Element = "<message xmlns='jabber:client' type='chat'>
            <body>ping</body>
            <active xmlns='http://jabber.org/protocol/chatstates'/>
        </message>"
            .parse()
            .unwrap();
        let message = Message::try_from(elem).unwrap();
        assert_eq!(message.payloads.len(), 1);
        assert_eq!(message.payloads[0].name(), "active");
    }

    #[test]
    fn round_trip() {
        let message = Message::chat("b@x.lit".parse().unwrap(), "hello there");
        let elem = Element::from(message.clone());
        let back = Message::try_from(elem).unwrap();
        assert_eq!(message, back);
    }
}
