// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<presence/>` stanza.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use minidom::{Element, IntoAttributeValue};
use xmpp_addr::Addr;

use crate::error::Error;
use crate::ns;

/// The type of a presence; the absence of a `type` attribute on the wire
/// means available.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceType {
    /// The sender is available for communication.
    #[default]
    Available,

    /// An error occurred processing a previously sent presence.
    Error,

    /// A request for the recipient's current presence, generated by a
    /// server on behalf of a user.
    Probe,

    /// The sender wishes to subscribe to the recipient's presence.
    Subscribe,

    /// The sender has allowed the recipient to receive their presence.
    Subscribed,

    /// The sender is no longer available for communication.
    Unavailable,

    /// The sender is unsubscribing from the recipient's presence.
    Unsubscribe,

    /// The subscription has been denied or canceled.
    Unsubscribed,
}

impl FromStr for PresenceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<PresenceType, Error> {
        Ok(match s {
            "error" => PresenceType::Error,
            "probe" => PresenceType::Probe,
            "subscribe" => PresenceType::Subscribe,
            "subscribed" => PresenceType::Subscribed,
            "unavailable" => PresenceType::Unavailable,
            "unsubscribe" => PresenceType::Unsubscribe,
            "unsubscribed" => PresenceType::Unsubscribed,
            _ => {
                return Err(Error::ParseError(
                    "Invalid 'type' attribute on presence element.",
                ));
            }
        })
    }
}

impl IntoAttributeValue for PresenceType {
    fn into_attribute_value(self) -> Option<String> {
        Some(String::from(match self {
            PresenceType::Available => return None,
            PresenceType::Error => "error",
            PresenceType::Probe => "probe",
            PresenceType::Subscribe => "subscribe",
            PresenceType::Subscribed => "subscribed",
            PresenceType::Unavailable => "unavailable",
            PresenceType::Unsubscribe => "unsubscribe",
            PresenceType::Unsubscribed => "unsubscribed",
        }))
    }
}

/// The availability of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Show {
    /// Temporarily away.
    Away,

    /// Actively interested in chatting.
    Chat,

    /// Busy ("do not disturb").
    Dnd,

    /// Away for an extended period.
    Xa,
}

impl FromStr for Show {
    type Err = Error;

    fn from_str(s: &str) -> Result<Show, Error> {
        Ok(match s {
            "away" => Show::Away,
            "chat" => Show::Chat,
            "dnd" => Show::Dnd,
            "xa" => Show::Xa,
            _ => return Err(Error::ParseError("Invalid value for show element.")),
        })
    }
}

impl fmt::Display for Show {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Show::Away => "away",
            Show::Chat => "chat",
            Show::Dnd => "dnd",
            Show::Xa => "xa",
        })
    }
}

/// A presence stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    /// The sender of this presence.
    pub from: Option<Addr>,

    /// The recipient of this presence.
    pub to: Option<Addr>,

    /// The id of this presence.
    pub id: Option<String>,

    /// The type of this presence.
    pub type_: PresenceType,

    /// The availability of the sender.
    pub show: Option<Show>,

    /// Statuses keyed by `xml:lang` (empty key for untagged).
    pub statuses: BTreeMap<String, String>,

    /// Resource priority, -128..=127; negative keeps bare-address
    /// traffic away from this resource.
    pub priority: i8,

    /// Any other payload elements, in document order.
    pub payloads: Vec<Element>,
}

impl Presence {
    /// Create an empty presence of the given type.
    pub fn new(type_: PresenceType) -> Presence {
        Presence {
            from: None,
            to: None,
            id: None,
            type_,
            show: None,
            statuses: BTreeMap::new(),
            priority: 0,
            payloads: Vec::new(),
        }
    }

    /// Create an available presence.
    pub fn available() -> Presence {
        Presence::new(PresenceType::Available)
    }

    /// Create an unavailable presence.
    pub fn unavailable() -> Presence {
        Presence::new(PresenceType::Unavailable)
    }

    /// Set the recipient.
    pub fn with_to(mut self, to: Addr) -> Presence {
        self.to = Some(to);
        self
    }
}

impl TryFrom<Element> for Presence {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Presence, Error> {
        if elem.name() != "presence" || !ns::is_stanza_ns(&elem.ns()) {
            return Err(Error::TypeMismatch);
        }
        let mut presence = Presence {
            from: get_attr!(elem, "from", Option),
            to: get_attr!(elem, "to", Option),
            id: elem.attr("id").map(str::to_owned),
            type_: get_attr!(elem, "type", Default),
            show: None,
            statuses: BTreeMap::new(),
            priority: 0,
            payloads: Vec::new(),
        };
        for child in elem.children() {
            if child.name() == "show" && ns::is_stanza_ns(&child.ns()) {
                if presence.show.is_some() {
                    return Err(Error::ParseError("Show element present twice."));
                }
                presence.show = Some(child.text().parse()?);
            } else if child.name() == "status" && ns::is_stanza_ns(&child.ns()) {
                let lang = child.attr("xml:lang").unwrap_or_default().to_owned();
                if presence.statuses.insert(lang, child.text()).is_some() {
                    return Err(Error::ParseError(
                        "Status element present twice for the same xml:lang.",
                    ));
                }
            } else if child.name() == "priority" && ns::is_stanza_ns(&child.ns()) {
                presence.priority = child
                    .text()
                    .parse()
                    .map_err(Error::text_parse_error)?;
            } else {
                presence.payloads.push(child.clone());
            }
        }
        Ok(presence)
    }
}

impl From<Presence> for Element {
    fn from(presence: Presence) -> Element {
        Element::builder("presence", ns::JABBER_CLIENT)
            .attr("from", presence.from)
            .attr("to", presence.to)
            .attr("id", presence.id)
            .attr("type", presence.type_)
            .append_all(
                presence
                    .show
                    .map(|show| {
                        Element::builder("show", ns::JABBER_CLIENT).append(show.to_string())
                    }),
            )
            .append_all(presence.statuses.into_iter().map(|(lang, status)| {
                Element::builder("status", ns::JABBER_CLIENT)
                    .attr("xml:lang", if lang.is_empty() { None } else { Some(lang) })
                    .append(status)
            }))
            .append_all(if presence.priority == 0 {
                None
            } else {
                Some(
                    Element::builder("priority", ns::JABBER_CLIENT)
                        .append(presence.priority.to_string()),
                )
            })
            .append_all(presence.payloads)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_type_means_available() {
        let elem: Element = "<presence xmlns='jabber:client'/>".parse().unwrap();
        let presence = Presence::try_from(elem).unwrap();
        assert_eq!(presence.type_, PresenceType::Available);
    }

    #[test]
    fn available_type_is_not_serialized() {
        let elem = Element::from(Presence::available());
        assert_eq!(elem.attr("type"), None);
        let elem = Element::from(Presence::unavailable());
        assert_eq!(elem.attr("type"), Some("unavailable"));
    }

    #[test]
    fn parse_show_status_priority() {
        let elem: Element = "<presence xmlns='jabber:client'>
            <show>dnd</show>
            <status>busy rehearsing</status>
            <priority>-1</priority>
        </presence>"
            .parse()
            .unwrap();
        let presence = Presence::try_from(elem).unwrap();
        assert_eq!(presence.show, Some(Show::Dnd));
        assert_eq!(presence.statuses[""], "busy rehearsing");
        assert_eq!(presence.priority, -1);
    }

    #[test]
    fn invalid_type_is_rejected() {
        let elem: Element = "<presence xmlns='jabber:client' type='coucou'/>"
            .parse()
            .unwrap();
        assert!(Presence::try_from(elem).is_err());
    }

    #[test]
    fn round_trip() {
        let mut presence = Presence::new(PresenceType::Subscribe);
        presence.to = Some("b@x.lit".parse().unwrap());
        presence.statuses.insert(String::new(), "hi".to_owned());
        let elem = Element::from(presence.clone());
        let back = Presence::try_from(elem).unwrap();
        assert_eq!(presence, back);
    }
}
