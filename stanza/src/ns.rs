// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespaces used by the XMPP core protocols.

/// RFC 6120: stream-level elements (`<stream:stream>`, `<stream:features>`,
/// `<stream:error>`)
pub const STREAM: &str = "http://etherx.jabber.org/streams";

/// RFC 6120: default namespace of client-to-server streams
pub const JABBER_CLIENT: &str = "jabber:client";

/// RFC 6120: default namespace of server-to-server streams
pub const JABBER_SERVER: &str = "jabber:server";

/// RFC 6120: stream error conditions
pub const XMPP_STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

/// RFC 6120: stanza error conditions
pub const XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// RFC 6120: STARTTLS negotiation
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

/// RFC 6120: SASL negotiation
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// RFC 6120: resource binding
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

/// XEP-0138: stream compression, feature advertisement
pub const COMPRESS_FEATURE: &str = "http://jabber.org/features/compress";

/// XEP-0138: stream compression, negotiation protocol
pub const COMPRESS: &str = "http://jabber.org/protocol/compress";

/// XEP-0288: bidirectional server-to-server streams, feature advertisement
pub const BIDI_FEATURE: &str = "urn:xmpp:features:bidi";

/// XEP-0288: bidirectional server-to-server streams, nonza
pub const BIDI: &str = "urn:xmpp:bidi";

/// RFC 7395: WebSocket framing (`<open/>`, `<close/>`)
pub const WEBSOCKET: &str = "urn:ietf:params:xml:ns:xmpp-framing";

/// XEP-0199: XMPP ping
pub const PING: &str = "urn:xmpp:ping";

/// Whether `ns` is one of the two stanza stream namespaces.
pub fn is_stanza_ns(ns: &str) -> bool {
    ns == JABBER_CLIENT || ns == JABBER_SERVER
}
