// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end session tests, driving both ends of an in-memory duplex
//! pipe: either a real responder session or a byte-level scripted peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use sasl::common::{Credentials, Identity};
use sasl::server::{
    Mechanism as ServerMechanism, MechanismError as ServerMechanismError,
    Response as ServerResponse,
};

use xmpp_session::negotiate::{Bind, FeatureSet, Sasl};
use xmpp_session::{
    Connection, Error, HandlerError, IqKind, IqResponse, Mux, Session, SessionConfig,
    SessionState, Timeouts,
};
use xmpp_stanza::iq::Iq;
use xmpp_stanza::presence::Presence;
use xmpp_stanza::stream_error::Condition as StreamCondition;
use xmpp_stanza::{ns, Element};

const HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' version='1.0' id='stream-1' from='shakespeare.lit'>";

/// A test-only PLAIN responder mechanism which knows exactly one
/// account.
struct PlainAuth;

impl ServerMechanism for PlainAuth {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn respond(&mut self, payload: &[u8]) -> Result<ServerResponse, ServerMechanismError> {
        let mut parts = payload.split(|b| *b == 0);
        let _authzid = parts.next();
        let authcid = parts.next();
        let password = parts.next();
        match (authcid, password) {
            (Some(b"feste"), Some(password)) if password == b"relative caesuras" => {
                Ok(ServerResponse::Success(
                    Identity::Username("feste".to_owned()),
                    Vec::new(),
                ))
            }
            _ => Err(ServerMechanismError::FailedToDecodeMessage),
        }
    }
}

fn client_features() -> FeatureSet {
    let credentials = Credentials::default()
        .with_username("feste")
        .with_password("relative caesuras");
    FeatureSet::new()
        .with(Sasl::client(credentials))
        .with(Bind::client(None))
}

fn server_features() -> FeatureSet {
    FeatureSet::new()
        .with(Sasl::server(vec![Box::new(|| Box::new(PlainAuth))]))
        .with(Bind::server_random())
}

fn config() -> SessionConfig {
    SessionConfig {
        timeouts: Timeouts::tight(),
        ..SessionConfig::default()
    }
}

/// A scripted peer: accumulates inbound bytes and answers with canned
/// XML.
struct Script {
    io: DuplexStream,
    buf: String,
}

impl Script {
    fn new(io: DuplexStream) -> Script {
        Script {
            io,
            buf: String::new(),
        }
    }

    /// Read until the accumulated input contains `needle`.
    async fn read_until(&mut self, needle: &str) {
        let mut bytes = [0u8; 4096];
        while !self.buf.contains(needle) {
            let n = self.io.read(&mut bytes).await.expect("script read");
            assert!(n > 0, "eof while waiting for {:?}; got {:?}", needle, self.buf);
            self.buf.push_str(std::str::from_utf8(&bytes[..n]).unwrap());
        }
    }

    /// The value of the first `attr='…'` in the accumulated input.
    fn attr(&self, attr: &str) -> String {
        let pattern = format!("{}='", attr);
        let start = self.buf.find(&pattern).expect("attribute present") + pattern.len();
        let rest = &self.buf[start..];
        rest[..rest.find('\'').expect("attribute terminated")].to_owned()
    }

    fn clear(&mut self) {
        self.buf.clear();
    }

    async fn send(&mut self, xml: &str) {
        self.io.write_all(xml.as_bytes()).await.expect("script write");
    }

    /// Play the responder through PLAIN authentication and resource
    /// binding, assigning the given resource.
    async fn negotiate(&mut self, resource: &str) {
        self.read_until(">").await;
        self.clear();
        self.send(HEADER).await;
        self.send("<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>").await;
        self.read_until("</auth>").await;
        assert!(self.buf.contains("mechanism='PLAIN'"));
        self.clear();
        self.send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>").await;
        self.read_until(">").await;
        self.clear();
        self.send(HEADER).await;
        self.send("<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>").await;
        self.read_until("</iq>").await;
        let id = self.attr("id");
        self.clear();
        self.send(&format!(
            "<iq type='result' id='{}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>feste@shakespeare.lit/{}</jid></bind></iq>",
            id, resource,
        ))
        .await;
    }
}

async fn scripted_client(mux: Mux) -> (Session, Script) {
    let (client_io, server_io) = tokio::io::duplex(65536);
    let mut script = Script::new(server_io);
    let server = tokio::spawn(async move {
        script.negotiate("costume").await;
        script
    });
    let session = Session::negotiate_client(
        Connection::new(client_io),
        "feste@shakespeare.lit".parse().unwrap(),
        "shakespeare.lit".parse().unwrap(),
        &client_features(),
        mux,
        config(),
    )
    .await
    .expect("client negotiation");
    let script = server.await.unwrap();
    (session, script)
}

#[tokio::test]
async fn c2s_login_against_own_responder() {
    let (client_io, server_io) = tokio::io::duplex(65536);

    let server = tokio::spawn(async move {
        Session::negotiate_server(
            // A direct-TLS transport is simulated by marking the pipe
            // secure.
            Connection::secure(server_io),
            "shakespeare.lit".parse().unwrap(),
            &server_features(),
            Mux::builder().build(),
            config(),
        )
        .await
    });

    let client = Session::negotiate_client(
        Connection::secure(client_io),
        "feste@shakespeare.lit".parse().unwrap(),
        "shakespeare.lit".parse().unwrap(),
        &client_features(),
        Mux::builder().build(),
        config(),
    )
    .await
    .expect("client negotiation");
    let server = server.await.unwrap().expect("server negotiation");

    let expected =
        SessionState::SECURE | SessionState::AUTHN | SessionState::READY;
    assert!(client.state().contains(expected));
    assert!(!client.state().contains(SessionState::RECEIVED));
    assert!(server.state().contains(expected | SessionState::RECEIVED));

    // The server assigned a resource and both sides agree on the bound
    // address.
    assert!(client.local().is_full());
    assert_eq!(client.local().to_bare().as_str(), "feste@shakespeare.lit");
    assert_eq!(server.remote(), client.local());
}

#[tokio::test]
async fn ping_round_trip_through_both_serve_loops() {
    let (client_io, server_io) = tokio::io::duplex(65536);

    let server_mux = Mux::builder()
        .iq(
            Some(IqKind::Get),
            Some((ns::PING, "ping")),
            |session: Session, iq: Iq| async move {
                session
                    .send(iq.reply_result(None))
                    .await
                    .map_err(|e| HandlerError::Other(Box::new(e)))
            },
        )
        .build();

    let server = tokio::spawn(async move {
        Session::negotiate_server(
            Connection::new(server_io),
            "shakespeare.lit".parse().unwrap(),
            &server_features(),
            server_mux,
            config(),
        )
        .await
    });

    let client = Session::negotiate_client(
        Connection::new(client_io),
        "feste@shakespeare.lit".parse().unwrap(),
        "shakespeare.lit".parse().unwrap(),
        &client_features(),
        Mux::builder().build(),
        config(),
    )
    .await
    .expect("client negotiation");
    let server = server.await.unwrap().expect("server negotiation");

    let server_serve = {
        let server = server.clone();
        tokio::spawn(async move { server.serve().await })
    };
    let client_serve = {
        let client = client.clone();
        tokio::spawn(async move { client.serve().await })
    };

    let response = client
        .send_iq(Iq::get(Element::bare("ping", ns::PING)))
        .await
        .expect("iq send");
    match response {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }

    client.close().await.expect("close");
    let server_result = server_serve.await.unwrap();
    assert!(server_result.is_ok(), "server serve: {:?}", server_result);
    let client_result = client_serve.await.unwrap();
    assert!(client_result.is_ok(), "client serve: {:?}", client_result);
}

#[tokio::test]
async fn iq_get_result_without_handler_invocation() {
    let handled = Arc::new(AtomicBool::new(false));
    let flag = handled.clone();
    let mux = Mux::builder()
        .iq(None, None, move |_session: Session, _iq: Iq| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .build();

    let (session, mut script) = scripted_client(mux).await;
    assert!(session
        .state()
        .contains(SessionState::AUTHN | SessionState::READY));
    assert!(!session.state().contains(SessionState::SECURE));
    assert_eq!(session.local().as_str(), "feste@shakespeare.lit/costume");

    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    let peer = tokio::spawn(async move {
        script.read_until("urn:xmpp:ping").await;
        script.read_until("</iq>").await;
        let id = script.attr("id");
        script.clear();
        script
            .send(&format!(
                "<iq type='result' id='{}' from='shakespeare.lit' to='feste@shakespeare.lit/costume'/>",
                id,
            ))
            .await;
        script
    });

    let response = session
        .send_iq(Iq::get(Element::bare("ping", ns::PING)))
        .await
        .expect("iq send");
    match response {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }
    // The response completed the pending request; no handler ran.
    assert!(!handled.load(Ordering::SeqCst));

    drop(peer);
    drop(serve);
}

#[tokio::test]
async fn iq_timeout_removes_entry_and_late_reply_is_discarded() {
    let (session, mut script) = scripted_client(Mux::builder().build()).await;

    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    // The peer never answers within the deadline.
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        session.send_iq(Iq::get(Element::bare("ping", ns::PING))),
    )
    .await;
    assert!(result.is_err(), "expected a timeout");

    // Late reply for the abandoned id; the serve loop drops it.
    script.read_until("</iq>").await;
    let id = script.attr("id");
    script.clear();
    script
        .send(&format!("<iq type='result' id='{}'/>", id))
        .await;

    // The id is free again, and the session is still live: a second
    // request with the same id completes.
    let second = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_iq(Iq::get(Element::bare("ping", ns::PING)).with_id(id))
                .await
        })
    };
    script.read_until("</iq>").await;
    let id = script.attr("id");
    script.clear();
    script
        .send(&format!("<iq type='result' id='{}'/>", id))
        .await;
    match second.await.unwrap().expect("second iq") {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }

    drop(serve);
}

#[tokio::test]
async fn wrong_kind_reply_is_not_matched() {
    let presence_seen = Arc::new(AtomicBool::new(false));
    let flag = presence_seen.clone();
    let mux = Mux::builder()
        .presence(None, None, move |_session: Session, _presence: Presence| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .build();

    let (session, mut script) = scripted_client(mux).await;
    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    let peer = tokio::spawn(async move {
        script.read_until("</iq>").await;
        let id = script.attr("id");
        script.clear();
        // A presence with the same id must not complete the IQ.
        script
            .send(&format!("<presence id='{}' from='shakespeare.lit'/>", id))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        script
            .send(&format!("<iq type='result' id='{}'/>", id))
            .await;
        script
    });

    let response = session
        .send_iq(Iq::get(Element::bare("ping", ns::PING)))
        .await
        .expect("iq send");
    match response {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }
    assert!(presence_seen.load(Ordering::SeqCst));

    drop(peer);
    drop(serve);
}

#[tokio::test]
async fn unhandled_get_is_answered_with_service_unavailable() {
    let (session, mut script) = scripted_client(Mux::builder().build()).await;
    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    script
        .send("<iq type='get' id='q1'><query xmlns='urn:example:nothing'/></iq>")
        .await;
    script.read_until("service-unavailable").await;
    assert!(script.buf.contains("id='q1'"));
    assert!(script.buf.contains("type='error'"));

    drop(serve);
    drop(session);
}

#[tokio::test]
async fn stream_error_from_peer_terminates_serve() {
    let handled = Arc::new(AtomicBool::new(false));
    let flag = handled.clone();
    let mux = Mux::builder()
        .message(None, None, move |_session: Session, _message| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .build();

    let (session, mut script) = scripted_client(mux).await;
    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    script
        .send("<stream:error><not-well-formed xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>")
        .await;

    match serve.await.unwrap() {
        Err(Error::Stream(error)) => {
            assert_eq!(error.condition, StreamCondition::NotWellFormed);
        }
        other => panic!("unexpected serve result: {:?}", other),
    }
    assert!(!handled.load(Ordering::SeqCst));
    assert!(session.state().contains(SessionState::INPUT_CLOSED));

    // The input half-stream is terminally closed.
    match session.serve().await {
        Err(Error::InputClosed) => (),
        other => panic!("unexpected serve result: {:?}", other),
    }
}

#[tokio::test]
async fn outbound_iqs_get_unique_random_ids() {
    let (session, mut script) = scripted_client(Mux::builder().build()).await;

    let iq: Element = "<iq xmlns='jabber:client' type='result'/>".parse().unwrap();
    session.send_element(iq.clone()).await.expect("send");
    script.read_until("/>").await;
    let first = script.attr("id");
    assert_eq!(first.len(), 32, "128-bit hex id: {:?}", first);

    script.clear();
    session.send_element(iq).await.expect("send");
    script.read_until("/>").await;
    let second = script.attr("id");
    assert_ne!(first, second);

    // Anything but a stanza start is refused.
    match session.send_element(Element::bare("features", ns::STREAM)).await {
        Err(Error::NotStanza) => (),
        other => panic!("unexpected send result: {:?}", other),
    }
}

#[tokio::test]
async fn concurrent_send_and_close_writes_one_footer() {
    let (session, mut script) = scripted_client(Mux::builder().build()).await;

    // Drain the wire continuously so that senders never block on a full
    // pipe, and collect everything for the footer count.
    let drainer = tokio::spawn(async move {
        let mut collected = std::mem::take(&mut script.buf);
        let mut bytes = [0u8; 4096];
        loop {
            match script.io.read(&mut bytes).await {
                Ok(0) | Err(_) => return collected,
                Ok(n) => collected.push_str(std::str::from_utf8(&bytes[..n]).unwrap()),
            }
        }
    });

    let sender = {
        let session = session.clone();
        tokio::spawn(async move {
            let mut sent = 0usize;
            loop {
                match session.send(Presence::available()).await {
                    Ok(()) => sent += 1,
                    Err(Error::OutputClosed) => return sent,
                    Err(e) => panic!("unexpected send error: {}", e),
                }
            }
        })
    };
    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            session.close().await
        })
    };

    closer.await.unwrap().expect("close");
    sender.await.unwrap();

    // Closing again is a no-op, and sending reports the closed output.
    session.close().await.expect("second close");
    match session.send(Presence::available()).await {
        Err(Error::OutputClosed) => (),
        other => panic!("unexpected send result: {:?}", other.map(|_| ())),
    }
    assert!(session.state().contains(SessionState::OUTPUT_CLOSED));

    // Exactly one footer went over the wire.
    drop(session);
    let collected = drainer.await.unwrap();
    assert_eq!(collected.matches("</stream:stream>").count(), 1);
}

#[tokio::test]
async fn s2s_session_negotiates_bidi_and_skips_binding() {
    use sasl::server::mechanisms::Anonymous as ServerAnonymous;
    use xmpp_session::negotiate::Bidi;

    let (client_io, server_io) = tokio::io::duplex(65536);

    let s2s_config = SessionConfig {
        s2s: true,
        timeouts: Timeouts::tight(),
        ..SessionConfig::default()
    };

    let server_config = s2s_config.clone();
    let server = tokio::spawn(async move {
        let features = FeatureSet::new()
            .with(Sasl::server(vec![Box::new(|| {
                Box::new(ServerAnonymous::new())
            })]))
            .with(Bidi);
        Session::negotiate_server(
            Connection::new(server_io),
            "shakespeare.lit".parse().unwrap(),
            &features,
            Mux::builder().build(),
            server_config,
        )
        .await
    });

    let features = FeatureSet::new()
        .with(Sasl::client(Credentials::default()))
        .with(Bidi);
    let client = Session::negotiate_client(
        Connection::new(client_io),
        "marlowe.lit".parse().unwrap(),
        "shakespeare.lit".parse().unwrap(),
        &features,
        Mux::builder().build(),
        s2s_config,
    )
    .await
    .expect("client negotiation");
    let server = server.await.unwrap().expect("server negotiation");

    let expected = SessionState::AUTHN | SessionState::READY | SessionState::S2S;
    assert!(client.state().contains(expected));
    assert!(server.state().contains(expected | SessionState::RECEIVED));
    // No resource binding on server-to-server streams.
    assert!(client.local().is_bare());
    assert_eq!(client.local().as_str(), "marlowe.lit");
}

#[tokio::test]
async fn websocket_framing_end_to_end() {
    let (client_io, server_io) = tokio::io::duplex(65536);

    let ws_config = SessionConfig {
        framing: xmpp_session::Framing::WebSocket,
        timeouts: Timeouts::tight(),
        ..SessionConfig::default()
    };

    let server_mux = Mux::builder()
        .iq(
            Some(IqKind::Get),
            Some((ns::PING, "ping")),
            |session: Session, iq: Iq| async move {
                session
                    .send(iq.reply_result(None))
                    .await
                    .map_err(|e| HandlerError::Other(Box::new(e)))
            },
        )
        .build();

    let server_config = ws_config.clone();
    let server = tokio::spawn(async move {
        Session::negotiate_server(
            Connection::new(server_io),
            "shakespeare.lit".parse().unwrap(),
            &server_features(),
            server_mux,
            server_config,
        )
        .await
    });

    let client = Session::negotiate_client(
        Connection::new(client_io),
        "feste@shakespeare.lit".parse().unwrap(),
        "shakespeare.lit".parse().unwrap(),
        &client_features(),
        Mux::builder().build(),
        ws_config,
    )
    .await
    .expect("client negotiation");
    let server = server.await.unwrap().expect("server negotiation");

    assert!(client
        .state()
        .contains(SessionState::AUTHN | SessionState::READY));
    assert!(client.local().is_full());

    let server_serve = {
        let server = server.clone();
        tokio::spawn(async move { server.serve().await })
    };
    let client_serve = {
        let client = client.clone();
        tokio::spawn(async move { client.serve().await })
    };

    let response = client
        .send_iq(Iq::get(Element::bare("ping", ns::PING)))
        .await
        .expect("iq send");
    match response {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }

    client.close().await.expect("close");
    assert!(server_serve.await.unwrap().is_ok());
    assert!(client_serve.await.unwrap().is_ok());
}

#[tokio::test]
async fn duplicate_pending_iq_id_is_rejected() {
    let (session, mut script) = scripted_client(Mux::builder().build()).await;
    let serve = {
        let session = session.clone();
        tokio::spawn(async move { session.serve().await })
    };

    let first = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_iq(Iq::get(Element::bare("ping", ns::PING)).with_id("dup"))
                .await
        })
    };
    script.read_until("</iq>").await;

    match session
        .send_iq(Iq::get(Element::bare("ping", ns::PING)).with_id("dup"))
        .await
    {
        Err(Error::DuplicateIqId) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }

    script.clear();
    script.send("<iq type='result' id='dup'/>").await;
    match first.await.unwrap().expect("first iq") {
        Some(IqResponse::Result(None)) => (),
        other => panic!("unexpected response: {:?}", other),
    }

    drop(serve);
}
