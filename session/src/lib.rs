// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An asynchronous XMPP (RFC 6120/6121) session engine for tokio.
//!
//! This crate turns a bidirectional byte stream into a negotiated,
//! multiplexed stream of stanzas:
//!
//! - [`connect`] discovers and dials servers (SRV, direct TLS, fallback);
//! - [`negotiate`] drives the pluggable stream features (STARTTLS, SASL,
//!   resource binding, compression, bidi) through listings, restarts and
//!   transport upgrades;
//! - [`Session`] owns the negotiated stream: any task may send, one
//!   [`serve`][`Session::serve`] loop reads, pending IQs are correlated
//!   by id and addressing tuple, and everything else is dispatched
//!   through the [`Mux`].
//!
//! ```no_run
//! use xmpp_session::{connect, negotiate, Mux, Session, SessionConfig};
//! use xmpp_stanza::iq::Iq;
//! use xmpp_stanza::{ns, Element};
//!
//! # async fn example() -> Result<(), xmpp_session::Error> {
//! let addr: xmpp_addr::Addr = "feste@shakespeare.lit".parse()?;
//! let server: xmpp_addr::Addr = "shakespeare.lit".parse()?;
//! let conn = connect::Dialer::client().dial(addr.domain()).await?;
//!
//! let connector = connect::tls_connector()?;
//! let credentials = sasl::common::Credentials::default()
//!     .with_username("feste")
//!     .with_password("relative caesuras");
//! let features = negotiate::FeatureSet::new()
//!     .with(negotiate::StartTls::client(connector))
//!     .with(negotiate::Sasl::client(credentials))
//!     .with(negotiate::Bind::client(None));
//!
//! let session = Session::negotiate_client(
//!     conn,
//!     addr,
//!     server,
//!     &features,
//!     Mux::builder().build(),
//!     SessionConfig::default(),
//! )
//! .await?;
//!
//! let serve = {
//!     let session = session.clone();
//!     tokio::spawn(async move { session.serve().await })
//! };
//! let response = session
//!     .send_iq(Iq::get(Element::bare("ping", ns::PING)))
//!     .await?;
//! # drop((serve, response));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub use minidom;
pub use sasl;
pub use xmpp_addr as addr;
pub use xmpp_stanza as stanza;

mod codec;
mod connection;
mod error;
mod framing;
mod iq;
mod mux;
mod session;
mod state;
mod tee;

/// Discovery and dialing.
pub mod connect;
/// Stream feature negotiation.
pub mod negotiate;

pub use crate::codec::{Framing, Packet, XmppCodec};
pub use crate::connection::{AsyncReadAndWrite, Connection, Timeouts};
pub use crate::error::{AuthError, Error, ProtocolError};
pub use crate::framing::{StreamHeader, StreamInfo};
pub use crate::iq::{IqResponse, IqResponseToken};
pub use crate::mux::{
    HandlerError, IqHandler, IqKind, MessageHandler, Mux, MuxBuilder, PayloadName,
    PresenceHandler,
};
pub use crate::session::{Session, SessionConfig};
pub use crate::state::SessionState;
