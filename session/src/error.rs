// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;

use hickory_resolver::error::ResolveError as DnsResolveError;
use hickory_resolver::proto::error::ProtoError as DnsProtoError;
use sasl::client::MechanismError as SaslMechanismError;
use sasl::server::MechanismError as SaslServerMechanismError;

use xmpp_addr::InvalidAddr;
use xmpp_stanza::{sasl as sasl_nonza, stanza_error::StanzaError, stream_error::StreamError};

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(IoError),
    /// Error parsing an address
    Addr(InvalidAddr),
    /// Protocol-level error
    Protocol(ProtocolError),
    /// Authentication error
    Auth(AuthError),
    /// A terminal stream error, received from the peer or written out
    /// by the engine.
    Stream(StreamError),
    /// A stanza error received in reply to a request.
    Stanza(StanzaError),
    /// Connection closed without a stream footer
    Disconnected,
    /// The input half-stream is closed; no more reads are possible.
    InputClosed,
    /// The output half-stream is closed; no more writes are possible.
    OutputClosed,
    /// An outbound element was not a stanza start
    NotStanza,
    /// An IQ with this id and addressing tuple is already pending
    DuplicateIqId,
    /// Should never happen
    InvalidState,
    /// DNS protocol error
    Dns(DnsProtoError),
    /// DNS resolution error
    Resolve(DnsResolveError),
    /// DNS label conversion error, no details available from module `idna`
    Idna,
    /// Invalid IP/port address
    SocketAddr(AddrParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Addr(e) => write!(fmt, "address parse error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::Stream(e) => write!(fmt, "stream error: {}", e),
            Error::Stanza(e) => write!(fmt, "stanza error: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::InputClosed => write!(fmt, "input stream closed"),
            Error::OutputClosed => write!(fmt, "output stream closed"),
            Error::NotStanza => write!(fmt, "outbound element is not a stanza"),
            Error::DuplicateIqId => write!(fmt, "an iq with this id is already pending"),
            Error::InvalidState => write!(fmt, "invalid state"),
            Error::Dns(e) => write!(fmt, "{:?}", e),
            Error::Resolve(e) => write!(fmt, "{:?}", e),
            Error::Idna => write!(fmt, "IDNA error"),
            Error::SocketAddr(e) => write!(fmt, "wrong network address: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Addr(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Auth(e) => Some(e),
            Error::Stream(e) => Some(e),
            Error::Stanza(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<InvalidAddr> for Error {
    fn from(e: InvalidAddr) -> Self {
        Error::Addr(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e).into()
    }
}

impl From<xmpp_stanza::error::Error> for Error {
    fn from(e: xmpp_stanza::error::Error) -> Self {
        ProtocolError::Parsers(e).into()
    }
}

impl From<DnsResolveError> for Error {
    fn from(e: DnsResolveError) -> Self {
        Error::Resolve(e)
    }
}

impl From<DnsProtoError> for Error {
    fn from(e: DnsProtoError) -> Self {
        Error::Dns(e)
    }
}

impl From<idna::Errors> for Error {
    fn from(_: idna::Errors) -> Self {
        Error::Idna
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Error::SocketAddr(e)
    }
}

/// XMPP protocol-level error
#[derive(Debug)]
pub enum ProtocolError {
    /// XML parser error
    Parser(minidom::Error),
    /// Error with expected element schema
    Parsers(xmpp_stanza::error::Error),
    /// No TLS available
    NoTls,
    /// The peer refused STARTTLS
    TlsRefused,
    /// Invalid response to resource binding
    InvalidBindResponse,
    /// No xmlns attribute in the stream header
    NoStreamNamespace,
    /// The stream header declared an unsupported default namespace
    InvalidStreamNamespace,
    /// No id attribute in the stream header
    NoStreamId,
    /// The stream header carried a version other than 1.0
    UnsupportedVersion,
    /// The first element of the stream was not a stream header
    InvalidStreamHeader,
    /// The peer's `from` changed across a stream restart
    PeerChangedIdentity,
    /// The `to` of an inbound stream header does not match our address
    MismatchedTo,
    /// A first-level stream element was not understood
    UnsupportedStanzaType,
    /// Encountered an unexpected token mid-negotiation
    UnexpectedToken,
    /// The peer re-advertised a feature without making progress
    FeaturesOutOfOrder,
    /// No advertised feature is selectable but negotiation is incomplete
    NegotiationStalled,
    /// Unexpected stream restart
    InvalidStreamStart,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Parser(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::Parsers(e) => write!(fmt, "error with expected element schema: {}", e),
            ProtocolError::NoTls => write!(fmt, "no TLS available"),
            ProtocolError::TlsRefused => write!(fmt, "peer refused to start TLS"),
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::NoStreamNamespace => {
                write!(fmt, "no xmlns attribute in stream header")
            }
            ProtocolError::InvalidStreamNamespace => {
                write!(fmt, "unsupported default namespace in stream header")
            }
            ProtocolError::NoStreamId => write!(fmt, "no id attribute in stream header"),
            ProtocolError::UnsupportedVersion => write!(fmt, "unsupported stream version"),
            ProtocolError::InvalidStreamHeader => {
                write!(fmt, "first element of the stream was not a stream header")
            }
            ProtocolError::PeerChangedIdentity => {
                write!(fmt, "peer stream 'from' changed across a restart")
            }
            ProtocolError::MismatchedTo => {
                write!(fmt, "stream header 'to' does not match the local address")
            }
            ProtocolError::UnsupportedStanzaType => {
                write!(fmt, "first-level stream element was not understood")
            }
            ProtocolError::UnexpectedToken => {
                write!(fmt, "encountered an unexpected XML token")
            }
            ProtocolError::FeaturesOutOfOrder => {
                write!(fmt, "peer re-advertised a feature without progress")
            }
            ProtocolError::NegotiationStalled => {
                write!(fmt, "no selectable feature but negotiation is incomplete")
            }
            ProtocolError::InvalidStreamStart => write!(fmt, "unexpected stream restart"),
        }
    }
}

impl StdError for ProtocolError {}

impl From<minidom::Error> for ProtocolError {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e)
    }
}

impl From<xmpp_stanza::error::Error> for ProtocolError {
    fn from(e: xmpp_stanza::error::Error) -> Self {
        ProtocolError::Parsers(e)
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    /// No matching SASL mechanism available
    NoMechanism,
    /// Local SASL implementation error
    Mechanism(SaslMechanismError),
    /// Local SASL implementation error, server side
    ServerMechanism(SaslServerMechanismError),
    /// Typed failure from the peer
    Fail(sasl_nonza::Failure),
}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Mechanism(e) => write!(fmt, "local SASL implementation error: {}", e),
            AuthError::ServerMechanism(e) => {
                write!(fmt, "local SASL implementation error: {}", e)
            }
            AuthError::Fail(e) => write!(fmt, "{}", e),
        }
    }
}

impl StdError for AuthError {}

impl From<SaslMechanismError> for AuthError {
    fn from(e: SaslMechanismError) -> Self {
        AuthError::Mechanism(e)
    }
}

impl From<SaslServerMechanismError> for AuthError {
    fn from(e: SaslServerMechanismError) -> Self {
        AuthError::ServerMechanism(e)
    }
}
