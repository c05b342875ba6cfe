// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The transport wrapper: an arbitrary bidirectional byte channel behind
//! one concrete type, with TLS-state introspection and read deadlines.

use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::tee::Tee;

/// Everything a session transport needs to implement.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// Configuration for timeouts on the session's input stream.
///
/// After `read_timeout` of silence the session sends a whitespace
/// keepalive; if the peer stays silent for another `response_timeout`, the
/// stream is considered dead and reads fail with
/// [`TimedOut`][`io::ErrorKind::TimedOut`].
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Maximum silence before a keepalive is sent.
    pub read_timeout: Duration,

    /// Maximum silence after the keepalive.
    pub response_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_timeout: Duration::new(300, 0),
            response_timeout: Duration::new(300, 0),
        }
    }
}

impl Timeouts {
    /// Tight timeouts suitable for a fast LAN or localhost.
    pub fn tight() -> Self {
        Self {
            read_timeout: Duration::new(60, 0),
            response_timeout: Duration::new(15, 0),
        }
    }
}

/// A session transport: a boxed bidirectional byte channel plus the TLS
/// state of the channel.
///
/// The session does not own the lifecycle of the underlying socket; closing
/// the XML streams leaves the transport open for the code that created it.
pub struct Connection {
    io: Box<dyn AsyncReadAndWrite>,
    secure: bool,
}

impl Connection {
    /// Wrap a plaintext transport.
    pub fn new<T: AsyncReadAndWrite + 'static>(io: T) -> Connection {
        Connection {
            io: Box::new(io),
            secure: false,
        }
    }

    /// Wrap a transport which is already encrypted (direct TLS, or the
    /// result of a STARTTLS upgrade).
    pub fn secure<T: AsyncReadAndWrite + 'static>(io: T) -> Connection {
        Connection {
            io: Box::new(io),
            secure: true,
        }
    }

    /// Whether the transport is encrypted.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Mirror all bytes read from this transport into the wire log.
    pub fn with_tee(self) -> Connection {
        Connection {
            secure: self.secure,
            io: Box::new(Tee::new(self.io)),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("secure", &self.secure)
            .finish()
    }
}
