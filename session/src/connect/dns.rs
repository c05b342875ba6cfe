// Copyright (c) 2026 The xmpp-session contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SRV discovery and TCP dialing.

use core::cmp::Reverse;
use std::net::SocketAddr;

use futures::{future::select_ok, FutureExt};
use hickory_resolver::{
    config::LookupIpStrategy, name_server::TokioConnectionProvider, IntoName, TokioAsyncResolver,
};
use log::debug;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::connection::Connection;
use crate::error::Error;

/// Manual connection strategies, for when discovery is configured
/// rather than derived from the peer address.
#[derive(Clone, Debug)]
pub enum DnsConfig {
    /// Use an SRV record to find the server host.
    UseSrv {
        /// Hostname to resolve.
        host: String,
        /// Service label, e.g. `_xmpp-client._tcp`.
        srv: String,
        /// Port to use when SRV resolution fails.
        fallback_port: u16,
    },

    /// Explicit host and port; the presence of a port bypasses SRV.
    NoSrv {
        /// Server host name.
        host: String,
        /// Server port.
        port: u16,
    },

    /// Explicit `ip:port`; no DNS at all.
    Addr {
        /// The socket address.
        addr: String,
    },
}

impl std::fmt::Display for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseSrv { host, .. } => write!(f, "{}", host),
            Self::NoSrv { host, port } => write!(f, "{}:{}", host, port),
            Self::Addr { addr } => write!(f, "{}", addr),
        }
    }
}

impl DnsConfig {
    /// Constructor for the [`DnsConfig::UseSrv`] variant.
    pub fn srv(host: &str, srv: &str, fallback_port: u16) -> Self {
        Self::UseSrv {
            host: host.to_owned(),
            srv: srv.to_owned(),
            fallback_port,
        }
    }

    /// The default SRV strategy for client streams.
    pub fn srv_default_client(host: &str) -> Self {
        Self::srv(host, "_xmpp-client._tcp", 5222)
    }

    /// Constructor for the [`DnsConfig::NoSrv`] variant.
    pub fn no_srv(host: &str, port: u16) -> Self {
        Self::NoSrv {
            host: host.to_owned(),
            port,
        }
    }

    /// Constructor for the [`DnsConfig::Addr`] variant.
    pub fn addr(addr: &str) -> Self {
        Self::Addr {
            addr: addr.to_owned(),
        }
    }

    /// Resolve this strategy to a connected TCP stream.
    pub async fn resolve(&self) -> Result<TcpStream, Error> {
        match self {
            Self::UseSrv {
                host,
                srv,
                fallback_port,
            } => {
                let ascii = idna::domain_to_ascii(host)?;
                match lookup_srv(&ascii, srv).await? {
                    SrvOutcome::Targets(targets) => connect_first(targets).await,
                    SrvOutcome::NoService | SrvOutcome::NotFound => {
                        resolve_no_srv(host, *fallback_port).await
                    }
                }
            }
            Self::NoSrv { host, port } => resolve_no_srv(host, *port).await,
            Self::Addr { addr } => {
                let addr: SocketAddr = addr.parse()?;
                Ok(TcpStream::connect(&addr).await?)
            }
        }
    }
}

enum SrvOutcome {
    /// Resolved targets, in priority order.
    Targets(Vec<(String, u16)>),
    /// The service exists but a single `.` target says it is
    /// deliberately not offered at this domain.
    NoService,
    /// No SRV record at all.
    NotFound,
}

async fn lookup_srv(ascii_domain: &str, service: &str) -> Result<SrvOutcome, Error> {
    if ascii_domain.parse::<std::net::IpAddr>().is_ok() {
        return Ok(SrvOutcome::NotFound);
    }
    let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
    let srv_domain = format!("{}.{}.", service, ascii_domain).into_name()?;
    let lookup = match resolver.srv_lookup(srv_domain.clone()).await {
        Ok(lookup) => lookup,
        Err(e) => {
            debug!("no {} record: {}", srv_domain, e);
            return Ok(SrvOutcome::NotFound);
        }
    };

    let mut records: Vec<_> = lookup.iter().collect();
    if records.iter().all(|srv| srv.target().is_root()) {
        return Ok(SrvOutcome::NoService);
    }
    records.sort_by_key(|srv| (srv.priority(), Reverse(srv.weight())));
    Ok(SrvOutcome::Targets(
        records
            .into_iter()
            .filter(|srv| !srv.target().is_root())
            .map(|srv| (srv.target().to_ascii(), srv.port()))
            .collect(),
    ))
}

async fn connect_first(targets: Vec<(String, u16)>) -> Result<TcpStream, Error> {
    for (host, port) in targets {
        debug!("attempting connection to {}:{}", host, port);
        if let Ok(stream) = resolve_no_srv(&host, port).await {
            return Ok(stream);
        }
    }
    Err(Error::Disconnected)
}

async fn resolve_no_srv(host: &str, port: u16) -> Result<TcpStream, Error> {
    let ascii_domain = idna::domain_to_ascii(host)?;

    if let Ok(ip) = ascii_domain.parse() {
        return Ok(TcpStream::connect(&SocketAddr::new(ip, port)).await?);
    }

    let (config, mut options) = hickory_resolver::system_conf::read_system_conf()?;
    options.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    let resolver = TokioAsyncResolver::new(config, options, TokioConnectionProvider::default());

    let ips = resolver.lookup_ip(ascii_domain).await?;

    // Happy Eyeballs: connect to all records in parallel, return the
    // first to succeed.
    select_ok(
        ips.into_iter()
            .map(|ip| TcpStream::connect(SocketAddr::new(ip, port)).boxed()),
    )
    .await
    .map(|(result, _)| result)
    .map_err(|_| Error::Disconnected)
}

/// Address-driven discovery per RFC 6120 §3.2 and XEP-0368.
///
/// When a TLS connector is configured, the `_xmpps-*` (direct TLS)
/// service is preferred; a domain that declines it with a `.` target
/// falls back to `_xmpp-*` and finally to A/AAAA records with the
/// default port.
pub struct Dialer {
    s2s: bool,
    direct_tls: Option<TlsConnector>,
}

impl Dialer {
    /// A dialer for client-to-server streams.
    pub fn client() -> Dialer {
        Dialer {
            s2s: false,
            direct_tls: None,
        }
    }

    /// A dialer for server-to-server streams.
    pub fn server() -> Dialer {
        Dialer {
            s2s: true,
            direct_tls: None,
        }
    }

    /// Prefer direct TLS (`xmpps`) endpoints, using this connector.
    pub fn with_direct_tls(mut self, connector: TlsConnector) -> Dialer {
        self.direct_tls = Some(connector);
        self
    }

    fn services(&self) -> (&'static str, u16, &'static str, u16) {
        if self.s2s {
            ("_xmpps-server._tcp", 5270, "_xmpp-server._tcp", 5269)
        } else {
            ("_xmpps-client._tcp", 5223, "_xmpp-client._tcp", 5222)
        }
    }

    /// Discover and connect to the server for `domain`.
    pub async fn dial(&self, domain: &str) -> Result<Connection, Error> {
        let ascii = idna::domain_to_ascii(domain)?;
        let (tls_service, tls_port, service, port) = self.services();

        if let Some(connector) = &self.direct_tls {
            match lookup_srv(&ascii, tls_service).await? {
                SrvOutcome::Targets(targets) => {
                    let stream = connect_first(targets).await?;
                    return self.handshake(connector, &ascii, stream).await;
                }
                SrvOutcome::NoService => {
                    debug!("{} declines direct TLS; trying starttls", domain);
                }
                SrvOutcome::NotFound => (),
            }
        }

        match lookup_srv(&ascii, service).await? {
            SrvOutcome::Targets(targets) => {
                return Ok(Connection::new(connect_first(targets).await?));
            }
            SrvOutcome::NoService => return Err(Error::Disconnected),
            SrvOutcome::NotFound => (),
        }

        // No SRV records at all: A/AAAA of the domain with the default
        // port, direct TLS first if configured.
        if let Some(connector) = &self.direct_tls {
            if let Ok(stream) = resolve_no_srv(&ascii, tls_port).await {
                if let Ok(conn) = self.handshake(connector, &ascii, stream).await {
                    return Ok(conn);
                }
            }
        }
        Ok(Connection::new(resolve_no_srv(&ascii, port).await?))
    }

    /// Connect to an explicit host and port, bypassing DNS discovery.
    pub async fn dial_host(&self, host: &str, port: u16) -> Result<Connection, Error> {
        let stream = resolve_no_srv(host, port).await?;
        match &self.direct_tls {
            Some(connector) => self.handshake(connector, host, stream).await,
            None => Ok(Connection::new(stream)),
        }
    }

    async fn handshake(
        &self,
        connector: &TlsConnector,
        domain: &str,
        stream: TcpStream,
    ) -> Result<Connection, Error> {
        let name = ServerName::try_from(domain.to_owned())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        let tls = connector.connect(name, stream).await?;
        Ok(Connection::secure(tls))
    }
}
