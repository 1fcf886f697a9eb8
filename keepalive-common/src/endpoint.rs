// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;

/// A socket address whose identity, for authorization purposes, is the
/// address bits alone.
///
/// Clients send their liveness datagrams from an ephemeral UDP port, so the
/// source port carries no identity; [`Endpoint::host_eq`] is the comparator
/// every authorization decision goes through. The family tag is carried by
/// [`SocketAddr`] itself, which restricts endpoints to IPv4/IPv6 by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Compare the address component of two endpoints, ignoring ports.
    ///
    /// IPv4 and IPv6 never match each other; a v4-mapped IPv6 address is an
    /// IPv6 address and does not match its IPv4 form.
    pub fn host_eq(&self, other: &Endpoint) -> bool {
        match (self.0, other.0) {
            (SocketAddr::V4(a), SocketAddr::V4(b)) => a.ip() == b.ip(),
            (SocketAddr::V6(a), SocketAddr::V6(b)) => a.ip() == b.ip(),
            _ => false,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    /// Accepts `addr:port` (`[v6]:port`) or a bare address, which gets
    /// port 0. Client whitelist entries are usually bare.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = SocketAddr::from_str(s) {
            return Ok(Endpoint(addr));
        }
        let ip = IpAddr::from_str(s)?;
        Ok(Endpoint(SocketAddr::new(ip, 0)))
    }
}
