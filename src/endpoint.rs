//! Remote endpoint description.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};

/// Address family the endpoint is parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressFamily {
    /// Dotted-quad IPv4 address.
    #[default]
    Ipv4,
    /// IPv6 address in RFC 4291 text form.
    Ipv6,
}

impl AddressFamily {
    /// Check if this is the IPv6 family.
    #[inline]
    #[must_use]
    pub const fn is_ipv6(&self) -> bool {
        matches!(self, AddressFamily::Ipv6)
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Immutable address/port/family triple supplied by the caller.
///
/// The address is kept in textual form and only parsed when a connection is
/// attempted, so a malformed address surfaces as
/// [`Error::AddressParse`] from [`Connection::connect`](crate::Connection::connect).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: String,
    port: u16,
    family: AddressFamily,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(address: impl Into<String>, port: u16, family: AddressFamily) -> Self {
        Self {
            address: address.into(),
            port,
            family,
        }
    }

    /// Create an IPv4 endpoint.
    pub fn ipv4(address: impl Into<String>, port: u16) -> Self {
        Self::new(address, port, AddressFamily::Ipv4)
    }

    /// Create an IPv6 endpoint.
    pub fn ipv6(address: impl Into<String>, port: u16) -> Self {
        Self::new(address, port, AddressFamily::Ipv6)
    }

    /// Textual address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Port number.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address family.
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Parse the address for the endpoint's family.
    ///
    /// An IPv6 literal is rejected for [`AddressFamily::Ipv4`] and vice versa.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressParse`] if the address is not a literal of the
    /// requested family.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = match self.family {
            AddressFamily::Ipv4 => self.address.parse::<Ipv4Addr>().map(IpAddr::V4),
            AddressFamily::Ipv6 => self.address.parse::<Ipv6Addr>().map(IpAddr::V6),
        }
        .map_err(|_| Error::AddressParse {
            address: self.address.clone(),
            family: self.family,
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Endpoint::ipv4(v4.ip().to_string(), v4.port()),
            SocketAddr::V6(v6) => Endpoint::ipv6(v6.ip().to_string(), v6.port()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Ipv4 => write!(f, "{}:{}", self.address, self.port),
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.address, self.port),
        }
    }
}
