use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use dns_lookup::{getaddrinfo, LookupErrorKind};
use log::trace;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Where a lookup is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum Upstream {
    /// The host's own resolver
    System,
    /// A specific nameserver
    Nameserver(SocketAddr),
}

/// a, b and c root servers
const ROOT_SERVERS: [Ipv4Addr; 3] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(199, 9, 14, 201),
    Ipv4Addr::new(192, 33, 4, 12),
];

impl Upstream {
    /// A nameserver upstream on the standard DNS port
    #[must_use]
    pub const fn nameserver(ip: IpAddr) -> Self {
        Self::Nameserver(SocketAddr::new(ip, 53))
    }

    /// The a, b and c root servers as nameserver upstreams
    #[must_use]
    pub fn root_servers() -> Vec<Self> {
        ROOT_SERVERS
            .iter()
            .map(|ip| Self::nameserver(IpAddr::V4(*ip)))
            .collect()
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Nameserver(addr) => write!(f, "{addr}"),
        }
    }
}

/// The name-resolution capability the resolver is built on.
///
/// Implementations must be callable from many threads at once. A successful
/// lookup returns at least one address; anything else is an error.
#[cfg_attr(test, mockall::automock)]
pub trait Lookup: Send + Sync {
    /// Resolve `name` against `upstream`, giving up after roughly `timeout`
    ///
    /// # Errors
    /// Returns an error if the upstream produced no addresses
    fn lookup(
        &self,
        name: &str,
        upstream: &Upstream,
        timeout: Duration,
    ) -> Result<Vec<String>, LookupError>;
}

/// A [`Lookup`] backed by a closure, see [`from_fn`]
pub struct FnLookup<F> {
    f: F,
}

/// Build a [`Lookup`] from a closure
pub fn from_fn<F>(f: F) -> FnLookup<F>
where
    F: Fn(&str, &Upstream, Duration) -> Result<Vec<String>, LookupError> + Send + Sync,
{
    FnLookup { f }
}

impl<F> Lookup for FnLookup<F>
where
    F: Fn(&str, &Upstream, Duration) -> Result<Vec<String>, LookupError> + Send + Sync,
{
    fn lookup(
        &self,
        name: &str,
        upstream: &Upstream,
        timeout: Duration,
    ) -> Result<Vec<String>, LookupError> {
        (self.f)(name, upstream, timeout)
    }
}

impl<F> std::fmt::Debug for FnLookup<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLookup").finish_non_exhaustive()
    }
}

/// Lookup through the host resolver (`getaddrinfo`).
///
/// `getaddrinfo` has no timeout of its own, so each call runs on a helper
/// thread and is abandoned once the timeout passes. Only
/// [`Upstream::System`] is supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

impl SystemLookup {
    /// Create a new system lookup
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn getaddrinfo(name: &str) -> Result<Vec<String>, LookupError> {
        let infos = getaddrinfo(Some(name), None, None).map_err(|e| match e.kind() {
            LookupErrorKind::NoName | LookupErrorKind::NoData => {
                LookupError::NotFound(name.to_string())
            }
            LookupErrorKind::Again => {
                LookupError::Transient(std::io::Error::from(e).to_string())
            }
            _ => LookupError::Resolver(std::io::Error::from(e).to_string()),
        })?;

        let addresses = dedup_ips(
            infos
                .filter_map(std::result::Result::ok)
                .map(|info| info.sockaddr.ip()),
        );

        if addresses.is_empty() {
            return Err(LookupError::NotFound(name.to_string()));
        }
        Ok(addresses)
    }
}

impl Lookup for SystemLookup {
    fn lookup(
        &self,
        name: &str,
        upstream: &Upstream,
        timeout: Duration,
    ) -> Result<Vec<String>, LookupError> {
        if *upstream != Upstream::System {
            return Err(LookupError::UnsupportedUpstream(upstream.to_string()));
        }

        trace!("getaddrinfo({name}) with timeout {timeout:?}");
        let (tx, rx) = mpsc::channel();
        let owned = name.to_string();
        thread::Builder::new()
            .name("dns-getaddrinfo".to_string())
            .spawn(move || {
                // The receiver may be gone after a timeout
                let _ = tx.send(Self::getaddrinfo(&owned));
            })
            .map_err(|e| LookupError::Resolver(format!("failed to spawn lookup thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(LookupError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LookupError::Resolver(
                "lookup thread exited without a result".to_string(),
            )),
        }
    }
}

/// Render addresses as strings, dropping duplicates but keeping first-seen order
pub(crate) fn dedup_ips(ips: impl IntoIterator<Item = IpAddr>) -> Vec<String> {
    let mut seen = Vec::new();
    for ip in ips {
        if !seen.contains(&ip) {
            seen.push(ip);
        }
    }
    seen.iter().map(std::string::ToString::to_string).collect()
}
