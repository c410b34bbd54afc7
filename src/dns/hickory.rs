//! Lookup backed by `hickory-resolver`, able to target individual nameservers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use log::{debug, trace};
use tokio::runtime::Runtime;

use super::lookup::{dedup_ips, Lookup, Upstream};
use crate::error::LookupError;
use crate::Result;

/// A [`Lookup`] that drives hickory on a private tokio runtime.
///
/// [`Upstream::System`] uses the system resolver configuration;
/// [`Upstream::Nameserver`] queries exactly that server over UDP, then TCP.
/// One hickory resolver is built per upstream and reused.
pub struct HickoryLookup {
    runtime: Runtime,
    resolvers: Mutex<HashMap<Upstream, TokioResolver>>,
}

impl HickoryLookup {
    /// Create a new hickory-backed lookup
    ///
    /// # Errors
    /// Returns an error if the tokio runtime cannot be started
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("dns-hickory")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            resolvers: Mutex::new(HashMap::new()),
        })
    }

    /// Create a lookup with resolvers for `upstreams` already built
    ///
    /// # Errors
    /// Returns [`Error::Lookup`](crate::Error::Lookup) if a resolver cannot be
    /// built for one of the upstreams, e.g. the system configuration is unreadable
    pub fn with_upstreams(upstreams: &[Upstream]) -> Result<Self> {
        let lookup = Self::new()?;
        for upstream in upstreams {
            lookup.resolver_for(upstream)?;
        }
        Ok(lookup)
    }

    /// Number of upstreams with a resolver built
    #[must_use]
    pub fn resolver_count(&self) -> usize {
        self.resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn resolver_for(&self, upstream: &Upstream) -> std::result::Result<TokioResolver, LookupError> {
        let mut resolvers = self
            .resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(resolver) = resolvers.get(upstream) {
            return Ok(resolver.clone());
        }

        let _runtime = self.runtime.enter();
        let resolver = build_resolver(upstream)?;
        debug!("built hickory resolver for {upstream}");
        resolvers.insert(*upstream, resolver.clone());
        Ok(resolver)
    }
}

fn build_resolver(upstream: &Upstream) -> std::result::Result<TokioResolver, LookupError> {
    let mut opts = ResolverOpts::default();
    // The caching layer above owns caching and retries
    opts.cache_size = 0;
    opts.attempts = 1;

    let builder = match upstream {
        Upstream::System => TokioResolver::builder_tokio()
            .map_err(|e| LookupError::Resolver(format!("system configuration: {e}")))?,
        Upstream::Nameserver(addr) => {
            let mut config = ResolverConfig::new();
            config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
            config.add_name_server(NameServerConfig::new(*addr, Protocol::Tcp));
            Resolver::builder_with_config(config, TokioConnectionProvider::default())
        }
    };

    Ok(builder.with_options(opts).build())
}

impl Lookup for HickoryLookup {
    fn lookup(
        &self,
        name: &str,
        upstream: &Upstream,
        timeout: Duration,
    ) -> std::result::Result<Vec<String>, LookupError> {
        let resolver = self.resolver_for(upstream)?;
        trace!("hickory lookup of {name} via {upstream}");

        let response = self.runtime.block_on(async {
            tokio::time::timeout(timeout, resolver.lookup_ip(name)).await
        });

        let addresses = match response {
            Err(_) => return Err(LookupError::Timeout(timeout)),
            Ok(Err(e)) => return Err(LookupError::Resolver(e.to_string())),
            Ok(Ok(lookup)) => dedup_ips(lookup.iter()),
        };

        if addresses.is_empty() {
            return Err(LookupError::NotFound(name.to_string()));
        }
        Ok(addresses)
    }
}

impl std::fmt::Debug for HickoryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryLookup")
            .field("resolvers", &self.resolver_count())
            .finish_non_exhaustive()
    }
}
