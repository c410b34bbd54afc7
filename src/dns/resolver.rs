use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use super::cache::DnsCache;
use super::flight::{Flight, InFlight};
use super::lookup::{Lookup, SystemLookup, Upstream};
use super::normalize::normalize_name;
use super::options::ResolveOptions;
use super::stats::{ResolverStats, StatsSnapshot};
use super::sweeper::CacheSweeper;
use crate::{Error, Result};

/// Resolver-wide settings shared by every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// How long a successful answer stays in the cache
    pub cache_ttl: Duration,
    /// Pause before retrying the same upstream
    pub retry_backoff: Duration,
    /// Upstreams tried in order when a recursive call's direct lookup fails
    pub fallbacks: Vec<Upstream>,
    /// Let concurrent misses for the same name share one lookup
    pub single_flight: bool,
    /// Run a background sweeper at this interval
    pub sweep_interval: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            retry_backoff: Duration::from_secs(1),
            fallbacks: Vec::new(),
            single_flight: true,
            sweep_interval: None,
        }
    }
}

impl std::fmt::Display for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Resolver Configuration:")?;
        writeln!(f, "  Cache TTL: {:?}", self.cache_ttl)?;
        writeln!(f, "  Retry backoff: {:?}", self.retry_backoff)?;
        writeln!(f, "  Fallback upstreams:")?;
        for upstream in &self.fallbacks {
            writeln!(f, "    {upstream}")?;
        }
        writeln!(f, "  Single-flight: {}", self.single_flight)?;
        match self.sweep_interval {
            Some(interval) => writeln!(f, "  Sweep interval: {interval:?}"),
            None => writeln!(f, "  Sweep interval: disabled"),
        }
    }
}

/// A caching resolver in front of a [`Lookup`] capability.
///
/// A call is answered from the cache when possible. Otherwise the direct
/// upstream is queried, and for recursive calls each fallback upstream is
/// tried in turn, all within the call's retry budget. Successful answers are
/// cached. The resolver is `Send + Sync`; share it with an `Arc`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use dnscache::dns::{from_fn, DnsResolver, ResolveOptions};
///
/// let resolver = DnsResolver::builder()
///     .lookup(from_fn(|_name, _upstream, _timeout| Ok(vec!["10.0.0.1".to_string()])))
///     .cache_ttl(Duration::from_secs(60))
///     .build()?;
///
/// let addresses = resolver.resolve("example.com", &ResolveOptions::default());
/// assert_eq!(addresses, vec!["10.0.0.1"]);
/// # Ok::<(), dnscache::Error>(())
/// ```
pub struct DnsResolver {
    config: ResolverConfig,
    cache: DnsCache,
    lookup: Arc<dyn Lookup>,
    flights: InFlight,
    stats: ResolverStats,
    sweeper: Option<CacheSweeper>,
}

impl DnsResolver {
    /// Create a resolver with default settings over the system resolver
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(
            ResolverConfig::default(),
            DnsCache::new(),
            Arc::new(SystemLookup::new()),
            None,
        )
    }

    /// Create a builder for configuring the resolver
    #[must_use]
    pub fn builder() -> DnsResolverBuilder {
        DnsResolverBuilder::new()
    }

    /// Create a resolver over hickory using the system nameservers as fallbacks
    ///
    /// # Errors
    /// Returns an error if the system DNS configuration cannot be read or a
    /// hickory resolver cannot be set up
    #[cfg(feature = "hickory")]
    pub fn system() -> Result<Self> {
        let fallbacks = super::DnsConfig::system()?.fallback_upstreams();
        Self::builder()
            .lookup(super::hickory::HickoryLookup::with_upstreams(&fallbacks)?)
            .fallbacks(fallbacks)
            .build()
    }

    fn from_parts(
        config: ResolverConfig,
        cache: DnsCache,
        lookup: Arc<dyn Lookup>,
        sweeper: Option<CacheSweeper>,
    ) -> Self {
        Self {
            config,
            cache,
            lookup,
            flights: InFlight::default(),
            stats: ResolverStats::default(),
            sweeper,
        }
    }

    /// Resolve `name` to a list of addresses.
    ///
    /// Never fails: an empty list means the name could not be resolved,
    /// either because it is malformed or because every attempt failed.
    pub fn resolve(&self, name: &str, options: &ResolveOptions) -> Vec<String> {
        match self.try_resolve(name, options) {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        }
    }

    /// Resolve `name`, reporting why resolution failed.
    ///
    /// # Errors
    /// Returns [`Error::InvalidName`] if `name` cannot be normalized and
    /// [`Error::NotResolved`] if no attempt produced an address
    pub fn try_resolve(&self, name: &str, options: &ResolveOptions) -> Result<Vec<String>> {
        let name = normalize_name(name)?;

        if !options.use_cache {
            return self.run_attempts(&name, options);
        }

        if let Some(addresses) = self.cached(&name) {
            return Ok(addresses);
        }

        if !self.config.single_flight {
            return self.fetch(&name, options);
        }

        match self.flights.join(&name, options.recursive) {
            Flight::Leader(leader) => {
                // A previous leader may have finished between the miss and the join
                if let Some(addresses) = self.cache.get(&name) {
                    leader.finish(&addresses);
                    return Ok(addresses);
                }

                let result = self.run_attempts(&name, options);
                match &result {
                    Ok(addresses) => {
                        self.store(&name, addresses, options);
                        leader.finish(addresses);
                    }
                    Err(_) => leader.finish(&[]),
                }
                result
            }
            Flight::Follower(follower) => {
                self.stats.record_coalesced();
                trace!("waiting on in-flight lookup for {name}");
                if let Some(addresses) = follower.wait(options.deadline) {
                    if !addresses.is_empty() {
                        return Ok(addresses);
                    }
                }

                // Only answers are shared; a failed or abandoned wait runs this
                // caller's own attempt loop with its own budget
                debug!("in-flight lookup for {name} gave no answer, resolving directly");
                self.fetch(&name, options)
            }
        }
    }

    /// Run the attempt loop and cache a successful answer
    fn fetch(&self, name: &str, options: &ResolveOptions) -> Result<Vec<String>> {
        let result = self.run_attempts(name, options);
        if let Ok(addresses) = &result {
            self.store(name, addresses, options);
        }
        result
    }

    /// Drop any cached answer for `name` and resolve it again
    ///
    /// # Errors
    /// Returns the same errors as [`DnsResolver::try_resolve`]
    pub fn refresh(&self, name: &str, options: &ResolveOptions) -> Result<Vec<String>> {
        let normalized = normalize_name(name)?;
        self.cache.remove(&normalized);
        self.try_resolve(&normalized, &options.use_cache(true))
    }

    /// Remaining cache lifetime for `name`, if a fresh answer is cached
    #[must_use]
    pub fn cached_ttl(&self, name: &str) -> Option<Duration> {
        normalize_name(name)
            .ok()
            .and_then(|name| self.cache.ttl(&name))
    }

    /// Empty the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop expired cache entries now, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    /// The cache backing this resolver
    #[must_use]
    pub const fn cache(&self) -> &DnsCache {
        &self.cache
    }

    /// The resolver-wide configuration
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Current call and lookup counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true if a background sweeper is running
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(CacheSweeper::is_running)
    }

    fn cached(&self, name: &str) -> Option<Vec<String>> {
        let hit = self.cache.get(name);
        if hit.is_some() {
            self.stats.record_cache_hit();
        } else {
            self.stats.record_cache_miss();
        }
        hit
    }

    fn store(&self, name: &str, addresses: &[String], options: &ResolveOptions) {
        let ttl = options.ttl.unwrap_or(self.config.cache_ttl);
        self.cache.put(name, addresses.to_vec(), ttl);
    }

    /// Walk the attempt plan until an upstream answers, the retry budget is
    /// spent, the plan runs out or the deadline passes.
    fn run_attempts(&self, name: &str, options: &ResolveOptions) -> Result<Vec<String>> {
        let mut plan: Box<dyn Iterator<Item = Upstream> + '_> = if options.recursive {
            Box::new(std::iter::once(Upstream::System).chain(self.config.fallbacks.iter().copied()))
        } else {
            Box::new(std::iter::repeat(Upstream::System))
        };

        let mut budget = options.retries;
        let mut attempts = 0;
        let mut previous: Option<Upstream> = None;

        while budget > 0 {
            let Some(upstream) = plan.next() else {
                debug!("all upstreams exhausted for {name}");
                break;
            };
            if previous == Some(upstream) {
                self.backoff(options);
            }
            if options.is_expired() {
                debug!("deadline passed while resolving {name}");
                break;
            }

            attempts += 1;
            if let Some(addresses) = self.attempt(name, &upstream, options) {
                if upstream != Upstream::System {
                    self.stats.record_fallback_hit();
                }
                return Ok(addresses);
            }
            budget -= 1;
            previous = Some(upstream);
        }

        Err(Error::not_resolved(name, attempts))
    }

    fn attempt(
        &self,
        name: &str,
        upstream: &Upstream,
        options: &ResolveOptions,
    ) -> Option<Vec<String>> {
        let timeout = options.attempt_timeout();
        match self.lookup.lookup(name, upstream, timeout) {
            Ok(addresses) if !addresses.is_empty() => {
                self.stats.record_lookup(true);
                debug!("{name} resolved via {upstream}: {addresses:?}");
                Some(addresses)
            }
            Ok(_) => {
                self.stats.record_lookup(false);
                debug!("{upstream} returned no addresses for {name}");
                None
            }
            Err(e) => {
                self.stats.record_lookup(false);
                debug!("lookup of {name} via {upstream} failed: {e}");
                None
            }
        }
    }

    fn backoff(&self, options: &ResolveOptions) {
        let pause = options
            .remaining()
            .map_or(self.config.retry_backoff, |left| {
                left.min(self.config.retry_backoff)
            });
        if !pause.is_zero() {
            trace!("backing off for {pause:?}");
            thread::sleep(pause);
        }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("config", &self.config)
            .field("cached_entries", &self.cache.len())
            .field("in_flight", &self.flights.len())
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a DNS resolver
pub struct DnsResolverBuilder {
    config: ResolverConfig,
    cache: Option<DnsCache>,
    lookup: Option<Arc<dyn Lookup>>,
}

impl DnsResolverBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
            cache: None,
            lookup: None,
        }
    }

    /// Start from an existing configuration
    #[must_use]
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `cache` instead of a fresh one
    #[must_use]
    pub fn cache(mut self, cache: DnsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the lookup capability (defaults to [`SystemLookup`])
    #[must_use]
    pub fn lookup(mut self, lookup: impl Lookup + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Set the lookup capability from a shared handle
    #[must_use]
    pub fn shared_lookup(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Set how long successful answers are cached
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set the pause before retrying the same upstream
    #[must_use]
    pub const fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Append a fallback upstream
    #[must_use]
    pub fn fallback(mut self, upstream: Upstream) -> Self {
        self.config.fallbacks.push(upstream);
        self
    }

    /// Append several fallback upstreams, keeping their order
    #[must_use]
    pub fn fallbacks(mut self, upstreams: impl IntoIterator<Item = Upstream>) -> Self {
        self.config.fallbacks.extend(upstreams);
        self
    }

    /// Enable or disable sharing of concurrent lookups for the same name
    #[must_use]
    pub const fn single_flight(mut self, enabled: bool) -> Self {
        self.config.single_flight = enabled;
        self
    }

    /// Sweep expired entries in the background at `interval`
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = Some(interval);
        self
    }

    /// Build the resolver
    ///
    /// # Errors
    /// Returns an error if the sweep interval is zero or the sweeper thread
    /// cannot be started
    pub fn build(self) -> Result<DnsResolver> {
        let cache = self.cache.unwrap_or_default();
        let lookup = self
            .lookup
            .unwrap_or_else(|| Arc::new(SystemLookup::new()));
        let sweeper = self
            .config
            .sweep_interval
            .map(|interval| CacheSweeper::start(cache.clone(), interval))
            .transpose()?;

        Ok(DnsResolver::from_parts(self.config, cache, lookup, sweeper))
    }
}

impl Default for DnsResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
