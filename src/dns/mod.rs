pub mod cache;
mod flight;
#[cfg(feature = "hickory")]
pub mod hickory;
pub mod lookup;
pub mod normalize;
pub mod options;
pub mod resolver;
pub mod stats;
pub mod sweeper;

// Re-export main types
pub use cache::{CacheEntry, DnsCache};
#[cfg(feature = "hickory")]
pub use hickory::HickoryLookup;
pub use lookup::{from_fn, FnLookup, Lookup, SystemLookup, Upstream};
pub use normalize::normalize_name;
pub use options::ResolveOptions;
pub use resolver::{DnsResolver, DnsResolverBuilder, ResolverConfig};
pub use stats::{ResolverStats, StatsSnapshot};
pub use sweeper::CacheSweeper;

use std::net::IpAddr;
use std::time::Duration;

use crate::{Error, Result};

/// Location of the resolver configuration on unix systems
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Host resolver settings, as read from `resolv.conf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    /// `nameserver` entries in file order, zone suffixes dropped
    pub nameservers: Vec<IpAddr>,
    /// `search` list, or the single `domain` entry when there is no `search`
    pub search_domains: Vec<String>,
    /// `options timeout:N`, used as the per-attempt timeout
    pub timeout: Duration,
    /// `options attempts:N`, used as the per-call retry budget
    pub attempts: u32,
}

impl DnsConfig {
    /// Get the system DNS configuration
    ///
    /// # Errors
    /// Returns an error if system DNS configuration cannot be read
    pub fn system() -> Result<Self> {
        #[cfg(unix)]
        {
            let contents = std::fs::read_to_string(RESOLV_CONF)?;
            Ok(Self::parse(&contents))
        }
        #[cfg(not(unix))]
        {
            Err(Error::config_error(format!(
                "reading system DNS configuration is not supported on {}",
                std::env::consts::OS
            )))
        }
    }

    /// Parse `resolv.conf` contents. Unknown or malformed lines are skipped.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();
        let mut domain = None;

        for line in contents.lines() {
            let line = line.split(['#', ';']).next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => {
                    // Drop any IPv6 zone suffix, e.g. fe80::1%eth0
                    if let Some(Ok(ip)) = fields
                        .next()
                        .map(|addr| addr.split('%').next().unwrap_or(addr).parse::<IpAddr>())
                    {
                        config.nameservers.push(ip);
                    }
                }
                Some("search") => {
                    config.search_domains = fields.map(str::to_string).collect();
                }
                Some("domain") => domain = fields.next().map(str::to_string),
                Some("options") => {
                    for option in fields {
                        if let Some(secs) = option.strip_prefix("timeout:") {
                            if let Ok(secs) = secs.parse() {
                                config.timeout = Duration::from_secs(secs);
                            }
                        } else if let Some(attempts) = option.strip_prefix("attempts:") {
                            if let Ok(attempts) = attempts.parse() {
                                config.attempts = attempts;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if config.search_domains.is_empty() {
            config.search_domains.extend(domain);
        }
        config
    }

    /// The configured nameservers as fallback upstreams on port 53
    #[must_use]
    pub fn fallback_upstreams(&self) -> Vec<Upstream> {
        self.nameservers
            .iter()
            .map(|ip| Upstream::nameserver(*ip))
            .collect()
    }

    /// Per-call options using this configuration's timeout and attempts
    #[must_use]
    pub const fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::new()
            .timeout(self.timeout)
            .retries(self.attempts)
    }

    /// Check that at least one nameserver is configured
    ///
    /// # Errors
    /// Returns an error if the nameserver list is empty
    pub fn validate(&self) -> Result<()> {
        if self.nameservers.is_empty() {
            return Err(Error::config_error("no nameservers configured"));
        }
        Ok(())
    }
}

impl Default for DnsConfig {
    /// No nameservers, with the timeout and retry budget of [`ResolveOptions::new`]
    fn default() -> Self {
        let options = ResolveOptions::new();
        Self {
            nameservers: Vec::new(),
            search_domains: Vec::new(),
            timeout: options.timeout,
            attempts: options.retries,
        }
    }
}

impl std::fmt::Display for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Host resolver:")?;
        let fallbacks = self.fallback_upstreams();
        if fallbacks.is_empty() {
            writeln!(f, "  Fallback upstreams: none")?;
        } else {
            writeln!(f, "  Fallback upstreams:")?;
            for upstream in &fallbacks {
                writeln!(f, "    {upstream}")?;
            }
        }
        if !self.search_domains.is_empty() {
            writeln!(f, "  Search: {}", self.search_domains.join(" "))?;
        }
        write!(
            f,
            "  Per attempt: {:?}, attempts per call: {}",
            self.timeout, self.attempts
        )
    }
}
