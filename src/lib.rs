#![cfg_attr(docsrs, feature(doc_cfg))]

//! # dnscache
//!
//! A client-side caching resolver that sits in front of a name-resolution
//! capability.
//!
//! This crate provides:
//! - A thread-safe, time-bounded cache of resolved addresses keyed by domain name
//! - A tiered resolution strategy: cache, direct lookup, then fallback upstreams
//! - Bounded retries with backoff and an optional per-call deadline
//! - Single-flight sharing of concurrent lookups for the same name
//!
//! ## Quick Start
//!
//! ```rust
//! use dnscache::dns::{from_fn, DnsResolver, ResolveOptions};
//!
//! let resolver = DnsResolver::builder()
//!     .lookup(from_fn(|_name, _upstream, _timeout| {
//!         Ok(vec!["93.184.216.34".to_string()])
//!     }))
//!     .build()?;
//!
//! let addresses = resolver.resolve("example.com", &ResolveOptions::default());
//! println!("example.com -> {addresses:?}");
//!
//! // The second call is served from the cache
//! assert_eq!(resolver.resolve("example.com", &ResolveOptions::default()), addresses);
//! # Ok::<(), dnscache::Error>(())
//! ```
//!
//! ## Features
//!
//! - `hickory` - Lookups through `hickory-resolver`, including explicit nameserver upstreams
//! - `serde-support` - Enable serialization support for upstreams and statistics

mod error;

pub mod dns;

// Re-export core types
pub use error::{Error, LookupError, Result};

pub use dns::{
    CacheSweeper, DnsCache, DnsConfig, DnsResolver, Lookup, ResolveOptions, StatsSnapshot,
    SystemLookup, Upstream,
};
