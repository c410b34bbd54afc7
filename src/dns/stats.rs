use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Counters updated by the resolver as calls go through it
#[derive(Debug, Default)]
pub struct ResolverStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    lookups: AtomicU64,
    failed_lookups: AtomicU64,
    fallback_hits: AtomicU64,
    coalesced: AtomicU64,
}

impl ResolverStats {
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self, succeeded: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_lookups.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            failed_lookups: self.failed_lookups.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`ResolverStats`] at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct StatsSnapshot {
    /// Calls answered from the cache
    pub cache_hits: u64,
    /// Cache-using calls that found nothing fresh
    pub cache_misses: u64,
    /// Lookup attempts made against any upstream
    pub lookups: u64,
    /// Lookup attempts that produced no addresses
    pub failed_lookups: u64,
    /// Calls answered by a fallback upstream
    pub fallback_hits: u64,
    /// Calls that waited on another caller's in-flight lookup
    pub coalesced: u64,
}

impl StatsSnapshot {
    /// Fraction of cache-using calls answered from the cache
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Resolver Statistics:")?;
        writeln!(
            f,
            "  Cache: {} hits, {} misses ({:.1}% hit ratio)",
            self.cache_hits,
            self.cache_misses,
            self.hit_ratio() * 100.0
        )?;
        writeln!(
            f,
            "  Lookups: {} ({} failed)",
            self.lookups, self.failed_lookups
        )?;
        writeln!(f, "  Fallback hits: {}", self.fallback_hits)?;
        writeln!(f, "  Coalesced calls: {}", self.coalesced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ResolverStats::default();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_cache_miss();
        stats.record_cache_miss();
        stats.record_lookup(false);
        stats.record_lookup(true);
        stats.record_fallback_hit();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.lookups, 2);
        assert_eq!(snapshot.failed_lookups, 1);
        assert_eq!(snapshot.fallback_hits, 1);
        assert_eq!(snapshot.coalesced, 0);
        assert!((snapshot.hit_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_ratio() {
        assert!(StatsSnapshot::default().hit_ratio().abs() < f64::EPSILON);
    }
}
