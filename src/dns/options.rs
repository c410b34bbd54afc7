use std::time::{Duration, Instant};

/// Per-call settings for [`DnsResolver::resolve`](crate::dns::DnsResolver::resolve)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Consult and populate the cache
    pub use_cache: bool,
    /// Try the fallback upstreams after the direct lookup fails
    pub recursive: bool,
    /// Maximum number of lookup attempts for this call
    pub retries: u32,
    /// Advisory timeout handed to each lookup attempt
    pub timeout: Duration,
    /// Point after which no further attempts are started
    pub deadline: Option<Instant>,
    /// Cache lifetime for this call's answer, overriding the resolver default
    pub ttl: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveOptions {
    /// Options with caching on, recursion off, 3 retries and a 5 second timeout
    #[must_use]
    pub const fn new() -> Self {
        Self {
            use_cache: true,
            recursive: false,
            retries: 3,
            timeout: Duration::from_secs(5),
            deadline: None,
            ttl: None,
        }
    }

    /// Enable or disable the cache
    #[must_use]
    pub const fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Enable or disable the fallback upstream loop
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the maximum number of lookup attempts
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop starting new attempts once `deadline` has passed
    #[must_use]
    pub const fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now
    ///
    /// A budget too large to represent as an `Instant` leaves the call
    /// without a deadline.
    #[must_use]
    pub fn deadline_in(self, budget: Duration) -> Self {
        match Instant::now().checked_add(budget) {
            Some(deadline) => self.deadline(deadline),
            None => self,
        }
    }

    /// Cache this call's answer for `ttl` instead of the resolver default
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Time left before the deadline, `None` when there is no deadline
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Timeout for the next attempt, clamped to the deadline
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        self.remaining()
            .map_or(self.timeout, |left| left.min(self.timeout))
    }
}
