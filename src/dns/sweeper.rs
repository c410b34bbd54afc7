use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace};

use super::cache::DnsCache;
use crate::{Error, Result};

/// Periodically drops expired entries from a [`DnsCache`].
///
/// Sweeping only reclaims memory; lookups never depend on it. The background
/// thread stops when the sweeper is stopped or dropped.
pub struct CacheSweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl CacheSweeper {
    /// Start sweeping `cache` every `interval`
    ///
    /// # Errors
    /// Returns an error if `interval` is zero or the thread cannot be spawned
    pub fn start(cache: DnsCache, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::config_error("sweep interval must be non-zero"));
        }

        let (stop_tx, stop_rx) = channel::<()>();
        let handle = thread::Builder::new()
            .name("dns-cache-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = cache.sweep_expired();
                        trace!("sweeper pass removed {removed} entries");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!("cache sweeper started with interval {interval:?}");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    /// Returns true while the background thread is running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the background thread and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("cache sweeper stopped");
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CacheSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSweeper")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
