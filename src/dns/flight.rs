//! Per-name in-flight tracking so concurrent misses share one lookup.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

type Key = (String, bool);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Call {
    result: Mutex<Option<Vec<String>>>,
    done: Condvar,
}

/// Outstanding resolutions, keyed by normalized name and recursion mode
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    calls: Mutex<HashMap<Key, Arc<Call>>>,
}

/// The caller's role for one key
pub(crate) enum Flight<'a> {
    /// No one else is resolving this key; the caller must do the work
    Leader(Leader<'a>),
    /// Another caller is already resolving this key
    Follower(Follower),
}

impl InFlight {
    /// Join the in-flight call for `name`, or start one
    pub(crate) fn join(&self, name: &str, recursive: bool) -> Flight<'_> {
        let key = (name.to_string(), recursive);
        let mut calls = lock(&self.calls);
        if let Some(call) = calls.get(&key) {
            return Flight::Follower(Follower {
                call: Arc::clone(call),
            });
        }

        let call = Arc::new(Call::default());
        calls.insert(key.clone(), Arc::clone(&call));
        Flight::Leader(Leader {
            flights: self,
            key,
            call,
            published: false,
        })
    }

    /// Number of keys currently being resolved
    pub(crate) fn len(&self) -> usize {
        lock(&self.calls).len()
    }
}

/// Held by the caller doing the lookup. Dropping it without calling
/// [`Leader::finish`] releases any followers with an empty answer.
pub(crate) struct Leader<'a> {
    flights: &'a InFlight,
    key: Key,
    call: Arc<Call>,
    published: bool,
}

impl Leader<'_> {
    /// Hand `result` to every follower and clear the in-flight marker
    pub(crate) fn finish(mut self, result: &[String]) {
        self.publish(result.to_vec());
    }

    fn publish(&mut self, result: Vec<String>) {
        if self.published {
            return;
        }
        self.published = true;
        lock(&self.flights.calls).remove(&self.key);
        *lock(&self.call.result) = Some(result);
        self.call.done.notify_all();
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        self.publish(Vec::new());
    }
}

/// Waits for a leader's answer
pub(crate) struct Follower {
    call: Arc<Call>,
}

impl Follower {
    /// Block until the leader publishes. Returns `None` if `deadline` passes first.
    pub(crate) fn wait(self, deadline: Option<Instant>) -> Option<Vec<String>> {
        let mut result = lock(&self.call.result);
        loop {
            if let Some(addresses) = result.as_ref() {
                return Some(addresses.clone());
            }
            result = match deadline {
                None => self
                    .call
                    .done
                    .wait(result)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return None;
                    }
                    self.call
                        .done
                        .wait_timeout(result, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}
