//! Integration tests for the caching resolver

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dnscache::dns::{from_fn, DnsCache, DnsResolver, ResolveOptions, Upstream};
use dnscache::{Error, LookupError};
use proptest::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn addrs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// Build a resolver whose lookup always answers `answer` and counts calls
fn counting_resolver(answer: &'static [&'static str]) -> (DnsResolver, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = DnsResolver::builder()
        .lookup(from_fn(move |_name, _upstream, _timeout| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(addrs(answer))
        }))
        .retry_backoff(Duration::ZERO)
        .build()
        .expect("Failed to build resolver");
    (resolver, calls)
}

/// Put then get returns the stored addresses
#[test]
fn test_cache_put_get_example() {
    let cache = DnsCache::new();
    cache.put(
        "example.com",
        addrs(&["93.184.216.34"]),
        Duration::from_secs(300),
    );
    assert_eq!(cache.get("example.com"), Some(addrs(&["93.184.216.34"])));
}

/// Entries stop being served once their TTL has elapsed
#[test]
fn test_cache_expiry_through_resolver() {
    init_logging();
    let (resolver, calls) = counting_resolver(&["10.0.0.1"]);
    let options = ResolveOptions::new().ttl(Duration::from_millis(50));

    resolver.resolve("expire.test", &options);
    resolver.resolve("expire.test", &options);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(120));
    assert_eq!(resolver.cache().get("expire.test"), None);

    resolver.resolve("expire.test", &options);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A cache hit never reaches the lookup capability
#[test]
fn test_cache_hit_bypasses_lookup() {
    init_logging();
    let (resolver, calls) = counting_resolver(&["10.0.0.2"]);
    let options = ResolveOptions::default();

    resolver.resolve("bypass.test", &options);
    let after_first = calls.load(Ordering::SeqCst);

    for _ in 0..10 {
        assert_eq!(resolver.resolve("bypass.test", &options), addrs(&["10.0.0.2"]));
    }
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
    assert_eq!(resolver.stats().cache_hits, 10);
}

/// Identical calls against an unchanged cache give identical answers
#[test]
fn test_resolve_is_idempotent() {
    let (resolver, _calls) = counting_resolver(&["10.0.0.3", "10.0.0.4"]);
    let options = ResolveOptions::new().use_cache(false);

    let first = resolver.resolve("same.test", &options);
    let second = resolver.resolve("same.test", &options);
    assert_eq!(first, second);
    assert_eq!(first, addrs(&["10.0.0.3", "10.0.0.4"]));
}

/// Disabling the cache leaves it untouched
#[test]
fn test_resolve_without_cache() {
    let (resolver, _calls) = counting_resolver(&["93.184.216.34", "93.184.216.35"]);
    let options = ResolveOptions::new().use_cache(false);

    let result = resolver.resolve("example.com", &options);
    assert_eq!(result, addrs(&["93.184.216.34", "93.184.216.35"]));
    assert_eq!(resolver.cache().get("example.com"), None);
}

/// A failed first attempt is retried and the answer is cached
#[test]
fn test_retry_after_failure() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = DnsResolver::builder()
        .lookup(from_fn(move |name, _upstream, _timeout| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LookupError::Transient(format!("{name}: connection refused")))
            } else {
                Ok(addrs(&["10.0.0.1"]))
            }
        }))
        .retry_backoff(Duration::ZERO)
        .build()
        .unwrap();

    resolver.clear_cache();
    let options = ResolveOptions::new().use_cache(true).retries(2);
    assert_eq!(resolver.resolve("x.test", &options), addrs(&["10.0.0.1"]));
    assert_eq!(resolver.cache().get("x.test"), Some(addrs(&["10.0.0.1"])));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// When every upstream fails, at most `retries` attempts are made
#[test]
fn test_fallback_exhaustion_respects_retry_budget() {
    init_logging();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let resolver = DnsResolver::builder()
        .lookup(from_fn(move |name, upstream, _timeout| {
            log.lock().unwrap().push(*upstream);
            Err(LookupError::NotFound(name.to_string()))
        }))
        .fallbacks(Upstream::root_servers())
        .retry_backoff(Duration::ZERO)
        .build()
        .unwrap();

    for k in 0..6u32 {
        seen.lock().unwrap().clear();
        let options = ResolveOptions::new().recursive(true).retries(k);
        assert!(resolver.resolve("nowhere.test", &options).is_empty());

        let attempts = seen.lock().unwrap().clone();
        // Direct plus three fallbacks caps the plan at four attempts
        assert_eq!(attempts.len(), (k as usize).min(4));
        if let Some(first) = attempts.first() {
            assert_eq!(*first, Upstream::System);
        }
        assert_eq!(
            attempts.iter().skip(1).copied().collect::<Vec<_>>(),
            Upstream::root_servers()
                .into_iter()
                .take(attempts.len().saturating_sub(1))
                .collect::<Vec<_>>()
        );
    }
    assert!(resolver.cache().is_empty());
}

/// The first fallback that answers wins and later ones are not queried
#[test]
fn test_fallback_answer_is_used() {
    let second = Upstream::root_servers()[1];
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = DnsResolver::builder()
        .lookup(from_fn(move |name, upstream, _timeout| {
            counter.fetch_add(1, Ordering::SeqCst);
            if *upstream == second {
                Ok(addrs(&["10.2.2.2"]))
            } else {
                Err(LookupError::NotFound(name.to_string()))
            }
        }))
        .fallbacks(Upstream::root_servers())
        .retry_backoff(Duration::ZERO)
        .build()
        .unwrap();

    let options = ResolveOptions::new().recursive(true).retries(10);
    assert_eq!(resolver.resolve("fb.test", &options), addrs(&["10.2.2.2"]));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Non-recursive calls never leave the direct upstream
    let options = ResolveOptions::new().use_cache(false).retries(2);
    assert!(resolver.resolve("fb.test", &options).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

fn answer_for(name: &str) -> Vec<String> {
    vec![format!("{name}.v4"), format!("{name}.v6")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Names written from many threads with random interleavings all read back intact
    #[test]
    fn prop_concurrent_put_get(
        writes in prop::collection::vec(("[a-z][a-z0-9]{0,11}\\.test", 0u64..400), 1..32)
    ) {
        let cache = DnsCache::new();
        let start = Arc::new(Barrier::new(writes.len()));

        let writers: Vec<_> = writes
            .iter()
            .cloned()
            .map(|(name, delay)| {
                let cache = cache.clone();
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    thread::sleep(Duration::from_micros(delay));
                    let answer = answer_for(&name);
                    cache.put(name, answer, Duration::from_secs(60));
                })
            })
            .collect();
        for writer in writers {
            writer.join().expect("Failed to join writer");
        }

        let distinct: HashSet<String> = writes.into_iter().map(|(name, _)| name).collect();
        let readers: Vec<_> = distinct
            .iter()
            .cloned()
            .map(|name| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let entry = cache.get(&name);
                    (name, entry)
                })
            })
            .collect();
        for reader in readers {
            let (name, entry) = reader.join().expect("Failed to join reader");
            prop_assert_eq!(entry, Some(answer_for(&name)));
        }
        prop_assert_eq!(cache.len(), distinct.len());
    }
}

/// Concurrent misses for one name share a single lookup
#[test]
fn test_single_flight_coalesces_lookups() {
    init_logging();
    const CALLERS: usize = 8;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = Arc::new(
        DnsResolver::builder()
            .lookup(from_fn(move |_name, _upstream, _timeout| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
                Ok(addrs(&["10.3.3.3"]))
            }))
            .build()
            .unwrap(),
    );
    let start = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                resolver.resolve("popular.test", &ResolveOptions::default())
            })
        })
        .collect();

    let results: HashSet<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.len(), 1);
    assert!(results.contains(&addrs(&["10.3.3.3"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A caller waiting on a failed lookup still spends its own retry budget
#[test]
fn test_follower_retries_after_leader_fails() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = Arc::new(
        DnsResolver::builder()
            .lookup(from_fn(move |name, _upstream, _timeout| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
                if call == 0 {
                    Err(LookupError::NotFound(name.to_string()))
                } else {
                    Ok(addrs(&["10.0.0.1"]))
                }
            }))
            .retry_backoff(Duration::ZERO)
            .build()
            .expect("Failed to build resolver"),
    );

    let leader = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.resolve("flaky.test", &ResolveOptions::new().retries(1)))
    };
    thread::sleep(Duration::from_millis(20));
    let follower = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.resolve("flaky.test", &ResolveOptions::new().retries(3)))
    };

    assert!(leader.join().expect("Failed to join leader").is_empty());
    assert_eq!(
        follower.join().expect("Failed to join follower"),
        addrs(&["10.0.0.1"])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(resolver.cache().get("flaky.test"), Some(addrs(&["10.0.0.1"])));
}

/// Without single-flight every concurrent miss still gets a full answer
#[test]
fn test_concurrent_resolve_without_single_flight() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = Arc::new(
        DnsResolver::builder()
            .lookup(from_fn(move |name, _upstream, _timeout| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(vec![format!("{name}.addr")])
            }))
            .single_flight(false)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || resolver.resolve("race.test", &ResolveOptions::default()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec!["race.test.addr".to_string()]);
    }
    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(resolver.cache().len(), 1);
}

/// The deadline stops the retry loop, including its backoff
#[test]
fn test_deadline_cuts_retries_short() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = DnsResolver::builder()
        .lookup(from_fn(move |name, _upstream, _timeout| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LookupError::NotFound(name.to_string()))
        }))
        .retry_backoff(Duration::from_secs(1))
        .build()
        .unwrap();

    let started = Instant::now();
    let options = ResolveOptions::new()
        .retries(10)
        .deadline_in(Duration::from_millis(200));
    let result = resolver.try_resolve("slow.test", &options);

    assert!(matches!(result, Err(Error::NotResolved { .. })));
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Malformed names come back empty without touching the lookup
#[test]
fn test_malformed_name() {
    let (resolver, calls) = counting_resolver(&["10.0.0.9"]);
    assert!(resolver.resolve("bad..name", &ResolveOptions::default()).is_empty());
    assert!(resolver.resolve("   ", &ResolveOptions::default()).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// The background sweeper reclaims expired entries
#[test]
fn test_background_sweeper() {
    let resolver = DnsResolver::builder()
        .lookup(from_fn(|_name, _upstream, _timeout| Ok(addrs(&["10.4.4.4"]))))
        .cache_ttl(Duration::from_millis(20))
        .sweep_interval(Duration::from_millis(25))
        .build()
        .unwrap();
    assert!(resolver.is_sweeping());

    resolver.resolve("swept.test", &ResolveOptions::default());
    thread::sleep(Duration::from_millis(200));
    assert!(resolver.cache().is_empty());
}
