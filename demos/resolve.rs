use std::time::{Duration, Instant};

use dnscache::dns::{DnsConfig, DnsResolver, ResolveOptions, Upstream};

fn main() -> dnscache::Result<()> {
    env_logger::init();

    let system = DnsConfig::system().and_then(|system| {
        system.validate()?;
        Ok(system)
    });
    let fallbacks = match system {
        Ok(system) => {
            println!("{system}");
            system.fallback_upstreams()
        }
        Err(e) => {
            println!("Using root servers as fallbacks: {e}");
            Upstream::root_servers()
        }
    };

    let builder = DnsResolver::builder()
        .cache_ttl(Duration::from_secs(60))
        .sweep_interval(Duration::from_secs(30))
        .fallbacks(fallbacks.clone());
    #[cfg(feature = "hickory")]
    let builder = builder.lookup(dnscache::dns::HickoryLookup::with_upstreams(&fallbacks)?);
    let resolver = builder.build()?;
    println!("{}", resolver.config());

    let options = ResolveOptions::new().recursive(true).retries(3);
    let domains = ["example.com", "github.com", "bücher.example", "nonexistent.invalid"];
    for domain in domains {
        println!("\nResolving {domain}:");

        let started = Instant::now();
        let cold = resolver.resolve(domain, &options);
        let cold_time = started.elapsed();

        let started = Instant::now();
        let warm = resolver.resolve(domain, &options);
        let warm_time = started.elapsed();

        if cold.is_empty() {
            println!("  not resolved ({cold_time:?})");
            continue;
        }
        for address in &cold {
            println!("    {address}");
        }
        println!("  first lookup: {cold_time:?}, cached lookup: {warm_time:?}");
        if warm != cold {
            println!("  cached answer differs: {warm:?}");
        }
        if let Some(ttl) = resolver.cached_ttl(domain) {
            println!("  Cache TTL: {} seconds", ttl.as_secs());
        }
    }

    println!("\n{}", resolver.stats());
    Ok(())
}
