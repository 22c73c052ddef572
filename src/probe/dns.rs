//! Reverse name resolution

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::debug;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;

/// PTR lookups that never fail: the input comes back unchanged when no name
/// can be found.
pub struct ReverseResolver {
    resolver: TokioAsyncResolver,
    wait: Duration,
}

impl ReverseResolver {
    pub fn new(wait: Duration) -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });

        Self { resolver, wait }
    }

    pub async fn resolve(&self, host: &str) -> String {
        let Ok(ip) = host.parse::<IpAddr>() else {
            // already a name
            return host.to_string();
        };

        match timeout(self.wait, self.resolver.reverse_lookup(ip)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .next()
                .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| host.to_string()),
            Ok(Err(e)) => {
                debug!("reverse lookup for {} failed: {}", host, e);
                host.to_string()
            }
            Err(_) => {
                debug!("reverse lookup for {} timed out", host);
                host.to_string()
            }
        }
    }
}
