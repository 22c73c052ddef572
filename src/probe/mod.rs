//! Probe engine: reachability, reverse names and per-port service probes
//!
//! Every probe is bounded by its own timeout and every negative outcome is a
//! value (`false`, the unchanged host name, `None`), never an error. Closed
//! and silent ports are the normal case on a network sweep.

pub mod dns;
pub mod icmp;
pub mod services;
pub mod tcp;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config::ProbeConfig;
use dns::ReverseResolver;
use icmp::IcmpProbe;

pub use services::{default_ports, extended_ports, service_label, UNKNOWN_SERVICE};

/// One reachable (host, port) as seen by a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbedService {
    pub host: String,
    pub hostname: String,
    pub port: u16,
    pub reachable: bool,
    /// TCP connect time in milliseconds
    pub latency_ms: f64,
    pub service: String,
    pub banner: Option<String>,
}

impl ProbedService {
    pub fn new(host: &str, hostname: &str, port: u16, latency: Duration) -> Self {
        Self {
            host: host.to_string(),
            hostname: hostname.to_string(),
            port,
            reachable: true,
            latency_ms: latency.as_secs_f64() * 1000.0,
            service: service_label(port).to_string(),
            banner: None,
        }
    }

    pub fn with_banner(mut self, banner: Option<String>) -> Self {
        self.banner = banner;
        self
    }

    /// `host:port`, the identity used when comparing runs
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Network probing surface used by the scan orchestrator
#[async_trait]
pub trait Prober: Send + Sync {
    /// One bounded echo; any failure reads as unreachable
    async fn is_reachable(&self, host: &str, timeout: Duration) -> bool;

    /// Reverse name of `host`, or `host` itself when none is found
    async fn resolve_name(&self, host: &str) -> String;

    /// Connect to `port` and describe what answers; `None` when closed
    async fn probe_port(
        &self,
        host: &str,
        hostname: &str,
        port: u16,
        timeout: Duration,
    ) -> Option<ProbedService>;
}

/// Resolve a host string to an address, preferring IPv4
pub async fn resolve_addr(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }

    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => {
            let addrs: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
            addrs
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| addrs.first())
                .copied()
        }
        Err(e) => {
            debug!("could not resolve {}: {}", host, e);
            None
        }
    }
}

/// Production prober speaking ICMP, DNS, TCP and HTTP
pub struct NetworkProber {
    config: ProbeConfig,
    icmp: IcmpProbe,
    dns: ReverseResolver,
    http: Option<reqwest::Client>,
}

impl NetworkProber {
    pub fn new(config: ProbeConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| warn!("HTTP client unavailable, titles disabled: {}", e))
            .ok();

        Self {
            dns: ReverseResolver::new(config.ping_timeout()),
            icmp: IcmpProbe::new(),
            http,
            config,
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn is_reachable(&self, host: &str, timeout: Duration) -> bool {
        match resolve_addr(host).await {
            Some(addr) => self.icmp.echo(addr, timeout).await,
            None => false,
        }
    }

    async fn resolve_name(&self, host: &str) -> String {
        self.dns.resolve(host).await
    }

    async fn probe_port(
        &self,
        host: &str,
        hostname: &str,
        port: u16,
        timeout: Duration,
    ) -> Option<ProbedService> {
        let addr = resolve_addr(host).await?;
        let (mut stream, latency) = tcp::connect(SocketAddr::new(addr, port), timeout).await?;

        let mut banner = tcp::read_banner(&mut stream, self.config.banner_timeout()).await;
        drop(stream);

        if services::is_web_port(port) {
            if let Some(client) = &self.http {
                let tls = services::is_tls_web_port(port);
                if let Some(title) = tcp::fetch_http_title(client, host, port, tls).await {
                    banner = Some(title);
                }
            }
        }

        debug!("{}:{} open ({:.1} ms)", host, port, latency.as_secs_f64() * 1000.0);
        Some(ProbedService::new(host, hostname, port, latency).with_banner(banner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probed_service_defaults() {
        let service = ProbedService::new("10.0.0.5", "nas.lan", 22, Duration::from_millis(12));
        assert_eq!(service.service, "SSH");
        assert!(service.reachable);
        assert_eq!(service.key(), "10.0.0.5:22");
        assert!((service.latency_ms - 12.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_resolve_addr_literal() {
        assert_eq!(
            resolve_addr("192.168.1.10").await,
            Some("192.168.1.10".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_resolve_name_returns_names_unchanged() {
        let prober = NetworkProber::new(ProbeConfig::default());
        assert_eq!(prober.resolve_name("printer").await, "printer");
    }

    #[tokio::test]
    async fn test_probe_local_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let config = ProbeConfig {
            banner_timeout_ms: 100,
            ..ProbeConfig::default()
        };
        let prober = NetworkProber::new(config);
        let service = prober
            .probe_port("127.0.0.1", "localhost", port, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(service.port, port);
        assert_eq!(service.hostname, "localhost");
        assert!(service.banner.is_none());
    }
}
