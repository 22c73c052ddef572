//! Scripted prober shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use netledger::probe::{ProbedService, Prober};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct ScriptedHost {
    name: Option<String>,
    open: Vec<u16>,
}

/// Answers from a fixed table instead of the network and records every call
#[derive(Default)]
pub struct ScriptedProber {
    hosts: Mutex<HashMap<String, ScriptedHost>>,
    panic_on: Option<String>,
    ping_delay: Duration,
    pub pings: Mutex<Vec<String>>,
    pub lookups: Mutex<Vec<String>>,
    pub port_probes: Mutex<Vec<(String, u16)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reachable host with these ports open
    pub fn host(self, host: &str, open: &[u16]) -> Self {
        self.set_host(host, open);
        self
    }

    pub fn named(self, host: &str, name: &str, open: &[u16]) -> Self {
        self.hosts.lock().unwrap().insert(
            host.to_string(),
            ScriptedHost {
                name: Some(name.to_string()),
                open: open.to_vec(),
            },
        );
        self
    }

    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = delay;
        self
    }

    pub fn panic_on(mut self, host: &str) -> Self {
        self.panic_on = Some(host.to_string());
        self
    }

    /// Change what a host answers between scans
    pub fn set_host(&self, host: &str, open: &[u16]) {
        self.hosts.lock().unwrap().insert(
            host.to_string(),
            ScriptedHost {
                name: None,
                open: open.to_vec(),
            },
        );
    }

    pub fn probes_for(&self, host: &str) -> Vec<u16> {
        self.port_probes
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn is_reachable(&self, host: &str, _timeout: Duration) -> bool {
        self.pings.lock().unwrap().push(host.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.ping_delay.is_zero() {
            tokio::time::sleep(self.ping_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.as_deref() == Some(host) {
            panic!("scripted failure for {}", host);
        }
        self.hosts.lock().unwrap().contains_key(host)
    }

    async fn resolve_name(&self, host: &str) -> String {
        self.lookups.lock().unwrap().push(host.to_string());
        self.hosts
            .lock()
            .unwrap()
            .get(host)
            .and_then(|h| h.name.clone())
            .unwrap_or_else(|| host.to_string())
    }

    async fn probe_port(
        &self,
        host: &str,
        hostname: &str,
        port: u16,
        _timeout: Duration,
    ) -> Option<ProbedService> {
        self.port_probes.lock().unwrap().push((host.to_string(), port));
        let open = self
            .hosts
            .lock()
            .unwrap()
            .get(host)
            .map(|h| h.open.contains(&port))
            .unwrap_or(false);

        open.then(|| ProbedService::new(host, hostname, port, Duration::from_millis(3)))
    }
}
