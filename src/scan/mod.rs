//! Scan orchestration: target expansion and concurrent host sweeps

pub mod orchestrator;
pub mod target;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::net::Ipv4Addr;

use crate::probe::ProbedService;

pub use orchestrator::ScanOrchestrator;
pub use target::{expand_target, TargetParser, TargetSpec};

/// Findings and counters from one range scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub target: String,
    pub services: Vec<ProbedService>,
    pub hosts_targeted: usize,
    pub hosts_reachable: usize,
    /// Set when the scan stopped early on cancellation
    pub cancelled: bool,
    /// Hosts whose every port was probed before any cancellation
    #[serde(default)]
    pub hosts_scanned: Vec<String>,
}

impl ScanReport {
    pub fn new(target: &str, hosts_targeted: usize) -> Self {
        Self {
            target: target.to_string(),
            hosts_targeted,
            ..Self::default()
        }
    }
}

/// Order hosts numerically when they are IPv4 addresses, by name otherwise
pub fn compare_hosts(a: &str, b: &str) -> Ordering {
    match (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Deterministic result order: host, then port
pub fn sort_services(services: &mut [ProbedService]) {
    services.sort_by(|a, b| compare_hosts(&a.host, &b.host).then(a.port.cmp(&b.port)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sort_services_numeric_hosts() {
        let mut services = vec![
            ProbedService::new("10.0.0.10", "a", 80, Duration::ZERO),
            ProbedService::new("printer", "printer", 9100, Duration::ZERO),
            ProbedService::new("10.0.0.9", "b", 443, Duration::ZERO),
            ProbedService::new("10.0.0.9", "b", 22, Duration::ZERO),
        ];
        sort_services(&mut services);

        let keys: Vec<String> = services.iter().map(ProbedService::key).collect();
        assert_eq!(
            keys,
            vec!["10.0.0.9:22", "10.0.0.9:443", "10.0.0.10:80", "printer:9100"]
        );
    }
}
