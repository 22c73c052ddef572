//! Host and range scanning on top of a [`Prober`]

use futures::future::join_all;
use log::{debug, error, info};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::InventoryConfig;
use crate::probe::{default_ports, extended_ports, ProbedService, Prober};
use crate::scan::target::TargetParser;
use crate::scan::{compare_hosts, sort_services, ScanReport};

/// What one host contributed to a range scan
#[derive(Debug, Default)]
struct HostOutcome {
    reachable: bool,
    services: Vec<ProbedService>,
}

/// Expands targets and drives the prober across hosts and ports.
///
/// Cheap to clone: every spawned host task carries its own handle.
#[derive(Clone)]
pub struct ScanOrchestrator {
    prober: Arc<dyn Prober>,
    parser: TargetParser,
    config: Arc<InventoryConfig>,
}

impl ScanOrchestrator {
    pub fn new(prober: Arc<dyn Prober>, config: &InventoryConfig) -> Self {
        Self {
            prober,
            parser: TargetParser::from_limits(&config.scan),
            config: Arc::new(config.clone()),
        }
    }

    /// Expand a target using the configured limits
    pub fn expand_target(&self, target: &str) -> crate::Result<Vec<String>> {
        self.parser.expand(target)
    }

    /// Ports a scan will probe. Explicit ports win, then the full-scan list,
    /// then the configured or built-in defaults.
    pub fn resolve_ports(&self, ports: &[u16], full_scan: bool) -> Vec<u16> {
        let explicit: BTreeSet<u16> = ports.iter().copied().filter(|&p| p != 0).collect();
        if !explicit.is_empty() {
            return explicit.into_iter().collect();
        }

        if full_scan {
            return extended_ports();
        }

        match &self.config.scan.default_ports {
            Some(ports) if !ports.is_empty() => ports.clone(),
            _ => default_ports(),
        }
    }

    /// Scan one host. An unreachable host yields nothing and no port is
    /// probed; otherwise its ports are probed concurrently.
    pub async fn scan_host(
        &self,
        host: &str,
        ports: &[u16],
        full_scan: bool,
        cancel: &CancellationToken,
    ) -> Vec<ProbedService> {
        let ports = self.resolve_ports(ports, full_scan);
        self.probe_host(host, &ports, cancel).await.services
    }

    async fn probe_host(&self, host: &str, ports: &[u16], cancel: &CancellationToken) -> HostOutcome {
        if cancel.is_cancelled() {
            return HostOutcome::default();
        }

        let probe = &self.config.probe;
        if !self.prober.is_reachable(host, probe.ping_timeout()).await {
            debug!("{} did not answer, skipping port probes", host);
            return HostOutcome::default();
        }

        let hostname = self.prober.resolve_name(host).await;
        let connect_timeout = probe.connect_timeout();

        let probes = ports.iter().map(|&port| {
            let hostname = hostname.as_str();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                self.prober.probe_port(host, hostname, port, connect_timeout).await
            }
        });

        let mut services: Vec<ProbedService> = join_all(probes).await.into_iter().flatten().collect();
        services.sort_by_key(|s| s.port);

        debug!("{} reachable, {} open port(s)", host, services.len());
        HostOutcome {
            reachable: true,
            services,
        }
    }

    /// Scan every host a target expands to
    pub async fn scan_range(
        &self,
        target: &str,
        ports: &[u16],
        full_scan: bool,
        cancel: &CancellationToken,
    ) -> crate::Result<Vec<ProbedService>> {
        Ok(self.scan_range_report(target, ports, full_scan, cancel).await?.services)
    }

    /// Scan a target with bounded host concurrency and report counters with
    /// the findings. Cancellation stops new hosts from starting; hosts
    /// already in flight finish.
    pub async fn scan_range_report(
        &self,
        target: &str,
        ports: &[u16],
        full_scan: bool,
        cancel: &CancellationToken,
    ) -> crate::Result<ScanReport> {
        let start = Instant::now();
        let hosts = self.expand_target(target)?;
        let ports = Arc::new(self.resolve_ports(ports, full_scan));

        info!(
            "Scanning {} ({} host(s), {} port(s) each)",
            target,
            hosts.len(),
            ports.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.scan.host_concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, bool, HostOutcome)>();
        let mut handles = Vec::with_capacity(hosts.len());

        for host in &hosts {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let orchestrator = self.clone();
            let sender = tx.clone();
            let ports = ports.clone();
            let cancel = cancel.clone();
            let host = host.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = orchestrator.probe_host(&host, &ports, &cancel).await;
                let complete = !cancel.is_cancelled();
                let _ = sender.send((host, complete, outcome));
            }));
        }

        drop(tx);

        let mut report = ScanReport::new(target, hosts.len());
        while let Some((host, complete, outcome)) = rx.recv().await {
            if complete {
                report.hosts_scanned.push(host);
            }
            if outcome.reachable {
                report.hosts_reachable += 1;
            }
            report.services.extend(outcome.services);
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("host scan task failed: {}", e);
            }
        }

        report.cancelled = cancel.is_cancelled();
        sort_services(&mut report.services);
        report.hosts_scanned.sort_by(|a, b| compare_hosts(a, b));

        info!(
            "Scan of {} finished in {:.2}s: {}/{} host(s) up, {} service(s)",
            target,
            start.elapsed().as_secs_f64(),
            report.hosts_reachable,
            report.hosts_targeted,
            report.services.len()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct LocalOnly;

    #[async_trait]
    impl Prober for LocalOnly {
        async fn is_reachable(&self, host: &str, _timeout: Duration) -> bool {
            host == "10.0.0.1"
        }

        async fn resolve_name(&self, host: &str) -> String {
            host.to_string()
        }

        async fn probe_port(
            &self,
            host: &str,
            hostname: &str,
            port: u16,
            _timeout: Duration,
        ) -> Option<ProbedService> {
            (port == 22).then(|| ProbedService::new(host, hostname, port, Duration::from_millis(1)))
        }
    }

    fn orchestrator() -> ScanOrchestrator {
        ScanOrchestrator::new(Arc::new(LocalOnly), &InventoryConfig::default())
    }

    #[test]
    fn test_resolve_ports() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.resolve_ports(&[443, 22, 22, 0], false), vec![22, 443]);
        assert_eq!(orchestrator.resolve_ports(&[], false), default_ports());
        assert_eq!(orchestrator.resolve_ports(&[], true), extended_ports());
    }

    #[test]
    fn test_configured_default_ports() {
        let mut config = InventoryConfig::default();
        config.scan.default_ports = Some(vec![8080]);
        let orchestrator = ScanOrchestrator::new(Arc::new(LocalOnly), &config);
        assert_eq!(orchestrator.resolve_ports(&[], false), vec![8080]);
    }

    #[tokio::test]
    async fn test_scan_range_report_counts() {
        let report = orchestrator()
            .scan_range_report("10.0.0.0/30", &[22, 80], false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.hosts_targeted, 2);
        assert_eq!(report.hosts_reachable, 1);
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.services[0].key(), "10.0.0.1:22");
        assert!(!report.cancelled);
        assert_eq!(report.hosts_scanned, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator()
            .scan_range_report("10.0.0.0/30", &[22], false, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.services.is_empty());
        assert!(report.hosts_scanned.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_target_is_error() {
        let result = orchestrator()
            .scan_range("10.0.0.0/40", &[22], false, &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
