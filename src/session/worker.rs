//! The single consumer of the scan queue

use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::InventoryError;
use crate::scan::{ScanOrchestrator, ScanReport};
use crate::session::models::{DiscoveredService, ScanRequest, SessionCounters, SessionStatus};
use crate::store::{Store, Tables};

/// Result of inactive-marking reconciliation for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InactiveMarking {
    /// Prior rows whose host:port did not show up this run
    pub vanished: usize,
    /// Prior rows replaced by a row of this run
    pub superseded: usize,
}

/// Executes queued scans one at a time
pub struct ScanWorker {
    store: Arc<Store>,
    orchestrator: ScanOrchestrator,
    queue: mpsc::UnboundedReceiver<ScanRequest>,
    config: WorkerConfig,
}

impl ScanWorker {
    pub fn new(
        store: Arc<Store>,
        orchestrator: ScanOrchestrator,
        queue: mpsc::UnboundedReceiver<ScanRequest>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            queue,
            config,
        }
    }

    /// Consume requests until `shutdown` fires or every sender is gone.
    ///
    /// A failed iteration is logged and the loop continues; storage failures
    /// additionally pause for `idle_backoff` before the next receive.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Scan worker started");

        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let id = request.session_id;
            match self.process(request, &shutdown).await {
                Ok(status) => info!("Session {} {}", id, status),
                Err(e @ (InventoryError::Storage(_) | InventoryError::Io(_) | InventoryError::Serialization(_))) => {
                    error!("Session {}: store failure: {}", id, e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_backoff()) => {}
                    }
                }
                Err(e) => warn!("Session {} skipped: {}", id, e),
            }
        }

        info!("Scan worker stopped");
    }

    /// Run one queued session to a terminal state
    pub async fn process(&self, request: ScanRequest, shutdown: &CancellationToken) -> crate::Result<SessionStatus> {
        let id = request.session_id;
        self.store.write().await.transition_session(id, SessionStatus::Running)?;
        info!("Session {} running: {} ({})", id, request.target, request.scan_type);

        let orchestrator = self.orchestrator.clone();
        let cancel = shutdown.clone();
        let scan = tokio::spawn(async move {
            orchestrator
                .scan_range_report(&request.target, &request.ports, request.full_scan, &cancel)
                .await
        });

        let outcome = match scan.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("scan task aborted: {}", e)),
        };

        let status = {
            let mut tables = self.store.write().await;
            match outcome {
                Ok(report) => {
                    let counters = record_results(&mut tables, id, report)?;
                    let session = tables.transition_session(id, SessionStatus::Completed)?;
                    session.hosts_targeted = counters.hosts_targeted;
                    session.hosts_reachable = counters.hosts_reachable;
                    session.services_found = counters.services_found;
                    session.services_inactivated = counters.services_inactivated;
                    SessionStatus::Completed
                }
                Err(message) => {
                    error!("Session {} failed: {}", id, message);
                    let session = tables.transition_session(id, SessionStatus::Failed)?;
                    session.error = Some(message);
                    SessionStatus::Failed
                }
            }
        };

        self.store.flush().await?;
        Ok(status)
    }
}

/// Persist a run's findings under its session and reconcile the target
fn record_results(tables: &mut Tables, session_id: Uuid, report: ScanReport) -> crate::Result<SessionCounters> {
    let target = tables
        .sessions
        .get(&session_id)
        .map(|s| s.target.clone())
        .ok_or_else(|| InventoryError::not_found("session", session_id))?;

    let mut counters = SessionCounters::from_report(&report, 0);
    let scope: Option<HashSet<String>> = report
        .cancelled
        .then(|| report.hosts_scanned.iter().cloned().collect());
    tables.services.extend(
        report
            .services
            .into_iter()
            .map(|probe| DiscoveredService::from_probe(session_id, probe)),
    );

    let marking = mark_inactive(tables, &target, session_id, scope.as_ref());
    counters.services_inactivated = marking.vanished;

    if marking.vanished > 0 || marking.superseded > 0 {
        info!(
            "{}: {} service(s) vanished, {} superseded",
            target, marking.vanished, marking.superseded
        );
    }
    Ok(counters)
}

/// Flip prior active rows of `target` inactive, leaving only the rows of
/// `current` active. Running it again with the same current rows changes
/// nothing.
///
/// With a `scope`, only rows on those hosts may be counted as vanished;
/// rows on other hosts stay active unless `current` found them again.
pub fn mark_inactive(
    tables: &mut Tables,
    target: &str,
    current: Uuid,
    scope: Option<&HashSet<String>>,
) -> InactiveMarking {
    let prior_sessions: HashSet<Uuid> = tables
        .sessions
        .values()
        .filter(|s| s.target == target && s.id != current)
        .map(|s| s.id)
        .collect();

    let current_keys: HashSet<String> = tables.services_for(current).map(DiscoveredService::key).collect();

    let mut marking = InactiveMarking::default();
    for service in tables
        .services
        .iter_mut()
        .filter(|s| s.active && prior_sessions.contains(&s.session_id))
    {
        if current_keys.contains(&service.key()) {
            service.active = false;
            marking.superseded += 1;
        } else if scope.map_or(true, |hosts| hosts.contains(&service.host)) {
            service.active = false;
            marking.vanished += 1;
        }
    }
    marking
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbedService;
    use crate::session::models::{ScanSession, ScanType};
    use std::time::Duration;

    fn completed_session(tables: &mut Tables, target: &str, ports: &[u16]) -> Uuid {
        let session = ScanSession::new(&ScanRequest::new(target, ScanType::Quick, None, None));
        let id = session.id;
        tables.sessions.insert(id, session);
        for &port in ports {
            let probe = ProbedService::new(target, target, port, Duration::from_millis(2));
            tables.services.push(DiscoveredService::from_probe(id, probe));
        }
        id
    }

    fn active_keys(tables: &Tables) -> Vec<(Uuid, String)> {
        let mut keys: Vec<(Uuid, String)> = tables
            .services
            .iter()
            .filter(|s| s.active)
            .map(|s| (s.session_id, s.key()))
            .collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_mark_inactive_vanished_and_superseded() {
        let mut tables = Tables::default();
        completed_session(&mut tables, "web1", &[80, 443]);
        let current = completed_session(&mut tables, "web1", &[80]);

        let marking = mark_inactive(&mut tables, "web1", current, None);
        assert_eq!(marking, InactiveMarking { vanished: 1, superseded: 1 });
        assert_eq!(active_keys(&tables), vec![(current, "web1:80".to_string())]);
    }

    #[test]
    fn test_mark_inactive_is_idempotent() {
        let mut tables = Tables::default();
        completed_session(&mut tables, "web1", &[22, 80]);
        let current = completed_session(&mut tables, "web1", &[22]);

        mark_inactive(&mut tables, "web1", current, None);
        let after_first = active_keys(&tables);

        let second = mark_inactive(&mut tables, "web1", current, None);
        assert_eq!(second, InactiveMarking::default());
        assert_eq!(active_keys(&tables), after_first);
    }

    #[test]
    fn test_other_targets_untouched() {
        let mut tables = Tables::default();
        let other = completed_session(&mut tables, "db1", &[5432]);
        let current = completed_session(&mut tables, "web1", &[80]);

        mark_inactive(&mut tables, "web1", current, None);
        assert!(tables.services_for(other).all(|s| s.active));
    }

    #[test]
    fn test_cancelled_run_only_vanishes_scanned_hosts() {
        let mut tables = Tables::default();
        let target = "10.0.0.0/30";
        let rows = [("10.0.0.1", 22), ("10.0.0.1", 80), ("10.0.0.2", 443)];

        let first = ScanSession::new(&ScanRequest::new(target, ScanType::Quick, None, None));
        let first_id = first.id;
        tables.sessions.insert(first_id, first);
        for (host, port) in rows {
            let probe = ProbedService::new(host, host, port, Duration::from_millis(2));
            tables.services.push(DiscoveredService::from_probe(first_id, probe));
        }

        // cancelled after .1 was scanned; .2 was never reached
        let current = ScanSession::new(&ScanRequest::new(target, ScanType::Quick, None, None));
        let current_id = current.id;
        tables.sessions.insert(current_id, current);
        let probe = ProbedService::new("10.0.0.1", "10.0.0.1", 22, Duration::from_millis(2));
        tables.services.push(DiscoveredService::from_probe(current_id, probe));

        let scope: HashSet<String> = ["10.0.0.1".to_string()].into_iter().collect();
        let marking = mark_inactive(&mut tables, target, current_id, Some(&scope));

        assert_eq!(marking, InactiveMarking { vanished: 1, superseded: 1 });

        let mut expected = vec![
            (first_id, "10.0.0.2:443".to_string()),
            (current_id, "10.0.0.1:22".to_string()),
        ];
        expected.sort();
        assert_eq!(active_keys(&tables), expected);
    }
}
