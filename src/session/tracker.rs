//! Submission and query side of the scan queue

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::scan::{compare_hosts, TargetParser};
use crate::session::models::{
    DiscoveredService, ScanRequest, ScanSession, ScanType, ServiceEnrichment, SessionStatus,
};
use crate::store::Store;

const WAIT_POLL: Duration = Duration::from_millis(50);

/// What the restart sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Creates sessions, feeds the worker queue and answers status queries
#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<Store>,
    queue: mpsc::UnboundedSender<ScanRequest>,
    parser: TargetParser,
}

impl SessionTracker {
    pub fn new(store: Arc<Store>, queue: mpsc::UnboundedSender<ScanRequest>, parser: TargetParser) -> Self {
        Self { store, queue, parser }
    }

    /// Validate, record a pending session and enqueue it. Returns as soon as
    /// the request is queued.
    pub async fn start_scan(
        &self,
        target: &str,
        scan_type: ScanType,
        ports: Option<Vec<u16>>,
        full_scan: Option<bool>,
    ) -> crate::Result<Uuid> {
        self.parser.parse(target)?;

        if scan_type == ScanType::Custom && ports.as_ref().map_or(true, Vec::is_empty) {
            return Err(InventoryError::Validation(
                "custom scans need at least one port".to_string(),
            ));
        }

        let session = ScanSession::new(&ScanRequest::new(target, scan_type, ports, full_scan));
        let id = session.id;
        let request = session.request();

        self.store.write().await.sessions.insert(id, session);
        if let Err(e) = self.store.flush().await {
            error!("failed to persist session {}: {}", id, e);
        }

        self.enqueue(request);
        info!("Queued {} scan of {} as session {}", scan_type, target.trim(), id);
        Ok(id)
    }

    fn enqueue(&self, request: ScanRequest) {
        let id = request.session_id;
        if self.queue.send(request).is_err() {
            // the session stays pending and is picked up by the next restart sweep
            warn!("scan queue is closed, session {} left pending", id);
        }
    }

    pub async fn get_status(&self, id: Uuid) -> Option<ScanSession> {
        self.store.read().await.sessions.get(&id).cloned()
    }

    /// Newest sessions first
    pub async fn get_recent_scans(&self, limit: usize) -> Vec<ScanSession> {
        let tables = self.store.read().await;
        let mut sessions: Vec<ScanSession> = tables.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        sessions
    }

    /// Services of one session ordered by host, then port
    pub async fn get_results(&self, id: Uuid) -> Vec<DiscoveredService> {
        let tables = self.store.read().await;
        let mut services: Vec<DiscoveredService> = tables.services_for(id).cloned().collect();
        sort_by_host_port(&mut services);
        services
    }

    /// Services of the most recent completed session for `target`
    pub async fn get_latest_for_target(&self, target: &str) -> Vec<DiscoveredService> {
        let target = target.trim();
        let latest = {
            let tables = self.store.read().await;
            tables
                .sessions
                .values()
                .filter(|s| s.target == target && s.status == SessionStatus::Completed)
                .max_by_key(|s| (s.completed_at, s.created_at))
                .map(|s| s.id)
        };

        match latest {
            Some(id) => self.get_results(id).await,
            None => Vec::new(),
        }
    }

    /// Attach externally produced enrichment to a discovered service
    pub async fn enrich_service(
        &self,
        service_id: Uuid,
        enrichment: ServiceEnrichment,
    ) -> crate::Result<DiscoveredService> {
        let updated = {
            let mut tables = self.store.write().await;
            let service = tables
                .services
                .iter_mut()
                .find(|s| s.id == service_id)
                .ok_or_else(|| InventoryError::not_found("service", service_id))?;
            service.enrichment = Some(enrichment);
            service.clone()
        };

        self.store.flush().await?;
        Ok(updated)
    }

    /// Poll until the session reaches a terminal state or `timeout` elapses
    pub async fn wait_for(&self, id: Uuid, timeout: Duration) -> crate::Result<ScanSession> {
        tokio::time::timeout(timeout, async {
            loop {
                match self.get_status(id).await {
                    Some(session) if session.status.is_terminal() => return Ok(session),
                    Some(_) => tokio::time::sleep(WAIT_POLL).await,
                    None => return Err(InventoryError::not_found("session", id)),
                }
            }
        })
        .await?
    }

    /// Restart sweep over sessions left behind by a previous process.
    ///
    /// Running sessions were interrupted mid-scan and are failed. Pending
    /// sessions lost their queue entry; they are re-enqueued oldest first, or
    /// failed when `requeue_pending` is off.
    pub async fn recover(&self, requeue_pending: bool) -> crate::Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let mut requeue = Vec::new();

        {
            let mut tables = self.store.write().await;
            let mut stale: Vec<(Uuid, SessionStatus, chrono::DateTime<chrono::Utc>)> = tables
                .sessions
                .values()
                .filter(|s| !s.status.is_terminal())
                .map(|s| (s.id, s.status, s.created_at))
                .collect();
            stale.sort_by_key(|(_, _, created)| *created);

            for (id, status, _) in stale {
                if status == SessionStatus::Pending && requeue_pending {
                    if let Some(session) = tables.sessions.get(&id) {
                        requeue.push(session.request());
                    }
                    continue;
                }

                let reason = match status {
                    SessionStatus::Running => "interrupted by restart",
                    _ => "queue entry lost on restart",
                };
                let session = tables.transition_session(id, SessionStatus::Failed)?;
                session.error = Some(reason.to_string());
                report.failed += 1;
            }
        }

        for request in requeue {
            self.enqueue(request);
            report.requeued += 1;
        }

        if report != RecoveryReport::default() {
            info!(
                "Restart sweep: {} session(s) re-queued, {} failed",
                report.requeued, report.failed
            );
            self.store.flush().await?;
        }

        Ok(report)
    }
}

fn sort_by_host_port(services: &mut [DiscoveredService]) {
    services.sort_by(|a, b| compare_hosts(&a.host, &b.host).then(a.port.cmp(&b.port)));
}
