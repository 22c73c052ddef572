//! Scan job queue and session tracking
//!
//! Submissions go through [`SessionTracker`], which records a pending session
//! and pushes a [`ScanRequest`] onto an unbounded channel. Exactly one
//! [`ScanWorker`] consumes that channel, so at most one scan runs at a time.

pub mod models;
pub mod tracker;
pub mod worker;

use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::InventoryConfig;
use crate::scan::{ScanOrchestrator, TargetParser};
use crate::store::Store;

pub use models::{
    DiscoveredService, ScanRequest, ScanSession, ScanType, ServiceEnrichment, SessionCounters,
    SessionStatus,
};
pub use tracker::{RecoveryReport, SessionTracker};
pub use worker::{mark_inactive, InactiveMarking, ScanWorker};

/// A running tracker and its worker task
pub struct ScanService {
    tracker: SessionTracker,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl ScanService {
    /// Sweep sessions left by a previous process, then spawn the worker
    pub async fn start(
        store: Arc<Store>,
        orchestrator: ScanOrchestrator,
        config: &InventoryConfig,
    ) -> crate::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = SessionTracker::new(store.clone(), tx, TargetParser::from_limits(&config.scan));

        tracker.recover(config.worker.requeue_pending_on_start).await?;

        let shutdown = CancellationToken::new();
        let worker = ScanWorker::new(store, orchestrator, rx, config.worker.clone());
        let worker = tokio::spawn(worker.run(shutdown.clone()));

        Ok(Self {
            tracker,
            shutdown,
            worker,
        })
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Stop the worker. A scan in flight returns its partial results first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.worker.await {
            error!("scan worker ended abnormally: {}", e);
        }
        info!("Scan service stopped");
    }
}
