mod common;

use common::ScriptedProber;
use netledger::config::{InventoryConfig, WorkerConfig};
use netledger::scan::ScanOrchestrator;
use netledger::session::{
    ScanRequest, ScanService, ScanSession, ScanType, ScanWorker, ServiceEnrichment, SessionStatus,
};
use netledger::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

async fn start(prober: Arc<ScriptedProber>, store: Arc<Store>) -> ScanService {
    let config = InventoryConfig::default().with_idle_backoff(10);
    let orchestrator = ScanOrchestrator::new(prober, &config);
    ScanService::start(store, orchestrator, &config).await.unwrap()
}

#[tokio::test]
async fn test_session_lifecycle_and_counters() {
    let prober = Arc::new(ScriptedProber::new().host("10.0.0.1", &[22, 80]));
    let service = start(prober, Arc::new(Store::in_memory())).await;
    let tracker = service.tracker().clone();

    let id = tracker
        .start_scan("10.0.0.0/30", ScanType::Custom, Some(vec![22, 80, 443]), None)
        .await
        .unwrap();
    let session = tracker.wait_for(id, WAIT).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.hosts_targeted, 2);
    assert_eq!(session.hosts_reachable, 1);
    assert_eq!(session.services_found, 2);
    assert!(session.started_at.is_some() && session.completed_at.is_some());
    assert!(session.error.is_none());

    let results = tracker.get_results(id).await;
    let keys: Vec<String> = results.iter().map(|s| s.key()).collect();
    assert_eq!(keys, vec!["10.0.0.1:22", "10.0.0.1:80"]);
    assert!(results.iter().all(|s| s.active && s.session_id == id));

    service.shutdown().await;
}

#[tokio::test]
async fn test_vanished_port_marked_inactive_for_web1() {
    let prober = Arc::new(ScriptedProber::new().host("web1", &[80, 443]));
    let store = Arc::new(Store::in_memory());
    let service = start(prober.clone(), store.clone()).await;
    let tracker = service.tracker().clone();

    let first = tracker
        .start_scan("web1", ScanType::Custom, Some(vec![80, 443]), None)
        .await
        .unwrap();
    tracker.wait_for(first, WAIT).await.unwrap();

    prober.set_host("web1", &[80]);
    let second = tracker
        .start_scan("web1", ScanType::Custom, Some(vec![80, 443]), None)
        .await
        .unwrap();
    let session = tracker.wait_for(second, WAIT).await.unwrap();
    assert_eq!(session.services_inactivated, 1);

    let old = tracker.get_results(first).await;
    let old_443 = old.iter().find(|s| s.port == 443).unwrap();
    assert!(!old_443.active);

    let new = tracker.get_results(second).await;
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].port, 80);
    assert!(new[0].active);

    let active: Vec<_> = store
        .read()
        .await
        .services
        .iter()
        .filter(|s| s.host == "web1" && s.active)
        .map(|s| (s.session_id, s.port))
        .collect();
    assert_eq!(active, vec![(second, 80)]);

    let latest = tracker.get_latest_for_target("web1").await;
    assert_eq!(latest, new);

    service.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_target_completes_empty() {
    let prober = Arc::new(ScriptedProber::new());
    let service = start(prober.clone(), Arc::new(Store::in_memory())).await;
    let tracker = service.tracker().clone();

    let id = tracker.start_scan("10.7.7.7", ScanType::Quick, None, None).await.unwrap();
    let session = tracker.wait_for(id, WAIT).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.services_found, 0);
    assert!(prober.port_probes.lock().unwrap().is_empty());
    assert!(tracker.get_latest_for_target("10.7.7.7").await.is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_latest_for_target_ignores_unfinished_sessions() {
    let store = Arc::new(Store::in_memory());
    let pending = ScanSession::new(&ScanRequest::new("db1", ScanType::Quick, None, None));
    store.write().await.sessions.insert(pending.id, pending);

    let (tx, _rx) = mpsc::unbounded_channel();
    let tracker = netledger::session::SessionTracker::new(store, tx, Default::default());
    assert!(tracker.get_latest_for_target("db1").await.is_empty());
}

#[tokio::test]
async fn test_failed_scan_records_error() {
    let store = Arc::new(Store::in_memory());
    let config = InventoryConfig::default();
    let orchestrator = ScanOrchestrator::new(Arc::new(ScriptedProber::new()), &config);

    // bypass submission validation so the scan itself fails
    let session = ScanSession::new(&ScanRequest::new("10.0.0.0/99", ScanType::Quick, None, None));
    let request = session.request();
    let id = session.id;
    store.write().await.sessions.insert(id, session);

    let (_tx, rx) = mpsc::unbounded_channel();
    let worker = ScanWorker::new(store.clone(), orchestrator, rx, WorkerConfig::default());
    let status = worker.process(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(status, SessionStatus::Failed);
    let session = store.read().await.sessions.get(&id).cloned().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error.unwrap().contains("Invalid target"));
    assert!(session.completed_at.is_some());
}

#[tokio::test]
async fn test_terminal_session_is_not_rerun() {
    let store = Arc::new(Store::in_memory());
    let config = InventoryConfig::default();
    let orchestrator = ScanOrchestrator::new(Arc::new(ScriptedProber::new()), &config);

    let mut session = ScanSession::new(&ScanRequest::new("web1", ScanType::Quick, None, None));
    session.status = SessionStatus::Completed;
    let request = session.request();
    store.write().await.sessions.insert(session.id, session);

    let (_tx, rx) = mpsc::unbounded_channel();
    let worker = ScanWorker::new(store, orchestrator, rx, WorkerConfig::default());
    let result = worker.process(request, &CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(netledger::InventoryError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Running
        })
    ));
}

#[tokio::test]
async fn test_worker_survives_failed_iteration() {
    let prober = Arc::new(ScriptedProber::new().host("10.0.0.1", &[22]));
    let store = Arc::new(Store::in_memory());
    let config = InventoryConfig::default();
    let orchestrator = ScanOrchestrator::new(prober, &config);

    let bad = ScanSession::new(&ScanRequest::new("10.0.0.0/99", ScanType::Quick, None, None));
    let good = ScanSession::new(&ScanRequest::new("10.0.0.1", ScanType::Custom, Some(vec![22]), None));
    let (bad_request, good_request) = (bad.request(), good.request());
    let good_id = good.id;
    {
        let mut tables = store.write().await;
        tables.sessions.insert(bad.id, bad);
        tables.sessions.insert(good.id, good);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(ScanWorker::new(store.clone(), orchestrator, rx, config.worker.clone()).run(shutdown.clone()));

    tx.send(bad_request).unwrap();
    tx.send(good_request).unwrap();

    let (tx2, _rx2) = mpsc::unbounded_channel();
    let tracker = netledger::session::SessionTracker::new(store, tx2, Default::default());
    let session = tracker.wait_for(good_id, WAIT).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.services_found, 1);

    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_restart_sweep() {
    let store = Arc::new(Store::in_memory());
    let mut interrupted = ScanSession::new(&ScanRequest::new("10.0.0.1", ScanType::Quick, None, None));
    interrupted.status = SessionStatus::Running;
    let lost = ScanSession::new(&ScanRequest::new("10.0.0.1", ScanType::Custom, Some(vec![22]), None));
    let (interrupted_id, lost_id) = (interrupted.id, lost.id);
    {
        let mut tables = store.write().await;
        tables.sessions.insert(interrupted_id, interrupted);
        tables.sessions.insert(lost_id, lost);
    }

    let prober = Arc::new(ScriptedProber::new().host("10.0.0.1", &[22]));
    let service = start(prober, store.clone()).await;
    let tracker = service.tracker().clone();

    let failed = tracker.get_status(interrupted_id).await.unwrap();
    assert_eq!(failed.status, SessionStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("interrupted by restart"));

    let requeued = tracker.wait_for(lost_id, WAIT).await.unwrap();
    assert_eq!(requeued.status, SessionStatus::Completed);
    assert_eq!(requeued.services_found, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_enrichment_is_stored() {
    let prober = Arc::new(ScriptedProber::new().host("10.0.0.1", &[22]));
    let service = start(prober, Arc::new(Store::in_memory())).await;
    let tracker = service.tracker().clone();

    let id = tracker
        .start_scan("10.0.0.1", ScanType::Custom, Some(vec![22]), None)
        .await
        .unwrap();
    tracker.wait_for(id, WAIT).await.unwrap();

    let found = tracker.get_results(id).await;
    let enrichment = ServiceEnrichment {
        suggested_name: Some("build-server".to_string()),
        device_type: Some("server".to_string()),
        notes: None,
    };
    tracker.enrich_service(found[0].id, enrichment.clone()).await.unwrap();

    let stored = tracker.get_results(id).await;
    assert_eq!(stored[0].enrichment, Some(enrichment));

    service.shutdown().await;
}
