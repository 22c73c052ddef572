//! Scan session records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::probe::ProbedService;
use crate::scan::ScanReport;

/// Session lifecycle: `Pending -> Running -> Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Pending, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// Default port list
    Quick,
    /// Extended port list
    Full,
    /// Caller-supplied ports only
    Custom,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanType::Quick => "quick",
            ScanType::Full => "full",
            ScanType::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ScanType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(ScanType::Quick),
            "full" => Ok(ScanType::Full),
            "custom" => Ok(ScanType::Custom),
            _ => Err(InventoryError::Validation(format!("Unknown scan type: {}", s))),
        }
    }
}

/// One execution of the discovery pipeline against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: Uuid,
    pub target: String,
    pub scan_type: ScanType,
    pub ports: Vec<u16>,
    pub full_scan: bool,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub hosts_targeted: usize,
    pub hosts_reachable: usize,
    pub services_found: usize,
    pub services_inactivated: usize,
    pub error: Option<String>,
}

impl ScanSession {
    pub fn new(request: &ScanRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: request.target.clone(),
            scan_type: request.scan_type,
            ports: request.ports.clone(),
            full_scan: request.full_scan,
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            hosts_targeted: 0,
            hosts_reachable: 0,
            services_found: 0,
            services_inactivated: 0,
            error: None,
        }
    }

    pub fn request(&self) -> ScanRequest {
        ScanRequest {
            session_id: self.id,
            target: self.target.clone(),
            scan_type: self.scan_type,
            ports: self.ports.clone(),
            full_scan: self.full_scan,
        }
    }

    /// Wall-clock run time once the session has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// Work item carried by the scan queue
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub session_id: Uuid,
    pub target: String,
    pub scan_type: ScanType,
    pub ports: Vec<u16>,
    pub full_scan: bool,
}

impl ScanRequest {
    pub fn new(target: &str, scan_type: ScanType, ports: Option<Vec<u16>>, full_scan: Option<bool>) -> Self {
        Self {
            session_id: Uuid::nil(),
            target: target.trim().to_string(),
            scan_type,
            ports: ports.unwrap_or_default(),
            full_scan: full_scan.unwrap_or(scan_type == ScanType::Full),
        }
    }
}

/// Externally produced description of a discovered service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEnrichment {
    pub suggested_name: Option<String>,
    pub device_type: Option<String>,
    pub notes: Option<String>,
}

/// One (host, port) found reachable during a specific session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub id: Uuid,
    pub session_id: Uuid,
    pub host: String,
    pub hostname: String,
    pub port: u16,
    pub reachable: bool,
    pub latency_ms: f64,
    pub service: String,
    pub banner: Option<String>,
    /// Cleared when a later session of the same target supersedes this row
    pub active: bool,
    pub discovered_at: DateTime<Utc>,
    pub enrichment: Option<ServiceEnrichment>,
}

impl DiscoveredService {
    pub fn from_probe(session_id: Uuid, probe: ProbedService) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            host: probe.host,
            hostname: probe.hostname,
            port: probe.port,
            reachable: probe.reachable,
            latency_ms: probe.latency_ms,
            service: probe.service,
            banner: probe.banner,
            active: true,
            discovered_at: Utc::now(),
            enrichment: None,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outcome of a successful worker run, applied to the session on completion
#[derive(Debug, Clone, Default)]
pub struct SessionCounters {
    pub hosts_targeted: usize,
    pub hosts_reachable: usize,
    pub services_found: usize,
    pub services_inactivated: usize,
}

impl SessionCounters {
    pub fn from_report(report: &ScanReport, services_inactivated: usize) -> Self {
        Self {
            hosts_targeted: report.hosts_targeted,
            hosts_reachable: report.hosts_reachable,
            services_found: report.services.len(),
            services_inactivated,
        }
    }
}
