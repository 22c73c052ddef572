//! Record store: typed in-memory tables with optional JSON snapshot persistence
//!
//! All tables live behind one `RwLock`. Callers take the write guard for a
//! whole read-modify-write so related rows change together. Persistence is an
//! explicit [`Store::flush`] that clones the tables under the read guard and
//! writes the copy after the guard is released. Flushes are serialised among
//! themselves, so the last snapshot taken is the last one written.

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::InventoryError;
use crate::inventory::models::{DeviceHistory, IpReservation, NetworkDevice, Subnet};
use crate::session::models::{DiscoveredService, ScanSession, SessionStatus};

/// Every persisted record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub subnets: HashMap<Uuid, Subnet>,
    pub devices: HashMap<Uuid, NetworkDevice>,
    pub history: Vec<DeviceHistory>,
    pub reservations: HashMap<Uuid, IpReservation>,
    pub sessions: HashMap<Uuid, ScanSession>,
    pub services: Vec<DiscoveredService>,

    /// Normalised MAC to device; rebuilt on load
    #[serde(skip)]
    mac_index: HashMap<String, Uuid>,

    /// Current IP to devices holding it; rebuilt on load
    #[serde(skip)]
    ip_index: HashMap<Ipv4Addr, Vec<Uuid>>,
}

impl Tables {
    pub fn rebuild_indices(&mut self) {
        self.mac_index.clear();
        self.ip_index.clear();

        let devices: Vec<NetworkDevice> = self.devices.values().cloned().collect();
        for device in &devices {
            self.index_device(device);
        }
    }

    fn index_device(&mut self, device: &NetworkDevice) {
        if let Some(mac) = &device.mac {
            self.mac_index.insert(mac.clone(), device.id);
        }
        let holders = self.ip_index.entry(device.ip).or_default();
        if !holders.contains(&device.id) {
            holders.push(device.id);
        }
    }

    fn unindex_device(&mut self, device: &NetworkDevice) {
        if let Some(mac) = &device.mac {
            if self.mac_index.get(mac) == Some(&device.id) {
                self.mac_index.remove(mac);
            }
        }
        if let Some(holders) = self.ip_index.get_mut(&device.ip) {
            holders.retain(|id| *id != device.id);
            if holders.is_empty() {
                self.ip_index.remove(&device.ip);
            }
        }
    }

    /// Insert or replace a device, keeping both indices current
    pub fn put_device(&mut self, device: NetworkDevice) {
        if let Some(previous) = self.devices.get(&device.id).cloned() {
            self.unindex_device(&previous);
        }
        self.index_device(&device);
        self.devices.insert(device.id, device);
    }

    pub fn remove_device(&mut self, id: Uuid) -> Option<NetworkDevice> {
        let device = self.devices.remove(&id)?;
        self.unindex_device(&device);
        Some(device)
    }

    /// Device currently holding a normalised MAC
    pub fn device_by_mac(&self, mac: &str) -> Option<&NetworkDevice> {
        self.mac_index.get(mac).and_then(|id| self.devices.get(id))
    }

    /// Every device currently holding `ip`
    pub fn devices_by_ip(&self, ip: Ipv4Addr) -> Vec<&NetworkDevice> {
        self.ip_index
            .get(&ip)
            .map(|ids| ids.iter().filter_map(|id| self.devices.get(id)).collect())
            .unwrap_or_default()
    }

    /// Move a session along its lifecycle, rejecting illegal edges
    pub fn transition_session(&mut self, id: Uuid, to: SessionStatus) -> crate::Result<&mut ScanSession> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| InventoryError::not_found("session", id))?;

        if !session.status.can_transition_to(to) {
            return Err(InventoryError::InvalidTransition {
                from: session.status,
                to,
            });
        }

        let now = Utc::now();
        match to {
            SessionStatus::Running => session.started_at = Some(now),
            SessionStatus::Completed | SessionStatus::Failed => session.completed_at = Some(now),
            SessionStatus::Pending => {}
        }
        session.status = to;
        Ok(session)
    }

    /// Services recorded under a session, in insertion order
    pub fn services_for(&self, session_id: Uuid) -> impl Iterator<Item = &DiscoveredService> {
        self.services.iter().filter(move |s| s.session_id == session_id)
    }
}

/// Shared handle on the tables and their snapshot file
#[derive(Debug)]
pub struct Store {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
    /// Held from snapshot to rename
    flush_lock: Mutex<()>,
}

impl Store {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
            flush_lock: Mutex::new(()),
        }
    }

    /// Load the snapshot at `path`, or start empty when it does not exist yet
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut tables = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Tables>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot at {}, starting empty", path.display());
                Tables::default()
            }
            Err(e) => return Err(e.into()),
        };
        tables.rebuild_indices();

        info!(
            "Loaded store from {} ({} subnet(s), {} device(s), {} session(s))",
            path.display(),
            tables.subnets.len(),
            tables.devices.len(),
            tables.sessions.len()
        );

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().await
    }

    /// Write the current tables to the snapshot file, if any
    pub async fn flush(&self) -> crate::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _flushing = self.flush_lock.lock().await;
        let snapshot = self.tables.read().await.clone();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| InventoryError::Storage(format!("replacing {}: {}", path.display(), e)))?;

        debug!("flushed {} bytes to {}", json.len(), path.display());
        Ok(())
    }
}
