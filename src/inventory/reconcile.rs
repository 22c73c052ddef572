//! Device reconciliation: turning observations into inventory changes
//!
//! An observation is matched to a stored device by MAC when it carries one,
//! otherwise (or when the MAC is new) by IP among devices whose MAC is still
//! unknown. Each differing field appends one history row before it is
//! applied, followed by a single `Updated` row. New devices get a `FirstSeen`
//! row. Everything here runs against `&mut Tables`, so the caller's write
//! guard covers the whole read-modify-write.

use chrono::Utc;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::inventory::models::{
    normalize_mac, DeviceHistory, DeviceObservation, DeviceType, DiscoverySource, HistoryKind,
    NetworkDevice,
};
use crate::inventory::vendor::VendorLookup;
use crate::session::models::DiscoveredService;
use crate::store::Tables;

fn clean_hostname(hostname: Option<String>) -> Option<String> {
    hostname
        .map(|h| h.trim().trim_end_matches('.').to_string())
        .filter(|h| !h.is_empty())
}

/// Subnet containing `ip`, the most specific one when blocks nest
fn containing_subnet(tables: &Tables, ip: Ipv4Addr) -> Option<Uuid> {
    tables
        .subnets
        .values()
        .filter(|s| s.network.contains(ip))
        .max_by_key(|s| s.network.prefix())
        .map(|s| s.id)
}

/// Stored device an observation refers to
fn find_match(tables: &Tables, mac: Option<&str>, ip: Ipv4Addr) -> Option<Uuid> {
    if let Some(mac) = mac {
        if let Some(device) = tables.device_by_mac(mac) {
            return Some(device.id);
        }
    }

    // A device that already has a different MAC is a different host.
    tables
        .devices_by_ip(ip)
        .into_iter()
        .filter(|d| mac.is_none() || d.mac.is_none())
        .max_by_key(|d| d.last_seen)
        .map(|d| d.id)
}

/// Apply one observation and return the device as stored afterwards
pub fn reconcile(
    tables: &mut Tables,
    observation: DeviceObservation,
    vendors: &dyn VendorLookup,
) -> crate::Result<NetworkDevice> {
    let mac = observation.mac.as_deref().map(normalize_mac).transpose()?;
    let hostname = clean_hostname(observation.hostname);
    let now = Utc::now();

    let Some(id) = find_match(tables, mac.as_deref(), observation.ip) else {
        let device = NetworkDevice {
            id: Uuid::new_v4(),
            subnet_id: observation
                .subnet_id
                .or_else(|| containing_subnet(tables, observation.ip)),
            ip: observation.ip,
            vendor: mac.as_deref().and_then(|m| vendors.lookup(m)),
            mac,
            hostname,
            device_type: observation.device_type.unwrap_or(DeviceType::Unknown),
            status: observation.status,
            first_seen: now,
            last_seen: now,
            updated_at: now,
            is_static: observation.source == DiscoverySource::Manual,
            open_ports: observation.open_ports.unwrap_or_default(),
            source: observation.source,
        };

        debug!("new device {} at {}", device.id, device.ip);
        tables.history.push(DeviceHistory::new(
            device.id,
            HistoryKind::FirstSeen,
            None,
            Some(device.ip.to_string()),
        ));
        tables.put_device(device.clone());
        return Ok(device);
    };

    let mut device = tables
        .devices
        .get(&id)
        .cloned()
        .ok_or_else(|| InventoryError::not_found("device", id))?;
    let mut changes: Vec<DeviceHistory> = Vec::new();

    if device.ip != observation.ip {
        changes.push(DeviceHistory::new(
            id,
            HistoryKind::IpChange,
            Some(device.ip.to_string()),
            Some(observation.ip.to_string()),
        ));
        device.ip = observation.ip;
        if observation.subnet_id.is_none() {
            device.subnet_id = containing_subnet(tables, device.ip);
        }
    }

    if let Some(mac) = mac {
        if device.mac.as_deref() != Some(mac.as_str()) {
            changes.push(DeviceHistory::new(id, HistoryKind::MacChange, device.mac.clone(), Some(mac.clone())));
            if device.vendor.is_none() {
                device.vendor = vendors.lookup(&mac);
            }
            device.mac = Some(mac);
        }
    }

    if let Some(hostname) = hostname {
        if device.hostname.as_deref() != Some(hostname.as_str()) {
            changes.push(DeviceHistory::new(
                id,
                HistoryKind::HostnameChange,
                device.hostname.clone(),
                Some(hostname.clone()),
            ));
            device.hostname = Some(hostname);
        }
    }

    if device.status != observation.status {
        changes.push(DeviceHistory::new(
            id,
            HistoryKind::StatusChange,
            Some(device.status.to_string()),
            Some(observation.status.to_string()),
        ));
        device.status = observation.status;
    }

    if let Some(subnet_id) = observation.subnet_id {
        device.subnet_id = Some(subnet_id);
    }
    if let Some(device_type) = observation.device_type {
        device.device_type = device_type;
    }
    if let Some(ports) = observation.open_ports {
        device.open_ports = ports;
    }

    if !changes.is_empty() {
        let fields: Vec<String> = changes.iter().map(|c| c.kind.to_string()).collect();
        changes.push(DeviceHistory::new(id, HistoryKind::Updated, None, Some(fields.join(", "))));
        debug!("device {} changed: {}", id, fields.join(", "));
    }

    device.last_seen = now;
    device.updated_at = now;

    tables.history.extend(changes);
    tables.put_device(device.clone());
    Ok(device)
}

/// Devices whose IP is shared with at least one other device in scope,
/// ordered by IP then first sighting
pub fn conflicts(tables: &Tables, subnet_id: Option<Uuid>) -> Vec<NetworkDevice> {
    let mut by_ip: BTreeMap<Ipv4Addr, Vec<&NetworkDevice>> = BTreeMap::new();
    for device in tables
        .devices
        .values()
        .filter(|d| subnet_id.map_or(true, |id| d.subnet_id == Some(id)))
    {
        by_ip.entry(device.ip).or_default().push(device);
    }

    by_ip
        .into_values()
        .filter(|holders| holders.len() > 1)
        .flat_map(|mut holders| {
            holders.sort_by_key(|d| (d.first_seen, d.id));
            holders.into_iter().cloned()
        })
        .collect()
}

/// History of one device, newest first
pub fn history(tables: &Tables, device_id: Uuid, limit: usize) -> Vec<DeviceHistory> {
    tables
        .history
        .iter()
        .rev()
        .filter(|h| h.device_id == device_id)
        .take(limit)
        .cloned()
        .collect()
}

/// One observation per IPv4 host found by a scan, carrying its open ports and
/// any resolved name
pub fn observations_from_services(services: &[DiscoveredService]) -> Vec<DeviceObservation> {
    let mut hosts: BTreeMap<Ipv4Addr, Vec<u16>> = BTreeMap::new();
    let mut names: HashMap<Ipv4Addr, String> = HashMap::new();

    for service in services {
        let Ok(ip) = service.host.parse::<Ipv4Addr>() else {
            continue;
        };
        let ports = hosts.entry(ip).or_default();
        if !ports.contains(&service.port) {
            ports.push(service.port);
        }
        if service.hostname != service.host {
            names.insert(ip, service.hostname.clone());
        }
    }

    hosts
        .into_iter()
        .map(|(ip, mut ports)| {
            ports.sort_unstable();
            let mut observation = DeviceObservation::new(ip);
            observation.hostname = names.get(&ip).cloned();
            observation.open_ports = Some(ports);
            observation
        })
        .collect()
}
