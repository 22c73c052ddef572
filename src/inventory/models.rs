//! Subnet, device, reservation and history records

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::InventoryError;

/// Administrator-defined network segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: Uuid,
    pub name: String,
    pub network: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
    pub dhcp_start: Option<Ipv4Addr>,
    pub dhcp_end: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub vlan_id: Option<u16>,
    pub monitored: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subnet {
    pub fn new(name: &str, network: Ipv4Network) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            network,
            gateway: None,
            dhcp_start: None,
            dhcp_end: None,
            dns_servers: Vec::new(),
            vlan_id: None,
            monitored: true,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_dhcp_range(mut self, start: Ipv4Addr, end: Ipv4Addr) -> Self {
        self.dhcp_start = Some(start);
        self.dhcp_end = Some(end);
        self
    }

    pub fn with_vlan(mut self, vlan_id: u16) -> Self {
        self.vlan_id = Some(vlan_id);
        self
    }

    /// Inclusive DHCP bounds when both ends are declared
    pub fn dhcp_range(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        Some((self.dhcp_start?, self.dhcp_end?))
    }

    pub fn in_dhcp_range(&self, ip: Ipv4Addr) -> bool {
        self.dhcp_range()
            .map(|(start, end)| ip >= start && ip <= end)
            .unwrap_or(false)
    }
}

/// Partial update for a subnet; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct SubnetUpdate {
    pub name: Option<String>,
    pub gateway: Option<Option<Ipv4Addr>>,
    pub dhcp_range: Option<Option<(Ipv4Addr, Ipv4Addr)>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    pub vlan_id: Option<Option<u16>>,
    pub monitored: Option<bool>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DeviceStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" | "up" => Ok(DeviceStatus::Online),
            "offline" | "down" => Ok(DeviceStatus::Offline),
            "unknown" => Ok(DeviceStatus::Unknown),
            _ => Err(InventoryError::Validation(format!("Unknown device status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    Switch,
    AccessPoint,
    Firewall,
    Server,
    Workstation,
    Printer,
    Camera,
    Phone,
    Iot,
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::AccessPoint => "access_point",
            DeviceType::Firewall => "firewall",
            DeviceType::Server => "server",
            DeviceType::Workstation => "workstation",
            DeviceType::Printer => "printer",
            DeviceType::Camera => "camera",
            DeviceType::Phone => "phone",
            DeviceType::Iot => "iot",
            DeviceType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DeviceType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "router" => Ok(DeviceType::Router),
            "switch" => Ok(DeviceType::Switch),
            "access_point" | "ap" => Ok(DeviceType::AccessPoint),
            "firewall" => Ok(DeviceType::Firewall),
            "server" => Ok(DeviceType::Server),
            "workstation" | "pc" => Ok(DeviceType::Workstation),
            "printer" => Ok(DeviceType::Printer),
            "camera" => Ok(DeviceType::Camera),
            "phone" | "mobile" => Ok(DeviceType::Phone),
            "iot" => Ok(DeviceType::Iot),
            "unknown" => Ok(DeviceType::Unknown),
            _ => Err(InventoryError::Validation(format!("Unknown device type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Scan,
    Controller,
    Manual,
}

/// A tracked host in the long-lived inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub id: Uuid,
    pub subnet_id: Option<Uuid>,
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_static: bool,
    pub open_ports: Vec<u16>,
    pub source: DiscoverySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    FirstSeen,
    StatusChange,
    IpChange,
    MacChange,
    HostnameChange,
    Updated,
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryKind::FirstSeen => "FirstSeen",
            HistoryKind::StatusChange => "StatusChange",
            HistoryKind::IpChange => "IpChange",
            HistoryKind::MacChange => "MacChange",
            HistoryKind::HostnameChange => "HostnameChange",
            HistoryKind::Updated => "Updated",
        };
        write!(f, "{}", s)
    }
}

/// One semantic change to a device. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHistory {
    pub id: Uuid,
    pub device_id: Uuid,
    pub kind: HistoryKind,
    pub before: Option<String>,
    pub after: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl DeviceHistory {
    pub fn new(device_id: Uuid, kind: HistoryKind, before: Option<String>, after: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            kind,
            before,
            after,
            recorded_at: Utc::now(),
        }
    }
}

/// Administrator hold on an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpReservation {
    pub id: Uuid,
    pub subnet_id: Uuid,
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub description: String,
    pub purpose: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpReservation {
    pub fn new(subnet_id: Uuid, ip: Ipv4Addr, description: &str, purpose: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subnet_id,
            ip,
            mac: None,
            description: description.to_string(),
            purpose: purpose.to_string(),
            expires_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and not past its expiry
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

/// Partial update for a reservation
#[derive(Debug, Clone, Default)]
pub struct ReservationUpdate {
    pub mac: Option<Option<String>>,
    pub description: Option<String>,
    pub purpose: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

/// A sighting of a host from a scan or third-party sync.
///
/// `mac` and `hostname` set to `None` mean "not observed" and never clear
/// what is already stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceObservation {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub status: DeviceStatus,
    pub device_type: Option<DeviceType>,
    pub subnet_id: Option<Uuid>,
    pub open_ports: Option<Vec<u16>>,
    pub source: DiscoverySource,
}

impl DeviceObservation {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            status: DeviceStatus::Online,
            device_type: None,
            subnet_id: None,
            open_ports: None,
            source: DiscoverySource::Scan,
        }
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = Some(mac.to_string());
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_subnet(mut self, subnet_id: Uuid) -> Self {
        self.subnet_id = Some(subnet_id);
        self
    }

    pub fn with_source(mut self, source: DiscoverySource) -> Self {
        self.source = source;
        self
    }
}

/// Address-space usage of one subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetSummary {
    pub subnet_id: Uuid,
    pub network: Ipv4Network,
    pub total_hosts: u64,
    pub used: u64,
    pub available: u64,
    pub dhcp_range_size: u64,
    pub online_devices: usize,
    pub offline_devices: usize,
    pub usage_percent: f64,
}

/// Canonical MAC form: upper-case hex pairs joined by colons.
///
/// Accepts `:`, `-` and `.` separated or bare forms; anything that is not
/// twelve hex digits is rejected.
pub fn normalize_mac(mac: &str) -> crate::Result<String> {
    let hex: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InventoryError::Validation(format!("Invalid MAC address: {}", mac)));
    }

    let upper = hex.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
    Ok(pairs.join(":"))
}
