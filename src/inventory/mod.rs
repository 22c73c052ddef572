//! Address-space planning and device reconciliation
//!
//! [`InventoryService`] owns subnets, devices, reservations and device
//! history. Discovery never writes subnets; devices change only through
//! [`InventoryService::reconcile_device`] or an explicit delete.

pub mod address_space;
pub mod models;
pub mod reconcile;
pub mod vendor;

use chrono::Utc;
use log::info;
use std::net::Ipv4Addr;
use std::sync::Arc;
use uuid::Uuid;

use crate::cidr;
use crate::error::InventoryError;
use crate::store::{Store, Tables};

pub use models::{
    normalize_mac, DeviceHistory, DeviceObservation, DeviceStatus, DeviceType, DiscoverySource,
    HistoryKind, IpReservation, NetworkDevice, ReservationUpdate, Subnet, SubnetSummary,
    SubnetUpdate,
};
pub use reconcile::observations_from_services;
pub use vendor::{OuiVendorTable, UnknownVendor, VendorLookup};

/// Check the administrator-supplied addresses of a subnet against its block
fn validate_subnet(subnet: &Subnet) -> crate::Result<()> {
    if subnet.name.trim().is_empty() {
        return Err(InventoryError::Validation("subnet name cannot be empty".to_string()));
    }

    let in_block = |ip: Ipv4Addr, what: &str| {
        if cidr::is_host_of(&subnet.network, ip) {
            Ok(())
        } else {
            Err(InventoryError::Validation(format!(
                "{} {} is not a host of {}",
                what, ip, subnet.network
            )))
        }
    };

    if let Some(gateway) = subnet.gateway {
        in_block(gateway, "gateway")?;
    }

    match (subnet.dhcp_start, subnet.dhcp_end) {
        (Some(start), Some(end)) => {
            in_block(start, "DHCP start")?;
            in_block(end, "DHCP end")?;
            if start > end {
                return Err(InventoryError::Validation(format!(
                    "DHCP start {} is after DHCP end {}",
                    start, end
                )));
            }
        }
        (None, None) => {}
        _ => {
            return Err(InventoryError::Validation(
                "DHCP range needs both a start and an end".to_string(),
            ))
        }
    }

    Ok(())
}

fn subnet_of<'a>(tables: &'a Tables, id: Uuid) -> crate::Result<&'a Subnet> {
    tables
        .subnets
        .get(&id)
        .ok_or_else(|| InventoryError::not_found("subnet", id))
}

/// Inventory operations over a shared [`Store`]
pub struct InventoryService {
    store: Arc<Store>,
    vendors: Arc<dyn VendorLookup>,
}

impl InventoryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_vendor_lookup(store, Arc::new(UnknownVendor))
    }

    pub fn with_vendor_lookup(store: Arc<Store>, vendors: Arc<dyn VendorLookup>) -> Self {
        Self { store, vendors }
    }

    // Subnets

    pub async fn create_subnet(&self, mut subnet: Subnet) -> crate::Result<Subnet> {
        subnet.network = cidr::canonical(&subnet.network)?;
        validate_subnet(&subnet)?;

        {
            let mut tables = self.store.write().await;
            if tables.subnets.values().any(|s| s.network == subnet.network) {
                return Err(InventoryError::Validation(format!(
                    "subnet {} already exists",
                    subnet.network
                )));
            }
            tables.subnets.insert(subnet.id, subnet.clone());
        }

        info!("Created subnet {} ({})", subnet.name, subnet.network);
        self.store.flush().await?;
        Ok(subnet)
    }

    pub async fn get_subnet(&self, id: Uuid) -> Option<Subnet> {
        self.store.read().await.subnets.get(&id).cloned()
    }

    /// All subnets ordered by network address
    pub async fn list_subnets(&self) -> Vec<Subnet> {
        let mut subnets: Vec<Subnet> = self.store.read().await.subnets.values().cloned().collect();
        subnets.sort_by_key(|s| (s.network.network(), s.network.prefix()));
        subnets
    }

    pub async fn find_by_network(&self, network: &str) -> crate::Result<Option<Subnet>> {
        let network = cidr::canonical(&cidr::parse_ipv4_cidr(network)?)?;
        Ok(self
            .store
            .read()
            .await
            .subnets
            .values()
            .find(|s| s.network == network)
            .cloned())
    }

    pub async fn update_subnet(&self, id: Uuid, update: SubnetUpdate) -> crate::Result<Subnet> {
        let updated = {
            let mut tables = self.store.write().await;
            let mut subnet = subnet_of(&tables, id)?.clone();

            if let Some(name) = update.name {
                subnet.name = name;
            }
            if let Some(gateway) = update.gateway {
                subnet.gateway = gateway;
            }
            if let Some(range) = update.dhcp_range {
                subnet.dhcp_start = range.map(|(start, _)| start);
                subnet.dhcp_end = range.map(|(_, end)| end);
            }
            if let Some(dns_servers) = update.dns_servers {
                subnet.dns_servers = dns_servers;
            }
            if let Some(vlan_id) = update.vlan_id {
                subnet.vlan_id = vlan_id;
            }
            if let Some(monitored) = update.monitored {
                subnet.monitored = monitored;
            }
            if let Some(description) = update.description {
                subnet.description = description;
            }

            validate_subnet(&subnet)?;
            subnet.updated_at = Utc::now();
            tables.subnets.insert(id, subnet.clone());
            subnet
        };

        self.store.flush().await?;
        Ok(updated)
    }

    /// Remove a subnet with its reservations; its devices stay, unassigned
    pub async fn delete_subnet(&self, id: Uuid) -> crate::Result<Subnet> {
        let removed = {
            let mut tables = self.store.write().await;
            let removed = tables
                .subnets
                .remove(&id)
                .ok_or_else(|| InventoryError::not_found("subnet", id))?;

            tables.reservations.retain(|_, r| r.subnet_id != id);
            let orphans: Vec<NetworkDevice> = tables
                .devices
                .values()
                .filter(|d| d.subnet_id == Some(id))
                .cloned()
                .collect();
            for mut device in orphans {
                device.subnet_id = None;
                tables.put_device(device);
            }
            removed
        };

        info!("Deleted subnet {} ({})", removed.name, removed.network);
        self.store.flush().await?;
        Ok(removed)
    }

    // Address space

    pub async fn get_available(&self, subnet_id: Uuid, avoid_dhcp: bool) -> crate::Result<Vec<Ipv4Addr>> {
        let tables = self.store.read().await;
        let subnet = subnet_of(&tables, subnet_id)?;
        Ok(address_space::available(&tables, subnet, avoid_dhcp))
    }

    pub async fn find_next_available(&self, subnet_id: Uuid, avoid_dhcp: bool) -> crate::Result<Option<Ipv4Addr>> {
        let tables = self.store.read().await;
        let subnet = subnet_of(&tables, subnet_id)?;
        Ok(address_space::next_available(&tables, subnet, avoid_dhcp))
    }

    /// Whether `ip` is a free host of the given subnet, or of the subnet that
    /// contains it when none is given
    pub async fn is_available(&self, ip: Ipv4Addr, subnet_id: Option<Uuid>) -> bool {
        let tables = self.store.read().await;
        let subnet = match subnet_id {
            Some(id) => tables.subnets.get(&id),
            None => tables
                .subnets
                .values()
                .filter(|s| s.network.contains(ip))
                .max_by_key(|s| s.network.prefix()),
        };

        subnet.map_or(false, |s| address_space::is_free(&tables, s, ip))
    }

    pub async fn get_subnet_summary(&self, subnet_id: Uuid) -> crate::Result<SubnetSummary> {
        let tables = self.store.read().await;
        let subnet = subnet_of(&tables, subnet_id)?;
        Ok(address_space::summary(&tables, subnet))
    }

    // Devices

    /// Match an observation to a stored device and record what changed
    pub async fn reconcile_device(&self, observation: DeviceObservation) -> crate::Result<NetworkDevice> {
        let device = {
            let mut tables = self.store.write().await;
            reconcile::reconcile(&mut tables, observation, self.vendors.as_ref())?
        };

        self.store.flush().await?;
        Ok(device)
    }

    pub async fn detect_conflicts(&self, subnet_id: Option<Uuid>) -> Vec<NetworkDevice> {
        reconcile::conflicts(&*self.store.read().await, subnet_id)
    }

    pub async fn get_device(&self, id: Uuid) -> Option<NetworkDevice> {
        self.store.read().await.devices.get(&id).cloned()
    }

    /// Most recently seen device holding `ip`
    pub async fn get_device_by_ip(&self, ip: Ipv4Addr) -> Option<NetworkDevice> {
        self.store
            .read()
            .await
            .devices_by_ip(ip)
            .into_iter()
            .max_by_key(|d| d.last_seen)
            .cloned()
    }

    pub async fn get_device_by_mac(&self, mac: &str) -> crate::Result<Option<NetworkDevice>> {
        let mac = normalize_mac(mac)?;
        Ok(self.store.read().await.device_by_mac(&mac).cloned())
    }

    /// Devices ordered by IP, optionally limited to one subnet
    pub async fn list_devices(&self, subnet_id: Option<Uuid>) -> Vec<NetworkDevice> {
        let tables = self.store.read().await;
        let mut devices: Vec<NetworkDevice> = tables
            .devices
            .values()
            .filter(|d| subnet_id.map_or(true, |id| d.subnet_id == Some(id)))
            .cloned()
            .collect();
        devices.sort_by_key(|d| (d.ip, d.first_seen));
        devices
    }

    /// Remove a device; its history is kept
    pub async fn delete_device(&self, id: Uuid) -> crate::Result<NetworkDevice> {
        let removed = self
            .store
            .write()
            .await
            .remove_device(id)
            .ok_or_else(|| InventoryError::not_found("device", id))?;

        self.store.flush().await?;
        Ok(removed)
    }

    pub async fn get_history(&self, device_id: Uuid, limit: usize) -> Vec<DeviceHistory> {
        reconcile::history(&*self.store.read().await, device_id, limit)
    }

    // Reservations

    pub async fn create_reservation(&self, mut reservation: IpReservation) -> crate::Result<IpReservation> {
        reservation.mac = reservation.mac.as_deref().map(normalize_mac).transpose()?;

        {
            let mut tables = self.store.write().await;
            let subnet = subnet_of(&tables, reservation.subnet_id)?;

            if !cidr::is_host_of(&subnet.network, reservation.ip) {
                return Err(InventoryError::Validation(format!(
                    "{} is not a host of {}",
                    reservation.ip, subnet.network
                )));
            }

            let now = Utc::now();
            if tables
                .reservations
                .values()
                .any(|r| r.ip == reservation.ip && r.subnet_id == reservation.subnet_id && r.is_effective(now))
            {
                return Err(InventoryError::Validation(format!(
                    "{} is already reserved",
                    reservation.ip
                )));
            }

            tables.reservations.insert(reservation.id, reservation.clone());
        }

        info!("Reserved {} ({})", reservation.ip, reservation.purpose);
        self.store.flush().await?;
        Ok(reservation)
    }

    pub async fn get_reservation(&self, id: Uuid) -> Option<IpReservation> {
        self.store.read().await.reservations.get(&id).cloned()
    }

    pub async fn list_reservations(&self, subnet_id: Option<Uuid>) -> Vec<IpReservation> {
        let tables = self.store.read().await;
        let mut reservations: Vec<IpReservation> = tables
            .reservations
            .values()
            .filter(|r| subnet_id.map_or(true, |id| r.subnet_id == id))
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.ip, r.created_at));
        reservations
    }

    pub async fn update_reservation(&self, id: Uuid, update: ReservationUpdate) -> crate::Result<IpReservation> {
        let updated = {
            let mut tables = self.store.write().await;
            let mut reservation = tables
                .reservations
                .get(&id)
                .cloned()
                .ok_or_else(|| InventoryError::not_found("reservation", id))?;

            if let Some(mac) = update.mac {
                reservation.mac = mac.as_deref().map(normalize_mac).transpose()?;
            }
            if let Some(description) = update.description {
                reservation.description = description;
            }
            if let Some(purpose) = update.purpose {
                reservation.purpose = purpose;
            }
            if let Some(expires_at) = update.expires_at {
                reservation.expires_at = expires_at;
            }
            if let Some(active) = update.active {
                reservation.active = active;
            }

            let now = Utc::now();
            if reservation.is_effective(now)
                && tables.reservations.values().any(|r| {
                    r.id != id && r.ip == reservation.ip && r.subnet_id == reservation.subnet_id && r.is_effective(now)
                })
            {
                return Err(InventoryError::Validation(format!(
                    "{} is already reserved",
                    reservation.ip
                )));
            }

            reservation.updated_at = now;
            tables.reservations.insert(id, reservation.clone());
            reservation
        };

        self.store.flush().await?;
        Ok(updated)
    }

    pub async fn delete_reservation(&self, id: Uuid) -> crate::Result<IpReservation> {
        let removed = self
            .store
            .write()
            .await
            .reservations
            .remove(&id)
            .ok_or_else(|| InventoryError::not_found("reservation", id))?;

        self.store.flush().await?;
        Ok(removed)
    }
}
