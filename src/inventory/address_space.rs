//! Available-address computation and subnet usage summaries

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::cidr::{self, HostRange};
use crate::inventory::models::{DeviceStatus, NetworkDevice, Subnet, SubnetSummary};
use crate::store::Tables;

/// Whether a device counts as sitting in `subnet`: assigned to it, or
/// unassigned with an address inside it
pub(crate) fn belongs_to(device: &NetworkDevice, subnet: &Subnet) -> bool {
    match device.subnet_id {
        Some(id) => id == subnet.id,
        None => subnet.network.contains(device.ip),
    }
}

/// Gateway, device and effective reservation addresses of a subnet
fn taken_addresses(tables: &Tables, subnet: &Subnet, now: DateTime<Utc>) -> HashSet<Ipv4Addr> {
    let mut taken: HashSet<Ipv4Addr> = subnet.gateway.into_iter().collect();

    taken.extend(
        tables
            .devices
            .values()
            .filter(|d| belongs_to(d, subnet))
            .map(|d| d.ip),
    );

    taken.extend(
        tables
            .reservations
            .values()
            .filter(|r| r.subnet_id == subnet.id && r.is_effective(now))
            .map(|r| r.ip),
    );

    taken
}

/// Lazy ascending iterator over the free hosts of a subnet
pub fn free_addresses<'a>(
    tables: &'a Tables,
    subnet: &'a Subnet,
    avoid_dhcp: bool,
) -> impl Iterator<Item = Ipv4Addr> + 'a {
    let taken = taken_addresses(tables, subnet, Utc::now());
    cidr::host_range(&subnet.network)
        .filter(move |ip| !taken.contains(ip))
        .filter(move |ip| !(avoid_dhcp && subnet.in_dhcp_range(*ip)))
}

pub fn available(tables: &Tables, subnet: &Subnet, avoid_dhcp: bool) -> Vec<Ipv4Addr> {
    free_addresses(tables, subnet, avoid_dhcp).collect()
}

pub fn next_available(tables: &Tables, subnet: &Subnet, avoid_dhcp: bool) -> Option<Ipv4Addr> {
    free_addresses(tables, subnet, avoid_dhcp).next()
}

/// A usable host of the subnet that nothing holds. DHCP pool addresses count
/// as available.
pub fn is_free(tables: &Tables, subnet: &Subnet, ip: Ipv4Addr) -> bool {
    cidr::is_host_of(&subnet.network, ip) && !taken_addresses(tables, subnet, Utc::now()).contains(&ip)
}

pub fn summary(tables: &Tables, subnet: &Subnet) -> SubnetSummary {
    let hosts = cidr::host_range(&subnet.network);
    let total_hosts = hosts.len();

    let used = taken_addresses(tables, subnet, Utc::now())
        .into_iter()
        .filter(|ip| hosts.contains(*ip))
        .count() as u64;

    let dhcp_range_size = subnet
        .dhcp_range()
        .map(|(start, end)| HostRange::between(start, end).len())
        .unwrap_or(0);

    let (online_devices, offline_devices) = tables
        .devices
        .values()
        .filter(|d| belongs_to(d, subnet))
        .fold((0, 0), |(online, offline), d| match d.status {
            DeviceStatus::Online => (online + 1, offline),
            DeviceStatus::Offline => (online, offline + 1),
            DeviceStatus::Unknown => (online, offline),
        });

    let usage_percent = if total_hosts == 0 {
        0.0
    } else {
        used as f64 / total_hosts as f64 * 100.0
    };

    SubnetSummary {
        subnet_id: subnet.id,
        network: subnet.network,
        total_hosts,
        used,
        available: total_hosts.saturating_sub(used),
        dhcp_range_size,
        online_devices,
        offline_devices,
        usage_percent,
    }
}
