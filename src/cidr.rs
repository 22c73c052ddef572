//! Exact IPv4 host arithmetic shared by target expansion and address planning
//!
//! Addresses are handled as `u32` values of their big-endian octets. The host
//! range of a block excludes the network and broadcast addresses, so a block
//! with prefix `n` has exactly `2^(32-n) - 2` hosts (zero for /31 and /32).

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::InventoryError;

/// Parse strict `a.b.c.d/nn` notation. Host bits may be set; they are masked
/// off by [`network_base`].
pub fn parse_ipv4_cidr(input: &str) -> crate::Result<Ipv4Network> {
    let input = input.trim();
    let (addr, prefix) = input
        .split_once('/')
        .ok_or_else(|| InventoryError::InvalidCidr(format!("missing prefix length: {}", input)))?;

    let addr = Ipv4Addr::from_str(addr)
        .map_err(|_| InventoryError::InvalidCidr(format!("invalid IPv4 address: {}", input)))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| InventoryError::InvalidCidr(format!("invalid prefix length: {}", input)))?;

    Ok(Ipv4Network::new(addr, prefix)?)
}

/// Netmask for a prefix length as a `u32`
pub fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    }
}

/// Network base address as a `u32`
pub fn network_base(network: &Ipv4Network) -> u32 {
    u32::from(network.ip()) & mask(network.prefix())
}

/// The same block with host bits cleared
pub fn canonical(network: &Ipv4Network) -> crate::Result<Ipv4Network> {
    Ok(Ipv4Network::new(Ipv4Addr::from(network_base(network)), network.prefix())?)
}

/// Number of usable hosts in a block of the given prefix length
pub fn host_count(prefix: u8) -> u64 {
    let size = 1u64 << (32 - u32::from(prefix.min(32)));
    size.saturating_sub(2)
}

/// Usable hosts of a block, ascending
pub fn host_range(network: &Ipv4Network) -> HostRange {
    let count = host_count(network.prefix());
    if count == 0 {
        return HostRange::empty();
    }

    let base = u64::from(network_base(network));
    let first = (base + 1) as u32;
    let last = (base + count) as u32;
    HostRange { inner: first..=last }
}

/// Whether `ip` is a usable host of `network`
pub fn is_host_of(network: &Ipv4Network, ip: Ipv4Addr) -> bool {
    host_range(network).contains(ip)
}

/// Lazy ascending iterator over the usable hosts of a block
#[derive(Debug, Clone)]
pub struct HostRange {
    inner: RangeInclusive<u32>,
}

impl HostRange {
    fn empty() -> Self {
        #[allow(clippy::reversed_empty_ranges)]
        Self { inner: 1..=0 }
    }

    /// Inclusive range between two addresses; empty when `start > end`
    pub fn between(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        Self {
            inner: u32::from(start)..=u32::from(end),
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.inner.contains(&u32::from(ip))
    }

    /// Number of addresses without iterating
    pub fn len(&self) -> u64 {
        if self.inner.is_empty() {
            0
        } else {
            u64::from(*self.inner.end()) - u64::from(*self.inner.start()) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Iterator for HostRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Ipv4Addr::from)
    }
}

impl DoubleEndedIterator for HostRange {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(Ipv4Addr::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slash_30() {
        let net = parse_ipv4_cidr("10.0.0.0/30").unwrap();
        let hosts: Vec<_> = host_range(&net).collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let net = parse_ipv4_cidr("192.168.1.77/24").unwrap();
        let hosts = host_range(&net);
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.clone().next(), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_point_to_point_and_single_host_are_empty() {
        assert!(host_range(&parse_ipv4_cidr("10.0.0.0/31").unwrap()).is_empty());
        assert!(host_range(&parse_ipv4_cidr("10.0.0.7/32").unwrap()).is_empty());
        assert_eq!(host_count(31), 0);
        assert_eq!(host_count(32), 0);
    }

    #[test]
    fn test_whole_space_count() {
        assert_eq!(host_count(0), (1u64 << 32) - 2);
        let all = host_range(&parse_ipv4_cidr("0.0.0.0/0").unwrap());
        assert_eq!(all.len(), (1u64 << 32) - 2);
        assert_eq!(all.clone().next_back(), Some(Ipv4Addr::new(255, 255, 255, 254)));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_ipv4_cidr("10.0.0.0").is_err());
        assert!(parse_ipv4_cidr("10.0.0.0/33").is_err());
        assert!(parse_ipv4_cidr("10.0.0/24").is_err());
        assert!(parse_ipv4_cidr("fe80::/64").is_err());
        assert!(parse_ipv4_cidr("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_between_is_inclusive() {
        let range = HostRange::between(Ipv4Addr::new(10, 0, 0, 100), Ipv4Addr::new(10, 0, 0, 110));
        assert_eq!(range.len(), 11);
        assert!(range.contains(Ipv4Addr::new(10, 0, 0, 110)));
        assert!(HostRange::between(Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(10, 0, 0, 1)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_host_count_excludes_network_and_broadcast(
            octets in any::<[u8; 4]>(),
            prefix in 1u8..=30,
        ) {
            let net = Ipv4Network::new(Ipv4Addr::from(octets), prefix).unwrap();
            let range = host_range(&net);
            prop_assert_eq!(range.len(), (1u64 << (32 - prefix)) - 2);

            let base = network_base(&net);
            let broadcast = base | !mask(prefix);
            let first = range.clone().next().unwrap();
            let last = range.clone().next_back().unwrap();
            prop_assert_eq!(u32::from(first), base + 1);
            prop_assert_eq!(u32::from(last), broadcast - 1);

            // Full enumeration only for blocks small enough to walk quickly
            if prefix >= 20 {
                let hosts: Vec<_> = range.collect();
                prop_assert_eq!(hosts.len() as u64, host_count(prefix));
                prop_assert!(!hosts.contains(&Ipv4Addr::from(base)));
                prop_assert!(!hosts.contains(&Ipv4Addr::from(broadcast)));
            }
        }
    }
}
