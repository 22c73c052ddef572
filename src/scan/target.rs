//! Target parsing: CIDR blocks, last-octet dash ranges and single hosts

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;

use crate::cidr;
use crate::config::ScanLimits;
use crate::error::InventoryError;

/// Lowest last octet a dash range may start at
const RANGE_FIRST_OCTET: u8 = 1;

/// Highest last octet a dash range may reach
const RANGE_LAST_OCTET: u8 = 254;

/// Longest accepted host name
const MAX_HOST_LEN: usize = 253;

static DASH_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})-(\d{1,3})$")
        .expect("dash range pattern is valid")
});

/// A parsed scan target
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    /// `a.b.c.d/nn`
    Cidr(ipnetwork::Ipv4Network),
    /// `a.b.c.start-end`, inclusive, on the last octet
    Range { prefix: [u8; 3], start: u8, end: u8 },
    /// Host name or single address
    Host(String),
}

/// Target parser with expansion limits
#[derive(Debug, Clone)]
pub struct TargetParser {
    max_range_hosts: usize,
    max_cidr_hosts: u64,
}

impl Default for TargetParser {
    fn default() -> Self {
        Self::from_limits(&ScanLimits::default())
    }
}

impl TargetParser {
    pub fn new(max_range_hosts: usize, max_cidr_hosts: u64) -> Self {
        Self {
            max_range_hosts,
            max_cidr_hosts,
        }
    }

    pub fn from_limits(limits: &ScanLimits) -> Self {
        Self::new(limits.max_range_hosts, limits.max_cidr_hosts)
    }

    /// Classify and validate a target string
    pub fn parse(&self, target: &str) -> crate::Result<TargetSpec> {
        let target = target.trim();

        if target.is_empty() {
            return Err(InventoryError::InvalidTarget("target cannot be empty".to_string()));
        }

        if target.chars().any(char::is_whitespace) {
            return Err(InventoryError::InvalidTarget(format!(
                "whitespace in target: {:?}",
                target
            )));
        }

        if target.contains('/') {
            let network = cidr::parse_ipv4_cidr(target)
                .map_err(|e| InventoryError::InvalidTarget(e.to_string()))?;

            let hosts = cidr::host_count(network.prefix());
            if hosts > self.max_cidr_hosts {
                return Err(InventoryError::InvalidTarget(format!(
                    "CIDR network too large: {} hosts (max: {})",
                    hosts, self.max_cidr_hosts
                )));
            }
            return Ok(TargetSpec::Cidr(network));
        }

        if let Some(captures) = DASH_RANGE.captures(target) {
            let mut octets = [0u8; 5];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = captures[i + 1].parse().map_err(|_| {
                    InventoryError::InvalidTarget(format!("octet out of range in {}", target))
                })?;
            }

            let start = octets[3].max(RANGE_FIRST_OCTET);
            let end = octets[4].min(RANGE_LAST_OCTET);
            if start > end {
                return Err(InventoryError::InvalidTarget(format!(
                    "range start is after range end in {}",
                    target
                )));
            }

            return Ok(TargetSpec::Range {
                prefix: [octets[0], octets[1], octets[2]],
                start,
                end,
            });
        }

        if target.len() > MAX_HOST_LEN {
            return Err(InventoryError::InvalidTarget(format!(
                "target too long (max {} characters)",
                MAX_HOST_LEN
            )));
        }

        Ok(TargetSpec::Host(target.to_string()))
    }

    /// Concrete addresses for a target
    pub fn expand(&self, target: &str) -> crate::Result<Vec<String>> {
        let spec = self.parse(target)?;
        Ok(self.addresses(&spec))
    }

    pub fn addresses(&self, spec: &TargetSpec) -> Vec<String> {
        match spec {
            TargetSpec::Cidr(network) => cidr::host_range(network)
                .map(|ip| ip.to_string())
                .collect(),
            TargetSpec::Range { prefix, start, end } => (*start..=*end)
                .take(self.max_range_hosts)
                .map(|last| Ipv4Addr::new(prefix[0], prefix[1], prefix[2], last).to_string())
                .collect(),
            TargetSpec::Host(host) => vec![host.clone()],
        }
    }
}

/// Expand a target with the default limits
pub fn expand_target(target: &str) -> crate::Result<Vec<String>> {
    TargetParser::default().expand(target)
}
