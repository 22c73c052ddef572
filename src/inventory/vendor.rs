//! MAC vendor lookup

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Vendor reported for locally administered (randomised or virtual) MACs
pub const RANDOMIZED_MAC: &str = "Randomized MAC";

/// Maps a normalised MAC (`AA:BB:CC:DD:EE:FF`) to a manufacturer name
pub trait VendorLookup: Send + Sync {
    fn lookup(&self, mac: &str) -> Option<String>;
}

/// Never knows the vendor
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownVendor;

impl VendorLookup for UnknownVendor {
    fn lookup(&self, _mac: &str) -> Option<String> {
        None
    }
}

static BUILTIN_OUI: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("00:00:0C", "Cisco"),
        ("00:0C:29", "VMware"),
        ("00:50:56", "VMware"),
        ("08:00:27", "Oracle VirtualBox"),
        ("00:11:32", "Synology"),
        ("00:14:22", "Dell"),
        ("00:17:88", "Philips Lighting"),
        ("00:1A:11", "Google"),
        ("00:1B:63", "Apple"),
        ("00:1C:B3", "Apple"),
        ("3C:22:FB", "Apple"),
        ("00:1B:78", "Hewlett Packard"),
        ("00:80:77", "Brother"),
        ("18:E8:29", "Ubiquiti"),
        ("24:A4:3C", "Ubiquiti"),
        ("50:C7:BF", "TP-Link"),
        ("B8:27:EB", "Raspberry Pi Foundation"),
        ("DC:A6:32", "Raspberry Pi Trading"),
    ]
    .into_iter()
    .collect()
});

/// Bit 1 of the first octet marks a locally administered address
pub fn is_locally_administered(mac: &str) -> bool {
    let first: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).take(2).collect();
    if first.len() < 2 {
        return false;
    }
    u8::from_str_radix(&first, 16)
        .map(|octet| octet & 0x02 != 0)
        .unwrap_or(false)
}

/// Prefix table keyed by the first three octets
#[derive(Debug, Clone)]
pub struct OuiVendorTable {
    entries: HashMap<String, String>,
}

impl Default for OuiVendorTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OuiVendorTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_OUI
                .iter()
                .map(|(oui, vendor)| (oui.to_string(), vendor.to_string()))
                .collect(),
        }
    }

    pub fn with_entry(mut self, oui: &str, vendor: &str) -> Self {
        self.entries.insert(oui.to_ascii_uppercase(), vendor.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VendorLookup for OuiVendorTable {
    fn lookup(&self, mac: &str) -> Option<String> {
        if is_locally_administered(mac) {
            return Some(RANDOMIZED_MAC.to_string());
        }
        let oui = mac.get(..8)?.to_ascii_uppercase();
        self.entries.get(&oui).cloned()
    }
}
