//! Well-known TCP port labels

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Label used when a port is not in the table
pub const UNKNOWN_SERVICE: &str = "Unknown";

const WELL_KNOWN_TCP: &[(u16, &str)] = &[
    (20, "FTP-Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (88, "Kerberos"),
    (110, "POP3"),
    (111, "RPC"),
    (135, "MSRPC"),
    (139, "NetBIOS"),
    (143, "IMAP"),
    (161, "SNMP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (514, "Syslog"),
    (548, "AFP"),
    (554, "RTSP"),
    (587, "SMTP-Submission"),
    (631, "IPP"),
    (636, "LDAPS"),
    (873, "Rsync"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (1883, "MQTT"),
    (2049, "NFS"),
    (2375, "Docker"),
    (3000, "HTTP-Dev"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5000, "UPnP"),
    (5432, "PostgreSQL"),
    (5672, "AMQP"),
    (5900, "VNC"),
    (6379, "Redis"),
    (6443, "Kubernetes-API"),
    (8000, "HTTP-Alt"),
    (8008, "HTTP-Alt"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
    (8888, "HTTP-Alt"),
    (9000, "HTTP-Mgmt"),
    (9090, "Prometheus"),
    (9100, "JetDirect"),
    (9200, "Elasticsearch"),
    (11211, "Memcached"),
    (27017, "MongoDB"),
];

static LABELS: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| WELL_KNOWN_TCP.iter().copied().collect());

/// Ports that get an HTTP title probe
const WEB_PORTS: &[u16] = &[80, 443, 8000, 8008, 8080, 8443, 8888];

/// Ports served over TLS among [`WEB_PORTS`]
const TLS_WEB_PORTS: &[u16] = &[443, 8443];

/// Ports scanned when the caller gives none
const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 993, 995, 1433, 3306, 3389, 5432,
    5900, 6379, 8080, 8443,
];

/// Coarse service label for a port, `"Unknown"` when not tabled
pub fn service_label(port: u16) -> &'static str {
    LABELS.get(&port).copied().unwrap_or(UNKNOWN_SERVICE)
}

pub fn is_web_port(port: u16) -> bool {
    WEB_PORTS.contains(&port)
}

pub fn is_tls_web_port(port: u16) -> bool {
    TLS_WEB_PORTS.contains(&port)
}

pub fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

/// Ports 1-1024 plus every tabled port above 1024, ascending
pub fn extended_ports() -> Vec<u16> {
    let mut ports: Vec<u16> = (1..=1024).collect();
    ports.extend(
        WELL_KNOWN_TCP
            .iter()
            .map(|(port, _)| *port)
            .filter(|port| *port > 1024),
    );
    ports.sort_unstable();
    ports.dedup();
    ports
}
