//! netledger - network inventory and discovery
//!
//! Finds reachable hosts and services on IPv4 networks, tracks each scan as a
//! durable session, and plans address space for administrator-defined subnets
//! with device reconciliation and change history.

pub mod cidr;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod probe;
pub mod scan;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::InventoryConfig;
pub use error::InventoryError;
pub use inventory::{DeviceObservation, InventoryService, NetworkDevice, Subnet};
pub use probe::{NetworkProber, ProbedService, Prober};
pub use scan::{expand_target, ScanOrchestrator, ScanReport};
pub use session::{ScanService, ScanSession, ScanType, SessionStatus, SessionTracker};
pub use store::Store;

pub type Result<T> = std::result::Result<T, InventoryError>;
