//! Error handling for the inventory and discovery engine
//!
//! Expected negative outcomes of probing (closed port, unreachable host,
//! failed reverse lookup) are plain values and never reach this type. What
//! remains are caller input errors, missing records the caller must be told
//! about, illegal session transitions and storage failures.

use thiserror::Error;

use crate::session::SessionStatus;

/// Main error type for inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Illegal session transition {from} -> {to}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout error")]
    Timeout,
}

impl InventoryError {
    /// Shorthand for a missing record
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        InventoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            InventoryError::InvalidTarget(_)
                | InventoryError::InvalidCidr(_)
                | InventoryError::Validation(_)
        )
    }
}

/// Convert common errors to InventoryError
impl From<std::net::AddrParseError> for InventoryError {
    fn from(e: std::net::AddrParseError) -> Self {
        InventoryError::Validation(e.to_string())
    }
}

impl From<std::num::ParseIntError> for InventoryError {
    fn from(e: std::num::ParseIntError) -> Self {
        InventoryError::Validation(e.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for InventoryError {
    fn from(e: ipnetwork::IpNetworkError) -> Self {
        InventoryError::InvalidCidr(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for InventoryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        InventoryError::Timeout
    }
}
