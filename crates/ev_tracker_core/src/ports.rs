//! crates/ev_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the tracker's external collaborators.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the log file format and of any particular geocoding provider.

use async_trait::async_trait;

use crate::domain::{ChargingSession, Coordinates, NormalizedLog, RawRecord};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Lookup failed: {0}")]
    Lookup(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The durable session log.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the log with a header-only body when it is missing or empty.
    async fn ensure_initialized(&self) -> PortResult<()>;

    /// Reads every stored row as-is, in file order.
    async fn load_records(&self) -> PortResult<Vec<RawRecord>>;

    /// Appends one session to the end of the log.
    async fn append(&self, session: &ChargingSession) -> PortResult<()>;

    /// Replaces the whole log. Readers see either the old or the new content.
    async fn replace_all(&self, log: &NormalizedLog) -> PortResult<()>;
}

/// Resolves a free-text place name to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the provider answered but found nothing.
    async fn geocode(&self, place: &str) -> PortResult<Option<Coordinates>>;
}
