//! crates/ev_tracker_core/src/workflow.rs
//!
//! The tracker's use cases, written against the ports: loading the log,
//! logging one session, bulk replacement from the table editor, and
//! backfilling coordinates for sessions that have none.

use tracing::{debug, info, warn};

use crate::domain::{
    ChargingSession, NewSession, NormalizedLog, RawRecord, SessionFields, ValidationError,
};
use crate::ports::{Geocoder, PortError, SessionStore};
use crate::transform::{coordinate_index, merge_coordinates, normalize};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Session log error: {0}")]
    Store(#[from] PortError),
}

/// The log as read for one request, plus the reason it is empty when loading failed.
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    pub log: NormalizedLog,
    pub condition: Option<String>,
}

/// A session that was written, with any soft failures met on the way.
#[derive(Debug, Clone)]
pub struct LoggedSession {
    pub session: ChargingSession,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CoordinateResolution {
    pub log: NormalizedLog,
    /// Location names the geocoder found.
    pub resolved: Vec<String>,
    /// Location names that are still without coordinates.
    pub unresolved: Vec<String>,
    /// Sessions that gained coordinates.
    pub filled: usize,
    pub rewritten: bool,
}

/// Reads and normalizes the whole log. Never fails: an unreadable log is
/// reported through `condition` and treated as empty.
pub async fn load_log(store: &dyn SessionStore) -> LoadedLog {
    let loaded = async {
        store.ensure_initialized().await?;
        store.load_records().await
    }
    .await;

    match loaded {
        Ok(records) => {
            let log = normalize(&records);
            debug!("Loaded {} sessions", log.len());
            LoadedLog {
                log,
                condition: None,
            }
        }
        Err(e) => {
            warn!("Error loading data: {}", e);
            LoadedLog {
                log: NormalizedLog::default(),
                condition: Some(format!("Error loading data: {}", e)),
            }
        }
    }
}

/// Validates a form submission, resolves its coordinates and appends it.
pub async fn log_session(
    store: &dyn SessionStore,
    geocoder: &dyn Geocoder,
    entry: NewSession,
) -> Result<LoggedSession, WorkflowError> {
    let provider = entry.resolve_provider()?;
    entry.validate_amounts()?;

    let location = entry.location.trim().to_string();
    let mut warnings = Vec::new();

    let coordinates = match entry.supplied_coordinates() {
        Some(coordinates) => Some(coordinates),
        None if location.is_empty() => None,
        None => match geocoder.geocode(&location).await {
            Ok(Some(found)) => {
                info!(
                    "Coordinates found for '{}': {:.4}, {:.4}",
                    location, found.latitude, found.longitude
                );
                Some(found)
            }
            Ok(None) => {
                warnings.push(format!(
                    "Could not auto-find '{}'. Saved without coordinates.",
                    location
                ));
                None
            }
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", location, e);
                warnings.push(format!(
                    "Could not auto-find '{}' ({}). Saved without coordinates.",
                    location, e
                ));
                None
            }
        },
    };

    let session = ChargingSession::from_fields(SessionFields {
        date: Some(entry.date),
        time: None,
        provider,
        location,
        coordinates,
        charge_type: Some(entry.charge_type),
        energy_kwh: entry.energy_kwh,
        total_cost: entry.total_cost,
    });

    store.append(&session).await?;
    info!("Charging session saved ({} at {})", session.provider, session.date_cell());

    Ok(LoggedSession { session, warnings })
}

/// Replaces the whole log with the rows from the table editor.
///
/// Every row is normalized first, so `Cost_per_kWh` and `Month` are recomputed.
pub async fn replace_sessions(
    store: &dyn SessionStore,
    rows: &[RawRecord],
) -> Result<NormalizedLog, WorkflowError> {
    let log = normalize(rows);
    store.replace_all(&log).await?;
    info!("Session log rewritten with {} rows", log.len());
    Ok(log)
}

/// Gives coordinates to sessions that have none: first from other sessions
/// at the same named location, then from the geocoder. Rewrites the log only
/// when something changed.
pub async fn resolve_missing_coordinates(
    store: &dyn SessionStore,
    geocoder: &dyn Geocoder,
) -> Result<CoordinateResolution, WorkflowError> {
    store.ensure_initialized().await?;
    let log = normalize(&store.load_records().await?);
    let mut index = coordinate_index(&log);

    let mut pending: Vec<String> = Vec::new();
    for session in log.iter() {
        if session.coordinates.is_none()
            && session.has_named_location()
            && !index.contains_key(&session.location)
            && !pending.contains(&session.location)
        {
            pending.push(session.location.clone());
        }
    }

    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();
    for place in pending {
        match geocoder.geocode(&place).await {
            Ok(Some(found)) => {
                index.insert(place.clone(), found);
                resolved.push(place);
            }
            Ok(None) => unresolved.push(place),
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", place, e);
                unresolved.push(place);
            }
        }
    }

    let merged = merge_coordinates(&log, &index);
    let filled = merged
        .iter()
        .zip(log.iter())
        .filter(|(after, before)| after.coordinates != before.coordinates)
        .count();

    let rewritten = filled > 0;
    if rewritten {
        store.replace_all(&merged).await?;
    }
    info!(
        "Coordinate backfill: {} sessions filled, {} locations unresolved",
        filled,
        unresolved.len()
    );

    Ok(CoordinateResolution {
        log: merged,
        resolved,
        unresolved,
        filled,
        rewritten,
    })
}
