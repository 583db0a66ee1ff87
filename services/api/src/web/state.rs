//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use ev_tracker_core::ports::{Geocoder, SessionStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub config: Arc<Config>,
}
