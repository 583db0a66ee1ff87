//! services/api/src/adapters/nominatim.rs
//!
//! This module contains the adapter for a Nominatim-compatible place search.
//! It implements the `Geocoder` port from the `core` crate.

use async_trait::async_trait;
use ev_tracker_core::domain::Coordinates;
use ev_tracker_core::ports::{Geocoder, PortError, PortResult};
use serde::Deserialize;

use crate::config::GeocoderConfig;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `Geocoder` port over HTTP.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

impl NominatimGeocoder {
    /// Creates a new `NominatimGeocoder`.
    pub fn new(config: &GeocoderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        })
    }

    fn query_for(&self, place: &str) -> String {
        if self.region.trim().is_empty() {
            place.to_string()
        } else {
            format!("{}, {}", place, self.region)
        }
    }
}

/// One search hit. Nominatim sends coordinates as strings.
#[derive(Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

fn first_coordinates(hits: &[SearchHit]) -> Option<Coordinates> {
    let hit = hits.first()?;
    Coordinates::from_parts(hit.lat.trim().parse().ok(), hit.lon.trim().parse().ok())
}

//=========================================================================================
// `Geocoder` Trait Implementation
//=========================================================================================

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, place: &str) -> PortResult<Option<Coordinates>> {
        let query = self.query_for(place);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| PortError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Lookup(format!(
                "geocoder answered {} for '{}'",
                status, query
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| PortError::Lookup(e.to_string()))?;
        Ok(first_coordinates(&hits))
    }
}

//=========================================================================================
// Disabled Lookups
//=========================================================================================

/// Used when geocoding is switched off: every place is "not found".
#[derive(Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn geocode(&self, _place: &str) -> PortResult<Option<Coordinates>> {
        Ok(None)
    }
}
