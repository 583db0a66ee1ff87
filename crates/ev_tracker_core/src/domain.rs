//! crates/ev_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the tracker.
//! These structs are independent of the log file format and of any wire format.

use crate::transform::compute_cost_per_kwh;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

//=========================================================================================
// Canonical Schema
//=========================================================================================

pub const COL_DATE: &str = "Date";
pub const COL_PROVIDER: &str = "Provider";
pub const COL_LOCATION: &str = "Location";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";
pub const COL_TYPE: &str = "Type";
pub const COL_KWH: &str = "kWh";
pub const COL_TOTAL_COST: &str = "Total Cost";
pub const COL_COST_PER_KWH: &str = "Cost_per_kWh";
pub const COL_MONTH: &str = "Month";

/// The fixed, ordered column set every read and write of the log conforms to.
pub const CANONICAL_COLUMNS: [&str; 10] = [
    COL_DATE,
    COL_PROVIDER,
    COL_LOCATION,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_TYPE,
    COL_KWH,
    COL_TOTAL_COST,
    COL_COST_PER_KWH,
    COL_MONTH,
];

/// Charging networks offered by the entry form. "Other" switches to free text.
pub const KNOWN_PROVIDERS: [&str; 10] = [
    "Gentari",
    "JomCharge",
    "chargEV",
    "Shell Recharge",
    "TNB Electron",
    "ChargeSini",
    "Tesla Supercharger",
    "DC Handal",
    "Home",
    OTHER_PROVIDER,
];

pub const OTHER_PROVIDER: &str = "Other";

//=========================================================================================
// Value Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeType {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Ac => "AC",
            ChargeType::Dc => "DC",
        }
    }

    /// Case-insensitive match against `AC` / `DC`; anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AC" => Some(ChargeType::Ac),
            "DC" => Some(ChargeType::Dc),
            _ => None,
        }
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved geographic position. Latitude and longitude only ever travel together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Builds a pair only when both halves are present and finite.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Self::new(lat, lon))
            }
            _ => None,
        }
    }
}

//=========================================================================================
// Raw Records
//=========================================================================================

/// One stored row as text cells keyed by column name. Columns may be missing or extra.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

//=========================================================================================
// Charging Sessions
//=========================================================================================

/// The persisted source fields of a session. Everything else is derived from these.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFields {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub provider: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub charge_type: Option<ChargeType>,
    pub energy_kwh: f64,
    pub total_cost: f64,
}

/// One logged charging event in canonical, fully-typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingSession {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub provider: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub charge_type: Option<ChargeType>,
    pub energy_kwh: f64,
    pub total_cost: f64,
    pub cost_per_kwh: f64,
    pub month: Option<String>,
    pub day_of_week: Option<String>,
}

impl ChargingSession {
    /// Builds a session and computes `cost_per_kwh`, `month` and `day_of_week`.
    pub fn from_fields(fields: SessionFields) -> Self {
        let cost_per_kwh = compute_cost_per_kwh(fields.total_cost, fields.energy_kwh);
        Self {
            month: fields.date.map(month_key),
            day_of_week: fields.date.map(|d| weekday_name(d.weekday()).to_string()),
            date: fields.date,
            time: fields.time,
            provider: fields.provider,
            location: fields.location,
            coordinates: fields.coordinates,
            charge_type: fields.charge_type,
            energy_kwh: fields.energy_kwh,
            total_cost: fields.total_cost,
            cost_per_kwh,
        }
    }

    pub fn fields(&self) -> SessionFields {
        SessionFields {
            date: self.date,
            time: self.time,
            provider: self.provider.clone(),
            location: self.location.clone(),
            coordinates: self.coordinates,
            charge_type: self.charge_type,
            energy_kwh: self.energy_kwh,
            total_cost: self.total_cost,
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.longitude)
    }

    pub fn has_named_location(&self) -> bool {
        !self.location.trim().is_empty()
    }

    /// The `Date` cell as written to the log.
    pub fn date_cell(&self) -> String {
        match (self.date, self.time) {
            (Some(date), Some(time)) => date
                .and_time(time)
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string(),
            (Some(date), None) => date.format("%Y-%m-%d").to_string(),
            (None, _) => String::new(),
        }
    }

    /// The session as canonical cells, in `CANONICAL_COLUMNS` order.
    pub fn to_row(&self) -> [String; 10] {
        [
            self.date_cell(),
            self.provider.clone(),
            self.location.clone(),
            self.latitude().map(|v| v.to_string()).unwrap_or_default(),
            self.longitude().map(|v| v.to_string()).unwrap_or_default(),
            self.charge_type.map(|t| t.to_string()).unwrap_or_default(),
            self.energy_kwh.to_string(),
            self.total_cost.to_string(),
            self.cost_per_kwh.to_string(),
            self.month.clone().unwrap_or_default(),
        ]
    }

    pub fn to_record(&self) -> RawRecord {
        CANONICAL_COLUMNS.iter().copied().zip(self.to_row()).collect()
    }
}

/// `YYYY-MM` key of a date.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

//=========================================================================================
// Normalized Log
//=========================================================================================

/// An ordered, canonical session collection. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedLog {
    sessions: Vec<ChargingSession>,
}

impl NormalizedLog {
    pub fn new(sessions: Vec<ChargingSession>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &[ChargingSession] {
        &self.sessions
    }

    pub fn push(&mut self, session: ChargingSession) {
        self.sessions.push(session);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChargingSession> {
        self.sessions.iter()
    }

    pub fn to_records(&self) -> Vec<RawRecord> {
        self.sessions.iter().map(ChargingSession::to_record).collect()
    }
}

impl FromIterator<ChargingSession> for NormalizedLog {
    fn from_iter<I: IntoIterator<Item = ChargingSession>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NormalizedLog {
    type Item = &'a ChargingSession;
    type IntoIter = std::slice::Iter<'a, ChargingSession>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

//=========================================================================================
// Entry Submissions
//=========================================================================================

/// Rejections raised by the entry workflow. Nothing is written when one occurs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please specify provider name.")]
    MissingProvider,
    #[error("Energy must be greater than 0 kWh (got {0}).")]
    NonPositiveEnergy(f64),
    #[error("Total cost cannot be negative (got {0}).")]
    NegativeCost(f64),
}

/// A session as submitted by the entry form, before validation and derivation.
///
/// `latitude`/`longitude` use `0.0` to mean "unset, resolve from the location name".
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub provider: String,
    pub custom_provider: Option<String>,
    pub location: String,
    pub date: NaiveDate,
    pub charge_type: ChargeType,
    pub energy_kwh: f64,
    pub total_cost: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewSession {
    /// The effective provider name: the custom text when "Other" is selected.
    pub fn resolve_provider(&self) -> Result<String, ValidationError> {
        let selected = self.provider.trim();
        let provider = if selected == OTHER_PROVIDER {
            self.custom_provider.as_deref().unwrap_or_default().trim()
        } else {
            selected
        };
        if provider.is_empty() {
            return Err(ValidationError::MissingProvider);
        }
        Ok(provider.to_string())
    }

    pub fn validate_amounts(&self) -> Result<(), ValidationError> {
        if !self.energy_kwh.is_finite() || self.energy_kwh <= 0.0 {
            return Err(ValidationError::NonPositiveEnergy(self.energy_kwh));
        }
        if !self.total_cost.is_finite() || self.total_cost < 0.0 {
            return Err(ValidationError::NegativeCost(self.total_cost));
        }
        Ok(())
    }

    /// The user-supplied pair, or `None` when either half is the `0.0` sentinel.
    pub fn supplied_coordinates(&self) -> Option<Coordinates> {
        if self.latitude == 0.0 || self.longitude == 0.0 {
            return None;
        }
        Coordinates::from_parts(Some(self.latitude), Some(self.longitude))
    }
}
