//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the dashboard and the API server.

use chrono::NaiveDate;
use ev_tracker_core::aggregate::{AggregateView, LocationAggregate};
use ev_tracker_core::domain::{
    ChargeType, ChargingSession, NewSession, RawRecord, COL_DATE, COL_KWH, COL_LATITUDE,
    COL_LOCATION, COL_LONGITUDE, COL_PROVIDER, COL_TOTAL_COST, COL_TYPE,
};
use ev_tracker_core::transform::Summary;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Query Parameters
//=========================================================================================

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    /// `YYYY-MM`, or `All` (the default).
    pub month: Option<String>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AggregateQuery {
    /// `YYYY-MM`, or `All` (the default).
    pub month: Option<String>,
    /// Ranking key for `top_n`: `provider`, `location`, `type` or `month`.
    pub key: Option<String>,
    /// Ranking metric for `top_n`: `total_cost`, `energy` or `sessions`.
    pub metric: Option<String>,
    /// Number of rows kept by `top_n`.
    pub limit: Option<usize>,
}

//=========================================================================================
// Sessions
//=========================================================================================

/// One row of the editable table. Also accepted back from the table editor,
/// where `cost_per_kwh`, `month` and `day_of_week` are ignored and recomputed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct SessionRow {
    pub date: Option<String>,
    pub provider: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub charge_type: Option<String>,
    pub energy_kwh: Option<f64>,
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub cost_per_kwh: Option<f64>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<String>,
}

impl From<&ChargingSession> for SessionRow {
    fn from(session: &ChargingSession) -> Self {
        let date = session.date_cell();
        Self {
            date: (!date.is_empty()).then_some(date),
            provider: Some(session.provider.clone()),
            location: Some(session.location.clone()),
            latitude: session.latitude(),
            longitude: session.longitude(),
            charge_type: session.charge_type.map(|t| t.to_string()),
            energy_kwh: Some(session.energy_kwh),
            total_cost: Some(session.total_cost),
            cost_per_kwh: Some(session.cost_per_kwh),
            month: session.month.clone(),
            day_of_week: session.day_of_week.clone(),
        }
    }
}

impl SessionRow {
    /// The row as stored cells. Derived columns are left out on purpose.
    pub fn to_record(&self) -> RawRecord {
        let mut record = RawRecord::new();
        let text_cells = [
            (COL_DATE, &self.date),
            (COL_PROVIDER, &self.provider),
            (COL_LOCATION, &self.location),
            (COL_TYPE, &self.charge_type),
        ];
        for (column, value) in text_cells {
            if let Some(value) = value {
                record.insert(column, value.clone());
            }
        }
        let number_cells = [
            (COL_LATITUDE, self.latitude),
            (COL_LONGITUDE, self.longitude),
            (COL_KWH, self.energy_kwh),
            (COL_TOTAL_COST, self.total_cost),
        ];
        for (column, value) in number_cells {
            if let Some(value) = value {
                record.insert(column, value.to_string());
            }
        }
        record
    }
}

/// The entry form submission.
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct LogSessionRequest {
    /// One of the known providers, `Other`, or free text.
    pub provider: String,
    /// Used when `provider` is `Other`.
    pub custom_provider: Option<String>,
    #[serde(default)]
    pub location: String,
    #[schema(value_type = String, format = Date, example = "2024-03-01")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "DC")]
    pub charge_type: ChargeType,
    pub energy_kwh: f64,
    pub total_cost: f64,
    /// `0.0` (the default) asks the server to look the location up.
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl From<LogSessionRequest> for NewSession {
    fn from(req: LogSessionRequest) -> Self {
        NewSession {
            provider: req.provider,
            custom_provider: req.custom_provider,
            location: req.location,
            date: req.date,
            charge_type: req.charge_type,
            energy_kwh: req.energy_kwh,
            total_cost: req.total_cost,
            latitude: req.latitude,
            longitude: req.longitude,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct LogSessionResponse {
    pub session: SessionRow,
    /// Soft failures, e.g. a location the geocoder could not find.
    pub warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct SessionListResponse {
    pub month: String,
    pub sessions: Vec<SessionRow>,
    /// Set when the log could not be read and an empty list is returned instead.
    pub condition: Option<String>,
}

/// The full replacement set from the table editor.
#[derive(Deserialize, Debug, ToSchema)]
pub struct ReplaceSessionsRequest {
    pub sessions: Vec<SessionRow>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ReplaceSessionsResponse {
    pub saved: usize,
    pub sessions: Vec<SessionRow>,
}

//=========================================================================================
// Views
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct MonthsResponse {
    /// Newest first. `All` is always a valid selection as well.
    pub months: Vec<String>,
    /// Set when the log could not be read.
    pub condition: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, ToSchema)]
pub struct SummaryResponse {
    pub month: String,
    pub currency: String,
    pub total_spend: f64,
    pub average_cost_per_kwh: f64,
    pub total_energy: f64,
    pub session_count: usize,
    pub condition: Option<String>,
}

impl SummaryResponse {
    pub fn new(month: &str, summary: Summary, condition: Option<String>) -> Self {
        Self {
            month: month.to_string(),
            currency: summary.currency,
            total_spend: summary.total_spend,
            average_cost_per_kwh: summary.average_cost_per_kwh,
            total_energy: summary.total_energy,
            session_count: summary.session_count,
            condition,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AggregateResponse {
    pub month: String,
    /// `{ "view": <name>, "rows": [...] }`
    #[schema(value_type = Object)]
    pub aggregate: AggregateView,
    pub condition: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, ToSchema)]
pub struct LocationPoint {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub session_count: usize,
    pub total_cost: f64,
    pub total_energy: f64,
}

impl From<LocationAggregate> for LocationPoint {
    fn from(agg: LocationAggregate) -> Self {
        Self {
            location: agg.location,
            latitude: agg.latitude,
            longitude: agg.longitude,
            session_count: agg.session_count,
            total_cost: agg.total_cost,
            total_energy: agg.total_energy,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct LocationsResponse {
    pub month: String,
    pub points: Vec<LocationPoint>,
    pub condition: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ResolveLocationsResponse {
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
    pub filled: usize,
    pub rewritten: bool,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ConfigResponse {
    pub currency: String,
    pub providers: Vec<String>,
    pub geocoding_enabled: bool,
    /// Map-tile credential passed through for the map renderer.
    pub map_token: Option<String>,
}
