//! crates/ev_tracker_core/src/transform.rs
//!
//! The session log transformer. Turns raw stored rows into canonical sessions,
//! and derives the filters and overview metrics the dashboard reads.
//!
//! Nothing in here fails on a malformed field: bad cells degrade to an absent
//! or zero value and the record is kept.

use crate::domain::{
    ChargeType, ChargingSession, Coordinates, NormalizedLog, RawRecord, SessionFields, COL_DATE,
    COL_KWH, COL_LATITUDE, COL_LOCATION, COL_LONGITUDE, COL_PROVIDER, COL_TOTAL_COST, COL_TYPE,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

const DATE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

//=========================================================================================
// Derivations
//=========================================================================================

/// `round(total_cost / energy_kwh, 3)`, or `0` whenever that would not be a finite number.
pub fn compute_cost_per_kwh(total_cost: f64, energy_kwh: f64) -> f64 {
    if !energy_kwh.is_finite() || energy_kwh <= 0.0 || !total_cost.is_finite() {
        return 0.0;
    }
    round_to(total_cost / energy_kwh, 3)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Parses a stored `Date` cell, keeping the time-of-day when one was recorded.
pub fn parse_date_cell(value: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return Some((date, None));
    }
    if let Some(stamp) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some((stamp.date(), Some(stamp.time())));
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|stamp| (stamp.date_naive(), Some(stamp.time())))
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn text(record: &RawRecord, column: &str) -> String {
    record.get(column).map(str::trim).unwrap_or_default().to_string()
}

//=========================================================================================
// Normalization
//=========================================================================================

/// Converts one stored row into a canonical session.
///
/// Stored `Month` and `Cost_per_kWh` cells are ignored; both are recomputed.
pub fn normalize_record(record: &RawRecord) -> ChargingSession {
    let (date, time) = match record.get(COL_DATE).and_then(parse_date_cell) {
        Some((date, time)) => (Some(date), time),
        None => (None, None),
    };

    ChargingSession::from_fields(SessionFields {
        date,
        time,
        provider: text(record, COL_PROVIDER),
        location: text(record, COL_LOCATION),
        coordinates: Coordinates::from_parts(
            parse_number(record.get(COL_LATITUDE)),
            parse_number(record.get(COL_LONGITUDE)),
        ),
        charge_type: record.get(COL_TYPE).and_then(ChargeType::parse),
        energy_kwh: parse_number(record.get(COL_KWH)).unwrap_or(0.0),
        total_cost: parse_number(record.get(COL_TOTAL_COST)).unwrap_or(0.0),
    })
}

/// Normalizes a batch of stored rows, preserving their order.
pub fn normalize(records: &[RawRecord]) -> NormalizedLog {
    records.iter().map(normalize_record).collect()
}

//=========================================================================================
// Filtering
//=========================================================================================

/// The month selector: everything, or one exact `YYYY-MM` key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MonthFilter {
    #[default]
    All,
    Month(String),
}

impl MonthFilter {
    /// `"All"` (any case) or an empty value selects everything.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            MonthFilter::All
        } else {
            MonthFilter::Month(value.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MonthFilter::All => "All",
            MonthFilter::Month(key) => key,
        }
    }
}

pub fn filter_by_month(log: &NormalizedLog, filter: &MonthFilter) -> NormalizedLog {
    match filter {
        MonthFilter::All => log.clone(),
        MonthFilter::Month(key) => log
            .iter()
            .filter(|s| s.month.as_deref() == Some(key.as_str()))
            .cloned()
            .collect(),
    }
}

/// Distinct months present in the log, newest first.
pub fn month_options(log: &NormalizedLog) -> Vec<String> {
    log.iter()
        .filter_map(|s| s.month.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
        .collect()
}

//=========================================================================================
// Coordinates
//=========================================================================================

/// Location name -> coordinate, from sessions that already carry coordinates.
///
/// When one name was recorded with different coordinates, the first one wins.
pub fn coordinate_index(log: &NormalizedLog) -> HashMap<String, Coordinates> {
    let mut index = HashMap::new();
    for session in log.iter().filter(|s| s.has_named_location()) {
        if let Some(coordinates) = session.coordinates {
            index.entry(session.location.clone()).or_insert(coordinates);
        }
    }
    index
}

/// Fills both coordinates of uncoordinated sessions whose location is in `index`.
pub fn merge_coordinates(
    log: &NormalizedLog,
    index: &HashMap<String, Coordinates>,
) -> NormalizedLog {
    log.iter()
        .map(|session| {
            let mut session = session.clone();
            if session.coordinates.is_none() && session.has_named_location() {
                session.coordinates = index.get(&session.location).copied();
            }
            session
        })
        .collect()
}

//=========================================================================================
// Overview Metrics
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub currency: String,
    pub total_spend: f64,
    pub average_cost_per_kwh: f64,
    pub total_energy: f64,
    pub session_count: usize,
}

/// Headline numbers for a (usually filtered) log. The average is the mean of row rates.
pub fn summarize(log: &NormalizedLog, currency: &str) -> Summary {
    let session_count = log.len();
    let total_spend = log.iter().map(|s| s.total_cost).sum();
    let total_energy = log.iter().map(|s| s.energy_kwh).sum();
    let average_cost_per_kwh = if session_count == 0 {
        0.0
    } else {
        log.iter().map(|s| s.cost_per_kwh).sum::<f64>() / session_count as f64
    };

    Summary {
        currency: currency.to_string(),
        total_spend,
        average_cost_per_kwh,
        total_energy,
        session_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{COL_COST_PER_KWH, COL_MONTH};

    fn raw(date: &str, provider: &str, kwh: &str, cost: &str) -> RawRecord {
        RawRecord::new()
            .with(COL_DATE, date)
            .with(COL_PROVIDER, provider)
            .with(COL_LOCATION, "")
            .with(COL_TYPE, "AC")
            .with(COL_KWH, kwh)
            .with(COL_TOTAL_COST, cost)
    }

    #[test]
    fn cost_per_kwh_rounds_to_three_places() {
        assert_eq!(compute_cost_per_kwh(30.0, 20.0), 1.5);
        assert_eq!(compute_cost_per_kwh(10.0, 3.0), 3.333);
        assert_eq!(compute_cost_per_kwh(2.0, 3.0), 0.667);
    }

    #[test]
    fn cost_per_kwh_guards_against_bad_energy() {
        assert_eq!(compute_cost_per_kwh(30.0, 0.0), 0.0);
        assert_eq!(compute_cost_per_kwh(30.0, -2.0), 0.0);
        assert_eq!(compute_cost_per_kwh(30.0, f64::NAN), 0.0);
        assert_eq!(compute_cost_per_kwh(f64::INFINITY, 2.0), 0.0);
    }

    #[test]
    fn date_cells_are_parsed_permissively() {
        let march_first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date_cell("2024-03-01"), Some((march_first, None)));
        assert_eq!(parse_date_cell("2024/03/01"), Some((march_first, None)));
        assert_eq!(
            parse_date_cell("2024-03-01 14:30:00"),
            Some((march_first, NaiveTime::from_hms_opt(14, 30, 0)))
        );
        assert_eq!(
            parse_date_cell("2024-03-01T08:15:00+08:00"),
            Some((march_first, NaiveTime::from_hms_opt(8, 15, 0)))
        );
        assert_eq!(parse_date_cell("yesterday"), None);
        assert_eq!(parse_date_cell(""), None);
    }

    #[test]
    fn stored_derived_columns_are_not_trusted() {
        let record = raw("2024-03-01", "Gentari", "20", "30")
            .with(COL_MONTH, "1999-12")
            .with(COL_COST_PER_KWH, "42");
        let session = normalize_record(&record);
        assert_eq!(session.month.as_deref(), Some("2024-03"));
        assert_eq!(session.day_of_week.as_deref(), Some("Friday"));
        assert_eq!(session.cost_per_kwh, 1.5);
    }

    #[test]
    fn malformed_fields_degrade_without_dropping_the_record() {
        let records = vec![
            raw("not a date", "JomCharge", "abc", "12.5")
                .with(COL_LATITUDE, "north")
                .with(COL_LONGITUDE, "101.7"),
            raw("2024-04-02", "chargEV", "10", "5"),
        ];
        let log = normalize(&records);
        assert_eq!(log.len(), 2);

        let first = &log.sessions()[0];
        assert_eq!(first.date, None);
        assert_eq!(first.month, None);
        assert_eq!(first.coordinates, None);
        assert_eq!(first.energy_kwh, 0.0);
        assert_eq!(first.cost_per_kwh, 0.0);
        assert_eq!(first.provider, "JomCharge");
        assert_eq!(log.sessions()[1].provider, "chargEV");
    }

    #[test]
    fn missing_coordinate_column_means_no_coordinates() {
        let record = raw("2024-03-01", "Gentari", "20", "30").with(COL_LATITUDE, "3.15");
        assert_eq!(normalize_record(&record).coordinates, None);
    }

    #[test]
    fn unknown_type_is_absent() {
        let record = raw("2024-03-01", "Gentari", "20", "30").with(COL_TYPE, "CCS2");
        assert_eq!(normalize_record(&record).charge_type, None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let records = vec![
            raw("2024-03-01 21:05:00", " Gentari ", "20.25", "30.1")
                .with(COL_LOCATION, " KLCC ")
                .with(COL_LATITUDE, "3.1579")
                .with(COL_LONGITUDE, "101.7123"),
            raw("garbage", "Home", "0", "0"),
            RawRecord::new().with("Unrelated", "x"),
        ];
        let once = normalize(&records);
        let twice = normalize(&once.to_records());
        assert_eq!(once, twice);
    }

    #[test]
    fn filter_all_is_identity_and_month_is_exact() {
        let log = normalize(&[
            raw("2024-03-01", "A", "10", "30"),
            raw("2024-03-15", "B", "10", "45.5"),
            raw("2024-04-01", "C", "10", "10"),
            raw("2024-11-01", "D", "10", "10"),
        ]);
        assert_eq!(filter_by_month(&log, &MonthFilter::parse("All")), log);
        assert_eq!(filter_by_month(&log, &MonthFilter::parse("2024-03")).len(), 2);
        assert_eq!(filter_by_month(&log, &MonthFilter::parse("2024-1")).len(), 0);
        assert_eq!(filter_by_month(&log, &MonthFilter::parse("2025-01")).len(), 0);
    }

    #[test]
    fn month_options_are_distinct_and_newest_first() {
        let log = normalize(&[
            raw("2024-03-01", "A", "1", "1"),
            raw("2024-11-01", "A", "1", "1"),
            raw("2024-03-09", "A", "1", "1"),
            raw("bad", "A", "1", "1"),
        ]);
        assert_eq!(month_options(&log), vec!["2024-11", "2024-03"]);
    }

    #[test]
    fn merge_fills_both_coordinates_or_neither() {
        let log = normalize(&[
            raw("2024-03-01", "A", "1", "1").with(COL_LOCATION, "KLCC"),
            raw("2024-03-02", "A", "1", "1").with(COL_LOCATION, "Mid Valley"),
            raw("2024-03-03", "A", "1", "1").with(COL_LOCATION, "  "),
        ]);
        let index = HashMap::from([
            ("KLCC".to_string(), Coordinates::new(3.158, 101.712)),
            ("  ".to_string(), Coordinates::new(1.0, 1.0)),
        ]);
        let merged = merge_coordinates(&log, &index);

        assert_eq!(merged.sessions()[0].coordinates, Some(Coordinates::new(3.158, 101.712)));
        assert_eq!(merged.sessions()[1].coordinates, None);
        assert_eq!(merged.sessions()[2].coordinates, None);
        assert!(merged
            .iter()
            .all(|s| s.latitude().is_some() == s.longitude().is_some()));
    }

    #[test]
    fn merge_keeps_existing_coordinates() {
        let log = normalize(&[raw("2024-03-01", "A", "1", "1")
            .with(COL_LOCATION, "KLCC")
            .with(COL_LATITUDE, "3.0")
            .with(COL_LONGITUDE, "101.0")]);
        let index = HashMap::from([("KLCC".to_string(), Coordinates::new(3.158, 101.712))]);
        assert_eq!(
            merge_coordinates(&log, &index).sessions()[0].coordinates,
            Some(Coordinates::new(3.0, 101.0))
        );
    }

    #[test]
    fn coordinate_index_prefers_first_seen() {
        let log = normalize(&[
            raw("2024-03-01", "A", "1", "1")
                .with(COL_LOCATION, "KLCC")
                .with(COL_LATITUDE, "3.1")
                .with(COL_LONGITUDE, "101.1"),
            raw("2024-03-02", "A", "1", "1")
                .with(COL_LOCATION, "KLCC")
                .with(COL_LATITUDE, "3.2")
                .with(COL_LONGITUDE, "101.2"),
        ]);
        assert_eq!(
            coordinate_index(&log).get("KLCC"),
            Some(&Coordinates::new(3.1, 101.1))
        );
    }

    #[test]
    fn summary_of_empty_log_is_zeroed() {
        let summary = summarize(&NormalizedLog::default(), "MYR");
        assert_eq!(summary.session_count, 0);
        assert_eq!(summary.total_spend, 0.0);
        assert_eq!(summary.average_cost_per_kwh, 0.0);
    }

    #[test]
    fn summary_totals_the_filtered_set() {
        let log = normalize(&[
            raw("2024-03-01", "A", "20", "30"),
            raw("2024-03-02", "B", "10", "20"),
        ]);
        let summary = summarize(&log, "MYR");
        assert_eq!(summary.total_spend, 50.0);
        assert_eq!(summary.total_energy, 30.0);
        assert_eq!(summary.average_cost_per_kwh, 1.75);
        assert_eq!(summary.session_count, 2);
    }
}
