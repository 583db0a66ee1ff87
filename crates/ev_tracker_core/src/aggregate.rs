//! crates/ev_tracker_core/src/aggregate.rs
//!
//! Chart-ready views over a normalized log. Each view is one grouping with a
//! fixed reducer, computed fresh on every call.
//!
//! Group order is first-encountered unless a view states otherwise. Sessions
//! that lack a view's key (no date, no type, no coordinates) are skipped for
//! that view only.

use crate::domain::{weekday_name, ChargeType, ChargingSession, NormalizedLog};
use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;

pub const DEFAULT_TOP_LIMIT: usize = 5;

//=========================================================================================
// Dimensions
//=========================================================================================

/// What a top-N view ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKey {
    Provider,
    Location,
    ChargeType,
    Month,
}

impl FromStr for TopKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "provider" => Ok(TopKey::Provider),
            "location" => Ok(TopKey::Location),
            "type" | "charge_type" => Ok(TopKey::ChargeType),
            "month" => Ok(TopKey::Month),
            other => Err(format!("unknown ranking key '{}'", other)),
        }
    }
}

/// The quantity a top-N view sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopMetric {
    TotalCost,
    Energy,
    Sessions,
}

impl FromStr for TopMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "total_cost" | "cost" => Ok(TopMetric::TotalCost),
            "energy" | "energy_kwh" => Ok(TopMetric::Energy),
            "sessions" | "count" => Ok(TopMetric::Sessions),
            other => Err(format!("unknown ranking metric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    DailySpend,
    TypeSplit,
    ProviderSpend,
    CostVsEnergy,
    DayHourVolume,
    DayTypeVolume,
    Location,
    TopN {
        key: TopKey,
        metric: TopMetric,
        limit: usize,
    },
}

impl Dimension {
    /// Resolves a view name. `top_n` defaults to total cost by location, top 5.
    pub fn from_name(
        name: &str,
        key: Option<TopKey>,
        metric: Option<TopMetric>,
        limit: Option<usize>,
    ) -> Option<Self> {
        let dimension = match name {
            "daily_spend" => Dimension::DailySpend,
            "type_split" => Dimension::TypeSplit,
            "provider_spend" => Dimension::ProviderSpend,
            "cost_vs_energy" => Dimension::CostVsEnergy,
            "day_hour_volume" => Dimension::DayHourVolume,
            "day_type_volume" => Dimension::DayTypeVolume,
            "location" => Dimension::Location,
            "top_n" => Dimension::TopN {
                key: key.unwrap_or(TopKey::Location),
                metric: metric.unwrap_or(TopMetric::TotalCost),
                limit: limit.unwrap_or(DEFAULT_TOP_LIMIT),
            },
            _ => return None,
        };
        Some(dimension)
    }
}

//=========================================================================================
// View Rows
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySpend {
    pub date: NaiveDate,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeShare {
    pub charge_type: ChargeType,
    pub session_count: usize,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSpend {
    pub provider: String,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEnergyPoint {
    pub provider: String,
    pub location: String,
    pub energy_kwh: f64,
    pub total_cost: f64,
    pub cost_per_kwh: f64,
}

/// Volume for one weekday and hour. `hour` is `None` for sessions logged without a time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHourVolume {
    pub day_of_week: String,
    pub hour: Option<u32>,
    pub energy_kwh: f64,
    pub session_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTypeVolume {
    pub day_of_week: String,
    pub charge_type: ChargeType,
    pub energy_kwh: f64,
}

/// One distinct `(location, latitude, longitude)` site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationAggregate {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub session_count: usize,
    pub total_cost: f64,
    pub total_energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTotal {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", content = "rows", rename_all = "snake_case")]
pub enum AggregateView {
    DailySpend(Vec<DailySpend>),
    TypeSplit(Vec<TypeShare>),
    ProviderSpend(Vec<ProviderSpend>),
    CostVsEnergy(Vec<CostEnergyPoint>),
    DayHourVolume(Vec<DayHourVolume>),
    DayTypeVolume(Vec<DayTypeVolume>),
    Location(Vec<LocationAggregate>),
    TopN(Vec<RankedTotal>),
}

impl AggregateView {
    pub fn len(&self) -> usize {
        match self {
            AggregateView::DailySpend(rows) => rows.len(),
            AggregateView::TypeSplit(rows) => rows.len(),
            AggregateView::ProviderSpend(rows) => rows.len(),
            AggregateView::CostVsEnergy(rows) => rows.len(),
            AggregateView::DayHourVolume(rows) => rows.len(),
            AggregateView::DayTypeVolume(rows) => rows.len(),
            AggregateView::Location(rows) => rows.len(),
            AggregateView::TopN(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//=========================================================================================
// Grouping
//=========================================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: usize,
    cost: f64,
    energy: f64,
}

impl Totals {
    fn add(&mut self, session: &ChargingSession) {
        self.count += 1;
        self.cost += session.total_cost;
        self.energy += session.energy_kwh;
    }
}

/// Groups sessions by `key`, keeping groups in first-encountered order.
fn group_totals<K, F>(sessions: &[ChargingSession], key: F) -> Vec<(K, Totals)>
where
    K: Eq + Hash + Clone,
    F: Fn(&ChargingSession) -> Option<K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Totals)> = Vec::new();

    for session in sessions {
        let Some(k) = key(session) else { continue };
        let slot = *positions.entry(k.clone()).or_insert_with(|| {
            groups.push((k, Totals::default()));
            groups.len() - 1
        });
        groups[slot].1.add(session);
    }
    groups
}

fn weekday_of(session: &ChargingSession) -> Option<Weekday> {
    session.date.map(|d| d.weekday())
}

//=========================================================================================
// Aggregation
//=========================================================================================

pub fn aggregate(log: &NormalizedLog, dimension: Dimension) -> AggregateView {
    let sessions = log.sessions();
    match dimension {
        Dimension::DailySpend => AggregateView::DailySpend(daily_spend(sessions)),
        Dimension::TypeSplit => AggregateView::TypeSplit(type_split(sessions)),
        Dimension::ProviderSpend => AggregateView::ProviderSpend(provider_spend(sessions)),
        Dimension::CostVsEnergy => AggregateView::CostVsEnergy(cost_vs_energy(sessions)),
        Dimension::DayHourVolume => AggregateView::DayHourVolume(day_hour_volume(sessions)),
        Dimension::DayTypeVolume => AggregateView::DayTypeVolume(day_type_volume(sessions)),
        Dimension::Location => AggregateView::Location(location_aggregates(log)),
        Dimension::TopN { key, metric, limit } => {
            AggregateView::TopN(top_n(sessions, key, metric, limit))
        }
    }
}

/// Spend per calendar date, oldest first.
fn daily_spend(sessions: &[ChargingSession]) -> Vec<DailySpend> {
    let mut rows: Vec<DailySpend> = group_totals(sessions, |s| s.date)
        .into_iter()
        .map(|(date, t)| DailySpend {
            date,
            total_cost: t.cost,
        })
        .collect();
    rows.sort_by_key(|r| r.date);
    rows
}

fn type_split(sessions: &[ChargingSession]) -> Vec<TypeShare> {
    group_totals(sessions, |s| s.charge_type)
        .into_iter()
        .map(|(charge_type, t)| TypeShare {
            charge_type,
            session_count: t.count,
            total_cost: t.cost,
        })
        .collect()
}

fn provider_spend(sessions: &[ChargingSession]) -> Vec<ProviderSpend> {
    group_totals(sessions, |s| Some(s.provider.clone()))
        .into_iter()
        .map(|(provider, t)| ProviderSpend {
            provider,
            total_cost: t.cost,
        })
        .collect()
}

fn cost_vs_energy(sessions: &[ChargingSession]) -> Vec<CostEnergyPoint> {
    sessions
        .iter()
        .map(|s| CostEnergyPoint {
            provider: s.provider.clone(),
            location: s.location.clone(),
            energy_kwh: s.energy_kwh,
            total_cost: s.total_cost,
            cost_per_kwh: s.cost_per_kwh,
        })
        .collect()
}

/// Monday through Sunday, hours ascending, unknown hour last within a day.
fn day_hour_volume(sessions: &[ChargingSession]) -> Vec<DayHourVolume> {
    let mut groups = group_totals(sessions, |s| {
        weekday_of(s).map(|day| (day, s.time.map(|t| t.hour())))
    });
    groups.sort_by_key(|((day, hour), _)| (day.num_days_from_monday(), hour.unwrap_or(24)));
    groups
        .into_iter()
        .map(|((day, hour), t)| DayHourVolume {
            day_of_week: weekday_name(day).to_string(),
            hour,
            energy_kwh: t.energy,
            session_count: t.count,
        })
        .collect()
}

/// Monday through Sunday, AC before DC.
fn day_type_volume(sessions: &[ChargingSession]) -> Vec<DayTypeVolume> {
    let mut groups = group_totals(sessions, |s| weekday_of(s).zip(s.charge_type));
    groups.sort_by_key(|((day, charge_type), _)| {
        (day.num_days_from_monday(), *charge_type == ChargeType::Dc)
    });
    groups
        .into_iter()
        .map(|((day, charge_type), t)| DayTypeVolume {
            day_of_week: weekday_name(day).to_string(),
            charge_type,
            energy_kwh: t.energy,
        })
        .collect()
}

/// Sites with a name and coordinates. This is also the map's point list.
pub fn location_aggregates(log: &NormalizedLog) -> Vec<LocationAggregate> {
    group_totals(log.sessions(), |s| {
        let coordinates = s.coordinates.filter(|_| s.has_named_location())?;
        Some((
            s.location.clone(),
            coordinates.latitude.to_bits(),
            coordinates.longitude.to_bits(),
        ))
    })
    .into_iter()
    .map(|((location, lat_bits, lon_bits), t)| LocationAggregate {
        location,
        latitude: f64::from_bits(lat_bits),
        longitude: f64::from_bits(lon_bits),
        session_count: t.count,
        total_cost: t.cost,
        total_energy: t.energy,
    })
    .collect()
}

/// Strictly descending by the summed metric. The sort is stable, so ties keep
/// first-encountered order.
fn top_n(
    sessions: &[ChargingSession],
    key: TopKey,
    metric: TopMetric,
    limit: usize,
) -> Vec<RankedTotal> {
    let mut ranked: Vec<RankedTotal> = group_totals(sessions, |s| ranking_key(s, key))
        .into_iter()
        .map(|(key, t)| RankedTotal {
            key,
            value: match metric {
                TopMetric::TotalCost => t.cost,
                TopMetric::Energy => t.energy,
                TopMetric::Sessions => t.count as f64,
            },
        })
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(limit);
    ranked
}

fn ranking_key(session: &ChargingSession, key: TopKey) -> Option<String> {
    let value = match key {
        TopKey::Provider => session.provider.clone(),
        TopKey::Location => session.location.clone(),
        TopKey::ChargeType => session.charge_type?.to_string(),
        TopKey::Month => session.month.clone()?,
    };
    (!value.trim().is_empty()).then_some(value)
}
