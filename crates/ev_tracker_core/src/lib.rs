pub mod aggregate;
pub mod domain;
pub mod geocache;
pub mod ports;
pub mod transform;
pub mod workflow;

pub use aggregate::{aggregate, AggregateView, Dimension, LocationAggregate, TopKey, TopMetric};
pub use domain::{
    ChargeType, ChargingSession, Coordinates, NewSession, NormalizedLog, RawRecord,
    ValidationError, CANONICAL_COLUMNS,
};
pub use geocache::CachingGeocoder;
pub use ports::{Geocoder, PortError, PortResult, SessionStore};
pub use transform::{
    compute_cost_per_kwh, filter_by_month, merge_coordinates, normalize, MonthFilter, Summary,
};
pub use workflow::{LoadedLog, LoggedSession, WorkflowError};
