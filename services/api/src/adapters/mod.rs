pub mod csv_store;
pub mod nominatim;

pub use csv_store::CsvSessionStore;
pub use nominatim::{DisabledGeocoder, NominatimGeocoder};
