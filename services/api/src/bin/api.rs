//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{CsvSessionStore, DisabledGeocoder, NominatimGeocoder},
    config::Config,
    error::ApiError,
    web::{build_router, state::AppState},
};
use ev_tracker_core::{CachingGeocoder, Geocoder, SessionStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Session Log ---
    let store = Arc::new(CsvSessionStore::new(config.data_file.clone()));
    store.ensure_initialized().await?;
    info!("Session log ready at {}", store.path().display());

    // --- 3. Initialize the Geocoder ---
    let geocoder: Arc<dyn Geocoder> = if config.geocoder.enabled {
        info!("Geocoding via {}", config.geocoder.endpoint);
        Arc::new(CachingGeocoder::new(NominatimGeocoder::new(&config.geocoder)?))
    } else {
        info!("Geocoding disabled; sessions without coordinates stay off the map");
        Arc::new(DisabledGeocoder)
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store,
        geocoder,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = build_router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
