pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use rest::ApiDoc;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the full application: REST routes, CORS and the Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    match app_state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(
            "CORS_ORIGIN '{}' is not a valid header value; cross-origin requests will be refused",
            app_state.config.cors_origin
        ),
    }

    let api_router = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/config", get(rest::config_handler))
        .route("/months", get(rest::list_months_handler))
        .route(
            "/sessions",
            get(rest::list_sessions_handler)
                .post(rest::create_session_handler)
                .put(rest::replace_sessions_handler),
        )
        .route("/summary", get(rest::summary_handler))
        .route("/aggregates/{dimension}", get(rest::aggregate_handler))
        .route("/locations", get(rest::locations_handler))
        .route("/locations/resolve", post(rest::resolve_locations_handler))
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
