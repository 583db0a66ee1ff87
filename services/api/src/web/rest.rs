//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every read recomputes its view from the log file; nothing is cached between
//! requests.

use crate::web::protocol::{
    AggregateQuery, AggregateResponse, ConfigResponse, LocationPoint, LocationsResponse,
    LogSessionRequest, LogSessionResponse, MonthQuery, MonthsResponse, ReplaceSessionsRequest,
    ReplaceSessionsResponse, ResolveLocationsResponse, SessionListResponse, SessionRow,
    SummaryResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use ev_tracker_core::aggregate::{aggregate, location_aggregates, Dimension, TopKey, TopMetric};
use ev_tracker_core::domain::{NormalizedLog, RawRecord, KNOWN_PROVIDERS};
use ev_tracker_core::transform::{
    coordinate_index, filter_by_month, merge_coordinates, month_options, summarize, MonthFilter,
};
use ev_tracker_core::workflow::{
    load_log, log_session, replace_sessions, resolve_missing_coordinates, WorkflowError,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        config_handler,
        list_months_handler,
        list_sessions_handler,
        create_session_handler,
        replace_sessions_handler,
        summary_handler,
        aggregate_handler,
        locations_handler,
        resolve_locations_handler,
    ),
    components(
        schemas(
            SessionRow,
            LogSessionRequest,
            LogSessionResponse,
            SessionListResponse,
            ReplaceSessionsRequest,
            ReplaceSessionsResponse,
            MonthsResponse,
            SummaryResponse,
            AggregateResponse,
            LocationPoint,
            LocationsResponse,
            ResolveLocationsResponse,
            ConfigResponse,
        )
    ),
    tags(
        (
            name = "EV Charging Tracker API",
            description = "Charging session log, metrics and chart data."
        )
    )
)]
pub struct ApiDoc;

type HandlerError = (StatusCode, String);

//=========================================================================================
// Helpers
//=========================================================================================

/// Loads the whole log. A read failure is logged and yields an empty log.
async fn current_log(app_state: &AppState) -> (NormalizedLog, Option<String>) {
    let loaded = load_log(app_state.store.as_ref()).await;
    if let Some(condition) = &loaded.condition {
        warn!("Serving an empty log: {}", condition);
    }
    (loaded.log, loaded.condition)
}

fn month_filter(month: Option<&str>) -> MonthFilter {
    month.map(MonthFilter::parse).unwrap_or_default()
}

fn workflow_failure(e: WorkflowError, action: &str) -> HandlerError {
    match e {
        WorkflowError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.to_string()),
        WorkflowError::Store(e) => {
            error!("Failed to {}: {:?}", action, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {}: {}", action, e),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")))]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Static settings the dashboard needs to render its form and map.
#[utoipa::path(
    get,
    path = "/config",
    responses((status = 200, description = "Dashboard settings", body = ConfigResponse))
)]
pub async fn config_handler(State(app_state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let config = &app_state.config;
    Json(ConfigResponse {
        currency: config.currency.clone(),
        providers: KNOWN_PROVIDERS.iter().map(|p| p.to_string()).collect(),
        geocoding_enabled: config.geocoder.enabled,
        map_token: config.mapbox_token.clone(),
    })
}

/// Months with at least one session, newest first.
#[utoipa::path(
    get,
    path = "/months",
    responses((status = 200, description = "Month options", body = MonthsResponse))
)]
pub async fn list_months_handler(State(app_state): State<Arc<AppState>>) -> Json<MonthsResponse> {
    let (log, condition) = current_log(&app_state).await;
    Json(MonthsResponse {
        months: month_options(&log),
        condition,
    })
}

/// The session table, optionally restricted to one month.
#[utoipa::path(
    get,
    path = "/sessions",
    params(MonthQuery),
    responses((status = 200, description = "Canonical session rows", body = SessionListResponse))
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Json<SessionListResponse> {
    let filter = month_filter(query.month.as_deref());
    let (log, condition) = current_log(&app_state).await;
    let filtered = filter_by_month(&log, &filter);

    Json(SessionListResponse {
        month: filter.label().to_string(),
        sessions: filtered.iter().map(SessionRow::from).collect(),
        condition,
    })
}

/// Log one charging session.
///
/// Coordinates left at `0.0` are looked up from the location name. A failed
/// lookup does not block the save; it is reported in `warnings`.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = LogSessionRequest,
    responses(
        (status = 201, description = "Session saved", body = LogSessionResponse),
        (status = 400, description = "Validation error, nothing was saved"),
        (status = 500, description = "The log could not be written")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<LogSessionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let logged = log_session(
        app_state.store.as_ref(),
        app_state.geocoder.as_ref(),
        req.into(),
    )
    .await
    .map_err(|e| workflow_failure(e, "save session"))?;

    for warning in &logged.warnings {
        warn!("{}", warning);
    }

    let response = LogSessionResponse {
        session: SessionRow::from(&logged.session),
        warnings: logged.warnings,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Replace the whole log with the edited table.
///
/// Rows missing from the request are deleted. `cost_per_kwh` and `month` are
/// recomputed for every row before the file is rewritten.
#[utoipa::path(
    put,
    path = "/sessions",
    request_body = ReplaceSessionsRequest,
    responses(
        (status = 200, description = "Log rewritten", body = ReplaceSessionsResponse),
        (status = 500, description = "The log could not be written; it is unchanged")
    )
)]
pub async fn replace_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ReplaceSessionsRequest>,
) -> Result<Json<ReplaceSessionsResponse>, HandlerError> {
    let rows: Vec<RawRecord> = req.sessions.iter().map(SessionRow::to_record).collect();
    let log = replace_sessions(app_state.store.as_ref(), &rows)
        .await
        .map_err(|e| workflow_failure(e, "save changes"))?;

    info!("Data saved successfully ({} rows)", log.len());
    Ok(Json(ReplaceSessionsResponse {
        saved: log.len(),
        sessions: log.iter().map(SessionRow::from).collect(),
    }))
}

/// Total spend, average cost per kWh, total energy and session count.
#[utoipa::path(
    get,
    path = "/summary",
    params(MonthQuery),
    responses((status = 200, description = "Overview metrics", body = SummaryResponse))
)]
pub async fn summary_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Json<SummaryResponse> {
    let filter = month_filter(query.month.as_deref());
    let (log, condition) = current_log(&app_state).await;
    let filtered = filter_by_month(&log, &filter);
    Json(SummaryResponse::new(
        filter.label(),
        summarize(&filtered, &app_state.config.currency),
        condition,
    ))
}

/// One chart's data.
///
/// `dimension` is one of `daily_spend`, `type_split`, `provider_spend`,
/// `cost_vs_energy`, `day_hour_volume`, `day_type_volume`, `location`, `top_n`.
#[utoipa::path(
    get,
    path = "/aggregates/{dimension}",
    params(
        ("dimension" = String, Path, description = "The view to compute"),
        AggregateQuery
    ),
    responses(
        (status = 200, description = "Aggregate view", body = AggregateResponse),
        (status = 400, description = "Unknown view, key or metric")
    )
)]
pub async fn aggregate_handler(
    State(app_state): State<Arc<AppState>>,
    Path(dimension): Path<String>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<AggregateResponse>, HandlerError> {
    let key = query
        .key
        .as_deref()
        .map(str::parse::<TopKey>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let metric = query
        .metric
        .as_deref()
        .map(str::parse::<TopMetric>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let dimension = Dimension::from_name(&dimension, key, metric, query.limit).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown aggregate view '{}'", dimension),
        )
    })?;

    let filter = month_filter(query.month.as_deref());
    let (log, condition) = current_log(&app_state).await;
    let filtered = filter_by_month(&log, &filter);

    Ok(Json(AggregateResponse {
        month: filter.label().to_string(),
        aggregate: aggregate(&filtered, dimension),
        condition,
    }))
}

/// Points for the map: one per distinct named site with coordinates.
///
/// Sessions logged without coordinates borrow them from other sessions at the
/// same location name.
#[utoipa::path(
    get,
    path = "/locations",
    params(MonthQuery),
    responses((status = 200, description = "Map points", body = LocationsResponse))
)]
pub async fn locations_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Json<LocationsResponse> {
    let filter = month_filter(query.month.as_deref());
    let (log, condition) = current_log(&app_state).await;
    let merged = merge_coordinates(&log, &coordinate_index(&log));
    let filtered = filter_by_month(&merged, &filter);

    Json(LocationsResponse {
        month: filter.label().to_string(),
        points: location_aggregates(&filtered)
            .into_iter()
            .map(LocationPoint::from)
            .collect(),
        condition,
    })
}

/// Look up coordinates for every stored location that has none, and save them.
#[utoipa::path(
    post,
    path = "/locations/resolve",
    responses(
        (status = 200, description = "Backfill finished", body = ResolveLocationsResponse),
        (status = 500, description = "The log could not be read or written")
    )
)]
pub async fn resolve_locations_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ResolveLocationsResponse>, HandlerError> {
    let outcome = resolve_missing_coordinates(app_state.store.as_ref(), app_state.geocoder.as_ref())
        .await
        .map_err(|e| workflow_failure(e, "resolve locations"))?;

    Ok(Json(ResolveLocationsResponse {
        resolved: outcome.resolved,
        unresolved: outcome.unresolved,
        filled: outcome.filled,
        rewritten: outcome.rewritten,
    }))
}
