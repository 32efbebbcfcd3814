use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use smartmacro_core::error::{AnalysisError, ErrorKind};
use smartmacro_core::models::{AllTimeStats, DailySummary, NutritionRecord, WeeklyStats};
use smartmacro_core::service::{
    AnalysisOutcome, DEFAULT_HISTORY_DAYS, NutritionService, Reports,
};

const BODY_LIMIT: usize = 20 * 1024 * 1024; // 20 MB

#[derive(Clone)]
struct AppState {
    reports: Reports,
    // None when no vision API key is configured
    service: Option<NutritionService>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct AnalyzeQuery {
    username: Option<String>,
    source: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    days: Option<i64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Analysis(AnalysisError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            Self::Analysis(err) => {
                let status = match err.kind() {
                    ErrorKind::ServiceFailure => StatusCode::BAD_GATEWAY,
                    ErrorKind::NotFood
                    | ErrorKind::MalformedResponse
                    | ErrorKind::SchemaViolation => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, err.message().to_string(), Some(err.kind()))
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                kind,
            }),
        )
            .into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self::Analysis(err)
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn create_analysis(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<AnalyzeQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<AnalysisOutcome>), ApiError> {
    let service = state.service.as_ref().ok_or_else(|| {
        ApiError::Unavailable("Photo analysis is not configured on this server".to_string())
    })?;

    if body.is_empty() {
        return Err(ApiError::BadRequest(
            "Request body must contain the image bytes".to_string(),
        ));
    }

    let outcome = service
        .analyze(&body, user_id, query.username.as_deref(), query.source)
        .await?;

    if outcome.store_error.is_some() {
        warn!(user_id, "Returning analysis that was not persisted");
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<NutritionRecord>> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    Json(state.reports.history(user_id, days))
}

async fn get_today_summary(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<DailySummary>, ApiError> {
    daily_summary(&state, user_id, Utc::now().date_naive())
}

async fn get_daily_summary(
    State(state): State<AppState>,
    Path((user_id, date_str)): Path<(i64, String)>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))?;
    daily_summary(&state, user_id, date)
}

fn daily_summary(
    state: &AppState,
    user_id: i64,
    date: NaiveDate,
) -> Result<Json<DailySummary>, ApiError> {
    state
        .reports
        .daily_summary(user_id, date)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No meals analyzed on {date}")))
}

async fn get_weekly_stats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<WeeklyStats>, ApiError> {
    state
        .reports
        .weekly_stats(user_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No meals analyzed this week".to_string()))
}

async fn get_all_time_stats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<AllTimeStats>, ApiError> {
    state
        .reports
        .all_time_stats(user_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No meals analyzed yet".to_string()))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users/{user_id}/analyses", post(create_analysis))
        .route("/api/users/{user_id}/history", get(get_history))
        .route("/api/users/{user_id}/summary", get(get_today_summary))
        .route("/api/users/{user_id}/summary/{date}", get(get_daily_summary))
        .route("/api/users/{user_id}/week", get(get_weekly_stats))
        .route("/api/users/{user_id}/stats", get(get_all_time_stats))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    reports: Reports,
    service: Option<NutritionService>,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let analysis_enabled = service.is_some();
    let app = build_router(AppState { reports, service });

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    info!(%bind, port, analysis_enabled, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
