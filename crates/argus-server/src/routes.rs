use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use argus_core::store::{FetchStore, RecordFilter};

use crate::dto::{
    ErrorResponse, FixResponse, HealthResponse, HistoryResponse, ListQuery, RecordResponse,
    SubmitRequest, SubmitResponse, UrlQuery,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Maximum URLs per submission batch.
const MAX_BATCH: usize = 100;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/", post(submit_urls))
        .route("/", get(list_records))
        .route("/by-url", get(get_history))
        .route("/latest", get(get_latest))
        .route("/fix-inconsistencies", post(fix_inconsistencies))
        .route("/{id}", get(get_record));

    Router::new()
        .nest("/api/url-content", api)
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/url-content",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Batch accepted; per-URL outcomes inside", body = SubmitResponse),
        (status = 400, description = "Empty batch, too many URLs, or blank URL", body = ErrorResponse),
    ),
    tag = "url-content"
)]
pub async fn submit_urls(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.urls.is_empty() {
        return Err(bad_request("urls must contain at least one entry"));
    }
    if body.urls.len() > MAX_BATCH {
        return Err(bad_request(&format!(
            "urls must contain at most {MAX_BATCH} entries"
        )));
    }
    if body.urls.iter().any(|u| u.trim().is_empty()) {
        return Err(bad_request("urls must not contain blank entries"));
    }

    let outcome = state.submit.submit(&body.urls).await;
    Ok(axum::Json(SubmitResponse::from(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/url-content",
    params(ListQuery),
    responses(
        (status = 200, description = "Records, newest first", body = [RecordResponse]),
        (status = 400, description = "Invalid pagination parameters"),
    ),
    tag = "url-content"
)]
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let records = state
        .db
        .fetch_repo()
        .find_all(RecordFilter::default(), limit, offset)
        .await?;

    let response: Vec<RecordResponse> = records.into_iter().map(Into::into).collect();
    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/api/url-content/by-url",
    params(UrlQuery),
    responses(
        (status = 200, description = "Scrape history for the URL", body = HistoryResponse),
        (status = 400, description = "Missing url parameter"),
    ),
    tag = "url-content"
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scrapes = state.db.fetch_repo().get_history(&query.url).await?;
    let response = HistoryResponse {
        url: query.url,
        total_scrapes: scrapes.len(),
        scrapes: scrapes.into_iter().map(Into::into).collect(),
    };
    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/api/url-content/latest",
    params(UrlQuery),
    responses(
        (status = 200, description = "Latest successful scrape", body = RecordResponse),
        (status = 400, description = "Missing url parameter"),
        (status = 404, description = "No successful scrape for the URL", body = ErrorResponse),
    ),
    tag = "url-content"
)]
pub async fn get_latest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .fetch_repo()
        .find_latest_success_by_url(&query.url)
        .await?;

    match record {
        Some(record) => Ok(axum::Json(RecordResponse::from(record)).into_response()),
        None => {
            let body = ErrorResponse {
                error: "not_found".to_string(),
                message: format!("No successful scrape for URL: {}", query.url),
            };
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/url-content/{id}",
    params(("id" = Uuid, Path, description = "Record ID")),
    responses(
        (status = 200, description = "One record", body = RecordResponse),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    tag = "url-content"
)]
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.db.fetch_repo().find_by_id(id).await?;

    match record {
        Some(record) => Ok(axum::Json(RecordResponse::from(record)).into_response()),
        None => {
            let body = ErrorResponse {
                error: "not_found".to_string(),
                message: format!("Record not found: {id}"),
            };
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/url-content/fix-inconsistencies",
    responses(
        (status = 200, description = "Invariant sweep complete", body = FixResponse),
    ),
    tag = "maintenance"
)]
pub async fn fix_inconsistencies(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let fixed = state.maintenance.repair_inconsistencies().await?;
    let response = FixResponse {
        fixed,
        message: format!("Fixed {fixed} inconsistent records"),
    };
    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.fetch_repo().health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
    };

    (status, axum::Json(response))
}

fn bad_request(message: &str) -> ApiError {
    ApiError(argus_core::AppError::Validation(message.to_string()))
}
