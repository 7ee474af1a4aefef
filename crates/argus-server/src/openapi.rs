use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Argus API",
        version = "0.1.0",
        description = "Browser-rendered URL content scraping with redirect-aware deduplication."
    ),
    paths(
        crate::routes::submit_urls,
        crate::routes::list_records,
        crate::routes::get_history,
        crate::routes::get_latest,
        crate::routes::get_record,
        crate::routes::fix_inconsistencies,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::SubmitRequest,
        crate::dto::SubmitResponse,
        crate::dto::SkippedUrlResponse,
        crate::dto::RecordResponse,
        crate::dto::HistoryResponse,
        crate::dto::FixResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "url-content", description = "URL submission and scraped content"),
        (name = "maintenance", description = "Operator maintenance"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
