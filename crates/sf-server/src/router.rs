//! Axum router construction.
//!
//! Builds the application router with all route groups, middleware layers,
//! and the OpenAPI document.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::uploads::create_upload,
        routes::jobs::create_job,
        routes::jobs::get_job,
        routes::jobs::get_result,
        routes::jobs::download_result,
        routes::admin::tools,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::uploads::UploadResponse,
        routes::jobs::CreateJobRequest,
        routes::jobs::CreateJobResponse,
        routes::jobs::JobStatusResponse,
        routes::jobs::JobResultResponse,
        sf_core::JobStatus,
        sf_core::ErrorCode,
        sf_core::CameraMotion,
        sf_av::ToolInfo,
    ))
)]
pub struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/uploads",
            post(routes::uploads::create_upload)
                .layer(DefaultBodyLimit::max(routes::uploads::MAX_UPLOAD_BYTES)),
        )
        .route("/jobs", post(routes::jobs::create_job))
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/jobs/{id}/result", get(routes::jobs::get_result))
        .route("/jobs/{id}/download", get(routes::jobs::download_result))
        .route("/events", get(routes::events::events_handler))
        .route("/admin/tools", get(routes::admin::tools));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
