pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::request_id::REQUEST_ID_HEADER;
use crate::config::BackupConfig;
use crate::services::backup_driver::CategoryLocks;
use crate::services::backup_operation::BackupOperation;
use crate::services::storage::StorageService;
use crate::services::url_resolver::UrlResolver;
use axum::{
    Router,
    body::Body,
    middleware::from_fn,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::backup::backup_batch,
        api::handlers::backup::run_backup,
        api::handlers::backup::backup_stats,
        api::handlers::media::resolve_media_url,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::backup::RunBackupRequest,
            models::MediaCategory,
            models::BackupRequest,
            models::BackupResponse,
            models::BackupItemDetail,
            models::RunSummary,
            models::StopReason,
            models::CategoryStats,
            models::ResolvedUrl,
            models::UrlSource,
            models::UnavailableReason,
        )
    ),
    tags(
        (name = "backup", description = "Media backup endpoints"),
        (name = "media", description = "Media location endpoints"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub backup_operation: Arc<dyn BackupOperation>,
    pub resolver: Arc<UrlResolver>,
    pub config: BackupConfig,
    /// Shared with the worker so one category never runs twice at once
    pub locks: CategoryLocks,
    pub shutdown: watch::Receiver<bool>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/backup", post(api::handlers::backup::backup_batch))
        .route("/backup/run", post(api::handlers::backup::run_backup))
        .route("/backup/stats", get(api::handlers::backup::backup_stats))
        .route(
            "/media/:id/url",
            get(api::handlers::media::resolve_media_url),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<Body>| {
                    // Set by the request id middleware, which runs first
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<Body>, _span: &tracing::Span| {
                    tracing::info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<Body>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
