use crate::AppState;
use crate::api::error::AppError;
use crate::models::{BackupRequest, BackupResponse, CategoryStats, MediaCategory, RunSummary};
use crate::services::backup_driver::BatchBackupDriver;
use crate::services::media_repository::MediaRepository;
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use utoipa::ToSchema;

/// Largest `limit` a single backup call accepts.
pub const MAX_BATCH_LIMIT: u32 = 100;

#[derive(Deserialize, ToSchema)]
pub struct RunBackupRequest {
    pub category: MediaCategory,
}

/// One BackupOperation invocation.
#[utoipa::path(
    post,
    path = "/backup",
    request_body = BackupRequest,
    responses(
        (status = 200, description = "Batch processed", body = BackupResponse),
        (status = 400, description = "Invalid limit"),
        (status = 500, description = "Batch could not be processed", body = BackupResponse)
    ),
    tag = "backup"
)]
pub async fn backup_batch(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> Result<(StatusCode, Json<BackupResponse>), AppError> {
    if req.limit == 0 || req.limit > MAX_BATCH_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_BATCH_LIMIT
        )));
    }

    match state
        .backup_operation
        .backup_batch(req.category, req.limit)
        .await
    {
        Ok(result) => Ok((StatusCode::OK, Json(BackupResponse::from(result)))),
        Err(e) => {
            tracing::error!("Backup batch for {} failed: {:?}", req.category, e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BackupResponse::failure(e.to_string())),
            ))
        }
    }
}

/// Drives a full backup run for one category and reports its summary.
#[utoipa::path(
    post,
    path = "/backup/run",
    request_body = RunBackupRequest,
    responses(
        (status = 200, description = "Run finished", body = RunSummary)
    ),
    tag = "backup"
)]
pub async fn run_backup(
    State(state): State<AppState>,
    Json(req): Json<RunBackupRequest>,
) -> Json<RunSummary> {
    let driver = BatchBackupDriver::new(
        state.backup_operation.clone(),
        req.category,
        state.config.policy(req.category).clone(),
    )
    .with_locks(state.locks.clone())
    .with_shutdown(state.shutdown.clone());
    Json(driver.run().await)
}

#[utoipa::path(
    get,
    path = "/backup/stats",
    responses(
        (status = 200, description = "Backup progress per category", body = [CategoryStats])
    ),
    tag = "backup"
)]
pub async fn backup_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryStats>>, AppError> {
    let repository = MediaRepository::new(state.db.clone());
    let mut stats = Vec::with_capacity(MediaCategory::ALL.len());
    for category in MediaCategory::ALL {
        stats.push(repository.category_stats(category).await?);
    }
    Ok(Json(stats))
}
