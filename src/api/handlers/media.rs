use crate::AppState;
use crate::api::error::AppError;
use crate::models::ResolvedUrl;
use crate::services::media_repository::MediaRepository;
use axum::{
    Json,
    extract::{Path, State},
};

/// Picks the currently reachable location of a media object.
#[utoipa::path(
    get,
    path = "/media/{id}/url",
    params(
        ("id" = String, Path, description = "Media object id")
    ),
    responses(
        (status = 200, description = "Serving location or unavailability", body = ResolvedUrl),
        (status = 404, description = "Unknown media object")
    ),
    tag = "media"
)]
pub async fn resolve_media_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedUrl>, AppError> {
    let media = MediaRepository::new(state.db.clone())
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media object {} not found", id)))?;

    let resolved = match state.resolver.resolve_media(&media).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("Media object {} has no location configured: {}", id, e);
            ResolvedUrl::from(e)
        }
    };

    Ok(Json(resolved))
}
