// GET handlers: version, manifest, sync status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::manifest::{BranchSource, ManifestError};
use crate::version::{NAME, VERSION};

/// GET /version — service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/manifest/{task_id} — existing manifest for the task's version, or a new one.
pub(super) async fn manifest_handler<B: BranchSource + 'static>(
    State(state): State<AppState<B>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ManifestError> {
    let manifest = state.manifests.load_or_create(&task_id).await?;
    Ok(axum::Json(manifest))
}

/// GET /api/sync/{project_id} — stored checkpoint; 404 if the project was never synced.
pub(super) async fn sync_status_handler<B: BranchSource + 'static>(
    State(state): State<AppState<B>>,
    Path(project_id): Path<String>,
) -> Response {
    match state.stats.get_checkpoint(&project_id).await {
        Ok(Some(checkpoint)) => axum::Json(checkpoint).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({ "error": format!("no sync status for {}", project_id) })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, project_id = %project_id, "sync status lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
