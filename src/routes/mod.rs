// HTTP routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::manifest::{BranchSource, ManifestService};
use crate::stats_repo::StatsRepo;

pub(crate) struct AppState<B> {
    pub(crate) manifests: Arc<ManifestService<B>>,
    pub(crate) stats: Arc<StatsRepo>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            manifests: self.manifests.clone(),
            stats: self.stats.clone(),
        }
    }
}

pub fn app<B>(manifests: Arc<ManifestService<B>>, stats: Arc<StatsRepo>) -> Router
where
    B: BranchSource + 'static,
{
    let state = AppState { manifests, stats };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/manifest/{task_id}", get(http::manifest_handler::<B>)) // GET /api/manifest/:task_id
        .route("/api/sync/{project_id}", get(http::sync_status_handler::<B>)) // GET /api/sync/:project_id
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
