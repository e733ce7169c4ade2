// Fetch-or-create for build manifests. Concurrent first requests for one version may
// both query upstream, but only one insert wins; the loser re-reads and returns the
// winner's manifest, so every caller sees the same module revisions.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{BranchSource, ManifestRepo};
use crate::config::ProjectRegistry;
use crate::models::{Manifest, ManifestModule};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("project ref not found for project {0}")]
    ProjectNotFound(String),
    #[error("found empty version when retrieving manifest for {0}")]
    EmptyVersion(String),
    #[error("problem retrieving git branch for module {module}")]
    Upstream {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("manifest storage error")]
    Storage(#[source] anyhow::Error),
}

impl ManifestError {
    pub fn status(&self) -> StatusCode {
        match self {
            ManifestError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ManifestError::ProjectNotFound(_) | ManifestError::EmptyVersion(_) => {
                StatusCode::BAD_REQUEST
            }
            ManifestError::Upstream { .. } | ManifestError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Display text including the source chain.
    fn full_message(&self) -> String {
        let mut msg = self.to_string();
        let mut source = self.source();
        while let Some(s) = source {
            msg.push_str(": ");
            msg.push_str(&s.to_string());
            source = s.source();
        }
        msg
    }
}

impl IntoResponse for ManifestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.full_message();
        warn!(status = status.as_u16(), error = %message, "manifest request failed");
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub struct ManifestService<B> {
    repo: Arc<ManifestRepo>,
    projects: Arc<ProjectRegistry>,
    upstream: Arc<B>,
}

impl<B: BranchSource> ManifestService<B> {
    pub fn new(repo: Arc<ManifestRepo>, projects: Arc<ProjectRegistry>, upstream: Arc<B>) -> Self {
        Self {
            repo,
            projects,
            upstream,
        }
    }

    #[instrument(skip(self), fields(operation = "load_manifest"))]
    pub async fn load_or_create(&self, task_id: &str) -> Result<Manifest, ManifestError> {
        let task = self
            .repo
            .find_task(task_id)
            .await
            .map_err(ManifestError::Storage)?
            .ok_or_else(|| ManifestError::TaskNotFound(task_id.to_string()))?;

        let project = self
            .projects
            .get(&task.project_id)
            .ok_or_else(|| ManifestError::ProjectNotFound(task.project_id.clone()))?;

        if let Some(existing) = self
            .repo
            .find_manifest(&task.version)
            .await
            .map_err(ManifestError::Storage)?
        {
            return Ok(existing);
        }

        if task.version.is_empty() {
            return Err(ManifestError::EmptyVersion(project.id.clone()));
        }

        let mut modules = BTreeMap::new();
        for module in &project.modules {
            let head = self
                .upstream
                .branch_head(&module.owner, &module.repo, &module.branch)
                .await
                .map_err(|e| ManifestError::Upstream {
                    module: module.name.clone(),
                    source: e,
                })?;
            modules.insert(
                module.name.clone(),
                ManifestModule {
                    branch: module.branch.clone(),
                    revision: head.sha,
                    repo: module.repo.clone(),
                    owner: module.owner.clone(),
                    url: head.url,
                },
            );
        }

        let manifest = Manifest {
            id: task.version.clone(),
            revision: task.revision.clone(),
            project_name: task.project_id.clone(),
            branch: project.branch.clone(),
            modules,
        };

        let duplicate = self
            .repo
            .try_insert(&manifest)
            .await
            .map_err(ManifestError::Storage)?;
        if duplicate {
            debug!(version = %task.version, "manifest inserted concurrently; using stored copy");
            if let Some(stored) = self
                .repo
                .find_manifest(&task.version)
                .await
                .map_err(ManifestError::Storage)?
            {
                return Ok(stored);
            }
        }

        Ok(manifest)
    }
}
