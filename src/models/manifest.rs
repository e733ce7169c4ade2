// Build manifest models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pinned module revisions for one build version. `id` is the version id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub revision: String,
    pub project_name: String,
    pub branch: String,
    pub modules: BTreeMap<String, ManifestModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestModule {
    pub branch: String,
    pub revision: String,
    pub repo: String,
    pub owner: String,
    pub url: String,
}

/// Task as seen by the manifest endpoint: an opaque id resolving to project + version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub id: String,
    pub project_id: String,
    pub version: String,
    pub revision: String,
}

/// Head commit of a branch, as reported by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHead {
    pub sha: String,
    pub url: String,
}
