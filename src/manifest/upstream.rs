// Upstream source-control API: branch head lookups for manifest modules.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::models::BranchHead;
use crate::version::user_agent;

pub trait BranchSource: Send + Sync {
    fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> impl Future<Output = anyhow::Result<BranchHead>> + Send;
}

/// GitHub REST client (`GET /repos/{owner}/{repo}/branches/{branch}`).
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: CommitResponse,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    url: String,
}

impl GithubClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

impl BranchSource for GithubClient {
    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> anyhow::Result<BranchHead> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.base_url, owner, repo, branch
        );
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        let body: BranchResponse = response.json().await?;
        Ok(BranchHead {
            sha: body.commit.sha,
            url: body.commit.url,
        })
    }
}
