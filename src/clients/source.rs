//! Canonical source system client: read-only access to pull requests and commits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clients::{read_json, request_failed};
use crate::config::SourceConfig;
use crate::error::ClientError;

const SERVICE: &str = "source";
const API_VERSION: &str = "7.1";

/// Lifecycle status of a pull request in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullRequestStatus {
    Active,
    Completed,
    Abandoned,
    #[serde(other)]
    NotSet,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::NotSet => "notSet",
        }
    }
}

/// Status filter for pull request queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Only(PullRequestStatus),
    All,
}

impl StatusFilter {
    fn as_query(&self) -> &'static str {
        match self {
            Self::Only(status) => status.as_str(),
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePullRequest {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub status: PullRequestStatus,
    pub merge_status: Option<String>,
    pub merge_commit_id: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCommit {
    pub id: String,
    pub message: String,
    pub author: String,
    pub author_date: DateTime<Utc>,
    pub url: String,
}

/// Read-only queries against the canonical source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Pull requests matching `status`, at most `top` of them.
    async fn list_pull_requests(
        &self,
        status: StatusFilter,
        top: u32,
    ) -> Result<Vec<SourcePullRequest>, ClientError>;

    /// Commits on `branch` authored at or after `since`.
    async fn list_commits(
        &self,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SourceCommit>, ClientError>;
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IdentityDto {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitRefDto {
    #[serde(rename = "commitId")]
    commit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestDto {
    pull_request_id: i64,
    title: String,
    status: PullRequestStatus,
    created_by: IdentityDto,
    #[serde(default)]
    merge_status: Option<String>,
    #[serde(default)]
    last_merge_commit: Option<CommitRefDto>,
    #[serde(default)]
    url: String,
}

impl From<PullRequestDto> for SourcePullRequest {
    fn from(dto: PullRequestDto) -> Self {
        Self {
            id: dto.pull_request_id,
            title: dto.title,
            author: dto.created_by.display_name,
            status: dto.status,
            merge_status: dto.merge_status,
            merge_commit_id: dto.last_merge_commit.map(|c| c.commit_id),
            url: dto.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitUserDto {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitDto {
    commit_id: String,
    #[serde(default)]
    comment: String,
    author: GitUserDto,
    #[serde(default)]
    remote_url: String,
}

impl From<CommitDto> for SourceCommit {
    fn from(dto: CommitDto) -> Self {
        Self {
            id: dto.commit_id,
            message: dto.comment,
            author: dto.author.name,
            author_date: dto.author.date,
            url: dto.remote_url,
        }
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

pub struct HttpSourceClient {
    base_url: String,
    repository: String,
    token: SecretString,
    client: reqwest::Client,
}

impl HttpSourceClient {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            token: config.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn repo_url(&self, resource: &str) -> String {
        format!(
            "{}/_apis/git/repositories/{}/{resource}",
            self.base_url, self.repository
        )
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ClientError> {
        let resp = self
            .client
            .get(url)
            .basic_auth("", Some(self.token.expose_secret()))
            .query(query)
            .query(&[("api-version", API_VERSION)])
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        let list: ListResponse<T> = read_json(SERVICE, resp).await?;
        Ok(list.value)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn list_pull_requests(
        &self,
        status: StatusFilter,
        top: u32,
    ) -> Result<Vec<SourcePullRequest>, ClientError> {
        let prs: Vec<PullRequestDto> = self
            .get_list(
                self.repo_url("pullrequests"),
                &[
                    ("searchCriteria.status", status.as_query().to_string()),
                    ("$top", top.to_string()),
                ],
            )
            .await?;
        tracing::debug!(count = prs.len(), status = status.as_query(), "Fetched pull requests");
        Ok(prs.into_iter().map(SourcePullRequest::from).collect())
    }

    async fn list_commits(
        &self,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SourceCommit>, ClientError> {
        let commits: Vec<CommitDto> = self
            .get_list(
                self.repo_url("commits"),
                &[
                    ("searchCriteria.itemVersion.version", branch.to_string()),
                    ("searchCriteria.fromDate", since.to_rfc3339()),
                ],
            )
            .await?;
        tracing::debug!(count = commits.len(), branch = branch, "Fetched commits");
        Ok(commits.into_iter().map(SourceCommit::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn pull_request_dto_maps_merge_commit() {
        let json = serde_json::json!({
            "pullRequestId": 42,
            "title": "Add login page",
            "status": "completed",
            "createdBy": { "displayName": "Jane Doe" },
            "mergeStatus": "succeeded",
            "lastMergeCommit": { "commitId": "b0b" },
            "url": "https://x/pullrequests/42"
        });
        let pr: SourcePullRequest = serde_json::from_value::<PullRequestDto>(json).unwrap().into();
        assert_eq!(pr.id, 42);
        assert_eq!(pr.author, "Jane Doe");
        assert_eq!(pr.status, PullRequestStatus::Completed);
        assert_eq!(pr.merge_commit_id.as_deref(), Some("b0b"));
    }

    #[test]
    fn unknown_status_maps_to_not_set() {
        let json = serde_json::json!({
            "pullRequestId": 1,
            "title": "t",
            "status": "weird",
            "createdBy": { "displayName": "A" }
        });
        let pr: SourcePullRequest = serde_json::from_value::<PullRequestDto>(json).unwrap().into();
        assert_eq!(pr.status, PullRequestStatus::NotSet);
        assert!(pr.merge_commit_id.is_none());
    }

    #[tokio::test]
    async fn list_pull_requests_sends_filters() {
        async fn handler(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
            assert_eq!(q.get("searchCriteria.status").map(String::as_str), Some("active"));
            assert_eq!(q.get("$top").map(String::as_str), Some("25"));
            Json(serde_json::json!({ "count": 1, "value": [{
                "pullRequestId": 7,
                "title": "Fix footer",
                "status": "active",
                "createdBy": { "displayName": "Bob" }
            }]}))
        }
        let app = Router::new().route(
            "/org/proj/_apis/git/repositories/web/pullrequests",
            get(handler),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = HttpSourceClient::new(&SourceConfig {
            base_url: format!("http://127.0.0.1:{port}/org/proj/"),
            repository: "web".into(),
            branch: "main".into(),
            token: SecretString::from("pat"),
            page_size: 25,
        });
        let prs = client
            .list_pull_requests(StatusFilter::Only(PullRequestStatus::Active), 25)
            .await
            .unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].title, "Fix footer");
    }
}
