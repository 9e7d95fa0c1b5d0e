//! GitHub REST client backing the `IssueTracker` contract.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::retry_policy::{is_retryable_status, truncate_for_error};
use herald_core::{CommitRecord, IssueTracker, PullRequestRef, RepoRef, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::github_transport_helpers::{
    is_rate_limited_forbidden, is_retryable_transport_error, parse_retry_after,
};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
struct GithubBranchRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubPullRequest {
    number: u64,
    head: GithubBranchRef,
    base: GithubBranchRef,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubCommitAuthor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubCommitDetail {
    message: String,
    author: Option<GithubCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubCommitEntry {
    commit: GithubCommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubLabel {
    name: String,
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: String,
        request_timeout_ms: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("herald-action"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn repo_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, repo.owner, repo.name, suffix
        )
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-herald-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let retryable = is_retryable_status(status.as_u16())
                        || is_rate_limited_forbidden(status.as_u16(), response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if retryable && self.retry.allows_retry_after(attempt) {
                        let delay = self.retry.delay(attempt, retry_after);
                        debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying github request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if self.retry.allows_retry_after(attempt)
                        && is_retryable_transport_error(&error)
                    {
                        warn!(
                            operation,
                            attempt,
                            error = %error,
                            "github transport error; retrying"
                        );
                        tokio::time::sleep(self.retry.delay(attempt, None)).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GithubApiClient {
    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequestRef> {
        let url = self.repo_url(repo, &format!("pulls/{number}"));
        let pull_request: GithubPullRequest = self
            .request_json("get pull request", || self.http.get(&url))
            .await?;
        Ok(PullRequestRef {
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
            number: pull_request.number,
            head_ref: pull_request.head.git_ref,
            base_ref: pull_request.base.git_ref,
        })
    }

    async fn add_labels(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(repo, &format!("issues/{issue_number}/labels"));
        let payload = json!({ "labels": labels });
        let applied: Vec<GithubLabel> = self
            .request_json("add labels", || self.http.post(&url).json(&payload))
            .await?;
        debug!(
            issue_number,
            labels = ?applied.iter().map(|label| label.name.as_str()).collect::<Vec<_>>(),
            "applied labels"
        );
        Ok(())
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        per_page: usize,
    ) -> Result<Vec<CommitRecord>> {
        let url = self.repo_url(repo, "commits");
        let per_page = per_page.clamp(1, GITHUB_MAX_PER_PAGE).to_string();
        let entries: Vec<GithubCommitEntry> = self
            .request_json("list commits", || {
                self.http
                    .get(&url)
                    .query(&[("sha", git_ref), ("per_page", per_page.as_str())])
            })
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| CommitRecord {
                message: entry.commit.message,
                author_date: entry.commit.author.and_then(|author| author.date),
            })
            .collect())
    }
}
