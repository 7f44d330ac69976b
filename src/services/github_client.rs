//! GitHub API client.
//!
//! Provides an HTTP client for the pull request and review endpoints of the
//! GitHub REST API (public or Enterprise), authenticated with a token header.

use crate::config::RepositoryRef;
use crate::error::AppError;
use crate::services::sources::{decode_response, ReviewSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Deserialize;

/// Items per listing page; the API maximum.
pub const PAGE_SIZE: u32 = 100;

/// GitHub API client configuration.
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    /// API base URL (e.g., `https://api.github.com` or `https://ghe.example.com/api/v3`).
    pub base_url: String,

    /// Personal access token; empty for anonymous access.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
}

/// GitHub user from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Head or base ref of a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// GitHub pull request from the listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubPullRequest {
    pub number: u64,
    pub html_url: String,
    pub title: String,
    #[serde(default)]
    pub draft: Option<bool>,
    pub user: Option<GitHubUser>,
    pub head: GitHubBranchRef,
    #[serde(default)]
    pub assignees: Option<Vec<GitHubUser>>,
    #[serde(default)]
    pub requested_reviewers: Option<Vec<GitHubUser>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

/// GitHub pull request review from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubReview {
    /// Missing for reviews of deleted accounts.
    pub user: Option<GitHubUser>,
    /// `APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, `DISMISSED` or `PENDING`.
    pub state: String,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(config: GitHubClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        if !config.token.is_empty() {
            let token_value = header::HeaderValue::from_str(&format!("token {}", config.token))
                .map_err(|_| AppError::authentication("Invalid token format"))?;
            headers.insert(header::AUTHORIZATION, token_value);
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static("polaris"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Path of a repository's pulls collection.
    fn pulls_path(repo: &RepositoryRef) -> String {
        format!(
            "/repos/{}/{}/pulls",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        )
    }
}

#[async_trait]
impl ReviewSource for GitHubClient {
    async fn list_pull_requests(
        &self,
        repo: &RepositoryRef,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubPullRequest>, AppError> {
        let endpoint = Self::pulls_path(repo);
        let url = self.api_url(&endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("state", "all".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;

        decode_response(response, &endpoint).await
    }

    async fn list_reviews(
        &self,
        repo: &RepositoryRef,
        number: u64,
    ) -> Result<Vec<GitHubReview>, AppError> {
        let endpoint = format!("{}/{}/reviews", Self::pulls_path(repo), number);
        let url = self.api_url(&endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[("per_page", PAGE_SIZE.to_string())])
            .send()
            .await?;

        decode_response(response, &endpoint).await
    }
}
