//! Upstream seams used by the fetchers.
//!
//! The fetchers only talk to the review host and the CI server through these
//! traits, so the real HTTP clients can be swapped for in-memory fakes.

use crate::config::RepositoryRef;
use crate::error::AppError;
use crate::services::github_client::{GitHubPullRequest, GitHubReview};
use crate::services::jenkins_client::{JenkinsBuild, JenkinsJob};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// Pull request and review listings.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// One page of a repository's pull requests, all states.
    async fn list_pull_requests(
        &self,
        repo: &RepositoryRef,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubPullRequest>, AppError>;

    /// Reviews of one pull request in submission order.
    async fn list_reviews(
        &self,
        repo: &RepositoryRef,
        number: u64,
    ) -> Result<Vec<GitHubReview>, AppError>;
}

/// CI job listings and build details.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// The job at `job_url` with its recent builds.
    async fn get_job(&self, job_url: &str) -> Result<JenkinsJob, AppError>;

    /// Detail of the build at `build_url`.
    async fn get_build(&self, build_url: &str) -> Result<JenkinsBuild, AppError>;
}

/// Decode a JSON body or turn a failed response into an `AppError`.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: Response,
    endpoint: &str,
) -> Result<T, AppError> {
    let status = response.status();

    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
    } else if status == StatusCode::UNAUTHORIZED {
        Err(AppError::authentication(format!(
            "Credentials rejected by {}",
            endpoint
        )))
    } else {
        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let body_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string())
            });

        let message = match (status, &body_message) {
            (StatusCode::FORBIDDEN, Some(msg)) => format!("Access denied: {}", msg),
            (StatusCode::FORBIDDEN, None) => "Access denied".to_string(),
            (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg.clone(),
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        Err(AppError::upstream_full(message, status_code, endpoint))
    }
}
