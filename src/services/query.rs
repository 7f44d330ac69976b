//! Read-only queries over the published cache view.

use crate::error::AppError;
use crate::models::{BuildRecord, PullRequestRecord, UserRole};
use crate::services::aggregation::LinkedPullRequest;
use crate::services::coordinator::{CacheView, SourceStatus};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// A pull request as returned to a specific user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestView {
    #[serde(flatten)]
    pub pull_request: PullRequestRecord,
    pub my_role: UserRole,
    pub builds: Vec<BuildRecord>,
}

impl PullRequestView {
    fn for_user(linked: &LinkedPullRequest, my_role: UserRole) -> Self {
        Self {
            pull_request: linked.pull_request.clone(),
            my_role,
            builds: linked.builds.clone(),
        }
    }
}

/// Payload of `GET /pull-requests`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestList {
    pub prs: Vec<PullRequestView>,
}

/// Payload of `GET /awaited-reviews`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitedReviews {
    pub user_name: String,
    pub number_of_awaited_reviews: u32,
}

/// Payload of `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub pull_requests: SourceStatus,
    pub builds: SourceStatus,
}

/// Query entry point shared by the HTTP handlers.
///
/// Every call reads whichever view is current at that moment; a concurrent
/// swap never produces a half-updated result.
#[derive(Debug, Clone)]
pub struct QueryService {
    view: watch::Receiver<Arc<CacheView>>,
}

impl QueryService {
    pub fn new(view: watch::Receiver<Arc<CacheView>>) -> Self {
        Self { view }
    }

    fn current(&self) -> Arc<CacheView> {
        self.view.borrow().clone()
    }

    /// Every PR where `username` is creator, reviewer or assignee.
    ///
    /// A missing username is an error; an empty or unknown one yields no PRs.
    pub fn find_prs_for_user(&self, username: Option<&str>) -> Result<PullRequestList, AppError> {
        let username = require_username(username)?;
        if username.is_empty() {
            return Ok(PullRequestList { prs: Vec::new() });
        }

        let view = self.current();
        let prs = view
            .linked
            .iter()
            .filter_map(|linked| {
                linked
                    .pull_request
                    .role_of(username)
                    .map(|role| PullRequestView::for_user(linked, role))
            })
            .collect();

        Ok(PullRequestList { prs })
    }

    /// Number of open PRs still awaiting a review from `username`.
    pub fn awaited_review_count(&self, username: Option<&str>) -> Result<AwaitedReviews, AppError> {
        let username = require_username(username)?;
        let view = self.current();

        Ok(AwaitedReviews {
            user_name: username.to_string(),
            number_of_awaited_reviews: view.awaited.count_for(username),
        })
    }

    pub fn status(&self) -> StatusReport {
        let view = self.current();
        StatusReport {
            pull_requests: view.pull_request_status.clone(),
            builds: view.build_status.clone(),
        }
    }
}

fn require_username(username: Option<&str>) -> Result<&str, AppError> {
    username.ok_or_else(|| AppError::invalid_input_field("username is required", "username"))
}
