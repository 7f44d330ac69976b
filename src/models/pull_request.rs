//! Pull request record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Draft,
    Merged,
    Closed,
}

impl PullRequestState {
    /// Derive the state from the upstream flags.
    ///
    /// Precedence is draft > merged > closed > open.
    pub fn derive(draft: bool, merged: bool, closed: bool) -> Self {
        if draft {
            Self::Draft
        } else if merged {
            Self::Merged
        } else if closed {
            Self::Closed
        } else {
            Self::Open
        }
    }

    /// Terminal records are reused verbatim by incremental refreshes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Draft => write!(f, "draft"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A reviewer's latest review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Requested reviewer that has not submitted anything. Never stored.
    Awaiting,
    Pending,
    Commented,
    ChangesRequested,
    Approved,
    Dismissed,
}

impl From<&str> for ReviewState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "approved" => Self::Approved,
            "changes_requested" => Self::ChangesRequested,
            "commented" => Self::Commented,
            "dismissed" => Self::Dismissed,
            "pending" => Self::Pending,
            _ => Self::Awaiting,
        }
    }
}

impl ReviewState {
    /// Whether this state counts as a submitted review.
    pub fn is_completed(&self) -> bool {
        !matches!(self, Self::Awaiting | Self::Pending)
    }
}

/// One entry of the per-user review mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub user: String,
    pub state: ReviewState,
}

/// Role of a user on a pull request, from that user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Creator,
    Reviewer,
    Assignee,
}

/// A tracked pull request as persisted in the snapshot file.
///
/// Identity is `html_url`. `assignees`, `reviewers` and `reviews` are kept
/// sorted by user name, and `reviews` holds at most one entry per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    pub repo_name: String,
    pub repo_full_name: String,
    pub number: u64,
    pub html_url: String,
    pub state: PullRequestState,
    pub title: String,
    pub branch: String,
    pub creator: String,
    pub assignees: Vec<String>,
    pub reviewers: Vec<String>,
    pub reviews: Vec<ReviewEntry>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

impl PullRequestRecord {
    /// Merge a chronological list of `(author, state)` reviews into the record.
    ///
    /// Every author joins `reviewers`; the latest review per author wins.
    /// Leaves all three user lists sorted.
    pub fn merge_reviews<I>(&mut self, reviews: I)
    where
        I: IntoIterator<Item = (String, ReviewState)>,
    {
        let mut reviewers: BTreeSet<String> = self.reviewers.drain(..).collect();
        let mut latest: BTreeMap<String, ReviewState> = self
            .reviews
            .drain(..)
            .map(|entry| (entry.user, entry.state))
            .collect();

        for (user, state) in reviews {
            reviewers.insert(user.clone());
            latest.insert(user, state);
        }

        let assignees: BTreeSet<String> = self.assignees.drain(..).collect();
        self.assignees = assignees.into_iter().collect();
        self.reviewers = reviewers.into_iter().collect();
        self.reviews = latest
            .into_iter()
            .map(|(user, state)| ReviewEntry { user, state })
            .collect();
    }

    /// Review state of `user`, `Awaiting` when they have not reviewed yet.
    pub fn review_state_for(&self, user: &str) -> ReviewState {
        self.reviews
            .iter()
            .find(|r| r.user == user)
            .map(|r| r.state)
            .unwrap_or(ReviewState::Awaiting)
    }

    /// Reviewers that still owe a completed review.
    pub fn awaiting_reviewers(&self) -> impl Iterator<Item = &str> {
        self.reviewers
            .iter()
            .map(String::as_str)
            .filter(|reviewer| !self.review_state_for(reviewer).is_completed())
    }

    /// The role `user` plays on this PR, if any.
    ///
    /// Creator takes precedence over reviewer, reviewer over assignee.
    pub fn role_of(&self, user: &str) -> Option<UserRole> {
        if self.creator == user {
            Some(UserRole::Creator)
        } else if self.reviewers.iter().any(|r| r == user) {
            Some(UserRole::Reviewer)
        } else if self.assignees.iter().any(|a| a == user) {
            Some(UserRole::Assignee)
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PullRequestState::Open
    }
}
