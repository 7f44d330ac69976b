//! Per-user count of reviews still owed on open pull requests.

use super::PullRequestRecord;
use serde::Serialize;
use std::collections::HashMap;

/// Mapping user name → number of open PRs awaiting that user's review.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AwaitedReviewsIndex {
    counts: HashMap<String, u32>,
}

impl AwaitedReviewsIndex {
    /// Rebuild the index from scratch.
    ///
    /// Only `open` PRs count; drafts, merged and closed PRs contribute nothing.
    pub fn build<'a, I>(pull_requests: I) -> Self
    where
        I: IntoIterator<Item = &'a PullRequestRecord>,
    {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for pr in pull_requests.into_iter().filter(|pr| pr.is_open()) {
            for reviewer in pr.awaiting_reviewers() {
                *counts.entry(reviewer.to_string()).or_default() += 1;
            }
        }
        Self { counts }
    }

    /// Awaited review count for `user`, zero when unknown.
    pub fn count_for(&self, user: &str) -> u32 {
        self.counts.get(user).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
