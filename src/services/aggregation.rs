//! Cross-referencing builds to pull requests.

use crate::config::CrossReferencePolicy;
use crate::models::{BuildRecord, PullRequestRecord};
use serde::Serialize;
use std::collections::HashMap;

/// A pull request with the builds that ran on its branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPullRequest {
    #[serde(flatten)]
    pub pull_request: PullRequestRecord,
    pub builds: Vec<BuildRecord>,
}

impl CrossReferencePolicy {
    /// Whether `pr` gets builds attached under this policy.
    pub fn is_eligible(&self, pr: &PullRequestRecord) -> bool {
        match self {
            CrossReferencePolicy::OpenOnly => pr.is_open(),
            CrossReferencePolicy::All => true,
        }
    }
}

/// Attach every build whose branch equals the PR's branch to each eligible PR.
///
/// Recomputed from scratch on every call. Builds with a blank branch never
/// match. A build may attach to several PRs; ineligible PRs get none.
pub fn cross_reference<'a, P, B>(
    pull_requests: P,
    builds: B,
    policy: CrossReferencePolicy,
) -> Vec<LinkedPullRequest>
where
    P: IntoIterator<Item = &'a PullRequestRecord>,
    B: IntoIterator<Item = &'a BuildRecord>,
{
    let mut by_branch: HashMap<&str, Vec<&BuildRecord>> = HashMap::new();
    for build in builds {
        if !build.branch.is_empty() {
            by_branch.entry(build.branch.as_str()).or_default().push(build);
        }
    }

    pull_requests
        .into_iter()
        .map(|pr| {
            let builds = if policy.is_eligible(pr) {
                by_branch
                    .get(pr.branch.as_str())
                    .map(|matches| matches.iter().map(|b| (*b).clone()).collect())
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            LinkedPullRequest {
                pull_request: pr.clone(),
                builds,
            }
        })
        .collect()
}
