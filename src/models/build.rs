//! CI build record model.

use serde::{Deserialize, Serialize};

/// Final result of a CI build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    NotBuilt,
    #[serde(other)]
    Unknown,
}

/// One execution of a CI job, as persisted in the snapshot file.
///
/// Identity is `url`. `result` is `None` while the build is in progress.
/// Blank `branch`, `user_id` and `user_name` mean the upstream detail did
/// not expose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub job_type: String,
    pub job_ordinal: u32,
    pub job_name: String,
    pub number: u64,
    pub url: String,
    pub branch: String,
    /// Start time in epoch milliseconds.
    pub timestamp: i64,
    pub in_progress: bool,
    pub result: Option<BuildResult>,
    pub user_id: String,
    pub user_name: String,
}

impl BuildRecord {
    /// Finished builds are reused verbatim by incremental refreshes.
    pub fn is_terminal(&self) -> bool {
        !self.in_progress
    }

    /// Whether this build ran in the given job slot.
    pub fn in_slot(&self, job_type: &str, job_ordinal: u32) -> bool {
        self.job_type == job_type && self.job_ordinal == job_ordinal
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Finished successful build of `branch` in slot `custom-quick`/1.
    pub fn build(number: u64, branch: &str) -> BuildRecord {
        BuildRecord {
            job_type: "custom-quick".to_string(),
            job_ordinal: 1,
            job_name: "custom-quick-1".to_string(),
            number,
            url: format!("https://ci.example.com/job/custom-quick-1/{}/", number),
            branch: branch.to_string(),
            timestamp: 1_700_000_000_000 + number as i64,
            in_progress: false,
            result: Some(BuildResult::Success),
            user_id: "dev".to_string(),
            user_name: "Dev Eloper".to_string(),
        }
    }
}
