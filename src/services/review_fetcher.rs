//! Pull request fetcher.
//!
//! Each cycle lists every configured repository's pull requests page by page,
//! reuses merged and closed records from the baseline (unless the cycle is a
//! full refresh), fetches reviews for everything else and persists the
//! resulting snapshot as the next baseline.

use crate::config::{RepositoryRef, ReviewSourceConfig};
use crate::error::AppError;
use crate::models::{
    Identified, PullRequestRecord, PullRequestSnapshot, PullRequestState, ReviewState,
};
use crate::services::github_client::{GitHubPullRequest, GitHubUser, PAGE_SIZE};
use crate::services::coordinator::{SourceFetcher, SourceKind, SourceUpdate};
use crate::services::refresh::{CycleKind, CycleStats, ProgressLog, RefreshSchedule};
use crate::services::snapshot_store::SnapshotStore;
use crate::services::sources::ReviewSource;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};

/// Source name used in logs and errors.
pub const SOURCE_NAME: &str = "github";

/// Result of one fetch pass.
#[derive(Debug, Clone)]
pub struct ReviewCycle {
    pub kind: CycleKind,
    pub snapshot: PullRequestSnapshot,
    pub stats: CycleStats,
}

/// Outcome of resolving one listed pull request.
enum Resolution {
    Reused(PullRequestRecord),
    Fetched(PullRequestRecord),
    Fallback(PullRequestRecord),
    Dropped,
}

/// Periodic pull request fetcher over a [`ReviewSource`].
pub struct ReviewFetcher<S> {
    source: S,
    repositories: Vec<RepositoryRef>,
    max_prs: u32,
    concurrency: usize,
    schedule: RefreshSchedule,
    store: SnapshotStore,
    last: Option<PullRequestSnapshot>,
}

impl<S: ReviewSource> ReviewFetcher<S> {
    pub fn new(source: S, config: &ReviewSourceConfig, concurrency: usize) -> Self {
        Self {
            source,
            repositories: config.repositories.clone(),
            max_prs: config.max_prs,
            concurrency: concurrency.max(1),
            schedule: RefreshSchedule::new(config.full_refresh_cycles),
            store: SnapshotStore::new(config.snapshot_file.clone()),
            last: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// Run one cycle: pick the kind, load the baseline, fetch, persist.
    ///
    /// Fails with `SourceUnavailable` when every listing request failed; the
    /// previous baseline is left untouched in that case.
    pub async fn run_cycle(&mut self) -> Result<ReviewCycle, AppError> {
        let kind = self.schedule.begin_cycle();
        let baseline = self.load_baseline().await;
        log::info!(
            "[{}] Starting {:?} cycle #{} over {} repositories (baseline: {} PRs)",
            SOURCE_NAME,
            kind,
            self.schedule.cycles(),
            self.repositories.len(),
            baseline.len()
        );

        let cycle = self.fetch(&baseline, kind).await;
        if cycle.stats.all_listings_failed() {
            return Err(AppError::source_unavailable(
                SOURCE_NAME,
                format!("all {} listing requests failed", cycle.stats.listings),
            ));
        }

        if let Err(e) = self.store.save(&cycle.snapshot).await {
            log::warn!("[store] Failed to persist {} snapshot: {}", SOURCE_NAME, e);
        }

        log::info!(
            "[{}] Cycle complete: {} PRs ({} fetched, {} reused, {} fallback, {} dropped, {} retained)",
            SOURCE_NAME,
            cycle.snapshot.len(),
            cycle.stats.fetched,
            cycle.stats.reused,
            cycle.stats.fallback,
            cycle.stats.dropped,
            cycle.stats.retained
        );
        self.last = Some(cycle.snapshot.clone());
        Ok(cycle)
    }

    /// Persisted baseline, or the in-memory one when the file is unusable.
    async fn load_baseline(&self) -> PullRequestSnapshot {
        match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => self.last.clone().unwrap_or_default(),
            Err(e) => {
                log::warn!("[store] Ignoring {} baseline: {}", SOURCE_NAME, e);
                self.last.clone().unwrap_or_default()
            }
        }
    }

    /// Pages needed to cover `max_prs` per repository.
    fn pages_per_repository(&self) -> u32 {
        self.max_prs.div_ceil(PAGE_SIZE)
    }

    /// Build a snapshot against `baseline` without touching the store.
    pub async fn fetch(&self, baseline: &PullRequestSnapshot, kind: CycleKind) -> ReviewCycle {
        let previous = baseline.index();
        let reusable = match kind {
            CycleKind::Incremental => previous.clone(),
            CycleKind::Full => HashMap::new(),
        };
        let mut stats = CycleStats::default();

        let pages = self.pages_per_repository();
        let requests: Vec<_> = self
            .repositories
            .iter()
            .flat_map(|repo| (1..=pages).map(move |page| self.list_page(repo, page)))
            .collect();
        stats.listings = requests.len();
        let listings: Vec<_> = stream::iter(requests)
            .buffered(self.concurrency)
            .collect()
            .await;

        // Pages come back in request order, so each repo's pages stay contiguous.
        let mut listed: Vec<(&RepositoryRef, GitHubPullRequest)> = Vec::new();
        let mut incomplete: Vec<&RepositoryRef> = Vec::new();
        let chunks = listings.chunks(pages.max(1) as usize);
        for (repo, chunk) in self.repositories.iter().zip(chunks) {
            let mut repo_prs = Vec::new();
            let mut failed = false;
            for (page, result) in chunk {
                match result {
                    Ok(prs) => repo_prs.extend(prs.iter().cloned()),
                    Err(e) => {
                        log::warn!(
                            "[{}] Failed to list {} page {}: {}",
                            SOURCE_NAME,
                            repo.full_name(),
                            page,
                            e
                        );
                        stats.failed_listings += 1;
                        failed = true;
                    }
                }
            }
            repo_prs.truncate(self.max_prs as usize);
            if failed {
                incomplete.push(repo);
            }
            listed.extend(repo_prs.into_iter().map(|pr| (repo, pr)));
        }

        let mut seen = HashSet::new();
        listed.retain(|(_, pr)| seen.insert(pr.html_url.clone()));

        let progress = ProgressLog::new("get prs", listed.len());
        let resolutions: Vec<_> = listed
            .iter()
            .map(|(repo, pr)| self.resolve(repo, pr, &reusable, &previous, &progress))
            .collect();
        let resolutions: Vec<Resolution> = stream::iter(resolutions)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            match resolution {
                Resolution::Reused(record) => {
                    stats.reused += 1;
                    records.push(record);
                }
                Resolution::Fetched(record) => {
                    stats.fetched += 1;
                    records.push(record);
                }
                Resolution::Fallback(record) => {
                    stats.fallback += 1;
                    records.push(record);
                }
                Resolution::Dropped => stats.dropped += 1,
            }
        }

        // Repos with a failed page keep what they had, minus what was re-observed.
        for repo in incomplete {
            let full_name = repo.full_name();
            let carried: Vec<PullRequestRecord> = baseline
                .iter()
                .filter(|pr| pr.repo_full_name == full_name && !seen.contains(pr.identity()))
                .cloned()
                .collect();
            stats.retained += carried.len();
            records.extend(carried);
        }

        ReviewCycle {
            kind,
            snapshot: PullRequestSnapshot::new(records),
            stats,
        }
    }

    async fn list_page<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        page: u32,
    ) -> (u32, Result<Vec<GitHubPullRequest>, AppError>) {
        (page, self.source.list_pull_requests(repo, page, PAGE_SIZE).await)
    }

    async fn resolve(
        &self,
        repo: &RepositoryRef,
        pr: &GitHubPullRequest,
        reusable: &HashMap<&str, &PullRequestRecord>,
        previous: &HashMap<&str, &PullRequestRecord>,
        progress: &ProgressLog,
    ) -> Resolution {
        let resolution = match reusable.get(pr.html_url.as_str()) {
            Some(cached) if cached.state.is_terminal() => Resolution::Reused((*cached).clone()),
            _ => self.fetch_record(repo, pr, previous).await,
        };
        progress.advance();
        resolution
    }

    async fn fetch_record(
        &self,
        repo: &RepositoryRef,
        pr: &GitHubPullRequest,
        previous: &HashMap<&str, &PullRequestRecord>,
    ) -> Resolution {
        match self.source.list_reviews(repo, pr.number).await {
            Ok(reviews) => {
                let mut record = base_record(repo, pr);
                record.merge_reviews(reviews.into_iter().filter_map(|review| {
                    review
                        .user
                        .map(|user| (user.login, ReviewState::from(review.state.as_str())))
                }));
                Resolution::Fetched(record)
            }
            Err(e) => {
                log::warn!(
                    "[{}] Failed to fetch reviews for {}#{}: {}",
                    SOURCE_NAME,
                    repo.full_name(),
                    pr.number,
                    e
                );
                match previous.get(pr.html_url.as_str()) {
                    Some(old) if old.state.is_terminal() => Resolution::Fallback((*old).clone()),
                    _ => Resolution::Dropped,
                }
            }
        }
    }
}

#[async_trait]
impl<S: ReviewSource + 'static> SourceFetcher for ReviewFetcher<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::PullRequests
    }

    async fn run_cycle(&mut self) -> Result<SourceUpdate, AppError> {
        ReviewFetcher::run_cycle(self)
            .await
            .map(|cycle| SourceUpdate::PullRequests(cycle.snapshot))
    }
}

/// Record from the listing payload, before reviews are merged in.
fn base_record(repo: &RepositoryRef, pr: &GitHubPullRequest) -> PullRequestRecord {
    PullRequestRecord {
        repo_name: repo.name.clone(),
        repo_full_name: repo.full_name(),
        number: pr.number,
        html_url: pr.html_url.clone(),
        state: PullRequestState::derive(
            pr.draft.unwrap_or(false),
            pr.merged_at.is_some(),
            pr.closed_at.is_some(),
        ),
        title: pr.title.clone(),
        branch: pr.head.ref_name.clone(),
        creator: pr.user.as_ref().map(|u| u.login.clone()).unwrap_or_default(),
        assignees: logins(&pr.assignees),
        reviewers: logins(&pr.requested_reviewers),
        reviews: Vec::new(),
        created_at: pr.created_at,
        updated_at: pr.updated_at,
        closed_at: pr.closed_at,
        merged_at: pr.merged_at,
        merge_commit_sha: pr.merge_commit_sha.clone(),
    }
}

fn logins(users: &Option<Vec<GitHubUser>>) -> Vec<String> {
    users.iter().flatten().map(|u| u.login.clone()).collect()
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::services::github_client::{GitHubBranchRef, GitHubReview};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn user(login: &str) -> GitHubUser {
        GitHubUser {
            login: login.to_string(),
        }
    }

    /// Listing payload for an open PR in `acme/api`.
    pub fn listed_pr(number: u64, branch: &str, creator: &str) -> GitHubPullRequest {
        GitHubPullRequest {
            number,
            html_url: format!("https://github.example.com/acme/api/pull/{}", number),
            title: format!("PR {}", number),
            draft: Some(false),
            user: Some(user(creator)),
            head: GitHubBranchRef {
                ref_name: branch.to_string(),
            },
            assignees: Some(vec![]),
            requested_reviewers: Some(vec![]),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
            updated_at: None,
            closed_at: None,
            merged_at: None,
            merge_commit_sha: None,
        }
    }

    pub fn merged(mut pr: GitHubPullRequest) -> GitHubPullRequest {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
        pr.closed_at = Some(at);
        pr.merged_at = Some(at);
        pr.merge_commit_sha = Some("abc123".to_string());
        pr
    }

    pub fn review(login: Option<&str>, state: &str) -> GitHubReview {
        GitHubReview {
            user: login.map(user),
            state: state.to_string(),
        }
    }

    /// In-memory review host with call counters and injectable failures.
    #[derive(Default)]
    pub struct FakeReviewSource {
        pub pulls: Mutex<HashMap<String, Vec<GitHubPullRequest>>>,
        pub reviews: Mutex<HashMap<u64, Vec<GitHubReview>>>,
        pub failing_repos: Mutex<HashSet<String>>,
        pub failing_reviews: Mutex<HashSet<u64>>,
        pub list_calls: AtomicUsize,
        pub review_calls: AtomicUsize,
    }

    impl FakeReviewSource {
        pub fn with_pulls(repo: &str, pulls: Vec<GitHubPullRequest>) -> Self {
            let fake = Self::default();
            fake.set_pulls(repo, pulls);
            fake
        }

        pub fn set_pulls(&self, repo: &str, pulls: Vec<GitHubPullRequest>) {
            self.pulls.lock().unwrap().insert(repo.to_string(), pulls);
        }

        pub fn set_reviews(&self, number: u64, reviews: Vec<GitHubReview>) {
            self.reviews.lock().unwrap().insert(number, reviews);
        }

        pub fn fail_repo(&self, repo: &str, failing: bool) {
            let mut repos = self.failing_repos.lock().unwrap();
            if failing {
                repos.insert(repo.to_string());
            } else {
                repos.remove(repo);
            }
        }

        pub fn fail_reviews(&self, number: u64) {
            self.failing_reviews.lock().unwrap().insert(number);
        }

        pub fn review_calls(&self) -> usize {
            self.review_calls.load(Ordering::SeqCst)
        }

        pub fn reset_counters(&self) {
            self.list_calls.store(0, Ordering::SeqCst);
            self.review_calls.store(0, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ReviewSource for FakeReviewSource {
        async fn list_pull_requests(
            &self,
            repo: &RepositoryRef,
            page: u32,
            per_page: u32,
        ) -> Result<Vec<GitHubPullRequest>, AppError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let name = repo.full_name();
            if self.failing_repos.lock().unwrap().contains(&name) {
                return Err(AppError::upstream("boom"));
            }
            let pulls = self.pulls.lock().unwrap();
            let all = pulls.get(&name).cloned().unwrap_or_default();
            Ok(all
                .into_iter()
                .skip(((page - 1) * per_page) as usize)
                .take(per_page as usize)
                .collect())
        }

        async fn list_reviews(
            &self,
            _repo: &RepositoryRef,
            number: u64,
        ) -> Result<Vec<GitHubReview>, AppError> {
            self.review_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_reviews.lock().unwrap().contains(&number) {
                return Err(AppError::network("reset"));
            }
            Ok(self
                .reviews
                .lock()
                .unwrap()
                .get(&number)
                .cloned()
                .unwrap_or_default())
        }
    }
}
