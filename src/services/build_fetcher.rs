//! CI build fetcher.
//!
//! Each cycle lists the recent builds of every job slot in the configured
//! matrix, reuses finished builds from the baseline (unless the cycle is a
//! full refresh), fetches details for the rest and persists the resulting
//! snapshot as the next baseline.

use crate::config::{BuildSourceConfig, JobSlot};
use crate::error::AppError;
use crate::models::{BuildRecord, BuildSnapshot, Identified};
use crate::services::coordinator::{SourceFetcher, SourceKind, SourceUpdate};
use crate::services::jenkins_client::{
    JenkinsBuild, JenkinsBuildRef, JenkinsJob, BRANCH_PARAMETER,
};
use crate::services::refresh::{CycleKind, CycleStats, ProgressLog, RefreshSchedule};
use crate::services::snapshot_store::SnapshotStore;
use crate::services::sources::BuildSource;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};

/// Source name used in logs and errors.
pub const SOURCE_NAME: &str = "jenkins";

/// Result of one fetch pass.
#[derive(Debug, Clone)]
pub struct BuildCycle {
    pub kind: CycleKind,
    pub snapshot: BuildSnapshot,
    pub stats: CycleStats,
}

enum Resolution {
    Reused(BuildRecord),
    Fetched(BuildRecord),
    Fallback(BuildRecord),
    Dropped,
}

/// Periodic build fetcher over a [`BuildSource`].
pub struct BuildFetcher<S> {
    source: S,
    slots: Vec<JobSlot>,
    max_builds_per_job: usize,
    concurrency: usize,
    schedule: RefreshSchedule,
    store: SnapshotStore,
    last: Option<BuildSnapshot>,
}

impl<S: BuildSource> BuildFetcher<S> {
    pub fn new(source: S, config: &BuildSourceConfig, concurrency: usize) -> Self {
        Self {
            source,
            slots: config.job_matrix(),
            max_builds_per_job: config.max_builds_per_job,
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

    pub fn slots(&self) -> &[JobSlot] {
        &self.slots
    }

    /// Run one cycle: pick the kind, load the baseline, fetch, persist.
    ///
    /// Fails with `SourceUnavailable` when every job listing failed.
    pub async fn run_cycle(&mut self) -> Result<BuildCycle, AppError> {
        let kind = self.schedule.begin_cycle();
        let baseline = self.load_baseline().await;
        log::info!(
            "[{}] Starting {:?} cycle #{} over {} job slots (baseline: {} builds)",
            SOURCE_NAME,
            kind,
            self.schedule.cycles(),
            self.slots.len(),
            baseline.len()
        );

        let cycle = self.fetch(&baseline, kind).await;
        if cycle.stats.all_listings_failed() {
            return Err(AppError::source_unavailable(
                SOURCE_NAME,
                format!("all {} job listings failed", cycle.stats.listings),
            ));
        }

        if let Err(e) = self.store.save(&cycle.snapshot).await {
            log::warn!("[store] Failed to persist {} snapshot: {}", SOURCE_NAME, e);
        }

        log::info!(
            "[{}] Cycle complete: {} builds ({} fetched, {} reused, {} fallback, {} dropped, {} retained)",
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

    async fn load_baseline(&self) -> BuildSnapshot {
        match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => self.last.clone().unwrap_or_default(),
            Err(e) => {
                log::warn!("[store] Ignoring {} baseline: {}", SOURCE_NAME, e);
                self.last.clone().unwrap_or_default()
            }
        }
    }

    /// Build a snapshot against `baseline` without touching the store.
    pub async fn fetch(&self, baseline: &BuildSnapshot, kind: CycleKind) -> BuildCycle {
        let previous = baseline.index();
        let reusable = match kind {
            CycleKind::Incremental => previous.clone(),
            CycleKind::Full => HashMap::new(),
        };
        let mut stats = CycleStats {
            listings: self.slots.len(),
            ..Default::default()
        };

        let requests: Vec<_> = self.slots.iter().map(|slot| self.list_job(slot)).collect();
        let listings: Vec<_> = stream::iter(requests)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut listed: Vec<(&JobSlot, String, JenkinsBuildRef)> = Vec::new();
        let mut failed_slots: Vec<&JobSlot> = Vec::new();
        for (slot, result) in self.slots.iter().zip(listings) {
            match result {
                Ok(job) => {
                    let JenkinsJob { name, builds } = job;
                    listed.extend(
                        builds
                            .into_iter()
                            .take(self.max_builds_per_job)
                            .map(|build| (slot, name.clone(), build)),
                    );
                }
                Err(e) => {
                    log::warn!("[{}] Failed to list job {}: {}", SOURCE_NAME, slot.url, e);
                    stats.failed_listings += 1;
                    failed_slots.push(slot);
                }
            }
        }

        let mut seen = HashSet::new();
        listed.retain(|(_, _, build)| seen.insert(build.url.clone()));

        let progress = ProgressLog::new("get builds", listed.len());
        let resolutions: Vec<_> = listed
            .iter()
            .map(|(slot, job_name, build)| {
                self.resolve(slot, job_name, build, &reusable, &previous, &progress)
            })
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

        for slot in failed_slots {
            let carried: Vec<BuildRecord> = baseline
                .iter()
                .filter(|b| {
                    b.in_slot(&slot.job_type, slot.ordinal) && !seen.contains(b.identity())
                })
                .cloned()
                .collect();
            stats.retained += carried.len();
            records.extend(carried);
        }

        BuildCycle {
            kind,
            snapshot: BuildSnapshot::new(records),
            stats,
        }
    }

    async fn list_job(&self, slot: &JobSlot) -> Result<JenkinsJob, AppError> {
        self.source.get_job(&slot.url).await
    }

    async fn resolve(
        &self,
        slot: &JobSlot,
        job_name: &str,
        build: &JenkinsBuildRef,
        reusable: &HashMap<&str, &BuildRecord>,
        previous: &HashMap<&str, &BuildRecord>,
        progress: &ProgressLog,
    ) -> Resolution {
        let resolution = match reusable.get(build.url.as_str()) {
            Some(cached) if cached.is_terminal() => Resolution::Reused((*cached).clone()),
            _ => match self.source.get_build(&build.url).await {
                Ok(detail) => Resolution::Fetched(build_record(slot, job_name, build, &detail)),
                Err(e) => {
                    log::warn!("[{}] Failed to fetch build {}: {}", SOURCE_NAME, build.url, e);
                    match previous.get(build.url.as_str()) {
                        Some(old) => Resolution::Fallback((*old).clone()),
                        None => Resolution::Dropped,
                    }
                }
            },
        };
        progress.advance();
        resolution
    }
}

#[async_trait]
impl<S: BuildSource + 'static> SourceFetcher for BuildFetcher<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::Builds
    }

    async fn run_cycle(&mut self) -> Result<SourceUpdate, AppError> {
        BuildFetcher::run_cycle(self)
            .await
            .map(|cycle| SourceUpdate::Builds(cycle.snapshot))
    }
}

fn build_record(
    slot: &JobSlot,
    job_name: &str,
    build: &JenkinsBuildRef,
    detail: &JenkinsBuild,
) -> BuildRecord {
    let (user_id, user_name) = detail.triggering_user().unwrap_or_default();
    BuildRecord {
        job_type: slot.job_type.clone(),
        job_ordinal: slot.ordinal,
        job_name: job_name.to_string(),
        number: build.number,
        url: build.url.clone(),
        branch: detail.parameter(BRANCH_PARAMETER).unwrap_or_default(),
        timestamp: detail.timestamp,
        in_progress: detail.in_progress,
        result: if detail.in_progress { None } else { detail.result },
        user_id,
        user_name,
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::models::BuildResult;
    use crate::services::jenkins_client::{JenkinsAction, JenkinsCause, JenkinsParameter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn job(name: &str, builds: &[(u64, &str)]) -> JenkinsJob {
        JenkinsJob {
            name: name.to_string(),
            builds: builds
                .iter()
                .map(|(number, url)| JenkinsBuildRef {
                    number: *number,
                    url: url.to_string(),
                })
                .collect(),
        }
    }

    /// Build detail triggered by `user` on `branch`.
    pub fn detail(branch: Option<&str>, user: Option<&str>, in_progress: bool) -> JenkinsBuild {
        let mut actions = Vec::new();
        if let Some(user) = user {
            actions.push(Some(JenkinsAction {
                causes: Some(vec![JenkinsCause {
                    user_id: Some(user.to_string()),
                    user_name: Some(format!("{} Name", user)),
                }]),
                parameters: None,
            }));
        }
        actions.push(None);
        if let Some(branch) = branch {
            actions.push(Some(JenkinsAction {
                causes: None,
                parameters: Some(vec![JenkinsParameter {
                    name: Some(BRANCH_PARAMETER.to_string()),
                    value: serde_json::Value::String(branch.to_string()),
                }]),
            }));
        }
        JenkinsBuild {
            timestamp: 1_700_000_000_000,
            in_progress,
            result: if in_progress {
                None
            } else {
                Some(BuildResult::Success)
            },
            actions,
        }
    }

    /// In-memory CI server keyed by job and build URL.
    #[derive(Default)]
    pub struct FakeBuildSource {
        pub jobs: Mutex<HashMap<String, JenkinsJob>>,
        pub builds: Mutex<HashMap<String, JenkinsBuild>>,
        pub failing_jobs: Mutex<HashSet<String>>,
        pub failing_builds: Mutex<HashSet<String>>,
        pub job_calls: AtomicUsize,
        pub build_calls: AtomicUsize,
    }

    impl FakeBuildSource {
        pub fn set_job(&self, url: &str, job: JenkinsJob) {
            self.jobs.lock().unwrap().insert(url.to_string(), job);
        }

        pub fn set_build(&self, url: &str, build: JenkinsBuild) {
            self.builds.lock().unwrap().insert(url.to_string(), build);
        }

        pub fn fail_job(&self, url: &str) {
            self.failing_jobs.lock().unwrap().insert(url.to_string());
        }

        pub fn fail_build(&self, url: &str) {
            self.failing_builds.lock().unwrap().insert(url.to_string());
        }

        pub fn build_calls(&self) -> usize {
            self.build_calls.load(Ordering::SeqCst)
        }

        pub fn reset_counters(&self) {
            self.job_calls.store(0, Ordering::SeqCst);
            self.build_calls.store(0, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BuildSource for FakeBuildSource {
        async fn get_job(&self, job_url: &str) -> Result<JenkinsJob, AppError> {
            self.job_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_jobs.lock().unwrap().contains(job_url) {
                return Err(AppError::upstream("job unavailable"));
            }
            self.jobs
                .lock()
                .unwrap()
                .get(job_url)
                .cloned()
                .ok_or_else(|| AppError::upstream_full("Resource not found", 404, job_url))
        }

        async fn get_build(&self, build_url: &str) -> Result<JenkinsBuild, AppError> {
            self.build_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_builds.lock().unwrap().contains(build_url) {
                return Err(AppError::network("reset"));
            }
            self.builds
                .lock()
                .unwrap()
                .get(build_url)
                .cloned()
                .ok_or_else(|| AppError::upstream_full("Resource not found", 404, build_url))
        }
    }
}
