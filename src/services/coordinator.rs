//! Background coordinator owning the in-memory cache.
//!
//! This module provides:
//! - `PeriodicTask`: one tokio task per source running fetch cycles back to back,
//!   separated by the source's own interval
//! - `Coordinator`: the only writer of cache state, installing each reported
//!   snapshot wholesale and recomputing derived data
//! - `CoordinatorHandle`: read access to the published view and shutdown control
//!
//! Readers get an immutable `Arc<CacheView>` from a watch channel, so a swap is
//! a single pointer replacement and never blocks queries.

use crate::config::CrossReferencePolicy;
use crate::error::AppError;
use crate::models::{AwaitedReviewsIndex, BuildSnapshot, PullRequestSnapshot};
use crate::services::aggregation::{cross_reference, LinkedPullRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Report channel capacity; each source has at most one report in flight.
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// The two upstream sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    PullRequests,
    Builds,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::PullRequests => write!(f, "pull requests"),
            SourceKind::Builds => write!(f, "builds"),
        }
    }
}

/// Fresh snapshot produced by one fetch cycle.
#[derive(Debug, Clone)]
pub enum SourceUpdate {
    PullRequests(PullRequestSnapshot),
    Builds(BuildSnapshot),
}

impl SourceUpdate {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceUpdate::PullRequests(_) => SourceKind::PullRequests,
            SourceUpdate::Builds(_) => SourceKind::Builds,
        }
    }
}

/// Message sent from a periodic task to the coordinator after each cycle.
#[derive(Debug)]
pub struct SourceReport {
    pub source: SourceKind,
    pub outcome: Result<SourceUpdate, AppError>,
}

/// One source's fetch cycle, as driven by a [`PeriodicTask`].
#[async_trait]
pub trait SourceFetcher: Send {
    fn kind(&self) -> SourceKind;

    /// Run one complete cycle and return the new snapshot.
    async fn run_cycle(&mut self) -> Result<SourceUpdate, AppError>;
}

/// Health of one source as seen by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub enabled: bool,
    /// Successful cycles installed so far.
    pub cycles: u64,
    pub failed_cycles: u64,
    /// Records in the installed snapshot.
    pub records: usize,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SourceStatus {
    fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }
}

/// Immutable cache contents published after every installed report.
#[derive(Debug, Clone, Default)]
pub struct CacheView {
    pub pull_requests: PullRequestSnapshot,
    pub builds: BuildSnapshot,
    /// Every PR with the builds attached under the configured policy.
    pub linked: Vec<LinkedPullRequest>,
    pub awaited: AwaitedReviewsIndex,
    pub pull_request_status: SourceStatus,
    pub build_status: SourceStatus,
}

/// A fetcher plus the delay between the end of one cycle and the next.
pub struct PeriodicTask {
    fetcher: Box<dyn SourceFetcher>,
    interval: Duration,
}

impl PeriodicTask {
    pub fn new<F: SourceFetcher + 'static>(fetcher: F, interval: Duration) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            interval,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.fetcher.kind()
    }

    /// Run cycles until cancelled or the coordinator goes away.
    ///
    /// The first cycle starts immediately; each later one starts `interval`
    /// after the previous one finished, so cycles of one source never overlap.
    fn spawn(
        self,
        reports: mpsc::Sender<SourceReport>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let PeriodicTask {
            mut fetcher,
            interval,
        } = self;

        tokio::spawn(async move {
            let source = fetcher.kind();
            log::info!(
                "[coordinator] Starting {} task, interval={}s",
                source,
                interval.as_secs()
            );

            loop {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = fetcher.run_cycle() => outcome,
                };

                if reports.send(SourceReport { source, outcome }).await.is_err() {
                    break;
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            log::info!("[coordinator] {} task stopped", source);
        })
    }
}

/// Single writer of the cache.
pub struct Coordinator {
    policy: CrossReferencePolicy,
    current: Arc<CacheView>,
    publisher: watch::Sender<Arc<CacheView>>,
}

impl Coordinator {
    /// Create a coordinator with an empty view and the receiver readers use.
    pub fn new(
        policy: CrossReferencePolicy,
        pull_requests_enabled: bool,
        builds_enabled: bool,
    ) -> (Self, watch::Receiver<Arc<CacheView>>) {
        let initial = Arc::new(CacheView {
            pull_request_status: SourceStatus::enabled(pull_requests_enabled),
            build_status: SourceStatus::enabled(builds_enabled),
            ..Default::default()
        });
        let (publisher, receiver) = watch::channel(initial.clone());

        (
            Self {
                policy,
                current: initial,
                publisher,
            },
            receiver,
        )
    }

    /// Install one report and publish the resulting view.
    ///
    /// A failed cycle only updates the source status; the previous snapshot
    /// stays in place.
    pub fn apply(&mut self, report: SourceReport) {
        let mut next = CacheView::clone(&self.current);

        match report.outcome {
            Ok(SourceUpdate::PullRequests(snapshot)) => {
                log::info!("[coordinator] Installing {} pull requests", snapshot.len());
                next.awaited = AwaitedReviewsIndex::build(&snapshot);
                mark_success(&mut next.pull_request_status, snapshot.len());
                next.pull_requests = snapshot;
            }
            Ok(SourceUpdate::Builds(snapshot)) => {
                log::info!("[coordinator] Installing {} builds", snapshot.len());
                mark_success(&mut next.build_status, snapshot.len());
                next.builds = snapshot;
            }
            Err(e) => {
                log::error!("[coordinator] {} cycle failed: {}", report.source, e);
                let status = match report.source {
                    SourceKind::PullRequests => &mut next.pull_request_status,
                    SourceKind::Builds => &mut next.build_status,
                };
                status.failed_cycles += 1;
                status.last_error = Some(e.to_string());
            }
        }

        next.linked = cross_reference(&next.pull_requests, &next.builds, self.policy);
        self.current = Arc::new(next);
        self.publisher.send_replace(self.current.clone());
    }

    /// Spawn the periodic tasks and the coordinator loop.
    pub fn start(self, tasks: Vec<PeriodicTask>) -> CoordinatorHandle {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<SourceReport>(REPORT_CHANNEL_CAPACITY);
        let view = self.publisher.subscribe();

        let mut handles: Vec<JoinHandle<()>> = tasks
            .into_iter()
            .map(|task| task.spawn(tx.clone(), cancel.clone()))
            .collect();
        drop(tx);

        let loop_cancel = cancel.clone();
        let mut coordinator = self;
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    report = rx.recv() => match report {
                        Some(report) => coordinator.apply(report),
                        None => break,
                    },
                }
            }
            log::info!("[coordinator] Coordinator stopped");
        }));

        CoordinatorHandle {
            view,
            cancel,
            tasks: handles,
        }
    }
}

fn mark_success(status: &mut SourceStatus, records: usize) {
    status.cycles += 1;
    status.records = records;
    status.last_success_at = Some(Utc::now());
    status.last_error = None;
}

/// Read access to the cache and shutdown control for the background tasks.
pub struct CoordinatorHandle {
    view: watch::Receiver<Arc<CacheView>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Receiver of published views, for the query layer.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheView>> {
        self.view.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("[coordinator] Task ended abnormally: {}", e);
            }
        }
    }
}
