//! Incremental vs. full refresh scheduling and per-cycle bookkeeping.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Kind of fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Terminal records from the baseline are reused without upstream calls.
    Incremental,
    /// The baseline is ignored for reuse; every item is refetched.
    Full,
}

/// Per-source cycle counter deciding when a full refresh is due.
///
/// Cycles are numbered from 1; cycle `n` is full when `n` is a multiple of
/// `full_refresh_every`. Zero disables full refreshes.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    full_refresh_every: u32,
    started_cycles: u64,
}

impl RefreshSchedule {
    pub fn new(full_refresh_every: u32) -> Self {
        Self {
            full_refresh_every,
            started_cycles: 0,
        }
    }

    /// Advance the counter and return the kind of the cycle being started.
    pub fn begin_cycle(&mut self) -> CycleKind {
        self.started_cycles += 1;
        if self.full_refresh_every > 0 && self.started_cycles % u64::from(self.full_refresh_every) == 0
        {
            CycleKind::Full
        } else {
            CycleKind::Incremental
        }
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.started_cycles
    }
}

/// Counters reported at the end of a fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Items refetched from upstream.
    pub fetched: usize,
    /// Terminal items copied from the baseline without upstream calls.
    pub reused: usize,
    /// Items whose detail fetch failed but a previous copy was kept.
    pub fallback: usize,
    /// Items whose detail fetch failed with nothing to fall back to.
    pub dropped: usize,
    /// Baseline items carried forward because their listing failed.
    pub retained: usize,
    /// Listing requests issued (pages or job slots).
    pub listings: usize,
    /// Listing requests that failed.
    pub failed_listings: usize,
}

impl CycleStats {
    /// Every listing request failed, so the cycle saw nothing fresh.
    pub fn all_listings_failed(&self) -> bool {
        self.listings > 0 && self.failed_listings == self.listings
    }
}

/// Logs progress of a work list at every 10% step.
#[derive(Debug)]
pub struct ProgressLog {
    label: &'static str,
    total: usize,
    done: AtomicUsize,
    last_decile: AtomicUsize,
}

impl ProgressLog {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            done: AtomicUsize::new(0),
            last_decile: AtomicUsize::new(0),
        }
    }

    /// Record one finished item.
    pub fn advance(&self) {
        if self.total == 0 {
            return;
        }
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let decile = (done * 10 / self.total).min(10);
        if decile > 0 && self.last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            log::info!("{} - {}%", self.label, decile * 10);
        }
    }
}
