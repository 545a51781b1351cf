//! Tier migration — the forward-only hot → warm → cold → archived-out ladder.
//!
//! The sweep runs on a schedule (and on session end) and never blocks foreground
//! writes: stores serialize internally and every per-item failure is isolated,
//! logged, and skipped. A hot entry whose embedding fails stays hot-tier in the
//! retry queue; once the retry cap is exhausted it is archived straight to cold so
//! content is preserved rather than stranded.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::TransitionConfig;
use crate::embedding::Embedder;
use crate::error::{Result, StrataError};
use crate::memory::cold::{ArchiveRecord, ColdArchive};
use crate::memory::decay::DecayEngine;
use crate::memory::hot::HotStore;
use crate::memory::reinforcement::ReinforcementTracker;
use crate::memory::types::{MemoryEntry, Tier};
use crate::memory::warm::WarmStore;

/// Counters from one sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub promoted_to_warm: usize,
    pub promotion_failures: usize,
    pub aged_to_cold: usize,
    pub archived_out: usize,
}

pub struct TierTransitioner {
    hot: Arc<Mutex<HotStore>>,
    warm: Arc<WarmStore>,
    cold: Arc<ColdArchive>,
    decay: Arc<DecayEngine>,
    tracker: Arc<ReinforcementTracker>,
    embedder: Option<Arc<dyn Embedder>>,
    config: TransitionConfig,
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl TierTransitioner {
    pub fn new(
        hot: Arc<Mutex<HotStore>>,
        warm: Arc<WarmStore>,
        cold: Arc<ColdArchive>,
        decay: Arc<DecayEngine>,
        tracker: Arc<ReinforcementTracker>,
        embedder: Option<Arc<dyn Embedder>>,
        config: &TransitionConfig,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            decay,
            tracker,
            embedder,
            config: config.clone(),
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    /// One full pass over the tiers. Cost is O(live entries), which the age
    /// windows keep bounded. Individual failures never abort the sweep.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        self.promote_hot(now, &mut report);
        self.age_out_warm(now, &mut report);
        self.archive_decayed(now, &mut report);
        debug!(
            promoted = report.promoted_to_warm,
            failures = report.promotion_failures,
            aged = report.aged_to_cold,
            archived = report.archived_out,
            "tier sweep complete"
        );
        report
    }

    /// Hot → warm: embed and store everything the ring has expired or evicted.
    fn promote_hot(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let pending = self.hot.lock().unwrap().take_pending(now);
        let mut retry = Vec::new();

        for mut entry in pending {
            match self.promote(&mut entry) {
                Ok(()) => {
                    self.retry_counts.lock().unwrap().remove(&entry.id);
                    report.promoted_to_warm += 1;
                }
                Err(e) => {
                    report.promotion_failures += 1;
                    let attempts = {
                        let mut counts = self.retry_counts.lock().unwrap();
                        let n = counts.entry(entry.id.clone()).or_insert(0);
                        *n += 1;
                        *n
                    };
                    if attempts > self.config.max_promotion_retries {
                        // Content is preserved in cold rather than stranded hot.
                        warn!(id = %entry.id, error = %e, "promotion retries exhausted, archiving to cold");
                        self.retry_counts.lock().unwrap().remove(&entry.id);
                        if let Err(e) = self
                            .cold
                            .archive(&ArchiveRecord::from_entry(&entry, "promotion-failed"))
                        {
                            warn!(id = %entry.id, error = %e, "cold archive failed, dropping entry");
                        }
                    } else {
                        warn!(id = %entry.id, attempt = attempts, error = %e, "promotion failed, will retry");
                        retry.push(entry);
                    }
                }
            }
        }

        self.hot.lock().unwrap().requeue(retry);
    }

    fn promote(&self, entry: &mut MemoryEntry) -> Result<()> {
        if entry.embedding.is_none() {
            let embedder = self.embedder.as_ref().ok_or_else(|| {
                StrataError::EmbeddingUnavailable("no embedder configured".into())
            })?;
            entry.embedding = Some(embedder.embed(&entry.content)?);
        }
        entry.tier = Tier::Warm;
        self.warm.store(entry)
    }

    /// Warm → cold: entries past the warm age bound move to the append log.
    fn age_out_warm(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let aged = match self.warm.cleanup(now) {
            Ok(aged) => aged,
            Err(e) => {
                warn!(error = %e, "warm cleanup failed, skipping age-out phase");
                return;
            }
        };
        for entry in aged {
            match self.cold.archive(&ArchiveRecord::from_entry(&entry, "warm-ageout")) {
                Ok(()) => report.aged_to_cold += 1,
                Err(e) => warn!(id = %entry.id, error = %e, "failed to archive aged warm entry"),
            }
        }
    }

    /// Archived-out: decay weight below threshold, inactive past the grace
    /// window, not critical. The cold log keeps the content reachable forever.
    fn archive_decayed(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let entries = match self.warm.all_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "warm scan failed, skipping archive phase");
                return;
            }
        };
        for mut entry in entries {
            self.tracker.decay_reinforcement(&mut entry, now);
            if !self.decay.should_archive(&entry, now) {
                continue;
            }
            match self.warm.remove(&entry.id) {
                Ok(Some(removed)) => {
                    match self
                        .cold
                        .archive(&ArchiveRecord::from_entry(&removed, "decay-archive"))
                    {
                        Ok(()) => report.archived_out += 1,
                        Err(e) => warn!(id = %removed.id, error = %e, "failed to archive decayed entry"),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(id = %entry.id, error = %e, "failed to remove decayed entry"),
            }
        }
    }

    /// Earliest moment any live warm entry can cross the archive threshold —
    /// lets the host schedule the next sweep instead of polling.
    pub fn next_check_after(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let entries = self.warm.all_entries().ok()?;
        entries
            .iter()
            .map(|entry| {
                let due = self
                    .decay
                    .time_to_threshold(self.decay.archive_threshold(), entry.importance);
                let remaining = due - entry.age_days(now);
                chrono::Duration::seconds((remaining.max(0.0) * 86_400.0) as i64)
            })
            .min()
    }

    /// Spawn the periodic background sweep. Foreground reads and writes keep
    /// working while it runs; stores serialize per operation.
    pub fn spawn_periodic(self: &Arc<Self>, clock: SharedClock) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.sweep_interval_hours * 3600);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; the first sweep should wait a period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.run_sweep(clock.now());
            }
        })
    }
}
