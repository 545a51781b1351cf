//! Access-driven reinforcement.
//!
//! Every recall bumps an entry's reinforcement score; the score itself decays back
//! toward 1.0 so heavily-accessed-then-abandoned entries still fade. The cap plus
//! independent decay bounds the runaway-popularity failure mode. Reinforcement decay
//! is applied lazily at read time — there is no background timer.

use chrono::{DateTime, Utc};

use crate::config::ReinforcementConfig;
use crate::memory::decay::DecayEngine;
use crate::memory::types::MemoryEntry;

pub struct ReinforcementTracker {
    config: ReinforcementConfig,
}

impl ReinforcementTracker {
    pub fn new(config: &ReinforcementConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Record an access: bump the count, raise reinforcement (capped), refresh
    /// `last_accessed_at`.
    ///
    /// Applies the lazy reinforcement decay first so a bump on a long-idle entry
    /// does not stack onto a stale score.
    pub fn on_access(&self, entry: &mut MemoryEntry, now: DateTime<Utc>) {
        self.decay_reinforcement(entry, now);
        entry.access_count = entry.access_count.saturating_add(1);
        entry.reinforcement =
            (entry.reinforcement + self.config.boost).min(self.config.max_reinforcement);
        entry.last_accessed_at = now;
    }

    /// Pull the reinforcement score toward 1.0 by `daily_decay^idle_days`.
    ///
    /// Idempotent at zero elapsed time: calling twice in immediate succession
    /// changes nothing, because the decayed span is anchored on `last_accessed_at`.
    pub fn decay_reinforcement(&self, entry: &mut MemoryEntry, now: DateTime<Utc>) {
        let idle = entry.idle_days(now);
        if idle <= 0.0 {
            return;
        }
        let factor = self.config.daily_decay.powf(idle);
        entry.reinforcement = 1.0 + (entry.reinforcement - 1.0) * factor;
    }

    /// Read-time relevance: content decay × reinforcement, clamped by the engine.
    pub fn effective_weight(
        &self,
        entry: &mut MemoryEntry,
        engine: &DecayEngine,
        now: DateTime<Utc>,
    ) -> f64 {
        self.decay_reinforcement(entry, now);
        engine.weight(entry.age_days(now), entry.importance, entry.reinforcement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecayConfig, ReinforcementConfig};
    use crate::memory::types::Importance;
    use chrono::TimeZone;

    fn tracker() -> ReinforcementTracker {
        ReinforcementTracker::new(&ReinforcementConfig::default())
    }

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day)
    }

    #[test]
    fn access_bumps_count_score_and_timestamp() {
        let tracker = tracker();
        let mut entry = MemoryEntry::new("note", Importance::Normal, at(0));

        tracker.on_access(&mut entry, at(1));

        assert_eq!(entry.access_count, 1);
        assert!((entry.reinforcement - 1.2).abs() < 1e-9);
        assert_eq!(entry.last_accessed_at, at(1));
    }

    #[test]
    fn reinforcement_caps_at_max() {
        let tracker = tracker();
        let mut entry = MemoryEntry::new("popular", Importance::Normal, at(0));

        for _ in 0..20 {
            tracker.on_access(&mut entry, at(0));
        }

        assert_eq!(entry.access_count, 20);
        assert!(entry.reinforcement <= 2.0);
        assert!((entry.reinforcement - 2.0).abs() < 1e-9);
    }

    #[test]
    fn decay_moves_score_toward_one() {
        let tracker = tracker();
        let mut entry = MemoryEntry::new("fading", Importance::Normal, at(0));
        tracker.on_access(&mut entry, at(0));
        tracker.on_access(&mut entry, at(0));
        let boosted = entry.reinforcement;

        entry.last_accessed_at = at(0);
        let mut later = entry.clone();
        tracker.decay_reinforcement(&mut later, at(10));

        assert!(later.reinforcement < boosted);
        assert!(later.reinforcement >= 1.0);
        // 1 + (r-1)·0.95^10
        let expected = 1.0 + (boosted - 1.0) * 0.95_f64.powf(10.0);
        assert!((later.reinforcement - expected).abs() < 1e-9);
    }

    #[test]
    fn decay_is_idempotent_at_zero_elapsed() {
        let tracker = tracker();
        let mut entry = MemoryEntry::new("stable", Importance::Normal, at(0));
        tracker.on_access(&mut entry, at(0));

        let before = entry.reinforcement;
        tracker.decay_reinforcement(&mut entry, at(0));
        tracker.decay_reinforcement(&mut entry, at(0));
        assert_eq!(entry.reinforcement, before);
    }

    #[test]
    fn reinforcement_never_drops_below_one() {
        let tracker = tracker();
        let mut entry = MemoryEntry::new("ancient", Importance::Normal, at(0));
        tracker.on_access(&mut entry, at(0));
        entry.last_accessed_at = at(0);

        tracker.decay_reinforcement(&mut entry, at(3650));
        assert!(entry.reinforcement >= 1.0);
    }

    #[test]
    fn effective_weight_reflects_both_decays() {
        let tracker = tracker();
        let engine = DecayEngine::new(&DecayConfig::default()).unwrap();

        let mut touched = MemoryEntry::new("touched", Importance::Normal, at(0));
        tracker.on_access(&mut touched, at(6));
        let mut untouched = MemoryEntry::new("untouched", Importance::Normal, at(0));

        let w_touched = tracker.effective_weight(&mut touched, &engine, at(7));
        let w_untouched = tracker.effective_weight(&mut untouched, &engine, at(7));
        assert!(w_touched > w_untouched);
    }
}
