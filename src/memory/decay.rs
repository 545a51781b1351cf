//! Time-based relevance decay.
//!
//! Pure functions from (age, importance, reinforcement) to a weight in
//! `[min_weight, 1.0]`. Three interchangeable strategies are selected by
//! configuration at construction — never by runtime type inspection. The engine
//! also answers the inverse question ([`DecayEngine::time_to_threshold`]) so the
//! tier transitioner can schedule its next check instead of polling.

use chrono::{DateTime, Utc};

use crate::config::DecayConfig;
use crate::error::{Result, StrataError};
use crate::memory::types::{Importance, MemoryEntry};

/// Oldest age (days) considered when numerically inverting the composite curve.
const MAX_INVERT_DAYS: f64 = 3650.0;

/// Decay curve selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayStrategy {
    /// `exp(-λ·age)` — half-life semantics, light tail.
    Exponential,
    /// `(1+age)^(-α)` — near-identical short-term decay, materially higher
    /// retention past ~30 days.
    PowerLaw,
    /// Blend of a short-half-life and a long-half-life exponential, modeling
    /// working memory and long-term retention simultaneously.
    Composite,
}

impl std::str::FromStr for DecayStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exponential" => Ok(Self::Exponential),
            "power_law" => Ok(Self::PowerLaw),
            "composite" => Ok(Self::Composite),
            _ => Err(format!("unknown decay strategy: {s}")),
        }
    }
}

#[derive(Debug)]
pub struct DecayEngine {
    strategy: DecayStrategy,
    config: DecayConfig,
}

impl DecayEngine {
    /// Build an engine from validated configuration. An unknown strategy name is
    /// an [`StrataError::InvalidConfiguration`] — fatal at startup only.
    pub fn new(config: &DecayConfig) -> Result<Self> {
        let strategy: DecayStrategy = config
            .strategy
            .parse()
            .map_err(StrataError::InvalidConfiguration)?;
        Ok(Self {
            strategy,
            config: config.clone(),
        })
    }

    pub fn strategy(&self) -> DecayStrategy {
        self.strategy
    }

    pub fn min_weight(&self) -> f64 {
        self.config.min_weight
    }

    pub fn archive_threshold(&self) -> f64 {
        self.config.archive_threshold
    }

    /// Decay-rate multiplier per importance class. Lower multiplies into a
    /// slower rate, so `weight(t, critical) >= weight(t, high) >= weight(t,
    /// normal) >= weight(t, low)` for any fixed `t > 0`.
    fn rate_multiplier(&self, importance: Importance) -> f64 {
        match importance {
            Importance::Critical => self.config.critical_multiplier,
            Importance::High => self.config.high_multiplier,
            Importance::Normal => self.config.normal_multiplier,
            Importance::Low => self.config.low_multiplier,
        }
    }

    /// Content decay weight, before reinforcement.
    fn base_weight(&self, age_days: f64, importance: Importance) -> f64 {
        let age = age_days.max(0.0);
        let mult = self.rate_multiplier(importance);
        let raw = match self.strategy {
            DecayStrategy::Exponential => {
                let lambda = std::f64::consts::LN_2 / self.config.half_life_days * mult;
                (-lambda * age).exp()
            }
            DecayStrategy::PowerLaw => {
                let alpha = self.config.alpha * mult;
                (1.0 + age).powf(-alpha)
            }
            DecayStrategy::Composite => {
                let short =
                    std::f64::consts::LN_2 / self.config.composite_short_half_life_days * mult;
                let long =
                    std::f64::consts::LN_2 / self.config.composite_long_half_life_days * mult;
                let sw = self.config.composite_short_weight;
                sw * (-short * age).exp() + (1.0 - sw) * (-long * age).exp()
            }
        };
        raw.clamp(self.config.min_weight, 1.0)
    }

    /// Effective weight in `[min_weight, 1.0]`.
    ///
    /// Reinforcement (always >= 1.0) multiplies the base weight but the result is
    /// clamped at 1.0 — it slows effective decay, it never suppresses it.
    pub fn weight(&self, age_days: f64, importance: Importance, reinforcement: f64) -> f64 {
        let base = self.base_weight(age_days, importance);
        (base * reinforcement.max(1.0)).clamp(self.config.min_weight, 1.0)
    }

    /// Inverse of the base curve: the age in days at which an unreinforced entry
    /// of the given importance first reaches `threshold`.
    ///
    /// Closed form for exponential and power-law; bisection for composite.
    /// Thresholds at or above 1.0 return 0; thresholds at or below `min_weight`
    /// return [`MAX_INVERT_DAYS`] (the floor is never crossed).
    pub fn time_to_threshold(&self, threshold: f64, importance: Importance) -> f64 {
        if threshold >= 1.0 {
            return 0.0;
        }
        if threshold <= self.config.min_weight {
            return MAX_INVERT_DAYS;
        }
        let mult = self.rate_multiplier(importance);
        match self.strategy {
            DecayStrategy::Exponential => {
                let lambda = std::f64::consts::LN_2 / self.config.half_life_days * mult;
                (-threshold.ln() / lambda).min(MAX_INVERT_DAYS)
            }
            DecayStrategy::PowerLaw => {
                let alpha = self.config.alpha * mult;
                (threshold.powf(-1.0 / alpha) - 1.0).min(MAX_INVERT_DAYS)
            }
            DecayStrategy::Composite => {
                // Monotone decreasing curve, so plain bisection converges.
                let (mut lo, mut hi) = (0.0_f64, MAX_INVERT_DAYS);
                if self.base_weight(hi, importance) > threshold {
                    return MAX_INVERT_DAYS;
                }
                while hi - lo > 1e-4 {
                    let mid = (lo + hi) / 2.0;
                    if self.base_weight(mid, importance) > threshold {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                (lo + hi) / 2.0
            }
        }
    }

    /// Archival predicate: weight below the archive threshold AND inactive past
    /// the grace window AND not critical. Critical entries are never
    /// auto-archived regardless of age.
    pub fn should_archive(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
        if entry.importance == Importance::Critical {
            return false;
        }
        if entry.idle_days(now) < self.config.archive_grace_days {
            return false;
        }
        self.weight(entry.age_days(now), entry.importance, entry.reinforcement)
            < self.config.archive_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const IMPORTANCES: [Importance; 4] = [
        Importance::Critical,
        Importance::High,
        Importance::Normal,
        Importance::Low,
    ];

    fn engine(strategy: &str) -> DecayEngine {
        let config = DecayConfig {
            strategy: strategy.into(),
            ..DecayConfig::default()
        };
        DecayEngine::new(&config).unwrap()
    }

    #[test]
    fn unknown_strategy_is_invalid_configuration() {
        let config = DecayConfig {
            strategy: "linear".into(),
            ..DecayConfig::default()
        };
        let err = DecayEngine::new(&config).unwrap_err();
        assert!(matches!(err, StrataError::InvalidConfiguration(_)));
    }

    #[test]
    fn weight_stays_in_bounds_for_all_strategies() {
        for strategy in ["exponential", "power_law", "composite"] {
            let engine = engine(strategy);
            for importance in IMPORTANCES {
                for age in [0.0, 0.5, 1.0, 7.0, 30.0, 365.0, 3650.0] {
                    for reinforcement in [1.0, 1.5, 2.0] {
                        let w = engine.weight(age, importance, reinforcement);
                        assert!(
                            (engine.min_weight()..=1.0).contains(&w),
                            "{strategy} {importance} age={age} r={reinforcement} -> {w}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn importance_ordering_holds() {
        for strategy in ["exponential", "power_law", "composite"] {
            let engine = engine(strategy);
            for age in [0.5, 3.0, 14.0, 90.0] {
                let w: Vec<f64> = IMPORTANCES
                    .iter()
                    .map(|i| engine.weight(age, *i, 1.0))
                    .collect();
                assert!(
                    w[0] >= w[1] && w[1] >= w[2] && w[2] >= w[3],
                    "{strategy} at age {age}: {w:?}"
                );
            }
        }
    }

    #[test]
    fn fresh_entry_has_full_weight() {
        for strategy in ["exponential", "power_law", "composite"] {
            let engine = engine(strategy);
            assert!((engine.weight(0.0, Importance::Normal, 1.0) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn exponential_halves_at_half_life() {
        let engine = engine("exponential");
        let w = engine.weight(7.0, Importance::Normal, 1.0);
        assert!((w - 0.5).abs() < 1e-9);
    }

    #[test]
    fn power_law_retains_more_than_exponential_long_term() {
        let exp = engine("exponential");
        let pow = engine("power_law");
        // Same normal-importance comparison well past the half-life.
        let age = 90.0;
        assert!(
            pow.weight(age, Importance::Normal, 1.0) > exp.weight(age, Importance::Normal, 1.0)
        );
    }

    #[test]
    fn reinforcement_slows_but_never_exceeds_one() {
        let engine = engine("exponential");
        let plain = engine.weight(7.0, Importance::Normal, 1.0);
        let boosted = engine.weight(7.0, Importance::Normal, 2.0);
        assert!(boosted > plain);
        assert!(boosted <= 1.0);
        // At age 0 the clamp holds.
        assert_eq!(engine.weight(0.0, Importance::Normal, 2.0), 1.0);
    }

    #[test]
    fn time_to_threshold_inverts_the_curve() {
        for strategy in ["exponential", "power_law", "composite"] {
            let engine = engine(strategy);
            for threshold in [0.5, 0.2, 0.05] {
                for importance in [Importance::High, Importance::Normal, Importance::Low] {
                    let t = engine.time_to_threshold(threshold, importance);
                    if t < MAX_INVERT_DAYS {
                        let w = engine.weight(t, importance, 1.0);
                        assert!(
                            (w - threshold).abs() < 1e-3,
                            "{strategy} {importance} θ={threshold}: t={t} w={w}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn time_to_threshold_edge_cases() {
        let engine = engine("exponential");
        assert_eq!(engine.time_to_threshold(1.0, Importance::Normal), 0.0);
        assert_eq!(
            engine.time_to_threshold(0.001, Importance::Normal),
            MAX_INVERT_DAYS
        );
    }

    #[test]
    fn critical_is_never_archived() {
        let engine = engine("exponential");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut entry = MemoryEntry::new("keep forever", Importance::Critical, now);
        entry.created_at = now - chrono::Duration::days(3650);
        entry.last_accessed_at = entry.created_at;
        assert!(!engine.should_archive(&entry, now));
    }

    #[test]
    fn stale_low_weight_entry_is_archived() {
        let engine = engine("exponential");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut entry = MemoryEntry::new("old and forgotten", Importance::Normal, now);
        entry.created_at = now - chrono::Duration::days(120);
        entry.last_accessed_at = entry.created_at;
        assert!(engine.should_archive(&entry, now));
    }

    #[test]
    fn recent_access_defers_archival() {
        let engine = engine("exponential");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut entry = MemoryEntry::new("old but touched", Importance::Normal, now);
        entry.created_at = now - chrono::Duration::days(120);
        // Accessed within the grace window.
        entry.last_accessed_at = now - chrono::Duration::days(5);
        assert!(!engine.should_archive(&entry, now));
    }
}
