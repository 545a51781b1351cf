use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, StrataError};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub storage: StorageConfig,
    pub decay: DecayConfig,
    pub reinforcement: ReinforcementConfig,
    pub hot: HotConfig,
    pub warm: WarmConfig,
    pub fusion: FusionConfig,
    pub transition: TransitionConfig,
    pub session: SessionConfig,
    pub disclosure: DisclosureConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    /// One of "exponential", "power_law", "composite".
    pub strategy: String,
    pub half_life_days: f64,
    /// Power-law exponent before importance scaling.
    pub alpha: f64,
    /// Composite strategy: working-memory and long-term half-lives plus blend weight.
    pub composite_short_half_life_days: f64,
    pub composite_long_half_life_days: f64,
    pub composite_short_weight: f64,
    /// Floor weight — no entry ever decays to zero.
    pub min_weight: f64,
    /// Weight below which an inactive, non-critical entry becomes archivable.
    pub archive_threshold: f64,
    /// Days of inactivity required before archival, on top of the weight threshold.
    pub archive_grace_days: f64,
    /// Decay-rate multipliers per importance class (lower = slower decay).
    pub critical_multiplier: f64,
    pub high_multiplier: f64,
    pub normal_multiplier: f64,
    pub low_multiplier: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReinforcementConfig {
    /// Added to the reinforcement score on each access.
    pub boost: f64,
    /// Ceiling for the reinforcement score.
    pub max_reinforcement: f64,
    /// Daily multiplier pulling the score back toward 1.0.
    pub daily_decay: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HotConfig {
    pub capacity: usize,
    pub max_age_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WarmConfig {
    pub max_age_days: i64,
    pub embedding_dim: usize,
    /// Cosine similarity floor for semantic matches.
    pub similarity_threshold: f64,
    pub similarity_weight: f64,
    pub importance_weight: f64,
    /// Minimum word count for the search-trigger heuristic.
    pub trigger_min_words: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FusionConfig {
    /// One of "weighted_sum", "rrf", "convex", "max".
    pub strategy: String,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub rrf_k: usize,
    /// Floor on the final boosted score.
    pub combined_threshold: f64,
    /// Weights for the final blend: fused base + recency + importance + access.
    pub base_weight: f64,
    pub recency_weight: f64,
    pub importance_weight: f64,
    pub access_weight: f64,
    pub recency_half_life_days: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransitionConfig {
    pub sweep_interval_hours: u64,
    /// Cap on how many times a failed hot→warm promotion is retried.
    pub max_promotion_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_minutes: i64,
    pub max_duration_hours: i64,
    /// Rolling event log length per session.
    pub event_log_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisclosureConfig {
    pub minimal: LevelConfig,
    pub standard: LevelConfig,
    pub detailed: LevelConfig,
    pub comprehensive: LevelConfig,
    /// Soft assembly deadline — warm/cold phases are skipped past this.
    pub time_budget_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LevelConfig {
    pub hot_items: usize,
    pub warm_items: usize,
    pub cold_search: bool,
    pub max_tokens: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = default_strata_dir().to_string_lossy().into_owned();
        Self { data_dir }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            strategy: "exponential".into(),
            half_life_days: 7.0,
            alpha: 1.0,
            composite_short_half_life_days: 1.0,
            composite_long_half_life_days: 30.0,
            composite_short_weight: 0.7,
            min_weight: 0.01,
            archive_threshold: 0.05,
            archive_grace_days: 30.0,
            critical_multiplier: 0.1,
            high_multiplier: 0.5,
            normal_multiplier: 1.0,
            low_multiplier: 2.0,
        }
    }
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            boost: 0.2,
            max_reinforcement: 2.0,
            daily_decay: 0.95,
        }
    }
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            max_age_hours: 24,
        }
    }
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            embedding_dim: 384,
            similarity_threshold: 0.4,
            similarity_weight: 0.7,
            importance_weight: 0.3,
            trigger_min_words: 8,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: "weighted_sum".into(),
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            rrf_k: 60,
            combined_threshold: 0.4,
            base_weight: 0.3,
            recency_weight: 0.3,
            importance_weight: 0.25,
            access_weight: 0.15,
            recency_half_life_days: 30.0,
        }
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_hours: 24,
            max_promotion_retries: 3,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            max_duration_hours: 8,
            event_log_size: 50,
        }
    }
}

impl Default for DisclosureConfig {
    fn default() -> Self {
        Self {
            minimal: LevelConfig {
                hot_items: 2,
                warm_items: 0,
                cold_search: false,
                max_tokens: 500,
            },
            standard: LevelConfig {
                hot_items: 3,
                warm_items: 3,
                cold_search: false,
                max_tokens: 1500,
            },
            detailed: LevelConfig {
                hot_items: 5,
                warm_items: 5,
                cold_search: false,
                max_tokens: 3000,
            },
            comprehensive: LevelConfig {
                hot_items: 5,
                warm_items: 8,
                cold_search: true,
                max_tokens: 6000,
            },
            time_budget_ms: 200,
        }
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            hot_items: 3,
            warm_items: 3,
            cold_search: false,
            max_tokens: 1500,
        }
    }
}

/// Returns `~/.strata/`
pub fn default_strata_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".strata")
}

/// Returns the default config file path: `~/.strata/config.toml`
pub fn default_config_path() -> PathBuf {
    default_strata_dir().join("config.toml")
}

impl StrataConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| StrataError::InvalidConfiguration(format!("config TOML: {e}")))?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StrataConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (STRATA_DATA_DIR, STRATA_DECAY_STRATEGY,
    /// STRATA_FUSION_STRATEGY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STRATA_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("STRATA_DECAY_STRATEGY") {
            self.decay.strategy = val;
        }
        if let Ok(val) = std::env::var("STRATA_FUSION_STRATEGY") {
            self.fusion.strategy = val;
        }
    }

    /// Reject configurations that would make the math meaningless.
    ///
    /// This is the only place configuration errors are fatal — past construction,
    /// every knob is assumed sane.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f64) -> Result<()> {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(StrataError::InvalidConfiguration(format!(
                    "{name} must be positive, got {v}"
                )))
            }
        }
        fn unit(name: &str, v: f64) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(StrataError::InvalidConfiguration(format!(
                    "{name} must be in [0, 1], got {v}"
                )))
            }
        }

        positive("decay.half_life_days", self.decay.half_life_days)?;
        positive("decay.alpha", self.decay.alpha)?;
        positive(
            "decay.composite_short_half_life_days",
            self.decay.composite_short_half_life_days,
        )?;
        positive(
            "decay.composite_long_half_life_days",
            self.decay.composite_long_half_life_days,
        )?;
        unit(
            "decay.composite_short_weight",
            self.decay.composite_short_weight,
        )?;
        unit("decay.min_weight", self.decay.min_weight)?;
        unit("decay.archive_threshold", self.decay.archive_threshold)?;
        for (name, v) in [
            ("decay.critical_multiplier", self.decay.critical_multiplier),
            ("decay.high_multiplier", self.decay.high_multiplier),
            ("decay.normal_multiplier", self.decay.normal_multiplier),
            ("decay.low_multiplier", self.decay.low_multiplier),
        ] {
            positive(name, v)?;
        }

        if self.reinforcement.max_reinforcement < 1.0 {
            return Err(StrataError::InvalidConfiguration(format!(
                "reinforcement.max_reinforcement must be >= 1.0, got {}",
                self.reinforcement.max_reinforcement
            )));
        }
        if self.reinforcement.boost < 0.0 {
            return Err(StrataError::InvalidConfiguration(
                "reinforcement.boost must be non-negative".into(),
            ));
        }
        positive("reinforcement.daily_decay", self.reinforcement.daily_decay)?;

        if self.hot.capacity == 0 {
            return Err(StrataError::InvalidConfiguration(
                "hot.capacity must be at least 1".into(),
            ));
        }
        if self.warm.embedding_dim == 0 {
            return Err(StrataError::InvalidConfiguration(
                "warm.embedding_dim must be at least 1".into(),
            ));
        }
        unit("warm.similarity_threshold", self.warm.similarity_threshold)?;
        unit("fusion.combined_threshold", self.fusion.combined_threshold)?;
        if self.fusion.semantic_weight + self.fusion.keyword_weight <= 0.0 {
            return Err(StrataError::InvalidConfiguration(
                "fusion semantic/keyword weights must not both be zero".into(),
            ));
        }
        positive(
            "fusion.recency_half_life_days",
            self.fusion.recency_half_life_days,
        )?;

        if self.session.idle_timeout_minutes <= 0 || self.session.max_duration_hours <= 0 {
            return Err(StrataError::InvalidConfiguration(
                "session timeouts must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Path of the hot-cache JSON file.
    pub fn hot_path(&self) -> PathBuf {
        self.resolved_data_dir().join("hot.json")
    }

    /// Path of the warm store database.
    pub fn warm_db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("warm.db")
    }

    /// Directory holding cold archive JSONL buckets and the lexical index.
    pub fn cold_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("cold")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
