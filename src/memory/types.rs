//! Core memory type definitions.
//!
//! Defines [`Importance`] (retrieval/decay weighting classes), [`Tier`] (the storage
//! ladder), and [`MemoryEntry`] (a full record as it moves between tiers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance classes, assigned at creation and immutable except via explicit
/// reclassification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Never auto-archived, slowest decay.
    Critical,
    /// Decays at half the normal rate; eagerly indexed into the warm tier.
    High,
    Normal,
    /// Decays at twice the normal rate.
    Low,
}

impl Importance {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    /// Blending weight used in retrieval scoring.
    pub fn retrieval_weight(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.8,
            Self::Normal => 0.5,
            Self::Low => 0.3,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(format!("unknown importance: {s}")),
        }
    }
}

/// Storage tier. Transitions are forward-only (hot → warm → cold → archived);
/// the one exception is session resume, which re-admits a *copy* of a cold entry
/// into the hot ring without touching the archived original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
    /// Removed from all fast-path indices; reachable only through the cold log.
    Archived,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
            Self::Archived => "archived",
        }
    }

    /// `true` if `next` is a legal forward transition from `self`.
    pub fn can_advance_to(&self, next: Tier) -> bool {
        matches!(
            (self, next),
            (Self::Hot, Tier::Warm) | (Self::Warm, Tier::Cold) | (Self::Cold, Tier::Archived)
        )
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown tier: {s}")),
        }
    }
}

/// A memory record as it moves between tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// UUID v7 (time-sortable) — the smaller-id tie-break is therefore
    /// oldest-first and stable across runs.
    pub id: String,
    /// Text payload: an interaction summary or full exchange.
    pub content: String,
    /// Present once the entry has been indexed into the warm tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub importance: Importance,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u32,
    /// Always >= 1.0; bumped on access, decays back toward 1.0.
    pub reinforcement: f64,
    /// Back-reference to the originating session (lookup only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
}

impl MemoryEntry {
    /// Create a fresh hot-tier entry at `now`.
    pub fn new(content: impl Into<String>, importance: Importance, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.into(),
            embedding: None,
            importance,
            tier: Tier::Hot,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            reinforcement: 1.0,
            source_session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.source_session_id = Some(session_id.into());
        self
    }

    /// Age in fractional days at `now`. Clamped at zero for clock skew.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.created_at).num_seconds() as f64 / 86_400.0).max(0.0)
    }

    /// Days since the last access at `now`. Clamped at zero.
    pub fn idle_days(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0)
    }
}
