#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use strata::clock::ManualClock;
use strata::config::StrataConfig;
use strata::embedding::Embedder;
use strata::error::{Result, StrataError};

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal-ish unit vector.
pub fn spike(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed % 384] = 1.0;
    v
}

/// Deterministic embedder: spikes one dimension chosen from the text bytes.
/// Identical text always embeds identically; unrelated text is orthogonal.
pub struct SpikeEmbedder;

impl Embedder for SpikeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let seed: usize = text.bytes().map(|b| b as usize).sum();
        Ok(spike(seed))
    }
}

/// Embedder that is always down — exercises the lexical-only degrade paths.
pub struct DownEmbedder;

impl Embedder for DownEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(StrataError::EmbeddingUnavailable("embedder offline".into()))
    }
}

/// A config rooted in a fresh temp directory.
pub fn test_config(dir: &std::path::Path) -> StrataConfig {
    let mut config = StrataConfig::default();
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config
}

/// A fixed, readable starting instant for manual clocks.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_at(t0()))
}
