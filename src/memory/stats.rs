use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::memory::cold::ColdArchive;
use crate::memory::hot::HotStore;
use crate::memory::warm::WarmStore;

/// Response from a stats probe, per tier.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub hot_entries: usize,
    pub hot_pending_promotion: usize,
    pub warm_entries: u64,
    pub cold_indexed: u64,
    pub cold_buckets: usize,
    pub warm_db_size_bytes: u64,
}

/// Compute per-tier store statistics.
///
/// `warm_db_path` is used for file size calculation; pass `None` for in-memory
/// databases.
pub fn tier_stats(
    hot: &Arc<Mutex<HotStore>>,
    warm: &WarmStore,
    cold: &ColdArchive,
    warm_db_path: Option<&Path>,
) -> Result<StatsReport> {
    let (hot_entries, hot_pending_promotion) = {
        let hot = hot.lock().unwrap();
        (hot.len(), hot.pending_len())
    };

    let warm_db_size_bytes = warm_db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsReport {
        hot_entries,
        hot_pending_promotion,
        warm_entries: warm.len()?,
        cold_indexed: cold.index_len()?,
        cold_buckets: cold.bucket_count()?,
        warm_db_size_bytes,
    })
}
