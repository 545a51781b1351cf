//! Hybrid retrieval — semantic and lexical legs fused into one ranking.
//!
//! The warm (embedding) and cold (BM25) searches run independently; neither leg
//! orders or gates the other. Ranked lists are fused by a config-selected
//! strategy, then recency/importance/access boosts are blended in. An item found
//! by only one leg keeps a zero score for the missing leg — both lists are
//! partial evidence, never mutual exclusion. A missing query embedding (embedder
//! down) degrades to lexical-only instead of failing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

use crate::config::FusionConfig;
use crate::error::{Result, StrataError};
use crate::memory::cold::ColdArchive;
use crate::memory::types::Importance;
use crate::memory::warm::WarmStore;

/// Access counts at or above this saturate the access boost.
const ACCESS_SATURATION: f64 = 100.0;

/// Score-fusion strategy, selected by configuration at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStrategy {
    /// Min-max normalize each list, combine with fixed semantic/keyword weights.
    WeightedSum,
    /// Reciprocal Rank Fusion — robust when absolute scores are not comparable.
    ReciprocalRank,
    /// Reweight semantic vs keyword by each leg's mean result quality per query.
    Convex,
    /// Take the higher of the two normalized scores per item.
    Max,
}

impl std::str::FromStr for FusionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "weighted_sum" => Ok(Self::WeightedSum),
            "rrf" => Ok(Self::ReciprocalRank),
            "convex" => Ok(Self::Convex),
            "max" => Ok(Self::Max),
            _ => Err(format!("unknown fusion strategy: {s}")),
        }
    }
}

/// Which store produced a result (warm wins when both did).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Warm,
    Cold,
}

/// A fused, boosted search result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub origin: Origin,
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub access_count: u32,
    pub score: f64,
}

/// Per-candidate evidence accumulated from both legs.
struct Candidate {
    id: String,
    content: String,
    origin: Origin,
    importance: Importance,
    created_at: DateTime<Utc>,
    access_count: u32,
    semantic: Option<(usize, f64)>,
    keyword: Option<(usize, f64)>,
}

#[derive(Debug)]
pub struct HybridSearcher {
    strategy: FusionStrategy,
    config: FusionConfig,
}

impl HybridSearcher {
    pub fn new(config: &FusionConfig) -> Result<Self> {
        let strategy: FusionStrategy = config
            .strategy
            .parse()
            .map_err(StrataError::InvalidConfiguration)?;
        Ok(Self {
            strategy,
            config: config.clone(),
        })
    }

    pub fn strategy(&self) -> FusionStrategy {
        self.strategy
    }

    /// Run both legs and fuse.
    ///
    /// A failing leg is logged and treated as empty — per-leg failures degrade
    /// the ranking, they never abort the search.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        warm: &WarmStore,
        cold: &ColdArchive,
        query: &str,
        query_embedding: Option<&[f32]>,
        warm_max_age_days: i64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<SearchResult>> {
        let leg_limit = limit.max(1) * 2;

        let semantic_hits = match query_embedding {
            Some(embedding) => match warm.search(embedding, warm_max_age_days, leg_limit, now) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "semantic leg failed, continuing lexical-only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let keyword_hits = match cold.search(query, leg_limit, None, now) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "lexical leg failed, continuing semantic-only");
                Vec::new()
            }
        };

        // Min-max normalize each leg before fusion.
        let sem_norm = normalize(semantic_hits.iter().map(|m| m.score).collect());
        let kw_norm = normalize(keyword_hits.iter().map(|h| h.score).collect());

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for (rank, hit) in semantic_hits.iter().enumerate() {
            candidates.insert(
                hit.entry.id.clone(),
                Candidate {
                    id: hit.entry.id.clone(),
                    content: hit.entry.content.clone(),
                    origin: Origin::Warm,
                    importance: hit.entry.importance,
                    created_at: hit.entry.created_at,
                    access_count: hit.entry.access_count,
                    semantic: Some((rank, sem_norm[rank])),
                    keyword: None,
                },
            );
        }
        for (rank, hit) in keyword_hits.iter().enumerate() {
            candidates
                .entry(hit.id.clone())
                .and_modify(|c| c.keyword = Some((rank, kw_norm[rank])))
                .or_insert_with(|| Candidate {
                    id: hit.id.clone(),
                    content: hit.content.clone(),
                    origin: Origin::Cold,
                    importance: hit.importance,
                    created_at: hit.timestamp,
                    access_count: 0,
                    semantic: None,
                    keyword: Some((rank, kw_norm[rank])),
                });
        }

        let mean_sem = mean(sem_norm);
        let mean_kw = mean(kw_norm);

        let mut results: Vec<SearchResult> = candidates
            .into_values()
            .map(|c| {
                let fused = self.fuse(&c, mean_sem, mean_kw);
                let score = self.boost(fused, &c, now);
                SearchResult {
                    id: c.id,
                    content: c.content,
                    origin: c.origin,
                    importance: c.importance,
                    created_at: c.created_at,
                    access_count: c.access_count,
                    score,
                }
            })
            .filter(|r| r.score >= self.config.combined_threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Apply the configured fusion strategy to one candidate. A leg the item is
    /// missing from contributes 0.
    fn fuse(&self, c: &Candidate, mean_sem: f64, mean_kw: f64) -> f64 {
        let sem = c.semantic.map(|(_, s)| s).unwrap_or(0.0);
        let kw = c.keyword.map(|(_, s)| s).unwrap_or(0.0);
        match self.strategy {
            FusionStrategy::WeightedSum => {
                self.config.semantic_weight * sem + self.config.keyword_weight * kw
            }
            FusionStrategy::ReciprocalRank => {
                let k = self.config.rrf_k as f64;
                let mut score = 0.0;
                if let Some((rank, _)) = c.semantic {
                    score += self.config.semantic_weight / (k + rank as f64);
                }
                if let Some((rank, _)) = c.keyword {
                    score += self.config.keyword_weight / (k + rank as f64);
                }
                // Scale so a rank-0 hit in both legs fuses to 1.0.
                let max = (self.config.semantic_weight + self.config.keyword_weight) / k;
                score / max
            }
            FusionStrategy::Convex => {
                let denom = mean_sem + mean_kw;
                let (w_sem, w_kw) = if denom > 0.0 {
                    (mean_sem / denom, mean_kw / denom)
                } else {
                    (self.config.semantic_weight, self.config.keyword_weight)
                };
                w_sem * sem + w_kw * kw
            }
            FusionStrategy::Max => sem.max(kw),
        }
    }

    /// Blend the fused base with recency, importance, and access boosts.
    fn boost(&self, fused: f64, c: &Candidate, now: DateTime<Utc>) -> f64 {
        let age_days = ((now - c.created_at).num_seconds() as f64 / 86_400.0).max(0.0);
        let recency =
            (-std::f64::consts::LN_2 * age_days / self.config.recency_half_life_days).exp();
        let access =
            ((1.0 + c.access_count as f64).ln() / (1.0 + ACCESS_SATURATION).ln()).min(1.0);

        self.config.base_weight * fused
            + self.config.recency_weight * recency
            + self.config.importance_weight * c.importance.retrieval_weight()
            + self.config.access_weight * access
    }
}

/// Min-max normalize to [0, 1]. Uniform lists normalize to all-1.0 (every item
/// is equally the best evidence its leg produced).
fn normalize(scores: Vec<f64>) -> Vec<f64> {
    if scores.is_empty() {
        return scores;
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.into_iter().map(|s| (s - min) / (max - min)).collect()
}

fn mean(values: Vec<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarmConfig;
    use crate::memory::cold::ArchiveRecord;
    use crate::memory::types::MemoryEntry;
    use chrono::TimeZone;

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day)
    }

    fn spike(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[seed % 384] = 1.0;
        v
    }

    fn warm_entry(content: &str, seed: usize, now: DateTime<Utc>) -> MemoryEntry {
        let mut entry = MemoryEntry::new(content, Importance::Normal, now);
        entry.embedding = Some(spike(seed));
        entry
    }

    fn searcher(strategy: &str) -> HybridSearcher {
        let config = FusionConfig {
            strategy: strategy.into(),
            ..FusionConfig::default()
        };
        HybridSearcher::new(&config).unwrap()
    }

    fn stores() -> (WarmStore, ColdArchive, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let warm = WarmStore::in_memory(&WarmConfig::default()).unwrap();
        let cold = ColdArchive::open(dir.path()).unwrap();
        (warm, cold, dir)
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let config = FusionConfig {
            strategy: "plurality".into(),
            ..FusionConfig::default()
        };
        assert!(matches!(
            HybridSearcher::new(&config).unwrap_err(),
            StrataError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn merges_results_from_both_legs() {
        let (warm, cold, _dir) = stores();
        warm.store(&warm_entry("retry budget for the ingestion worker", 0, at(0)))
            .unwrap();
        cold.archive(&ArchiveRecord {
            id: uuid::Uuid::now_v7().to_string(),
            content: "ingestion worker crashed on malformed retry header".into(),
            source: "test".into(),
            importance: Importance::Normal,
            timestamp: at(0),
        })
        .unwrap();

        let results = searcher("weighted_sum")
            .search(&warm, &cold, "ingestion retry", Some(&spike(0)), 7, 10, at(1))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.origin == Origin::Warm));
        assert!(results.iter().any(|r| r.origin == Origin::Cold));
    }

    #[test]
    fn missing_embedding_degrades_to_lexical_only() {
        let (warm, cold, _dir) = stores();
        warm.store(&warm_entry("semantic only content", 0, at(0)))
            .unwrap();
        cold.archive(&ArchiveRecord {
            id: uuid::Uuid::now_v7().to_string(),
            content: "lexical fallback content".into(),
            source: "test".into(),
            importance: Importance::Normal,
            timestamp: at(0),
        })
        .unwrap();

        let results = searcher("weighted_sum")
            .search(&warm, &cold, "lexical fallback", None, 7, 10, at(1))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].origin, Origin::Cold);
    }

    #[test]
    fn single_leg_items_are_kept_not_eliminated() {
        let (warm, cold, _dir) = stores();
        warm.store(&warm_entry("only the warm store knows this", 0, at(0)))
            .unwrap();

        for strategy in ["weighted_sum", "rrf", "convex", "max"] {
            let results = searcher(strategy)
                .search(
                    &warm,
                    &cold,
                    "completely unrelated words",
                    Some(&spike(0)),
                    7,
                    10,
                    at(1),
                )
                .unwrap();
            assert_eq!(results.len(), 1, "strategy {strategy} dropped the item");
        }
    }

    #[test]
    fn rrf_favors_items_in_both_lists() {
        let (warm, cold, _dir) = stores();
        let shared_id;
        {
            let entry = warm_entry("deploy checklist for the payments api", 0, at(0));
            shared_id = entry.id.clone();
            warm.store(&entry).unwrap();
            warm.store(&warm_entry("notes on database tuning", 1, at(0)))
                .unwrap();
        }
        cold.archive(&ArchiveRecord {
            id: shared_id.clone(),
            content: "deploy checklist for the payments api".into(),
            source: "test".into(),
            importance: Importance::Normal,
            timestamp: at(0),
        })
        .unwrap();

        let mut query = vec![0.0f32; 384];
        query[0] = 0.8;
        query[1] = 0.6;
        let results = searcher("rrf")
            .search(&warm, &cold, "deploy checklist payments", Some(&query), 7, 10, at(1))
            .unwrap();

        assert_eq!(results[0].id, shared_id);
    }

    #[test]
    fn max_takes_the_stronger_leg() {
        let searcher = searcher("max");
        let candidate = Candidate {
            id: "x".into(),
            content: String::new(),
            origin: Origin::Warm,
            importance: Importance::Normal,
            created_at: at(0),
            access_count: 0,
            semantic: Some((3, 0.2)),
            keyword: Some((0, 0.9)),
        };
        assert!((searcher.fuse(&candidate, 0.5, 0.5) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn convex_leans_toward_the_higher_quality_leg() {
        let searcher = searcher("convex");
        let candidate = Candidate {
            id: "x".into(),
            content: String::new(),
            origin: Origin::Warm,
            importance: Importance::Normal,
            created_at: at(0),
            access_count: 0,
            semantic: Some((0, 1.0)),
            keyword: Some((0, 0.5)),
        };
        // Semantic leg is higher quality on average: its contribution dominates.
        let leaning_sem = searcher.fuse(&candidate, 0.9, 0.1);
        let leaning_kw = searcher.fuse(&candidate, 0.1, 0.9);
        assert!(leaning_sem > leaning_kw);
    }

    #[test]
    fn recency_boost_prefers_newer_items() {
        let (warm, cold, _dir) = stores();
        // Two cold hits with identical lexical evidence, different ages.
        for (content, ts) in [
            ("release notes draft alpha", at(0) - chrono::Duration::days(90)),
            ("release notes draft beta", at(0)),
        ] {
            cold.archive(&ArchiveRecord {
                id: uuid::Uuid::now_v7().to_string(),
                content: content.into(),
                source: "test".into(),
                importance: Importance::Normal,
                timestamp: ts,
            })
            .unwrap();
        }

        let results = searcher("weighted_sum")
            .search(&warm, &cold, "release notes draft", None, 7, 10, at(0))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].content.contains("beta"));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn threshold_filters_weak_results() {
        let (warm, cold, _dir) = stores();
        cold.archive(&ArchiveRecord {
            id: uuid::Uuid::now_v7().to_string(),
            content: "ancient marginal note".into(),
            source: "test".into(),
            importance: Importance::Low,
            timestamp: at(0) - chrono::Duration::days(3000),
        })
        .unwrap();

        let results = searcher("weighted_sum")
            .search(&warm, &cold, "marginal note", None, 7, 10, at(0))
            .unwrap();
        // Low importance + ancient + lexical-only: below the combined threshold.
        assert!(results.is_empty());
    }

    #[test]
    fn normalize_handles_uniform_and_empty() {
        assert!(normalize(vec![]).is_empty());
        assert_eq!(normalize(vec![3.0, 3.0]), vec![1.0, 1.0]);
        let n = normalize(vec![1.0, 2.0, 3.0]);
        assert_eq!(n, vec![0.0, 0.5, 1.0]);
    }
}
