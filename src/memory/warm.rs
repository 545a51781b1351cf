//! Warm tier — embedding-indexed, age-bounded semantic store.
//!
//! Entries arrive here from the hot tier once embedded (the embedder runs before
//! [`WarmStore::store`] is called). Retrieval is gated by [`WarmStore::should_trigger`]
//! so simple turns skip the semantic scan entirely, and entries age out after a
//! configurable window — [`WarmStore::cleanup`] removes them and hands them back for
//! cold archival.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::config::WarmConfig;
use crate::error::{Result, StrataError};
use crate::memory::reinforcement::ReinforcementTracker;
use crate::memory::types::{Importance, MemoryEntry, Tier};
use crate::memory::{embedding_to_bytes, l2_distance_to_cosine};

/// KNN candidate over-fetch factor, compensating for age/threshold filtering.
const CANDIDATE_MULTIPLIER: usize = 4;

/// Query substrings that signal the user is reaching back in time.
const TEMPORAL_KEYWORDS: &[&str] = &[
    "yesterday",
    "earlier",
    "last time",
    "last week",
    "this morning",
    "previously",
    "before",
    "ago",
    "remember",
];

/// A warm search hit.
#[derive(Debug, Clone)]
pub struct WarmMatch {
    pub entry: MemoryEntry,
    /// Raw cosine similarity against the query embedding.
    pub similarity: f64,
    /// Blended score: similarity and importance weight.
    pub score: f64,
}

pub struct WarmStore {
    conn: Mutex<Connection>,
    config: WarmConfig,
}

impl WarmStore {
    pub fn open(path: impl AsRef<Path>, config: &WarmConfig) -> Result<Self> {
        let conn = crate::db::open_warm_database(path, config.embedding_dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
        })
    }

    pub fn in_memory(config: &WarmConfig) -> Result<Self> {
        let conn = crate::db::open_memory_warm_database(config.embedding_dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
        })
    }

    /// Persist an entry and its embedding inside one transaction.
    ///
    /// The embedding must already be present — computing it is the caller's job,
    /// so a failed embedder never blocks inside the store.
    pub fn store(&self, entry: &MemoryEntry) -> Result<()> {
        let embedding = entry.embedding.as_deref().ok_or_else(|| {
            StrataError::EmbeddingUnavailable(format!("entry {} has no embedding", entry.id))
        })?;
        if embedding.len() != self.config.embedding_dim {
            return Err(StrataError::EmbeddingUnavailable(format!(
                "entry {} embedding has {} dims, store expects {}",
                entry.id,
                embedding.len(),
                self.config.embedding_dim
            )));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO warm_entries \
             (id, content, importance, created_at, last_accessed_at, access_count, reinforcement, source_session_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.content,
                entry.importance.as_str(),
                entry.created_at.to_rfc3339(),
                entry.last_accessed_at.to_rfc3339(),
                entry.access_count,
                entry.reinforcement,
                entry.source_session_id,
            ],
        )?;
        tx.execute("DELETE FROM warm_vec WHERE id = ?1", params![entry.id])?;
        tx.execute(
            "INSERT INTO warm_vec (id, embedding) VALUES (?1, ?2)",
            params![entry.id, embedding_to_bytes(embedding)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Semantic search within the age bound.
    ///
    /// KNN scan over the vector table, cosine recovered from L2 distance
    /// (embeddings are normalized), filtered below the similarity threshold, then
    /// blended with the importance weight. Ties break toward the smaller id so
    /// rankings are reproducible across runs.
    pub fn search(
        &self,
        query_embedding: &[f32],
        max_age_days: i64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<WarmMatch>> {
        let cutoff = now - chrono::Duration::days(max_age_days);
        let candidate_limit = (limit.max(1) * CANDIDATE_MULTIPLIER) as i64;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, distance FROM warm_vec \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let neighbors: Vec<(String, f64)> = stmt
            .query_map(
                params![embedding_to_bytes(query_embedding), candidate_limit],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut matches = Vec::new();
        for (id, distance) in neighbors {
            let similarity = l2_distance_to_cosine(distance);
            if similarity < self.config.similarity_threshold {
                // Neighbors arrive nearest-first; everything past here is worse.
                break;
            }
            let Some(entry) = fetch_entry(&conn, &id)? else {
                continue;
            };
            if entry.created_at < cutoff {
                continue;
            }
            let score = similarity * self.config.similarity_weight
                + entry.importance.retrieval_weight() * self.config.importance_weight;
            matches.push(WarmMatch {
                entry,
                similarity,
                score,
            });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Heuristic gate for semantic retrieval.
    ///
    /// Unconditional warm search on every turn wastes latency and risks injecting
    /// irrelevant context, so only queries that look like genuine questions,
    /// long-form requests, temporal references, or file references trigger it.
    pub fn should_trigger(&self, query: &str) -> bool {
        if query.contains('?') {
            return true;
        }
        if query.split_whitespace().count() >= self.config.trigger_min_words {
            return true;
        }
        let lower = query.to_lowercase();
        if TEMPORAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return true;
        }
        query.split_whitespace().any(looks_like_file)
    }

    /// Fetch a single entry by id.
    pub fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        fetch_entry(&conn, id)
    }

    /// All live warm entries, oldest first. The set is bounded by the age window,
    /// so a full scan per sweep stays cheap.
    pub fn all_entries(&self) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, content, importance, created_at, last_accessed_at, access_count, reinforcement, source_session_id \
             FROM warm_entries ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record accesses for returned results: lazy reinforcement decay, then the
    /// capped boost, one atomic UPDATE per entry.
    pub fn record_access(
        &self,
        ids: &[&str],
        tracker: &ReinforcementTracker,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for id in ids {
            let Some(mut entry) = fetch_entry(&conn, id)? else {
                continue;
            };
            tracker.on_access(&mut entry, now);
            conn.execute(
                "UPDATE warm_entries SET access_count = ?1, reinforcement = ?2, last_accessed_at = ?3 \
                 WHERE id = ?4",
                params![
                    entry.access_count,
                    entry.reinforcement,
                    entry.last_accessed_at.to_rfc3339(),
                    id
                ],
            )?;
        }
        Ok(())
    }

    /// Remove entries older than the configured age bound and return them —
    /// the warm→cold hand-off.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<Vec<MemoryEntry>> {
        let cutoff = (now - chrono::Duration::days(self.config.max_age_days)).to_rfc3339();

        let mut conn = self.conn.lock().unwrap();
        let aged: Vec<MemoryEntry> = {
            let mut stmt = conn.prepare(
                "SELECT id, content, importance, created_at, last_accessed_at, access_count, reinforcement, source_session_id \
                 FROM warm_entries WHERE created_at < ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![cutoff], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        if !aged.is_empty() {
            let tx = conn.transaction()?;
            for entry in &aged {
                tx.execute("DELETE FROM warm_entries WHERE id = ?1", params![entry.id])?;
                tx.execute("DELETE FROM warm_vec WHERE id = ?1", params![entry.id])?;
            }
            tx.commit()?;
        }
        Ok(aged)
    }

    /// Remove a single entry (the decay-driven archive-out path). Returns the
    /// removed entry, or `None` if it was already gone.
    pub fn remove(&self, id: &str) -> Result<Option<MemoryEntry>> {
        let mut conn = self.conn.lock().unwrap();
        let entry = fetch_entry(&conn, id)?;
        if entry.is_some() {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM warm_entries WHERE id = ?1", params![id])?;
            tx.execute("DELETE FROM warm_vec WHERE id = ?1", params![id])?;
            tx.commit()?;
        }
        Ok(entry)
    }

    /// Explicit reclassification — the only way importance changes after creation.
    pub fn set_importance(&self, id: &str, importance: Importance) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE warm_entries SET importance = ?1 WHERE id = ?2",
            params![importance.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn len(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM warm_entries", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A token looks like a file reference: has a path separator or a short
/// alphanumeric extension.
fn looks_like_file(token: &str) -> bool {
    if token.contains('/') || token.contains('\\') {
        return true;
    }
    match token.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn fetch_entry(conn: &Connection, id: &str) -> Result<Option<MemoryEntry>> {
    let entry = conn
        .query_row(
            "SELECT id, content, importance, created_at, last_accessed_at, access_count, reinforcement, source_session_id \
             FROM warm_entries WHERE id = ?1",
            params![id],
            row_to_entry,
        )
        .optional()?;
    Ok(entry)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let importance_str: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let last_accessed_at: String = row.get(4)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        content: row.get(1)?,
        embedding: None,
        importance: importance_str.parse().unwrap_or(Importance::Normal),
        tier: Tier::Warm,
        created_at: parse_ts(&created_at),
        last_accessed_at: parse_ts(&last_accessed_at),
        access_count: row.get(5)?,
        reinforcement: row.get(6)?,
        source_session_id: row.get(7)?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}
