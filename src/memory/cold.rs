//! Cold tier — append-only archive with lexical retrieval.
//!
//! One JSONL file per month (`archive-YYYY-MM.jsonl`) is the source of truth;
//! nothing is ever deleted from it. A separate SQLite FTS5 file ranks archived
//! content with BM25 for explicit queries — it is a derived artifact, and any
//! corruption is recovered by replaying the logs ([`ColdArchive::rebuild_index`]).
//! Cold content is never auto-injected; retrieval happens only on explicit search.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, StrataError};
use crate::memory::types::{Importance, MemoryEntry};

const INDEX_FILE: &str = "index.db";

/// One archived line in the append log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: String,
    pub content: String,
    /// Provenance: `session:<id>`, `warm-ageout`, `decay-archive`, …
    pub source: String,
    pub importance: Importance,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn from_entry(entry: &MemoryEntry, source: impl Into<String>) -> Self {
        Self {
            id: entry.id.clone(),
            content: entry.content.clone(),
            source: source.into(),
            importance: entry.importance,
            timestamp: entry.created_at,
        }
    }

    fn bucket(&self) -> String {
        self.timestamp.format("%Y-%m").to_string()
    }
}

/// A lexical search hit.
#[derive(Debug, Clone)]
pub struct ColdHit {
    pub id: String,
    pub content: String,
    pub source: String,
    pub importance: Importance,
    pub timestamp: DateTime<Utc>,
    /// BM25 goodness (FTS5 rank negated — higher is better).
    pub score: f64,
}

pub struct ColdArchive {
    dir: PathBuf,
    conn: Mutex<rusqlite::Connection>,
}

impl ColdArchive {
    /// Open the archive directory, creating it if needed. An unopenable or
    /// inconsistent index is rebuilt from the logs — the logs are never touched.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let index_path = dir.join(INDEX_FILE);

        let conn = match crate::db::open_cold_index(&index_path) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "cold index unreadable, rebuilding from logs");
                let _ = std::fs::remove_file(&index_path);
                crate::db::open_cold_index(&index_path)?
            }
        };

        let archive = Self {
            dir,
            conn: Mutex::new(conn),
        };
        if archive.index_len()? != archive.log_len()? {
            warn!("cold index out of sync with append log, rebuilding");
            archive.rebuild_index()?;
        }
        Ok(archive)
    }

    /// Append a record to its month bucket and index it. O(1) append plus the
    /// FTS insert.
    pub fn archive(&self, record: &ArchiveRecord) -> Result<()> {
        let bucket = record.bucket();
        let path = self.dir.join(format!("archive-{bucket}.jsonl"));

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        self.index_record(record, &bucket)?;
        Ok(())
    }

    /// Lexical BM25 search over the whole archive, optionally windowed to the
    /// last `months_back` months. No semantic matching here — explicit retrieval
    /// only.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        months_back: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ColdHit>> {
        let escaped = escape_fts_query(query);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }

        // RFC 3339 UTC strings compare lexicographically.
        let cutoff = months_back
            .map(|m| (now - chrono::Duration::days(30 * m as i64)).to_rfc3339())
            .unwrap_or_default();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, content, source, importance, timestamp, rank FROM archive_fts \
             WHERE archive_fts MATCH ?1 AND timestamp >= ?2 ORDER BY rank LIMIT ?3",
        )?;
        let hits = stmt
            .query_map(params![escaped, cutoff, limit as i64], |row| {
                let importance_str: String = row.get(3)?;
                let timestamp: String = row.get(4)?;
                let rank: f64 = row.get(5)?;
                Ok(ColdHit {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    source: row.get(2)?,
                    importance: importance_str.parse().unwrap_or(Importance::Normal),
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                    // FTS5 rank is negative (more negative = better match).
                    score: -rank,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Drop the index contents and replay every JSONL bucket. Returns the number
    /// of records re-indexed.
    pub fn rebuild_index(&self) -> Result<usize> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM archive_fts", [])?;
        }

        let mut count = 0usize;
        for path in self.bucket_paths()? {
            let contents = std::fs::read_to_string(&path)?;
            for (lineno, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ArchiveRecord>(line) {
                    Ok(record) => {
                        self.index_record(&record, &record.bucket())?;
                        count += 1;
                    }
                    Err(e) => {
                        // One bad line must not abort the replay.
                        warn!(
                            path = %path.display(),
                            line = lineno + 1,
                            error = %e,
                            "skipping unparseable archive line"
                        );
                    }
                }
            }
        }
        info!(records = count, "cold index rebuilt from append log");
        Ok(count)
    }

    /// Number of records in the lexical index.
    pub fn index_len(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM archive_fts", [], |r| r.get(0))
            .map_err(|e| StrataError::StoreCorruption(format!("cold index unreadable: {e}")))?;
        Ok(count as u64)
    }

    /// Number of non-empty lines across all JSONL buckets.
    pub fn log_len(&self) -> Result<u64> {
        let mut count = 0u64;
        for path in self.bucket_paths()? {
            let contents = std::fs::read_to_string(&path)?;
            count += contents.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        }
        Ok(count)
    }

    /// Number of month buckets on disk.
    pub fn bucket_count(&self) -> Result<usize> {
        Ok(self.bucket_paths()?.len())
    }

    fn bucket_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("archive-") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn index_record(&self, record: &ArchiveRecord, bucket: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO archive_fts (content, id, source, importance, timestamp, bucket) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.content,
                record.id,
                record.source,
                record.importance.as_str(),
                record.timestamp.to_rfc3339(),
                bucket,
            ],
        )?;
        Ok(())
    }
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with spaces
/// so FTS5 treats them as individual terms (implicit AND). Strips empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}
