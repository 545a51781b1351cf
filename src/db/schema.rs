//! SQL DDL for the warm store and the cold lexical index.
//!
//! The warm store holds `warm_entries` plus a `warm_vec` (vec0) table keyed by the
//! same ids. The cold index is a single standalone FTS5 table — deliberately not
//! content-linked to anything, because the JSONL append log is the source of truth
//! and the index must be droppable and rebuildable from it. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// The schema version that the current crate expects.
pub const SCHEMA_VERSION: u32 = 1;

const WARM_SCHEMA_SQL: &str = r#"
-- Warm-tier entries (embedding lives in warm_vec under the same id)
CREATE TABLE IF NOT EXISTS warm_entries (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    importance TEXT NOT NULL CHECK(importance IN ('critical','high','normal','low')),
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    reinforcement REAL NOT NULL DEFAULT 1.0 CHECK(reinforcement >= 1.0),
    source_session_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_warm_created ON warm_entries(created_at);
CREATE INDEX IF NOT EXISTS idx_warm_importance ON warm_entries(importance);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const COLD_INDEX_SQL: &str = r#"
-- Lexical index over archived content (BM25 via FTS5 rank).
-- Derived artifact: rebuildable by replaying the JSONL buckets.
CREATE VIRTUAL TABLE IF NOT EXISTS archive_fts USING fts5(
    content,
    id UNINDEXED,
    source UNINDEXED,
    importance UNINDEXED,
    timestamp UNINDEXED,
    bucket UNINDEXED
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize the warm store schema. Idempotent (uses IF NOT EXISTS).
///
/// The vec0 table is created separately because its dimension is configurable.
pub fn init_warm_schema(conn: &Connection, embedding_dim: usize) -> rusqlite::Result<()> {
    conn.execute_batch(WARM_SCHEMA_SQL)?;
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS warm_vec USING vec0(\n\
         id TEXT PRIMARY KEY,\n\
         embedding FLOAT[{embedding_dim}]\n\
         );"
    ))?;
    set_initial_version(conn)
}

/// Initialize the cold lexical index schema. Idempotent.
pub fn init_cold_index_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(COLD_INDEX_SQL)?;
    set_initial_version(conn)
}

fn set_initial_version(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Get the stored schema version.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}
