pub mod schema;

use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

use crate::error::{Result, StrataError};

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the warm-tier database at the given path, with the vec
/// extension loaded and schema initialized for `embedding_dim`-wide vectors.
pub fn open_warm_database(path: impl AsRef<Path>, embedding_dim: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path).map_err(|e| {
        StrataError::StoreCorruption(format!("cannot open warm db at {}: {e}", path.display()))
    })?;

    // WAL mode for concurrent reads under the background sweep
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::init_warm_schema(&conn, embedding_dim)?;

    tracing::info!(path = %path.display(), "warm database initialized");
    Ok(conn)
}

/// Open (or create) the cold archive's lexical index database.
///
/// This file is a derived artifact — callers that find it corrupt should delete
/// it and rebuild from the JSONL append logs.
pub fn open_cold_index(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).map_err(|e| {
        StrataError::StoreCorruption(format!("cannot open cold index at {}: {e}", path.display()))
    })?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::init_cold_index_schema(&conn)?;
    Ok(conn)
}

/// Open an in-memory warm database for testing.
pub fn open_memory_warm_database(embedding_dim: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory()?;
    schema::init_warm_schema(&conn, embedding_dim)?;
    Ok(conn)
}

/// Open an in-memory cold index for testing.
pub fn open_memory_cold_index() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schema::init_cold_index_schema(&conn)?;
    Ok(conn)
}
