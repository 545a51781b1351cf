//! Hot tier — the most recent interactions, always injected.
//!
//! A fixed-capacity FIFO ring: every committed interaction lands here
//! unconditionally (hot is pure recency, not relevance-filtered), and insertion
//! beyond capacity evicts the oldest entry, never the lowest-scored. Entries that
//! fall out of the ring or exceed the age window move to a pending-promotion
//! buffer that feeds the hot→warm transition; a failed promotion re-queues there,
//! so hot writes are never blocked on the embedder.
//!
//! Persistence is a single small JSON file rewritten on mutation. A missing or
//! corrupt file is acceptable data loss: the store starts empty with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::HotConfig;
use crate::error::Result;
use crate::memory::types::{MemoryEntry, Tier};

#[derive(Debug, Default, Serialize, Deserialize)]
struct HotSnapshot {
    entries: Vec<MemoryEntry>,
    pending: Vec<MemoryEntry>,
}

pub struct HotStore {
    path: Option<PathBuf>,
    capacity: usize,
    max_age: chrono::Duration,
    entries: VecDeque<MemoryEntry>,
    /// Entries that aged or overflowed out of the ring, awaiting warm promotion.
    pending: Vec<MemoryEntry>,
}

impl HotStore {
    /// Open the hot cache backed by a JSON file, loading any previous snapshot.
    pub fn open(path: impl AsRef<Path>, config: &HotConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<HotSnapshot>(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "hot cache unreadable, starting empty");
                HotSnapshot::default()
            }),
            Err(_) => HotSnapshot::default(),
        };

        let mut store = Self {
            path: Some(path),
            capacity: config.capacity,
            max_age: chrono::Duration::hours(config.max_age_hours),
            entries: snapshot.entries.into(),
            pending: snapshot.pending,
        };
        // A capacity shrink between runs still evicts oldest-first.
        while store.entries.len() > store.capacity {
            if let Some(oldest) = store.entries.pop_front() {
                store.pending.push(oldest);
            }
        }
        Ok(store)
    }

    /// An unpersisted store, used in tests and by hosts that opt out of the cache file.
    pub fn in_memory(config: &HotConfig) -> Self {
        Self {
            path: None,
            capacity: config.capacity,
            max_age: chrono::Duration::hours(config.max_age_hours),
            entries: VecDeque::new(),
            pending: Vec::new(),
        }
    }

    /// Append an interaction. O(1) amortized; at capacity the oldest entry is
    /// evicted into the pending-promotion buffer.
    pub fn add(&mut self, entry: MemoryEntry) {
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.pending.push(oldest);
            }
        }
        self.entries.push_back(entry);
        self.persist();
    }

    /// Re-admit a *copy* of a colder entry after session resume. The copy enters
    /// the ring as hot; the archived original is untouched.
    pub fn readmit(&mut self, mut entry: MemoryEntry) {
        entry.tier = Tier::Hot;
        self.add(entry);
    }

    /// Entries younger than the age window, in insertion order.
    ///
    /// Stale entries are lazily moved to the pending buffer on read — no
    /// background timer wakes up just to expire them.
    pub fn active_entries(&mut self, now: DateTime<Utc>) -> Vec<MemoryEntry> {
        self.expire(now);
        self.entries.iter().cloned().collect()
    }

    /// Move entries past the age window out of the ring.
    fn expire(&mut self, now: DateTime<Utc>) {
        let mut moved = false;
        while let Some(front) = self.entries.front() {
            if now - front.created_at > self.max_age {
                let stale = self.entries.pop_front().unwrap();
                self.pending.push(stale);
                moved = true;
            } else {
                break;
            }
        }
        if moved {
            self.persist();
        }
    }

    /// Drain everything queued for warm promotion (aged-out + overflowed).
    pub fn take_pending(&mut self, now: DateTime<Utc>) -> Vec<MemoryEntry> {
        self.expire(now);
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.persist();
        }
        pending
    }

    /// Return entries whose promotion failed; they stay hot-tier and retry on
    /// the next sweep.
    pub fn requeue(&mut self, entries: Vec<MemoryEntry>) {
        if entries.is_empty() {
            return;
        }
        self.pending.extend(entries);
        self.persist();
    }

    /// Remove every entry (ring and pending). Used at session end, when the
    /// whole working set is archived.
    pub fn drain_all(&mut self) -> Vec<MemoryEntry> {
        let mut all: Vec<MemoryEntry> = self.entries.drain(..).collect();
        all.append(&mut self.pending);
        self.persist();
        all
    }

    /// Explicit reclassification of a ring or pending entry.
    pub fn set_importance(&mut self, id: &str, importance: crate::memory::types::Importance) -> bool {
        let mut found = false;
        for entry in self.entries.iter_mut().chain(self.pending.iter_mut()) {
            if entry.id == id {
                entry.importance = importance;
                found = true;
            }
        }
        if found {
            self.persist();
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = HotSnapshot {
            entries: self.entries.iter().cloned().collect(),
            pending: self.pending.clone(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "failed to persist hot cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize hot cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Importance;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hour)
    }

    fn store() -> HotStore {
        HotStore::in_memory(&HotConfig::default())
    }

    fn entry(content: &str, now: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new(content, Importance::Normal, now)
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut store = store();
        for i in 0..7 {
            store.add(entry(&format!("interaction {i}"), at(0)));
            assert!(store.len() <= 5);
        }
    }

    #[test]
    fn seven_adds_keep_last_five_in_order() {
        let mut store = store();
        for i in 0..7 {
            store.add(entry(&format!("interaction {i}"), at(0)));
        }

        let active = store.active_entries(at(1));
        let contents: Vec<&str> = active.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "interaction 2",
                "interaction 3",
                "interaction 4",
                "interaction 5",
                "interaction 6"
            ]
        );
        // The two evicted oldest entries are queued for warm promotion.
        assert_eq!(store.pending_len(), 2);
    }

    #[test]
    fn stale_entries_are_lazily_expired_on_read() {
        let mut store = store();
        store.add(entry("yesterday", at(0)));
        store.add(entry("just now", at(25)));

        let active = store.active_entries(at(26));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content, "just now");
        assert_eq!(store.pending_len(), 1);
    }

    #[test]
    fn take_pending_drains_and_requeue_restores() {
        let mut store = store();
        for i in 0..6 {
            store.add(entry(&format!("e{i}"), at(0)));
        }
        let pending = store.take_pending(at(1));
        assert_eq!(pending.len(), 1);
        assert_eq!(store.pending_len(), 0);

        store.requeue(pending);
        assert_eq!(store.pending_len(), 1);
    }

    #[test]
    fn readmitted_copy_is_hot() {
        let mut store = store();
        let mut cold = entry("archived exchange", at(0));
        cold.tier = Tier::Cold;

        store.readmit(cold);
        let active = store.active_entries(at(0));
        assert_eq!(active[0].tier, Tier::Hot);
    }

    #[test]
    fn drain_all_empties_ring_and_pending() {
        let mut store = store();
        for i in 0..6 {
            store.add(entry(&format!("e{i}"), at(0)));
        }
        let all = store.drain_all();
        assert_eq!(all.len(), 6);
        assert!(store.is_empty());
        assert_eq!(store.pending_len(), 0);
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.json");
        let config = HotConfig::default();

        {
            let mut store = HotStore::open(&path, &config).unwrap();
            store.add(entry("persisted", at(0)));
        }

        let mut reopened = HotStore::open(&path, &config).unwrap();
        let active = reopened.active_entries(at(1));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content, "persisted");
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = HotStore::open(&path, &HotConfig::default()).unwrap();
        assert!(store.is_empty());
    }
}
