//! The `MemoryManager` facade — the crate's host-facing surface.
//!
//! Wires the session registry, the three tier stores, the decay/reinforcement
//! engines, the hybrid searcher, and the transitioner behind the two entry points
//! the host event system needs: [`MemoryManager::on_event`] and
//! [`MemoryManager::context_for_prompt`]. The latter is fail-soft by contract: in
//! the worst case it returns an empty string, never an error and never a block.

use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::config::StrataConfig;
use crate::embedding::Embedder;
use crate::error::{Result, StrataError};
use crate::memory::cold::{ArchiveRecord, ColdArchive};
use crate::memory::decay::DecayEngine;
use crate::memory::disclosure::DisclosureController;
use crate::memory::hot::HotStore;
use crate::memory::hybrid::HybridSearcher;
use crate::memory::reinforcement::ReinforcementTracker;
use crate::memory::session::{EventKind, Session, SessionRegistry};
use crate::memory::stats::{tier_stats, StatsReport};
use crate::memory::transition::{SweepReport, TierTransitioner};
use crate::memory::types::{Importance, MemoryEntry, Tier};
use crate::memory::warm::WarmStore;

pub struct MemoryManager {
    config: StrataConfig,
    clock: SharedClock,
    embedder: Option<Arc<dyn Embedder>>,
    hot: Arc<Mutex<HotStore>>,
    warm: Arc<WarmStore>,
    cold: Arc<ColdArchive>,
    tracker: Arc<ReinforcementTracker>,
    transitioner: Arc<TierTransitioner>,
    disclosure: DisclosureController,
    sessions: Mutex<SessionRegistry>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    /// Open all stores under the configured data directory. The embedder is
    /// optional — without one the warm tier fills only via eager commits that
    /// already carry embeddings, and retrieval degrades to lexical-only.
    pub fn open(config: StrataConfig, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        Self::open_with_clock(config, embedder, Arc::new(SystemClock))
    }

    /// Same as [`MemoryManager::open`] with an injected clock, for tests and
    /// replay tooling.
    pub fn open_with_clock(
        config: StrataConfig,
        embedder: Option<Arc<dyn Embedder>>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let hot = Arc::new(Mutex::new(HotStore::open(config.hot_path(), &config.hot)?));
        let warm = Arc::new(WarmStore::open(config.warm_db_path(), &config.warm)?);
        let cold = Arc::new(ColdArchive::open(config.cold_dir())?);
        let decay = Arc::new(DecayEngine::new(&config.decay)?);
        let tracker = Arc::new(ReinforcementTracker::new(&config.reinforcement));
        let hybrid = Arc::new(HybridSearcher::new(&config.fusion)?);

        let transitioner = Arc::new(TierTransitioner::new(
            Arc::clone(&hot),
            Arc::clone(&warm),
            Arc::clone(&cold),
            Arc::clone(&decay),
            Arc::clone(&tracker),
            embedder.clone(),
            &config.transition,
        ));
        let disclosure = DisclosureController::new(
            Arc::clone(&hot),
            Arc::clone(&warm),
            Arc::clone(&cold),
            hybrid,
            &config.disclosure,
            config.warm.max_age_days,
        );
        let sessions = Mutex::new(SessionRegistry::new(&config.session));

        info!(data_dir = %config.resolved_data_dir().display(), "memory manager ready");
        Ok(Self {
            config,
            clock,
            embedder,
            hot,
            warm,
            cold,
            tracker,
            transitioner,
            disclosure,
            sessions,
        })
    }

    /// Host event intake. `ResponseCompleted` is the commit point — that is when
    /// an interaction becomes a [`MemoryEntry`].
    pub fn on_event(&self, kind: EventKind, payload: &str) -> Result<()> {
        let now = self.clock.now();
        match kind {
            EventKind::SessionStart => {
                let previous = self.sessions.lock().unwrap().start_session(now);
                if let Some(session) = previous {
                    self.finalize_session(session);
                }
            }
            EventKind::SessionEnd => {
                let ended = self.sessions.lock().unwrap().end_active(now);
                if let Some(session) = ended {
                    self.finalize_session(session);
                }
            }
            EventKind::ResponseCompleted => {
                let session_id = {
                    let mut sessions = self.sessions.lock().unwrap();
                    sessions.record_event(kind, payload, now);
                    sessions.active().map(|s| s.id.clone())
                };
                self.commit_interaction(payload, Importance::Normal, session_id);
            }
            EventKind::PromptSubmitted | EventKind::ToolExecuted => {
                self.sessions.lock().unwrap().record_event(kind, payload, now);
            }
        }
        self.tick();
        Ok(())
    }

    /// Commit an interaction to the hot tier with an explicit importance class.
    ///
    /// Every interaction lands hot regardless of importance. High and critical
    /// entries are additionally embedded into the warm tier right away so they
    /// are semantically searchable before they ever age out of the ring; if the
    /// embedder is down that eager copy simply waits for the normal promotion
    /// path.
    pub fn commit_interaction(
        &self,
        content: &str,
        importance: Importance,
        session_id: Option<String>,
    ) -> String {
        let now = self.clock.now();
        let mut entry = MemoryEntry::new(content, importance, now);
        if let Some(session_id) = session_id {
            entry = entry.with_session(session_id);
        }
        let id = entry.id.clone();

        if matches!(importance, Importance::Critical | Importance::High) {
            if let Some(embedder) = &self.embedder {
                match embedder.embed(content) {
                    Ok(embedding) => {
                        let mut warm_copy = entry.clone();
                        warm_copy.embedding = Some(embedding);
                        warm_copy.tier = Tier::Warm;
                        if let Err(e) = self.warm.store(&warm_copy) {
                            warn!(id = %id, error = %e, "eager warm index failed");
                        }
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "embedder unavailable, deferring warm index");
                    }
                }
            }
        }

        self.hot.lock().unwrap().add(entry);
        id
    }

    /// Assemble the context string for a prompt. Fail-soft by contract: any
    /// internal failure degrades toward hot-only content, worst case an empty
    /// string — the host always gets a response.
    pub fn context_for_prompt(&self, prompt: &str) -> String {
        let now = self.clock.now();

        let embedding = self.embedder.as_ref().and_then(|e| match e.embed(prompt) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(error = %err, "prompt embedding failed, lexical-only retrieval");
                None
            }
        });

        let assembled = {
            let sessions = self.sessions.lock().unwrap();
            self.disclosure
                .get_context(prompt, embedding.as_deref(), sessions.active(), now)
        };

        if !assembled.accessed_warm_ids.is_empty() {
            let ids: Vec<&str> = assembled.accessed_warm_ids.iter().map(|s| s.as_str()).collect();
            if let Err(e) = self.warm.record_access(&ids, &self.tracker, now) {
                warn!(error = %e, "failed to record warm accesses");
            }
        }

        assembled.text
    }

    /// Drive the session state machine. Called internally on every event; hosts
    /// without a steady event stream can call it from a timer.
    pub fn tick(&self) {
        let now = self.clock.now();
        let ended = self.sessions.lock().unwrap().tick(now);
        if let Some(session) = ended {
            self.finalize_session(session);
        }
    }

    /// End-of-session bookkeeping: the full event history and every hot entry
    /// reach the cold archive (whether or not they ever warmed up), then the
    /// on-demand tier sweep runs. Per-item failures are logged and skipped.
    fn finalize_session(&self, session: Session) {
        let now = self.clock.now();
        let source = format!("session:{}", session.id);

        let history = session.history_text();
        if !history.is_empty() {
            let record = ArchiveRecord {
                id: session.id.clone(),
                content: history,
                source: source.clone(),
                importance: Importance::Normal,
                timestamp: session.started_at,
            };
            if let Err(e) = self.cold.archive(&record) {
                warn!(session = %session.id, error = %e, "failed to archive session history");
            }
        }

        let drained = self.hot.lock().unwrap().drain_all();
        for entry in drained {
            if let Err(e) = self
                .cold
                .archive(&ArchiveRecord::from_entry(&entry, source.as_str()))
            {
                warn!(id = %entry.id, error = %e, "failed to archive hot entry at session end");
            }
        }

        self.transitioner.run_sweep(now);
        info!(session = %session.id, "session ended and archived");
    }

    /// Explicit importance reclassification across the fast-path tiers.
    pub fn reclassify(&self, id: &str, importance: Importance) -> Result<()> {
        let in_hot = self.hot.lock().unwrap().set_importance(id, importance);
        let in_warm = self.warm.set_importance(id, importance)?;
        if in_hot || in_warm {
            Ok(())
        } else {
            Err(StrataError::NotFound(format!("memory {id}")))
        }
    }

    /// Session-resume reinforcement: search the cold archive and re-admit copies
    /// of the best matches into the hot ring. The archived originals keep their
    /// tier — only copies travel.
    pub fn readmit_from_cold(&self, query: &str, limit: usize) -> Result<usize> {
        let now = self.clock.now();
        let hits = self.cold.search(query, limit, None, now)?;
        let count = hits.len();
        let mut hot = self.hot.lock().unwrap();
        for hit in hits {
            // The copy enters the working set as fresh material; the archived
            // original keeps its own id and timestamps in the log.
            let copy = MemoryEntry::new(hit.content, hit.importance, now);
            hot.readmit(copy);
        }
        Ok(count)
    }

    /// Run one tier sweep immediately.
    pub fn run_sweep(&self) -> SweepReport {
        self.transitioner.run_sweep(self.clock.now())
    }

    /// Spawn the periodic background sweep (daily by default). The handle can be
    /// aborted at shutdown; foreground operations never wait on it.
    pub fn start_background_sweep(&self) -> tokio::task::JoinHandle<()> {
        self.transitioner.spawn_periodic(Arc::clone(&self.clock))
    }

    /// Per-tier store statistics.
    pub fn stats(&self) -> Result<StatsReport> {
        tier_stats(
            &self.hot,
            &self.warm,
            &self.cold,
            Some(&self.config.warm_db_path()),
        )
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }
}
