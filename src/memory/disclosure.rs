//! Progressive disclosure — how much memory a query earns.
//!
//! Queries are classified into a disclosure level by cheap lexical signals (word
//! count, entities, temporal/continuation keywords); each level caps hot/warm
//! items, gates cold retrieval, and carries its own token budget. Assembly is
//! greedy: items are added until the next one would overflow the budget, and only
//! item *content* is ever cut mid-way, always with an explicit `[truncated]`
//! marker. The whole assembly runs under a soft deadline — once it is spent, the
//! retrieval phase is skipped and whatever is already assembled (hot tier at
//! minimum) is returned.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::warn;

use crate::config::{DisclosureConfig, LevelConfig};
use crate::memory::cold::ColdArchive;
use crate::memory::hot::HotStore;
use crate::memory::hybrid::{HybridSearcher, Origin};
use crate::memory::session::Session;
use crate::memory::warm::WarmStore;

const CONTINUATION_KEYWORDS: &[&str] = &[
    "continue",
    "as we discussed",
    "keep going",
    "where we left",
    "again",
    "follow up",
];

const TEMPORAL_KEYWORDS: &[&str] = &[
    "yesterday",
    "earlier",
    "last time",
    "last week",
    "last month",
    "this morning",
    "previously",
    "before",
    "ago",
    "remember",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DisclosureLevel {
    Minimal,
    Standard,
    Detailed,
    Comprehensive,
}

impl DisclosureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl std::fmt::Display for DisclosureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The assembled context plus bookkeeping the caller needs.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub level: DisclosureLevel,
    /// Warm-tier ids that made it into the context — the caller records these
    /// as accesses so reinforcement reflects actual use.
    pub accessed_warm_ids: Vec<String>,
    pub token_estimate: usize,
}

pub struct DisclosureController {
    hot: Arc<Mutex<HotStore>>,
    warm: Arc<WarmStore>,
    cold: Arc<ColdArchive>,
    hybrid: Arc<HybridSearcher>,
    config: DisclosureConfig,
    warm_max_age_days: i64,
}

impl DisclosureController {
    pub fn new(
        hot: Arc<Mutex<HotStore>>,
        warm: Arc<WarmStore>,
        cold: Arc<ColdArchive>,
        hybrid: Arc<HybridSearcher>,
        config: &DisclosureConfig,
        warm_max_age_days: i64,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            hybrid,
            config: config.clone(),
            warm_max_age_days,
        }
    }

    /// Classify a query by cheap lexical signals. No model calls here — this
    /// runs on every turn.
    pub fn classify(&self, query: &str) -> DisclosureLevel {
        let words = query.split_whitespace().count();
        let entities = query
            .split_whitespace()
            .filter(|w| w.chars().next().is_some_and(|c| c.is_ascii_uppercase()) && w.len() > 2)
            .count();
        let lower = query.to_lowercase();

        let mut score = 0usize;
        if words > 12 {
            score += 2;
        } else if words > 5 {
            score += 1;
        }
        if entities >= 2 {
            score += 1;
        }
        if query.contains('?') {
            score += 1;
        }
        if TEMPORAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 2;
        }
        if CONTINUATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 1;
        }

        match score {
            0 => DisclosureLevel::Minimal,
            1 | 2 => DisclosureLevel::Standard,
            3 => DisclosureLevel::Detailed,
            _ => DisclosureLevel::Comprehensive,
        }
    }

    fn profile(&self, level: DisclosureLevel) -> &LevelConfig {
        match level {
            DisclosureLevel::Minimal => &self.config.minimal,
            DisclosureLevel::Standard => &self.config.standard,
            DisclosureLevel::Detailed => &self.config.detailed,
            DisclosureLevel::Comprehensive => &self.config.comprehensive,
        }
    }

    /// Assemble the context string for a prompt.
    ///
    /// The hot tier is always included (up to the level's cap). The retrieval
    /// phase is conditional on the level, the warm trigger heuristic, and the
    /// remaining time budget; any failure there degrades to what is already
    /// assembled.
    pub fn get_context(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        session: Option<&Session>,
        now: DateTime<Utc>,
    ) -> AssembledContext {
        let started = Instant::now();
        let level = self.classify(query);
        let profile = self.profile(level);
        let deadline = std::time::Duration::from_millis(self.config.time_budget_ms);

        let mut assembly = Assembly::new(profile.max_tokens);

        // Derived session scratch: entities from standard up, the full file/tool
        // context only at the fullest level.
        if let Some(session) = session {
            let ctx = &session.context;
            if level >= DisclosureLevel::Standard && !ctx.entities.is_empty() {
                assembly.push_line(&format!("Entities in play: {}", ctx.entities.join(", ")));
            }
            if level == DisclosureLevel::Comprehensive
                && (!ctx.recent_files.is_empty() || !ctx.recent_tools.is_empty())
            {
                assembly.push_line(&format!(
                    "Session context: files {}; tools {}",
                    ctx.recent_files.join(", "),
                    ctx.recent_tools.join(", "),
                ));
            }
        }

        // Hot tier: always, newest last, wholesale.
        let hot_entries = {
            let mut hot = self.hot.lock().unwrap();
            let mut entries = hot.active_entries(now);
            if entries.len() > profile.hot_items {
                entries.drain(..entries.len() - profile.hot_items);
            }
            entries
        };
        if !hot_entries.is_empty() {
            assembly.push_line("Recent interactions:");
            for entry in &hot_entries {
                let text = match level {
                    DisclosureLevel::Minimal | DisclosureLevel::Standard => {
                        summary_line(&entry.content)
                    }
                    _ => entry.content.clone(),
                };
                if !assembly.push_item(&format!("- {text}")) {
                    break;
                }
            }
        }

        // Retrieval phase: skipped entirely once the soft deadline is spent.
        let mut accessed_warm_ids = Vec::new();
        let retrieval_allowed = profile.warm_items > 0
            && self.warm.should_trigger(query)
            && started.elapsed() < deadline;
        if retrieval_allowed {
            if profile.cold_search {
                // Comprehensive: fused warm + cold evidence.
                match self.hybrid.search(
                    &self.warm,
                    &self.cold,
                    query,
                    query_embedding,
                    self.warm_max_age_days,
                    profile.warm_items,
                    now,
                ) {
                    Ok(results) if !results.is_empty() => {
                        assembly.push_line("Relevant memories:");
                        for result in &results {
                            if result.origin == Origin::Warm {
                                accessed_warm_ids.push(result.id.clone());
                            }
                            if !assembly.push_item(&format!("- {}", result.content)) {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "hybrid retrieval failed, returning partial context"),
                }
            } else if let Some(embedding) = query_embedding {
                // Standard/Detailed: semantic matches only, no cold traffic.
                match self
                    .warm
                    .search(embedding, self.warm_max_age_days, profile.warm_items, now)
                {
                    Ok(matches) if !matches.is_empty() => {
                        assembly.push_line("Relevant memories:");
                        for m in &matches {
                            accessed_warm_ids.push(m.entry.id.clone());
                            let text = if level == DisclosureLevel::Standard {
                                summary_line(&m.entry.content)
                            } else {
                                m.entry.content.clone()
                            };
                            if !assembly.push_item(&format!("- {text}")) {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "warm retrieval failed, returning partial context"),
                }
            }
        }

        AssembledContext {
            token_estimate: assembly.used_tokens,
            text: assembly.finish(),
            level,
            accessed_warm_ids,
        }
    }
}

/// Greedy token-budgeted line assembly.
struct Assembly {
    lines: Vec<String>,
    budget: usize,
    used_tokens: usize,
    has_items: bool,
}

impl Assembly {
    fn new(budget: usize) -> Self {
        Self {
            lines: Vec::new(),
            budget,
            used_tokens: 0,
            has_items: false,
        }
    }

    /// Structural line (headers): always added, still counted.
    fn push_line(&mut self, line: &str) {
        self.used_tokens += estimate_tokens(line);
        self.lines.push(line.to_string());
    }

    /// Content item. Returns `false` once the budget is exhausted — the caller
    /// stops adding. The very first item is char-truncated to fit rather than
    /// dropped, so a tight budget still yields usable context.
    fn push_item(&mut self, line: &str) -> bool {
        let tokens = estimate_tokens(line);
        if self.used_tokens + tokens > self.budget {
            if self.has_items {
                return false;
            }
            let remaining_chars = (self.budget.saturating_sub(self.used_tokens)) * 4;
            self.lines.push(truncate_marked(line, remaining_chars));
            self.used_tokens = self.budget;
            self.has_items = true;
            return false;
        }
        self.used_tokens += tokens;
        self.lines.push(line.to_string());
        self.has_items = true;
        true
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// The chars/4 heuristic — cheap and close enough for budgeting.
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// One-line preview for the summary formatters.
fn summary_line(content: &str) -> String {
    let first = content.lines().next().unwrap_or("");
    if first.len() <= 120 {
        first.to_string()
    } else {
        truncate_marked(first, 120)
    }
}

/// Cut at a char boundary and append the explicit truncation marker.
fn truncate_marked(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let end = content
        .char_indices()
        .take_while(|(i, _)| *i < max_chars)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!("{} [truncated]", &content[..end])
}
