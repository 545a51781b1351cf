//! Session lifecycle — the gate between host events and the memory tiers.
//!
//! A [`SessionRegistry`] owns at most one active session (starting a new one
//! implicitly ends the old), tracks activity for idle/auto-end transitions, and
//! keeps a bounded rolling event log plus derived scratch context (recent files,
//! tools, entities). The registry is an explicit injected object, never a
//! module-level singleton.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::SessionConfig;

/// How many distinct files/tools/entities the derived context retains.
const CONTEXT_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host events delivered through the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    PromptSubmitted,
    ToolExecuted,
    ResponseCompleted,
    SessionEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::PromptSubmitted => "prompt_submitted",
            Self::ToolExecuted => "tool_executed",
            Self::ResponseCompleted => "response_completed",
            Self::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub payload: String,
    pub at: DateTime<Utc>,
}

/// Mutable scratch derived from events — convenience state, not an
/// authoritative store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub recent_files: Vec<String>,
    pub recent_tools: Vec<String>,
    pub entities: Vec<String>,
}

impl SessionContext {
    fn push_bounded(list: &mut Vec<String>, value: String) {
        if let Some(pos) = list.iter().position(|v| v == &value) {
            list.remove(pos);
        }
        list.push(value);
        if list.len() > CONTEXT_CAP {
            list.remove(0);
        }
    }

    fn absorb(&mut self, kind: EventKind, payload: &str) {
        if kind == EventKind::ToolExecuted {
            if let Some(tool) = payload.split_whitespace().next() {
                Self::push_bounded(&mut self.recent_tools, tool.to_string());
            }
        }
        for token in payload.split_whitespace() {
            let trimmed = token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-');
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.contains('/') || has_file_extension(trimmed) {
                Self::push_bounded(&mut self.recent_files, trimmed.to_string());
            } else if trimmed.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && trimmed.len() > 2
            {
                Self::push_bounded(&mut self.entities, trimmed.to_string());
            }
        }
    }
}

fn has_file_extension(token: &str) -> bool {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub state: SessionState,
    pub events: VecDeque<SessionEvent>,
    pub context: SessionContext,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            started_at: now,
            last_activity_at: now,
            state: SessionState::Active,
            events: VecDeque::new(),
            context: SessionContext::default(),
        }
    }

    /// Render the full event history for cold archival.
    pub fn history_text(&self) -> String {
        self.events
            .iter()
            .map(|e| format!("[{}] {}: {}", e.at.to_rfc3339(), e.kind, e.payload))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SessionRegistry {
    config: SessionConfig,
    active: Option<Session>,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
            active: None,
        }
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// Start a new session. If one is live it is implicitly ended and returned
    /// so the caller can archive it — exactly one session is ever active.
    pub fn start_session(&mut self, now: DateTime<Utc>) -> Option<Session> {
        let previous = self.end_active(now);
        self.active = Some(Session::new(now));
        previous
    }

    /// Record an event against the active session, starting one implicitly if
    /// the host skipped `SessionStart`. An idle session resumes to active.
    pub fn record_event(&mut self, kind: EventKind, payload: &str, now: DateTime<Utc>) {
        if self.active.is_none() {
            self.active = Some(Session::new(now));
        }
        let session = self.active.as_mut().unwrap();
        if session.state == SessionState::Idle {
            session.state = SessionState::Active;
        }
        session.last_activity_at = now;
        session.context.absorb(kind, payload);
        session.events.push_back(SessionEvent {
            kind,
            payload: payload.to_string(),
            at: now,
        });
        while session.events.len() > self.config.event_log_size {
            session.events.pop_front();
        }
    }

    /// Advance the state machine: active → idle after the idle timeout, and
    /// auto-end after `2×idle_timeout` without a resume or past the maximum
    /// session duration. Returns the ended session, if any, for archival.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Session> {
        let idle = chrono::Duration::minutes(self.config.idle_timeout_minutes);
        let max_duration = chrono::Duration::hours(self.config.max_duration_hours);

        let (should_end, should_idle) = {
            let session = self.active.as_ref()?;
            let inactive = now - session.last_activity_at;
            (
                now - session.started_at >= max_duration || inactive >= idle * 2,
                session.state == SessionState::Active && inactive >= idle,
            )
        };

        if should_end {
            return self.end_active(now);
        }
        if should_idle {
            if let Some(session) = self.active.as_mut() {
                session.state = SessionState::Idle;
            }
        }
        None
    }

    /// End the active session (if any) and hand it back. This is the only path
    /// that clears the active pointer.
    pub fn end_active(&mut self, now: DateTime<Utc>) -> Option<Session> {
        let mut session = self.active.take()?;
        session.state = SessionState::Ended;
        session.last_activity_at = now;
        Some(session)
    }
}
