//! Run reporting: per-source counters and their run-wide aggregate.

use crate::mapper::Route;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize)]
pub struct SourceSummary {
    pub origin: String,
    pub route: Route,
    /// Set when at least one record was written.
    pub output: Option<PathBuf>,
    pub records_read: u64,
    pub emitted: u64,
    pub bytes: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub dropped_turns: u64,
    pub empty_conversations: u64,
    pub limit_reached: bool,
}

impl SourceSummary {
    pub fn new(origin: impl Into<String>, route: Route) -> Self {
        Self {
            origin: origin.into(),
            route,
            output: None,
            records_read: 0,
            emitted: 0,
            bytes: 0,
            filtered: 0,
            malformed: 0,
            dropped_turns: 0,
            empty_conversations: 0,
            limit_reached: false,
        }
    }

    /// Records skipped as unusable (not filtered): malformed rows and empty conversations.
    pub fn skipped(&self) -> u64 {
        self.malformed + self.empty_conversations
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub sources: Vec<SourceSummary>,
    /// Sources never started because a run-wide limit was already reached.
    pub sources_not_started: Vec<String>,
    pub limit_reached: bool,
}

impl RunSummary {
    pub fn total_emitted(&self) -> u64 {
        self.sources.iter().map(|s| s.emitted).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.sources.iter().map(|s| s.bytes).sum()
    }

    pub fn total_filtered(&self) -> u64 {
        self.sources.iter().map(|s| s.filtered).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.sources.iter().map(SourceSummary::skipped).sum()
    }

    pub fn total_dropped_turns(&self) -> u64 {
        self.sources.iter().map(|s| s.dropped_turns).sum()
    }

    pub fn log(&self) {
        for s in &self.sources {
            tracing::info!(
                source = %s.origin,
                route = ?s.route,
                emitted = s.emitted,
                bytes = s.bytes,
                filtered = s.filtered,
                malformed = s.malformed,
                empty_conversations = s.empty_conversations,
                dropped_turns = s.dropped_turns,
                "source done"
            );
        }
        if !self.sources_not_started.is_empty() {
            tracing::info!(count = self.sources_not_started.len(), "sources not started: limit reached");
        }
        tracing::info!(
            emitted = self.total_emitted(),
            bytes = self.total_bytes(),
            skipped = self.total_skipped(),
            "run complete"
        );
    }
}
