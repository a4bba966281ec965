use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    ReadingSignals,
    Generating,
    Enriching,
    Sinking,
    Done,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed)
    }

    /// Stages only move forward; any non-terminal stage may fail.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Idle, ReadingSignals) => true,
            (ReadingSignals, Generating) => true,
            (Generating, Enriching) => true,
            (Enriching, Sinking) => true,
            (Sinking, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Operator-facing outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub signals_read: usize,
    /// Distinct (user, album) pairs across all strategies
    pub candidates_generated: usize,
    /// Albums fetched from the catalog and newly stored
    pub albums_enriched: usize,
    /// Candidate albums the catalog no longer knows
    pub albums_dropped: usize,
    pub recommendations_written: u64,
    /// Units of work skipped after a non-fatal error
    pub errors: usize,
    /// Set when the deadline or a shutdown stopped the run early
    pub cancelled: bool,
    pub failure: Option<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Idle,
            started_at: Utc::now(),
            finished_at: None,
            signals_read: 0,
            candidates_generated: 0,
            albums_enriched: 0,
            albums_dropped: 0,
            recommendations_written: 0,
            errors: 0,
            cancelled: false,
            failure: None,
        }
    }

    /// Moves the run to `next`, ignoring illegal transitions.
    pub fn advance(&mut self, next: RunStatus) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                run_id = %self.run_id,
                from = ?self.status,
                to = ?next,
                "Ignoring illegal run transition"
            );
            return;
        }

        tracing::debug!(run_id = %self.run_id, from = ?self.status, to = ?next, "Run transition");
        self.status = next;

        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.advance(RunStatus::Failed);
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
