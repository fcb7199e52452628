//! Run ledger: structured, JSON-serializable records of what happened
//! during one top-level download invocation.
//!
//! A [`RunLog`] holds one [`RunRecord`] per retry round (oldest first)
//! plus a rollup [`RunSummary`] computed at finalize. Error payloads are
//! flattened to plain strings before they ever reach the log, so the
//! document always serializes cleanly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Inclusive UTC time range for one run. Instants round-trip through
/// serde as RFC 3339 without truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} → {}",
            self.from.to_rfc3339(),
            self.to.to_rfc3339()
        )
    }
}

/// Outcome of one retry round, or of the whole run in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every entity in this round succeeded.
    Downloaded,
    /// Some failed and retries remain.
    Retrying,
    /// Some failed and the retry budget is exhausted (or the run was
    /// interrupted).
    Aborted,
    /// Summary only: all entities landed within the retry budget.
    Completed,
}

/// One failed entity, flattened for the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityError {
    pub entity_id: i64,
    pub time_range: TimeRange,
    pub error_kind: String,
    pub message: String,
}

impl EntityError {
    pub fn new(entity_id: i64, time_range: TimeRange, err: &FetchError) -> Self {
        Self {
            entity_id,
            time_range,
            error_kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one retry round: which entities were persisted, which
/// failed and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub round: u32,
    pub status: RunStatus,
    /// Artifact ids of entities persisted this round.
    pub saved: Vec<String>,
    pub errors: Vec<EntityError>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl RunRecord {
    pub fn start(round: u32) -> Self {
        Self {
            round,
            status: RunStatus::Downloaded,
            saved: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            duration_secs: 0.0,
        }
    }
}

/// Rollup over all rounds, written once when the run returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_entities: usize,
    pub saved: usize,
    pub failed: usize,
    pub retry_rounds: u32,
    pub duration_secs: f64,
}

/// Full record of one top-level orchestration invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub time_range: TimeRange,
    pub created_at: DateTime<Utc>,
    pub records: Vec<RunRecord>,
    pub summary: Option<RunSummary>,
}

impl RunLog {
    pub fn new(run_id: &str, time_range: TimeRange) -> Self {
        Self {
            run_id: run_id.to_string(),
            time_range,
            created_at: Utc::now(),
            records: Vec::new(),
            summary: None,
        }
    }

    pub fn push(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    /// Compute the rollup summary. The overall status is `Aborted` iff
    /// the deepest round aborted, otherwise `Completed`.
    pub fn finalize(&mut self, total_entities: usize) {
        let saved: usize = self.records.iter().map(|r| r.saved.len()).sum();
        let failed = self
            .records
            .last()
            .map_or(0, |r| r.errors.len());
        let status = match self.records.last().map(|r| r.status) {
            Some(RunStatus::Aborted) => RunStatus::Aborted,
            _ => RunStatus::Completed,
        };
        let duration_secs = (Utc::now() - self.created_at).num_milliseconds() as f64 / 1000.0;
        let retry_rounds = self.records.len().saturating_sub(1) as u32;

        self.summary = Some(RunSummary {
            status,
            total_entities,
            saved,
            failed,
            retry_rounds,
            duration_secs,
        });
    }

    /// Deterministic document name: run id + creation timestamp.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.run_id,
            self.created_at.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Persist as pretty JSON under `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Load a previously written log.
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}
