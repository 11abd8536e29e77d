//! Run report: findings, counters and the accumulated report text.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::schema::Side;
use crate::error::Result;

/// Line appended after every executed write.
pub const REMEDIED_LINE: &str = "Differences were remedied";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Completed,
    Cancelled,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Cancelled => f.write_str("cancelled"),
            RunStatus::Aborted => f.write_str("aborted"),
        }
    }
}

/// What a difference requires of the losing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The row is missing on `target` and is inserted there.
    Insert,
    /// `target` holds an older version and is updated.
    Update,
}

/// What happened to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Report-only run; nothing was written.
    Reported,
    /// The write was executed.
    Remedied,
    /// The row could not be written; the run went on.
    Failed,
}

/// One detected difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// `from -> to` of the table map.
    pub table_map: String,
    pub guid: Uuid,
    pub kind: FindingKind,
    /// Side that receives the write.
    pub target: Side,
    pub parent_version: Option<i64>,
    pub child_version: Option<i64>,
    /// Report line describing the difference.
    pub message: String,
    pub outcome: Outcome,
    /// Why the write failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of an orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub report_only: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,

    /// Eligible tables whose batch loop ran.
    pub tables_processed: usize,
    /// Tables without both reserved columns.
    pub tables_skipped: Vec<String>,
    /// Tables that reached the iteration cap.
    pub tables_capped: Vec<String>,

    /// Every detected difference, remedied or not.
    pub differences_found: usize,
    /// Executed writes.
    pub differences_remedied: usize,
    /// Rows whose write could not be built.
    pub differences_failed: usize,

    pub findings: Vec<Finding>,

    /// Accumulated report text, one line per event.
    pub text: String,
}

impl RunReport {
    /// Empty report for a new run.
    pub fn new(report_only: bool) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            report_only,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Append a line to the report text.
    pub fn push_line(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    /// Record a detected difference and its report line.
    pub fn record(&mut self, finding: Finding) {
        self.differences_found += 1;
        self.push_line(&finding.message);
        self.findings.push(finding);
    }

    /// Mark the most recent finding as remedied.
    pub fn mark_remedied(&mut self) {
        self.differences_remedied += 1;
        if let Some(finding) = self.findings.last_mut() {
            finding.outcome = Outcome::Remedied;
        }
        self.push_line(REMEDIED_LINE);
    }

    /// Mark the most recent finding as failed.
    pub fn mark_failed(&mut self, error: String) {
        self.differences_failed += 1;
        let mut line = String::new();
        if let Some(finding) = self.findings.last_mut() {
            line = format!("GUID: {} could not be remedied: {}", finding.guid, error);
            finding.outcome = Outcome::Failed;
            finding.error = Some(error);
        }
        self.push_line(line);
    }

    /// Stamp completion time and status.
    pub fn finish(&mut self, status: RunStatus) {
        let completed_at = Utc::now();
        if let Some(started_at) = self.started_at {
            self.duration_seconds =
                (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        }
        self.completed_at = Some(completed_at);
        self.status = status;
    }

    /// Report text followed by the total line.
    pub fn render(&self) -> String {
        format!(
            "{}{} total differences were found.\n",
            self.text, self.differences_found
        )
    }

    /// Detection lines only, without the per-write confirmations.
    pub fn finding_lines(&self) -> Vec<&str> {
        self.findings.iter().map(|f| f.message.as_str()).collect()
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
