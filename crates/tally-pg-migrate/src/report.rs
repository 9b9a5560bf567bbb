//! Run report aggregation.

use crate::entity::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal state of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// All phases ran, no warnings, no failed chunks.
    CompletedClean,
    /// All phases ran; some records were skipped, orphaned or failed.
    CompletedWithWarnings,
    /// A phase signaled a fatal, unrecoverable condition.
    Aborted,
}

/// Severity of a per-record issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Record excluded from the load batch.
    Fatal,
    /// Record proceeds, typically with a null foreign key.
    Warning,
}

/// A single record-level problem, tagged with the entity kind and the
/// natural key (GUID where available, otherwise name) of the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordIssue {
    pub severity: Severity,
    pub kind: EntityKind,
    pub natural_key: String,
    pub reason: String,
}

impl RecordIssue {
    pub fn fatal(kind: EntityKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            kind,
            natural_key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn warning(kind: EntityKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            natural_key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Running insert/update/fail counters for one entity kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadCounts {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

impl LoadCounts {
    pub fn merge(&mut self, other: LoadCounts) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Terminal state.
    pub state: RunState,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-kind load counters, keyed by target table name.
    pub counts: BTreeMap<String, LoadCounts>,

    /// Post-load row counts per target table within the tenant scope,
    /// as recounted by the verify phase. Empty when verification was
    /// skipped or never reached.
    #[serde(default)]
    pub verified: BTreeMap<String, u64>,

    /// Fatal and warning records.
    pub issues: Vec<RecordIssue>,

    /// False once any chunk fails after retry exhaustion.
    pub clean: bool,
}

impl RunReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            state: RunState::Aborted,
            started_at: Utc::now(),
            completed_at: None,
            counts: BTreeMap::new(),
            verified: BTreeMap::new(),
            issues: Vec::new(),
            clean: true,
        }
    }

    /// Merge counters for one kind.
    pub fn record_counts(&mut self, kind: EntityKind, counts: LoadCounts) {
        self.counts
            .entry(kind.table_name().to_string())
            .or_default()
            .merge(counts);
    }

    pub fn push_issue(&mut self, issue: RecordIssue) {
        self.issues.push(issue);
    }

    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = RecordIssue>) {
        self.issues.extend(issues);
    }

    pub fn fatal_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Fatal)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Total rows inserted across all kinds.
    pub fn total_inserted(&self) -> u64 {
        self.counts.values().map(|c| c.inserted).sum()
    }

    /// Total rows updated across all kinds.
    pub fn total_updated(&self) -> u64 {
        self.counts.values().map(|c| c.updated).sum()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_merge_by_kind() {
        let mut report = RunReport::new("run-1".into());
        report.record_counts(
            EntityKind::Ledger,
            LoadCounts {
                inserted: 10,
                updated: 2,
                failed: 0,
            },
        );
        report.record_counts(
            EntityKind::Ledger,
            LoadCounts {
                inserted: 5,
                updated: 0,
                failed: 1,
            },
        );

        let counts = report.counts.get("ledgers").unwrap();
        assert_eq!(counts.inserted, 15);
        assert_eq!(counts.updated, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(report.total_inserted(), 15);
    }

    #[test]
    fn test_issue_severity_counts() {
        let mut report = RunReport::new("run-2".into());
        report.push_issue(RecordIssue::fatal(EntityKind::Voucher, "V1", "missing date"));
        report.push_issue(RecordIssue::warning(
            EntityKind::LedgerEntry,
            "E1",
            "unresolved ledger reference",
        ));
        assert_eq!(report.fatal_count(), 1);
        assert_eq!(report.warning_count(), 1);
        assert!(report.to_json().unwrap().contains("unresolved ledger"));
    }
}
