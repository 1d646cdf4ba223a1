//! Export ledger domain models.
//!
//! One `ExportRecord` is written per (recipient, batch) before any call to
//! the worker. Records whose `batch_id` is still `None` after a run mark an
//! enqueue that never completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Recipients per processing unit assumed by the worker. Used only for the
/// completion-time estimate returned to callers.
pub const WORKER_BATCH_UNIT: usize = 20;

/// Minutes the worker takes per processing unit.
pub const MINUTES_PER_BATCH_UNIT: u64 = 2;

/// What kind of trigger produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportType {
    /// The user asked for their own history to be exported.
    Manual,
    /// A scheduled run over all consenting students.
    Scheduled,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::Manual => "MANUAL",
            ExportType::Scheduled => "SCHEDULED",
        }
    }
}

/// Error parsing an export enum from its stored string form.
#[derive(Debug, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for ExportType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(ExportType::Manual),
            "SCHEDULED" => Ok(ExportType::Scheduled),
            _ => Err(ParseEnumError {
                kind: "export type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an export record.
///
/// Records are created PENDING; everything past that comes from
/// reconciliation against the worker, never from the orchestrator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "PENDING",
            ExportStatus::Processing => "PROCESSING",
            ExportStatus::Sent => "SENT",
            ExportStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ExportStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExportStatus::Pending),
            "PROCESSING" => Ok(ExportStatus::Processing),
            "SENT" => Ok(ExportStatus::Sent),
            "FAILED" => Ok(ExportStatus::Failed),
            _ => Err(ParseEnumError {
                kind: "export status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The date range covered by an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Audit row for one recipient's participation in one export attempt.
///
/// User fields are snapshots taken at creation time so renamed or deleted
/// users do not corrupt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    #[serde(rename = "type")]
    pub export_type: ExportType,
    pub status: ExportStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Where the consolidated report is delivered. Not necessarily the
    /// recipient's own address.
    pub destination_email: String,
    pub subject: String,
    /// Size of the batch this record belongs to.
    pub recipients_count: i32,
    /// Worker job id. None until the enqueue call has returned; a record
    /// stuck at None indicates an enqueue that never completed.
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-batch result of an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The worker accepted the batch.
    Enqueued { job_id: String },
    /// Ledger rows could not be written; the worker was never contacted.
    PersistFailed { error: String },
    /// The worker was contacted and refused, or was unreachable.
    EnqueueFailed { error: String },
    /// The run's deadline expired before this batch was attempted.
    NotEnqueued,
}

/// One batch's entry in the invocation summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub group: String,
    pub recipients: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Summary returned to the caller of an export invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub success: bool,
    pub jobs_enqueued: usize,
    pub job_ids: Vec<String>,
    /// Total recipients across successfully enqueued batches.
    pub processed: usize,
    pub estimated_time_minutes: u64,
    pub batches: Vec<BatchReport>,
}

impl ExportSummary {
    /// An invocation that found nothing to do.
    pub fn empty() -> Self {
        Self {
            success: true,
            jobs_enqueued: 0,
            job_ids: Vec::new(),
            processed: 0,
            estimated_time_minutes: 0,
            batches: Vec::new(),
        }
    }

    /// Estimated completion time from the recipient count, using the
    /// worker's fixed per-batch-of-20 processing rate.
    pub fn estimate_minutes(recipients: usize) -> u64 {
        (recipients.div_ceil(WORKER_BATCH_UNIT) as u64) * MINUTES_PER_BATCH_UNIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_type_round_trip() {
        assert_eq!(ExportType::Manual.as_str(), "MANUAL");
        assert_eq!(ExportType::Scheduled.as_str(), "SCHEDULED");
        assert_eq!("MANUAL".parse::<ExportType>().unwrap(), ExportType::Manual);
        assert_eq!(
            "SCHEDULED".parse::<ExportType>().unwrap(),
            ExportType::Scheduled
        );
        assert!("MONTHLY".parse::<ExportType>().is_err());
    }

    #[test]
    fn test_export_status_round_trip() {
        for status in [
            ExportStatus::Pending,
            ExportStatus::Processing,
            ExportStatus::Sent,
            ExportStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExportStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ExportStatus>().is_err());
    }

    #[test]
    fn test_estimate_minutes() {
        assert_eq!(ExportSummary::estimate_minutes(0), 0);
        assert_eq!(ExportSummary::estimate_minutes(1), 2);
        assert_eq!(ExportSummary::estimate_minutes(20), 2);
        assert_eq!(ExportSummary::estimate_minutes(21), 4);
        assert_eq!(ExportSummary::estimate_minutes(100), 10);
    }

    #[test]
    fn test_empty_summary_reports_success() {
        let summary = ExportSummary::empty();
        assert!(summary.success);
        assert_eq!(summary.jobs_enqueued, 0);
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn test_batch_outcome_serialization() {
        let report = BatchReport {
            group: "Class A".to_string(),
            recipients: 3,
            outcome: BatchOutcome::Enqueued {
                job_id: "job_123".to_string(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "enqueued");
        assert_eq!(json["job_id"], "job_123");
        assert_eq!(json["recipients"], 3);

        let report = BatchReport {
            group: "Class B".to_string(),
            recipients: 2,
            outcome: BatchOutcome::NotEnqueued,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "not_enqueued");
    }
}
