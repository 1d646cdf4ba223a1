//! Worker job API types.
//!
//! The worker owns job state; this backend only caches job ids on the
//! export ledger. These types mirror the worker's wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::export_record::{ExportType, ParseEnumError};

/// Job status as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkerJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerJobStatus::Pending => "PENDING",
            WorkerJobStatus::Processing => "PROCESSING",
            WorkerJobStatus::Completed => "COMPLETED",
            WorkerJobStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for WorkerJobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WorkerJobStatus::Pending),
            "PROCESSING" => Ok(WorkerJobStatus::Processing),
            "COMPLETED" => Ok(WorkerJobStatus::Completed),
            "FAILED" => Ok(WorkerJobStatus::Failed),
            _ => Err(ParseEnumError {
                kind: "worker job status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkerJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of an export job sent to the worker.
///
/// The worker fetches transactions itself; the payload carries only the
/// recipient ids, the reporting window and delivery details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub user_ids: Vec<Uuid>,
    pub group_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub to_email: String,
    pub subject: String,
}

/// Request body for `POST /api/v1/jobs/enqueue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueJobRequest {
    #[serde(rename = "type")]
    pub job_type: ExportType,
    pub priority: i32,
    pub payload: JobPayload,
}

/// A job as reported by the worker's status and queue endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub status: WorkerJobStatus,
    #[serde(default)]
    pub priority: i32,
    /// Echo of the submitted payload, if the worker returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
