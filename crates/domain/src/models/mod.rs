//! Domain model definitions.

pub mod export_record;
pub mod user;
pub mod worker_job;

pub use export_record::{
    BatchOutcome, BatchReport, ExportRecord, ExportStatus, ExportSummary, ExportType,
    ReportingWindow,
};
pub use user::{ExportCandidate, User, UserRole};
pub use worker_job::{EnqueueJobRequest, JobHandle, JobPayload, WorkerJobStatus};
