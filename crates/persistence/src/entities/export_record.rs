//! Export record entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for export ledger rows.
#[derive(Debug, Clone, FromRow)]
pub struct ExportRecordEntity {
    pub id: Uuid,

    /// Recipient snapshot columns. Deliberately not foreign-key joins so
    /// renamed or deleted users leave history intact.
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,

    /// Stored as text: MANUAL or SCHEDULED.
    pub export_type: String,

    /// Stored as text: PENDING, PROCESSING, SENT or FAILED.
    pub status: String,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,

    pub destination_email: String,
    pub subject: String,
    pub recipients_count: i32,

    /// Worker job id. NULL until the enqueue call returned successfully.
    pub batch_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Aggregate row for the status dashboard.
#[derive(Debug, Clone, FromRow)]
pub struct ExportStatusCountEntity {
    pub status: String,
    pub export_type: String,
    pub count: i64,
}
