//! Export record repository for database operations.
//!
//! The export ledger is append-mostly: rows are inserted PENDING, later
//! linked to a worker job id, and only ever updated by reconciliation.
//! Nothing here deletes rows.

use std::str::FromStr;

use domain::models::{ExportCandidate, ExportRecord, ExportStatus, ExportType, ReportingWindow};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::entities::{ExportRecordEntity, ExportStatusCountEntity};

/// Filter for ledger queries.
#[derive(Debug, Clone, Default)]
pub struct ExportRecordFilter {
    pub user_id: Option<Uuid>,
    pub export_type: Option<ExportType>,
    pub status: Option<ExportStatus>,
}

/// Aggregate count for one (status, type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportStatusCount {
    pub status: ExportStatus,
    pub export_type: ExportType,
    pub count: i64,
}

/// Repository for export ledger database operations.
#[derive(Clone)]
pub struct ExportRecordRepository {
    pool: PgPool,
}

impl ExportRecordRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one PENDING record per candidate as a single multi-row write.
    ///
    /// A single statement keeps a batch from becoming partially visible.
    /// batch_id is left NULL; it is only filled in once the worker has
    /// accepted the job.
    pub async fn create_pending_batch(
        &self,
        candidates: &[ExportCandidate],
        export_type: ExportType,
        window: ReportingWindow,
        destination_email: &str,
        subject: &str,
    ) -> Result<Vec<ExportRecord>, sqlx::Error> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let recipients_count = candidates.len() as i32;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO export_records \
             (user_id, user_email, user_name, export_type, status, start_date, end_date, \
              destination_email, subject, recipients_count) ",
        );

        builder.push_values(candidates, |mut row, candidate| {
            row.push_bind(candidate.user_id)
                .push_bind(&candidate.email)
                .push_bind(&candidate.name)
                .push_bind(export_type.as_str())
                .push_bind(ExportStatus::Pending.as_str())
                .push_bind(window.start_date)
                .push_bind(window.end_date)
                .push_bind(destination_email)
                .push_bind(subject)
                .push_bind(recipients_count);
        });

        builder.push(
            " RETURNING id, user_id, user_email, user_name, export_type, status, \
             start_date, end_date, destination_email, subject, recipients_count, \
             batch_id, created_at",
        );

        let entities = builder
            .build_query_as::<ExportRecordEntity>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entities.into_iter().map(entity_to_domain).collect())
    }

    /// Attach a worker job id to a set of records.
    ///
    /// Idempotent: only rows whose batch_id is still NULL (or already equal
    /// to this job id) are touched, so a retry can never overwrite a linkage
    /// with a different id. Returns the number of rows updated.
    pub async fn attach_job(
        &self,
        record_ids: &[Uuid],
        job_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE export_records
            SET batch_id = $2
            WHERE id = ANY($1) AND (batch_id IS NULL OR batch_id = $2)
            "#,
        )
        .bind(record_ids)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        if (updated as usize) < record_ids.len() {
            tracing::warn!(
                "Attached job {} to {} of {} records; the rest were already linked elsewhere",
                job_id,
                updated,
                record_ids.len()
            );
        }

        Ok(updated)
    }

    /// Query ledger rows with optional filters, newest first.
    pub async fn query(
        &self,
        filter: &ExportRecordFilter,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, user_id, user_email, user_name, export_type, status, \
             start_date, end_date, destination_email, subject, recipients_count, \
             batch_id, created_at \
             FROM export_records WHERE 1 = 1",
        );

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(export_type) = filter.export_type {
            builder.push(" AND export_type = ").push_bind(export_type.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let entities = builder
            .build_query_as::<ExportRecordEntity>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entities.into_iter().map(entity_to_domain).collect())
    }

    /// Aggregate counts grouped by (status, type) for the dashboard.
    pub async fn count_by_status_and_type(&self) -> Result<Vec<ExportStatusCount>, sqlx::Error> {
        let entities = sqlx::query_as::<_, ExportStatusCountEntity>(
            r#"
            SELECT status, export_type, COUNT(*) AS count
            FROM export_records
            GROUP BY status, export_type
            ORDER BY status, export_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entities
            .into_iter()
            .filter_map(|entity| {
                // Rows with unparseable enum text would predate this schema;
                // skip them rather than fail the whole dashboard.
                let status = ExportStatus::from_str(&entity.status).ok()?;
                let export_type = ExportType::from_str(&entity.export_type).ok()?;
                Some(ExportStatusCount {
                    status,
                    export_type,
                    count: entity.count,
                })
            })
            .collect())
    }

    /// Distinct job ids of records still awaiting a terminal status.
    ///
    /// Feed for the reconciliation poller.
    pub async fn open_batch_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT batch_id
            FROM export_records
            WHERE batch_id IS NOT NULL AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Move every record of a batch to the given status.
    ///
    /// Terminal statuses stick: a record already SENT or FAILED is never
    /// pulled back by a late poll.
    pub async fn update_status_for_batch(
        &self,
        batch_id: &str,
        status: ExportStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE export_records
            SET status = $2
            WHERE batch_id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(batch_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn entity_to_domain(entity: ExportRecordEntity) -> ExportRecord {
    ExportRecord {
        id: entity.id,
        user_id: entity.user_id,
        user_email: entity.user_email,
        user_name: entity.user_name,
        export_type: ExportType::from_str(&entity.export_type).unwrap_or(ExportType::Manual),
        status: ExportStatus::from_str(&entity.status).unwrap_or(ExportStatus::Pending),
        start_date: entity.start_date,
        end_date: entity.end_date,
        destination_email: entity.destination_email,
        subject: entity.subject,
        recipients_count: entity.recipients_count,
        batch_id: entity.batch_id,
        created_at: entity.created_at,
    }
}
