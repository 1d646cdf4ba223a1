//! Transaction repository.
//!
//! Transaction CRUD lives elsewhere; the orchestration layer only needs the
//! earliest transaction date to bound a manual export's reporting window.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for transaction queries used by export orchestration.
#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Date of the user's first transaction, if they have any.
    pub async fn earliest_date_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT MIN(occurred_at)
            FROM transactions
            WHERE user_id = $1
            HAVING MIN(occurred_at) IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(date,)| date))
    }
}
