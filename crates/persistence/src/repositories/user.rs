//! User repository for database operations.

use std::str::FromStr;

use domain::models::{ExportCandidate, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{CandidateEntity, UserEntity};

/// Repository for user database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by id.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let entity = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, email, name, role, cohort_id, auto_export_consent, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(entity_to_domain))
    }

    /// Fetch all students with their cohort names, as export candidates.
    ///
    /// Consent filtering happens in the eligibility engine, not here, so the
    /// gate stays in one place.
    pub async fn find_student_candidates(&self) -> Result<Vec<ExportCandidate>, sqlx::Error> {
        let entities = sqlx::query_as::<_, CandidateEntity>(
            r#"
            SELECT u.id, u.email, u.name, u.role, c.name AS cohort_name, u.auto_export_consent
            FROM users u
            LEFT JOIN cohorts c ON c.id = u.cohort_id
            WHERE u.role = 'STUDENT'
            ORDER BY c.name NULLS LAST, u.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(candidate_to_domain).collect())
    }

    /// Fetch a single user as an export candidate (manual trigger path).
    pub async fn find_candidate_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ExportCandidate>, sqlx::Error> {
        let entity = sqlx::query_as::<_, CandidateEntity>(
            r#"
            SELECT u.id, u.email, u.name, u.role, c.name AS cohort_name, u.auto_export_consent
            FROM users u
            LEFT JOIN cohorts c ON c.id = u.cohort_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(candidate_to_domain))
    }

    /// Update a user's scheduled-export consent flag.
    ///
    /// Returns false if the user does not exist.
    pub async fn update_export_consent(
        &self,
        user_id: Uuid,
        consent: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET auto_export_consent = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(consent)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn entity_to_domain(entity: UserEntity) -> User {
    User {
        id: entity.id,
        email: entity.email,
        name: entity.name,
        role: UserRole::from_str(&entity.role).unwrap_or(UserRole::Student),
        cohort_id: entity.cohort_id,
        auto_export_consent: entity.auto_export_consent,
        created_at: entity.created_at,
    }
}

fn candidate_to_domain(entity: CandidateEntity) -> ExportCandidate {
    ExportCandidate {
        user_id: entity.id,
        email: entity.email,
        name: entity.name,
        role: UserRole::from_str(&entity.role).unwrap_or(UserRole::Student),
        cohort_name: entity.cohort_name,
        auto_export_consent: entity.auto_export_consent,
    }
}
