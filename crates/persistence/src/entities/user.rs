//! User entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for user rows.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Stored as text: STUDENT or ADMIN.
    pub role: String,
    pub cohort_id: Option<Uuid>,
    pub auto_export_consent: bool,
    pub created_at: DateTime<Utc>,
}

/// Row shape for export candidate queries (user joined with cohort name).
#[derive(Debug, Clone, FromRow)]
pub struct CandidateEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub cohort_name: Option<String>,
    pub auto_export_consent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_entity_creation() {
        let entity = CandidateEntity {
            id: Uuid::new_v4(),
            email: "student@example.com".to_string(),
            name: "Student".to_string(),
            role: "STUDENT".to_string(),
            cohort_name: Some("Class A".to_string()),
            auto_export_consent: true,
        };
        assert_eq!(entity.role, "STUDENT");
        assert_eq!(entity.cohort_name.as_deref(), Some("Class A"));
    }
}
