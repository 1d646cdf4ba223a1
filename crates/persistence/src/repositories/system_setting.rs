//! System setting repository.

use sqlx::PgPool;

use crate::entities::SystemSettingEntity;

/// Setting key for the administrative mailbox that receives export reports.
/// Overrides the configured destination email when present.
pub const ADMIN_NOTIFICATION_EMAIL: &str = "admin_notification_email";

/// Repository for key/value system settings.
#[derive(Clone)]
pub struct SystemSettingRepository {
    pool: PgPool,
}

impl SystemSettingRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a setting value by key.
    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let entity = sqlx::query_as::<_, SystemSettingEntity>(
            r#"
            SELECT key, value, updated_at
            FROM system_settings
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.value))
    }

    /// Insert or update a setting.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
