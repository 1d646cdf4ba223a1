//! System setting entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database entity for key/value system settings.
#[derive(Debug, Clone, FromRow)]
pub struct SystemSettingEntity {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
