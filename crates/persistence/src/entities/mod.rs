//! Database entity definitions (row mappings).

pub mod export_record;
pub mod system_setting;
pub mod user;

pub use export_record::{ExportRecordEntity, ExportStatusCountEntity};
pub use system_setting::SystemSettingEntity;
pub use user::{CandidateEntity, UserEntity};
