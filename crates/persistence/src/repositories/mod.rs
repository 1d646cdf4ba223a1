//! Repository implementations for database access.

pub mod export_record;
pub mod system_setting;
pub mod transaction;
pub mod user;

pub use export_record::{ExportRecordFilter, ExportRecordRepository, ExportStatusCount};
pub use system_setting::SystemSettingRepository;
pub use transaction::TransactionRepository;
pub use user::UserRepository;
