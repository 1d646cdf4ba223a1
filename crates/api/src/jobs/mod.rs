//! Background job scheduler and job implementations.

mod reconcile_exports;
mod scheduled_export;
mod scheduler;

pub use reconcile_exports::ExportReconciliationJob;
pub use scheduled_export::ScheduledExportJob;
pub use scheduler::JobScheduler;
