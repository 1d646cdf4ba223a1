//! Service layer: worker transport and export orchestration.

pub mod export_orchestrator;
pub mod worker_client;

pub use export_orchestrator::{
    CandidateSource, ExportLedger, ExportOrchestrator, ExportSettings, ExportTrigger,
    OrchestrationError,
};
pub use worker_client::{HttpWorkerClient, WorkerApi, WorkerClientError, WorkerHealth};
