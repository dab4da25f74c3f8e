//! Task-completion consistency engine for site work tracking.
//!
//! Marking a work item done touches four aggregates (the work item, the
//! actor's experience account, global stock, project statistics) without a
//! cross-aggregate transaction. The completion orchestrator runs one fatal
//! transition followed by best-effort steps and reports what still needs a
//! retry.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig, PriorityBonus, RetryPolicy};
pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbOptions};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::experience::{level_for, ExperienceAccount};
pub use model::material::{MaterialRequest, MaterialStatus, NewMaterialRequest};
pub use model::project::{Project, ProjectStats, StatField};
pub use model::work_item::{NewWorkItem, Priority, WorkItem, WorkItemStatus};
pub use model::ValidationError;
pub use repo::{RepoError, RepoResult, SqliteLedgerStore};
pub use service::completion::{
    experience_reward, CompletionError, CompletionOrchestrator, CompletionResult, FailedStep,
};
pub use service::experience_ledger::ExperienceLedger;
pub use service::inventory_reconciliation::{
    InventoryReconciler, SettlementOutcome, SettlementReport,
};
pub use service::project_workflows::ProjectWorkflows;
pub use service::stats_aggregator::StatsAggregator;

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
