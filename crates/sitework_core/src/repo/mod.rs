//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define per-aggregate store contracts used by the services.
//! - Isolate SQLite query details from completion orchestration.
//!
//! # Invariants
//! - Every write touches exactly one document; no repository call spans two
//!   aggregates.
//! - Read-modify-write paths are version-checked and surface `Conflict`
//!   for the caller's bounded retry.
//! - Rows are validated once on decode; invalid persisted state is an error.

pub mod activity_repo;
pub mod decision_repo;
pub mod error;
pub mod experience_repo;
pub mod inventory_repo;
pub mod material_repo;
pub mod project_repo;
pub mod retry;
mod row;
pub mod store;
pub mod work_item_repo;

pub use activity_repo::{ActivityRepository, SqliteActivityRepository};
pub use decision_repo::{DecisionRepository, SqliteDecisionRepository};
pub use error::{RepoError, RepoResult};
pub use experience_repo::{ExperienceRepository, SqliteExperienceRepository};
pub use inventory_repo::{
    IntentClaim, InventoryRepository, SettlementIntentRepository, SqliteInventoryRepository,
};
pub use material_repo::{MaterialRequestRepository, SqliteMaterialRequestRepository};
pub use project_repo::{
    ProjectRepository, SqliteProjectRepository, StatSources, StatsRebuild, StatsRepository,
};
pub use retry::retry_conflicts;
pub use store::SqliteLedgerStore;
pub use work_item_repo::{SqliteWorkItemRepository, WorkItemRepository};
