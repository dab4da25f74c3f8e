//! Bundle of SQLite repositories sharing one invocation-scoped connection.

use crate::repo::activity_repo::SqliteActivityRepository;
use crate::repo::decision_repo::SqliteDecisionRepository;
use crate::repo::experience_repo::SqliteExperienceRepository;
use crate::repo::inventory_repo::SqliteInventoryRepository;
use crate::repo::material_repo::SqliteMaterialRequestRepository;
use crate::repo::project_repo::SqliteProjectRepository;
use crate::repo::work_item_repo::SqliteWorkItemRepository;
use rusqlite::Connection;

/// Every ledger repository over the same connection.
///
/// Services borrow individual fields as trait objects.
pub struct SqliteLedgerStore<'conn> {
    pub projects: SqliteProjectRepository<'conn>,
    pub work_items: SqliteWorkItemRepository<'conn>,
    pub experience: SqliteExperienceRepository<'conn>,
    pub inventory: SqliteInventoryRepository<'conn>,
    pub materials: SqliteMaterialRequestRepository<'conn>,
    pub activity: SqliteActivityRepository<'conn>,
    pub decisions: SqliteDecisionRepository<'conn>,
}

impl<'conn> SqliteLedgerStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            projects: SqliteProjectRepository::new(conn),
            work_items: SqliteWorkItemRepository::new(conn),
            experience: SqliteExperienceRepository::new(conn),
            inventory: SqliteInventoryRepository::new(conn),
            materials: SqliteMaterialRequestRepository::new(conn),
            activity: SqliteActivityRepository::new(conn),
            decisions: SqliteDecisionRepository::new(conn),
        }
    }
}
