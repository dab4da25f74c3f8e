//! Work item repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist work items scoped to a project.
//! - Provide the version-checked `done` transition used by completion.
//!
//! # Invariants
//! - `mark_done` only succeeds when the stored version matches and the item is
//!   not already done; it bumps `version` in the same statement.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::model::work_item::{
    NewWorkItem, Priority, WorkItem, WorkItemFlags, WorkItemStatus, DEFAULT_XP_BASE,
};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{bool_to_int, int_to_bool, new_record_id, parse_enum, NOW_MS_SQL};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTITY: &str = "work_item";

const WORK_ITEM_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    title,
    status,
    priority,
    assignee,
    xp_base,
    is_delayed,
    is_on_hold,
    is_emergency,
    created_at,
    completed_at,
    completed_by,
    version
FROM work_items";

/// Store contract for work item documents.
pub trait WorkItemRepository {
    fn create_work_item(&self, project_id: &str, input: &NewWorkItem) -> RepoResult<WorkItem>;
    fn get_work_item(&self, project_id: &str, id: &str) -> RepoResult<Option<WorkItem>>;
    fn list_work_items(&self, project_id: &str) -> RepoResult<Vec<WorkItem>>;
    /// Conditional transition to `done`, guarded by `expected_version`.
    ///
    /// Returns `Conflict` when another writer changed the item first.
    fn mark_done(
        &self,
        project_id: &str,
        id: &str,
        expected_version: i64,
        actor_id: &str,
    ) -> RepoResult<WorkItem>;
}

/// SQLite-backed work item repository.
pub struct SqliteWorkItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require(&self, project_id: &str, id: &str) -> RepoResult<WorkItem> {
        self.get_work_item(project_id, id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, id))
    }
}

impl WorkItemRepository for SqliteWorkItemRepository<'_> {
    fn create_work_item(&self, project_id: &str, input: &NewWorkItem) -> RepoResult<WorkItem> {
        input.validate()?;
        let project_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);",
            [project_id],
            |row| row.get(0),
        )?;
        if project_exists == 0 {
            return Err(RepoError::not_found("project", project_id));
        }

        let id = new_record_id();
        self.conn.execute(
            "INSERT INTO work_items (
                id,
                project_id,
                title,
                status,
                priority,
                assignee,
                xp_base,
                is_delayed,
                is_on_hold,
                is_emergency
            ) VALUES (?1, ?2, ?3, 'todo', ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                id.as_str(),
                project_id,
                input.title.trim(),
                input.priority.as_str(),
                input.assignee.as_deref(),
                input.xp_base.unwrap_or(DEFAULT_XP_BASE),
                bool_to_int(input.flags.delayed),
                bool_to_int(input.flags.on_hold),
                bool_to_int(input.flags.emergency),
            ],
        )?;

        self.require(project_id, &id)
    }

    fn get_work_item(&self, project_id: &str, id: &str) -> RepoResult<Option<WorkItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORK_ITEM_SELECT_SQL}
             WHERE id = ?1
               AND project_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![id, project_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_work_item_row(row)?));
        }
        Ok(None)
    }

    fn list_work_items(&self, project_id: &str) -> RepoResult<Vec<WorkItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORK_ITEM_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([project_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_work_item_row(row)?);
        }
        Ok(items)
    }

    fn mark_done(
        &self,
        project_id: &str,
        id: &str,
        expected_version: i64,
        actor_id: &str,
    ) -> RepoResult<WorkItem> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE work_items
                 SET
                    status = 'done',
                    completed_at = {NOW_MS_SQL},
                    completed_by = ?4,
                    version = version + 1
                 WHERE id = ?1
                   AND project_id = ?2
                   AND version = ?3
                   AND status <> 'done';"
            ),
            params![id, project_id, expected_version, actor_id],
        )?;

        if changed == 0 {
            let current: Option<String> = self
                .conn
                .query_row(
                    "SELECT status FROM work_items WHERE id = ?1 AND project_id = ?2;",
                    params![id, project_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current.as_deref() {
                None => RepoError::not_found(ENTITY, id),
                Some("done") => RepoError::InvalidTransition {
                    entity: ENTITY,
                    id: id.to_string(),
                    from: WorkItemStatus::Done.as_str(),
                    to: WorkItemStatus::Done.as_str(),
                },
                Some(_) => RepoError::conflict(ENTITY, id),
            });
        }

        self.require(project_id, id)
    }
}

fn parse_work_item_row(row: &Row<'_>) -> RepoResult<WorkItem> {
    let status_text: String = row.get("status")?;
    let priority_text: String = row.get("priority")?;

    let item = WorkItem {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        status: parse_enum("work_items.status", &status_text, WorkItemStatus::parse)?,
        priority: parse_enum("work_items.priority", &priority_text, Priority::parse)?,
        assignee: row.get("assignee")?,
        xp_base: row.get("xp_base")?,
        flags: WorkItemFlags {
            delayed: int_to_bool("work_items.is_delayed", row.get("is_delayed")?)?,
            on_hold: int_to_bool("work_items.is_on_hold", row.get("is_on_hold")?)?,
            emergency: int_to_bool("work_items.is_emergency", row.get("is_emergency")?)?,
        },
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        completed_by: row.get("completed_by")?,
        version: row.get("version")?,
    };
    item.validate()?;
    Ok(item)
}
