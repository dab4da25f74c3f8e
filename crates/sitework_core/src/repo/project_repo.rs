//! Project and project-statistics repositories (SQLite).
//!
//! # Responsibility
//! - Persist project aggregates with their embedded stats summary.
//! - Provide the two stats mutation primitives: single-field increment and
//!   wholesale rebuild from authoritative counts.
//!
//! # Invariants
//! - `progress_percent` is refreshed in the same transaction as any counter
//!   change.
//! - A rebuild counts sources and overwrites the summary inside one
//!   `IMMEDIATE` transaction, so no concurrent increment lands between the
//!   count and the write.

use crate::model::project::{Project, ProjectStats, StatField};
use crate::model::require_non_empty;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{new_record_id, NOW_MS_SQL};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const ENTITY: &str = "project";

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    total_tasks,
    completed_tasks,
    progress_percent,
    pending_stock,
    pending_decisions,
    critical_items,
    stats_recalculated_at,
    created_at
FROM projects";

const PROGRESS_REFRESH_SQL: &str = "UPDATE projects
SET progress_percent = CASE
    WHEN total_tasks > 0
        THEN (MIN(MAX(completed_tasks, 0), total_tasks) * 100) / total_tasks
    ELSE 0
END
WHERE id = ?1;";

const SOURCE_COUNTS_SQL: &str = "SELECT
    (SELECT COUNT(*) FROM work_items
        WHERE project_id = ?1) AS total_tasks,
    (SELECT COUNT(*) FROM work_items
        WHERE project_id = ?1 AND status = 'done') AS completed_tasks,
    (SELECT COUNT(*) FROM material_requests
        WHERE project_id = ?1 AND status IN ('approved', 'ordered')) AS pending_stock,
    (SELECT COUNT(*) FROM decision_records
        WHERE project_id = ?1 AND status = 'pending') AS pending_decisions,
    (SELECT COUNT(*) FROM work_items
        WHERE project_id = ?1
          AND status <> 'done'
          AND (priority = 'critical' OR is_emergency = 1)) AS critical_items;";

/// Authoritative counts read from source tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatSources {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_stock: i64,
    pub pending_decisions: i64,
    pub critical_items: i64,
}

/// Summary before and after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRebuild {
    pub previous: ProjectStats,
    pub current: ProjectStats,
}

/// Store contract for project documents.
pub trait ProjectRepository {
    fn create_project(&self, name: &str) -> RepoResult<Project>;
    fn get_project(&self, id: &str) -> RepoResult<Option<Project>>;
}

/// Store contract for the embedded stats summary.
pub trait StatsRepository {
    /// Atomic `field += delta`; `NotFound` for an unknown project.
    fn increment_stat(&self, project_id: &str, field: StatField, delta: i64)
        -> RepoResult<ProjectStats>;
    fn get_stats(&self, project_id: &str) -> RepoResult<Option<ProjectStats>>;
    /// Counts sources, derives a summary with `derive`, and overwrites the
    /// stored summary, all in one transaction.
    fn rebuild_stats(
        &self,
        project_id: &str,
        derive: &dyn Fn(&StatSources) -> ProjectStats,
    ) -> RepoResult<StatsRebuild>;
}

/// SQLite-backed project and stats repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, name: &str) -> RepoResult<Project> {
        require_non_empty("project.name", name)?;
        let id = new_record_id();
        self.conn.execute(
            "INSERT INTO projects (id, name) VALUES (?1, ?2);",
            params![id.as_str(), name.trim()],
        )?;
        self.get_project(&id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, id))
    }

    fn get_project(&self, id: &str) -> RepoResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_project_row,
            )
            .optional()?;
        if let Some(project) = project.as_ref() {
            project.validate()?;
        }
        Ok(project)
    }
}

impl StatsRepository for SqliteProjectRepository<'_> {
    fn increment_stat(
        &self,
        project_id: &str,
        field: StatField,
        delta: i64,
    ) -> RepoResult<ProjectStats> {
        let column = field.column();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            &format!("UPDATE projects SET {column} = {column} + ?2 WHERE id = ?1;"),
            params![project_id, delta],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(ENTITY, project_id));
        }
        tx.execute(PROGRESS_REFRESH_SQL, [project_id])?;
        let stats = read_stats(&tx, project_id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, project_id))?;
        tx.commit()?;
        Ok(stats)
    }

    fn get_stats(&self, project_id: &str) -> RepoResult<Option<ProjectStats>> {
        read_stats(self.conn, project_id)
    }

    fn rebuild_stats(
        &self,
        project_id: &str,
        derive: &dyn Fn(&StatSources) -> ProjectStats,
    ) -> RepoResult<StatsRebuild> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let previous = read_stats(&tx, project_id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, project_id))?;

        let sources = tx.query_row(SOURCE_COUNTS_SQL, [project_id], |row| {
            Ok(StatSources {
                total_tasks: row.get("total_tasks")?,
                completed_tasks: row.get("completed_tasks")?,
                pending_stock: row.get("pending_stock")?,
                pending_decisions: row.get("pending_decisions")?,
                critical_items: row.get("critical_items")?,
            })
        })?;
        let next = derive(&sources);

        tx.execute(
            &format!(
                "UPDATE projects
                 SET
                    total_tasks = ?2,
                    completed_tasks = ?3,
                    progress_percent = ?4,
                    pending_stock = ?5,
                    pending_decisions = ?6,
                    critical_items = ?7,
                    stats_recalculated_at = {NOW_MS_SQL}
                 WHERE id = ?1;"
            ),
            params![
                project_id,
                next.total_tasks,
                next.completed_tasks,
                next.progress_percent,
                next.pending_stock,
                next.pending_decisions,
                next.critical_items,
            ],
        )?;
        let current = read_stats(&tx, project_id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, project_id))?;
        tx.commit()?;

        Ok(StatsRebuild { previous, current })
    }
}

fn read_stats(conn: &Connection, project_id: &str) -> RepoResult<Option<ProjectStats>> {
    let stats = conn
        .query_row(
            &format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"),
            [project_id],
            parse_stats_columns,
        )
        .optional()?;
    Ok(stats)
}

fn parse_project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        stats: parse_stats_columns(row)?,
        created_at: row.get("created_at")?,
    })
}

fn parse_stats_columns(row: &Row<'_>) -> rusqlite::Result<ProjectStats> {
    Ok(ProjectStats {
        total_tasks: row.get("total_tasks")?,
        completed_tasks: row.get("completed_tasks")?,
        progress_percent: row.get("progress_percent")?,
        pending_stock: row.get("pending_stock")?,
        pending_decisions: row.get("pending_decisions")?,
        critical_items: row.get("critical_items")?,
        recalculated_at: row.get("stats_recalculated_at")?,
    })
}
