//! Append-only activity log repository (SQLite).
//!
//! # Invariants
//! - Insert is the only write; the schema rejects UPDATE/DELETE by trigger.
//! - Feed reads are ordered by insertion sequence, newest first.

use crate::model::activity::{ActivityKind, ActivityMetadata, ActivityRecord, NewActivity};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{new_record_id, parse_enum};
use rusqlite::{params, Connection, Row};

const ACTIVITY_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    kind,
    description,
    metadata,
    actor,
    created_at
FROM activity_log";

const FEED_LIMIT_MAX: u32 = 200;

/// Store contract for the activity log.
pub trait ActivityRepository {
    fn append(&self, activity: &NewActivity) -> RepoResult<ActivityRecord>;
    /// Newest-first feed for one project.
    fn list_for_project(&self, project_id: &str, limit: u32) -> RepoResult<Vec<ActivityRecord>>;
}

/// SQLite-backed activity repository.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn append(&self, activity: &NewActivity) -> RepoResult<ActivityRecord> {
        activity.validate()?;
        let id = new_record_id();
        let metadata = serde_json::to_string(&activity.metadata)?;
        self.conn.execute(
            "INSERT INTO activity_log (
                id,
                project_id,
                kind,
                description,
                metadata,
                actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.as_str(),
                activity.project_id.as_deref(),
                activity.kind.as_str(),
                activity.description.as_str(),
                metadata,
                activity.actor.as_deref(),
            ],
        )?;

        let mut stmt = self
            .conn
            .prepare(&format!("{ACTIVITY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        match rows.next()? {
            Some(row) => parse_activity_row(row),
            None => Err(RepoError::not_found("activity", id)),
        }
    }

    fn list_for_project(&self, project_id: &str, limit: u32) -> RepoResult<Vec<ActivityRecord>> {
        let limit = limit.clamp(1, FEED_LIMIT_MAX);
        let mut stmt = self.conn.prepare(&format!(
            "{ACTIVITY_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY seq DESC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![project_id, i64::from(limit)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_activity_row(row)?);
        }
        Ok(records)
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<ActivityRecord> {
    let kind_text: String = row.get("kind")?;
    let metadata_text: String = row.get("metadata")?;
    let metadata: ActivityMetadata = serde_json::from_str(&metadata_text)?;

    Ok(ActivityRecord {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        kind: parse_enum("activity_log.kind", &kind_text, ActivityKind::parse)?,
        description: row.get("description")?,
        metadata,
        actor: row.get("actor")?,
        created_at: row.get("created_at")?,
    })
}
