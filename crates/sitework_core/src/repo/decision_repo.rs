//! RFI/decision record repository (SQLite).

use crate::model::decision::{DecisionKind, DecisionRecord, DecisionStatus};
use crate::model::require_non_empty;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{new_record_id, parse_enum, NOW_MS_SQL};
use rusqlite::{params, Connection, Row};

const ENTITY: &str = "decision_record";

const DECISION_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    kind,
    title,
    status,
    raised_by,
    created_at,
    resolved_at
FROM decision_records";

/// Store contract for decision records.
pub trait DecisionRepository {
    fn create_decision(
        &self,
        project_id: &str,
        kind: DecisionKind,
        title: &str,
        raised_by: Option<&str>,
    ) -> RepoResult<DecisionRecord>;
    fn get_decision(&self, id: &str) -> RepoResult<Option<DecisionRecord>>;
    /// `pending -> resolved`; `InvalidTransition` when already resolved.
    fn resolve_decision(&self, id: &str) -> RepoResult<DecisionRecord>;
}

/// SQLite-backed decision repository.
pub struct SqliteDecisionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDecisionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require(&self, id: &str) -> RepoResult<DecisionRecord> {
        self.get_decision(id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, id))
    }
}

impl DecisionRepository for SqliteDecisionRepository<'_> {
    fn create_decision(
        &self,
        project_id: &str,
        kind: DecisionKind,
        title: &str,
        raised_by: Option<&str>,
    ) -> RepoResult<DecisionRecord> {
        require_non_empty("decision_record.title", title)?;
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
            "INSERT INTO decision_records (id, project_id, kind, title, status, raised_by)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5);",
            params![id.as_str(), project_id, kind.as_str(), title.trim(), raised_by],
        )?;
        self.require(&id)
    }

    fn get_decision(&self, id: &str) -> RepoResult<Option<DecisionRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DECISION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_decision_row(row)?));
        }
        Ok(None)
    }

    fn resolve_decision(&self, id: &str) -> RepoResult<DecisionRecord> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE decision_records
                 SET
                    status = 'resolved',
                    resolved_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND status = 'pending';"
            ),
            [id],
        )?;
        if changed == 0 {
            let current = self.require(id)?;
            return Err(RepoError::InvalidTransition {
                entity: ENTITY,
                id: id.to_string(),
                from: current.status.as_str(),
                to: DecisionStatus::Resolved.as_str(),
            });
        }
        self.require(id)
    }
}

fn parse_decision_row(row: &Row<'_>) -> RepoResult<DecisionRecord> {
    let kind_text: String = row.get("kind")?;
    let status_text: String = row.get("status")?;
    Ok(DecisionRecord {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        kind: parse_enum("decision_records.kind", &kind_text, DecisionKind::parse)?,
        title: row.get("title")?,
        status: parse_enum("decision_records.status", &status_text, DecisionStatus::parse)?,
        raised_by: row.get("raised_by")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
    })
}
