//! Material request repository contract and SQLite implementation.
//!
//! # Invariants
//! - `mark_stock_deducted` only flips a flag that is currently `false`; a
//!   settled request can never be re-settled through this path.
//! - Status changes are conditional on the status the caller last read.

use crate::model::material::{MaterialRequest, MaterialStatus, NewMaterialRequest};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{int_to_bool, new_record_id, parse_enum, NOW_MS_SQL};
use rusqlite::{params, Connection, Row};

const ENTITY: &str = "material_request";

const REQUEST_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    work_item_id,
    item_name,
    quantity,
    status,
    stock_deducted,
    deducted_at,
    created_at
FROM material_requests";

/// Store contract for material request documents.
pub trait MaterialRequestRepository {
    fn create_request(
        &self,
        project_id: &str,
        input: &NewMaterialRequest,
    ) -> RepoResult<MaterialRequest>;
    fn get_request(&self, id: &str) -> RepoResult<Option<MaterialRequest>>;
    /// Requests linked to one work item in one status, oldest first.
    fn list_for_work_item(
        &self,
        project_id: &str,
        work_item_id: &str,
        status: MaterialStatus,
    ) -> RepoResult<Vec<MaterialRequest>>;
    fn list_for_project(&self, project_id: &str) -> RepoResult<Vec<MaterialRequest>>;
    /// Sets `status` only if the stored status is still `expected`.
    fn update_status(
        &self,
        id: &str,
        expected: MaterialStatus,
        next: MaterialStatus,
    ) -> RepoResult<MaterialRequest>;
    /// Sets `stock_deducted` and its timestamp only if currently unset.
    ///
    /// Returns `true` when this call flipped the flag, `false` when it was
    /// already set.
    fn mark_stock_deducted(&self, id: &str) -> RepoResult<bool>;
    fn delete_request(&self, id: &str) -> RepoResult<MaterialRequest>;
}

/// SQLite-backed material request repository.
pub struct SqliteMaterialRequestRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMaterialRequestRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require(&self, id: &str) -> RepoResult<MaterialRequest> {
        self.get_request(id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, id))
    }

    fn query_requests(
        &self,
        filter_sql: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> RepoResult<Vec<MaterialRequest>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REQUEST_SELECT_SQL} {filter_sql}"))?;
        let mut rows = stmt.query(bind)?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next()? {
            requests.push(parse_request_row(row)?);
        }
        Ok(requests)
    }
}

impl MaterialRequestRepository for SqliteMaterialRequestRepository<'_> {
    fn create_request(
        &self,
        project_id: &str,
        input: &NewMaterialRequest,
    ) -> RepoResult<MaterialRequest> {
        input.validate()?;
        let project_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);",
            [project_id],
            |row| row.get(0),
        )?;
        if project_exists == 0 {
            return Err(RepoError::not_found("project", project_id));
        }
        if let Some(work_item_id) = input.work_item_id.as_deref() {
            let work_item_exists: i64 = self.conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM work_items WHERE id = ?1 AND project_id = ?2
                );",
                params![work_item_id, project_id],
                |row| row.get(0),
            )?;
            if work_item_exists == 0 {
                return Err(RepoError::not_found("work_item", work_item_id));
            }
        }

        let id = new_record_id();
        self.conn.execute(
            "INSERT INTO material_requests (
                id,
                project_id,
                work_item_id,
                item_name,
                quantity,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'requested');",
            params![
                id.as_str(),
                project_id,
                input.work_item_id.as_deref(),
                input.item_name.trim(),
                input.quantity.trim(),
            ],
        )?;
        self.require(&id)
    }

    fn get_request(&self, id: &str) -> RepoResult<Option<MaterialRequest>> {
        let mut requests = self.query_requests("WHERE id = ?1;", params![id])?;
        Ok(requests.pop())
    }

    fn list_for_work_item(
        &self,
        project_id: &str,
        work_item_id: &str,
        status: MaterialStatus,
    ) -> RepoResult<Vec<MaterialRequest>> {
        self.query_requests(
            "WHERE project_id = ?1
               AND work_item_id = ?2
               AND status = ?3
             ORDER BY created_at ASC, id ASC;",
            params![project_id, work_item_id, status.as_str()],
        )
    }

    fn list_for_project(&self, project_id: &str) -> RepoResult<Vec<MaterialRequest>> {
        self.query_requests(
            "WHERE project_id = ?1
             ORDER BY created_at ASC, id ASC;",
            params![project_id],
        )
    }

    fn update_status(
        &self,
        id: &str,
        expected: MaterialStatus,
        next: MaterialStatus,
    ) -> RepoResult<MaterialRequest> {
        let changed = self.conn.execute(
            "UPDATE material_requests
             SET status = ?3
             WHERE id = ?1
               AND status = ?2;",
            params![id, expected.as_str(), next.as_str()],
        )?;
        if changed == 0 {
            self.require(id)?;
            return Err(RepoError::conflict(ENTITY, id));
        }
        self.require(id)
    }

    fn mark_stock_deducted(&self, id: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE material_requests
                 SET
                    stock_deducted = 1,
                    deducted_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND stock_deducted = 0;"
            ),
            [id],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        self.require(id)?;
        Ok(false)
    }

    fn delete_request(&self, id: &str) -> RepoResult<MaterialRequest> {
        let existing = self.require(id)?;
        let changed = self
            .conn
            .execute("DELETE FROM material_requests WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found(ENTITY, id));
        }
        Ok(existing)
    }
}

fn parse_request_row(row: &Row<'_>) -> RepoResult<MaterialRequest> {
    let status_text: String = row.get("status")?;
    let request = MaterialRequest {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        work_item_id: row.get("work_item_id")?,
        item_name: row.get("item_name")?,
        quantity: row.get("quantity")?,
        status: parse_enum("material_requests.status", &status_text, MaterialStatus::parse)?,
        stock_deducted: int_to_bool("material_requests.stock_deducted", row.get("stock_deducted")?)?,
        deducted_at: row.get("deducted_at")?,
        created_at: row.get("created_at")?,
    };
    request.validate()?;
    Ok(request)
}
