//! Inventory and settlement-intent repositories (SQLite).
//!
//! # Responsibility
//! - Hold the global per-item stock rows and apply relative adjustments.
//! - Persist settlement intents that bracket each stock decrement.
//!
//! # Invariants
//! - Stock quantity is only ever changed by a relative `quantity + delta`
//!   statement; no absolute overwrite path exists.
//! - Rows are created only by `register_item`, never by an adjustment.
//! - At most one intent exists per material request (primary key).

use crate::model::material::{InventoryItem, IntentState, MaterialRequest, SettlementIntent};
use crate::model::require_non_empty;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::{parse_enum, NOW_MS_SQL};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ITEM_ENTITY: &str = "inventory_item";
const INTENT_ENTITY: &str = "settlement_intent";

const INTENT_SELECT_SQL: &str = "SELECT
    request_id,
    project_id,
    item_name,
    quantity,
    state,
    created_at,
    updated_at
FROM settlement_intents";

/// Store contract for global stock rows.
pub trait InventoryRepository {
    fn register_item(
        &self,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
    ) -> RepoResult<InventoryItem>;
    /// Exact-name lookup.
    fn get_item(&self, name: &str) -> RepoResult<Option<InventoryItem>>;
    fn list_items(&self) -> RepoResult<Vec<InventoryItem>>;
    /// Atomic relative adjustment returning the updated row.
    ///
    /// `NotFound` means no row has this name and nothing was written; any
    /// other error leaves the write state unknown.
    fn adjust_quantity(&self, name: &str, delta: f64) -> RepoResult<InventoryItem>;
}

/// Outcome of trying to claim a settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentClaim {
    /// This caller now owns the settlement.
    Claimed(SettlementIntent),
    /// An intent already existed; the caller does not own it.
    Existing(SettlementIntent),
}

/// Store contract for settlement intents.
pub trait SettlementIntentRepository {
    /// Conditionally inserts a `claimed` intent for the request.
    fn claim_intent(&self, request: &MaterialRequest, quantity: f64) -> RepoResult<IntentClaim>;
    fn get_intent(&self, request_id: &str) -> RepoResult<Option<SettlementIntent>>;
    /// Moves an intent forward only if it is currently in `from`.
    fn advance_intent(&self, request_id: &str, from: IntentState, to: IntentState)
        -> RepoResult<()>;
    /// Drops an intent still in `claimed`, used only when the decrement it
    /// guarded is known not to have been applied. Returns whether a row was
    /// removed.
    fn release_intent(&self, request_id: &str) -> RepoResult<bool>;
    /// Intents not yet `settled`, oldest first.
    fn list_unsettled_intents(&self) -> RepoResult<Vec<SettlementIntent>>;
}

/// SQLite-backed inventory and intent repository.
pub struct SqliteInventoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInventoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl InventoryRepository for SqliteInventoryRepository<'_> {
    fn register_item(
        &self,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
    ) -> RepoResult<InventoryItem> {
        require_non_empty("inventory_item.name", name)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO inventory_items (name, quantity, unit)
             VALUES (?1, ?2, ?3);",
            params![name, quantity, unit],
        )?;
        if inserted == 0 {
            return Err(RepoError::AlreadyExists {
                entity: ITEM_ENTITY,
                id: name.to_string(),
            });
        }
        self.get_item(name)?
            .ok_or_else(|| RepoError::not_found(ITEM_ENTITY, name))
    }

    fn get_item(&self, name: &str) -> RepoResult<Option<InventoryItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT name, quantity, unit, updated_at
                 FROM inventory_items
                 WHERE name = ?1;",
                [name],
                parse_item_row,
            )
            .optional()?;
        Ok(item)
    }

    fn list_items(&self) -> RepoResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, quantity, unit, updated_at
             FROM inventory_items
             ORDER BY name ASC;",
        )?;
        let items = stmt
            .query_map([], parse_item_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn adjust_quantity(&self, name: &str, delta: f64) -> RepoResult<InventoryItem> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "UPDATE inventory_items
                     SET
                        quantity = quantity + ?2,
                        updated_at = {NOW_MS_SQL}
                     WHERE name = ?1
                     RETURNING name, quantity, unit, updated_at;"
                ),
                params![name, delta],
                parse_item_row,
            )
            .optional()?;
        item.ok_or_else(|| RepoError::not_found(ITEM_ENTITY, name))
    }
}

impl SettlementIntentRepository for SqliteInventoryRepository<'_> {
    fn claim_intent(&self, request: &MaterialRequest, quantity: f64) -> RepoResult<IntentClaim> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO settlement_intents (
                request_id,
                project_id,
                item_name,
                quantity,
                state
            ) VALUES (?1, ?2, ?3, ?4, 'claimed');",
            params![
                request.id.as_str(),
                request.project_id.as_str(),
                request.item_name.as_str(),
                quantity,
            ],
        )?;

        let intent = self
            .get_intent(&request.id)?
            .ok_or_else(|| RepoError::not_found(INTENT_ENTITY, request.id.as_str()))?;
        if inserted == 0 {
            return Ok(IntentClaim::Existing(intent));
        }
        Ok(IntentClaim::Claimed(intent))
    }

    fn get_intent(&self, request_id: &str) -> RepoResult<Option<SettlementIntent>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INTENT_SELECT_SQL} WHERE request_id = ?1;"))?;
        let mut rows = stmt.query([request_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_intent_row(row)?));
        }
        Ok(None)
    }

    fn advance_intent(
        &self,
        request_id: &str,
        from: IntentState,
        to: IntentState,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE settlement_intents
                 SET
                    state = ?3,
                    updated_at = {NOW_MS_SQL}
                 WHERE request_id = ?1
                   AND state = ?2;"
            ),
            params![request_id, from.as_str(), to.as_str()],
        )?;
        if changed == 0 {
            let current = self
                .get_intent(request_id)?
                .ok_or_else(|| RepoError::not_found(INTENT_ENTITY, request_id))?;
            return Err(RepoError::InvalidTransition {
                entity: INTENT_ENTITY,
                id: request_id.to_string(),
                from: current.state.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    fn release_intent(&self, request_id: &str) -> RepoResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM settlement_intents
             WHERE request_id = ?1
               AND state = 'claimed';",
            [request_id],
        )?;
        Ok(removed == 1)
    }

    fn list_unsettled_intents(&self) -> RepoResult<Vec<SettlementIntent>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INTENT_SELECT_SQL}
             WHERE state <> 'settled'
             ORDER BY created_at ASC, request_id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut intents = Vec::new();
        while let Some(row) = rows.next()? {
            intents.push(parse_intent_row(row)?);
        }
        Ok(intents)
    }
}

fn parse_item_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        name: row.get("name")?,
        quantity: row.get("quantity")?,
        unit: row.get("unit")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_intent_row(row: &Row<'_>) -> RepoResult<SettlementIntent> {
    let state_text: String = row.get("state")?;
    Ok(SettlementIntent {
        request_id: row.get("request_id")?,
        project_id: row.get("project_id")?,
        item_name: row.get("item_name")?,
        quantity: row.get("quantity")?,
        state: parse_enum("settlement_intents.state", &state_text, IntentState::parse)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
