//! Experience account repository contract and SQLite implementation.
//!
//! # Invariants
//! - `experience` and `level` are written by the same statement.
//! - Writes are conditional on the caller's last-read `version`.
//! - Accounts are never created implicitly by a write.

use crate::model::experience::ExperienceAccount;
use crate::model::require_non_empty;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::row::NOW_MS_SQL;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTITY: &str = "experience_account";

const ACCOUNT_SELECT_SQL: &str = "SELECT
    user_id,
    display_name,
    experience,
    level,
    version,
    updated_at
FROM experience_accounts";

/// Store contract for per-user experience documents.
pub trait ExperienceRepository {
    /// Creates an account at zero experience, level 1.
    fn open_account(&self, user_id: &str, display_name: &str) -> RepoResult<ExperienceAccount>;
    fn get_account(&self, user_id: &str) -> RepoResult<Option<ExperienceAccount>>;
    /// Writes experience and level if the stored version still equals
    /// `expected_version`; otherwise `Conflict` (or `NotFound`).
    fn write_experience(
        &self,
        user_id: &str,
        expected_version: i64,
        experience: i64,
        level: i64,
    ) -> RepoResult<ExperienceAccount>;
}

/// SQLite-backed experience repository.
pub struct SqliteExperienceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteExperienceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ExperienceRepository for SqliteExperienceRepository<'_> {
    fn open_account(&self, user_id: &str, display_name: &str) -> RepoResult<ExperienceAccount> {
        require_non_empty("experience_account.user_id", user_id)?;
        require_non_empty("experience_account.display_name", display_name)?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO experience_accounts (user_id, display_name, experience, level)
             VALUES (?1, ?2, 0, 1);",
            params![user_id, display_name.trim()],
        )?;
        if inserted == 0 {
            return Err(RepoError::AlreadyExists {
                entity: ENTITY,
                id: user_id.to_string(),
            });
        }

        self.get_account(user_id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, user_id))
    }

    fn get_account(&self, user_id: &str) -> RepoResult<Option<ExperienceAccount>> {
        let account = self
            .conn
            .query_row(
                &format!("{ACCOUNT_SELECT_SQL} WHERE user_id = ?1;"),
                [user_id],
                parse_account_row,
            )
            .optional()?;
        Ok(account)
    }

    fn write_experience(
        &self,
        user_id: &str,
        expected_version: i64,
        experience: i64,
        level: i64,
    ) -> RepoResult<ExperienceAccount> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE experience_accounts
                 SET
                    experience = ?3,
                    level = ?4,
                    version = version + 1,
                    updated_at = {NOW_MS_SQL}
                 WHERE user_id = ?1
                   AND version = ?2;"
            ),
            params![user_id, expected_version, experience, level],
        )?;

        if changed == 0 {
            let exists: i64 = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM experience_accounts WHERE user_id = ?1);",
                [user_id],
                |row| row.get(0),
            )?;
            return Err(if exists == 1 {
                RepoError::conflict(ENTITY, user_id)
            } else {
                RepoError::not_found(ENTITY, user_id)
            });
        }

        self.get_account(user_id)?
            .ok_or_else(|| RepoError::not_found(ENTITY, user_id))
    }
}

fn parse_account_row(row: &Row<'_>) -> rusqlite::Result<ExperienceAccount> {
    Ok(ExperienceAccount {
        user_id: row.get("user_id")?,
        display_name: row.get("display_name")?,
        experience: row.get("experience")?,
        level: row.get("level")?,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
    })
}
