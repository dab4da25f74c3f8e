//! Experience ledger service.
//!
//! # Responsibility
//! - Grant experience as one version-checked read-modify-write.
//! - Keep the derived level consistent with the cumulative total.
//!
//! # Invariants
//! - `level == level_for(experience, level_size)` after every grant.
//! - Accounts are never created by a grant; a missing account is `NotFound`.
//! - Grant amounts are not validated; zero and negative corrections pass.

use crate::config::RetryPolicy;
use crate::logging::log_text;
use crate::model::experience::{level_for, ExperienceAccount};
use crate::model::ValidationError;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::experience_repo::ExperienceRepository;
use crate::repo::retry::retry_conflicts;
use log::info;

const ENTITY: &str = "experience_account";

/// Per-user experience ledger over an injected repository.
pub struct ExperienceLedger<'a> {
    repo: &'a dyn ExperienceRepository,
    level_size: i64,
    retry: RetryPolicy,
}

impl<'a> ExperienceLedger<'a> {
    pub fn new(repo: &'a dyn ExperienceRepository, level_size: i64, retry: RetryPolicy) -> Self {
        Self {
            repo,
            level_size,
            retry,
        }
    }

    pub fn open_account(&self, user_id: &str, display_name: &str) -> RepoResult<ExperienceAccount> {
        self.repo.open_account(user_id, display_name)
    }

    /// Reads and validates an account against the configured level size.
    pub fn get_account(&self, user_id: &str) -> RepoResult<Option<ExperienceAccount>> {
        let account = self.repo.get_account(user_id)?;
        if let Some(account) = account.as_ref() {
            account.validate(self.level_size)?;
        }
        Ok(account)
    }

    /// Adds `amount` to the user's experience and recomputes the level.
    ///
    /// Each attempt re-reads the account and writes conditionally on the
    /// version it read; lost races retry up to the policy bound.
    ///
    /// # Errors
    /// - `NotFound` when the user has no account.
    /// - `Validation` when the new total would overflow.
    /// - `ConflictExhausted` when every attempt lost to a concurrent writer.
    pub fn grant_experience(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> RepoResult<ExperienceAccount> {
        let updated = retry_conflicts(&self.retry, ENTITY, user_id, |_| {
            let current = self
                .get_account(user_id)?
                .ok_or_else(|| RepoError::not_found(ENTITY, user_id))?;
            let experience = current.experience.checked_add(amount).ok_or_else(|| {
                ValidationError::OutOfRange {
                    field: "experience_account.experience",
                    value: format!("{} + {}", current.experience, amount),
                }
            })?;
            let level = level_for(experience, self.level_size);
            self.repo
                .write_experience(user_id, current.version, experience, level)
        })?;

        info!(
            "event=experience_grant module=experience status=ok user_id={} amount={} experience={} level={} reason={}",
            user_id,
            amount,
            updated.experience,
            updated.level,
            log_text(reason)
        );
        Ok(updated)
    }
}
