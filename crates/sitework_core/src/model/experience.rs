//! Experience account model and level formula.
//!
//! # Invariants
//! - `level == level_for(experience, level_size)` for every persisted account.
//! - Level is never written without the experience value it derives from.

use super::{require_non_empty, UserId, ValidationError};
use serde::{Deserialize, Serialize};

/// Experience points per level.
pub const DEFAULT_LEVEL_SIZE: i64 = 1000;

/// Per-user cumulative experience ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceAccount {
    pub user_id: UserId,
    pub display_name: String,
    pub experience: i64,
    pub level: i64,
    pub version: i64,
    pub updated_at: i64,
}

impl ExperienceAccount {
    /// Checks the stored level against the formula.
    pub fn validate(&self, level_size: i64) -> Result<(), ValidationError> {
        require_non_empty("experience_account.user_id", &self.user_id)?;
        let expected = level_for(self.experience, level_size);
        if self.level != expected {
            return Err(ValidationError::LevelMismatch {
                user_id: self.user_id.clone(),
                stored: self.level,
                expected,
            });
        }
        Ok(())
    }
}

/// `floor(experience / level_size) + 1`.
///
/// Floors toward negative infinity so administrative corrections below zero
/// still produce a consistent level.
pub fn level_for(experience: i64, level_size: i64) -> i64 {
    experience.div_euclid(level_size.max(1)) + 1
}
