//! Typed domain records for the completion engine.
//!
//! # Responsibility
//! - Define the canonical shapes of every aggregate the engine touches.
//! - Validate records once, at the point they are decoded from storage.
//!
//! # Invariants
//! - Identifiers are non-empty text.
//! - Timestamps are Unix epoch milliseconds.
//! - Derived values (level, progress) are pure functions of stored counts.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod activity;
pub mod decision;
pub mod experience;
pub mod material;
pub mod project;
pub mod work_item;

/// Project (aggregate) identifier.
pub type ProjectId = String;
/// User identifier as issued by the identity layer.
pub type UserId = String;

/// Record-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field is empty after trim.
    EmptyField(&'static str),
    /// A `done` work item lacks completion metadata, or a non-done one has it.
    InconsistentCompletion(String),
    /// Persisted level disagrees with the level formula.
    LevelMismatch {
        user_id: String,
        stored: i64,
        expected: i64,
    },
    /// A settled material request has no settlement timestamp.
    SettlementWithoutTimestamp(String),
    /// Numeric field outside its allowed range.
    OutOfRange {
        field: &'static str,
        value: String,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "field `{field}` must not be empty"),
            Self::InconsistentCompletion(id) => {
                write!(f, "work item {id} has inconsistent completion metadata")
            }
            Self::LevelMismatch {
                user_id,
                stored,
                expected,
            } => write!(
                f,
                "experience account {user_id} stores level {stored}, expected {expected}"
            ),
            Self::SettlementWithoutTimestamp(id) => {
                write!(f, "material request {id} is settled without a timestamp")
            }
            Self::OutOfRange { field, value } => {
                write!(f, "field `{field}` is out of range: {value}")
            }
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}
