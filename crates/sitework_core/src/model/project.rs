//! Project aggregate and its denormalized statistics summary.
//!
//! # Invariants
//! - `progress_percent` is always derived from `completed_tasks / total_tasks`.
//! - A full recomputation overwrites every summary field.

use super::{require_non_empty, ProjectId, ValidationError};
use serde::{Deserialize, Serialize};

/// Top-level container for work items and material requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub stats: ProjectStats,
    pub created_at: i64,
}

impl Project {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("project.id", &self.id)?;
        require_non_empty("project.name", &self.name)
    }
}

/// Denormalized counters shown on project dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub progress_percent: i64,
    pub pending_stock: i64,
    pub pending_decisions: i64,
    pub critical_items: i64,
    /// Set by the full recomputation path only.
    pub recalculated_at: Option<i64>,
}

impl ProjectStats {
    /// Same counters, ignoring when they were last recomputed.
    pub fn same_counts(&self, other: &Self) -> bool {
        self.total_tasks == other.total_tasks
            && self.completed_tasks == other.completed_tasks
            && self.progress_percent == other.progress_percent
            && self.pending_stock == other.pending_stock
            && self.pending_decisions == other.pending_decisions
            && self.critical_items == other.critical_items
    }
}

/// Counter fields that support atomic single-field increments.
///
/// `progress_percent` is deliberately absent: it is derived, not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    TotalTasks,
    CompletedTasks,
    PendingStock,
    PendingDecisions,
    CriticalItems,
}

impl StatField {
    /// Column in the `projects` table backing this counter.
    pub fn column(self) -> &'static str {
        match self {
            Self::TotalTasks => "total_tasks",
            Self::CompletedTasks => "completed_tasks",
            Self::PendingStock => "pending_stock",
            Self::PendingDecisions => "pending_decisions",
            Self::CriticalItems => "critical_items",
        }
    }
}

/// Integer completion percentage, rounded down; zero for an empty project.
pub fn progress_percent(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (completed.clamp(0, total) * 100) / total
}
