//! Work item domain model.
//!
//! # Responsibility
//! - Define the schedulable unit of work owned by a project.
//! - Provide the lifecycle and criticality helpers used by completion and stats.
//!
//! # Invariants
//! - `done` is terminal for this engine; re-opening is modelled elsewhere.
//! - A `done` item always carries `completed_at` and `completed_by`.
//! - `version` increases by one on every conditional write.

use super::{require_non_empty, ProjectId, UserId, ValidationError};
use serde::{Deserialize, Serialize};

/// Stable work item identifier.
pub type WorkItemId = String;

/// Reward base applied when a work item does not specify one.
pub const DEFAULT_XP_BASE: i64 = 50;
/// Upper bound for a work item's reward base.
pub const MAX_XP_BASE: i64 = 1_000_000;

/// Work item lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Todo,
    Active,
    Review,
    Done,
}

impl WorkItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Active => "active",
            Self::Review => "review",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "active" => Some(Self::Active),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Work item priority. Drives the completion reward bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Site-condition flags raised against a work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemFlags {
    #[serde(default)]
    pub delayed: bool,
    #[serde(default)]
    pub on_hold: bool,
    #[serde(default)]
    pub emergency: bool,
}

/// Canonical work item record.
///
/// Also used as the caller-supplied snapshot on completion, so every field
/// the store assigns has a serde default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: WorkItemStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<UserId>,
    #[serde(default = "default_xp_base")]
    pub xp_base: i64,
    #[serde(default)]
    pub flags: WorkItemFlags,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub completed_by: Option<UserId>,
    #[serde(default)]
    pub version: i64,
}

impl WorkItem {
    pub fn is_done(&self) -> bool {
        self.status == WorkItemStatus::Done
    }

    /// Whether this item counts toward the project's critical tally.
    ///
    /// Critical priority or an emergency flag both qualify; done items never do.
    pub fn is_open_critical(&self) -> bool {
        !self.is_done() && self.is_critical()
    }

    pub fn is_critical(&self) -> bool {
        self.priority == Priority::Critical || self.flags.emergency
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("work_item.id", &self.id)?;
        require_non_empty("work_item.project_id", &self.project_id)?;
        require_non_empty("work_item.title", &self.title)?;
        check_xp_base(self.xp_base)?;

        let has_completion = self.completed_at.is_some() && self.completed_by.is_some();
        let has_any_completion = self.completed_at.is_some() || self.completed_by.is_some();
        if self.is_done() != has_completion || (!self.is_done() && has_any_completion) {
            return Err(ValidationError::InconsistentCompletion(self.id.clone()));
        }
        Ok(())
    }
}

/// Input for creating a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub title: String,
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<UserId>,
    #[serde(default)]
    pub xp_base: Option<i64>,
    #[serde(default)]
    pub flags: WorkItemFlags,
}

impl NewWorkItem {
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            priority,
            assignee: None,
            xp_base: None,
            flags: WorkItemFlags::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("work_item.title", &self.title)?;
        if let Some(xp_base) = self.xp_base {
            check_xp_base(xp_base)?;
        }
        Ok(())
    }
}

fn check_xp_base(xp_base: i64) -> Result<(), ValidationError> {
    if !(0..=MAX_XP_BASE).contains(&xp_base) {
        return Err(ValidationError::OutOfRange {
            field: "work_item.xp_base",
            value: xp_base.to_string(),
        });
    }
    Ok(())
}

fn default_xp_base() -> i64 {
    DEFAULT_XP_BASE
}
