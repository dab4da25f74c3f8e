//! Append-only activity feed records.

use super::{require_non_empty, ProjectId, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form structured metadata attached to an activity.
pub type ActivityMetadata = Map<String, Value>;

/// Type tag for activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Completion,
    Stock,
    Incident,
    Rfi,
    Decision,
    Adjustment,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Stock => "stock",
            Self::Incident => "incident",
            Self::Rfi => "rfi",
            Self::Decision => "decision",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completion" => Some(Self::Completion),
            "stock" => Some(Self::Stock),
            "incident" => Some(Self::Incident),
            "rfi" => Some(Self::Rfi),
            "decision" => Some(Self::Decision),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

/// Immutable activity record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub project_id: Option<ProjectId>,
    pub kind: ActivityKind,
    pub description: String,
    pub metadata: ActivityMetadata,
    pub actor: Option<UserId>,
    pub created_at: i64,
}

/// Activity to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub project_id: Option<ProjectId>,
    pub kind: ActivityKind,
    pub description: String,
    pub metadata: ActivityMetadata,
    pub actor: Option<UserId>,
}

impl NewActivity {
    pub fn new(kind: ActivityKind, description: impl Into<String>) -> Self {
        Self {
            project_id: None,
            kind,
            description: description.into(),
            metadata: ActivityMetadata::new(),
            actor: None,
        }
    }

    pub fn in_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn by(mut self, actor: impl Into<UserId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("activity.description", &self.description)
    }
}
