//! RFI and decision records awaiting an answer.

use super::{ProjectId, UserId};
use serde::{Deserialize, Serialize};

/// Stable decision record identifier.
pub type DecisionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Request for information raised from site.
    Rfi,
    /// Design or commercial decision requested from the client.
    Decision,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rfi => "rfi",
            Self::Decision => "decision",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rfi" => Some(Self::Rfi),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Resolved,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    pub project_id: ProjectId,
    pub kind: DecisionKind,
    pub title: String,
    pub status: DecisionStatus,
    pub raised_by: Option<UserId>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}
