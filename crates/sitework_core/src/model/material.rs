//! Material request, inventory and settlement-intent models.
//!
//! # Responsibility
//! - Link requested quantities of named items to work items.
//! - Hold the global per-item stock rows.
//! - Track in-flight settlements between the stock decrement and the flag write.
//!
//! # Invariants
//! - `stock_deducted == true` is permanent; a settled request is never
//!   decremented again.
//! - Only `approved` requests are eligible for deduction.
//! - A settled request carries a settlement timestamp.

use super::{require_non_empty, ProjectId, ValidationError};
use crate::model::work_item::WorkItemId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stable material request identifier.
pub type MaterialRequestId = String;

static LEADING_QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)").expect("valid quantity regex"));

/// Approval lifecycle for a material request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Requested,
    Approved,
    Rejected,
    Ordered,
    Delivered,
}

impl MaterialStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Ordered => "ordered",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(Self::Requested),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "ordered" => Some(Self::Ordered),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Approved but not yet delivered; counted as pending stock.
    pub fn is_pending_stock(self) -> bool {
        matches!(self, Self::Approved | Self::Ordered)
    }

    /// Allowed approval-flow moves. Re-applying the current status is a no-op.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Requested, Self::Approved)
                | (Self::Requested, Self::Rejected)
                | (Self::Approved, Self::Ordered)
                | (Self::Approved, Self::Delivered)
                | (Self::Approved, Self::Rejected)
                | (Self::Ordered, Self::Delivered)
        )
    }
}

/// Request for a quantity of a named item, optionally tied to a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequest {
    pub id: MaterialRequestId,
    pub project_id: ProjectId,
    pub work_item_id: Option<WorkItemId>,
    pub item_name: String,
    /// Quantity as entered, e.g. `"20"` or `"20 bags"`.
    pub quantity: String,
    pub status: MaterialStatus,
    pub stock_deducted: bool,
    pub deducted_at: Option<i64>,
    pub created_at: i64,
}

impl MaterialRequest {
    /// Leading numeric quantity when it is strictly positive.
    pub fn deductible_quantity(&self) -> Option<f64> {
        parse_quantity(&self.quantity).filter(|value| *value > 0.0)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("material_request.id", &self.id)?;
        require_non_empty("material_request.project_id", &self.project_id)?;
        require_non_empty("material_request.item_name", &self.item_name)?;
        if self.stock_deducted && self.deducted_at.is_none() {
            return Err(ValidationError::SettlementWithoutTimestamp(self.id.clone()));
        }
        Ok(())
    }
}

/// Input for creating a material request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterialRequest {
    pub item_name: String,
    pub quantity: String,
    #[serde(default)]
    pub work_item_id: Option<WorkItemId>,
}

impl NewMaterialRequest {
    pub fn new(item_name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            quantity: quantity.into(),
            work_item_id: None,
        }
    }

    pub fn for_work_item(mut self, work_item_id: impl Into<WorkItemId>) -> Self {
        self.work_item_id = Some(work_item_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("material_request.item_name", &self.item_name)?;
        require_non_empty("material_request.quantity", &self.quantity)
    }
}

/// Global stock row, one per distinct item name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub updated_at: i64,
}

/// Progress of one request through the decrement-then-flag settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// Claimed; the decrement may or may not have been applied.
    Claimed,
    /// Decrement applied; the request flag is not yet confirmed.
    Decremented,
    /// Decrement applied and request flagged.
    Settled,
}

impl IntentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Decremented => "decremented",
            Self::Settled => "settled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claimed" => Some(Self::Claimed),
            "decremented" => Some(Self::Decremented),
            "settled" => Some(Self::Settled),
            _ => None,
        }
    }
}

/// Audit record written before a stock decrement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub request_id: MaterialRequestId,
    pub project_id: ProjectId,
    pub item_name: String,
    pub quantity: f64,
    pub state: IntentState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Parses the leading numeric value of a free-text quantity.
///
/// `"20 bags"` yields `20.0`; text without a leading number yields `None`.
pub fn parse_quantity(value: &str) -> Option<f64> {
    LEADING_QUANTITY_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}
