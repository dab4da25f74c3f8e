//! Engine services.
//!
//! # Responsibility
//! - Orchestrate repository calls into completion and project workflows.
//! - Receive every collaborator by injection; services never open
//!   connections themselves.

pub mod activity_log;
pub mod completion;
pub mod experience_ledger;
pub mod inventory_reconciliation;
pub mod project_workflows;
pub mod stats_aggregator;
