//! Activity log writer.
//!
//! # Responsibility
//! - Shape audit records for every significant engine event.
//! - Delegate persistence to the append-only activity repository.
//!
//! # Invariants
//! - Records are immutable once appended; there is no update or delete API.
//! - Metadata carries identifiers, numbers and stock item names; free-form
//!   text such as incident reports stays in `description`.

use crate::model::activity::{ActivityKind, ActivityRecord, NewActivity};
use crate::model::decision::{DecisionKind, DecisionRecord, DecisionStatus};
use crate::model::material::MaterialRequest;
use crate::model::work_item::{Priority, WorkItem};
use crate::repo::activity_repo::ActivityRepository;
use crate::repo::error::RepoResult;
use log::debug;

/// Appends typed activity records through an injected repository.
#[derive(Clone, Copy)]
pub struct ActivityLogWriter<'a> {
    repo: &'a dyn ActivityRepository,
}

impl<'a> ActivityLogWriter<'a> {
    pub fn new(repo: &'a dyn ActivityRepository) -> Self {
        Self { repo }
    }

    /// Appends a caller-shaped record.
    pub fn append(&self, activity: &NewActivity) -> RepoResult<ActivityRecord> {
        let record = self.repo.append(activity)?;
        debug!(
            "event=activity_append module=activity status=ok kind={} activity_id={}",
            record.kind.as_str(),
            record.id
        );
        Ok(record)
    }

    /// `reward_priority` is the priority the reward was computed from, which
    /// may differ from the stored item's.
    pub fn record_completion(
        &self,
        work_item: &WorkItem,
        actor_id: &str,
        reward: i64,
        reward_priority: Priority,
    ) -> RepoResult<ActivityRecord> {
        self.append(
            &NewActivity::new(
                ActivityKind::Completion,
                format!("Completed work item: {}", work_item.title),
            )
            .in_project(work_item.project_id.as_str())
            .by(actor_id)
            .with("work_item_id", work_item.id.as_str())
            .with("priority", work_item.priority.as_str())
            .with("reward", reward)
            .with("reward_priority", reward_priority.as_str()),
        )
    }

    pub fn record_stock_deduction(
        &self,
        request: &MaterialRequest,
        quantity: f64,
        remaining: f64,
    ) -> RepoResult<ActivityRecord> {
        let mut activity = NewActivity::new(
            ActivityKind::Stock,
            format!("Deducted {} {} from stock", quantity, request.item_name),
        )
        .in_project(request.project_id.as_str())
        .with("request_id", request.id.as_str())
        .with("item_name", request.item_name.as_str())
        .with("quantity", quantity)
        .with("remaining", remaining);
        if let Some(work_item_id) = request.work_item_id.as_deref() {
            activity = activity.with("work_item_id", work_item_id);
        }
        self.append(&activity)
    }

    pub fn record_incident(
        &self,
        project_id: &str,
        work_item_id: Option<&str>,
        description: &str,
        actor_id: &str,
    ) -> RepoResult<ActivityRecord> {
        let mut activity = NewActivity::new(ActivityKind::Incident, description)
            .in_project(project_id)
            .by(actor_id);
        if let Some(work_item_id) = work_item_id {
            activity = activity.with("work_item_id", work_item_id);
        }
        self.append(&activity)
    }

    /// Records a raised or resolved RFI/decision.
    pub fn record_decision(
        &self,
        decision: &DecisionRecord,
        actor_id: &str,
    ) -> RepoResult<ActivityRecord> {
        let (kind, label) = match (decision.kind, decision.status) {
            (DecisionKind::Rfi, DecisionStatus::Pending) => (ActivityKind::Rfi, "RFI raised"),
            (DecisionKind::Rfi, DecisionStatus::Resolved) => (ActivityKind::Rfi, "RFI answered"),
            (DecisionKind::Decision, DecisionStatus::Pending) => {
                (ActivityKind::Decision, "Decision recorded")
            }
            (DecisionKind::Decision, DecisionStatus::Resolved) => {
                (ActivityKind::Decision, "Decision closed")
            }
        };
        self.append(
            &NewActivity::new(kind, format!("{label}: {}", decision.title))
                .in_project(decision.project_id.as_str())
                .by(actor_id)
                .with("decision_id", decision.id.as_str())
                .with("status", decision.status.as_str()),
        )
    }

    pub fn record_adjustment(
        &self,
        item_name: &str,
        delta: f64,
        remaining: f64,
        actor_id: &str,
    ) -> RepoResult<ActivityRecord> {
        self.append(
            &NewActivity::new(
                ActivityKind::Adjustment,
                format!("Adjusted stock of {item_name} by {delta}"),
            )
            .by(actor_id)
            .with("item_name", item_name)
            .with("delta", delta)
            .with("remaining", remaining),
        )
    }

    /// Newest-first feed for one project.
    pub fn project_feed(&self, project_id: &str, limit: u32) -> RepoResult<Vec<ActivityRecord>> {
        self.repo.list_for_project(project_id, limit)
    }
}
