//! Project workflows outside the completion path.
//!
//! # Responsibility
//! - Create projects, work items, material requests, decisions and stock rows.
//! - Keep the stats summary current through the incremental path, and fall
//!   back to a full recompute after coupled mutations.
//!
//! # Invariants
//! - The primary write decides success; a stats or activity failure after it
//!   is logged and left for `recalc_stats` to heal.
//! - Material status changes follow the approval flow; a settled request is
//!   never deleted.

use crate::config::EngineConfig;
use crate::logging::log_text;
use crate::model::activity::ActivityRecord;
use crate::model::decision::{DecisionKind, DecisionRecord};
use crate::model::material::{InventoryItem, MaterialRequest, MaterialStatus, NewMaterialRequest};
use crate::model::project::{Project, StatField};
use crate::model::work_item::{NewWorkItem, WorkItem};
use crate::repo::decision_repo::DecisionRepository;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::inventory_repo::InventoryRepository;
use crate::repo::material_repo::MaterialRequestRepository;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::store::SqliteLedgerStore;
use crate::repo::work_item_repo::WorkItemRepository;
use crate::service::activity_log::ActivityLogWriter;
use crate::service::stats_aggregator::StatsAggregator;
use log::{info, warn};

/// Non-completion mutations that feed the stats summary and activity feed.
pub struct ProjectWorkflows<'a> {
    projects: &'a dyn ProjectRepository,
    work_items: &'a dyn WorkItemRepository,
    materials: &'a dyn MaterialRequestRepository,
    inventory: &'a dyn InventoryRepository,
    decisions: &'a dyn DecisionRepository,
    activity: ActivityLogWriter<'a>,
    stats: StatsAggregator<'a>,
    config: EngineConfig,
}

impl<'a> ProjectWorkflows<'a> {
    pub fn with_store(store: &'a SqliteLedgerStore<'_>, config: EngineConfig) -> Self {
        Self {
            projects: &store.projects,
            work_items: &store.work_items,
            materials: &store.materials,
            inventory: &store.inventory,
            decisions: &store.decisions,
            activity: ActivityLogWriter::new(&store.activity),
            stats: StatsAggregator::new(&store.projects),
            config,
        }
    }

    pub fn create_project(&self, name: &str) -> RepoResult<Project> {
        let project = self.projects.create_project(name)?;
        info!(
            "event=project_create module=workflow status=ok project_id={}",
            project.id
        );
        Ok(project)
    }

    /// Creates a `todo` work item; the reward base defaults from config.
    pub fn create_work_item(&self, project_id: &str, input: &NewWorkItem) -> RepoResult<WorkItem> {
        let mut input = input.clone();
        input.xp_base.get_or_insert(self.config.base_reward);
        let item = self.work_items.create_work_item(project_id, &input)?;

        self.bump(project_id, StatField::TotalTasks, 1);
        if item.is_open_critical() {
            self.bump(project_id, StatField::CriticalItems, 1);
        }
        info!(
            "event=work_item_create module=workflow status=ok project_id={} work_item_id={} priority={}",
            project_id,
            item.id,
            item.priority.as_str()
        );
        Ok(item)
    }

    pub fn request_material(
        &self,
        project_id: &str,
        input: &NewMaterialRequest,
    ) -> RepoResult<MaterialRequest> {
        let request = self.materials.create_request(project_id, input)?;
        info!(
            "event=material_request module=workflow status=ok project_id={} request_id={}",
            project_id, request.id
        );
        Ok(request)
    }

    /// Moves a request along the approval flow, then recomputes stats.
    pub fn set_material_status(
        &self,
        request_id: &str,
        next: MaterialStatus,
    ) -> RepoResult<MaterialRequest> {
        let current = self
            .materials
            .get_request(request_id)?
            .ok_or_else(|| RepoError::not_found("material_request", request_id))?;
        if !current.status.can_transition_to(next) {
            return Err(RepoError::InvalidTransition {
                entity: "material_request",
                id: request_id.to_string(),
                from: current.status.as_str(),
                to: next.as_str(),
            });
        }
        if current.status == next {
            return Ok(current);
        }

        let updated = self
            .materials
            .update_status(request_id, current.status, next)?;
        self.recalc(&updated.project_id);
        info!(
            "event=material_status module=workflow status=ok request_id={} from={} to={}",
            request_id,
            current.status.as_str(),
            next.as_str()
        );
        Ok(updated)
    }

    /// Deletes an unsettled request, then recomputes stats.
    pub fn delete_material_request(&self, request_id: &str) -> RepoResult<MaterialRequest> {
        let current = self
            .materials
            .get_request(request_id)?
            .ok_or_else(|| RepoError::not_found("material_request", request_id))?;
        if current.stock_deducted {
            return Err(RepoError::InvalidTransition {
                entity: "material_request",
                id: request_id.to_string(),
                from: "settled",
                to: "deleted",
            });
        }

        let deleted = self.materials.delete_request(request_id)?;
        self.recalc(&deleted.project_id);
        info!(
            "event=material_delete module=workflow status=ok request_id={}",
            request_id
        );
        Ok(deleted)
    }

    pub fn register_stock_item(
        &self,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
    ) -> RepoResult<InventoryItem> {
        let item = self.inventory.register_item(name, quantity, unit)?;
        info!(
            "event=stock_register module=workflow status=ok item_name={}",
            log_text(&item.name)
        );
        Ok(item)
    }

    /// Relative manual correction of a stock row, logged as an adjustment.
    pub fn adjust_stock(
        &self,
        name: &str,
        delta: f64,
        actor_id: &str,
    ) -> RepoResult<InventoryItem> {
        let item = self.inventory.adjust_quantity(name, delta)?;
        if let Err(err) = self
            .activity
            .record_adjustment(&item.name, delta, item.quantity, actor_id)
        {
            warn!(
                "event=stock_adjust module=workflow status=error step=activity_log item_name={} error={}",
                log_text(&item.name),
                err
            );
        }
        Ok(item)
    }

    pub fn raise_rfi(
        &self,
        project_id: &str,
        title: &str,
        actor_id: &str,
    ) -> RepoResult<DecisionRecord> {
        self.open_decision(project_id, DecisionKind::Rfi, title, actor_id)
    }

    pub fn record_decision(
        &self,
        project_id: &str,
        title: &str,
        actor_id: &str,
    ) -> RepoResult<DecisionRecord> {
        self.open_decision(project_id, DecisionKind::Decision, title, actor_id)
    }

    pub fn resolve_decision(
        &self,
        decision_id: &str,
        actor_id: &str,
    ) -> RepoResult<DecisionRecord> {
        let decision = self.decisions.resolve_decision(decision_id)?;
        self.bump(&decision.project_id, StatField::PendingDecisions, -1);
        self.log_decision(&decision, actor_id);
        Ok(decision)
    }

    pub fn report_incident(
        &self,
        project_id: &str,
        work_item_id: Option<&str>,
        description: &str,
        actor_id: &str,
    ) -> RepoResult<ActivityRecord> {
        if self.projects.get_project(project_id)?.is_none() {
            return Err(RepoError::not_found("project", project_id));
        }
        self.activity
            .record_incident(project_id, work_item_id, description, actor_id)
    }

    fn open_decision(
        &self,
        project_id: &str,
        kind: DecisionKind,
        title: &str,
        actor_id: &str,
    ) -> RepoResult<DecisionRecord> {
        let decision = self
            .decisions
            .create_decision(project_id, kind, title, Some(actor_id))?;
        self.bump(project_id, StatField::PendingDecisions, 1);
        self.log_decision(&decision, actor_id);
        Ok(decision)
    }

    fn log_decision(&self, decision: &DecisionRecord, actor_id: &str) {
        if let Err(err) = self.activity.record_decision(decision, actor_id) {
            warn!(
                "event=decision module=workflow status=error step=activity_log decision_id={} error={}",
                decision.id, err
            );
        }
    }

    fn bump(&self, project_id: &str, field: StatField, delta: i64) {
        if let Err(err) = self.stats.increment_stat(project_id, field, delta) {
            warn!(
                "event=stats_increment module=workflow status=error project_id={} field={} error_code={} error={}",
                project_id,
                field.column(),
                err.code(),
                err
            );
        }
    }

    fn recalc(&self, project_id: &str) {
        if let Err(err) = self.stats.recalc_stats(project_id) {
            warn!(
                "event=stats_recalc module=workflow status=error project_id={} error_code={} error={}",
                project_id,
                err.code(),
                err
            );
        }
    }
}
