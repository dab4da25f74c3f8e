//! Work item completion orchestrator.
//!
//! # Responsibility
//! - Sequence every side effect of marking one work item done.
//! - Separate the single fatal step from best-effort follow-ups and report
//!   which follow-ups need a retry.
//!
//! # Invariants
//! - The `done` transition runs first among the writes; if it fails nothing
//!   else is written.
//! - Follow-up steps never compensate each other; failures are collected in
//!   `failed_steps`.
//! - Experience is granted at most once per work item because the `done`
//!   transition is one-way.

use crate::config::{EngineConfig, PriorityBonus};
use crate::model::experience::ExperienceAccount;
use crate::model::project::StatField;
use crate::model::work_item::WorkItem;
use crate::repo::error::RepoError;
use crate::repo::retry::retry_conflicts;
use crate::repo::store::SqliteLedgerStore;
use crate::repo::work_item_repo::WorkItemRepository;
use crate::service::activity_log::ActivityLogWriter;
use crate::service::experience_ledger::ExperienceLedger;
use crate::service::inventory_reconciliation::{InventoryReconciler, SettlementReport};
use crate::service::stats_aggregator::StatsAggregator;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Fatal completion failure; nothing after the transition was attempted.
#[derive(Debug)]
pub enum CompletionError {
    InvalidArgument(String),
    NotFound { work_item_id: String },
    AlreadyCompleted { work_item_id: String },
    /// Store failure or retry exhaustion on the `done` transition.
    Transition(RepoError),
}

impl Display for CompletionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound { work_item_id } => write!(f, "work item not found: {work_item_id}"),
            Self::AlreadyCompleted { work_item_id } => {
                write!(f, "work item already completed: {work_item_id}")
            }
            Self::Transition(err) => write!(f, "work item transition failed: {err}"),
        }
    }
}

impl Error for CompletionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transition(err) => Some(err),
            _ => None,
        }
    }
}

impl CompletionError {
    fn from_transition(work_item_id: &str, err: RepoError) -> Self {
        match err {
            RepoError::NotFound { .. } => Self::NotFound {
                work_item_id: work_item_id.to_string(),
            },
            RepoError::InvalidTransition { .. } => Self::AlreadyCompleted {
                work_item_id: work_item_id.to_string(),
            },
            other => Self::Transition(other),
        }
    }

    /// Stable short code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::Transition(err) => err.code(),
        }
    }
}

/// A best-effort step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedStep {
    Experience { error: String },
    ActivityLog { error: String },
    /// Listing the work item's material requests failed.
    InventoryScan { error: String },
    /// One material request was not settled.
    Inventory { request_id: String, reason: String },
    Stats { error: String },
}

impl FailedStep {
    /// Stable tag so callers can retry only the missing piece.
    pub fn name(&self) -> String {
        match self {
            Self::Experience { .. } => "experience".to_string(),
            Self::ActivityLog { .. } => "activity_log".to_string(),
            Self::InventoryScan { .. } => "inventory".to_string(),
            Self::Inventory { request_id, .. } => format!("inventory:{request_id}"),
            Self::Stats { .. } => "stats".to_string(),
        }
    }
}

/// Outcome of a completion whose `done` transition succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// True whenever the transition succeeded, even with failed follow-ups.
    pub success: bool,
    pub work_item: WorkItem,
    pub reward: i64,
    /// Amount credited, `None` when the grant failed.
    pub experience_granted: Option<i64>,
    pub account: Option<ExperienceAccount>,
    pub settlement: SettlementReport,
    pub failed_steps: Vec<FailedStep>,
}

impl CompletionResult {
    pub fn is_fully_successful(&self) -> bool {
        self.success && self.failed_steps.is_empty()
    }

    pub fn failed_step_names(&self) -> Vec<String> {
        self.failed_steps.iter().map(FailedStep::name).collect()
    }
}

/// Experience reward for completing `snapshot`: reward base plus priority bonus.
///
/// `None` when the sum does not fit in an `i64`.
pub fn experience_reward(snapshot: &WorkItem, bonus: &PriorityBonus) -> Option<i64> {
    snapshot
        .xp_base
        .checked_add(bonus.for_priority(snapshot.priority))
}

/// Completion entry point with every collaborator injected.
pub struct CompletionOrchestrator<'a> {
    work_items: &'a dyn WorkItemRepository,
    experience: ExperienceLedger<'a>,
    activity: ActivityLogWriter<'a>,
    inventory: InventoryReconciler<'a>,
    stats: StatsAggregator<'a>,
    config: EngineConfig,
}

impl<'a> CompletionOrchestrator<'a> {
    pub fn new(
        work_items: &'a dyn WorkItemRepository,
        experience: ExperienceLedger<'a>,
        activity: ActivityLogWriter<'a>,
        inventory: InventoryReconciler<'a>,
        stats: StatsAggregator<'a>,
        config: EngineConfig,
    ) -> Self {
        Self {
            work_items,
            experience,
            activity,
            inventory,
            stats,
            config,
        }
    }

    /// Wires every collaborator to the SQLite store.
    pub fn with_store(store: &'a SqliteLedgerStore<'_>, config: EngineConfig) -> Self {
        let activity = ActivityLogWriter::new(&store.activity);
        Self::new(
            &store.work_items,
            ExperienceLedger::new(&store.experience, config.level_size, config.retry),
            activity,
            InventoryReconciler::new(
                &store.inventory,
                &store.inventory,
                &store.materials,
                activity,
                config.retry,
            ),
            StatsAggregator::new(&store.projects),
            config,
        )
    }

    /// Marks a work item done and runs every follow-up step.
    ///
    /// # Errors
    /// - `InvalidArgument` for empty identifiers or a mismatched snapshot.
    /// - `NotFound`, `AlreadyCompleted` or `Transition` when the `done`
    ///   transition fails; no follow-up step ran.
    pub fn complete_work_item(
        &self,
        work_item_id: &str,
        project_id: &str,
        actor_id: &str,
        snapshot: &WorkItem,
    ) -> Result<CompletionResult, CompletionError> {
        let started_at = Instant::now();
        validate_arguments(work_item_id, project_id, actor_id, snapshot)?;

        let reward =
            experience_reward(snapshot, &self.config.priority_bonus).ok_or_else(|| {
                CompletionError::InvalidArgument(format!(
                    "reward for work item {work_item_id} overflows"
                ))
            })?;

        let work_item = self
            .transition_to_done(project_id, work_item_id, actor_id)
            .map_err(|err| {
                let err = CompletionError::from_transition(work_item_id, err);
                error!(
                    "event=completion module=completion status=error step=transition work_item_id={} project_id={} error_code={} error={}",
                    work_item_id,
                    project_id,
                    err.code(),
                    err
                );
                err
            })?;

        if work_item.priority != snapshot.priority || work_item.xp_base != snapshot.xp_base {
            warn!(
                "event=completion module=completion status=warning reason=snapshot_drift work_item_id={} reward_priority={} stored_priority={} reward_xp_base={} stored_xp_base={}",
                work_item_id,
                snapshot.priority.as_str(),
                work_item.priority.as_str(),
                snapshot.xp_base,
                work_item.xp_base
            );
        }

        let mut failed_steps = Vec::new();

        let account = match self.experience.grant_experience(
            actor_id,
            reward,
            &format!("completion:{work_item_id}"),
        ) {
            Ok(account) => Some(account),
            Err(err) => {
                warn!(
                    "event=completion_step module=completion status=error step=experience work_item_id={} actor_id={} error_code={} error={}",
                    work_item_id,
                    actor_id,
                    err.code(),
                    err
                );
                failed_steps.push(FailedStep::Experience {
                    error: err.to_string(),
                });
                None
            }
        };

        if let Err(err) = self
            .activity
            .record_completion(&work_item, actor_id, reward, snapshot.priority)
        {
            warn!(
                "event=completion_step module=completion status=error step=activity_log work_item_id={} error_code={} error={}",
                work_item_id,
                err.code(),
                err
            );
            failed_steps.push(FailedStep::ActivityLog {
                error: err.to_string(),
            });
        }

        let settlement = match self.inventory.reconcile_work_item(project_id, work_item_id) {
            Ok(report) => {
                failed_steps.extend(report.unsettled().map(|entry| FailedStep::Inventory {
                    request_id: entry.request_id.clone(),
                    reason: entry.outcome.code().to_string(),
                }));
                report
            }
            Err(err) => {
                warn!(
                    "event=completion_step module=completion status=error step=inventory work_item_id={} error_code={} error={}",
                    work_item_id,
                    err.code(),
                    err
                );
                failed_steps.push(FailedStep::InventoryScan {
                    error: err.to_string(),
                });
                SettlementReport::default()
            }
        };

        if let Err(err) = self.bump_stats(project_id, &work_item) {
            warn!(
                "event=completion_step module=completion status=error step=stats work_item_id={} project_id={} error_code={} error={}",
                work_item_id,
                project_id,
                err.code(),
                err
            );
            failed_steps.push(FailedStep::Stats {
                error: err.to_string(),
            });
        }

        let result = CompletionResult {
            success: true,
            work_item,
            reward,
            experience_granted: account.as_ref().map(|_| reward),
            account,
            settlement,
            failed_steps,
        };
        info!(
            "event=completion module=completion status={} work_item_id={} project_id={} reward={} failed_steps={} duration_ms={}",
            if result.is_fully_successful() { "ok" } else { "partial" },
            work_item_id,
            project_id,
            reward,
            result.failed_step_names().join(","),
            started_at.elapsed().as_millis()
        );
        Ok(result)
    }

    fn transition_to_done(
        &self,
        project_id: &str,
        work_item_id: &str,
        actor_id: &str,
    ) -> Result<WorkItem, RepoError> {
        retry_conflicts(&self.config.retry, "work_item", work_item_id, |_| {
            let current = self
                .work_items
                .get_work_item(project_id, work_item_id)?
                .ok_or_else(|| RepoError::not_found("work_item", work_item_id))?;
            self.work_items
                .mark_done(project_id, work_item_id, current.version, actor_id)
        })
    }

    fn bump_stats(&self, project_id: &str, work_item: &WorkItem) -> Result<(), RepoError> {
        self.stats
            .increment_stat(project_id, StatField::CompletedTasks, 1)?;
        if work_item.is_critical() {
            self.stats
                .increment_stat(project_id, StatField::CriticalItems, -1)?;
        }
        Ok(())
    }
}

fn validate_arguments(
    work_item_id: &str,
    project_id: &str,
    actor_id: &str,
    snapshot: &WorkItem,
) -> Result<(), CompletionError> {
    for (name, value) in [
        ("work_item_id", work_item_id),
        ("project_id", project_id),
        ("actor_id", actor_id),
    ] {
        if value.trim().is_empty() {
            return Err(CompletionError::InvalidArgument(format!(
                "{name} must not be empty"
            )));
        }
    }
    if snapshot.id != work_item_id || snapshot.project_id != project_id {
        return Err(CompletionError::InvalidArgument(format!(
            "snapshot {}/{} does not match {}/{}",
            snapshot.project_id, snapshot.id, project_id, work_item_id
        )));
    }
    snapshot
        .validate()
        .map_err(|err| CompletionError::InvalidArgument(format!("snapshot: {err}")))
}
