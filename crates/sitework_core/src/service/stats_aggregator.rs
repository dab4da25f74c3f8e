//! Project statistics aggregator.
//!
//! # Responsibility
//! - Fast path: atomic single-counter increments after ordinary mutations.
//! - Slow path: authoritative recomputation that overwrites any drift.
//!
//! # Invariants
//! - `recalc_stats` is idempotent; two consecutive calls yield equal counters.
//! - Recomputation always wins over the incremental path.

use crate::model::project::{progress_percent, ProjectStats, StatField};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::project_repo::{StatSources, StatsRepository};
use log::{debug, info, warn};
use std::time::Instant;

/// Maintains the denormalized project summary.
#[derive(Clone, Copy)]
pub struct StatsAggregator<'a> {
    repo: &'a dyn StatsRepository,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(repo: &'a dyn StatsRepository) -> Self {
        Self { repo }
    }

    /// Atomic `field += delta`; progress is refreshed in the same write.
    pub fn increment_stat(
        &self,
        project_id: &str,
        field: StatField,
        delta: i64,
    ) -> RepoResult<ProjectStats> {
        let stats = self.repo.increment_stat(project_id, field, delta)?;
        debug!(
            "event=stats_increment module=stats status=ok project_id={} field={} delta={}",
            project_id,
            field.column(),
            delta
        );
        Ok(stats)
    }

    /// Recomputes every counter from source records and overwrites the summary.
    pub fn recalc_stats(&self, project_id: &str) -> RepoResult<ProjectStats> {
        let started_at = Instant::now();
        let rebuild = self.repo.rebuild_stats(project_id, &derive_stats)?;

        if !rebuild.previous.same_counts(&rebuild.current) {
            warn!(
                "event=stats_drift module=stats status=healed project_id={} total={}->{} completed={}->{} pending_stock={}->{} pending_decisions={}->{} critical={}->{}",
                project_id,
                rebuild.previous.total_tasks,
                rebuild.current.total_tasks,
                rebuild.previous.completed_tasks,
                rebuild.current.completed_tasks,
                rebuild.previous.pending_stock,
                rebuild.current.pending_stock,
                rebuild.previous.pending_decisions,
                rebuild.current.pending_decisions,
                rebuild.previous.critical_items,
                rebuild.current.critical_items
            );
        }
        info!(
            "event=stats_recalc module=stats status=ok project_id={} duration_ms={}",
            project_id,
            started_at.elapsed().as_millis()
        );
        Ok(rebuild.current)
    }

    /// `NotFound` when the project does not exist.
    pub fn get_stats(&self, project_id: &str) -> RepoResult<ProjectStats> {
        self.repo
            .get_stats(project_id)?
            .ok_or_else(|| RepoError::not_found("project", project_id))
    }
}

fn derive_stats(sources: &StatSources) -> ProjectStats {
    ProjectStats {
        total_tasks: sources.total_tasks,
        completed_tasks: sources.completed_tasks,
        progress_percent: progress_percent(sources.completed_tasks, sources.total_tasks),
        pending_stock: sources.pending_stock,
        pending_decisions: sources.pending_decisions,
        critical_items: sources.critical_items,
        recalculated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::derive_stats;
    use crate::repo::project_repo::StatSources;

    #[test]
    fn derived_summary_copies_counts_and_computes_progress() {
        let stats = derive_stats(&StatSources {
            total_tasks: 8,
            completed_tasks: 3,
            pending_stock: 2,
            pending_decisions: 1,
            critical_items: 4,
        });
        assert_eq!(stats.total_tasks, 8);
        assert_eq!(stats.completed_tasks, 3);
        assert_eq!(stats.progress_percent, 37);
        assert_eq!(stats.pending_stock, 2);
        assert_eq!(stats.pending_decisions, 1);
        assert_eq!(stats.critical_items, 4);
    }
}
