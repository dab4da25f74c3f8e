//! Inventory reconciliation for completed work items.
//!
//! # Responsibility
//! - Settle every approved material request linked to a work item against
//!   the global stock row of the same name.
//! - Keep the decrement-then-flag window auditable through settlement intents.
//!
//! # Invariants
//! - A request whose `stock_deducted` flag is set is never decremented again.
//! - The stock decrement always happens before the request flag is written.
//! - At most one invocation owns a request's settlement (intent primary key).
//! - Missing stock rows are reported, never created.

use crate::config::RetryPolicy;
use crate::logging::log_text;
use crate::model::material::{IntentState, MaterialRequest, MaterialStatus, SettlementIntent};
use crate::repo::error::RepoResult;
use crate::repo::inventory_repo::{IntentClaim, InventoryRepository, SettlementIntentRepository};
use crate::repo::material_repo::MaterialRequestRepository;
use crate::repo::retry::retry_conflicts;
use crate::service::activity_log::ActivityLogWriter;
use log::{error, info, warn};

/// What happened to one material request during a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Stock decremented and request flagged by this pass.
    Deducted { quantity: f64, remaining: f64 },
    /// Flag was already set; nothing written.
    AlreadySettled,
    /// An earlier decrement was found and its flag write completed.
    Resumed { quantity: f64 },
    /// No stock row carries the requested item name.
    MissingStock,
    /// Quantity text has no positive leading number.
    InvalidQuantity { quantity: String },
    /// An intent was claimed but never confirmed; the decrement may or may
    /// not have been applied.
    NeedsAudit,
    Failed { error: String },
}

impl SettlementOutcome {
    /// Whether the request still lacks a confirmed settlement.
    pub fn is_unsettled(&self) -> bool {
        !matches!(
            self,
            Self::Deducted { .. } | Self::AlreadySettled | Self::Resumed { .. }
        )
    }

    /// Stable tag for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deducted { .. } => "deducted",
            Self::AlreadySettled => "already_settled",
            Self::Resumed { .. } => "resumed",
            Self::MissingStock => "missing_stock",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::NeedsAudit => "needs_audit",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome for one examined request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettlement {
    pub request_id: String,
    pub item_name: String,
    pub outcome: SettlementOutcome,
}

/// Per-request outcomes of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub entries: Vec<RequestSettlement>,
}

impl SettlementReport {
    pub fn unsettled(&self) -> impl Iterator<Item = &RequestSettlement> {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_unsettled())
    }

    pub fn deducted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, SettlementOutcome::Deducted { .. }))
            .count()
    }

    pub fn outcome_for(&self, request_id: &str) -> Option<&SettlementOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.request_id == request_id)
            .map(|entry| &entry.outcome)
    }
}

/// Settles material requests against global stock.
pub struct InventoryReconciler<'a> {
    inventory: &'a dyn InventoryRepository,
    intents: &'a dyn SettlementIntentRepository,
    requests: &'a dyn MaterialRequestRepository,
    activity: ActivityLogWriter<'a>,
    retry: RetryPolicy,
}

impl<'a> InventoryReconciler<'a> {
    pub fn new(
        inventory: &'a dyn InventoryRepository,
        intents: &'a dyn SettlementIntentRepository,
        requests: &'a dyn MaterialRequestRepository,
        activity: ActivityLogWriter<'a>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inventory,
            intents,
            requests,
            activity,
            retry,
        }
    }

    /// Settles every approved request linked to `work_item_id`.
    ///
    /// Individual request failures are captured in the report; only a
    /// failure to list the requests is returned as an error.
    pub fn reconcile_work_item(
        &self,
        project_id: &str,
        work_item_id: &str,
    ) -> RepoResult<SettlementReport> {
        let requests =
            self.requests
                .list_for_work_item(project_id, work_item_id, MaterialStatus::Approved)?;

        let mut report = SettlementReport::default();
        for request in requests {
            let outcome = match self.settle_request(&request) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        "event=settlement module=inventory status=error request_id={} work_item_id={} error_code={} error={}",
                        request.id,
                        work_item_id,
                        err.code(),
                        err
                    );
                    SettlementOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            report.entries.push(RequestSettlement {
                request_id: request.id,
                item_name: request.item_name,
                outcome,
            });
        }

        info!(
            "event=reconcile module=inventory status=ok project_id={} work_item_id={} examined={} deducted={} unsettled={}",
            project_id,
            work_item_id,
            report.entries.len(),
            report.deducted_count(),
            report.unsettled().count()
        );
        Ok(report)
    }

    /// Intents that have not reached `settled`, for manual audit.
    pub fn pending_settlements(&self) -> RepoResult<Vec<SettlementIntent>> {
        self.intents.list_unsettled_intents()
    }

    fn settle_request(&self, request: &MaterialRequest) -> RepoResult<SettlementOutcome> {
        if request.stock_deducted {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        if self.inventory.get_item(&request.item_name)?.is_none() {
            warn!(
                "event=settlement module=inventory status=warning reason=missing_stock request_id={} item_name={}",
                request.id,
                log_text(&request.item_name)
            );
            return Ok(SettlementOutcome::MissingStock);
        }

        let Some(quantity) = request.deductible_quantity() else {
            warn!(
                "event=settlement module=inventory status=warning reason=invalid_quantity request_id={}",
                request.id
            );
            return Ok(SettlementOutcome::InvalidQuantity {
                quantity: request.quantity.clone(),
            });
        };

        match self.intents.claim_intent(request, quantity)? {
            IntentClaim::Claimed(_) => self.decrement_and_flag(request, quantity),
            IntentClaim::Existing(intent) => self.resume_existing(request, &intent),
        }
    }

    fn decrement_and_flag(
        &self,
        request: &MaterialRequest,
        quantity: f64,
    ) -> RepoResult<SettlementOutcome> {
        let item = match self.inventory.adjust_quantity(&request.item_name, -quantity) {
            Ok(item) => item,
            // No row matched, so nothing was written; the next pass may claim again.
            Err(err) if err.is_not_found() => {
                if let Err(release_err) = self.intents.release_intent(&request.id) {
                    warn!(
                        "event=settlement_release module=inventory status=error request_id={} error={}",
                        request.id, release_err
                    );
                }
                return Err(err);
            }
            // The decrement may have landed; the claimed intent stays for audit.
            Err(err) => {
                warn!(
                    "event=settlement module=inventory status=warning reason=decrement_unknown request_id={} error_code={} error={}",
                    request.id,
                    err.code(),
                    err
                );
                return Err(err);
            }
        };
        if item.quantity < 0.0 {
            warn!(
                "event=settlement module=inventory status=warning reason=negative_stock item_name={} quantity={}",
                log_text(&item.name),
                item.quantity
            );
        }

        self.intents
            .advance_intent(&request.id, IntentState::Claimed, IntentState::Decremented)?;
        self.flag_and_close(request)?;
        self.log_deduction(request, quantity, item.quantity);

        info!(
            "event=settlement module=inventory status=ok request_id={} item_name={} quantity={} remaining={}",
            request.id,
            log_text(&item.name),
            quantity,
            item.quantity
        );
        Ok(SettlementOutcome::Deducted {
            quantity,
            remaining: item.quantity,
        })
    }

    fn resume_existing(
        &self,
        request: &MaterialRequest,
        intent: &SettlementIntent,
    ) -> RepoResult<SettlementOutcome> {
        match intent.state {
            IntentState::Settled => Ok(SettlementOutcome::AlreadySettled),
            IntentState::Claimed => {
                warn!(
                    "event=settlement module=inventory status=warning reason=needs_audit request_id={} intent_updated_at={}",
                    request.id, intent.updated_at
                );
                Ok(SettlementOutcome::NeedsAudit)
            }
            IntentState::Decremented => {
                self.flag_and_close(request)?;
                let remaining = self
                    .inventory
                    .get_item(&intent.item_name)?
                    .map(|item| item.quantity)
                    .unwrap_or_default();
                self.log_deduction(request, intent.quantity, remaining);

                info!(
                    "event=settlement_resume module=inventory status=ok request_id={} quantity={}",
                    request.id, intent.quantity
                );
                Ok(SettlementOutcome::Resumed {
                    quantity: intent.quantity,
                })
            }
        }
    }

    /// Writes the request flag (retried independently), then closes the intent.
    fn flag_and_close(&self, request: &MaterialRequest) -> RepoResult<()> {
        let flipped = retry_conflicts(&self.retry, "material_request", &request.id, |_| {
            self.requests.mark_stock_deducted(&request.id)
        })?;
        if !flipped {
            warn!(
                "event=settlement_flag module=inventory status=warning reason=already_flagged request_id={}",
                request.id
            );
        }

        // The flag is authoritative; a stale intent only shows up in audits.
        if let Err(err) = self.intents.advance_intent(
            &request.id,
            IntentState::Decremented,
            IntentState::Settled,
        ) {
            warn!(
                "event=settlement_close module=inventory status=error request_id={} error_code={} error={}",
                request.id,
                err.code(),
                err
            );
        }
        Ok(())
    }

    fn log_deduction(&self, request: &MaterialRequest, quantity: f64, remaining: f64) {
        if let Err(err) = self
            .activity
            .record_stock_deduction(request, quantity, remaining)
        {
            warn!(
                "event=settlement_activity module=inventory status=error request_id={} error={}",
                request.id, err
            );
        }
    }
}
