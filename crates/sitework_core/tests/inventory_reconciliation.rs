use rusqlite::Connection;
use sitework_core::db::open_db_in_memory;
use sitework_core::model::material::{InventoryItem, IntentState, SettlementIntent};
use sitework_core::repo::{
    IntentClaim, InventoryRepository, MaterialRequestRepository, RepoError, RepoResult,
    SettlementIntentRepository, SqliteInventoryRepository, SqliteLedgerStore,
    SqliteMaterialRequestRepository,
};
use sitework_core::service::activity_log::ActivityLogWriter;
use sitework_core::{
    EngineConfig, InventoryReconciler, MaterialRequest, MaterialStatus, NewMaterialRequest,
    NewWorkItem, Priority, ProjectWorkflows, RetryPolicy, SettlementOutcome, WorkItem,
};
use std::cell::Cell;

struct Fixture {
    project_id: String,
    work_item: WorkItem,
}

fn setup(store: &SqliteLedgerStore<'_>) -> Fixture {
    let workflows = ProjectWorkflows::with_store(store, EngineConfig::default());
    let project = workflows.create_project("Harbour View").unwrap();
    let work_item = workflows
        .create_work_item(&project.id, &NewWorkItem::new("Pour slab", Priority::High))
        .unwrap();
    Fixture {
        project_id: project.id,
        work_item,
    }
}

fn approved_request(
    store: &SqliteLedgerStore<'_>,
    fixture: &Fixture,
    item_name: &str,
    quantity: &str,
) -> MaterialRequest {
    let workflows = ProjectWorkflows::with_store(store, EngineConfig::default());
    let request = workflows
        .request_material(
            &fixture.project_id,
            &NewMaterialRequest::new(item_name, quantity)
                .for_work_item(fixture.work_item.id.as_str()),
        )
        .unwrap();
    workflows
        .set_material_status(&request.id, MaterialStatus::Approved)
        .unwrap()
}

fn reconciler<'a>(store: &'a SqliteLedgerStore<'_>) -> InventoryReconciler<'a> {
    InventoryReconciler::new(
        &store.inventory,
        &store.inventory,
        &store.materials,
        ActivityLogWriter::new(&store.activity),
        RetryPolicy::immediate(3),
    )
}

fn stock(store: &SqliteLedgerStore<'_>, name: &str) -> f64 {
    store.inventory.get_item(name).unwrap().unwrap().quantity
}

fn stock_activity_count(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM activity_log WHERE kind = 'stock';",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn matched_request_is_deducted_and_unmatched_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, Some("bag")).unwrap();
    let cement = approved_request(&store, &fixture, "Cement", "20");
    let tiles = approved_request(&store, &fixture, "Marble tiles", "12");

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert_eq!(stock(&store, "Cement"), 80.0);
    assert_eq!(
        report.outcome_for(&cement.id),
        Some(&SettlementOutcome::Deducted {
            quantity: 20.0,
            remaining: 80.0
        })
    );
    assert_eq!(report.outcome_for(&tiles.id), Some(&SettlementOutcome::MissingStock));
    assert_eq!(report.deducted_count(), 1);

    let unsettled: Vec<&str> = report
        .unsettled()
        .map(|entry| entry.request_id.as_str())
        .collect();
    assert_eq!(unsettled, [tiles.id.as_str()]);

    assert!(store.materials.get_request(&cement.id).unwrap().unwrap().stock_deducted);
    assert!(!store.materials.get_request(&tiles.id).unwrap().unwrap().stock_deducted);
    assert!(store.inventory.get_item("Marble tiles").unwrap().is_none());
    assert_eq!(stock_activity_count(&conn), 1);
}

#[test]
fn second_pass_leaves_stock_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let cement = approved_request(&store, &fixture, "Cement", "20 bags");
    let reconciler = reconciler(&store);

    reconciler
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    let second = reconciler
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert_eq!(stock(&store, "Cement"), 80.0);
    assert_eq!(
        second.outcome_for(&cement.id),
        Some(&SettlementOutcome::AlreadySettled)
    );
    assert_eq!(second.unsettled().count(), 0);
    assert_eq!(stock_activity_count(&conn), 1);
    assert!(reconciler.pending_settlements().unwrap().is_empty());
}

#[test]
fn unapproved_and_unlinked_requests_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    store
        .materials
        .create_request(
            &fixture.project_id,
            &NewMaterialRequest::new("Cement", "10")
                .for_work_item(fixture.work_item.id.as_str()),
        )
        .unwrap();
    let unlinked = store
        .materials
        .create_request(&fixture.project_id, &NewMaterialRequest::new("Cement", "5"))
        .unwrap();
    store
        .materials
        .update_status(&unlinked.id, MaterialStatus::Requested, MaterialStatus::Approved)
        .unwrap();

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert!(report.entries.is_empty());
    assert_eq!(stock(&store, "Cement"), 100.0);
}

#[test]
fn unparsable_quantity_is_a_warning_without_writes() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "a few bags");

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert!(matches!(
        report.outcome_for(&request.id),
        Some(SettlementOutcome::InvalidQuantity { .. })
    ));
    assert_eq!(stock(&store, "Cement"), 100.0);
    assert!(store.inventory.get_intent(&request.id).unwrap().is_none());
}

#[test]
fn decremented_intent_is_resumed_without_second_decrement() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");

    // Crash window: decrement applied, flag never written.
    store.inventory.claim_intent(&request, 20.0).unwrap();
    store.inventory.adjust_quantity("Cement", -20.0).unwrap();
    store
        .inventory
        .advance_intent(&request.id, IntentState::Claimed, IntentState::Decremented)
        .unwrap();
    assert_eq!(reconciler(&store).pending_settlements().unwrap().len(), 1);

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert_eq!(
        report.outcome_for(&request.id),
        Some(&SettlementOutcome::Resumed { quantity: 20.0 })
    );
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert!(store.materials.get_request(&request.id).unwrap().unwrap().stock_deducted);
    let intent = store.inventory.get_intent(&request.id).unwrap().unwrap();
    assert_eq!(intent.state, IntentState::Settled);
    assert!(reconciler(&store).pending_settlements().unwrap().is_empty());
}

#[test]
fn claimed_intent_is_reported_for_audit() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");
    store.inventory.claim_intent(&request, 20.0).unwrap();

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert_eq!(report.outcome_for(&request.id), Some(&SettlementOutcome::NeedsAudit));
    assert!(report.outcome_for(&request.id).unwrap().is_unsettled());
    assert_eq!(stock(&store, "Cement"), 100.0);
    assert!(!store.materials.get_request(&request.id).unwrap().unwrap().stock_deducted);
}

#[test]
fn stock_may_go_negative() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 5.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "8");

    let report = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();

    assert_eq!(
        report.outcome_for(&request.id),
        Some(&SettlementOutcome::Deducted {
            quantity: 8.0,
            remaining: -3.0
        })
    );
}

fn intent_state(store: &SqliteLedgerStore<'_>, request_id: &str) -> Option<IntentState> {
    store
        .inventory
        .get_intent(request_id)
        .unwrap()
        .map(|intent| intent.state)
}

fn is_flagged(store: &SqliteLedgerStore<'_>, request_id: &str) -> bool {
    store
        .materials
        .get_request(request_id)
        .unwrap()
        .unwrap()
        .stock_deducted
}

/// Stock store whose decrement either lands and then errors, or never
/// matches a row.
struct FailingStock<'a> {
    inner: &'a SqliteInventoryRepository<'a>,
    applies_before_failing: bool,
}

impl InventoryRepository for FailingStock<'_> {
    fn register_item(
        &self,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
    ) -> RepoResult<InventoryItem> {
        self.inner.register_item(name, quantity, unit)
    }

    fn get_item(&self, name: &str) -> RepoResult<Option<InventoryItem>> {
        self.inner.get_item(name)
    }

    fn list_items(&self) -> RepoResult<Vec<InventoryItem>> {
        self.inner.list_items()
    }

    fn adjust_quantity(&self, name: &str, delta: f64) -> RepoResult<InventoryItem> {
        if !self.applies_before_failing {
            return Err(RepoError::not_found("inventory_item", name));
        }
        self.inner.adjust_quantity(name, delta)?;
        Err(RepoError::InvalidData("stock read-back failed".to_string()))
    }
}

/// Intent store that cannot record a completed decrement.
struct StuckIntents<'a> {
    inner: &'a SqliteInventoryRepository<'a>,
}

impl SettlementIntentRepository for StuckIntents<'_> {
    fn claim_intent(&self, request: &MaterialRequest, quantity: f64) -> RepoResult<IntentClaim> {
        self.inner.claim_intent(request, quantity)
    }

    fn get_intent(&self, request_id: &str) -> RepoResult<Option<SettlementIntent>> {
        self.inner.get_intent(request_id)
    }

    fn advance_intent(
        &self,
        request_id: &str,
        from: IntentState,
        to: IntentState,
    ) -> RepoResult<()> {
        if from == IntentState::Claimed {
            return Err(RepoError::InvalidData("intent store offline".to_string()));
        }
        self.inner.advance_intent(request_id, from, to)
    }

    fn release_intent(&self, request_id: &str) -> RepoResult<bool> {
        self.inner.release_intent(request_id)
    }

    fn list_unsettled_intents(&self) -> RepoResult<Vec<SettlementIntent>> {
        self.inner.list_unsettled_intents()
    }
}

/// Request store whose flag write always loses the race.
struct ContendedFlag<'a> {
    inner: &'a SqliteMaterialRequestRepository<'a>,
    flag_attempts: Cell<u32>,
}

impl MaterialRequestRepository for ContendedFlag<'_> {
    fn create_request(
        &self,
        project_id: &str,
        input: &NewMaterialRequest,
    ) -> RepoResult<MaterialRequest> {
        self.inner.create_request(project_id, input)
    }

    fn get_request(&self, id: &str) -> RepoResult<Option<MaterialRequest>> {
        self.inner.get_request(id)
    }

    fn list_for_work_item(
        &self,
        project_id: &str,
        work_item_id: &str,
        status: MaterialStatus,
    ) -> RepoResult<Vec<MaterialRequest>> {
        self.inner.list_for_work_item(project_id, work_item_id, status)
    }

    fn list_for_project(&self, project_id: &str) -> RepoResult<Vec<MaterialRequest>> {
        self.inner.list_for_project(project_id)
    }

    fn update_status(
        &self,
        id: &str,
        expected: MaterialStatus,
        next: MaterialStatus,
    ) -> RepoResult<MaterialRequest> {
        self.inner.update_status(id, expected, next)
    }

    fn mark_stock_deducted(&self, id: &str) -> RepoResult<bool> {
        self.flag_attempts.set(self.flag_attempts.get() + 1);
        Err(RepoError::conflict("material_request", id))
    }

    fn delete_request(&self, id: &str) -> RepoResult<MaterialRequest> {
        self.inner.delete_request(id)
    }
}

#[test]
fn decrement_with_unknown_outcome_is_never_repeated() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");
    let stock_double = FailingStock {
        inner: &store.inventory,
        applies_before_failing: true,
    };
    let failing = InventoryReconciler::new(
        &stock_double,
        &store.inventory,
        &store.materials,
        ActivityLogWriter::new(&store.activity),
        RetryPolicy::immediate(3),
    );

    let first = failing
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert!(matches!(
        first.outcome_for(&request.id),
        Some(SettlementOutcome::Failed { .. })
    ));
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert_eq!(intent_state(&store, &request.id), Some(IntentState::Claimed));

    let second = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert_eq!(second.outcome_for(&request.id), Some(&SettlementOutcome::NeedsAudit));
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert!(!is_flagged(&store, &request.id));
    assert_eq!(reconciler(&store).pending_settlements().unwrap().len(), 1);
}

#[test]
fn unmatched_decrement_releases_the_claim() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");
    let stock_double = FailingStock {
        inner: &store.inventory,
        applies_before_failing: false,
    };
    let failing = InventoryReconciler::new(
        &stock_double,
        &store.inventory,
        &store.materials,
        ActivityLogWriter::new(&store.activity),
        RetryPolicy::immediate(3),
    );

    let first = failing
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert!(matches!(
        first.outcome_for(&request.id),
        Some(SettlementOutcome::Failed { .. })
    ));
    assert_eq!(stock(&store, "Cement"), 100.0);
    assert_eq!(intent_state(&store, &request.id), None);

    let second = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert_eq!(
        second.outcome_for(&request.id),
        Some(&SettlementOutcome::Deducted {
            quantity: 20.0,
            remaining: 80.0
        })
    );
    assert!(is_flagged(&store, &request.id));
}

#[test]
fn unrecorded_decrement_is_left_for_audit() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");
    let intents = StuckIntents {
        inner: &store.inventory,
    };
    let failing = InventoryReconciler::new(
        &store.inventory,
        &intents,
        &store.materials,
        ActivityLogWriter::new(&store.activity),
        RetryPolicy::immediate(3),
    );

    let first = failing
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert!(matches!(
        first.outcome_for(&request.id),
        Some(SettlementOutcome::Failed { .. })
    ));
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert_eq!(intent_state(&store, &request.id), Some(IntentState::Claimed));
    assert!(!is_flagged(&store, &request.id));

    let second = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert_eq!(second.outcome_for(&request.id), Some(&SettlementOutcome::NeedsAudit));
    assert_eq!(stock(&store, "Cement"), 80.0);
}

#[test]
fn contended_flag_write_is_resumed_on_the_next_pass() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let fixture = setup(&store);
    store.inventory.register_item("Cement", 100.0, None).unwrap();
    let request = approved_request(&store, &fixture, "Cement", "20");
    let requests = ContendedFlag {
        inner: &store.materials,
        flag_attempts: Cell::new(0),
    };
    let failing = InventoryReconciler::new(
        &store.inventory,
        &store.inventory,
        &requests,
        ActivityLogWriter::new(&store.activity),
        RetryPolicy::immediate(3),
    );

    let first = failing
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert!(matches!(
        first.outcome_for(&request.id),
        Some(SettlementOutcome::Failed { .. })
    ));
    assert_eq!(requests.flag_attempts.get(), 3);
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert_eq!(intent_state(&store, &request.id), Some(IntentState::Decremented));
    assert!(!is_flagged(&store, &request.id));

    let second = reconciler(&store)
        .reconcile_work_item(&fixture.project_id, &fixture.work_item.id)
        .unwrap();
    assert_eq!(
        second.outcome_for(&request.id),
        Some(&SettlementOutcome::Resumed { quantity: 20.0 })
    );
    assert_eq!(stock(&store, "Cement"), 80.0);
    assert!(is_flagged(&store, &request.id));
    assert_eq!(intent_state(&store, &request.id), Some(IntentState::Settled));
}
