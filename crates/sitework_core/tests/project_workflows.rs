use sitework_core::db::open_db_in_memory;
use sitework_core::model::activity::ActivityKind;
use sitework_core::repo::{
    ExperienceRepository, MaterialRequestRepository, RepoError, SqliteLedgerStore,
};
use sitework_core::service::activity_log::ActivityLogWriter;
use sitework_core::{
    CompletionOrchestrator, EngineConfig, MaterialStatus, NewMaterialRequest, NewWorkItem,
    Priority, ProjectWorkflows, StatsAggregator,
};

#[test]
fn project_feed_is_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let workflows = ProjectWorkflows::with_store(&store, EngineConfig::default());
    let project = workflows.create_project("Harbour View").unwrap();
    let item = workflows
        .create_work_item(&project.id, &NewWorkItem::new("Pour slab", Priority::High))
        .unwrap();
    store
        .experience
        .open_account("u-foreman", "Foreman")
        .unwrap();

    workflows
        .raise_rfi(&project.id, "Slab thickness?", "u-engineer")
        .unwrap();
    workflows
        .report_incident(&project.id, Some(&item.id), "Scaffold plank cracked", "u-foreman")
        .unwrap();
    CompletionOrchestrator::with_store(&store, EngineConfig::default())
        .complete_work_item(&item.id, &project.id, "u-foreman", &item)
        .unwrap();

    let feed = ActivityLogWriter::new(&store.activity)
        .project_feed(&project.id, 10)
        .unwrap();
    let kinds: Vec<ActivityKind> = feed.iter().map(|record| record.kind).collect();
    assert_eq!(
        kinds,
        [ActivityKind::Completion, ActivityKind::Incident, ActivityKind::Rfi]
    );

    let incident = &feed[1];
    assert_eq!(incident.actor.as_deref(), Some("u-foreman"));
    assert_eq!(
        incident.metadata.get("work_item_id").and_then(|v| v.as_str()),
        Some(item.id.as_str())
    );
    assert_eq!(incident.description, "Scaffold plank cracked");
    let keys: Vec<&str> = incident.metadata.keys().map(String::as_str).collect();
    assert_eq!(keys, ["work_item_id"]);
    let completion = &feed[0];
    assert_eq!(
        completion.metadata.get("reward").and_then(|v| v.as_i64()),
        Some(80)
    );

    let latest = ActivityLogWriter::new(&store.activity)
        .project_feed(&project.id, 1)
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, completion.id);
}

#[test]
fn incident_on_unknown_project_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let workflows = ProjectWorkflows::with_store(&store, EngineConfig::default());

    let err = workflows
        .report_incident("missing", None, "Water in basement", "u-1")
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn resolving_a_decision_twice_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let workflows = ProjectWorkflows::with_store(&store, EngineConfig::default());
    let stats = StatsAggregator::new(&store.projects);
    let project = workflows.create_project("Harbour View").unwrap();
    let rfi = workflows
        .raise_rfi(&project.id, "Slab thickness?", "u-1")
        .unwrap();

    workflows.resolve_decision(&rfi.id, "u-2").unwrap();
    let err = workflows.resolve_decision(&rfi.id, "u-2").unwrap_err();

    assert!(matches!(err, RepoError::InvalidTransition { .. }));
    assert_eq!(stats.get_stats(&project.id).unwrap().pending_decisions, 0);
}

#[test]
fn material_status_follows_lifecycle() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let workflows = ProjectWorkflows::with_store(&store, EngineConfig::default());
    let stats = StatsAggregator::new(&store.projects);
    let project = workflows.create_project("Harbour View").unwrap();
    let request = workflows
        .request_material(&project.id, &NewMaterialRequest::new("Rebar", "40"))
        .unwrap();

    let err = workflows
        .set_material_status(&request.id, MaterialStatus::Ordered)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidTransition { .. }));

    workflows
        .set_material_status(&request.id, MaterialStatus::Approved)
        .unwrap();
    assert_eq!(stats.get_stats(&project.id).unwrap().pending_stock, 1);

    workflows
        .set_material_status(&request.id, MaterialStatus::Delivered)
        .unwrap();
    assert_eq!(stats.get_stats(&project.id).unwrap().pending_stock, 0);
}

#[test]
fn settled_request_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let config = EngineConfig::default();
    let workflows = ProjectWorkflows::with_store(&store, config.clone());
    let project = workflows.create_project("Harbour View").unwrap();
    let item = workflows
        .create_work_item(&project.id, &NewWorkItem::new("Pour slab", Priority::Low))
        .unwrap();
    workflows.register_stock_item("Cement", 50.0, Some("bag")).unwrap();
    store.experience.open_account("u-1", "Foreman").unwrap();
    let settled = workflows
        .request_material(
            &project.id,
            &NewMaterialRequest::new("Cement", "10").for_work_item(item.id.as_str()),
        )
        .unwrap();
    workflows
        .set_material_status(&settled.id, MaterialStatus::Approved)
        .unwrap();
    let draft = workflows
        .request_material(&project.id, &NewMaterialRequest::new("Sand", "1 t"))
        .unwrap();
    CompletionOrchestrator::with_store(&store, config)
        .complete_work_item(&item.id, &project.id, "u-1", &item)
        .unwrap();

    let err = workflows.delete_material_request(&settled.id).unwrap_err();
    assert!(matches!(err, RepoError::InvalidTransition { .. }));
    assert!(store.materials.get_request(&settled.id).unwrap().is_some());

    workflows.delete_material_request(&draft.id).unwrap();
    assert!(store.materials.get_request(&draft.id).unwrap().is_none());
}

#[test]
fn manual_adjustment_is_logged_without_project() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let workflows = ProjectWorkflows::with_store(&store, EngineConfig::default());
    workflows.register_stock_item("Cement", 50.0, None).unwrap();

    let item = workflows.adjust_stock("Cement", 15.0, "u-storekeeper").unwrap();
    assert_eq!(item.quantity, 65.0);

    let (kind, actor, metadata): (String, Option<String>, String) = conn
        .query_row(
            "SELECT kind, actor, metadata FROM activity_log ORDER BY seq DESC LIMIT 1;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(kind, "adjustment");
    assert_eq!(actor.as_deref(), Some("u-storekeeper"));
    let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(metadata["item_name"], "Cement");
    assert_eq!(metadata["remaining"], 65.0);

    let err = workflows.adjust_stock("Gravel", 1.0, "u-storekeeper").unwrap_err();
    assert!(err.is_not_found());
}
