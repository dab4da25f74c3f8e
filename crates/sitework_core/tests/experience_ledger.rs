use sitework_core::db::{open_db, open_db_in_memory};
use sitework_core::repo::{ExperienceRepository, RepoError, SqliteExperienceRepository};
use sitework_core::{level_for, ExperienceLedger, RetryPolicy};
use std::thread;

const LEVEL_SIZE: i64 = 1000;

#[test]
fn grant_updates_experience_and_level_together() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, RetryPolicy::immediate(3));
    ledger.open_account("u-1", "Site lead").unwrap();

    let account = ledger.grant_experience("u-1", 950, "completion:wi-1").unwrap();
    assert_eq!(account.experience, 950);
    assert_eq!(account.level, 1);

    let account = ledger.grant_experience("u-1", 100, "completion:wi-2").unwrap();
    assert_eq!(account.experience, 1050);
    assert_eq!(account.level, 2);
    assert_eq!(account.level, level_for(account.experience, LEVEL_SIZE));
}

#[test]
fn grant_to_missing_account_is_not_found_and_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, RetryPolicy::immediate(3));

    let err = ledger.grant_experience("ghost", 100, "completion:wi-1").unwrap_err();
    assert!(err.is_not_found());
    assert!(repo.get_account("ghost").unwrap().is_none());
}

#[test]
fn negative_correction_is_applied() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, RetryPolicy::immediate(3));
    ledger.open_account("u-1", "Site lead").unwrap();
    ledger.grant_experience("u-1", 1200, "completion:wi-1").unwrap();

    let account = ledger.grant_experience("u-1", -300, "correction").unwrap();
    assert_eq!(account.experience, 900);
    assert_eq!(account.level, 1);
}

#[test]
fn overflowing_grant_is_rejected_without_a_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, RetryPolicy::immediate(3));
    ledger.open_account("u-1", "Site lead").unwrap();
    let before = ledger.grant_experience("u-1", 500, "completion:wi-1").unwrap();

    let err = ledger
        .grant_experience("u-1", i64::MAX, "completion:wi-2")
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert_eq!(repo.get_account("u-1").unwrap().unwrap(), before);
}

#[test]
fn opening_an_account_twice_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    repo.open_account("u-1", "Site lead").unwrap();

    let err = repo.open_account("u-1", "Someone else").unwrap_err();
    assert!(matches!(err, RepoError::AlreadyExists { .. }));
}

#[test]
fn stale_version_write_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    let account = repo.open_account("u-1", "Site lead").unwrap();
    repo.write_experience("u-1", account.version, 10, 1).unwrap();

    let err = repo
        .write_experience("u-1", account.version, 20, 1)
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict { .. }));
}

#[test]
fn diverged_level_is_rejected_on_read() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteExperienceRepository::new(&conn);
    repo.open_account("u-1", "Site lead").unwrap();
    conn.execute(
        "UPDATE experience_accounts SET experience = 2500, level = 1 WHERE user_id = 'u-1';",
        [],
    )
    .unwrap();
    let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, RetryPolicy::immediate(3));

    let err = ledger.get_account("u-1").unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn concurrent_grants_on_separate_connections_lose_no_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let conn = open_db(&path).unwrap();
        SqliteExperienceRepository::new(&conn)
            .open_account("u-1", "Site lead")
            .unwrap();
    }

    const WORKERS: i64 = 4;
    const GRANTS_PER_WORKER: i64 = 25;
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let repo = SqliteExperienceRepository::new(&conn);
                let retry = RetryPolicy {
                    max_attempts: 200,
                    backoff_ms: 1,
                };
                let ledger = ExperienceLedger::new(&repo, LEVEL_SIZE, retry);
                for _ in 0..GRANTS_PER_WORKER {
                    ledger.grant_experience("u-1", 10, "concurrency").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let account = SqliteExperienceRepository::new(&conn)
        .get_account("u-1")
        .unwrap()
        .unwrap();
    assert_eq!(account.experience, WORKERS * GRANTS_PER_WORKER * 10);
    assert_eq!(account.level, level_for(account.experience, LEVEL_SIZE));
    assert_eq!(account.version, WORKERS * GRANTS_PER_WORKER);
}
