//! Port contract shared by both storage adapters.
//!
//! Every test body runs once per adapter; a behavior difference between
//! statement mode and repository mode fails here.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::OptionalExtension;
use sepuling_core::db::{open_db, open_target, DbError, DbTarget, PoolOptions};
use sepuling_core::repo::state::SepulkaRow;
use sepuling_core::{
    AggregateRoot, RepoError, SepulkaRepository, SepulkaValidationError, SqliteSepulkaRepository,
    SqlxSepulkaRepository, Touch,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

const RACERS: usize = 8;

fn open_statement(target: &DbTarget) -> SqliteSepulkaRepository {
    SqliteSepulkaRepository::try_new(open_target(target).unwrap()).unwrap()
}

fn open_sqlx(target: &DbTarget) -> SqlxSepulkaRepository {
    SqlxSepulkaRepository::connect(target, PoolOptions::default()).unwrap()
}

fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 987_654_321).single().unwrap()
}

fn stored_row(path: &Path, internal_id: Uuid) -> Option<SepulkaRow> {
    let conn = open_db(path).unwrap();
    conn.query_row(
        "SELECT internal_id, external_id, revision, created_at, updated_at
         FROM sepulkas WHERE internal_id = ?1;",
        [internal_id.to_string()],
        |row| {
            Ok(SepulkaRow {
                internal_id: row.get(0)?,
                external_id: row.get(1)?,
                revision: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()
    .unwrap()
}

fn stored_count(path: &Path, external_id: &str) -> i64 {
    let conn = open_db(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sepulkas WHERE external_id = ?1;",
        [external_id],
        |row| row.get(0),
    )
    .unwrap()
}

macro_rules! repo_contract {
    ($adapter:ident, $open:ident) => {
        mod $adapter {
            use super::*;

            fn open_memory() -> impl SepulkaRepository {
                $open(&DbTarget::Memory)
            }

            fn open_file(path: &Path) -> impl SepulkaRepository {
                $open(&DbTarget::File(path.to_path_buf()))
            }

            #[test]
            fn added_aggregate_is_found_by_both_keys() {
                let repo = open_memory();
                let aggregate = AggregateRoot::register("alice-1", fixed_now());

                let stored = repo.add(&aggregate).unwrap();
                assert_eq!(stored, aggregate);

                assert_eq!(
                    repo.find_by_external_id("alice-1").unwrap(),
                    Some(aggregate.existence())
                );
                assert_eq!(
                    repo.find_by_internal_id(aggregate.internal_id).unwrap(),
                    Some(aggregate.preview())
                );
            }

            #[test]
            fn lookups_of_unknown_keys_return_none() {
                let repo = open_memory();

                assert_eq!(repo.find_by_external_id("nobody").unwrap(), None);
                assert_eq!(repo.find_by_internal_id(Uuid::new_v4()).unwrap(), None);
            }

            #[test]
            fn external_id_lookup_is_exact() {
                let repo = open_memory();
                repo.add(&AggregateRoot::register("alice-1", fixed_now()))
                    .unwrap();

                assert_eq!(repo.find_by_external_id("Alice-1").unwrap(), None);
                assert_eq!(repo.find_by_external_id("alice-").unwrap(), None);
            }

            #[test]
            fn duplicate_external_id_is_rejected_and_first_row_kept() {
                let repo = open_memory();
                let first = AggregateRoot::register("alice-1", fixed_now());
                let second = AggregateRoot::register("alice-1", fixed_now());
                repo.add(&first).unwrap();

                let err = repo.add(&second).unwrap_err();
                assert!(
                    matches!(&err, RepoError::DuplicateExternalId(id) if id == "alice-1"),
                    "unexpected error: {err}"
                );
                assert_eq!(
                    repo.find_by_external_id("alice-1").unwrap(),
                    Some(first.existence())
                );
                assert_eq!(repo.find_by_internal_id(second.internal_id).unwrap(), None);
            }

            #[test]
            fn add_rejects_aggregate_breaking_model_invariants() {
                let repo = open_memory();
                let mut aggregate = AggregateRoot::register("bob", fixed_now());
                aggregate.updated_at = aggregate.created_at - Duration::seconds(1);

                let err = repo.add(&aggregate).unwrap_err();
                assert!(matches!(
                    err,
                    RepoError::Validation(SepulkaValidationError::UpdatedBeforeCreated { .. })
                ));
                assert_eq!(repo.find_by_external_id("bob").unwrap(), None);
            }

            #[test]
            fn update_at_observed_revision_succeeds_once() {
                let repo = open_memory();
                let aggregate = AggregateRoot::register("carol", fixed_now());
                repo.add(&aggregate).unwrap();
                let later = fixed_now() + Duration::seconds(5);

                repo.update_by(aggregate.internal_id, &aggregate.touch(later))
                    .unwrap();

                let err = repo
                    .update_by(aggregate.internal_id, &aggregate.touch(later))
                    .unwrap_err();
                assert!(
                    matches!(err, RepoError::Contention(id) if id == aggregate.internal_id)
                );

                // Stored revision is now 1.
                let next = Touch {
                    revision: 1,
                    updated_at: later,
                };
                repo.update_by(aggregate.internal_id, &next).unwrap();
            }

            #[test]
            fn update_of_unknown_id_is_contention() {
                let repo = open_memory();
                let missing = Uuid::new_v4();
                let touch = Touch {
                    revision: 0,
                    updated_at: fixed_now(),
                };

                let err = repo.update_by(missing, &touch).unwrap_err();
                assert!(matches!(err, RepoError::Contention(id) if id == missing));
            }

            #[test]
            fn timestamps_outside_storable_years_never_reach_the_store() {
                let repo = open_memory();
                let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).single().unwrap();

                let err = repo
                    .add(&AggregateRoot::register("far", far))
                    .unwrap_err();
                assert!(
                    matches!(
                        err,
                        RepoError::Validation(SepulkaValidationError::TimestampOutOfRange { .. })
                    ),
                    "unexpected error: {err}"
                );
                assert_eq!(repo.find_by_external_id("far").unwrap(), None);

                let aggregate = AggregateRoot::register("near", fixed_now());
                repo.add(&aggregate).unwrap();
                let err = repo
                    .update_by(aggregate.internal_id, &aggregate.touch(far))
                    .unwrap_err();
                assert!(matches!(
                    err,
                    RepoError::Validation(SepulkaValidationError::TimestampOutOfRange { .. })
                ));

                // Revision 0 is still current.
                repo.update_by(
                    aggregate.internal_id,
                    &aggregate.touch(fixed_now() + Duration::seconds(1)),
                )
                .unwrap();
                assert_eq!(
                    repo.find_by_internal_id(aggregate.internal_id).unwrap(),
                    Some(aggregate.preview())
                );
            }

            #[test]
            fn update_before_creation_time_is_rejected() {
                let repo = open_memory();
                let aggregate = AggregateRoot::register("ivan", fixed_now());
                repo.add(&aggregate).unwrap();

                let earlier = aggregate.touch(aggregate.created_at - Duration::days(1));
                let err = repo.update_by(aggregate.internal_id, &earlier).unwrap_err();
                assert!(
                    matches!(
                        err,
                        RepoError::Validation(
                            SepulkaValidationError::UpdatedBeforeStoredCreation { .. }
                        )
                    ),
                    "unexpected error: {err}"
                );

                // Same instant as creation is allowed, and revision 0 is still current.
                repo.update_by(
                    aggregate.internal_id,
                    &aggregate.touch(aggregate.created_at),
                )
                .unwrap();
            }

            #[test]
            fn update_keeps_identity_and_creation_time() {
                let repo = open_memory();
                let aggregate = AggregateRoot::register("dave", fixed_now());
                repo.add(&aggregate).unwrap();

                repo.update_by(
                    aggregate.internal_id,
                    &aggregate.touch(fixed_now() + Duration::minutes(1)),
                )
                .unwrap();

                assert_eq!(
                    repo.find_by_internal_id(aggregate.internal_id).unwrap(),
                    Some(aggregate.preview())
                );
                assert_eq!(
                    repo.find_by_external_id("dave").unwrap(),
                    Some(aggregate.existence())
                );
            }

            #[test]
            fn stored_row_matches_aggregate_field_for_field() {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("rows.sqlite3");
                let repo = open_file(&path);
                let aggregate = AggregateRoot::register("erin", fixed_now());
                repo.add(&aggregate).unwrap();

                let row = stored_row(&path, aggregate.internal_id).unwrap();
                assert_eq!(row, SepulkaRow::from_domain(&aggregate));
                assert_eq!(row.into_domain().unwrap(), aggregate);

                let later = fixed_now() + Duration::nanoseconds(1);
                repo.update_by(aggregate.internal_id, &aggregate.touch(later))
                    .unwrap();
                let updated = stored_row(&path, aggregate.internal_id)
                    .unwrap()
                    .into_domain()
                    .unwrap();
                assert_eq!(updated.revision, 1);
                assert_eq!(updated.updated_at, later);
                assert_eq!(updated.created_at, aggregate.created_at);
            }

            #[test]
            fn concurrent_updates_at_same_revision_have_one_winner() {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("race.sqlite3");
                let aggregate = AggregateRoot::register("frank", fixed_now());
                open_file(&path).add(&aggregate).unwrap();

                let barrier = Arc::new(Barrier::new(RACERS));
                let handles: Vec<_> = (0..RACERS)
                    .map(|i| {
                        let path = path.clone();
                        let barrier = Arc::clone(&barrier);
                        let touch = aggregate.touch(fixed_now() + Duration::seconds(i as i64));
                        let internal_id = aggregate.internal_id;
                        thread::spawn(move || {
                            let repo = open_file(&path);
                            barrier.wait();
                            repo.update_by(internal_id, &touch)
                        })
                    })
                    .collect();
                let results: Vec<_> = handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .collect();

                let winners = results.iter().filter(|result| result.is_ok()).count();
                assert_eq!(winners, 1, "results: {results:?}");
                assert!(results.iter().all(|result| matches!(
                    result,
                    Ok(()) | Err(RepoError::Contention(_))
                )));

                let row = stored_row(&path, aggregate.internal_id).unwrap();
                assert_eq!(row.revision, 1);
            }

            #[test]
            fn concurrent_adds_of_same_external_id_have_one_winner() {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("dup.sqlite3");
                drop(open_file(&path));

                let barrier = Arc::new(Barrier::new(RACERS));
                let handles: Vec<_> = (0..RACERS)
                    .map(|_| {
                        let path = path.clone();
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            let repo = open_file(&path);
                            let aggregate = AggregateRoot::register("grace", Utc::now());
                            barrier.wait();
                            repo.add(&aggregate).map(|_| ())
                        })
                    })
                    .collect();
                let results: Vec<_> = handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .collect();

                let winners = results.iter().filter(|result| result.is_ok()).count();
                assert_eq!(winners, 1, "results: {results:?}");
                assert!(results.iter().all(|result| matches!(
                    result,
                    Ok(()) | Err(RepoError::DuplicateExternalId(_))
                )));
                assert_eq!(stored_count(&path, "grace"), 1);
            }
        }
    };
}

repo_contract!(statement_mode, open_statement);
repo_contract!(repository_mode, open_sqlx);

#[test]
fn one_sqlx_adapter_can_be_shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.sqlite3");
    let repo = Arc::new(open_sqlx(&DbTarget::File(path.clone())));
    let aggregate = AggregateRoot::register("heidi", fixed_now());
    repo.add(&aggregate).unwrap();

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            let touch = aggregate.touch(fixed_now());
            let internal_id = aggregate.internal_id;
            thread::spawn(move || {
                barrier.wait();
                repo.update_by(internal_id, &touch).is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(stored_row(&path, aggregate.internal_id).unwrap().revision, 1);
}

#[test]
fn statement_adapter_rejects_connections_with_wrong_schema_version() {
    let unmigrated = rusqlite::Connection::open_in_memory().unwrap();
    let err = SqliteSepulkaRepository::try_new(unmigrated).err().unwrap();
    assert!(
        matches!(
            err,
            RepoError::Db(DbError::SchemaNotMigrated { db_version: 0, .. })
        ),
        "unexpected error: {err}"
    );

    let newer = rusqlite::Connection::open_in_memory().unwrap();
    newer.execute_batch("PRAGMA user_version = 999;").unwrap();
    let err = SqliteSepulkaRepository::try_new(newer).err().unwrap();
    assert!(matches!(
        err,
        RepoError::Db(DbError::UnsupportedSchemaVersion { db_version: 999, .. })
    ));
}

#[test]
fn sqlx_adapter_can_be_dropped_inside_a_tokio_context() {
    let repo = open_sqlx(&DbTarget::Memory);
    repo.add(&AggregateRoot::register("judy", fixed_now()))
        .unwrap();

    let outer = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    outer.block_on(async move {
        drop(repo);
    });
}
