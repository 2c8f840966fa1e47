//! Statement-mapped adapter on rusqlite.
//!
//! # Responsibility
//! - Implement the storage port with one hand-written SQL statement per
//!   operation and explicitly bound parameters.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `AggregateRoot::validate()` before SQL mutations.
//! - The update statement compares and bumps `revision` in one step.
//! - `updated_at >= created_at` on update is enforced by the schema CHECK.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::sepulka::{
    AggregateRoot, Existence, InternalId, Preview, SepulkaValidationError, Touch,
};
use crate::repo::state::{encode_id, ExistenceRow, PreviewRow, SepulkaRow, TouchRow};
use crate::repo::{RepoError, RepoResult, SepulkaRepository};
use log::{debug, warn};
use rusqlite::{named_params, Connection, OptionalExtension};

const INSERT_SQL: &str = "INSERT INTO sepulkas (
    internal_id,
    external_id,
    revision,
    created_at,
    updated_at
) VALUES (
    :internal_id,
    :external_id,
    :revision,
    :created_at,
    :updated_at
);";

const SELECT_EXISTENCE_SQL: &str = "SELECT
    internal_id
FROM sepulkas
WHERE external_id = :external_id;";

const SELECT_PREVIEW_SQL: &str = "SELECT
    external_id,
    created_at
FROM sepulkas
WHERE internal_id = :internal_id;";

const UPDATE_SQL: &str = "UPDATE sepulkas
SET revision = revision + 1,
    updated_at = :updated_at
WHERE internal_id = :internal_id
  AND revision = :revision;";

/// rusqlite-backed sepulka repository.
///
/// Owns one connection; use one instance per thread.
pub struct SqliteSepulkaRepository {
    conn: Connection,
}

impl SqliteSepulkaRepository {
    /// Wraps a connection whose schema is already at the latest version.
    ///
    /// Connections from `db::open_db*` always satisfy this.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let latest = latest_version();
        if version > latest {
            return Err(DbError::UnsupportedSchemaVersion {
                db_version: version,
                latest_supported: latest,
            }
            .into());
        }
        if version < latest {
            return Err(DbError::SchemaNotMigrated {
                db_version: version,
                expected: latest,
            }
            .into());
        }
        Ok(Self { conn })
    }

    /// Underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SepulkaRepository for SqliteSepulkaRepository {
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot> {
        aggregate.validate()?;
        let row = SepulkaRow::from_domain(aggregate);

        let inserted = self.conn.execute(
            INSERT_SQL,
            named_params! {
                ":internal_id": row.internal_id,
                ":external_id": row.external_id,
                ":revision": row.revision,
                ":created_at": row.created_at,
                ":updated_at": row.updated_at,
            },
        );

        match inserted {
            Ok(_) => {
                debug!(
                    "event=sepulka_add module=repo adapter=statement status=ok internal_id={}",
                    aggregate.internal_id
                );
                Ok(aggregate.clone())
            }
            Err(err) if is_external_id_conflict(&err) => Err(RepoError::DuplicateExternalId(
                aggregate.external_id.clone(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        let row = self
            .conn
            .query_row(
                SELECT_EXISTENCE_SQL,
                named_params! { ":external_id": external_id },
                |row| {
                    Ok(ExistenceRow {
                        internal_id: row.get("internal_id")?,
                    })
                },
            )
            .optional()?;

        row.map(ExistenceRow::into_domain).transpose()
    }

    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>> {
        let row = self
            .conn
            .query_row(
                SELECT_PREVIEW_SQL,
                named_params! { ":internal_id": encode_id(internal_id) },
                |row| {
                    Ok(PreviewRow {
                        external_id: row.get("external_id")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;

        row.map(PreviewRow::into_domain).transpose()
    }

    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()> {
        touch.validate()?;
        let row = TouchRow::from_domain(touch);

        let matched = match self.conn.execute(
            UPDATE_SQL,
            named_params! {
                ":updated_at": row.updated_at,
                ":internal_id": encode_id(internal_id),
                ":revision": row.revision,
            },
        ) {
            Ok(matched) => matched,
            Err(err) if is_updated_before_created(&err) => {
                return Err(SepulkaValidationError::UpdatedBeforeStoredCreation {
                    updated_at: touch.updated_at,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };

        if matched == 0 {
            warn!(
                "event=sepulka_update module=repo adapter=statement status=contention internal_id={} expected_revision={}",
                internal_id, touch.revision
            );
            return Err(RepoError::Contention(internal_id));
        }

        debug!(
            "event=sepulka_update module=repo adapter=statement status=ok internal_id={} revision={}",
            internal_id,
            u64::from(touch.revision) + 1
        );
        Ok(())
    }
}

fn is_external_id_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains("sepulkas.external_id")
    )
}

fn is_updated_before_created(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
                && message.contains("sepulkas_updated_after_created")
    )
}
