//! Repository-style adapter on sqlx.
//!
//! # Responsibility
//! - `SepulkaEntityRepository`: async, entity-level data access over a
//!   `SqlitePool` with `FromRow`-derived row mapping.
//! - `SqlxSepulkaRepository`: storage port implementation that maps domain
//!   values to entities and drives the async repository on an owned runtime.
//!
//! # Invariants
//! - Each port call runs exactly one statement against the pool.
//! - `update_revision` is a compare-and-swap on `revision`, never a
//!   read-modify-write.
//! - Port methods must not be called from inside another tokio runtime.

use crate::db::{connect_pool, DbError, DbTarget, PoolOptions};
use crate::model::sepulka::{
    AggregateRoot, Existence, InternalId, Preview, SepulkaValidationError, Touch,
};
use crate::repo::state::{encode_id, ExistenceRow, PreviewRow, SepulkaRow, TouchRow};
use crate::repo::{RepoError, RepoResult, SepulkaRepository};
use log::{debug, info, warn};
use sqlx::error::ErrorKind;
use sqlx::SqlitePool;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};

const RUNTIME_WORKER_THREADS: usize = 2;

/// Entity-level repository over the `sepulkas` table.
#[derive(Debug, Clone)]
pub struct SepulkaEntityRepository {
    pool: SqlitePool,
}

impl SepulkaEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a new entity and returns it as stored.
    pub async fn save(&self, entity: &SepulkaRow) -> Result<SepulkaRow, sqlx::Error> {
        sqlx::query_as::<_, SepulkaRow>(
            r#"
            INSERT INTO sepulkas (internal_id, external_id, revision, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING internal_id, external_id, revision, created_at, updated_at
            "#,
        )
        .bind(&entity.internal_id)
        .bind(&entity.external_id)
        .bind(entity.revision)
        .bind(&entity.created_at)
        .bind(&entity.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ExistenceRow>, sqlx::Error> {
        sqlx::query_as::<_, ExistenceRow>(
            "SELECT internal_id FROM sepulkas WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<PreviewRow>, sqlx::Error> {
        sqlx::query_as::<_, PreviewRow>(
            "SELECT external_id, created_at FROM sepulkas WHERE internal_id = ?",
        )
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Bumps the revision when it still equals `touch.revision`.
    ///
    /// Returns the number of matched rows (0 or 1).
    pub async fn update_revision(
        &self,
        internal_id: &str,
        touch: &TouchRow,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sepulkas
            SET revision = revision + 1,
                updated_at = ?
            WHERE internal_id = ?
              AND revision = ?
            "#,
        )
        .bind(&touch.updated_at)
        .bind(internal_id)
        .bind(touch.revision)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// sqlx-backed sepulka repository with a blocking port surface.
///
/// `Send + Sync`; one instance can be shared across threads.
pub struct SqlxSepulkaRepository {
    repository: SepulkaEntityRepository,
    /// Taken only by `Drop`.
    runtime: Option<Runtime>,
}

impl SqlxSepulkaRepository {
    /// Starts the storage runtime, connects the pool and applies migrations.
    pub fn connect(target: &DbTarget, options: PoolOptions) -> RepoResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKER_THREADS)
            .thread_name("sepuling-sqlx")
            .enable_all()
            .build()
            .map_err(DbError::Runtime)?;

        let pool = runtime.block_on(connect_pool(target, options))?;
        info!(
            "event=adapter_ready module=repo adapter=repository mode={} max_connections={}",
            target.mode(),
            options.max_connections
        );

        Ok(Self {
            repository: SepulkaEntityRepository::new(pool),
            runtime: Some(runtime),
        })
    }

    pub fn entities(&self) -> &SepulkaEntityRepository {
        &self.repository
    }

    fn block_on<F: Future>(&self, future: F) -> RepoResult<F::Output> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(DbError::RuntimeStopped.into()),
        }
    }
}

impl Drop for SqlxSepulkaRepository {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            // Blocking inside a tokio context panics; let the pool die with
            // its runtime instead of closing it gracefully.
            runtime.shutdown_background();
            return;
        }
        runtime.block_on(self.repository.pool.close());
    }
}

impl SepulkaRepository for SqlxSepulkaRepository {
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot> {
        aggregate.validate()?;
        let entity = SepulkaRow::from_domain(aggregate);

        match self.block_on(self.repository.save(&entity))? {
            Ok(saved) => {
                debug!(
                    "event=sepulka_add module=repo adapter=repository status=ok internal_id={}",
                    aggregate.internal_id
                );
                saved.into_domain()
            }
            Err(err) if is_external_id_conflict(&err) => Err(RepoError::DuplicateExternalId(
                aggregate.external_id.clone(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        self.block_on(self.repository.find_by_external_id(external_id))??
            .map(ExistenceRow::into_domain)
            .transpose()
    }

    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>> {
        let key = encode_id(internal_id);
        self.block_on(self.repository.find_by_internal_id(&key))??
            .map(PreviewRow::into_domain)
            .transpose()
    }

    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()> {
        touch.validate()?;
        let key = encode_id(internal_id);
        let row = TouchRow::from_domain(touch);

        let matched = match self.block_on(self.repository.update_revision(&key, &row))? {
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
                "event=sepulka_update module=repo adapter=repository status=contention internal_id={} expected_revision={}",
                internal_id, touch.revision
            );
            return Err(RepoError::Contention(internal_id));
        }

        debug!(
            "event=sepulka_update module=repo adapter=repository status=ok internal_id={} revision={}",
            internal_id,
            u64::from(touch.revision) + 1
        );
        Ok(())
    }
}

fn is_external_id_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.kind(), ErrorKind::UniqueViolation)
                && db_err.message().contains("sepulkas.external_id")
        }
        _ => false,
    }
}

fn is_updated_before_created(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.kind(), ErrorKind::CheckViolation)
                && db_err.message().contains("sepulkas_updated_after_created")
        }
        _ => false,
    }
}
