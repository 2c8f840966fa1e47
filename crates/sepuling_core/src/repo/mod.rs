//! Storage port and its two interchangeable backend adapters.
//!
//! # Responsibility
//! - Define the `SepulkaRepository` port used by services and read paths.
//! - Provide a statement-mapped adapter (rusqlite) and a repository-style
//!   adapter (sqlx) that behave identically under the port contract.
//!
//! # Invariants
//! - `update_by` is one conditional statement; never read-then-write.
//! - External id uniqueness is reported from the store's unique index, never
//!   from a pre-insert lookup.
//! - Zero matched rows on update is `Contention`, whatever the cause.

use crate::db::DbError;
use crate::model::sepulka::{
    AggregateRoot, Existence, InternalId, Preview, SepulkaValidationError, Touch,
};
use std::sync::Arc;
use thiserror::Error;

pub mod factory;
pub mod repository;
pub mod state;
pub mod statement;

pub type RepoResult<T> = Result<T, RepoError>;

/// Typed failures surfaced by every adapter.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("external id `{0}` is already registered")]
    DuplicateExternalId(String),
    #[error("sepulka {0} was not updated: revision is stale or the row is missing")]
    Contention(InternalId),
    #[error(transparent)]
    Validation(#[from] SepulkaValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid persisted sepulka data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(DbError::Sqlx(value))
    }
}

/// Port through which the rest of the crate persists and reads sepulkas.
pub trait SepulkaRepository {
    /// Persists a brand-new aggregate.
    ///
    /// Fails with `DuplicateExternalId` when the store's unique constraint on
    /// `external_id` rejects the row.
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot>;

    /// Absence is `Ok(None)`, not an error.
    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>>;

    /// Absence is `Ok(None)`, not an error.
    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>>;

    /// Applies `touch` only if the stored revision equals `touch.revision`.
    ///
    /// On success the stored revision becomes `touch.revision + 1` and
    /// `updated_at` is replaced. Missing ids and stale revisions both yield
    /// `Contention`; callers re-read and retry if they want to.
    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()>;
}

impl<R: SepulkaRepository + ?Sized> SepulkaRepository for &R {
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot> {
        (**self).add(aggregate)
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        (**self).find_by_external_id(external_id)
    }

    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>> {
        (**self).find_by_internal_id(internal_id)
    }

    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()> {
        (**self).update_by(internal_id, touch)
    }
}

impl<R: SepulkaRepository + ?Sized> SepulkaRepository for Box<R> {
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot> {
        (**self).add(aggregate)
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        (**self).find_by_external_id(external_id)
    }

    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>> {
        (**self).find_by_internal_id(internal_id)
    }

    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()> {
        (**self).update_by(internal_id, touch)
    }
}

impl<R: SepulkaRepository + ?Sized> SepulkaRepository for Arc<R> {
    fn add(&self, aggregate: &AggregateRoot) -> RepoResult<AggregateRoot> {
        (**self).add(aggregate)
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        (**self).find_by_external_id(external_id)
    }

    fn find_by_internal_id(&self, internal_id: InternalId) -> RepoResult<Option<Preview>> {
        (**self).find_by_internal_id(internal_id)
    }

    fn update_by(&self, internal_id: InternalId, touch: &Touch) -> RepoResult<()> {
        (**self).update_by(internal_id, touch)
    }
}
