//! Sepulka registration use cases.
//!
//! # Responsibility
//! - Create new aggregates (fresh id, revision 0, one clock reading).
//! - Serve preview reads through the storage port.
//!
//! # Invariants
//! - `register` performs exactly one `add`; no retries, no pre-checks.
//! - The service never touches storage except through the port.

use crate::model::sepulka::AggregateRoot;
use crate::repo::{RepoResult, SepulkaRepository};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Source of "now" for new aggregates.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc>,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Validated registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub external_id: String,
}

/// Preview lookup criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

/// Use-case service over one storage adapter.
pub struct SepulkaService<R: SepulkaRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
}

impl<R: SepulkaRepository> SepulkaService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: SepulkaRepository, C: Clock> SepulkaService<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self { repo, clock }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Registers a new sepulka under `request.external_id`.
    ///
    /// # Errors
    /// - `RepoError::DuplicateExternalId` when the id is already taken.
    /// - `RepoError::Db` on storage failure.
    pub fn register(&self, request: &RegistrationRequest) -> RepoResult<RegistrationResponse> {
        let aggregate = AggregateRoot::register(request.external_id.as_str(), self.clock.now());

        match self.repo.add(&aggregate) {
            Ok(stored) => {
                info!(
                    "event=sepulka_register module=service status=ok internal_id={}",
                    stored.internal_id
                );
                Ok(RegistrationResponse {
                    external_id: stored.external_id,
                })
            }
            Err(err) => {
                warn!(
                    "event=sepulka_register module=service status=error error={}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Returns previews whose external id equals `request.external_id`.
    ///
    /// The result holds zero or one entry since external ids are unique.
    pub fn view(&self, request: &PreviewRequest) -> RepoResult<Vec<PreviewResponse>> {
        let Some(existence) = self.repo.find_by_external_id(&request.external_id)? else {
            return Ok(Vec::new());
        };

        Ok(self
            .repo
            .find_by_internal_id(existence.internal_id)?
            .map(|preview| PreviewResponse {
                external_id: preview.external_id,
                created_at: preview.created_at,
            })
            .into_iter()
            .collect())
    }
}
