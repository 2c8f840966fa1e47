//! Sepulka aggregate and projections.
//!
//! # Responsibility
//! - Define the canonical persisted record (`AggregateRoot`).
//! - Define read projections (`Existence`, `Preview`) and the update delta
//!   (`Touch`).
//!
//! # Invariants
//! - `internal_id` and `external_id` never change after creation.
//! - `revision` starts at 0 and only moves forward by exactly one per
//!   successful update.
//! - `updated_at` is never earlier than `created_at`.
//! - Timestamps fall in years 0000..=9999, the range of the fixed-width
//!   storage encoding.
//! - `external_id` is 1..=64 characters; uniqueness is owned by the store.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Server-generated identifier of a sepulka.
pub type InternalId = Uuid;

/// Upper bound for `external_id`, counted in characters.
pub const EXTERNAL_ID_MAX_CHARS: usize = 64;

/// Years representable by the stored timestamp format.
pub const TIMESTAMP_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Model invariant violations detected before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SepulkaValidationError {
    #[error("internal id must not be nil")]
    NilInternalId,
    #[error("external id must not be empty")]
    EmptyExternalId,
    #[error("external id has {chars} characters; at most {max} allowed")]
    ExternalIdTooLong { chars: usize, max: usize },
    #[error("updated_at {updated_at} is earlier than created_at {created_at}")]
    UpdatedBeforeCreated {
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },
    /// Raised by the store when an update would move `updated_at` before
    /// the stored `created_at`.
    #[error("updated_at {updated_at} is earlier than the stored created_at")]
    UpdatedBeforeStoredCreation { updated_at: DateTime<Utc> },
    #[error("{field} {value} is outside years 0000..=9999")]
    TimestampOutOfRange {
        field: &'static str,
        value: DateTime<Utc>,
    },
}

/// Authoritative persisted record for one registered sepulka.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRoot {
    pub internal_id: InternalId,
    pub external_id: String,
    /// Optimistic-concurrency version token.
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRoot {
    /// Builds a brand-new aggregate with a generated id at revision 0.
    ///
    /// `now` is used for both timestamps so that a fresh aggregate always has
    /// `created_at == updated_at`.
    pub fn register(external_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            internal_id: Uuid::new_v4(),
            external_id: external_id.into(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks model invariants. Called by adapters before every insert.
    pub fn validate(&self) -> Result<(), SepulkaValidationError> {
        if self.internal_id.is_nil() {
            return Err(SepulkaValidationError::NilInternalId);
        }
        check_external_id(&self.external_id)?;
        check_timestamp("created_at", self.created_at)?;
        check_timestamp("updated_at", self.updated_at)?;
        if self.updated_at < self.created_at {
            return Err(SepulkaValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    pub fn existence(&self) -> Existence {
        Existence {
            internal_id: self.internal_id,
        }
    }

    pub fn preview(&self) -> Preview {
        Preview {
            external_id: self.external_id.clone(),
            created_at: self.created_at,
        }
    }

    /// Delta for the next update, based on the revision this copy observed.
    pub fn touch(&self, updated_at: DateTime<Utc>) -> Touch {
        Touch {
            revision: self.revision,
            updated_at,
        }
    }
}

/// Projection used to test whether an external id is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Existence {
    pub internal_id: InternalId,
}

/// Read-only summary keyed by internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

/// Mutable delta submitted on update.
///
/// `revision` is the revision the caller last observed, not the target one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Touch {
    pub revision: u32,
    pub updated_at: DateTime<Utc>,
}

impl Touch {
    /// Checks what can be checked without the stored row.
    ///
    /// Ordering against `created_at` is enforced by the store.
    pub fn validate(&self) -> Result<(), SepulkaValidationError> {
        check_timestamp("updated_at", self.updated_at)
    }
}

/// Checks the external id length bounds (1..=64 characters).
pub fn check_external_id(external_id: &str) -> Result<(), SepulkaValidationError> {
    let chars = external_id.chars().count();
    if chars == 0 {
        return Err(SepulkaValidationError::EmptyExternalId);
    }
    if chars > EXTERNAL_ID_MAX_CHARS {
        return Err(SepulkaValidationError::ExternalIdTooLong {
            chars,
            max: EXTERNAL_ID_MAX_CHARS,
        });
    }
    Ok(())
}

fn check_timestamp(
    field: &'static str,
    value: DateTime<Utc>,
) -> Result<(), SepulkaValidationError> {
    if TIMESTAMP_YEARS.contains(&value.year()) {
        Ok(())
    } else {
        Err(SepulkaValidationError::TimestampOutOfRange { field, value })
    }
}
