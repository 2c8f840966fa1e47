//! Storage representation shared by both adapters.
//!
//! # Responsibility
//! - Define the row shapes stored in and read from `sepulkas`.
//! - Map between domain values and rows without losing precision.
//!
//! # Invariants
//! - Ids are stored as lowercase hyphenated UUID text.
//! - Timestamps are stored as RFC 3339 UTC text with nine fractional digits,
//!   so rows compare and sort lexically and round-trip exactly.
//! - Read paths reject malformed rows instead of masking them.

use crate::model::sepulka::{AggregateRoot, Existence, InternalId, Preview, Touch};
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Full `sepulkas` row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SepulkaRow {
    pub internal_id: String,
    pub external_id: String,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Columns written by the conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchRow {
    pub revision: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExistenceRow {
    pub internal_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PreviewRow {
    pub external_id: String,
    pub created_at: String,
}

impl SepulkaRow {
    pub fn from_domain(aggregate: &AggregateRoot) -> Self {
        Self {
            internal_id: encode_id(aggregate.internal_id),
            external_id: aggregate.external_id.clone(),
            revision: i64::from(aggregate.revision),
            created_at: encode_timestamp(aggregate.created_at),
            updated_at: encode_timestamp(aggregate.updated_at),
        }
    }

    pub fn into_domain(self) -> RepoResult<AggregateRoot> {
        Ok(AggregateRoot {
            internal_id: decode_id(&self.internal_id)?,
            external_id: self.external_id,
            revision: decode_revision(self.revision)?,
            created_at: decode_timestamp("created_at", &self.created_at)?,
            updated_at: decode_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

impl TouchRow {
    pub fn from_domain(touch: &Touch) -> Self {
        Self {
            revision: i64::from(touch.revision),
            updated_at: encode_timestamp(touch.updated_at),
        }
    }
}

impl ExistenceRow {
    pub fn into_domain(self) -> RepoResult<Existence> {
        Ok(Existence {
            internal_id: decode_id(&self.internal_id)?,
        })
    }
}

impl PreviewRow {
    pub fn into_domain(self) -> RepoResult<Preview> {
        Ok(Preview {
            external_id: self.external_id,
            created_at: decode_timestamp("created_at", &self.created_at)?,
        })
    }
}

pub fn encode_id(id: InternalId) -> String {
    id.as_hyphenated().to_string()
}

pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_id(value: &str) -> RepoResult<InternalId> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{value}` in sepulkas.internal_id"
        ))
    })
}

fn decode_revision(value: i64) -> RepoResult<u32> {
    u32::try_from(value).map_err(|_| {
        RepoError::InvalidData(format!("invalid revision `{value}` in sepulkas.revision"))
    })
}

fn decode_timestamp(column: &str, value: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{value}` in sepulkas.{column}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::{encode_timestamp, ExistenceRow, PreviewRow, SepulkaRow, TouchRow};
    use crate::model::sepulka::AggregateRoot;
    use crate::repo::RepoError;
    use chrono::{TimeZone, Utc};

    fn sample() -> AggregateRoot {
        let created_at = Utc
            .timestamp_opt(1_700_000_000, 123_456_789)
            .single()
            .unwrap();
        let mut aggregate = AggregateRoot::register("alice-1", created_at);
        aggregate.revision = 3;
        aggregate.updated_at = created_at + chrono::Duration::nanoseconds(1);
        aggregate
    }

    #[test]
    fn aggregate_round_trips_through_row_field_for_field() {
        let aggregate = sample();
        let row = SepulkaRow::from_domain(&aggregate);

        assert_eq!(row.revision, 3);
        assert_eq!(row.created_at, "2023-11-14T22:13:20.123456789Z");
        assert_eq!(row.updated_at, "2023-11-14T22:13:20.123456790Z");
        assert_eq!(row.into_domain().unwrap(), aggregate);
    }

    #[test]
    fn timestamps_keep_fixed_width_for_lexical_order() {
        let whole_second = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        assert_eq!(
            encode_timestamp(whole_second),
            "2023-11-14T22:13:20.000000000Z"
        );
    }

    #[test]
    fn projections_map_from_their_rows() {
        let aggregate = sample();
        let row = SepulkaRow::from_domain(&aggregate);

        let existence = ExistenceRow {
            internal_id: row.internal_id.clone(),
        }
        .into_domain()
        .unwrap();
        assert_eq!(existence, aggregate.existence());

        let preview = PreviewRow {
            external_id: row.external_id.clone(),
            created_at: row.created_at.clone(),
        }
        .into_domain()
        .unwrap();
        assert_eq!(preview, aggregate.preview());

        let touch = TouchRow::from_domain(&aggregate.touch(aggregate.updated_at));
        assert_eq!(touch.revision, 3);
        assert_eq!(touch.updated_at, row.updated_at);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let mut row = SepulkaRow::from_domain(&sample());
        row.revision = -1;
        assert!(matches!(row.into_domain(), Err(RepoError::InvalidData(_))));

        let mut row = SepulkaRow::from_domain(&sample());
        row.internal_id = "not-a-uuid".to_string();
        assert!(matches!(row.into_domain(), Err(RepoError::InvalidData(_))));

        let mut row = SepulkaRow::from_domain(&sample());
        row.created_at = "yesterday".to_string();
        assert!(matches!(row.into_domain(), Err(RepoError::InvalidData(_))));
    }
}
