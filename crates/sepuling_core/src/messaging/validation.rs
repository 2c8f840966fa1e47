//! Wire-level input validation.

use crate::messaging::message::{PreviewEdge, RegistrationEdge};
use crate::model::sepulka::{check_external_id, SepulkaValidationError};
use thiserror::Error;

pub const EXTERNAL_ID_FIELD: &str = "externalId";

/// Rejected wire input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks a registration message; returns the validated external id.
pub fn validate_registration(edge: &RegistrationEdge) -> Result<&str, ValidationError> {
    require_external_id(edge.external_id.as_deref())
}

pub fn validate_preview(edge: &PreviewEdge) -> Result<&str, ValidationError> {
    require_external_id(edge.external_id.as_deref())
}

fn require_external_id(value: Option<&str>) -> Result<&str, ValidationError> {
    let value = value.ok_or_else(|| ValidationError::new(EXTERNAL_ID_FIELD, "must not be null"))?;
    check_external_id(value).map_err(|err| match err {
        SepulkaValidationError::EmptyExternalId => {
            ValidationError::new(EXTERNAL_ID_FIELD, "must not be empty")
        }
        SepulkaValidationError::ExternalIdTooLong { max, .. } => ValidationError::new(
            EXTERNAL_ID_FIELD,
            format!("size must be between 1 and {max}"),
        ),
        other => ValidationError::new(EXTERNAL_ID_FIELD, other.to_string()),
    })?;
    Ok(value)
}
