//! Pure transforms between wire and service messages.

use crate::messaging::message::{PreviewReply, RegistrationReply};
use crate::service::sepulka_service::{
    PreviewRequest, PreviewResponse, RegistrationRequest, RegistrationResponse,
};

/// Takes an external id that already passed validation.
pub fn to_registration_request(external_id: &str) -> RegistrationRequest {
    RegistrationRequest {
        external_id: external_id.to_string(),
    }
}

pub fn to_registration_reply(response: RegistrationResponse) -> RegistrationReply {
    RegistrationReply {
        external_id: response.external_id,
    }
}

pub fn to_preview_request(external_id: &str) -> PreviewRequest {
    PreviewRequest {
        external_id: external_id.to_string(),
    }
}

pub fn to_preview_replies(responses: Vec<PreviewResponse>) -> Vec<PreviewReply> {
    responses
        .into_iter()
        .map(|response| PreviewReply {
            external_id: response.external_id,
            created_at: response.created_at,
        })
        .collect()
}
