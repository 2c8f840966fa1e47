//! Inbound edge over the registration service.

use crate::messaging::mapper::{
    to_preview_replies, to_preview_request, to_registration_reply, to_registration_request,
};
use crate::messaging::message::{PreviewEdge, PreviewReply, RegistrationEdge, RegistrationReply};
use crate::messaging::validation::{validate_preview, validate_registration, ValidationError};
use crate::repo::{RepoError, SepulkaRepository};
use crate::service::sepulka_service::{Clock, SepulkaService, SystemClock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Validates wire input, then delegates to [`SepulkaService`].
pub struct SepulkaClient<R: SepulkaRepository, C: Clock = SystemClock> {
    service: SepulkaService<R, C>,
}

impl<R: SepulkaRepository, C: Clock> SepulkaClient<R, C> {
    pub fn new(service: SepulkaService<R, C>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &SepulkaService<R, C> {
        &self.service
    }

    pub fn register(&self, edge: &RegistrationEdge) -> Result<RegistrationReply, ClientError> {
        let external_id = validate_registration(edge)?;
        let response = self
            .service
            .register(&to_registration_request(external_id))?;
        Ok(to_registration_reply(response))
    }

    pub fn view(&self, edge: &PreviewEdge) -> Result<Vec<PreviewReply>, ClientError> {
        let external_id = validate_preview(edge)?;
        let responses = self.service.view(&to_preview_request(external_id))?;
        Ok(to_preview_replies(responses))
    }
}
