//! Core domain logic for sepuling.
//! This crate is the single source of truth for sepulka persistence rules.

pub mod config;
pub mod db;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError, MappingMode, ProtocolMode};
pub use db::{DbError, DbTarget, PoolOptions};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use messaging::client::{ClientError, SepulkaClient};
pub use messaging::message::{PreviewEdge, PreviewReply, RegistrationEdge, RegistrationReply};
pub use messaging::validation::ValidationError;
pub use model::sepulka::{
    AggregateRoot, Existence, InternalId, Preview, SepulkaValidationError, Touch,
};
pub use repo::factory::{open_repository, DynSepulkaRepository};
pub use repo::repository::SqlxSepulkaRepository;
pub use repo::statement::SqliteSepulkaRepository;
pub use repo::{RepoError, RepoResult, SepulkaRepository};
pub use service::sepulka_service::{
    Clock, PreviewRequest, PreviewResponse, RegistrationRequest, RegistrationResponse,
    SepulkaService, SystemClock,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
