//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate storage port calls into use-case level APIs.
//! - Keep the CLI and messaging layers decoupled from storage details.

pub mod sepulka_service;
