//! Inbound messaging boundary.
//!
//! # Responsibility
//! - Define the wire shape of registration and preview messages.
//! - Validate wire input and map it to and from service messages.
//! - Chain validate -> map -> service -> map in `SepulkaClient`.
//!
//! # Invariants
//! - Nothing below this module sees an unvalidated external id.
//! - Mapping functions are pure and lossless.

pub mod client;
pub mod mapper;
pub mod message;
pub mod validation;
