//! Sepulka domain model.
//!
//! # Responsibility
//! - Define the aggregate root and its read/write projections.
//! - Own model-level invariant checks used by every storage adapter.
//!
//! # Invariants
//! - Every aggregate is identified by a stable, non-nil `InternalId`.
//! - There is no deletion; aggregates only advance their revision.

pub mod sepulka;
