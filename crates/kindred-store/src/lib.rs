//! # kindred-store
//!
//! Reference implementation of the [`kindred_core::ContactStore`] interface.
//!
//! The aggregation engine treats persistence as an external collaborator; in
//! production a relational store stands behind the traits. This crate
//! provides [`MemoryStore`], a transactional in-memory implementation with
//! the same observable semantics (commit-or-drop transactions, contention
//! yielding, predicate-based phone and email lookups), used by the engine's
//! tests and by embedders that need no durability.

pub mod mem;
pub mod phone;

// Re-export core types
pub use kindred_core::*;

pub use mem::{MemoryStore, NewRawContact};
pub use phone::{fold_email, lookup_key, normalize_number, numbers_match};
