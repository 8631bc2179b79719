//! # kindred-core
//!
//! Core types, traits, and abstractions for the kindred contact aggregation
//! engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other kindred crates depend on:
//!
//! - Domain models (raw contacts, data rows, aggregates, lookup entries)
//! - The [`ContactStore`]/[`StoreTxn`] persistence interface
//! - The shared [`Error`]/[`Result`] types
//! - Centralized default constants and the structured-logging field schema

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
