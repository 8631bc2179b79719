//! # kindred-engine
//!
//! The contact aggregation engine.
//!
//! This crate provides:
//! - [`ContactAggregator`] — the single-contact aggregation algorithm
//!   (exception overrides, primary and secondary matching, derived aggregate
//!   fields, primary promotion) and the background pass with cooperative
//!   cancellation
//! - [`AggregationScheduler`] — the debounced background worker
//! - [`ReorderingCursor`] — score-ordered aggregation suggestions
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kindred_engine::{AggregationScheduler, ContactAggregator, SchedulerConfig};
//! use kindred_store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let aggregator = Arc::new(ContactAggregator::new(store));
//! let scheduler = AggregationScheduler::start(aggregator.clone(), SchedulerConfig::default());
//!
//! // Ingest marks contacts, then requests a debounced pass.
//! scheduler.schedule();
//!
//! // Graceful shutdown.
//! scheduler.stop().await;
//! ```

pub mod aggregator;
pub mod scheduler;
pub mod suggestions;

// Re-export core types
pub use kindred_core::*;

// Re-export engine types
pub use aggregator::{ContactAggregator, PassOutcome};
pub use scheduler::{AggregationScheduler, SchedulerConfig};
pub use suggestions::ReorderingCursor;
