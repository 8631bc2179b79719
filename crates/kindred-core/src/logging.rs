//! Structured logging schema and field name constants for kindred.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Fatal store failure aborting a pass |
//! | WARN  | Skipped row (integrity violation), recoverable issue |
//! | INFO  | Pass lifecycle (start, complete, interrupted), scheduler events |
//! | DEBUG | Per-contact decisions (chosen aggregate, promotions) |
//! | TRACE | Per-candidate scoring detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "engine", "store", "match"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "aggregator", "scheduler", "suggestions"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run_pass", "aggregate_contact", "mark_for_aggregation"
pub const OPERATION: &str = "op";

/// Correlation id for one background aggregation pass (UUIDv7).
pub const PASS_ID: &str = "pass_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Raw contact id being operated on.
pub const RAW_CONTACT_ID: &str = "raw_contact_id";

/// Aggregate id being operated on.
pub const AGGREGATE_ID: &str = "aggregate_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Rows processed by a pass so far / in total.
pub const PROCESSED: &str = "processed";

/// Total rows a pass set out to process.
pub const TOTAL: &str = "total";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";
