//! Centralized default constants for the kindred engine.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// MATCH SCORING
// =============================================================================

/// Minimum name score at which a match is accepted on name evidence alone.
pub const SCORE_THRESHOLD_PRIMARY: u32 = 70;

/// Minimum name score at which a match is accepted in combination with a
/// strong identifier hit (phone or email).
pub const SCORE_THRESHOLD_SECONDARY: u32 = 50;

/// Minimum name score for the aggregation-suggestion query. Deliberately
/// below the secondary threshold: suggestions may surface matches the
/// automatic passes would not commit to.
pub const SCORE_THRESHOLD_SUGGEST: u32 = 40;

/// Jaro similarity below which an approximate name pair contributes
/// nothing. Above the floor, the pair's table score is attenuated by the
/// similarity.
pub const APPROXIMATE_MATCH_FLOOR: f64 = 0.8;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Debounce delay before a requested background pass starts, milliseconds.
/// Further schedule requests within the window coalesce into one run.
pub const AGGREGATION_DELAY_MS: u64 = 1000;

// =============================================================================
// SUGGESTIONS
// =============================================================================

/// Default cap on returned aggregation suggestions.
pub const MAX_SUGGESTIONS: usize = 5;

/// Length of the normalised-name prefix used by the approximate lookup in
/// suggestion mode.
pub const APPROXIMATE_LOOKUP_PREFIX_LEN: usize = 2;
