//! # kindred-match
//!
//! The record-linkage core of the kindred engine.
//!
//! This crate provides:
//! - Canonical name normalisation and the display-name complexity comparator
//! - The common-nickname cluster table (injectable for testing)
//! - Lookup-key candidate expansion for structured names, nicknames and
//!   email addresses
//! - The per-pass scoreboard matcher with its fixed scoring table and
//!   threshold-based pickers

pub mod lookup;
pub mod matcher;
pub mod nickname;
pub mod normalizer;

// Re-export core types
pub use kindred_core::*;

// Re-export match types
pub use lookup::{
    add_email_candidates, add_nickname_candidates, add_structured_name_candidates,
    email_local_part, CandidateMode, MatchCandidateList, NameCandidate,
};
pub use matcher::{ContactMatcher, MatchScore};
pub use nickname::NicknameClusters;
pub use normalizer::{compare_complexity, normalize};
