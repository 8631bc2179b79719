//! Score-ranked aggregation suggestions.
//!
//! The suggestion query runs the matcher over an aggregate's members the
//! same way aggregation does, but against the lower suggest threshold and
//! with the approximate prefix scan enabled, and commits to nothing: the
//! result is a ranked list of candidate aggregates for the UI to offer.

use std::time::Instant;

use tracing::info;

use kindred_core::defaults::SCORE_THRESHOLD_SUGGEST;
use kindred_core::{Aggregate, ContactStore, Result};
use kindred_match::{CandidateMode, ContactMatcher, MatchCandidateList, MatchScore};

use crate::aggregator::ContactAggregator;

/// Aggregate rows re-ordered to match descending match score.
///
/// The store returns rows in id order; this is the thin index-permutation
/// wrapper that presents them score-first. It projects the underlying rows
/// and adds no data of its own.
#[derive(Debug)]
pub struct ReorderingCursor {
    rows: Vec<Aggregate>,
    position_map: Vec<usize>,
}

impl ReorderingCursor {
    /// Wrap id-ordered `rows` with the ranking that produced them.
    pub fn new(rows: Vec<Aggregate>, ranked: &[MatchScore]) -> Self {
        let position_map = ranked
            .iter()
            .filter_map(|m| rows.iter().position(|row| row.id == m.aggregate_id))
            .collect();
        Self { rows, position_map }
    }

    pub fn len(&self) -> usize {
        self.position_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position_map.is_empty()
    }

    /// The `index`-th best suggestion.
    pub fn get(&self, index: usize) -> Option<&Aggregate> {
        self.position_map.get(index).map(|&pos| &self.rows[pos])
    }

    /// Iterate suggestions in descending score order.
    pub fn iter(&self) -> impl Iterator<Item = &Aggregate> {
        self.position_map.iter().map(|&pos| &self.rows[pos])
    }

    /// Consume the cursor into a score-ordered vector.
    pub fn into_vec(self) -> Vec<Aggregate> {
        let Self { rows, position_map } = self;
        position_map.iter().map(|&pos| rows[pos].clone()).collect()
    }
}

impl<S: ContactStore> ContactAggregator<S> {
    /// Find aggregates that look like the same person as `aggregate_id` and
    /// return them ranked by match score, best first. `max` caps the list;
    /// pass [`kindred_core::defaults::MAX_SUGGESTIONS`] for the default.
    pub async fn query_aggregation_suggestions(
        &self,
        aggregate_id: i64,
        max: usize,
    ) -> Result<ReorderingCursor> {
        let started = Instant::now();
        let mut txn = self.store().begin().await?;

        let mut candidates = MatchCandidateList::new();
        let mut matcher = ContactMatcher::new();

        // An aggregate never suggests itself.
        matcher.keep_out(aggregate_id);

        for raw_contact_id in txn.member_ids(aggregate_id).await? {
            self.update_match_scores(
                txn.as_mut(),
                raw_contact_id,
                CandidateMode::Suggestions,
                &mut candidates,
                &mut matcher,
            )
            .await?;
        }

        let ranked = matcher.pick_best_matches(max, SCORE_THRESHOLD_SUGGEST);
        let ids: Vec<i64> = ranked.iter().map(|m| m.aggregate_id).collect();
        let rows = txn.aggregates_by_ids(&ids).await?;
        txn.commit().await?;

        info!(
            subsystem = "engine",
            component = "suggestions",
            op = "query",
            aggregate_id,
            result_count = ranked.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "aggregation suggestions computed"
        );
        Ok(ReorderingCursor::new(rows, &ranked))
    }
}
