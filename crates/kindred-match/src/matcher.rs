//! Per-pass scoreboard matcher.
//!
//! During one contact's aggregation the matcher accumulates evidence per
//! candidate aggregate: a running name score (max over all scored name
//! pairs) and secondary bits for strong-identifier hits. User overrides mark
//! aggregates as kept out, which silences all further updates and excludes
//! them from the pickers.

use std::collections::HashMap;
use std::sync::OnceLock;

use strsim::jaro;
use tracing::trace;

use kindred_core::defaults::APPROXIMATE_MATCH_FLOOR;
use kindred_core::models::NameLookupType;

const TAG_COUNT: usize = NameLookupType::ALL.len();

/// Fixed symmetric scoring table over lookup-type pairs.
///
/// Exact full-name pairings score highest, nickname-mediated pairings sit in
/// the middle, and single-token matches score lowest — low enough that they
/// only ever matter in combination with a phone or email hit.
fn scoring_table() -> &'static [[u32; TAG_COUNT]; TAG_COUNT] {
    static TABLE: OnceLock<[[u32; TAG_COUNT]; TAG_COUNT]> = OnceLock::new();
    TABLE.get_or_init(|| {
        use kindred_core::models::NameLookupType::*;

        let mut t = [[0u32; TAG_COUNT]; TAG_COUNT];
        let mut set = |a: NameLookupType, b: NameLookupType, score: u32| {
            t[a.index()][b.index()] = score;
            t[b.index()][a.index()] = score;
        };

        set(FullName, FullName, 99);
        set(FullNameReverse, FullNameReverse, 99);
        set(FullName, FullNameReverse, 90);
        set(FullNameConcatenated, FullNameConcatenated, 90);
        set(FullNameReverseConcatenated, FullNameReverseConcatenated, 90);
        set(FullNameConcatenated, FullNameReverseConcatenated, 80);
        set(FullName, FullNameConcatenated, 80);
        set(FullName, FullNameReverseConcatenated, 70);
        set(FullNameReverse, FullNameConcatenated, 70);
        set(FullNameReverse, FullNameReverseConcatenated, 80);

        set(FullNameWithNickname, FullName, 75);
        set(FullNameWithNickname, FullNameWithNickname, 75);
        set(FullNameWithNickname, FullNameReverse, 70);
        set(FullNameWithNicknameReverse, FullNameReverse, 75);
        set(FullNameWithNicknameReverse, FullNameWithNicknameReverse, 75);
        set(FullNameWithNicknameReverse, FullName, 70);
        set(FullNameWithNickname, FullNameWithNicknameReverse, 70);

        set(GivenNameOnly, GivenNameOnly, 35);
        set(FamilyNameOnly, FamilyNameOnly, 30);
        set(GivenNameOnly, FamilyNameOnly, 25);
        set(GivenNameOnlyAsNickname, GivenNameOnly, 35);
        set(GivenNameOnlyAsNickname, GivenNameOnlyAsNickname, 35);
        set(FamilyNameOnlyAsNickname, FamilyNameOnly, 30);
        set(FamilyNameOnlyAsNickname, FamilyNameOnlyAsNickname, 30);
        set(GivenNameOnlyAsNickname, FamilyNameOnly, 25);
        set(FamilyNameOnlyAsNickname, GivenNameOnly, 25);

        set(Nickname, Nickname, 75);
        set(Nickname, GivenNameOnly, 60);
        set(Nickname, GivenNameOnlyAsNickname, 60);
        set(Nickname, FullName, 60);
        set(Nickname, FullNameConcatenated, 60);

        set(EmailBasedNickname, FullNameConcatenated, 80);
        set(EmailBasedNickname, FullNameReverseConcatenated, 70);
        set(EmailBasedNickname, Nickname, 60);
        set(EmailBasedNickname, EmailBasedNickname, 60);
        set(EmailBasedNickname, GivenNameOnly, 50);

        t
    })
}

fn score_pair(a: NameLookupType, b: NameLookupType) -> u32 {
    scoring_table()[a.index()][b.index()]
}

/// One ranked match from [`ContactMatcher::pick_best_matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    pub aggregate_id: i64,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScoreEntry {
    score: u32,
    phone_hit: bool,
    email_hit: bool,
    nickname_hit: bool,
    kept_out: bool,
}

/// Scoreboard mapping candidate aggregate ids to accumulated match evidence.
/// Cleared and reused across raw contacts within a pass.
#[derive(Debug, Default)]
pub struct ContactMatcher {
    board: HashMap<i64, ScoreEntry>,
}

impl ContactMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for the next raw contact, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.board.clear();
    }

    /// Mark an aggregate ineligible. All further updates against it are
    /// ignored and the pickers skip it.
    pub fn keep_out(&mut self, aggregate_id: i64) {
        self.board.entry(aggregate_id).or_default().kept_out = true;
    }

    /// Score a candidate name against a lookup row of `aggregate_id`.
    ///
    /// Equal names earn the full table score for the type pair. Unequal
    /// names earn an attenuated score when `approximate` is set and the
    /// Jaro similarity clears the floor; otherwise nothing. Plain Jaro, not
    /// Jaro-Winkler: half the composite keys lead with the family name, and
    /// a prefix bonus would over-score any two people sharing one.
    pub fn match_name(
        &mut self,
        aggregate_id: i64,
        candidate_type: NameLookupType,
        candidate_name: &str,
        target_type: NameLookupType,
        target_name: &str,
        approximate: bool,
    ) {
        let table_score = score_pair(candidate_type, target_type);
        if table_score == 0 {
            return;
        }

        if candidate_name == target_name {
            self.update_score(aggregate_id, table_score);
            return;
        }
        if !approximate {
            return;
        }

        let similarity = jaro(candidate_name, target_name);
        if similarity < APPROXIMATE_MATCH_FLOOR {
            return;
        }
        let attenuated = (table_score as f64 * similarity) as u32;
        trace!(
            aggregate_id,
            candidate = candidate_name,
            target = target_name,
            similarity,
            attenuated,
            "approximate name match"
        );
        self.update_score(aggregate_id, attenuated);
    }

    pub fn update_score_with_phone_match(&mut self, aggregate_id: i64) {
        self.entry(aggregate_id).phone_hit = true;
    }

    pub fn update_score_with_email_match(&mut self, aggregate_id: i64) {
        self.entry(aggregate_id).email_hit = true;
    }

    pub fn update_score_with_nickname_match(&mut self, aggregate_id: i64) {
        self.entry(aggregate_id).nickname_hit = true;
    }

    /// Aggregates whose name score fell short of `threshold` but whose
    /// secondary bits show a strong identifier hit (phone or email). These
    /// are the inputs for the secondary, approximate-name pass.
    pub fn prepare_secondary_match_candidates(&self, threshold: u32) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .board
            .iter()
            .filter(|(_, e)| !e.kept_out && e.score < threshold && (e.phone_hit || e.email_hit))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The single best aggregate with name score at or above `threshold`;
    /// ties break toward the smallest aggregate id.
    pub fn pick_best_match(&self, threshold: u32) -> Option<i64> {
        let mut best: Option<(i64, u32)> = None;
        for (&id, entry) in &self.board {
            if entry.kept_out || entry.score < threshold {
                continue;
            }
            best = match best {
                Some((best_id, best_score))
                    if entry.score < best_score
                        || (entry.score == best_score && id > best_id) =>
                {
                    Some((best_id, best_score))
                }
                _ => Some((id, entry.score)),
            };
        }
        best.map(|(id, _)| id)
    }

    /// Up to `max` aggregates at or above `threshold`, in descending score
    /// order (ties toward the smallest id). Used by the suggestion query.
    pub fn pick_best_matches(&self, max: usize, threshold: u32) -> Vec<MatchScore> {
        let mut matches: Vec<MatchScore> = self
            .board
            .iter()
            .filter(|(_, e)| !e.kept_out && e.score >= threshold)
            .map(|(&id, e)| MatchScore {
                aggregate_id: id,
                score: e.score,
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.aggregate_id.cmp(&b.aggregate_id))
        });
        matches.truncate(max);
        matches
    }

    fn entry(&mut self, aggregate_id: i64) -> &mut ScoreEntry {
        self.board.entry(aggregate_id).or_default()
    }

    fn update_score(&mut self, aggregate_id: i64, score: u32) {
        let entry = self.entry(aggregate_id);
        if entry.kept_out {
            return;
        }
        if score > entry.score {
            entry.score = score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::defaults::{
        SCORE_THRESHOLD_PRIMARY, SCORE_THRESHOLD_SECONDARY, SCORE_THRESHOLD_SUGGEST,
    };
    use kindred_core::models::NameLookupType::*;

    #[test]
    fn test_scoring_table_is_symmetric() {
        for a in NameLookupType::ALL {
            for b in NameLookupType::ALL {
                assert_eq!(score_pair(a, b), score_pair(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_exact_full_name_scores_highest() {
        let full = score_pair(FullName, FullName);
        for a in NameLookupType::ALL {
            for b in NameLookupType::ALL {
                assert!(score_pair(a, b) <= full);
            }
        }
        assert!(full >= SCORE_THRESHOLD_PRIMARY);
    }

    #[test]
    fn test_single_token_pairs_stay_below_secondary_threshold() {
        assert!(score_pair(GivenNameOnly, GivenNameOnly) < SCORE_THRESHOLD_SECONDARY);
        assert!(score_pair(FamilyNameOnly, FamilyNameOnly) < SCORE_THRESHOLD_SECONDARY);
        assert!(score_pair(GivenNameOnly, FamilyNameOnly) < SCORE_THRESHOLD_SECONDARY);
    }

    #[test]
    fn test_exact_match_earns_table_score() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "john.doe", FullName, "john.doe", false);
        assert_eq!(m.pick_best_match(SCORE_THRESHOLD_PRIMARY), Some(1));
    }

    #[test]
    fn test_unequal_names_score_nothing_without_approximate() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "jon.doe", FullName, "john.doe", false);
        assert_eq!(m.pick_best_match(1), None);
    }

    #[test]
    fn test_approximate_match_attenuates_score() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "jon.doe", FullName, "john.doe", true);
        // Close misspelling: attenuated but still above the secondary bar.
        assert_eq!(m.pick_best_match(SCORE_THRESHOLD_PRIMARY + 20), Some(1));
        assert!(m.pick_best_matches(1, SCORE_THRESHOLD_SECONDARY)[0].score < 99);
    }

    #[test]
    fn test_approximate_match_floor_rejects_distant_names() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "deborah.doe", FullName, "john.doe", true);
        assert_eq!(m.pick_best_match(1), None);
    }

    #[test]
    fn test_score_accumulates_by_max_not_sum() {
        let mut m = ContactMatcher::new();
        m.match_name(1, GivenNameOnly, "john", GivenNameOnly, "john", false);
        m.match_name(1, FamilyNameOnly, "doe", FamilyNameOnly, "doe", false);
        let best = m.pick_best_matches(1, 1);
        assert_eq!(best[0].score, score_pair(GivenNameOnly, GivenNameOnly));
    }

    #[test]
    fn test_keep_out_silences_updates_and_pickers() {
        let mut m = ContactMatcher::new();
        m.keep_out(1);
        m.match_name(1, FullName, "john.doe", FullName, "john.doe", false);
        m.match_name(2, FullName, "john.doe", FullName, "john.doe", false);
        assert_eq!(m.pick_best_match(SCORE_THRESHOLD_PRIMARY), Some(2));
        assert!(m
            .pick_best_matches(10, 1)
            .iter()
            .all(|s| s.aggregate_id != 1));
    }

    #[test]
    fn test_tie_breaks_toward_smallest_aggregate_id() {
        let mut m = ContactMatcher::new();
        m.match_name(9, FullName, "john.doe", FullName, "john.doe", false);
        m.match_name(3, FullName, "john.doe", FullName, "john.doe", false);
        assert_eq!(m.pick_best_match(SCORE_THRESHOLD_PRIMARY), Some(3));
    }

    #[test]
    fn test_secondary_candidates_require_identifier_hit() {
        let mut m = ContactMatcher::new();
        // Weak name evidence only: not a candidate.
        m.match_name(1, GivenNameOnly, "doe", GivenNameOnly, "doe", false);
        // Weak name evidence plus phone hit: candidate.
        m.match_name(2, FamilyNameOnly, "doe", FamilyNameOnly, "doe", false);
        m.update_score_with_phone_match(2);
        // No name evidence but email hit: candidate.
        m.update_score_with_email_match(5);
        // Nickname hit alone is not a strong identifier.
        m.update_score_with_nickname_match(7);

        assert_eq!(
            m.prepare_secondary_match_candidates(SCORE_THRESHOLD_PRIMARY),
            vec![2, 5]
        );
    }

    #[test]
    fn test_secondary_candidates_exclude_already_strong_names() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "john.doe", FullName, "john.doe", false);
        m.update_score_with_phone_match(1);
        assert!(m
            .prepare_secondary_match_candidates(SCORE_THRESHOLD_PRIMARY)
            .is_empty());
    }

    #[test]
    fn test_pick_best_matches_orders_by_descending_score() {
        let mut m = ContactMatcher::new();
        m.match_name(1, GivenNameOnly, "john", GivenNameOnly, "john", false);
        m.match_name(2, FullName, "john.doe", FullName, "john.doe", false);
        m.match_name(3, FullName, "john.doe", FullNameReverse, "john.doe", false);

        let ranked = m.pick_best_matches(10, SCORE_THRESHOLD_SUGGEST);
        let ids: Vec<i64> = ranked.iter().map(|s| s.aggregate_id).collect();
        assert_eq!(ids, vec![2, 3]);

        let capped = m.pick_best_matches(1, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].aggregate_id, 2);
    }

    #[test]
    fn test_clear_resets_the_board() {
        let mut m = ContactMatcher::new();
        m.match_name(1, FullName, "john.doe", FullName, "john.doe", false);
        m.keep_out(2);
        m.clear();
        assert_eq!(m.pick_best_match(1), None);
        // Aggregate 2 is eligible again after clear.
        m.match_name(2, FullName, "john.doe", FullName, "john.doe", false);
        assert_eq!(m.pick_best_match(SCORE_THRESHOLD_PRIMARY), Some(2));
    }
}
