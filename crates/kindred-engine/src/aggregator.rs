//! The contact aggregation algorithm.
//!
//! Two raw contacts from disjoint sources are presumed to describe the same
//! person when their names are similar and their strong identifiers (phone,
//! email) overlap — unless the user has said otherwise. The aggregator runs
//! the per-contact decision: user exceptions first, then an exact name-index
//! probe, then an approximate secondary pass over aggregates that share a
//! phone number or email address, and finally create-or-join plus the
//! recomputation of every aggregate-derived field.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kindred_core::defaults::{
    APPROXIMATE_LOOKUP_PREFIX_LEN, SCORE_THRESHOLD_PRIMARY, SCORE_THRESHOLD_SECONDARY,
};
use kindred_core::{
    AggregateOptions, AggregationMode, ContactStore, DataKind, Error, ExceptionType,
    NameLookupType, RawContact, Result, StoreTxn,
};
use kindred_match::{
    add_email_candidates, add_nickname_candidates, add_structured_name_candidates,
    compare_complexity, normalize, CandidateMode, ContactMatcher, MatchCandidateList,
    NicknameClusters,
};

/// Outcome of one background aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    /// Raw contacts handled before the pass ended.
    pub processed: usize,
    /// Raw contacts the pass set out to handle.
    pub total: usize,
    /// True when the pass exited early at a cancellation point.
    pub interrupted: bool,
}

/// Reusable per-pass scratch state. Guarded by a mutex that doubles as the
/// advisory lock making the single-contact routine mutually exclusive with
/// itself and with the background pass's inner loop.
struct WorkBuffers {
    candidates: MatchCandidateList,
    matcher: ContactMatcher,
}

/// The aggregation engine over a contact store.
pub struct ContactAggregator<S: ContactStore> {
    store: Arc<S>,
    clusters: Arc<NicknameClusters>,
    cancel: Arc<AtomicBool>,
    work: Mutex<WorkBuffers>,
}

impl<S: ContactStore> ContactAggregator<S> {
    /// Create an aggregator with the built-in nickname cluster table.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_nickname_clusters(store, Arc::new(NicknameClusters::default()))
    }

    /// Create an aggregator with an injected nickname cluster table.
    pub fn with_nickname_clusters(store: Arc<S>, clusters: Arc<NicknameClusters>) -> Self {
        Self {
            store,
            clusters,
            cancel: Arc::new(AtomicBool::new(false)),
            work: Mutex::new(WorkBuffers {
                candidates: MatchCandidateList::new(),
                matcher: ContactMatcher::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Ask the current pass to exit at its next safe point. Best-effort: a
    /// raw contact already mid-aggregation runs to completion.
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Find all raw contacts awaiting aggregation and run each through the
    /// single-contact algorithm, yielding the write lock between rows and
    /// honouring [`Self::interrupt`] between rows.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        self.cancel.store(false, Ordering::SeqCst);
        let pass_id = Uuid::now_v7();
        let started = Instant::now();

        let ids = self.store.unaggregated_raw_contact_ids().await?;
        let total = ids.len();
        info!(
            subsystem = "engine",
            component = "aggregator",
            op = "run_pass",
            pass_id = %pass_id,
            total,
            "contact aggregation started"
        );

        let mut txn = self.store.begin().await?;
        let mut processed = 0usize;
        let mut interrupted = false;
        for raw_contact_id in ids {
            if self.cancel.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }

            let mut work = self.work.lock().await;
            match self
                .aggregate_locked(txn.as_mut(), raw_contact_id, &mut work)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_integrity_violation() => {
                    warn!(
                        pass_id = %pass_id,
                        raw_contact_id,
                        error = %e,
                        "skipping raw contact"
                    );
                }
                Err(e) => {
                    // Leave the cancel flag set so the worker exits cleanly;
                    // the dropped transaction rolls back the open segment.
                    self.cancel.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
            drop(work);
            processed += 1;

            txn.yield_if_contended().await?;
        }
        txn.commit().await?;

        if interrupted {
            info!(
                pass_id = %pass_id,
                processed,
                total,
                duration_ms = started.elapsed().as_millis() as u64,
                "contact aggregation interrupted"
            );
        } else {
            info!(
                pass_id = %pass_id,
                total,
                duration_ms = started.elapsed().as_millis() as u64,
                "contact aggregation complete"
            );
        }
        Ok(PassOutcome {
            processed,
            total,
            interrupted,
        })
    }

    /// Synchronously aggregate one raw contact in its own transaction.
    pub async fn aggregate_contact(&self, raw_contact_id: i64) -> Result<i64> {
        let mut txn = self.store.begin().await?;
        let aggregate_id = self
            .aggregate_contact_in_txn(txn.as_mut(), raw_contact_id)
            .await?;
        txn.commit().await?;
        Ok(aggregate_id)
    }

    /// Synchronously aggregate one raw contact inside an open transaction
    /// (the immediate-mode path inside ingest).
    pub async fn aggregate_contact_in_txn(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
    ) -> Result<i64> {
        let mut work = self.work.lock().await;
        self.aggregate_locked(txn, raw_contact_id, &mut work).await
    }

    /// Mark a raw contact for (re)aggregation: clear its aggregate
    /// reference, wipe its lookup entries and delete the ex-aggregate if it
    /// is now orphaned. Returns `Default` if the mark happened, the
    /// contact's actual mode if that mode forbids it, and `Disabled` when
    /// there was nothing to mark.
    pub async fn mark_contact_for_aggregation(
        &self,
        raw_contact_id: i64,
    ) -> Result<AggregationMode> {
        let mut txn = self.store.begin().await?;
        let Some(raw) = txn.raw_contact(raw_contact_id).await? else {
            warn!(raw_contact_id, "mark requested for unknown raw contact");
            return Ok(AggregationMode::Disabled);
        };
        let Some(aggregate_id) = raw.aggregate_id else {
            return Ok(AggregationMode::Disabled);
        };
        if raw.aggregation_mode != AggregationMode::Default {
            return Ok(raw.aggregation_mode);
        }

        txn.set_raw_contact_aggregate_id(raw_contact_id, None).await?;
        txn.delete_name_lookup(raw_contact_id).await?;
        txn.delete_aggregate_if_orphaned(aggregate_id).await?;
        txn.commit().await?;

        debug!(raw_contact_id, aggregate_id, "raw contact marked for aggregation");
        Ok(AggregationMode::Default)
    }

    /// Recompute an aggregate's derived fields without changing membership.
    pub async fn update_aggregate_data(&self, aggregate_id: i64) -> Result<()> {
        let mut txn = self.store.begin().await?;
        self.update_aggregate_data_in(txn.as_mut(), aggregate_id)
            .await?;
        txn.commit().await
    }

    /// The single-contact algorithm, under the advisory work lock.
    async fn aggregate_locked(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
        work: &mut WorkBuffers,
    ) -> Result<i64> {
        let WorkBuffers {
            candidates,
            matcher,
        } = work;
        candidates.clear();
        matcher.clear();

        let raw = txn
            .raw_contact(raw_contact_id)
            .await?
            .ok_or(Error::RawContactNotFound(raw_contact_id))?;

        let chosen = match self
            .pick_best_match_by_exceptions(txn, raw_contact_id, matcher)
            .await?
        {
            Some(aggregate_id) => Some(aggregate_id),
            None => {
                self.pick_best_match_by_data(txn, raw_contact_id, candidates, matcher)
                    .await?
            }
        };

        let (aggregate_id, is_new) = match chosen {
            Some(aggregate_id) => (aggregate_id, false),
            None => (txn.insert_aggregate("").await?, true),
        };

        self.rewrite_name_lookup(txn, raw_contact_id, candidates)
            .await?;
        txn.set_raw_contact_aggregate_id(raw_contact_id, Some(aggregate_id))
            .await?;

        self.update_aggregate_data_in(txn, aggregate_id).await?;
        self.promote_primaries(txn, aggregate_id, &raw, is_new)
            .await?;
        self.refresh_visibility(txn, aggregate_id).await?;

        debug!(
            subsystem = "engine",
            component = "aggregator",
            op = "aggregate_contact",
            raw_contact_id,
            aggregate_id,
            is_new,
            "raw contact aggregated"
        );
        Ok(aggregate_id)
    }

    /// Apply user overrides. A `KeepIn` peer that is already aggregated wins
    /// outright; every aggregated `KeepOut` peer poisons its aggregate on
    /// the scoreboard.
    async fn pick_best_match_by_exceptions(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
        matcher: &mut ContactMatcher,
    ) -> Result<Option<i64>> {
        for peer in txn.exception_peers(raw_contact_id).await? {
            let Some(aggregate_id) = peer.peer_aggregate_id else {
                continue;
            };
            match peer.exception_type {
                ExceptionType::KeepIn => return Ok(Some(aggregate_id)),
                ExceptionType::KeepOut => matcher.keep_out(aggregate_id),
            }
        }
        Ok(None)
    }

    /// Pick the best aggregate based on data matches. A good name match
    /// triggers aggregation on its own; a good phone or email match only
    /// does so in the absence of a strong name mismatch, via the secondary
    /// pass.
    ///
    /// "John Doe" and "Jon Doe" sharing a number belong together; "John Doe"
    /// and "Deborah Doe" sharing a number do not.
    async fn pick_best_match_by_data(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
        candidates: &mut MatchCandidateList,
        matcher: &mut ContactMatcher,
    ) -> Result<Option<i64>> {
        self.update_match_scores(txn, raw_contact_id, CandidateMode::Aggregation, candidates, matcher)
            .await?;

        if let Some(best) = matcher.pick_best_match(SCORE_THRESHOLD_PRIMARY) {
            return Ok(Some(best));
        }
        self.pick_best_match_by_secondary_data(txn, candidates, matcher)
            .await
    }

    /// Scan the raw contact's data rows, expand name candidates, run the
    /// identifier lookups, and score the bulk name-index probe.
    pub(crate) async fn update_match_scores(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
        mode: CandidateMode,
        candidates: &mut MatchCandidateList,
        matcher: &mut ContactMatcher,
    ) -> Result<()> {
        for row in txn.data_rows(raw_contact_id).await? {
            match row.kind {
                DataKind::StructuredName => add_structured_name_candidates(
                    row.data1.as_deref(),
                    row.data2.as_deref(),
                    mode,
                    &self.clusters,
                    candidates,
                ),
                DataKind::Email => {
                    let Some(address) = row.data2.as_deref() else {
                        continue;
                    };
                    add_email_candidates(address, candidates);
                    for aggregate_id in txn.email_aggregate_ids(address).await? {
                        matcher.update_score_with_email_match(aggregate_id);
                    }
                }
                DataKind::Phone => {
                    let Some(number) = row.data2.as_deref() else {
                        continue;
                    };
                    for aggregate_id in txn.phone_aggregate_ids(number).await? {
                        matcher.update_score_with_phone_match(aggregate_id);
                    }
                }
                DataKind::Nickname => {
                    let Some(nick) = row.data2.as_deref() else {
                        continue;
                    };
                    add_nickname_candidates(nick, candidates);
                    let normalized = normalize(nick);
                    if !normalized.is_empty() {
                        for aggregate_id in txn.nickname_aggregate_ids(&normalized).await? {
                            matcher.update_score_with_nickname_match(aggregate_id);
                        }
                    }
                }
                DataKind::Photo => {}
            }
        }

        if !candidates.is_empty() {
            let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
            for found in txn.name_lookup_matches(&names).await? {
                for candidate in candidates.iter() {
                    matcher.match_name(
                        found.aggregate_id,
                        candidate.lookup_type,
                        &candidate.name,
                        found.name_type,
                        &found.normalized_name,
                        false,
                    );
                }
            }
        }

        if mode == CandidateMode::Suggestions {
            self.lookup_approximate_name_matches(txn, candidates, matcher)
                .await?;
        }
        Ok(())
    }

    /// Suggestion-mode widening: scan index rows sharing a candidate's
    /// two-character prefix and score them approximately. Each distinct
    /// prefix is scanned once.
    async fn lookup_approximate_name_matches(
        &self,
        txn: &mut dyn StoreTxn,
        candidates: &MatchCandidateList,
        matcher: &mut ContactMatcher,
    ) -> Result<()> {
        let mut prefixes: HashSet<String> = HashSet::new();
        for candidate in candidates.iter() {
            let prefix: String = candidate
                .name
                .chars()
                .take(APPROXIMATE_LOOKUP_PREFIX_LEN)
                .collect();
            if prefix.chars().count() == APPROXIMATE_LOOKUP_PREFIX_LEN {
                prefixes.insert(prefix);
            }
        }

        for prefix in &prefixes {
            for found in txn.name_lookup_by_prefix(prefix).await? {
                for candidate in candidates.iter() {
                    matcher.match_name(
                        found.aggregate_id,
                        candidate.lookup_type,
                        &candidate.name,
                        found.name_type,
                        &found.normalized_name,
                        true,
                    );
                }
            }
        }
        Ok(())
    }

    /// The secondary pass: reload structured names for every aggregate that
    /// had a phone or email hit but a weak name score, and re-score them
    /// against the structured-name candidates with approximate matching.
    async fn pick_best_match_by_secondary_data(
        &self,
        txn: &mut dyn StoreTxn,
        candidates: &MatchCandidateList,
        matcher: &mut ContactMatcher,
    ) -> Result<Option<i64>> {
        let secondary_ids = matcher.prepare_secondary_match_candidates(SCORE_THRESHOLD_PRIMARY);
        if secondary_ids.is_empty() {
            return Ok(None);
        }

        let rows = txn.structured_names_for_aggregates(&secondary_ids).await?;
        let mut loaded = MatchCandidateList::new();
        for row in rows {
            loaded.clear();
            add_structured_name_candidates(
                row.given_name.as_deref(),
                row.family_name.as_deref(),
                CandidateMode::InsertLookupData,
                &self.clusters,
                &mut loaded,
            );

            // Quadratic cross-match; candidate lists are small and secondary
            // hits without primary hits are rare.
            for candidate in candidates.iter() {
                if !candidate.lookup_type.is_based_on_structured_name() {
                    continue;
                }
                for name in loaded.iter() {
                    matcher.match_name(
                        row.aggregate_id,
                        name.lookup_type,
                        &name.name,
                        candidate.lookup_type,
                        &candidate.name,
                        true,
                    );
                }
            }
        }

        Ok(matcher.pick_best_match(SCORE_THRESHOLD_SECONDARY))
    }

    /// Rewrite the raw contact's lookup entries from scratch using the
    /// insert-mode candidate set. Email-derived nicknames are probe-only:
    /// they are regenerated from the email rows on every aggregation rather
    /// than stored.
    async fn rewrite_name_lookup(
        &self,
        txn: &mut dyn StoreTxn,
        raw_contact_id: i64,
        candidates: &mut MatchCandidateList,
    ) -> Result<()> {
        candidates.clear();
        for row in txn.data_rows(raw_contact_id).await? {
            match row.kind {
                DataKind::StructuredName => add_structured_name_candidates(
                    row.data1.as_deref(),
                    row.data2.as_deref(),
                    CandidateMode::InsertLookupData,
                    &self.clusters,
                    candidates,
                ),
                DataKind::Email => {
                    if let Some(address) = row.data2.as_deref() {
                        add_email_candidates(address, candidates);
                    }
                }
                DataKind::Nickname => {
                    if let Some(nick) = row.data2.as_deref() {
                        add_nickname_candidates(nick, candidates);
                    }
                }
                _ => {}
            }
        }

        let keys: Vec<(String, NameLookupType)> = candidates
            .iter()
            .filter(|c| c.lookup_type != NameLookupType::EmailBasedNickname)
            .map(|c| (c.name.clone(), c.lookup_type))
            .collect();
        txn.replace_name_lookup(raw_contact_id, &keys).await
    }

    /// Recompute display name, rolled-up options and the chosen photo from
    /// the aggregate's current members.
    pub(crate) async fn update_aggregate_data_in(
        &self,
        txn: &mut dyn StoreTxn,
        aggregate_id: i64,
    ) -> Result<()> {
        let members = txn.members(aggregate_id).await?;
        if members.is_empty() {
            return Ok(());
        }

        // Display name: the most complex member name wins. With nothing to
        // go on, leave whatever the field held before.
        let mut best_name: Option<&str> = None;
        for member in &members {
            let Some(name) = member.display_name.as_deref() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            best_name = match best_name {
                Some(current)
                    if compare_complexity(name, current) != std::cmp::Ordering::Greater =>
                {
                    Some(current)
                }
                _ => Some(name),
            };
        }
        if let Some(name) = best_name {
            txn.update_aggregate_display_name(aggregate_id, name).await?;
        }

        // Options roll-up. Voicemail: every member with an explicit value
        // must agree on true. Ringtone: first explicit value wins.
        let mut options = AggregateOptions::default();
        let mut voicemail_votes = 0usize;
        let mut voicemail_yes = 0usize;
        for member in &members {
            if let Some(value) = member.send_to_voicemail {
                voicemail_votes += 1;
                if value {
                    voicemail_yes += 1;
                }
            }
            if options.custom_ringtone.is_none() {
                options.custom_ringtone = member.custom_ringtone.clone();
            }
            options.last_time_contacted =
                options.last_time_contacted.max(member.last_time_contacted);
            options.times_contacted = options.times_contacted.max(member.times_contacted);
            options.starred |= member.starred;
        }
        options.send_to_voicemail = voicemail_votes > 0 && voicemail_votes == voicemail_yes;
        txn.update_aggregate_options(aggregate_id, &options).await?;

        // Photo: the member photo from the lexicographically smallest
        // account name, first one on ties. None found leaves the field.
        let mut chosen: Option<(i64, Option<String>)> = None;
        for candidate in txn.photo_candidates(aggregate_id).await? {
            let account = candidate.account_name.map(|a| a.to_lowercase());
            let better = match &chosen {
                None => true,
                Some((_, current)) => &account < current,
            };
            if better {
                chosen = Some((candidate.data_id, account));
            }
        }
        if let Some((photo_id, _)) = chosen {
            txn.update_aggregate_photo_id(aggregate_id, photo_id).await?;
        }
        Ok(())
    }

    /// Promote the joining contact's primary phone/email rows into the
    /// aggregate's empty super-primary slots. Optimal slots take any row;
    /// fallback slots only unrestricted rows.
    async fn promote_primaries(
        &self,
        txn: &mut dyn StoreTxn,
        aggregate_id: i64,
        raw: &RawContact,
        is_new: bool,
    ) -> Result<()> {
        let aggregate = txn
            .aggregate(aggregate_id)
            .await?
            .ok_or(Error::AggregateNotFound(aggregate_id))?;
        let mut primaries = aggregate.primaries.clone();

        let mut candidate_phone: Option<i64> = None;
        let mut candidate_email: Option<i64> = None;
        for row in txn.data_rows(raw.id).await? {
            if !row.is_primary {
                continue;
            }
            match row.kind {
                DataKind::Phone => candidate_phone = candidate_phone.or(Some(row.id)),
                DataKind::Email => candidate_email = candidate_email.or(Some(row.id)),
                _ => {}
            }
        }

        primaries.single_is_restricted = is_new && raw.is_restricted;

        if let Some(phone_id) = candidate_phone {
            if primaries.optimal_phone_id.is_none() {
                primaries.optimal_phone_id = Some(phone_id);
                primaries.optimal_phone_is_restricted = raw.is_restricted;
            }
            if primaries.fallback_phone_id.is_none() && !raw.is_restricted {
                primaries.fallback_phone_id = Some(phone_id);
            }
        }
        if let Some(email_id) = candidate_email {
            if primaries.optimal_email_id.is_none() {
                primaries.optimal_email_id = Some(email_id);
                primaries.optimal_email_is_restricted = raw.is_restricted;
            }
            if primaries.fallback_email_id.is_none() && !raw.is_restricted {
                primaries.fallback_email_id = Some(email_id);
            }
        }

        if primaries != aggregate.primaries {
            debug!(
                aggregate_id,
                raw_contact_id = raw.id,
                "promoting primary data rows"
            );
            txn.update_aggregate_primaries(aggregate_id, &primaries)
                .await?;
        }
        Ok(())
    }

    /// An aggregate is visible iff at least one member is unrestricted.
    async fn refresh_visibility(&self, txn: &mut dyn StoreTxn, aggregate_id: i64) -> Result<()> {
        let visible = txn
            .members(aggregate_id)
            .await?
            .iter()
            .any(|m| !m.is_restricted);
        txn.set_aggregate_visible(aggregate_id, visible).await
    }
}
