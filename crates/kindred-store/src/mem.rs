//! Transactional in-memory contact store.
//!
//! State lives behind one async write lock. A transaction holds the lock for
//! its whole lifetime and keeps a snapshot of the state it started from:
//! commit discards the snapshot and releases the lock, dropping the
//! transaction restores the snapshot. [`StoreTxn::yield_if_contended`]
//! publishes the segment written so far and briefly releases the lock when
//! other callers are waiting, then re-acquires and snapshots again — the
//! same observable behaviour as a relational store's yield-on-contention
//! primitive.
//!
//! Row insertion (the ingest path's job) is exposed as inherent methods on
//! [`MemoryStore`], not through the engine-facing traits.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use kindred_core::{
    Aggregate, AggregateOptions, AggregatePrimaries, AggregationException, AggregationMode,
    ContactStore, DataKind, DataRow, Error, ExceptionPeer, ExceptionType, NameLookupEntry,
    NameLookupMatch, NameLookupType, PhotoCandidate, RawContact, Result, StoreTxn,
    StructuredNameRow,
};

use crate::phone::{fold_email, lookup_key};

#[derive(Debug, Clone, Default)]
struct StoreState {
    raw_contacts: BTreeMap<i64, RawContact>,
    data_rows: BTreeMap<i64, DataRow>,
    name_lookup: Vec<NameLookupEntry>,
    exceptions: Vec<AggregationException>,
    aggregates: BTreeMap<i64, Aggregate>,
    next_raw_contact_id: i64,
    next_data_row_id: i64,
    next_aggregate_id: i64,
}

impl StoreState {
    fn owner_aggregate(&self, raw_contact_id: i64) -> Option<i64> {
        self.raw_contacts
            .get(&raw_contact_id)
            .and_then(|r| r.aggregate_id)
    }
}

/// Parameters for inserting a raw contact. The ingest path owns everything
/// here; the engine only ever flips `aggregate_id` later.
#[derive(Debug, Clone)]
pub struct NewRawContact {
    pub aggregation_mode: AggregationMode,
    pub account_name: Option<String>,
    pub display_name: Option<String>,
    pub is_restricted: bool,
    pub custom_ringtone: Option<String>,
    pub send_to_voicemail: Option<bool>,
    pub last_time_contacted: Option<DateTime<Utc>>,
    pub times_contacted: i32,
    pub starred: bool,
}

impl Default for NewRawContact {
    fn default() -> Self {
        Self {
            aggregation_mode: AggregationMode::Default,
            account_name: None,
            display_name: None,
            is_restricted: false,
            custom_ringtone: None,
            send_to_voicemail: None,
            last_time_contacted: None,
            times_contacted: 0,
            starred: false,
        }
    }
}

impl NewRawContact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_account_name(mut self, account: &str) -> Self {
        self.account_name = Some(account.to_string());
        self
    }

    pub fn with_aggregation_mode(mut self, mode: AggregationMode) -> Self {
        self.aggregation_mode = mode;
        self
    }

    pub fn restricted(mut self) -> Self {
        self.is_restricted = true;
        self
    }

    pub fn with_custom_ringtone(mut self, ringtone: &str) -> Self {
        self.custom_ringtone = Some(ringtone.to_string());
        self
    }

    pub fn with_send_to_voicemail(mut self, value: bool) -> Self {
        self.send_to_voicemail = Some(value);
        self
    }

    pub fn with_last_time_contacted(mut self, at: DateTime<Utc>) -> Self {
        self.last_time_contacted = Some(at);
        self
    }

    pub fn with_times_contacted(mut self, times: i32) -> Self {
        self.times_contacted = times;
        self
    }

    pub fn starred(mut self) -> Self {
        self.starred = true;
        self
    }
}

/// Transactional in-memory implementation of [`ContactStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    waiters: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self) -> OwnedMutexGuard<StoreState> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.state.clone().lock_owned().await;
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        guard
    }

    // ---- ingest-side operations ----

    /// Insert a raw contact, returning its id. New contacts start without an
    /// aggregate; the engine assigns one during aggregation.
    pub async fn insert_raw_contact(&self, new: NewRawContact) -> i64 {
        let mut state = self.lock().await;
        state.next_raw_contact_id += 1;
        let id = state.next_raw_contact_id;
        state.raw_contacts.insert(
            id,
            RawContact {
                id,
                aggregate_id: None,
                aggregation_mode: new.aggregation_mode,
                account_name: new.account_name,
                display_name: new.display_name,
                is_restricted: new.is_restricted,
                custom_ringtone: new.custom_ringtone,
                send_to_voicemail: new.send_to_voicemail,
                last_time_contacted: new.last_time_contacted,
                times_contacted: new.times_contacted,
                starred: new.starred,
            },
        );
        id
    }

    /// Insert a typed data row for a raw contact, returning the row id.
    pub async fn insert_data_row(
        &self,
        raw_contact_id: i64,
        kind: DataKind,
        data1: Option<&str>,
        data2: Option<&str>,
        is_primary: bool,
    ) -> i64 {
        let mut state = self.lock().await;
        state.next_data_row_id += 1;
        let id = state.next_data_row_id;
        state.data_rows.insert(
            id,
            DataRow {
                id,
                raw_contact_id,
                kind,
                data1: data1.map(str::to_string),
                data2: data2.map(str::to_string),
                is_primary,
            },
        );
        id
    }

    /// Record a user-authored aggregation exception between two raw contacts.
    pub async fn insert_exception(
        &self,
        raw_contact_id1: i64,
        raw_contact_id2: i64,
        exception_type: ExceptionType,
    ) {
        let mut state = self.lock().await;
        state.exceptions.push(AggregationException {
            raw_contact_id1,
            raw_contact_id2,
            exception_type,
        });
    }

    /// Remove a raw contact and its data and lookup rows, as the ingest path
    /// does on deletion. The orphaned-aggregate cleanup stays with the
    /// engine's mark operation.
    pub async fn delete_raw_contact(&self, raw_contact_id: i64) {
        let mut state = self.lock().await;
        state.raw_contacts.remove(&raw_contact_id);
        state.data_rows.retain(|_, d| d.raw_contact_id != raw_contact_id);
        state
            .name_lookup
            .retain(|e| e.raw_contact_id != raw_contact_id);
    }

    // ---- test/observer reads ----

    pub async fn raw_contact(&self, raw_contact_id: i64) -> Option<RawContact> {
        self.lock().await.raw_contacts.get(&raw_contact_id).cloned()
    }

    pub async fn aggregate(&self, aggregate_id: i64) -> Option<Aggregate> {
        self.lock().await.aggregates.get(&aggregate_id).cloned()
    }

    pub async fn aggregate_count(&self) -> usize {
        self.lock().await.aggregates.len()
    }

    pub async fn name_lookup_entries(&self, raw_contact_id: i64) -> Vec<NameLookupEntry> {
        self.lock()
            .await
            .name_lookup
            .iter()
            .filter(|e| e.raw_contact_id == raw_contact_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>> {
        let guard = self.lock().await;
        let rollback = StoreState::clone(&guard);
        Ok(Box::new(MemoryTxn {
            state: self.state.clone(),
            waiters: self.waiters.clone(),
            guard: Some(guard),
            rollback: Some(rollback),
            committed: false,
        }))
    }

    async fn unaggregated_raw_contact_ids(&self) -> Result<Vec<i64>> {
        let state = self.lock().await;
        Ok(state
            .raw_contacts
            .values()
            .filter(|r| {
                r.aggregate_id.is_none() && r.aggregation_mode == AggregationMode::Default
            })
            .map(|r| r.id)
            .collect())
    }
}

/// An open transaction over a [`MemoryStore`].
pub struct MemoryTxn {
    state: Arc<Mutex<StoreState>>,
    waiters: Arc<AtomicUsize>,
    guard: Option<OwnedMutexGuard<StoreState>>,
    rollback: Option<StoreState>,
    committed: bool,
}

impl MemoryTxn {
    fn db(&mut self) -> &mut StoreState {
        self.guard
            .as_mut()
            .expect("transaction used after commit")
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let (Some(guard), Some(rollback)) = (self.guard.as_mut(), self.rollback.take()) {
            **guard = rollback;
        }
    }
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn raw_contact(&mut self, raw_contact_id: i64) -> Result<Option<RawContact>> {
        Ok(self.db().raw_contacts.get(&raw_contact_id).cloned())
    }

    async fn members(&mut self, aggregate_id: i64) -> Result<Vec<RawContact>> {
        Ok(self
            .db()
            .raw_contacts
            .values()
            .filter(|r| r.aggregate_id == Some(aggregate_id))
            .cloned()
            .collect())
    }

    async fn member_ids(&mut self, aggregate_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .db()
            .raw_contacts
            .values()
            .filter(|r| r.aggregate_id == Some(aggregate_id))
            .map(|r| r.id)
            .collect())
    }

    async fn set_raw_contact_aggregate_id(
        &mut self,
        raw_contact_id: i64,
        aggregate_id: Option<i64>,
    ) -> Result<()> {
        if let Some(raw) = self.db().raw_contacts.get_mut(&raw_contact_id) {
            raw.aggregate_id = aggregate_id;
        }
        Ok(())
    }

    async fn data_rows(&mut self, raw_contact_id: i64) -> Result<Vec<DataRow>> {
        Ok(self
            .db()
            .data_rows
            .values()
            .filter(|d| d.raw_contact_id == raw_contact_id)
            .cloned()
            .collect())
    }

    async fn structured_names_for_aggregates(
        &mut self,
        aggregate_ids: &[i64],
    ) -> Result<Vec<StructuredNameRow>> {
        let state = self.db();
        let mut rows = Vec::new();
        for data in state.data_rows.values() {
            if data.kind != DataKind::StructuredName {
                continue;
            }
            let Some(aggregate_id) = state.owner_aggregate(data.raw_contact_id) else {
                continue;
            };
            if aggregate_ids.contains(&aggregate_id) {
                rows.push(StructuredNameRow {
                    aggregate_id,
                    given_name: data.data1.clone(),
                    family_name: data.data2.clone(),
                });
            }
        }
        Ok(rows)
    }

    async fn photo_candidates(&mut self, aggregate_id: i64) -> Result<Vec<PhotoCandidate>> {
        let state = self.db();
        Ok(state
            .data_rows
            .values()
            .filter(|d| {
                d.kind == DataKind::Photo
                    && state.owner_aggregate(d.raw_contact_id) == Some(aggregate_id)
            })
            .map(|d| PhotoCandidate {
                data_id: d.id,
                account_name: state
                    .raw_contacts
                    .get(&d.raw_contact_id)
                    .and_then(|r| r.account_name.clone()),
            })
            .collect())
    }

    async fn phone_aggregate_ids(&mut self, number: &str) -> Result<Vec<i64>> {
        let key = lookup_key(number);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.db();
        let mut ids: Vec<i64> = state
            .data_rows
            .values()
            .filter(|d| d.kind == DataKind::Phone)
            .filter(|d| d.data2.as_deref().map(lookup_key) == Some(key.clone()))
            .filter_map(|d| state.owner_aggregate(d.raw_contact_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn email_aggregate_ids(&mut self, address: &str) -> Result<Vec<i64>> {
        let folded = fold_email(address);
        if folded.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.db();
        let mut ids: Vec<i64> = state
            .data_rows
            .values()
            .filter(|d| d.kind == DataKind::Email)
            .filter(|d| d.data2.as_deref().map(fold_email) == Some(folded.clone()))
            .filter_map(|d| state.owner_aggregate(d.raw_contact_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn nickname_aggregate_ids(&mut self, normalized: &str) -> Result<Vec<i64>> {
        let state = self.db();
        let mut ids: Vec<i64> = state
            .name_lookup
            .iter()
            .filter(|e| {
                e.name_type == NameLookupType::Nickname && e.normalized_name == normalized
            })
            .filter_map(|e| state.owner_aggregate(e.raw_contact_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn name_lookup_matches(&mut self, names: &[&str]) -> Result<Vec<NameLookupMatch>> {
        let state = self.db();
        Ok(state
            .name_lookup
            .iter()
            .filter(|e| names.contains(&e.normalized_name.as_str()))
            .filter_map(|e| {
                state.owner_aggregate(e.raw_contact_id).map(|aggregate_id| {
                    NameLookupMatch {
                        aggregate_id,
                        normalized_name: e.normalized_name.clone(),
                        name_type: e.name_type,
                    }
                })
            })
            .collect())
    }

    async fn name_lookup_by_prefix(&mut self, prefix: &str) -> Result<Vec<NameLookupMatch>> {
        let state = self.db();
        Ok(state
            .name_lookup
            .iter()
            .filter(|e| e.normalized_name.starts_with(prefix))
            .filter_map(|e| {
                state.owner_aggregate(e.raw_contact_id).map(|aggregate_id| {
                    NameLookupMatch {
                        aggregate_id,
                        normalized_name: e.normalized_name.clone(),
                        name_type: e.name_type,
                    }
                })
            })
            .collect())
    }

    async fn replace_name_lookup(
        &mut self,
        raw_contact_id: i64,
        keys: &[(String, NameLookupType)],
    ) -> Result<()> {
        let state = self.db();
        state
            .name_lookup
            .retain(|e| e.raw_contact_id != raw_contact_id);
        for (normalized_name, name_type) in keys {
            state.name_lookup.push(NameLookupEntry {
                raw_contact_id,
                normalized_name: normalized_name.clone(),
                name_type: *name_type,
            });
        }
        Ok(())
    }

    async fn delete_name_lookup(&mut self, raw_contact_id: i64) -> Result<()> {
        self.db()
            .name_lookup
            .retain(|e| e.raw_contact_id != raw_contact_id);
        Ok(())
    }

    async fn exception_peers(&mut self, raw_contact_id: i64) -> Result<Vec<ExceptionPeer>> {
        let state = self.db();
        Ok(state
            .exceptions
            .iter()
            .filter_map(|ex| {
                let peer = if ex.raw_contact_id1 == raw_contact_id {
                    ex.raw_contact_id2
                } else if ex.raw_contact_id2 == raw_contact_id {
                    ex.raw_contact_id1
                } else {
                    return None;
                };
                Some(ExceptionPeer {
                    exception_type: ex.exception_type,
                    peer_raw_contact_id: peer,
                    peer_aggregate_id: state.owner_aggregate(peer),
                })
            })
            .collect())
    }

    async fn aggregate(&mut self, aggregate_id: i64) -> Result<Option<Aggregate>> {
        Ok(self.db().aggregates.get(&aggregate_id).cloned())
    }

    async fn aggregates_by_ids(&mut self, aggregate_ids: &[i64]) -> Result<Vec<Aggregate>> {
        let state = self.db();
        Ok(state
            .aggregates
            .values()
            .filter(|a| aggregate_ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn insert_aggregate(&mut self, display_name: &str) -> Result<i64> {
        let state = self.db();
        state.next_aggregate_id += 1;
        let id = state.next_aggregate_id;
        state.aggregates.insert(
            id,
            Aggregate {
                id,
                display_name: display_name.to_string(),
                photo_id: None,
                in_visible_group: false,
                options: AggregateOptions::default(),
                primaries: AggregatePrimaries::default(),
            },
        );
        Ok(id)
    }

    async fn update_aggregate_display_name(
        &mut self,
        aggregate_id: i64,
        display_name: &str,
    ) -> Result<()> {
        if let Some(agg) = self.db().aggregates.get_mut(&aggregate_id) {
            agg.display_name = display_name.to_string();
        }
        Ok(())
    }

    async fn update_aggregate_photo_id(&mut self, aggregate_id: i64, photo_id: i64) -> Result<()> {
        if let Some(agg) = self.db().aggregates.get_mut(&aggregate_id) {
            agg.photo_id = Some(photo_id);
        }
        Ok(())
    }

    async fn update_aggregate_options(
        &mut self,
        aggregate_id: i64,
        options: &AggregateOptions,
    ) -> Result<()> {
        if let Some(agg) = self.db().aggregates.get_mut(&aggregate_id) {
            agg.options = options.clone();
        }
        Ok(())
    }

    async fn update_aggregate_primaries(
        &mut self,
        aggregate_id: i64,
        primaries: &AggregatePrimaries,
    ) -> Result<()> {
        if let Some(agg) = self.db().aggregates.get_mut(&aggregate_id) {
            agg.primaries = primaries.clone();
        }
        Ok(())
    }

    async fn set_aggregate_visible(&mut self, aggregate_id: i64, visible: bool) -> Result<()> {
        if let Some(agg) = self.db().aggregates.get_mut(&aggregate_id) {
            agg.in_visible_group = visible;
        }
        Ok(())
    }

    async fn delete_aggregate_if_orphaned(&mut self, aggregate_id: i64) -> Result<bool> {
        let state = self.db();
        let referenced = state
            .raw_contacts
            .values()
            .any(|r| r.aggregate_id == Some(aggregate_id));
        if referenced {
            return Ok(false);
        }
        Ok(state.aggregates.remove(&aggregate_id).is_some())
    }

    async fn yield_if_contended(&mut self) -> Result<bool> {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return Ok(false);
        }
        debug!(
            subsystem = "store",
            component = "mem",
            op = "yield",
            "yielding write lock to waiting connections"
        );
        // Publish the current segment, let waiters in, then re-acquire.
        self.rollback = None;
        self.guard = None;
        tokio::task::yield_now().await;
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.state.clone().lock_owned().await;
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        self.rollback = Some(StoreState::clone(&guard));
        self.guard = Some(guard);
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        if this.guard.is_none() {
            return Err(Error::Internal("transaction already closed".into()));
        }
        this.committed = true;
        this.rollback = None;
        this.guard = None;
        Ok(())
    }
}
