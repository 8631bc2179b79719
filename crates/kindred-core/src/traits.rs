//! The persistence interface consumed by the aggregation engine.
//!
//! These traits define the contract a backing store must satisfy, enabling
//! pluggable backends and testability. The engine itself never touches
//! storage directly: every read and write during aggregation goes through an
//! open [`StoreTxn`].
//!
//! Transactions follow the commit-or-drop discipline: [`StoreTxn::commit`]
//! consumes the transaction and publishes its writes; dropping the
//! transaction without committing rolls back everything since the last
//! published point. [`StoreTxn::yield_if_contended`] is the one cooperative
//! suspension point inside a long write: it publishes the work done so far
//! and briefly releases the write lock if readers are waiting.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

/// Handle to the persistent contact store.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Open a write transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTxn>>;

    /// Ids of raw contacts awaiting aggregation: no aggregate id yet and
    /// `aggregation_mode = Default`. This is the background pass's work list.
    async fn unaggregated_raw_contact_ids(&self) -> Result<Vec<i64>>;
}

/// An open transaction against the contact store.
///
/// Reads performed through the transaction observe its own uncommitted
/// writes. All list-returning reads yield rows in ascending id order.
#[async_trait]
pub trait StoreTxn: Send {
    // ---- raw contacts ----

    async fn raw_contact(&mut self, raw_contact_id: i64) -> Result<Option<RawContact>>;

    /// Members of an aggregate.
    async fn members(&mut self, aggregate_id: i64) -> Result<Vec<RawContact>>;

    /// Member ids of an aggregate.
    async fn member_ids(&mut self, aggregate_id: i64) -> Result<Vec<i64>>;

    /// Point the raw contact at an aggregate, or clear the reference.
    async fn set_raw_contact_aggregate_id(
        &mut self,
        raw_contact_id: i64,
        aggregate_id: Option<i64>,
    ) -> Result<()>;

    // ---- data rows ----

    /// All typed data rows of a raw contact.
    async fn data_rows(&mut self, raw_contact_id: i64) -> Result<Vec<DataRow>>;

    /// Structured-name rows belonging to members of the given aggregates,
    /// for the secondary match pass.
    async fn structured_names_for_aggregates(
        &mut self,
        aggregate_ids: &[i64],
    ) -> Result<Vec<StructuredNameRow>>;

    /// Photo rows of an aggregate's members with their account names.
    async fn photo_candidates(&mut self, aggregate_id: i64) -> Result<Vec<PhotoCandidate>>;

    // ---- identifier lookups (restricted to aggregated raw contacts) ----

    /// Aggregates owning a phone row matching the number under the store's
    /// phone-lookup predicate (canonicalised comparison).
    async fn phone_aggregate_ids(&mut self, number: &str) -> Result<Vec<i64>>;

    /// Aggregates owning an email row equal to the address, compared
    /// case-insensitively.
    async fn email_aggregate_ids(&mut self, address: &str) -> Result<Vec<i64>>;

    /// Aggregates holding a `Nickname`-tagged lookup entry equal to the
    /// normalised nickname.
    async fn nickname_aggregate_ids(&mut self, normalized: &str) -> Result<Vec<i64>>;

    // ---- name lookup index ----

    /// Lookup entries whose normalised name equals any of `names`, joined to
    /// the owning raw contact's aggregate. Unaggregated rows are excluded.
    async fn name_lookup_matches(&mut self, names: &[&str]) -> Result<Vec<NameLookupMatch>>;

    /// Lookup entries whose normalised name starts with `prefix`, joined and
    /// filtered like [`Self::name_lookup_matches`]. Used by the approximate
    /// suggestion scan.
    async fn name_lookup_by_prefix(&mut self, prefix: &str) -> Result<Vec<NameLookupMatch>>;

    /// Replace the raw contact's lookup entries wholesale.
    async fn replace_name_lookup(
        &mut self,
        raw_contact_id: i64,
        keys: &[(String, NameLookupType)],
    ) -> Result<()>;

    /// Delete all lookup entries of a raw contact.
    async fn delete_name_lookup(&mut self, raw_contact_id: i64) -> Result<()>;

    // ---- aggregation exceptions ----

    /// Exceptions naming the raw contact, viewed from its side.
    async fn exception_peers(&mut self, raw_contact_id: i64) -> Result<Vec<ExceptionPeer>>;

    // ---- aggregates ----

    async fn aggregate(&mut self, aggregate_id: i64) -> Result<Option<Aggregate>>;

    /// Load the given aggregates in ascending id order. Missing ids are
    /// silently skipped.
    async fn aggregates_by_ids(&mut self, aggregate_ids: &[i64]) -> Result<Vec<Aggregate>>;

    /// Insert a fresh aggregate, returning its auto-generated id.
    async fn insert_aggregate(&mut self, display_name: &str) -> Result<i64>;

    async fn update_aggregate_display_name(
        &mut self,
        aggregate_id: i64,
        display_name: &str,
    ) -> Result<()>;

    async fn update_aggregate_photo_id(&mut self, aggregate_id: i64, photo_id: i64) -> Result<()>;

    async fn update_aggregate_options(
        &mut self,
        aggregate_id: i64,
        options: &AggregateOptions,
    ) -> Result<()>;

    async fn update_aggregate_primaries(
        &mut self,
        aggregate_id: i64,
        primaries: &AggregatePrimaries,
    ) -> Result<()>;

    async fn set_aggregate_visible(&mut self, aggregate_id: i64, visible: bool) -> Result<()>;

    /// Delete the aggregate if no raw contact references it any more.
    /// Returns true if a row was deleted.
    async fn delete_aggregate_if_orphaned(&mut self, aggregate_id: i64) -> Result<bool>;

    // ---- transaction control ----

    /// Publish the work done so far and briefly release the write lock if
    /// other connections are waiting on it. Returns true if the lock was
    /// actually yielded.
    async fn yield_if_contended(&mut self) -> Result<bool>;

    /// Publish all writes and close the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}
