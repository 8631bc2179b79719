//! Core data models for the kindred engine.
//!
//! These types are shared across all kindred crates and represent the core
//! domain entities: per-source raw contacts, their typed data rows, and the
//! derived aggregates that cluster raw contacts into real people.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// RAW CONTACTS
// =============================================================================

/// How a raw contact participates in aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Picked up by the background pass.
    Default,
    /// Aggregated synchronously inside the ingest transaction.
    Immediate,
    /// Never aggregated.
    Disabled,
}

/// One address-book entry from one source account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContact {
    pub id: i64,
    /// The aggregate this contact currently belongs to; unset while pending.
    pub aggregate_id: Option<i64>,
    pub aggregation_mode: AggregationMode,
    /// Source account the contact was ingested from.
    pub account_name: Option<String>,
    /// Cached display name maintained by the ingest path.
    pub display_name: Option<String>,
    /// Package-scoped visibility: restricted rows never surface through the
    /// unrestricted fallback slots.
    pub is_restricted: bool,
    pub custom_ringtone: Option<String>,
    pub send_to_voicemail: Option<bool>,
    pub last_time_contacted: Option<DateTime<Utc>>,
    pub times_contacted: i32,
    pub starred: bool,
}

// =============================================================================
// DATA ROWS
// =============================================================================

/// Kind of a typed data row (the row's mimetype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// data1 = given name, data2 = family name.
    StructuredName,
    /// data2 = address.
    Email,
    /// data2 = number.
    Phone,
    /// data2 = nickname.
    Nickname,
    /// data1 = photo reference.
    Photo,
}

/// Typed attribute attached to a raw contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
    pub id: i64,
    pub raw_contact_id: i64,
    pub kind: DataKind,
    pub data1: Option<String>,
    pub data2: Option<String>,
    /// Preferred row of its kind within the raw contact.
    pub is_primary: bool,
}

// =============================================================================
// NAME LOOKUP
// =============================================================================

/// Tag describing how a normalised lookup name was derived from its source
/// data row. The cross-type pairing of two tags drives the match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameLookupType {
    /// "given·family"
    FullName,
    /// "family·given"
    FullNameReverse,
    /// "givenfamily"
    FullNameConcatenated,
    /// "familygiven"
    FullNameReverseConcatenated,
    /// Nickname substituted for the given name.
    FullNameWithNickname,
    /// Nickname substituted for the given name, reversed.
    FullNameWithNicknameReverse,
    GivenNameOnly,
    GivenNameOnlyAsNickname,
    FamilyNameOnly,
    FamilyNameOnlyAsNickname,
    /// Free-form nickname row.
    Nickname,
    /// Local part of an email address.
    EmailBasedNickname,
}

impl NameLookupType {
    /// All tags, in scoring-table order.
    pub const ALL: [NameLookupType; 12] = [
        NameLookupType::FullName,
        NameLookupType::FullNameReverse,
        NameLookupType::FullNameConcatenated,
        NameLookupType::FullNameReverseConcatenated,
        NameLookupType::FullNameWithNickname,
        NameLookupType::FullNameWithNicknameReverse,
        NameLookupType::GivenNameOnly,
        NameLookupType::GivenNameOnlyAsNickname,
        NameLookupType::FamilyNameOnly,
        NameLookupType::FamilyNameOnlyAsNickname,
        NameLookupType::Nickname,
        NameLookupType::EmailBasedNickname,
    ];

    /// True for tags derived from a structured-name row. The secondary match
    /// pass only compares structured-name derivations.
    pub fn is_based_on_structured_name(self) -> bool {
        !matches!(
            self,
            NameLookupType::Nickname | NameLookupType::EmailBasedNickname
        )
    }

    /// Dense index used by the scoring table.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One approximate-match index entry for a raw contact. Entries for a raw
/// contact are always replaced wholesale, never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameLookupEntry {
    pub raw_contact_id: i64,
    pub normalized_name: String,
    pub name_type: NameLookupType,
}

/// Row returned by a name-lookup query, joined to the owning raw contact's
/// aggregate. Only rows belonging to aggregated raw contacts are returned.
#[derive(Debug, Clone)]
pub struct NameLookupMatch {
    pub aggregate_id: i64,
    pub normalized_name: String,
    pub name_type: NameLookupType,
}

// =============================================================================
// AGGREGATION EXCEPTIONS
// =============================================================================

/// User-authored override forcing two raw contacts together or apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionType {
    KeepIn,
    KeepOut,
}

/// A stored aggregation exception. Immutable to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationException {
    pub raw_contact_id1: i64,
    pub raw_contact_id2: i64,
    pub exception_type: ExceptionType,
}

/// Exception row viewed from one raw contact's side: the other party and,
/// when the other party is already aggregated, its aggregate.
#[derive(Debug, Clone)]
pub struct ExceptionPeer {
    pub exception_type: ExceptionType,
    pub peer_raw_contact_id: i64,
    pub peer_aggregate_id: Option<i64>,
}

// =============================================================================
// AGGREGATES
// =============================================================================

/// Super-primary slots of an aggregate: the chosen representative phone and
/// email across all members. Optimal slots accept any visibility; fallback
/// slots only unrestricted rows, so restricted data never leaks through a
/// public surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePrimaries {
    pub optimal_phone_id: Option<i64>,
    pub optimal_phone_is_restricted: bool,
    pub fallback_phone_id: Option<i64>,
    pub optimal_email_id: Option<i64>,
    pub optimal_email_is_restricted: bool,
    pub fallback_email_id: Option<i64>,
    /// True iff the aggregate has exactly one member and it is restricted.
    pub single_is_restricted: bool,
}

/// Per-aggregate options rolled up from member raw contacts.
///
/// `times_contacted` rolls up with `max`, not `sum` — the historical
/// behaviour of the engine, preserved deliberately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateOptions {
    pub send_to_voicemail: bool,
    pub custom_ringtone: Option<String>,
    pub last_time_contacted: Option<DateTime<Utc>>,
    pub times_contacted: i32,
    pub starred: bool,
}

/// Derived cluster of raw contacts representing one real person. Pure
/// projection of its members: an aggregate exists iff at least one raw
/// contact references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: i64,
    pub display_name: String,
    pub photo_id: Option<i64>,
    /// True iff at least one member is unrestricted.
    pub in_visible_group: bool,
    pub options: AggregateOptions,
    pub primaries: AggregatePrimaries,
}

// =============================================================================
// QUERY VIEW ROWS
// =============================================================================

/// Structured-name payload of an aggregated raw contact, loaded for the
/// secondary (approximate) match pass.
#[derive(Debug, Clone)]
pub struct StructuredNameRow {
    pub aggregate_id: i64,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// Photo data row candidate with the owning raw contact's account name.
#[derive(Debug, Clone)]
pub struct PhotoCandidate {
    pub data_id: i64,
    pub account_name: Option<String>,
}
