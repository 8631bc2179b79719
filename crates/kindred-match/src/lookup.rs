//! Lookup-key candidate expansion.
//!
//! Each data row of a raw contact expands into a set of normalised name
//! candidates tagged with a [`NameLookupType`]. The same expansion serves
//! three purposes, distinguished by [`CandidateMode`]:
//!
//! - `InsertLookupData` — the keys written to the lookup index. Full names
//!   skip the single-token given/family fallback to keep the index small.
//! - `Aggregation` — the keys probed while aggregating a contact, including
//!   the single-token fallbacks.
//! - `Suggestions` — like aggregation, and the caller additionally runs the
//!   approximate prefix scan over the index.

use kindred_core::models::NameLookupType;

use crate::nickname::NicknameClusters;
use crate::normalizer::normalize;

/// Separator between name parts in a composite lookup key.
const KEY_SEPARATOR: char = '.';

/// What the expanded candidate set will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMode {
    /// Rewriting the lookup index for a raw contact.
    InsertLookupData,
    /// Probing the index during aggregation.
    Aggregation,
    /// Probing the index for the suggestion query.
    Suggestions,
}

/// A potential match for one name, tagged with how it was derived.
#[derive(Debug, Clone)]
pub struct NameCandidate {
    pub name: String,
    pub lookup_type: NameLookupType,
}

/// A candidate list that keeps its elements when truncated, so the buffer
/// can be reused across raw contacts without reallocating.
#[derive(Debug, Default)]
pub struct MatchCandidateList {
    list: Vec<NameCandidate>,
    count: usize,
}

impl MatchCandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate, reusing a truncated slot when one is available.
    pub fn add(&mut self, name: String, lookup_type: NameLookupType) {
        if self.count >= self.list.len() {
            self.list.push(NameCandidate { name, lookup_type });
        } else {
            let slot = &mut self.list[self.count];
            slot.name = name;
            slot.lookup_type = lookup_type;
        }
        self.count += 1;
    }

    /// Truncate without dropping the underlying slots.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameCandidate> {
        self.list[..self.count].iter()
    }
}

/// Expand a structured-name row into lookup candidates.
///
/// A row with neither a given nor a family part contributes nothing; a row
/// with one part contributes the single-token key and its nickname cluster.
pub fn add_structured_name_candidates(
    given_name: Option<&str>,
    family_name: Option<&str>,
    mode: CandidateMode,
    clusters: &NicknameClusters,
    out: &mut MatchCandidateList,
) {
    let given = normalize(given_name.unwrap_or(""));
    let family = normalize(family_name.unwrap_or(""));

    match (given.is_empty(), family.is_empty()) {
        (true, true) => {}
        (true, false) => add_family_name_only(&family, clusters, out),
        (false, true) => add_given_name_only(&given, clusters, out),
        (false, false) => add_full_name(&given, &family, mode, clusters, out),
    }
}

fn add_given_name_only(given: &str, clusters: &NicknameClusters, out: &mut MatchCandidateList) {
    out.add(given.to_string(), NameLookupType::GivenNameOnly);
    if let Some(names) = clusters.cluster_names(given) {
        for name in names {
            out.add(name.to_string(), NameLookupType::GivenNameOnlyAsNickname);
        }
    }
}

fn add_family_name_only(family: &str, clusters: &NicknameClusters, out: &mut MatchCandidateList) {
    out.add(family.to_string(), NameLookupType::FamilyNameOnly);

    // A lone family name may really be a given name with the parts swapped.
    if let Some(names) = clusters.cluster_names(family) {
        for name in names {
            out.add(name.to_string(), NameLookupType::FamilyNameOnlyAsNickname);
        }
    }
}

fn add_full_name(
    given: &str,
    family: &str,
    mode: CandidateMode,
    clusters: &NicknameClusters,
    out: &mut MatchCandidateList,
) {
    let given_nicknames = clusters.cluster_names(given);
    let family_nicknames = clusters.cluster_names(family);

    out.add(
        format!("{given}{KEY_SEPARATOR}{family}"),
        NameLookupType::FullName,
    );
    if let Some(names) = &given_nicknames {
        for name in names {
            out.add(
                format!("{name}{KEY_SEPARATOR}{family}"),
                NameLookupType::FullNameWithNickname,
            );
        }
    }
    out.add(
        format!("{family}{KEY_SEPARATOR}{given}"),
        NameLookupType::FullNameReverse,
    );
    if let Some(names) = &family_nicknames {
        for name in names {
            out.add(
                format!("{name}{KEY_SEPARATOR}{given}"),
                NameLookupType::FullNameWithNicknameReverse,
            );
        }
    }
    out.add(
        format!("{given}{family}"),
        NameLookupType::FullNameConcatenated,
    );
    out.add(
        format!("{family}{given}"),
        NameLookupType::FullNameReverseConcatenated,
    );

    if mode == CandidateMode::InsertLookupData {
        return;
    }

    // Single-token fallbacks are probe-only; they would bloat the index.
    out.add(given.to_string(), NameLookupType::GivenNameOnly);
    if let Some(names) = &given_nicknames {
        for name in names {
            out.add(name.to_string(), NameLookupType::GivenNameOnlyAsNickname);
        }
    }
    out.add(family.to_string(), NameLookupType::FamilyNameOnly);
    if let Some(names) = &family_nicknames {
        for name in names {
            out.add(name.to_string(), NameLookupType::FamilyNameOnlyAsNickname);
        }
    }
}

/// Derive an `EmailBasedNickname` candidate from the local part of an email
/// address, so "johndoe@example.org" can reach a "John Doe" structured name.
pub fn add_email_candidates(address: &str, out: &mut MatchCandidateList) {
    let Some(local) = email_local_part(address) else {
        return;
    };
    let normalized = normalize(&local);
    if !normalized.is_empty() {
        out.add(normalized, NameLookupType::EmailBasedNickname);
    }
}

/// Expand a free-form nickname row.
pub fn add_nickname_candidates(nickname: &str, out: &mut MatchCandidateList) {
    let normalized = normalize(nickname);
    if !normalized.is_empty() {
        out.add(normalized, NameLookupType::Nickname);
    }
}

/// Extract the local part of an email address, tolerating the
/// `Display Name <address>` form.
pub fn email_local_part(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let addr = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(open), Some(close)) if open < close => trimmed[open + 1..close].trim(),
        _ => trimmed,
    };
    if addr.is_empty() {
        return None;
    }
    let local = match addr.find('@') {
        Some(at) => &addr[..at],
        None => addr,
    };
    if local.is_empty() {
        None
    } else {
        Some(local.to_string())
    }
}
