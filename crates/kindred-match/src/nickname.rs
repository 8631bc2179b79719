//! Common-nickname cluster table.
//!
//! A cluster groups a canonical given name with its common short forms
//! ("robert" with "bob", "rob", "bobby"). Candidate expansion consults the
//! table so "Bob Miller" can reach "Robert Miller" through a
//! nickname-substituted lookup key. The table is an injectable collaborator:
//! tests supply their own clusters.

use std::collections::HashMap;

/// Built-in clusters of common English given names and their short forms.
/// Membership is symmetric: every name in a cluster maps to all the others.
const DEFAULT_TABLE: &[&[&str]] = &[
    &["albert", "al", "bert"],
    &["alexander", "alex", "sasha"],
    &["andrew", "andy", "drew"],
    &["anthony", "tony"],
    &["barbara", "barb", "babs"],
    &["catherine", "katherine", "kate", "katie", "kathy", "cathy"],
    &["charles", "charlie", "chuck"],
    &["christopher", "chris", "topher"],
    &["daniel", "dan", "danny"],
    &["david", "dave", "davy"],
    &["deborah", "debbie", "deb"],
    &["donald", "don", "donny"],
    &["dorothy", "dot", "dottie"],
    &["edward", "ed", "eddie", "ted"],
    &["elizabeth", "liz", "beth", "betsy", "betty"],
    &["eugene", "gene"],
    &["frances", "fran", "frannie"],
    &["gerald", "jerry"],
    &["gregory", "greg"],
    &["henry", "hank", "harry"],
    &["james", "jim", "jimmy", "jamie"],
    &["jennifer", "jen", "jenny"],
    &["john", "jack", "johnny"],
    &["joseph", "joe", "joey"],
    &["joshua", "josh"],
    &["kenneth", "ken", "kenny"],
    &["lawrence", "larry"],
    &["margaret", "maggie", "meg", "peggy"],
    &["matthew", "matt"],
    &["michael", "mike", "mick", "mickey"],
    &["nicholas", "nick"],
    &["pamela", "pam"],
    &["patricia", "pat", "patty", "tricia"],
    &["peter", "pete"],
    &["raymond", "ray"],
    &["rebecca", "becky"],
    &["richard", "rich", "rick", "dick"],
    &["robert", "rob", "bob", "bobby"],
    &["ronald", "ron", "ronny"],
    &["samuel", "sam", "sammy"],
    &["stephen", "steven", "steve"],
    &["susan", "sue", "susie"],
    &["theodore", "ted", "theo"],
    &["thomas", "tom", "tommy"],
    &["timothy", "tim", "timmy"],
    &["victoria", "vicky", "tori"],
    &["william", "will", "bill", "billy", "liam"],
];

/// Lookup over nickname clusters, keyed by normalised name.
#[derive(Debug, Clone)]
pub struct NicknameClusters {
    index: HashMap<String, usize>,
    clusters: Vec<Vec<String>>,
}

impl NicknameClusters {
    /// Build a table from explicit clusters. A name appearing in several
    /// clusters belongs to the first one listed.
    pub fn new(table: &[&[&str]]) -> Self {
        let mut index = HashMap::new();
        let mut clusters = Vec::with_capacity(table.len());
        for members in table {
            let slot = clusters.len();
            clusters.push(members.iter().map(|m| m.to_string()).collect::<Vec<_>>());
            for member in *members {
                index.entry(member.to_string()).or_insert(slot);
            }
        }
        Self { index, clusters }
    }

    /// An empty table: no nickname bridging at all.
    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// The other members of the cluster containing `normalized`, if any.
    pub fn cluster_names(&self, normalized: &str) -> Option<Vec<&str>> {
        let slot = *self.index.get(normalized)?;
        let names: Vec<&str> = self.clusters[slot]
            .iter()
            .map(String::as_str)
            .filter(|n| *n != normalized)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}

impl Default for NicknameClusters {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}
