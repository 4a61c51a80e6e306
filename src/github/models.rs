//! GitHub REST resources used by the snooze handler.
//!
//! Only the fields the handler reads are modelled; everything else in the
//! payload is ignored.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

/// An issue (or the issue half of a pull request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// API url of the issue; the target of label updates.
    pub url: String,

    /// Browser url, used in log lines.
    #[serde(default)]
    pub html_url: String,

    #[serde(default)]
    pub number: u64,

    /// Labels currently attached. GitHub omits or nulls this on some
    /// payloads, both of which mean "no labels".
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Vec<Label>,
}

impl Issue {
    /// Returns true if a label with exactly this name is attached.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }

    /// Returns the label names that remain after removing `name`.
    ///
    /// The result keeps the original order and drops duplicate names, so it
    /// can be sent as a full replacement label set.
    pub fn labels_without(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.labels
            .iter()
            .map(|label| label.name.as_str())
            .filter(|label| *label != name && seen.insert(*label))
            .map(str::to_string)
            .collect()
    }
}

/// A label attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label { name: name.into() }
    }
}

/// Result of an organization membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// GitHub answered 204.
    Member,
    /// GitHub answered 404.
    NotMember,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Label>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Label>>::deserialize(deserializer)?.unwrap_or_default())
}
