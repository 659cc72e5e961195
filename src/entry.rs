//! The documentation entry model.
//!
//! Parsing produces [`EntryDraft`]s keyed by [`EntryKey`]. Drafts that land
//! on the same key are merged, and once a whole version has been aggregated
//! each surviving draft is frozen into an [`Entry`] with a numeric id.

use serde::{Deserialize, Serialize};

/// Corpus-wide entry identifier.
pub type EntryId = u64;

/// Documentation generation an entry belongs to (1, 2, ...).
pub type DocVersion = u32;

/// Natural key of an entry within one version.
///
/// Ordering is page-then-fragment, and `None` sorts before any fragment, so
/// a page's whole-page entry always leads it.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntryKey {
    pub page: String,
    pub fragment: Option<String>,
}

impl EntryKey {
    pub fn page(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            fragment: None,
        }
    }

    pub fn fragment(
        page: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            page: page.into(),
            fragment: Some(fragment.into()),
        }
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{fragment}", self.page),
            None => f.write_str(&self.page),
        }
    }
}

/// An entry under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub key: EntryKey,
    pub primary_names: Vec<String>,
    pub secondary_names: Vec<String>,
    pub content: Option<String>,
    pub syntax: Option<String>,
    /// Version tag attached to the heading, e.g. `v1.1.20+`.
    pub since: Option<String>,
    /// Enclosing entries, nearest first.
    pub parents: Vec<EntryKey>,
}

impl EntryDraft {
    pub fn new(key: EntryKey, primary_names: Vec<String>) -> Self {
        Self {
            key,
            primary_names,
            secondary_names: Vec::new(),
            content: None,
            syntax: None,
            since: None,
            parents: Vec::new(),
        }
    }

    /// Absorb another draft for the same key.
    ///
    /// Optional fields keep the existing value when both sides have one.
    /// The other draft's names become secondary names here; primary names
    /// are never replaced.
    pub fn merge(&mut self, other: EntryDraft) {
        debug_assert_eq!(self.key, other.key);

        if self.content.is_none() {
            self.content = other.content;
        }
        if self.syntax.is_none() {
            self.syntax = other.syntax;
        }
        if self.since.is_none() {
            self.since = other.since;
        }
        if self.parents.is_empty() {
            self.parents = other.parents;
        }

        for name in other
            .primary_names
            .into_iter()
            .chain(other.secondary_names)
        {
            if !self.has_name(&name) {
                self.secondary_names.push(name);
            }
        }
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.primary_names.iter().any(|n| n == name)
            || self.secondary_names.iter().any(|n| n == name)
    }
}

/// A finished, immutable documentation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub v: DocVersion,
    pub page: String,
    pub fragment: Option<String>,
    pub primary_names: Vec<String>,
    pub secondary_names: Vec<String>,
    pub content: Option<String>,
    pub syntax: Option<String>,
    pub version: Option<String>,
    pub parents: Vec<EntryId>,
}

impl Entry {
    /// The display name: the first primary name.
    pub fn name(&self) -> &str {
        self.primary_names.first().map(String::as_str).unwrap_or("")
    }
}
