//! Merge drafts from every parse pass of a version and freeze them.

use std::collections::{BTreeMap, HashMap};

use crate::{
    entry::{DocVersion, Entry, EntryDraft, EntryId, EntryKey},
    error::{Error, Result},
};

/// Name → entry id, first writer wins.
///
/// Several entries may carry the same name; the index keeps whichever
/// claimed it first. [`Aggregator::finalize`] inserts every primary name in
/// the corpus before any secondary name, so an entry's own heading always
/// beats a name it merely absorbed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIndex {
    names: Vec<String>,
    ids: HashMap<String, EntryId>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and changes nothing) if the name is already taken.
    pub fn insert(&mut self, name: &str, id: EntryId) -> bool {
        if self.ids.contains_key(name) {
            return false;
        }
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<EntryId> {
        self.ids.get(name).copied()
    }

    /// All names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EntryId)> + '_ {
        self.names.iter().map(|n| (n.as_str(), self.ids[n]))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, EntryId)> for NameIndex {
    fn from_iter<I: IntoIterator<Item = (String, EntryId)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (name, id) in iter {
            index.insert(&name, id);
        }
        index
    }
}

/// The frozen output of one aggregation pass.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub version: DocVersion,
    /// In id order.
    pub entries: Vec<Entry>,
    pub names: NameIndex,
}

impl Corpus {
    pub fn first_id(&self) -> Option<EntryId> {
        self.entries.first().map(|e| e.id)
    }

    pub fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(|e| e.id)
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        let first = self.first_id()?;
        let idx = usize::try_from(id.checked_sub(first)?).ok()?;
        self.entries.get(idx)
    }
}

/// Collects drafts for one version, keyed page-then-fragment.
#[derive(Debug)]
pub struct Aggregator {
    version: DocVersion,
    pages: BTreeMap<String, BTreeMap<Option<String>, EntryDraft>>,
}

impl Aggregator {
    pub fn new(version: DocVersion) -> Self {
        Self {
            version,
            pages: BTreeMap::new(),
        }
    }

    /// Insert a draft, merging into an existing one with the same key.
    pub fn add(&mut self, draft: EntryDraft) {
        let EntryKey { page, fragment } = draft.key.clone();
        let page = self.pages.entry(page).or_default();
        match page.get_mut(&fragment) {
            Some(existing) => existing.merge(draft),
            None => {
                page.insert(fragment, draft);
            }
        }
    }

    pub fn extend(&mut self, drafts: impl IntoIterator<Item = EntryDraft>) {
        for draft in drafts {
            self.add(draft);
        }
    }

    pub fn contains_page(&self, page: &str) -> bool {
        self.pages.contains_key(page)
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign ids from `first_id` upward in page-then-fragment order and
    /// build the name index.
    ///
    /// Deterministic: the same drafts and `first_id` always yield the same
    /// ids. Fails with [`Error::EmptyBuild`] when nothing was collected.
    pub fn finalize(self, first_id: EntryId) -> Result<Corpus> {
        if self.is_empty() {
            return Err(Error::EmptyBuild {
                version: self.version,
            });
        }

        let drafts: Vec<EntryDraft> = self
            .pages
            .into_values()
            .flat_map(BTreeMap::into_values)
            .collect();

        let ids: HashMap<EntryKey, EntryId> = drafts
            .iter()
            .zip(first_id..)
            .map(|(d, id)| (d.key.clone(), id))
            .collect();

        let entries: Vec<Entry> = drafts
            .into_iter()
            .zip(first_id..)
            .map(|(draft, id)| Entry {
                id,
                v: self.version,
                parents: draft
                    .parents
                    .iter()
                    .filter_map(|key| ids.get(key).copied())
                    .filter(|&parent| parent != id)
                    .collect(),
                page: draft.key.page,
                fragment: draft.key.fragment,
                primary_names: draft.primary_names,
                secondary_names: draft.secondary_names,
                content: draft.content,
                syntax: draft.syntax,
                version: draft.since,
            })
            .collect();

        let mut names = NameIndex::new();
        for entry in &entries {
            for name in &entry.primary_names {
                names.insert(name, entry.id);
            }
        }
        for entry in &entries {
            for name in &entry.secondary_names {
                names.insert(name, entry.id);
            }
        }

        Ok(Corpus {
            version: self.version,
            entries,
            names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(page: &str, fragment: Option<&str>, names: &[&str]) -> EntryDraft {
        let key = match fragment {
            Some(f) => EntryKey::fragment(page, f),
            None => EntryKey::page(page),
        };
        EntryDraft::new(key, names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn collisions_merge_into_one_entry() {
        let mut agg = Aggregator::new(2);
        let mut a = draft("Send.htm", Some("Raw"), &["Send", "Send Raw"]);
        a.syntax = Some("Send Keys".into());
        let mut b = draft("Send.htm", Some("Raw"), &["SendRaw"]);
        b.content = Some("Sends raw keys.".into());
        agg.add(a);
        agg.add(b);

        let corpus = agg.finalize(1).unwrap();
        assert_eq!(corpus.entries.len(), 1);
        let entry = &corpus.entries[0];
        assert_eq!(entry.primary_names, vec!["Send", "Send Raw"]);
        assert_eq!(entry.secondary_names, vec!["SendRaw"]);
        assert_eq!(entry.content.as_deref(), Some("Sends raw keys."));
        assert_eq!(entry.syntax.as_deref(), Some("Send Keys"));
    }

    #[test]
    fn same_name_on_different_pages_is_not_merged() {
        let mut agg = Aggregator::new(1);
        agg.add(draft("a.htm", None, &["Foo"]));
        agg.add(draft("b.htm", None, &["Foo"]));
        let corpus = agg.finalize(1).unwrap();
        assert_eq!(corpus.entries.len(), 2);
        assert_eq!(corpus.names.get("Foo"), Some(1));
    }

    #[test]
    fn ids_follow_page_then_fragment_order() {
        let mut agg = Aggregator::new(1);
        agg.add(draft("b.htm", Some("z"), &["Bz"]));
        agg.add(draft("b.htm", None, &["B"]));
        agg.add(draft("a.htm", Some("y"), &["Ay"]));
        agg.add(draft("a.htm", None, &["A"]));

        let corpus = agg.finalize(100).unwrap();
        let order: Vec<_> = corpus
            .entries
            .iter()
            .map(|e| (e.id, e.name().to_string()))
            .collect();
        assert_eq!(order, vec![
            (100, "A".to_string()),
            (101, "Ay".to_string()),
            (102, "B".to_string()),
            (103, "Bz".to_string()),
        ]);
        assert_eq!(corpus.first_id(), Some(100));
        assert_eq!(corpus.last_id(), Some(103));
        assert_eq!(corpus.entry(102).unwrap().name(), "B");
        assert!(corpus.entry(99).is_none());
    }

    #[test]
    fn ids_are_deterministic() {
        let build = || {
            let mut agg = Aggregator::new(1);
            agg.add(draft("b.htm", None, &["B"]));
            agg.add(draft("a.htm", Some("x"), &["X"]));
            agg.add(draft("a.htm", None, &["A"]));
            agg.finalize(7).unwrap()
        };
        let first: Vec<_> = build().entries.iter().map(|e| e.id).collect();
        let second: Vec<_> = build().entries.iter().map(|e| e.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn primary_names_win_over_secondary() {
        let mut agg = Aggregator::new(1);
        // a.htm sorts first, and its entry absorbs "X" as a secondary name.
        agg.add(draft("a.htm", None, &["A"]));
        agg.add(draft("a.htm", None, &["X"]));
        agg.add(draft("b.htm", None, &["X"]));

        let corpus = agg.finalize(1).unwrap();
        assert_eq!(corpus.entries[0].secondary_names, vec!["X"]);
        assert_eq!(corpus.names.get("X"), Some(2));
        assert_eq!(corpus.names.get("A"), Some(1));
    }

    #[test]
    fn parents_become_ids() {
        let mut agg = Aggregator::new(1);
        agg.add(draft("g.htm", None, &["Gui"]));
        let mut add = draft("g.htm", Some("Add"), &["Gui.Add()"]);
        add.parents =
            vec![EntryKey::page("g.htm"), EntryKey::page("missing.htm")];
        agg.add(add);

        let corpus = agg.finalize(1).unwrap();
        assert_eq!(corpus.entries[1].parents, vec![1]);
    }

    #[test]
    fn empty_build_is_an_error() {
        let err = Aggregator::new(3).finalize(1).unwrap_err();
        assert!(matches!(err, Error::EmptyBuild { version: 3 }));
    }

    #[test]
    fn name_index_first_write_wins() {
        let mut index = NameIndex::new();
        assert!(index.insert("MsgBox", 1));
        assert!(!index.insert("MsgBox", 2));
        assert_eq!(index.get("MsgBox"), Some(1));
        assert_eq!(index.names(), ["MsgBox".to_string()]);

        let pairs = vec![("a".to_string(), 1), ("a".to_string(), 2)];
        let collected: NameIndex = pairs.into_iter().collect();
        assert_eq!(collected.get("a"), Some(1));
        assert_eq!(collected.len(), 1);
    }
}
