//! The query-time view of every built version.
//!
//! A [`Catalog`] is immutable: per-version name indexes plus the trigram
//! index over all of them. Rebuilds produce a whole new catalog and publish
//! it through [`SharedCatalog`], so queries in flight keep the snapshot they
//! started with.

use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{
    aggregator::{Corpus, NameIndex},
    entry::DocVersion,
    error::Result,
    store::{GENERATION_KEY, Store},
    trigram_index::TrigramIndex,
};

#[derive(Debug)]
pub struct Catalog {
    versions: BTreeMap<DocVersion, NameIndex>,
    trigrams: TrigramIndex,
    generation: u64,
}

impl Catalog {
    pub fn new(
        versions: BTreeMap<DocVersion, NameIndex>,
        generation: u64,
    ) -> Result<Self> {
        let trigrams = TrigramIndex::build(
            versions.iter().map(|(&v, index)| (v, index.names())),
        )?;
        Ok(Self {
            versions,
            trigrams,
            generation,
        })
    }

    pub fn empty() -> Result<Self> {
        Self::new(BTreeMap::new(), 0)
    }

    /// Read every stored version's names.
    pub fn load(store: &Store) -> Result<Self> {
        let mut versions = BTreeMap::new();
        for meta in store.list_versions()? {
            let names: NameIndex =
                store.list_names(meta.version)?.into_iter().collect();
            versions.insert(meta.version, names);
        }
        let generation = store
            .get_setting_or(GENERATION_KEY, "0")?
            .parse()
            .unwrap_or(0);

        let catalog = Self::new(versions, generation)?;
        debug!(
            versions = catalog.versions.len(),
            names = catalog.trigrams.len(),
            generation,
            "loaded catalog"
        );
        Ok(catalog)
    }

    /// Build straight from freshly aggregated corpora.
    pub fn from_corpora<'a>(
        corpora: impl IntoIterator<Item = &'a Corpus>,
    ) -> Result<Self> {
        let versions = corpora
            .into_iter()
            .map(|corpus| (corpus.version, corpus.names.clone()))
            .collect();
        Self::new(versions, 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn versions(&self) -> impl Iterator<Item = DocVersion> + '_ {
        self.versions.keys().copied()
    }

    pub fn contains(&self, v: DocVersion) -> bool {
        self.versions.contains_key(&v)
    }

    pub fn names(&self, v: DocVersion) -> Option<&NameIndex> {
        self.versions.get(&v)
    }

    /// Stage 1: up to `limit` plausible names of version `v` for `query`.
    ///
    /// Trigram hits come first; when there are none the whole name list is
    /// ranked by Jaro-Winkler similarity instead. A non-empty version always
    /// yields at least one candidate.
    pub fn candidates(
        &self,
        query: &str,
        v: DocVersion,
        limit: usize,
    ) -> Result<Vec<String>> {
        let Some(index) = self.versions.get(&v) else {
            return Ok(Vec::new());
        };
        let hits = self.trigrams.candidates(query, v, limit)?;
        if !hits.is_empty() {
            return Ok(hits);
        }
        Ok(closest_names(query, index.names(), limit))
    }
}

fn closest_names(query: &str, names: &[String], limit: usize) -> Vec<String> {
    let query = query.to_lowercase();
    let mut scored: Vec<(f64, &String)> = names
        .iter()
        .map(|name| (strsim::jaro_winkler(&query, &name.to_lowercase()), name))
        .collect();
    // Stable, so equal scores keep name-list order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.clone())
        .collect()
}

/// The currently served catalog, replaceable while readers hold old ones.
pub struct SharedCatalog {
    current: ArcSwap<Catalog>,
}

impl SharedCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: ArcSwap::from_pointee(catalog),
        }
    }

    pub fn load(&self) -> Arc<Catalog> {
        self.current.load_full()
    }

    /// Re-read the store and publish the result.
    pub fn reload(&self, store: &Store) -> Result<Arc<Catalog>> {
        let catalog = Arc::new(Catalog::load(store)?);
        self.current.store(Arc::clone(&catalog));
        Ok(catalog)
    }
}

impl std::fmt::Debug for SharedCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCatalog")
            .field("generation", &self.current.load().generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregator::Aggregator,
        entry::{EntryDraft, EntryKey},
    };

    fn corpus(v: DocVersion, first_id: u64, names: &[&str]) -> Corpus {
        let mut agg = Aggregator::new(v);
        for (i, name) in names.iter().enumerate() {
            agg.add(EntryDraft::new(
                EntryKey::page(format!("p{i}.htm")),
                vec![name.to_string()],
            ));
        }
        agg.finalize(first_id).unwrap()
    }

    #[test]
    fn candidates_are_scoped_to_a_version() {
        let v1 = corpus(1, 1, &["MsgBox", "Send"]);
        let v2 = corpus(2, 3, &["MsgBoxResult"]);
        let catalog = Catalog::from_corpora([&v1, &v2]).unwrap();

        assert_eq!(catalog.versions().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(catalog.candidates("msgbox", 1, 8).unwrap(), vec!["MsgBox"]);
        assert_eq!(catalog.candidates("msgbox", 2, 8).unwrap(), vec![
            "MsgBoxResult"
        ]);
        assert!(catalog.candidates("msgbox", 3, 8).unwrap().is_empty());
    }

    #[test]
    fn short_queries_fall_back_to_full_scan() {
        let v1 = corpus(1, 1, &["Send", "If", "MsgBox"]);
        let catalog = Catalog::from_corpora([&v1]).unwrap();

        let hits = catalog.candidates("if", 1, 8).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], "If");
        assert_eq!(catalog.candidates("if", 1, 1).unwrap(), vec!["If"]);
    }

    #[test]
    fn non_empty_version_always_has_candidates() {
        let v1 = corpus(1, 1, &["Send"]);
        let catalog = Catalog::from_corpora([&v1]).unwrap();
        assert_eq!(catalog.candidates("zzzz", 1, 8).unwrap(), vec!["Send"]);
    }

    #[test]
    fn load_from_store_and_swap() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("store.redb")).unwrap();
        let shared = SharedCatalog::new(Catalog::empty().unwrap());
        let before = shared.load();
        assert!(!before.contains(1));

        store.replace_version(&corpus(1, 1, &["Gui", "Gui.Add()"])).unwrap();
        let after = shared.reload(&store).unwrap();

        assert!(after.contains(1));
        assert_eq!(after.generation(), 1);
        assert_eq!(after.names(1).unwrap().get("Gui.Add()"), Some(2));
        // Readers holding the old snapshot are unaffected.
        assert!(!before.contains(1));
        assert!(shared.load().contains(1));
    }
}
