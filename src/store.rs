//! Durable, versioned storage for built corpora.
//!
//! Each documentation version owns two tables, `docs_entry_v{v}` (id →
//! entry) and `docs_name_v{v}` (name → id). A rebuild drops and rewrites
//! both inside one write transaction, so readers see either the old version
//! or the new one, never a mix.

use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    TableDefinition,
    TableError,
};
use serde::{Deserialize, Serialize};

use crate::{
    aggregator::Corpus,
    entry::{DocVersion, Entry, EntryId},
    error::{Error, Result},
};

const SOURCES: TableDefinition<u32, &str> = TableDefinition::new("sources");
const VERSIONS: TableDefinition<u32, &[u8]> = TableDefinition::new("versions");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Settings key bumped on every committed build.
pub const GENERATION_KEY: &str = "generation";

fn entry_table_name(v: DocVersion) -> String {
    format!("docs_entry_v{v}")
}

fn name_table_name(v: DocVersion) -> String {
    format!("docs_name_v{v}")
}

fn entry_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

fn name_table(name: &str) -> TableDefinition<'_, &'static str, u64> {
    TableDefinition::new(name)
}

/// Bookkeeping for one stored version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: DocVersion,
    pub entries: usize,
    pub names: usize,
    pub first_id: EntryId,
    pub last_id: EntryId,
    /// Build generation that wrote this version.
    pub generation: u64,
}

pub struct Store {
    db: Database,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure the fixed tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SOURCES)?;
        txn.open_table(VERSIONS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Sources --

    pub fn set_source(&self, v: DocVersion, root: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SOURCES)?;
            table.insert(v, root)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_source(&self, v: DocVersion) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SOURCES)?;
        Ok(table.get(v)?.map(|r| r.value().to_string()))
    }

    pub fn remove_source(&self, v: DocVersion) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SOURCES)?;
            table.remove(v)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_sources(&self) -> Result<Vec<(DocVersion, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SOURCES)?;
        let mut result = Vec::new();
        for row in table.iter()? {
            let (k, v) = row?;
            result.push((k.value(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Versions --

    /// Replace everything stored for `corpus.version` in one transaction.
    pub fn replace_version(&self, corpus: &Corpus) -> Result<VersionMeta> {
        let mut metas = self.replace_versions(std::slice::from_ref(corpus))?;
        metas.pop().ok_or_else(|| Error::EmptyBuild {
            version: corpus.version,
        })
    }

    /// Replace several versions at once; all of them commit or none do.
    pub fn replace_versions(
        &self,
        corpora: &[Corpus],
    ) -> Result<Vec<VersionMeta>> {
        let mut encoded = Vec::with_capacity(corpora.len());
        for corpus in corpora {
            let mut rows = Vec::with_capacity(corpus.entries.len());
            for entry in &corpus.entries {
                rows.push((entry.id, serde_json::to_vec(entry)?));
            }
            encoded.push(rows);
        }

        let txn = self.db.begin_write()?;
        let metas = {
            let mut settings = txn.open_table(SETTINGS)?;
            let generation = settings
                .get(GENERATION_KEY)?
                .and_then(|g| g.value().parse::<u64>().ok())
                .unwrap_or(0)
                + 1;
            settings.insert(GENERATION_KEY, generation.to_string().as_str())?;

            let mut versions = txn.open_table(VERSIONS)?;
            let mut metas = Vec::with_capacity(corpora.len());
            for (corpus, rows) in corpora.iter().zip(&encoded) {
                let v = corpus.version;
                let entries_name = entry_table_name(v);
                let names_name = name_table_name(v);
                let entries_def = entry_table(&entries_name);
                let names_def = name_table(&names_name);

                txn.delete_table(entries_def)?;
                txn.delete_table(names_def)?;

                let mut entries = txn.open_table(entries_def)?;
                for (id, bytes) in rows {
                    entries.insert(*id, bytes.as_slice())?;
                }
                let mut names = txn.open_table(names_def)?;
                for (name, id) in corpus.names.iter() {
                    names.insert(name, id)?;
                }

                let meta = VersionMeta {
                    version: v,
                    entries: corpus.entries.len(),
                    names: corpus.names.len(),
                    first_id: corpus.first_id().unwrap_or(0),
                    last_id: corpus.last_id().unwrap_or(0),
                    generation,
                };
                versions.insert(v, serde_json::to_vec(&meta)?.as_slice())?;
                metas.push(meta);
            }
            metas
        };
        txn.commit()?;
        Ok(metas)
    }

    pub fn remove_version(&self, v: DocVersion) -> Result<bool> {
        let entries_name = entry_table_name(v);
        let names_name = name_table_name(v);

        let txn = self.db.begin_write()?;
        let removed = {
            txn.delete_table(entry_table(&entries_name))?;
            txn.delete_table(name_table(&names_name))?;
            let mut versions = txn.open_table(VERSIONS)?;
            versions.remove(v)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn version_meta(&self, v: DocVersion) -> Result<Option<VersionMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VERSIONS)?;
        match table.get(v)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_versions(&self) -> Result<Vec<VersionMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VERSIONS)?;
        let mut result = Vec::new();
        for row in table.iter()? {
            let (_, bytes) = row?;
            result.push(serde_json::from_slice(bytes.value())?);
        }
        Ok(result)
    }

    /// First id for a fresh build of `v`: one past the highest id any other
    /// stored version uses.
    pub fn next_first_id(&self, v: DocVersion) -> Result<EntryId> {
        Ok(self
            .list_versions()?
            .iter()
            .filter(|meta| meta.version != v)
            .map(|meta| meta.last_id)
            .max()
            .unwrap_or(0)
            + 1)
    }

    // -- Entries and names --

    pub fn get_entry(
        &self,
        v: DocVersion,
        id: EntryId,
    ) -> Result<Option<Entry>> {
        let name = entry_table_name(v);
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(entry_table(&name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    pub fn lookup_name(
        &self,
        v: DocVersion,
        name: &str,
    ) -> Result<Option<EntryId>> {
        let table_name = name_table_name(v);
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(name_table(&table_name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(name)?.map(|id| id.value()))
    }

    /// Every indexed name of a version with its entry id, ordered by name.
    pub fn list_names(&self, v: DocVersion) -> Result<Vec<(String, EntryId)>> {
        let table_name = name_table_name(v);
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(name_table(&table_name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut result = Vec::new();
        for row in table.iter()? {
            let (name, id) = row?;
            result.push((name.value().to_string(), id.value()));
        }
        Ok(result)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }
}

#[cfg(test)]
impl Store {
    /// Overwrite a stored entry with bytes that do not decode.
    pub(crate) fn corrupt_entry(
        &self,
        v: DocVersion,
        id: EntryId,
    ) -> Result<()> {
        let name = entry_table_name(v);
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(entry_table(&name))?;
            table.insert(id, b"not an entry".as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregator::Aggregator,
        entry::{EntryDraft, EntryKey},
    };

    fn test_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("store.redb")).unwrap();
        (tmp, store)
    }

    fn corpus(v: DocVersion, first_id: EntryId, names: &[&str]) -> Corpus {
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
    fn sources_crud() {
        let (_tmp, store) = test_store();

        assert!(store.list_sources().unwrap().is_empty());
        store.set_source(2, "/docs/v2").unwrap();
        assert_eq!(store.get_source(2).unwrap().as_deref(), Some("/docs/v2"));
        assert_eq!(store.list_sources().unwrap(), vec![(
            2,
            "/docs/v2".to_string()
        )]);
        assert!(store.remove_source(2).unwrap());
        assert!(!store.remove_source(2).unwrap());
    }

    #[test]
    fn replace_and_read_back() {
        let (_tmp, store) = test_store();
        let corpus = corpus(1, 1, &["MsgBox", "Send"]);
        let meta = store.replace_version(&corpus).unwrap();

        assert_eq!(meta.entries, 2);
        assert_eq!((meta.first_id, meta.last_id), (1, 2));
        assert_eq!(meta.generation, 1);

        let entry = store.get_entry(1, 2).unwrap().unwrap();
        assert_eq!(entry.name(), "Send");
        assert_eq!(store.lookup_name(1, "MsgBox").unwrap(), Some(1));
        assert_eq!(store.lookup_name(1, "Nope").unwrap(), None);
        assert_eq!(store.list_names(1).unwrap(), vec![
            ("MsgBox".to_string(), 1),
            ("Send".to_string(), 2),
        ]);
    }

    #[test]
    fn replace_truncates_previous_contents() {
        let (_tmp, store) = test_store();
        store.replace_version(&corpus(1, 1, &["Old", "Older"])).unwrap();
        let meta = store.replace_version(&corpus(1, 1, &["New"])).unwrap();

        assert_eq!(meta.generation, 2);
        assert_eq!(store.list_names(1).unwrap(), vec![("New".to_string(), 1)]);
        assert!(store.get_entry(1, 2).unwrap().is_none());
    }

    #[test]
    fn versions_are_independent() {
        let (_tmp, store) = test_store();
        store.replace_version(&corpus(1, 1, &["A", "B"])).unwrap();
        store.replace_version(&corpus(2, 3, &["A"])).unwrap();

        assert_eq!(store.lookup_name(1, "A").unwrap(), Some(1));
        assert_eq!(store.lookup_name(2, "A").unwrap(), Some(3));
        assert_eq!(store.next_first_id(2).unwrap(), 3);
        assert_eq!(store.next_first_id(1).unwrap(), 4);
        assert_eq!(store.next_first_id(3).unwrap(), 4);

        assert!(store.remove_version(1).unwrap());
        assert!(store.list_names(1).unwrap().is_empty());
        assert_eq!(store.lookup_name(2, "A").unwrap(), Some(3));
        assert_eq!(store.list_versions().unwrap().len(), 1);
    }

    #[test]
    fn replace_versions_shares_one_generation() {
        let (_tmp, store) = test_store();
        let metas = store
            .replace_versions(&[corpus(1, 1, &["A"]), corpus(2, 2, &["B"])])
            .unwrap();
        assert_eq!(metas.len(), 2);
        assert!(metas.iter().all(|m| m.generation == 1));
        let generation = store.get_setting(GENERATION_KEY).unwrap();
        assert_eq!(generation.as_deref(), Some("1"));
        assert_eq!(store.lookup_name(2, "B").unwrap(), Some(2));
    }

    #[test]
    fn undecodable_entry_is_an_error() {
        let (_tmp, store) = test_store();
        store.replace_version(&corpus(1, 1, &["A", "B"])).unwrap();
        store.corrupt_entry(1, 2).unwrap();

        assert!(store.get_entry(1, 1).unwrap().is_some());
        assert!(matches!(store.get_entry(1, 2), Err(Error::Json(_))));
    }

    #[test]
    fn unknown_version_reads_as_empty() {
        let (_tmp, store) = test_store();
        assert!(store.get_entry(9, 1).unwrap().is_none());
        assert!(store.lookup_name(9, "x").unwrap().is_none());
        assert!(store.list_names(9).unwrap().is_empty());
        assert!(store.version_meta(9).unwrap().is_none());
        assert_eq!(store.next_first_id(9).unwrap(), 1);
    }

    #[test]
    fn settings_crud() {
        let (_tmp, store) = test_store();
        assert_eq!(store.get_setting_or(GENERATION_KEY, "0").unwrap(), "0");
        store.set_setting("last_build", "v2").unwrap();
        assert_eq!(
            store.get_setting("last_build").unwrap().as_deref(),
            Some("v2")
        );
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.redb");
        {
            let store = Store::open(&path).unwrap();
            store.replace_version(&corpus(2, 10, &["Gui"])).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.lookup_name(2, "Gui").unwrap(), Some(10));
        assert_eq!(store.version_meta(2).unwrap().unwrap().first_id, 10);
    }
}
