//! Retrieval: rerank stage-1 candidates and resolve the winner to an entry.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    catalog::Catalog,
    entry::{DocVersion, Entry, EntryId},
    error::{Error, Result},
    store::Store,
    text_util::token_sort_ratio,
    trigram_index::STAGE1_LIMIT,
};

/// Names returned by [`search`] when the caller does not say.
pub const DEFAULT_K: usize = 5;

/// Parent levels expanded by [`resolve`] when the caller does not say.
pub const DEFAULT_DEPTH: usize = 1;

const FIRST_CHAR_BONUS: f64 = 5.0;
const EXACT_BONUS: f64 = 40.0;
const PREFIX_BONUS: f64 = 20.0;
const SUBSTRING_BONUS: f64 = 10.0;

/// Where [`resolve`] loads entries from.
pub trait EntrySource {
    fn entry(&self, v: DocVersion, id: EntryId) -> Result<Option<Entry>>;
}

impl EntrySource for Store {
    fn entry(&self, v: DocVersion, id: EntryId) -> Result<Option<Entry>> {
        self.get_entry(v, id)
    }
}

/// A reranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub name: String,
    pub score: f64,
}

/// An entry as served to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryView {
    pub id: EntryId,
    pub v: DocVersion,
    pub name: String,
    pub page: String,
    pub fragment: Option<String>,
    pub content: Option<String>,
    pub syntax: Option<String>,
    pub version: Option<String>,
    pub parents: Vec<ParentRef>,
}

/// A parent that could be loaded, or just its id when it could not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    Entry(Box<EntryView>),
    Id(EntryId),
}

impl EntryView {
    fn new(entry: Entry, parents: Vec<ParentRef>) -> Self {
        Self {
            id: entry.id,
            v: entry.v,
            name: entry.name().to_string(),
            page: entry.page,
            fragment: entry.fragment,
            content: entry.content,
            syntax: entry.syntax,
            version: entry.version,
            parents,
        }
    }
}

/// Human-readable rendering: name and location, the enclosing sections,
/// then syntax and description.
impl std::fmt::Display for EntryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}", self.name, self.page)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        f.write_str(")")?;
        if let Some(version) = &self.version {
            write!(f, " [{version}]")?;
        }

        let trail: Vec<String> = self
            .parents
            .iter()
            .map(|parent| match parent {
                ParentRef::Entry(p) => p.name.clone(),
                ParentRef::Id(id) => format!("#{id}"),
            })
            .collect();
        if !trail.is_empty() {
            write!(f, "\nIn: {}", trail.join(" > "))?;
        }
        if let Some(syntax) = &self.syntax {
            write!(f, "\n\n{syntax}")?;
        }
        if let Some(content) = &self.content {
            write!(f, "\n\n{content}")?;
        }
        Ok(())
    }
}

fn bonus(query: &str, candidate: &str) -> f64 {
    let mut bonus = 0.0;
    if let (Some(q), Some(c)) = (query.chars().next(), candidate.chars().next())
        && q == c
    {
        bonus += FIRST_CHAR_BONUS;
    }
    if candidate == query {
        bonus += EXACT_BONUS;
    }
    if candidate.starts_with(query) {
        bonus += PREFIX_BONUS;
    }
    if candidate.contains(query) {
        bonus += SUBSTRING_BONUS;
    }
    bonus
}

/// Stage 2: score each candidate by token-sort similarity plus
/// case-insensitive match bonuses, best first.
///
/// The sort is stable, so equal scores keep their stage-1 order.
pub fn rerank(query: &str, candidates: Vec<String>) -> Vec<Ranked> {
    let query_lower = query.to_lowercase();
    let mut ranked: Vec<Ranked> = candidates
        .into_iter()
        .map(|name| {
            let score = token_sort_ratio(query, &name)
                + bonus(&query_lower, &name.to_lowercase());
            Ranked { name, score }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

fn ranked(
    catalog: &Catalog,
    query: &str,
    v: DocVersion,
) -> Result<Vec<Ranked>> {
    if !catalog.contains(v) {
        return Err(Error::NotFound {
            kind: "version",
            name: v.to_string(),
        });
    }
    let candidates = catalog.candidates(query, v, STAGE1_LIMIT)?;
    Ok(rerank(query, candidates))
}

/// Up to `k` names of version `v` ranked for `query`.
///
/// Fails with [`Error::NotFound`] when `v` has never been built.
pub fn search(
    catalog: &Catalog,
    query: &str,
    v: DocVersion,
    k: usize,
) -> Result<Vec<Ranked>> {
    let mut ranked = ranked(catalog, query, v)?;
    ranked.truncate(k);
    debug!(query, v, hits = ranked.len(), "search");
    Ok(ranked)
}

/// The best entry for `query`, with parents expanded `depth` levels.
///
/// Returns `Ok(None)` when the version has no names or the winning name's
/// entry is gone. A parent that fails to load is reported by id only.
pub fn resolve(
    catalog: &Catalog,
    source: &impl EntrySource,
    query: &str,
    v: DocVersion,
    depth: usize,
) -> Result<Option<EntryView>> {
    let Some(top) = ranked(catalog, query, v)?.into_iter().next() else {
        return Ok(None);
    };
    let Some(id) = catalog.names(v).and_then(|names| names.get(&top.name))
    else {
        return Ok(None);
    };
    let Some(entry) = source.entry(v, id)? else {
        warn!(v, id, name = %top.name, "indexed name has no entry");
        return Ok(None);
    };
    Ok(Some(expand(source, entry, depth)))
}

fn expand(source: &impl EntrySource, entry: Entry, depth: usize) -> EntryView {
    let parents = if depth == 0 {
        Vec::new()
    } else {
        entry
            .parents
            .iter()
            .map(|&parent| match source.entry(entry.v, parent) {
                Ok(Some(loaded)) => {
                    let view = expand(source, loaded, depth - 1);
                    ParentRef::Entry(Box::new(view))
                }
                Ok(None) => {
                    warn!(v = entry.v, parent, "parent entry missing");
                    ParentRef::Id(parent)
                }
                Err(e) => {
                    warn!(v = entry.v, parent, "parent entry unavailable: {e}");
                    ParentRef::Id(parent)
                }
            })
            .collect()
    };
    EntryView::new(entry, parents)
}
