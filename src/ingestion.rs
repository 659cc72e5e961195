//! The build pipeline: corpus directory → drafts → corpus → store.
//!
//! Pages are parsed in parallel; everything after that is sequential. A
//! version is only written once it has been fully aggregated and finalized,
//! and a multi-version build commits all versions in one transaction.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use percent_encoding::percent_decode_str;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    aggregator::{Aggregator, Corpus},
    entry::{DocVersion, EntryDraft, EntryId, EntryKey},
    error::{Error, Result},
    page_parser::parse_page,
    profile::Profiles,
    store::{Store, VersionMeta},
    walker::{DiscoveredPage, discover_pages},
};

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Parse one page with its sweep profile followed by any override profiles.
///
/// Unreadable or unparseable pages are logged and yield no drafts.
fn parse_discovered(
    page: &DiscoveredPage,
    profiles: &Profiles,
) -> Vec<EntryDraft> {
    let bytes = match std::fs::read(&page.absolute_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(page = %page.page, "skipping unreadable page: {e}");
            return Vec::new();
        }
    };
    let source = String::from_utf8_lossy(&bytes);

    let sweep = profiles.sweep_profile(&page.page);
    let mut drafts = match parse_page(&source, &page.page, sweep) {
        Ok(drafts) => drafts,
        Err(e) => {
            warn!("skipping page: {e}");
            return Vec::new();
        }
    };

    for profile in profiles.override_profiles(&page.page) {
        match parse_page(&source, &page.page, profile) {
            Ok(extra) => drafts.extend(extra),
            Err(e) => {
                warn!(profile = %profile.name, "override pass failed: {e}")
            }
        }
    }
    drafts
}

/// Split an index target like `lib/Send.htm#SendRaw` into an entry key.
fn index_target(target: &str) -> Option<EntryKey> {
    let decoded = percent_decode_str(target).decode_utf8_lossy();
    let decoded = decoded
        .trim()
        .trim_start_matches("./")
        .trim_start_matches('/');
    let (page, fragment) = match decoded.split_once('#') {
        Some((page, fragment)) => (page, Some(fragment)),
        None => (decoded, None),
    };
    if page.is_empty() {
        return None;
    }
    Some(match fragment.filter(|f| !f.is_empty()) {
        Some(fragment) => EntryKey::fragment(page, fragment),
        None => EntryKey::page(page),
    })
}

/// Merge the records of a supplementary `[name, "page#fragment", ...]`
/// index into `agg`. Returns how many records were applied.
///
/// The index is best-effort: a missing, unreadable or malformed file only
/// logs.
pub fn apply_index_file(path: &Path, agg: &mut Aggregator) -> usize {
    if !path.is_file() {
        return 0;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(Error::from)
        .and_then(|text| serde_json::from_str(&text).map_err(Error::from));
    let records: Vec<Vec<serde_json::Value>> = match parsed {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), "ignoring index file: {e}");
            return 0;
        }
    };

    let mut applied = 0;
    for record in &records {
        let (Some(name), Some(key)) = (
            record.first().and_then(|v| v.as_str()),
            record.get(1).and_then(|v| v.as_str()).and_then(index_target),
        ) else {
            debug!(?record, "skipping malformed index record");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if !agg.contains_page(&key.page) {
            debug!(name, target = %key, "index record for unparsed page");
            continue;
        }
        agg.add(EntryDraft::new(key, vec![name.to_string()]));
        applied += 1;
    }
    applied
}

/// Parse every page under `root` into an aggregator for version `v`.
pub fn collect_version(
    root: &Path,
    v: DocVersion,
    profiles: &Profiles,
    cancel: &AtomicBool,
) -> Result<Aggregator> {
    let pages = discover_pages(root)?;
    debug!(v, root = %root.display(), pages = pages.len(), "discovered pages");

    let parsed: Vec<Vec<EntryDraft>> = pages
        .par_iter()
        .map(|page| {
            check_cancel(cancel)?;
            Ok(parse_discovered(page, profiles))
        })
        .collect::<Result<_>>()?;
    check_cancel(cancel)?;

    let mut agg = Aggregator::new(v);
    for drafts in parsed {
        agg.extend(drafts);
    }

    if let Some(index_file) = profiles.index_file() {
        let applied = apply_index_file(&root.join(index_file), &mut agg);
        debug!(v, applied, "applied index file");
    }
    Ok(agg)
}

/// Parse and finalize one version with ids starting at `first_id`.
pub fn build_corpus(
    root: &Path,
    v: DocVersion,
    first_id: EntryId,
    profiles: &Profiles,
    cancel: &AtomicBool,
) -> Result<Corpus> {
    let corpus =
        collect_version(root, v, profiles, cancel)?.finalize(first_id)?;
    info!(
        v,
        entries = corpus.entries.len(),
        names = corpus.names.len(),
        first_id,
        "aggregated version"
    );
    Ok(corpus)
}

fn source_root(store: &Store, v: DocVersion) -> Result<String> {
    store.get_source(v)?.ok_or_else(|| Error::NotFound {
        kind: "source",
        name: v.to_string(),
    })
}

/// Build one registered version, or every registered version when `version`
/// is `None`, and commit the result.
///
/// A full build walks versions in ascending order and chains ids so each
/// version starts one past the previous version's last id. A single-version
/// build starts one past the highest id any other stored version uses.
///
/// Nothing is written unless every requested version builds.
pub fn build(
    store: &Store,
    profiles: &Profiles,
    version: Option<DocVersion>,
    cancel: &AtomicBool,
) -> Result<Vec<VersionMeta>> {
    let corpora = match version {
        Some(v) => {
            let root = source_root(store, v)?;
            let first_id = store.next_first_id(v)?;
            let root = Path::new(&root);
            vec![build_corpus(root, v, first_id, profiles, cancel)?]
        }
        None => {
            let sources = store.list_sources()?;
            if sources.is_empty() {
                return Err(Error::Config(
                    "no sources registered; add one with `docdex source add`"
                        .to_string(),
                ));
            }
            let mut corpora = Vec::with_capacity(sources.len());
            let mut next_id: EntryId = 1;
            for (v, root) in sources {
                let root = Path::new(&root);
                let corpus = build_corpus(root, v, next_id, profiles, cancel)?;
                next_id = corpus.last_id().map_or(next_id, |last| last + 1);
                corpora.push(corpus);
            }
            corpora
        }
    };

    check_cancel(cancel)?;
    let metas = store.replace_versions(&corpora)?;
    for meta in &metas {
        info!(
            v = meta.version,
            entries = meta.entries,
            generation = meta.generation,
            "committed version"
        );
    }
    Ok(metas)
}
