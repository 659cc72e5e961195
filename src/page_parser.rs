use tracing::{debug, warn};

use crate::{
    entry::{EntryDraft, EntryKey},
    html::{Document, Heading},
    names::{NameContext, NameError, derive_names},
    profile::{HeadingContext, PageProfile},
};

/// Number of heading levels (`h1`..`h6`).
const MAX_DEPTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("page {page} has no top-level heading or title")]
    MissingTitle { page: String },

    #[error("page {page} has an unusable title: {source}")]
    Title {
        page: String,
        #[source]
        source: NameError,
    },
}

/// Parse one page into entry drafts.
///
/// The first draft is always the whole-page entry, named from the first
/// `h1` (or `<title>`). Every other heading the profile does not skip
/// becomes a draft whose parents are the entries open at shallower depths,
/// nearest first.
///
/// Headings whose names cannot be derived are logged and skipped; only a
/// page without a usable title fails as a whole.
pub fn parse_page(
    source: &str,
    page: &str,
    profile: &PageProfile,
) -> Result<Vec<EntryDraft>, ParseError> {
    let doc = Document::parse(source);
    let headings: Vec<Heading<'_>> = doc.headings().collect();
    let top = headings.iter().position(|h| h.level == 1);

    let title = top
        .map(|i| headings[i].text())
        .filter(|t| !t.is_empty())
        .or_else(|| doc.title())
        .ok_or_else(|| ParseError::MissingTitle {
            page: page.to_string(),
        })?;

    // Draft index of the entry open at each depth.
    let mut parents: [Option<usize>; MAX_DEPTH] = [None; MAX_DEPTH];
    // Anchor of the latest heading at each depth, skipped ones included.
    let mut ancestor_ids: Vec<Option<String>> = vec![None; MAX_DEPTH];
    let mut drafts: Vec<EntryDraft> = Vec::new();

    let top_heading = top.map(|i| headings[i]);
    let top_id = top_heading.and_then(|h| h.anchor());
    let page_ctx = NameContext {
        heading: HeadingContext {
            depth: 0,
            tag: "h1",
            id: top_id.as_deref(),
            ancestor_ids: &[],
        },
        ancestor_names: &[],
    };
    let names = derive_names(&title, &page_ctx, profile).map_err(|source| {
        ParseError::Title {
            page: page.to_string(),
            source,
        }
    })?;

    let mut page_entry = EntryDraft::new(EntryKey::page(page), names);
    if let Some(heading) = top_heading {
        let section = heading.section();
        page_entry.content = section.content;
        page_entry.syntax = section.syntax;
        page_entry.since = heading.since();
    }
    drafts.push(page_entry);
    parents[0] = Some(0);
    ancestor_ids[0] = top_id;

    for (i, heading) in headings.iter().enumerate() {
        if Some(i) == top {
            continue;
        }

        let depth = heading.level - 1;
        for d in depth..MAX_DEPTH {
            parents[d] = None;
            ancestor_ids[d] = None;
        }

        let id = heading.anchor();
        let draft = draft_for_heading(
            heading,
            id.as_deref(),
            page,
            depth,
            &parents,
            &ancestor_ids[..depth],
            &drafts,
            profile,
        );
        ancestor_ids[depth] = id;

        if let Some(draft) = draft {
            parents[depth] = Some(drafts.len());
            drafts.push(draft);
        }
    }

    debug!(
        page,
        entries = drafts.len(),
        profile = %profile.name,
        "parsed page"
    );
    Ok(drafts)
}

#[allow(clippy::too_many_arguments)]
fn draft_for_heading(
    heading: &Heading<'_>,
    id: Option<&str>,
    page: &str,
    depth: usize,
    parents: &[Option<usize>; MAX_DEPTH],
    ancestor_ids: &[Option<String>],
    drafts: &[EntryDraft],
    profile: &PageProfile,
) -> Option<EntryDraft> {
    let ctx = HeadingContext {
        depth,
        tag: heading.tag(),
        id,
        ancestor_ids,
    };
    if profile.skip.matches(&ctx) {
        return None;
    }

    let ancestor_names: Vec<Option<String>> = parents[..depth]
        .iter()
        .map(|p| p.and_then(|idx| drafts[idx].primary_names.first().cloned()))
        .collect();

    let text = heading.text();
    let names = match derive_names(
        &text,
        &NameContext {
            heading: ctx,
            ancestor_names: &ancestor_names,
        },
        profile,
    ) {
        Ok(names) => names,
        Err(e) => {
            warn!(page, heading = %text, "skipping heading: {e}");
            return None;
        }
    };

    let key = match id {
        Some(fragment) => EntryKey::fragment(page, fragment),
        None => EntryKey::page(page),
    };
    // Anchorless headings share the page key, so one key can fill
    // several slots.
    let mut parent_keys: Vec<EntryKey> = Vec::new();
    for &idx in parents[..depth].iter().rev().flatten() {
        let parent = &drafts[idx].key;
        if *parent != key && !parent_keys.contains(parent) {
            parent_keys.push(parent.clone());
        }
    }

    let section = heading.section();
    Some(EntryDraft {
        key,
        primary_names: names,
        secondary_names: Vec::new(),
        content: section.content,
        syntax: section.syntax,
        since: heading.since(),
        parents: parent_keys,
    })
}
