//! Name derivation: turn one heading into the set of names it is searchable
//! under.
//!
//! Headings in reference docs are dense: `"Send [Raw]"` documents two
//! spellings, `"Gui.Add() / GuiControl"` two alternatives, and a method
//! heading `"Add"` is only meaningful as `Gui.Add()`. Derivation runs in
//! fixed order:
//!
//! 1. split on alternative separators (`" / "`, `" or "`, line breaks)
//! 2. expand a single optional `[...]` segment into both variants
//! 3. strip a trailing `()` (except for [`KEEP_CALL_SUFFIX`])
//! 4. also yield the prefix before a `(...)` group
//! 5. register the candidates if the profile's basic-name predicate accepts
//! 6. fire the first matching prefix rule on every candidate
//!
//! The result is never empty: when nothing was registered the squashed raw
//! heading is returned.

use crate::{
    profile::{HeadingContext, PageProfile},
    text_util::squash,
};

/// Names that mean nothing without their call syntax.
pub const KEEP_CALL_SUFFIX: &[&str] =
    &["Array()", "Buffer()", "Func()", "Map()", "Object()"];

const ALTERNATIVE_SEPARATORS: &[&str] = &[" / ", " or "];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("unbalanced bracket in heading {0:?}")]
    UnbalancedBracket(String),

    #[error("heading has no text")]
    Empty,
}

/// Everything the deriver knows about a heading's position.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub heading: HeadingContext<'a>,
    /// First primary name of the entry open at each shallower depth.
    pub ancestor_names: &'a [Option<String>],
}

/// Derive the ordered, duplicate-free set of names for a heading.
pub fn derive_names(
    raw: &str,
    ctx: &NameContext<'_>,
    profile: &PageProfile,
) -> Result<Vec<String>, NameError> {
    let fallback = squash(raw);
    if fallback.is_empty() {
        return Err(NameError::Empty);
    }

    let candidates = candidates(raw)?;
    let mut names = Vec::new();

    if profile.basic_names.matches(&ctx.heading) {
        for candidate in &candidates {
            push_unique(&mut names, candidate.clone());
        }
    }

    if let Some(rule) = profile
        .rules
        .iter()
        .find(|rule| rule.when.matches(&ctx.heading))
    {
        for candidate in &candidates {
            if let Some(name) = rule.then.apply(candidate, ctx.ancestor_names)
            {
                push_unique(&mut names, name);
            }
        }
    }

    if names.is_empty() {
        names.push(fallback);
    }
    Ok(names)
}

/// Steps 1–4: the text variants of a heading, before any profile logic.
pub fn candidates(raw: &str) -> Result<Vec<String>, NameError> {
    let mut out = Vec::new();
    for alternative in split_alternatives(raw) {
        for variant in expand_brackets(&alternative)? {
            let stripped = strip_call_suffix(&variant);
            let prefix = paren_prefix(&stripped);
            push_unique(&mut out, stripped);
            if let Some(prefix) = prefix {
                push_unique(&mut out, prefix);
            }
        }
    }
    Ok(out)
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !name.is_empty() && !names.contains(&name) {
        names.push(name);
    }
}

fn split_alternatives(raw: &str) -> Vec<String> {
    let mut parts: Vec<String> = raw.lines().map(str::to_string).collect();
    for sep in ALTERNATIVE_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|p| p.split(sep))
            .map(str::to_string)
            .collect();
    }
    parts
        .iter()
        .map(|p| squash(p))
        .filter(|p| !p.is_empty())
        .collect()
}

fn expand_brackets(candidate: &str) -> Result<Vec<String>, NameError> {
    let opens = candidate.matches('[').count();
    let closes = candidate.matches(']').count();
    if opens != closes {
        return Err(NameError::UnbalancedBracket(candidate.to_string()));
    }
    if opens != 1 {
        return Ok(vec![candidate.to_string()]);
    }

    let (Some(start), Some(end)) = (candidate.find('['), candidate.find(']'))
    else {
        return Ok(vec![candidate.to_string()]);
    };
    if end < start {
        return Err(NameError::UnbalancedBracket(candidate.to_string()));
    }

    let before = &candidate[..start];
    let inner = &candidate[start + 1..end];
    let after = &candidate[end + 1..];

    let mut out = Vec::with_capacity(2);
    push_unique(&mut out, squash(&format!("{before} {after}")));
    push_unique(&mut out, squash(&format!("{before}{inner}{after}")));
    Ok(out)
}

fn strip_call_suffix(candidate: &str) -> String {
    if KEEP_CALL_SUFFIX.contains(&candidate) {
        return candidate.to_string();
    }
    match candidate.strip_suffix("()").map(str::trim_end) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => candidate.to_string(),
    }
}

fn paren_prefix(candidate: &str) -> Option<String> {
    let open = candidate.find('(')?;
    let close = open + candidate[open..].find(')')?;
    if candidate[open + 1..close].trim().is_empty() {
        return None;
    }
    let prefix = candidate[..open].trim();
    (!prefix.is_empty()).then(|| prefix.to_string())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::profile::{Action, Predicate, PrefixRule};

    fn derive(raw: &str, profile: &PageProfile) -> Vec<String> {
        derive_at(raw, 0, &[], &[], profile)
    }

    fn derive_at(
        raw: &str,
        depth: usize,
        ancestor_ids: &[Option<String>],
        ancestor_names: &[Option<String>],
        profile: &PageProfile,
    ) -> Vec<String> {
        let ctx = NameContext {
            heading: HeadingContext {
                depth,
                tag: "h2",
                id: None,
                ancestor_ids,
            },
            ancestor_names,
        };
        derive_names(raw, &ctx, profile).unwrap()
    }

    fn silent_profile() -> PageProfile {
        PageProfile {
            name: "silent".into(),
            rules: Vec::new(),
            basic_names: Predicate::Never,
            skip: Predicate::Never,
        }
    }

    #[test]
    fn bracket_expansion() {
        let names = derive("Send [Raw]", &PageProfile::default_profile());
        assert_eq!(names, vec!["Send", "Send Raw"]);
    }

    #[test]
    fn bracket_in_middle_collapses_spaces() {
        let names =
            derive("Loop [Files] Pattern", &PageProfile::default_profile());
        assert_eq!(names, vec!["Loop Pattern", "Loop Files Pattern"]);
    }

    #[test]
    fn alternatives_split_before_call_stripping() {
        let names =
            derive("Gui.Add() / GuiControl", &PageProfile::default_profile());
        assert_eq!(names, vec!["Gui.Add", "GuiControl"]);
    }

    #[test]
    fn line_breaks_and_or_are_alternatives() {
        let names = derive(
            "IfEqual or IfNotEqual\nIfLess",
            &PageProfile::default_profile(),
        );
        assert_eq!(names, vec!["IfEqual", "IfNotEqual", "IfLess"]);
    }

    #[test]
    fn keep_list_retains_call_suffix() {
        let names = derive("Func()", &PageProfile::default_profile());
        assert_eq!(names, vec!["Func()"]);
    }

    #[test]
    fn parenthetical_yields_prefix() {
        let names = derive("Loop (files)", &PageProfile::default_profile());
        assert_eq!(names, vec!["Loop (files)", "Loop"]);
    }

    #[test]
    fn unbalanced_bracket_is_an_error() {
        let ctx = NameContext {
            heading: HeadingContext {
                depth: 1,
                tag: "h2",
                id: None,
                ancestor_ids: &[],
            },
            ancestor_names: &[],
        };
        let err = derive_names(
            "Send [Raw",
            &ctx,
            &PageProfile::default_profile(),
        )
        .unwrap_err();
        assert!(matches!(err, NameError::UnbalancedBracket(_)));
    }

    #[test]
    fn blank_heading_is_an_error() {
        let ctx = NameContext {
            heading: HeadingContext {
                depth: 1,
                tag: "h2",
                id: None,
                ancestor_ids: &[],
            },
            ancestor_names: &[],
        };
        assert_eq!(
            derive_names("  \n ", &ctx, &PageProfile::default_profile()),
            Err(NameError::Empty)
        );
    }

    #[test]
    fn method_heading_gets_ancestor_prefix() {
        let profile = PageProfile::object_profile();
        let ids = vec![None, Some("Methods".to_string())];
        let names = vec![Some("Gui".to_string()), None];
        let derived = derive_at("Add", 2, &ids, &names, &profile);
        assert_eq!(derived, vec!["Gui.Add()"]);
    }

    #[test]
    fn object_title_is_stripped() {
        let derived = derive("Gui Object", &PageProfile::object_profile());
        assert_eq!(derived, vec!["Gui"]);
    }

    #[test]
    fn only_first_matching_rule_fires() {
        let mut profile = silent_profile();
        profile.rules = vec![
            PrefixRule {
                when: Predicate::Always,
                then: Action::Template {
                    template: "#{name}".into(),
                },
            },
            PrefixRule {
                when: Predicate::Always,
                then: Action::Template {
                    template: "{name}!".into(),
                },
            },
        ];
        assert_eq!(derive("Include", &profile), vec!["#Include"]);
    }

    #[test]
    fn rule_output_is_added_to_basic_names() {
        let mut profile = PageProfile::default_profile();
        profile.rules = vec![PrefixRule {
            when: Predicate::Always,
            then: Action::Template {
                template: "#{name}".into(),
            },
        }];
        assert_eq!(derive("Include", &profile), vec!["Include", "#Include"]);
    }

    #[test]
    fn fallback_to_raw_text() {
        assert_eq!(derive("  Send  [Raw] ", &silent_profile()), vec![
            "Send [Raw]"
        ]);
    }

    #[test]
    fn missing_ancestor_falls_back() {
        let profile = PageProfile::object_profile();
        let ids = vec![None, Some("Methods".to_string())];
        let derived = derive_at("Add", 2, &ids, &[], &profile);
        assert_eq!(derived, vec!["Add"]);
    }

    proptest! {
        #[test]
        fn never_empty(raw in "[A-Za-z0-9 ./()]{1,30}") {
            prop_assume!(!raw.trim().is_empty());
            let names = derive(&raw, &silent_profile());
            prop_assert!(!names.is_empty());
            let names = derive(&raw, &PageProfile::default_profile());
            prop_assert!(!names.is_empty());
        }

        #[test]
        fn optional_segment_gives_both_variants(
            head in "[A-Z][a-z]{1,8}",
            opt in "[A-Z][a-z]{1,8}",
        ) {
            let names = derive(
                &format!("{head} [{opt}]"),
                &PageProfile::default_profile(),
            );
            prop_assert_eq!(names, vec![head.clone(), format!("{head} {opt}")]);
        }
    }
}
