//! Page profiles: per-page configuration for name derivation.
//!
//! A profile is plain data. Predicates and actions are tagged enums that
//! deserialize from JSON, so a corpus can ship its own profile file instead
//! of recompiling.

use std::path::Path;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a predicate can see about a heading.
#[derive(Debug, Clone, Copy)]
pub struct HeadingContext<'a> {
    /// Heading depth, `h1` is 0.
    pub depth: usize,
    /// Raw tag name, e.g. `h2`.
    pub tag: &'a str,
    /// The heading's own anchor, if any.
    pub id: Option<&'a str>,
    /// Anchors of the most recent heading at each shallower depth.
    pub ancestor_ids: &'a [Option<String>],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Always,
    Never,
    Depth {
        eq: usize,
    },
    DepthAtLeast {
        depth: usize,
    },
    DepthAtMost {
        depth: usize,
    },
    Tag {
        tag: String,
    },
    Id {
        id: String,
    },
    UnderSection {
        id: String,
        #[serde(default)]
        depth: Option<usize>,
    },
    All {
        of: Vec<Predicate>,
    },
    Any {
        of: Vec<Predicate>,
    },
    Not {
        inner: Box<Predicate>,
    },
}

impl Predicate {
    pub fn matches(&self, ctx: &HeadingContext<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Depth { eq } => ctx.depth == *eq,
            Self::DepthAtLeast { depth } => ctx.depth >= *depth,
            Self::DepthAtMost { depth } => ctx.depth <= *depth,
            Self::Tag { tag } => ctx.tag.eq_ignore_ascii_case(tag),
            Self::Id { id } => ctx.id == Some(id.as_str()),
            Self::UnderSection { id, depth } => match depth {
                Some(d) => ctx
                    .ancestor_ids
                    .get(*d)
                    .is_some_and(|a| a.as_deref() == Some(id.as_str())),
                None => ctx
                    .ancestor_ids
                    .iter()
                    .any(|a| a.as_deref() == Some(id.as_str())),
            },
            Self::All { of } => of.iter().all(|p| p.matches(ctx)),
            Self::Any { of } => of.iter().any(|p| p.matches(ctx)),
            Self::Not { inner } => !inner.matches(ctx),
        }
    }

    fn id(id: &str) -> Self {
        Self::Id { id: id.to_string() }
    }

    fn under(id: &str) -> Self {
        Self::UnderSection {
            id: id.to_string(),
            depth: None,
        }
    }
}

/// Named text functions a profile can apply to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// `"Gui Object"` → `"Gui"`.
    StripKindSuffix,
    Lowercase,
    /// `"Gui Add"` → `"Gui.Add"`.
    SpacesToDots,
}

const KIND_SUFFIXES: &[&str] = &[
    " Object",
    " Class",
    " Functions",
    " Function",
    " Directive",
    " Statement",
];

impl Transform {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::StripKindSuffix => KIND_SUFFIXES
                .iter()
                .find_map(|suffix| text.strip_suffix(suffix))
                .map(str::trim_end)
                .filter(|s| !s.is_empty())
                .unwrap_or(text)
                .to_string(),
            Self::Lowercase => text.to_lowercase(),
            Self::SpacesToDots => {
                text.split_whitespace().collect::<Vec<_>>().join(".")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Splice the candidate after the first primary name of the ancestor
    /// at `depth`. Placeholders: `{ancestor}`, `{name}`.
    Ancestor { depth: usize, template: String },
    /// Placeholder: `{name}`.
    Template { template: String },
    Transform { transform: Transform },
}

impl Action {
    /// `ancestor_names[d]` is the first primary name of the entry currently
    /// open at depth `d`. Returns `None` when the referenced ancestor is
    /// missing.
    pub fn apply(
        &self,
        candidate: &str,
        ancestor_names: &[Option<String>],
    ) -> Option<String> {
        let out = match self {
            Self::Ancestor { depth, template } => {
                let ancestor = ancestor_names.get(*depth)?.as_deref()?;
                template
                    .replace("{ancestor}", ancestor)
                    .replace("{name}", candidate)
            }
            Self::Template { template } => {
                template.replace("{name}", candidate)
            }
            Self::Transform { transform } => transform.apply(candidate),
        };
        (!out.trim().is_empty()).then_some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub when: Predicate,
    pub then: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProfile {
    pub name: String,
    /// Ordered; the first rule whose predicate matches fires.
    #[serde(default)]
    pub rules: Vec<PrefixRule>,
    /// Whether the heading's own text variants are registered as names.
    #[serde(default = "always")]
    pub basic_names: Predicate,
    /// Headings for which no entry is produced at all.
    #[serde(default = "never")]
    pub skip: Predicate,
}

fn always() -> Predicate {
    Predicate::Always
}

fn never() -> Predicate {
    Predicate::Never
}

impl PageProfile {
    pub fn default_profile() -> Self {
        Self {
            name: "default".to_string(),
            rules: Vec::new(),
            basic_names: Predicate::Always,
            skip: Predicate::Any {
                of: vec![
                    Predicate::id("toc"),
                    Predicate::DepthAtLeast { depth: 4 },
                ],
            },
        }
    }

    /// Profile for pages documenting one object with `Methods` and
    /// `Properties` sections.
    pub fn object_profile() -> Self {
        let sections = || {
            vec![
                Predicate::under("Methods"),
                Predicate::under("Properties"),
            ]
        };
        let mut basic_off = sections();
        basic_off.push(Predicate::Depth { eq: 0 });

        Self {
            name: "object".to_string(),
            rules: vec![
                PrefixRule {
                    when: Predicate::Depth { eq: 0 },
                    then: Action::Transform {
                        transform: Transform::StripKindSuffix,
                    },
                },
                PrefixRule {
                    when: Predicate::under("Methods"),
                    then: Action::Ancestor {
                        depth: 0,
                        template: "{ancestor}.{name}()".to_string(),
                    },
                },
                PrefixRule {
                    when: Predicate::under("Properties"),
                    then: Action::Ancestor {
                        depth: 0,
                        template: "{ancestor}.{name}".to_string(),
                    },
                },
            ],
            basic_names: Predicate::Not {
                inner: Box::new(Predicate::Any { of: basic_off }),
            },
            skip: Predicate::Any {
                of: vec![
                    Predicate::id("toc"),
                    Predicate::id("Methods"),
                    Predicate::id("Properties"),
                    Predicate::DepthAtLeast { depth: 4 },
                ],
            },
        }
    }
}

/// When a page rule applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// Replaces the default profile during the directory sweep.
    #[default]
    Sweep,
    /// Parses matching pages again after the sweep; drafts are merged.
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRule {
    /// Glob matched against the page path relative to the corpus root.
    pub pattern: String,
    pub profile: PageProfile,
    #[serde(default)]
    pub pass: Pass,
}

/// Serializable profile configuration for a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "PageProfile::default_profile")]
    pub default: PageProfile,
    #[serde(default)]
    pub pages: Vec<PageRule>,
    /// Supplementary `[name, "page#fragment"]` index, relative to the root.
    #[serde(default)]
    pub index_file: Option<String>,
}

impl ProfileConfig {
    pub fn builtin() -> Self {
        Self {
            default: PageProfile::default_profile(),
            pages: vec![PageRule {
                pattern: "objects/*".to_string(),
                profile: PageProfile::object_profile(),
                pass: Pass::Sweep,
            }],
            index_file: Some("index.json".to_string()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn compile(self) -> Result<Profiles> {
        let mut sweep = Vec::new();
        let mut overrides = Vec::new();
        for rule in self.pages {
            let matcher = Glob::new(&rule.pattern)?.compile_matcher();
            match rule.pass {
                Pass::Sweep => sweep.push((matcher, rule.profile)),
                Pass::Override => overrides.push((matcher, rule.profile)),
            }
        }
        Ok(Profiles {
            default: self.default,
            sweep,
            overrides,
            index_file: self.index_file,
        })
    }
}

/// Compiled profile configuration.
#[derive(Debug, Clone)]
pub struct Profiles {
    default: PageProfile,
    sweep: Vec<(GlobMatcher, PageProfile)>,
    overrides: Vec<(GlobMatcher, PageProfile)>,
    index_file: Option<String>,
}

impl Profiles {
    pub fn builtin() -> Self {
        ProfileConfig::builtin()
            .compile()
            .expect("builtin page patterns are valid globs")
    }

    /// Profile used for `page` during the directory sweep.
    pub fn sweep_profile(&self, page: &str) -> &PageProfile {
        self.sweep
            .iter()
            .find(|(m, _)| m.is_match(page))
            .map(|(_, p)| p)
            .unwrap_or(&self.default)
    }

    /// Extra profiles to parse `page` with after the sweep.
    pub fn override_profiles<'a>(
        &'a self,
        page: &'a str,
    ) -> impl Iterator<Item = &'a PageProfile> + 'a {
        self.overrides
            .iter()
            .filter(move |(m, _)| m.is_match(page))
            .map(|(_, p)| p)
    }

    pub fn index_file(&self) -> Option<&str> {
        self.index_file.as_deref()
    }
}

impl Default for Profiles {
    fn default() -> Self {
        Self::builtin()
    }
}
