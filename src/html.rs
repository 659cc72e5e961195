//! Thin adapter over the HTML parser.
//!
//! The page parser only needs a handful of queries: headings in document
//! order, the anchor a heading is reachable by, the prose and syntax
//! following it, and a plain-text rendering of a sub-tree.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

use crate::text_util::collapse_whitespace;

static HEADINGS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector")
});
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static ANY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("valid selector"));

/// Following sibling elements inspected for a heading's description.
pub const SECTION_SCAN_LIMIT: usize = 12;

/// Class carried by version-tag badges inside headings.
const VERSION_CLASS: &str = "ver";

pub struct Document {
    html: Html,
}

/// A heading element and its level (1 for `h1`).
#[derive(Clone, Copy)]
pub struct Heading<'a> {
    pub level: usize,
    pub element: ElementRef<'a>,
}

impl<'a> Heading<'a> {
    pub fn tag(&self) -> &'a str {
        self.element.value().name()
    }

    /// Heading text with line breaks kept and version badges removed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        render_into(self.element, &mut out, false);
        collapse_whitespace(&out)
    }

    /// Text of the first version badge (`<span class="ver">`), if any.
    pub fn since(&self) -> Option<String> {
        self.element
            .select(&ANY)
            .find(|el| has_class(*el, VERSION_CLASS))
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
    }

    /// The anchor this heading is addressed by.
    ///
    /// Checked in order: the heading's own `id`, an anchor as its first
    /// child element, and an empty anchor element right before it.
    pub fn anchor(&self) -> Option<String> {
        if let Some(id) = self.element.value().attr("id") {
            return Some(id.to_string());
        }

        if let Some(child) = self.element.children().find_map(ElementRef::wrap)
            && let Some(id) = anchor_attr(child)
        {
            return Some(id);
        }

        let prev = self.element.prev_siblings().find_map(ElementRef::wrap)?;
        if prev.text().all(|t| t.trim().is_empty()) {
            return anchor_attr(prev);
        }
        None
    }

    /// First description paragraph and first syntax block in this heading's
    /// section.
    ///
    /// The scan stops at the next heading of any level or after
    /// [`SECTION_SCAN_LIMIT`] sibling elements. Subsection prose belongs to
    /// the subsection's own entry.
    pub fn section(&self) -> Section {
        let mut section = Section::default();
        for sibling in self
            .element
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take(SECTION_SCAN_LIMIT)
        {
            if heading_level(sibling).is_some() {
                break;
            }
            if section.content.is_none() && sibling.value().name() == "p" {
                section.content = Some(render_text(sibling))
                    .filter(|text| !text.is_empty());
            }
            if section.syntax.is_none() {
                section.syntax = std::iter::once(sibling)
                    .chain(sibling.select(&ANY))
                    .find(|el| is_syntax(*el))
                    .map(|el| syntax_text(el))
                    .filter(|text| !text.is_empty());
            }
            if section.content.is_some() && section.syntax.is_some() {
                break;
            }
        }
        section
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Section {
    pub content: Option<String>,
    pub syntax: Option<String>,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    pub fn headings(&self) -> impl Iterator<Item = Heading<'_>> {
        self.html.select(&HEADINGS).filter_map(|element| {
            heading_level(element).map(|level| Heading { level, element })
        })
    }

    /// Text of the `<title>` element.
    pub fn title(&self) -> Option<String> {
        self.html
            .select(&TITLE)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }
}

fn heading_level(element: ElementRef<'_>) -> Option<usize> {
    match element.value().name() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .classes()
        .any(|c| c.eq_ignore_ascii_case(class))
}

fn anchor_attr(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    value
        .attr("id")
        .or_else(|| (value.name() == "a").then(|| value.attr("name")).flatten())
        .map(str::to_string)
}

fn is_syntax(element: ElementRef<'_>) -> bool {
    has_class(element, "syntax")
}

fn syntax_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a sub-tree as plain prose: `<code>` becomes backticked, `<br>`
/// becomes a line break, everything else is flattened to its text.
pub fn render_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    render_into(element, &mut out, true);
    collapse_whitespace(&out)
}

fn render_into(element: ElementRef<'_>, out: &mut String, markup: bool) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match el.name() {
                    "br" => out.push('\n'),
                    "code" if markup => {
                        out.push('`');
                        out.push_str(&child.text().collect::<String>());
                        out.push('`');
                    }
                    _ if has_class(child, VERSION_CLASS) => {}
                    _ => render_into(child, out, markup),
                }
            }
            _ => {}
        }
    }
}
