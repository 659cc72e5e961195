/// Collapse runs of horizontal whitespace into single spaces and trim each
/// line. Line breaks survive; blank lines are dropped.
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse all whitespace, line breaks included, into single spaces.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric tokens of `text`, in order.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens = tokens(text);
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-sort similarity on a 0..=100 scale.
///
/// Both sides are tokenized, lowercased and sorted before comparing with a
/// normalized Levenshtein distance, so word order and punctuation do not
/// matter: `"gui add"` and `"Gui.Add()"` score 100.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b) * 100.0
}
