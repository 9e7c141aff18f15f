//! Compact text helpers shared by excerpts, slugs and CLI output.

use regex::Regex;
use std::sync::OnceLock;

/// Collapse newlines/extra whitespace and bound length, appending `...` when cut.
///
/// The result never exceeds `max_chars` characters, ellipsis included.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(3);
    let preview: String = collapsed.chars().take(keep).collect();
    format!("{}...", preview)
}

/// Remove HTML tags, keeping the text between them.
pub fn strip_tags(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    re.replace_all(html, "").into_owned()
}

/// Lowercase ASCII slug: runs of non-alphanumerics become a single `-`.
pub fn slugify(input: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    let lowered = input.to_lowercase();
    re.replace_all(&lowered, "-").trim_matches('-').to_string()
}
