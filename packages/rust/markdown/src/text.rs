//! Small text helpers shared by validators and the catalog writer.

use std::sync::LazyLock;

use regex::Regex;

/// Longest slug produced by [`slugify`].
pub const MAX_SLUG_LEN: usize = 64;

/// First plain line of a Markdown body.
///
/// Headings, list items, code fences and block quotes are skipped, as are
/// blank lines. Returns `None` when the body has no prose.
pub fn first_paragraph(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| !is_structural(line))
        .map(str::to_string)
}

fn is_structural(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with('-')
        || line.starts_with('*')
        || line.starts_with("```")
        || line.starts_with('>')
}

/// Lowercase, ASCII-only, hyphen-separated identifier.
///
/// Returns an empty string when nothing alphanumeric remains.
pub fn slugify(input: &str) -> String {
    static NON_ALNUM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lower = input.trim().to_lowercase();
    let slug = NON_ALNUM.replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    if slug.len() <= MAX_SLUG_LEN {
        return slug.to_string();
    }
    slug[..MAX_SLUG_LEN].trim_end_matches('-').to_string()
}

/// Number of lines in a body, counting a trailing partial line.
pub fn line_count(body: &str) -> usize {
    body.lines().count()
}

/// Leading `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
