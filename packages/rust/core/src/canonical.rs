//! Canonical page URLs, legacy URL shapes, and entry slugs.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use skillcatalog_markdown::slugify;

const WEB_HOST: &str = "github.com";
const RAW_HOST: &str = "raw.githubusercontent.com";

/// Hex characters of the URL hash appended to slugs.
const SLUG_HASH_LEN: usize = 8;

static CANONICAL_URL_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)^https://github\.com/[^/]+/[^/]+/blob/[^/]+/skills/[^/]+/SKILL\.md$")
            .expect("valid regex"),
        Regex::new(
            r"(?i)^https://github\.com/[^/]+/[^/]+/blob/[^/]+/\.claude/skills/[^/]+/SKILL\.md$",
        )
        .expect("valid regex"),
    ]
});

/// Map a raw-content URL to its browsable page URL. Other URLs are returned
/// trimmed and otherwise unchanged.
pub fn canonicalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if !parsed
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(RAW_HOST))
    {
        return trimmed.to_string();
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 4 {
        return trimmed.to_string();
    }
    let (owner, repo, branch) = (segments[0], segments[1], segments[2]);
    let path = segments[3..].join("/");
    format!("https://{WEB_HOST}/{owner}/{repo}/blob/{branch}/{path}")
}

/// Whether a page URL follows one of the canonical skill layouts.
pub fn is_canonical_url(url: &str) -> bool {
    CANONICAL_URL_RES.iter().any(|re| re.is_match(url))
}

/// Whether a URL names a `SKILL.md` document.
pub fn is_skill_document_url(url: &str) -> bool {
    url.trim().to_ascii_lowercase().ends_with("/skill.md")
}

/// Repository-root URL that older entries were stored under.
pub fn legacy_repo_url(canonical_url: &str) -> Option<String> {
    let parsed = Url::parse(canonical_url).ok()?;
    if !parsed
        .host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(WEB_HOST))
    {
        return None;
    }
    let mut segments = parsed.path_segments()?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    Some(format!("https://{WEB_HOST}/{owner}/{repo}"))
}

/// Slug prefix plus a short hash of the canonical URL.
pub fn entry_slug(name: &str, canonical_url: &str) -> String {
    let base = match slugify(name) {
        s if s.is_empty() => "skill".to_string(),
        s => s,
    };
    let digest = format!("{:x}", Sha256::digest(canonical_url.as_bytes()));
    format!("{base}-{}", &digest[..SLUG_HASH_LEN])
}

/// Slug candidate for collision attempt `attempt` (1 = unsuffixed).
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}
