//! Web-directory discovery: GitHub repository links from a listing site.
//!
//! The root page is scanned first, then the site's sitemap (nested indexes
//! are followed) supplies further pages up to the source's page budget.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use skillcatalog_crawler::Fetcher;

use crate::registry::SourcePolicy;

/// Nested sitemap documents fetched per directory.
const MAX_SITEMAP_DOCUMENTS: usize = 10;

/// First path segments on github.com that are not user or org names.
const RESERVED_OWNERS: &[&str] = &[
    "search",
    "orgs",
    "topics",
    "features",
    "marketplace",
    "sponsors",
    "login",
    "about",
    "settings",
    "explore",
    "collections",
    "apps",
    "enterprise",
    "pricing",
    "site",
    "security",
    "trending",
    "notifications",
    "new",
];

static GITHUB_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?github\.com/([A-Za-z0-9][A-Za-z0-9-]*)/([A-Za-z0-9._-]+)")
        .expect("valid regex")
});

static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").expect("valid regex"));

static SITEMAP_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<sitemapindex[\s>]").expect("valid regex"));

/// Repositories found on a directory, plus per-page failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryDiscovery {
    /// `owner/repo`, first-seen order.
    pub repositories: Vec<String>,
    pub pages_fetched: usize,
    pub errors: Vec<String>,
}

/// Case-insensitive `owner/repo` accumulator with a cap.
#[derive(Debug)]
struct RepoCollector {
    seen: HashSet<String>,
    repos: Vec<String>,
    cap: usize,
}

impl RepoCollector {
    fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            repos: Vec::new(),
            cap,
        }
    }

    fn is_full(&self) -> bool {
        self.repos.len() >= self.cap
    }

    fn extend(&mut self, found: impl IntoIterator<Item = String>) {
        for repo in found {
            if self.is_full() {
                return;
            }
            if self.seen.insert(repo.to_ascii_lowercase()) {
                self.repos.push(repo);
            }
        }
    }
}

/// Discover repositories linked from the directory at `root_url`.
#[instrument(skip_all, fields(root = %root_url))]
pub async fn discover_directory(
    fetcher: &Fetcher,
    root_url: &str,
    policy: &SourcePolicy,
) -> DirectoryDiscovery {
    let mut out = DirectoryDiscovery::default();
    let mut collector = RepoCollector::new(policy.max_repos);

    let root = match Url::parse(root_url) {
        Ok(url) => url,
        Err(e) => {
            out.errors.push(format!("{root_url}: invalid url: {e}"));
            return out;
        }
    };

    match fetcher.get_text(root.as_str()).await {
        Some(html) => {
            out.pages_fetched += 1;
            collector.extend(extract_repositories(&html, &root));
        }
        None => out.errors.push(format!("{root}: fetch failed")),
    }

    if !collector.is_full() && policy.max_sitemap_pages > 0 {
        let pages = sitemap_pages(fetcher, &root, policy.max_sitemap_pages, &mut out.errors).await;
        debug!(pages = pages.len(), "sitemap pages listed");

        for page in pages {
            if collector.is_full() {
                break;
            }
            // Sitemaps sometimes list repository URLs directly.
            if let Some(repo) = parse_repo_url(&page) {
                collector.extend([repo]);
                continue;
            }
            let Ok(page_url) = Url::parse(&page) else {
                continue;
            };
            match fetcher.get_text(page_url.as_str()).await {
                Some(html) => {
                    out.pages_fetched += 1;
                    collector.extend(extract_repositories(&html, &page_url));
                }
                None => out.errors.push(format!("{page_url}: fetch failed")),
            }
        }
    }

    out.repositories = collector.repos;
    info!(
        repositories = out.repositories.len(),
        pages = out.pages_fetched,
        errors = out.errors.len(),
        "directory discovery finished"
    );
    out
}

/// Page URLs listed by `{origin}/sitemap.xml`, following nested indexes.
async fn sitemap_pages(
    fetcher: &Fetcher,
    root: &Url,
    max_pages: usize,
    errors: &mut Vec<String>,
) -> Vec<String> {
    let Ok(first) = root.join("/sitemap.xml") else {
        return Vec::new();
    };

    let mut queue = VecDeque::from([first.to_string()]);
    let mut visited = HashSet::new();
    let mut pages = Vec::new();

    while let Some(sitemap_url) = queue.pop_front() {
        if pages.len() >= max_pages || visited.len() >= MAX_SITEMAP_DOCUMENTS {
            break;
        }
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }
        let Some(xml) = fetcher.get_text(&sitemap_url).await else {
            errors.push(format!("{sitemap_url}: sitemap fetch failed"));
            continue;
        };

        let (is_index, locs) = parse_sitemap(&xml);
        if is_index {
            queue.extend(locs);
        } else {
            let room = max_pages - pages.len();
            pages.extend(locs.into_iter().take(room));
        }
    }
    pages
}

/// `(is_sitemap_index, loc values)` of a sitemap document.
pub fn parse_sitemap(xml: &str) -> (bool, Vec<String>) {
    let is_index = SITEMAP_INDEX_RE.is_match(xml);
    let locs = LOC_RE
        .captures_iter(xml)
        .map(|c| unescape_xml(&c[1]))
        .filter(|s| !s.is_empty())
        .collect();
    (is_index, locs)
}

fn unescape_xml(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// GitHub repositories referenced by a page, via anchors and bare text.
pub fn extract_repositories(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut found = Vec::new();

    if let Ok(anchor) = Selector::parse("a[href]") {
        for el in doc.select(&anchor) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            if let Some(repo) = base.join(href).ok().and_then(|u| parse_repo_url(u.as_str())) {
                found.push(repo);
            }
        }
    }

    for caps in GITHUB_TEXT_RE.captures_iter(html) {
        if let Some(repo) = normalize_repo(&caps[1], &caps[2]) {
            found.push(repo);
        }
    }

    found
}

/// `owner/repo` for a github.com repository URL.
pub fn parse_repo_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "github.com" && host != "www.github.com" {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    normalize_repo(owner, repo)
}

fn normalize_repo(owner: &str, repo: &str) -> Option<String> {
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let repo = repo.trim_end_matches('.');
    if owner.is_empty() || repo.is_empty() || repo == "." {
        return None;
    }
    if RESERVED_OWNERS
        .iter()
        .any(|r| r.eq_ignore_ascii_case(owner))
    {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}
