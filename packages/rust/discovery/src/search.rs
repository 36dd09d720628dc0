//! Keyword-search discovery through the GitHub search API.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use skillcatalog_crawler::{GithubClient, GithubError};
use skillcatalog_shared::SearchMode;

use crate::registry::SourcePolicy;

/// Result page size without a token.
pub const UNAUTHENTICATED_PER_PAGE: u32 = 30;

/// Result page size with a token.
pub const AUTHENTICATED_PER_PAGE: u32 = 100;

/// Repositories found by search, plus per-query failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDiscovery {
    /// `owner/repo`, first-seen order, deduplicated case-insensitively.
    pub repositories: Vec<String>,
    /// Source skipped because it needs a token and none is configured.
    pub skipped_without_token: bool,
    /// Queries cut short by a rate-limit response.
    pub rate_limited_queries: usize,
    pub errors: Vec<String>,
}

/// Run every query of a search source within its page budget.
#[instrument(skip_all, fields(mode = %mode, queries = queries.len()))]
pub async fn discover_search(
    github: &GithubClient,
    queries: &[String],
    mode: SearchMode,
    policy: &SourcePolicy,
) -> SearchDiscovery {
    let mut out = SearchDiscovery::default();

    if policy.require_token && !github.has_token() {
        info!("search source requires a token, skipping");
        out.skipped_without_token = true;
        return out;
    }

    let (max_pages, per_page) = if github.has_token() {
        (policy.max_pages.max(1), AUTHENTICATED_PER_PAGE)
    } else {
        (1, UNAUTHENTICATED_PER_PAGE)
    };

    let mut seen = HashSet::new();

    'queries: for query in queries {
        for page in 1..=max_pages {
            if out.repositories.len() >= policy.max_repos {
                break 'queries;
            }
            match github.search(mode, query, page, per_page).await {
                Ok(repos) => {
                    let exhausted = (repos.len() as u32) < per_page;
                    for repo in repos {
                        if out.repositories.len() >= policy.max_repos {
                            break;
                        }
                        if seen.insert(repo.to_ascii_lowercase()) {
                            out.repositories.push(repo);
                        }
                    }
                    if exhausted {
                        break;
                    }
                }
                Err(GithubError::RateLimited { status }) => {
                    warn!(query = %query, page, status, "search rate limited, abandoning query");
                    out.rate_limited_queries += 1;
                    out.errors
                        .push(format!("{query}: rate limited (HTTP {status})"));
                    break;
                }
                Err(e) => {
                    warn!(query = %query, page, error = %e, "search page failed");
                    out.errors.push(format!("{query} page {page}: {e}"));
                }
            }
        }
    }

    info!(
        repositories = out.repositories.len(),
        errors = out.errors.len(),
        "search discovery finished"
    );
    out
}
