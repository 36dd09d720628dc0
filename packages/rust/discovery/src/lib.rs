//! Crawl-source registry and repository discovery.
//!
//! Repository sources name their repository directly. Web-directory and
//! keyword-search sources are expanded here into candidate repositories,
//! which the caller hands to the scanner. A [`ScannedRepos`] set keeps a
//! repository from being scanned twice in one pass.

pub mod directory;
pub mod registry;
pub mod search;

use std::collections::HashSet;

use tracing::instrument;

use skillcatalog_crawler::GithubClient;

pub use directory::{DirectoryDiscovery, discover_directory, extract_repositories, parse_repo_url};
pub use registry::{
    SourceDefinition, SourcePolicy, SourceTarget, builtin_sources, resolve_sources,
};
pub use search::{SearchDiscovery, discover_search};

// ---------------------------------------------------------------------------
// Discovery result
// ---------------------------------------------------------------------------

/// Repositories a source yields for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// `owner/repo`, in discovery order.
    pub repositories: Vec<String>,
    /// Non-fatal failures (pages, queries) worth surfacing in worker status.
    pub errors: Vec<String>,
    /// Source was skipped entirely (e.g. needs a token).
    pub skipped: bool,
}

/// Expand a source into the repositories it points at.
#[instrument(skip_all, fields(source = %source.id))]
pub async fn discover_repositories(github: &GithubClient, source: &SourceDefinition) -> Discovered {
    match &source.target {
        SourceTarget::Repository(repo) => Discovered {
            repositories: vec![repo.clone()],
            ..Discovered::default()
        },
        SourceTarget::WebDirectory(url) => {
            let found = discover_directory(github.fetcher(), url, &source.policy).await;
            Discovered {
                repositories: found.repositories,
                errors: found.errors,
                skipped: false,
            }
        }
        SourceTarget::KeywordSearch { queries, mode } => {
            let found = discover_search(github, queries, *mode, &source.policy).await;
            Discovered {
                repositories: found.repositories,
                errors: found.errors,
                skipped: found.skipped_without_token,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pass-scoped scan set
// ---------------------------------------------------------------------------

/// Repositories already scanned in the current pass (case-insensitive).
#[derive(Debug, Default)]
pub struct ScannedRepos {
    seen: HashSet<String>,
}

impl ScannedRepos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `repo`; returns `false` if it was already scanned this pass.
    pub fn first_visit(&mut self, repo: &str) -> bool {
        self.seen.insert(repo.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillcatalog_crawler::Fetcher;
    use skillcatalog_shared::GithubConfig;
    use std::time::Duration;

    #[test]
    fn scanned_repos_are_case_insensitive() {
        let mut scanned = ScannedRepos::new();
        assert!(scanned.first_visit("Acme/Skills"));
        assert!(!scanned.first_visit("acme/skills"));
        assert!(scanned.first_visit("acme/other"));
        assert_eq!(scanned.len(), 2);
    }

    #[tokio::test]
    async fn repository_sources_pass_straight_through() {
        let github = GithubClient::new(
            Fetcher::new(Duration::from_secs(1)).unwrap(),
            &GithubConfig::default(),
            None,
        );
        let source = builtin_sources().remove(0);
        let found = discover_repositories(&github, &source).await;
        assert_eq!(found.repositories, vec!["anthropics/skills".to_string()]);
        assert!(found.errors.is_empty());
    }
}
