//! Minimal GitHub REST client: repository metadata, recursive trees, search.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use skillcatalog_shared::{CatalogError, GithubConfig, SearchMode};

use crate::fetcher::{FetchResponse, Fetcher};

/// Failure talking to the GitHub API.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// 403/429: the caller should stop issuing requests for this query.
    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("{0}")]
    Transport(#[from] CatalogError),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<GithubError> for CatalogError {
    fn from(e: GithubError) -> Self {
        match e {
            GithubError::Transport(inner) => inner,
            other => CatalogError::Fetch(other.to_string()),
        }
    }
}

/// Subset of `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Repository size in KB.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

fn default_branch() -> String {
    "main".into()
}

/// One entry of a recursive git tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sha: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    /// Present on repository search hits.
    #[serde(default)]
    full_name: Option<String>,
    /// Present on code search hits.
    #[serde(default)]
    repository: Option<SearchRepo>,
}

#[derive(Debug, Deserialize)]
struct SearchRepo {
    full_name: String,
}

/// Authenticated-or-not GitHub client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    fetcher: Fetcher,
    api_base: String,
    raw_base: String,
    web_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(fetcher: Fetcher, config: &GithubConfig, token: Option<String>) -> Self {
        Self {
            fetcher,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_base: config.raw_base.trim_end_matches('/').to_string(),
            web_base: config.web_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Raw content URL for a file on a branch.
    pub fn raw_url(&self, repository: &str, branch: &str, path: &str) -> String {
        format!("{}/{repository}/{branch}/{path}", self.raw_base)
    }

    /// Browsable page URL for a file on a branch.
    pub fn page_url(&self, repository: &str, branch: &str, path: &str) -> String {
        format!("{}/{repository}/blob/{branch}/{path}", self.web_base)
    }

    /// Browsable repository root URL.
    pub fn repo_url(&self, repository: &str) -> String {
        format!("{}/{repository}", self.web_base)
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("accept", "application/vnd.github+json".to_string())];
        if let Some(token) = &self.token {
            headers.push(("authorization", format!("Bearer {token}")));
        }
        headers
    }

    async fn api_get(&self, url: &str) -> Result<FetchResponse, GithubError> {
        let resp = self.fetcher.get(url, &self.headers()).await?;
        match resp.status {
            200..=299 => Ok(resp),
            403 | 429 => Err(GithubError::RateLimited {
                status: resp.status,
            }),
            status => Err(GithubError::Status { status }),
        }
    }

    /// `GET /repos/{owner}/{repo}`.
    pub async fn repo_info(&self, repository: &str) -> Result<RepoInfo, GithubError> {
        let url = format!("{}/repos/{repository}", self.api_base);
        let resp = self.api_get(&url).await?;
        serde_json::from_str(&resp.body).map_err(|e| GithubError::Decode(e.to_string()))
    }

    /// `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`, blobs only.
    pub async fn tree(&self, repository: &str, branch: &str) -> Result<Vec<TreeEntry>, GithubError> {
        let url = format!(
            "{}/repos/{repository}/git/trees/{branch}?recursive=1",
            self.api_base
        );
        let resp = self.api_get(&url).await?;
        let tree: TreeResponse =
            serde_json::from_str(&resp.body).map_err(|e| GithubError::Decode(e.to_string()))?;
        if tree.truncated {
            debug!(repository, "git tree truncated by the API");
        }
        Ok(tree.tree.into_iter().filter(TreeEntry::is_blob).collect())
    }

    /// One page of `/search/{code|repositories}`, reduced to `owner/repo` names.
    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<String>, GithubError> {
        let endpoint = match mode {
            SearchMode::Code => "code",
            SearchMode::Repositories => "repositories",
        };
        let mut url = url::Url::parse(&format!("{}/search/{endpoint}", self.api_base))
            .map_err(|e| GithubError::Decode(format!("bad api base: {e}")))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());

        let resp = self.api_get(url.as_str()).await?;
        let parsed: SearchResponse =
            serde_json::from_str(&resp.body).map_err(|e| GithubError::Decode(e.to_string()))?;

        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| item.full_name.or(item.repository.map(|r| r.full_name)))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Client pointed at a mock server for every base URL.
    pub(crate) fn mock_client(base: &str, token: Option<&str>) -> GithubClient {
        let config = GithubConfig {
            api_base: base.to_string(),
            raw_base: format!("{base}/raw"),
            web_base: "https://github.com".into(),
            ..GithubConfig::default()
        };
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        GithubClient::new(fetcher, &config, token.map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::mock_client;
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn repo_info_decodes_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": "o/r",
                "default_branch": "trunk",
                "description": "Claude skills",
                "size": 12,
                "pushed_at": "2026-01-02T03:04:05Z"
            })))
            .mount(&server)
            .await;

        let info = mock_client(&server.uri(), Some("t0k"))
            .repo_info("o/r")
            .await
            .unwrap();
        assert_eq!(info.default_branch, "trunk");
        assert_eq!(info.description.as_deref(), Some("Claude skills"));
        assert!(info.pushed_at.is_some());
    }

    #[tokio::test]
    async fn tree_keeps_blobs_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/git/trees/main"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [
                    {"path": "skills", "type": "tree", "sha": "a"},
                    {"path": "skills/x/SKILL.md", "type": "blob", "sha": "b"}
                ],
                "truncated": false
            })))
            .mount(&server)
            .await;

        let tree = mock_client(&server.uri(), None)
            .tree("o/r", "main")
            .await
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].path, "skills/x/SKILL.md");
    }

    #[tokio::test]
    async fn search_maps_both_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("q", "filename:SKILL.md"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"repository": {"full_name": "a/b"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"full_name": "c/d"}]
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server.uri(), None);
        let code = client
            .search(SearchMode::Code, "filename:SKILL.md", 1, 30)
            .await
            .unwrap();
        assert_eq!(code, vec!["a/b".to_string()]);
        let repos = client
            .search(SearchMode::Repositories, "claude skills", 1, 30)
            .await
            .unwrap();
        assert_eq!(repos, vec!["c/d".to_string()]);
    }

    #[tokio::test]
    async fn rate_limit_statuses_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = mock_client(&server.uri(), None);
        let err = client
            .search(SearchMode::Code, "x", 1, 30)
            .await
            .unwrap_err();
        assert!(matches!(err, GithubError::RateLimited { status: 403 }));

        let err = client.repo_info("o/missing").await.unwrap_err();
        assert!(matches!(err, GithubError::Status { status: 404 }));
    }

    #[test]
    fn builds_urls() {
        let client = mock_client("http://api.test", None);
        assert_eq!(
            client.page_url("o/r", "main", "skills/x/SKILL.md"),
            "https://github.com/o/r/blob/main/skills/x/SKILL.md"
        );
        assert_eq!(
            client.raw_url("o/r", "main", "skills/x/SKILL.md"),
            "http://api.test/raw/o/r/main/skills/x/SKILL.md"
        );
        assert_eq!(client.repo_url("o/r"), "https://github.com/o/r");
    }
}
