//! Shared outbound HTTP wrapper.
//!
//! Every network call in the pipeline goes through one [`Fetcher`] so the
//! timeout, redirect limit, user agent and body cap are applied uniformly.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use skillcatalog_shared::{CatalogError, Result};

/// User-Agent string for all outbound requests.
pub const USER_AGENT: &str = concat!("SkillCatalog/", env!("CARGO_PKG_VERSION"));

/// Largest response body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Status code and decoded body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET client with uniform limits.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_body_bytes: usize,
}

impl Fetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    /// Override the body cap.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// GET `url` with extra headers. Non-2xx statuses are returned, not raised.
    pub async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<FetchResponse> {
        debug!(url, "GET");

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CatalogError::validation(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CatalogError::validation(format!("invalid header value: {e}")))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .get(url)
            .headers(header_map)
            .send()
            .await
            .map_err(|e| CatalogError::fetch(url, e))?;

        let status = response.status().as_u16();

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(CatalogError::fetch(
                    url,
                    format!("body of {len} bytes exceeds limit"),
                ));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::fetch(url, format!("body read failed: {e}")))?;

        if bytes.len() > self.max_body_bytes {
            return Err(CatalogError::fetch(
                url,
                format!("body of {} bytes exceeds limit", bytes.len()),
            ));
        }

        Ok(FetchResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Body of a 2xx response, or `None` on any failure.
    pub async fn get_text(&self, url: &str) -> Option<String> {
        match self.get(url, &[]).await {
            Ok(resp) if resp.is_success() => Some(resp.body),
            Ok(resp) => {
                warn!(url, status = resp.status, "fetch returned non-success status");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                None
            }
        }
    }
}
