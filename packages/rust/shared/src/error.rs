//! The error type shared by every SkillCatalog crate.
//!
//! Document-level problems (bad frontmatter, failed validation, a security
//! block) are not errors here: they are recorded on the raw document as a
//! [`DocumentError`](crate::DocumentError). `CatalogError` covers failures of
//! the machinery itself. The CLI reports it through `color-eyre`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Unreadable config file or an unusable setting.
    #[error("config error: {message}")]
    Config { message: String },

    /// A repository, directory page, or raw file could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A stored or configured value outside its closed set.
    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("storage error: {0}")]
    Storage(String),

    /// The chat-completions service was unreachable or answered non-2xx.
    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Rejected input such as a malformed repository id or policy value.
    #[error("validation error: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Failure fetching `url`.
    pub fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Fetch(format!("{url}: {reason}"))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a libSQL error or any other storage-layer failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawStatus;

    #[test]
    fn fetch_errors_name_the_url() {
        let err = CatalogError::fetch(
            "https://raw.githubusercontent.com/acme/skills/main/SKILL.md",
            "body of 6000000 bytes exceeds limit",
        );
        assert_eq!(
            err.to_string(),
            "fetch failed: https://raw.githubusercontent.com/acme/skills/main/SKILL.md: body of 6000000 bytes exceeds limit"
        );
    }

    #[test]
    fn unknown_stored_status_is_reported() {
        let err = "archived".parse::<RawStatus>().unwrap_err();
        assert!(matches!(err, CatalogError::UnknownValue { kind: "RawStatus", .. }));
        assert_eq!(err.to_string(), "unknown RawStatus 'archived'");
    }

    #[test]
    fn classifier_and_storage_messages() {
        let err = CatalogError::Classifier("HTTP 503".into());
        assert_eq!(err.to_string(), "classifier error: HTTP 503");

        let err = CatalogError::storage("UNIQUE constraint failed: catalog_entries.slug");
        assert!(err.to_string().starts_with("storage error: UNIQUE"));
    }
}
