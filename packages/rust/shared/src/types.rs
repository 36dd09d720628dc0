//! Core domain types for the skill catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::metadata::DocumentMetadata;

/// Implements `as_str`, `Display` and `FromStr` for a plain snake_case enum.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable storage/wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CatalogError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok(Self::$variant),)+
                    other => Err(CatalogError::UnknownValue {
                        kind: stringify!($ty),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Kind of crawl origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A single curated repository, scanned directly.
    Repository,
    /// A web directory listing repositories (HTML page + sitemap).
    WebDirectory,
    /// Queries against the code-hosting search API.
    KeywordSearch,
}

string_enum!(SourceKind {
    Repository => "repository",
    WebDirectory => "web_directory",
    KeywordSearch => "keyword_search",
});

/// Which search endpoint a keyword-search source uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Code,
    Repositories,
}

string_enum!(SearchMode {
    Code => "code",
    Repositories => "repositories",
});

/// A registered crawl origin as stored in the `sources` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Repository intent
// ---------------------------------------------------------------------------

/// Coarse classification of how skill-focused a repository is.
///
/// Ordered from least to most focused so that `tier >= minimum` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTier {
    NotSkills,
    Mixed,
    SkillsFocused,
    SkillsOnly,
}

string_enum!(IntentTier {
    NotSkills => "not_skills",
    Mixed => "mixed",
    SkillsFocused => "skills_focused",
    SkillsOnly => "skills_only",
});

/// Repository-level intent score with the file counts it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIntent {
    /// Integer score in `[0, 100]`.
    pub score: u8,
    pub tier: IntentTier,
    pub skill_md_files: u32,
    pub canonical_files: u32,
    pub noise_markers: u32,
    pub keyword_hits: u32,
    pub total_files: u32,
}

// ---------------------------------------------------------------------------
// Raw documents
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`RawDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawStatus {
    Pending,
    Processed,
    Error,
}

string_enum!(RawStatus {
    Pending => "pending",
    Processed => "processed",
    Error => "error",
});

/// Known kinds of terminal document errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Spec,
    Quality,
    Security,
    Exception,
}

string_enum!(ErrorKind {
    Spec => "spec",
    Quality => "quality",
    Security => "security",
    Exception => "exception",
});

/// Structured error recorded on a raw document in `error` status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DocumentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One fetched candidate document, keyed by `(source_id, external_id)`.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: String,
    pub source_id: String,
    /// Typically the URL the document was fetched from.
    pub external_id: String,
    pub source_url: String,
    pub content: String,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
    pub status: RawStatus,
    pub error: Option<DocumentError>,
    pub metadata: DocumentMetadata,
    /// Canonical page URL once the document has been resolved.
    pub canonical_url: Option<String>,
    /// Catalog entry produced from this document, if any.
    pub entry_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What `upsert_raw_document` did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTransition {
    /// New row inserted as `pending`.
    Created,
    /// Stored content hash equals the new hash; status untouched.
    Unchanged,
    /// Hash differs; content replaced and status reset to `pending`.
    ContentChanged,
}

impl RawTransition {
    /// Whether the row needs (re-)validation after this transition.
    pub fn needs_processing(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

// ---------------------------------------------------------------------------
// Validation / security / trust enums
// ---------------------------------------------------------------------------

/// Spec validation profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationProfile {
    #[default]
    Lax,
    Strict,
}

string_enum!(ValidationProfile {
    Lax => "lax",
    Strict => "strict",
});

/// Security finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// When the model-assisted security classifier is consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Off,
    /// Only when the heuristic pass raised something.
    #[default]
    Suspicious,
    Always,
}

string_enum!(ClassifierMode {
    Off => "off",
    Suspicious => "suspicious",
    Always => "always",
});

/// Coarse publish-safety classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Ok,
    Warning,
    Limited,
}

string_enum!(TrustLevel {
    Ok => "ok",
    Warning => "warning",
    Limited => "limited",
});

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A canonical, publicly-visible skill record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub content: String,
    pub summary: Option<String>,
    /// Canonical page URL; unique across the catalog.
    pub url: String,
    pub category_id: Option<String>,
    /// Normalized frontmatter subset produced by the spec validator.
    pub spec: Option<serde_json::Value>,
    pub quality_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub trust_level: Option<TrustLevel>,
    pub trust_flags: Vec<String>,
    pub is_official: bool,
    pub is_verified: bool,
    pub upstream_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category or tag row (both share the same shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_tier_ordering() {
        assert!(IntentTier::NotSkills < IntentTier::Mixed);
        assert!(IntentTier::Mixed < IntentTier::SkillsFocused);
        assert!(IntentTier::SkillsFocused < IntentTier::SkillsOnly);
    }

    #[test]
    fn enums_roundtrip_through_strings() {
        for tier in [
            IntentTier::NotSkills,
            IntentTier::Mixed,
            IntentTier::SkillsFocused,
            IntentTier::SkillsOnly,
        ] {
            assert_eq!(tier.as_str().parse::<IntentTier>().unwrap(), tier);
        }
        assert_eq!("Processed".parse::<RawStatus>().unwrap(), RawStatus::Processed);
        assert_eq!(" critical ".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("bogus".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SourceKind::WebDirectory).unwrap();
        assert_eq!(json, "\"web_directory\"");
        let tier: IntentTier = serde_json::from_str("\"skills_focused\"").unwrap();
        assert_eq!(tier, IntentTier::SkillsFocused);
    }

    #[test]
    fn document_error_serializes_kind() {
        let err = DocumentError::new(ErrorKind::Security, "blocked")
            .with_details(serde_json::json!({"severity": "critical"}));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "security");
        assert_eq!(value["details"]["severity"], "critical");
    }

    #[test]
    fn only_unchanged_skips_processing() {
        assert!(RawTransition::Created.needs_processing());
        assert!(RawTransition::ContentChanged.needs_processing());
        assert!(!RawTransition::Unchanged.needs_processing());
    }
}
