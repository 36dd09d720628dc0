//! Typed metadata attached to raw documents.
//!
//! Each pipeline stage owns one section of [`DocumentMetadata`]. Sections are
//! merged by key: writing a section replaces that section and leaves the
//! others as they were, so validator outputs stay independently readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RepoIntent, Severity, ValidationProfile};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where a raw document came from, recorded at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlProvenance {
    pub source_id: String,
    /// `owner/repo`.
    pub repository: String,
    pub branch: String,
    /// Path of the document inside the repository.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Browsable page URL (`https://github.com/{o}/{r}/blob/{b}/{path}`).
    pub page_url: String,
    /// Repository intent at scan time; absent for legacy rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<RepoIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// Output of the spec validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecReport {
    pub ok: bool,
    pub profile: ValidationProfile,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Normalized frontmatter subset.
    pub normalized: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_description: Option<String>,
}

/// Output of the quality validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub ok: bool,
    /// Score in `[0, 100]`.
    pub score: u8,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Final, merged security decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityDecision {
    pub block: bool,
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub indicators: Vec<String>,
    /// Which stages contributed: `heuristic` or `heuristic+model`.
    pub provider: String,
}

impl SecurityDecision {
    pub fn ok(&self) -> bool {
        !self.block
    }
}

/// Why a processed document produced no catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// URL does not point at a `SKILL.md` file.
    NotSkillDocument,
    /// No repository intent was recorded at crawl time.
    RepoIntentUnknown,
    /// Repository intent below the configured minimum.
    UntrustedRepository,
    /// Page URL is not one of the canonical skill layouts.
    NonCanonicalLayout,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSkillDocument => "not_skill_document",
            Self::RepoIntentUnknown => "repo_intent_unknown",
            Self::UntrustedRepository => "untrusted_repository",
            Self::NonCanonicalLayout => "non_canonical_layout",
        }
    }
}

/// Terminal outcome of a `processed` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Published {
        entry_id: String,
        canonical_url: String,
        /// `true` when the entry was created by this pass, `false` when updated.
        created: bool,
    },
    Skipped {
        reason: SkipReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

/// One section of document metadata, tagged by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", content = "data", rename_all = "snake_case")]
pub enum MetadataSection {
    Crawl(CrawlProvenance),
    Spec(SpecReport),
    Quality(QualityReport),
    Security(SecurityDecision),
    Outcome(Outcome),
}

/// All metadata known about a raw document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl: Option<CrawlProvenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<SpecReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl DocumentMetadata {
    /// Metadata containing only a crawl section.
    pub fn from_crawl(crawl: CrawlProvenance) -> Self {
        Self {
            crawl: Some(crawl),
            ..Self::default()
        }
    }

    /// Replace the section identified by `section`'s key.
    pub fn merge(&mut self, section: MetadataSection) {
        match section {
            MetadataSection::Crawl(v) => self.crawl = Some(v),
            MetadataSection::Spec(v) => self.spec = Some(v),
            MetadataSection::Quality(v) => self.quality = Some(v),
            MetadataSection::Security(v) => self.security = Some(v),
            MetadataSection::Outcome(v) => self.outcome = Some(v),
        }
    }

    /// Drop everything derived by validation, keeping crawl provenance.
    pub fn reset_validation(&mut self) {
        self.spec = None;
        self.quality = None;
        self.security = None;
        self.outcome = None;
    }

    /// Parse stored JSON, treating empty or malformed values as empty metadata.
    pub fn from_json_lenient(raw: Option<&str>) -> Self {
        raw.filter(|s| !s.trim().is_empty())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_crawl() -> CrawlProvenance {
        CrawlProvenance {
            source_id: "anthropic-official-skills".into(),
            repository: "anthropics/skills".into(),
            branch: "main".into(),
            path: "skills/pdf/SKILL.md".into(),
            sha: Some("abc123".into()),
            page_url: "https://github.com/anthropics/skills/blob/main/skills/pdf/SKILL.md".into(),
            intent: None,
            pushed_at: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn merge_replaces_only_named_section() {
        let mut meta = DocumentMetadata::from_crawl(sample_crawl());
        meta.merge(MetadataSection::Quality(QualityReport {
            ok: true,
            score: 90,
            errors: vec![],
            warnings: vec!["description_too_short".into()],
        }));
        assert!(meta.crawl.is_some());
        assert_eq!(meta.quality.as_ref().map(|q| q.score), Some(90));

        meta.merge(MetadataSection::Outcome(Outcome::Skipped {
            reason: SkipReason::NonCanonicalLayout,
            detail: None,
        }));
        assert!(meta.quality.is_some());
        assert!(matches!(meta.outcome, Some(Outcome::Skipped { .. })));
    }

    #[test]
    fn reset_keeps_crawl() {
        let mut meta = DocumentMetadata::from_crawl(sample_crawl());
        meta.merge(MetadataSection::Outcome(Outcome::Published {
            entry_id: "e1".into(),
            canonical_url: "https://github.com/o/r/blob/main/skills/x/SKILL.md".into(),
            created: true,
        }));
        meta.reset_validation();
        assert!(meta.crawl.is_some());
        assert!(meta.outcome.is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = Outcome::Skipped {
            reason: SkipReason::RepoIntentUnknown,
            detail: None,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "repo_intent_unknown");
    }

    #[test]
    fn lenient_parse_tolerates_garbage() {
        assert_eq!(
            DocumentMetadata::from_json_lenient(Some("not json")),
            DocumentMetadata::default()
        );
        assert_eq!(DocumentMetadata::from_json_lenient(None), DocumentMetadata::default());
        let meta = DocumentMetadata::from_crawl(sample_crawl());
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(DocumentMetadata::from_json_lenient(Some(&json)), meta);
    }
}
