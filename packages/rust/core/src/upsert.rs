//! Idempotent upsert of catalog entries keyed by canonical URL.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use skillcatalog_shared::{CatalogEntry, CatalogError, Result};
use skillcatalog_storage::{Storage, TaxonomyTable};

use crate::canonical::{entry_slug, legacy_repo_url, slug_candidate};
use crate::taxonomy::{CategoryChoice, resolve_category, resolve_tags};
use crate::trust::TrustProfile;

/// Link type recorded for the document an entry was built from.
pub const DEFINITION_LINK: &str = "definition";

const MAX_SLUG_ATTEMPTS: u32 = 100;

/// Everything the writer needs to create or refresh one entry.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub canonical_url: String,
    pub source_id: String,
    pub name: String,
    pub description: String,
    pub content: String,
    /// Explicit `category` frontmatter value.
    pub category: Option<String>,
    /// Explicit frontmatter tags.
    pub tags: Vec<String>,
    /// Normalized spec subset.
    pub spec: Option<Value>,
    pub quality_score: Option<u8>,
    pub trust: Option<TrustProfile>,
    pub upstream_updated_at: Option<DateTime<Utc>>,
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub entry_id: String,
    pub slug: String,
    pub created: bool,
    /// An entry stored under the legacy repository URL was moved to the canonical URL.
    pub repointed: bool,
    pub tags_added: usize,
    pub link_added: bool,
}

/// Writes catalog entries, their taxonomy, and source links.
pub struct CatalogWriter<'a> {
    storage: &'a Storage,
}

impl<'a> CatalogWriter<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Create or refresh the entry for `draft.canonical_url`.
    ///
    /// Lookup order: canonical URL, then a legacy entry under the repository
    /// root URL with the same name, then a fresh entry with a unique slug.
    #[instrument(skip_all, fields(url = %draft.canonical_url))]
    pub async fn upsert(&self, draft: &EntryDraft) -> Result<UpsertOutcome> {
        let category = resolve_category(draft.category.as_deref(), &draft.name, &draft.description);
        let category_id = self.category_id(&category).await?;

        let mut repointed = false;
        let mut existing = self.storage.get_entry_by_url(&draft.canonical_url).await?;
        if existing.is_none() {
            if let Some(legacy_url) = legacy_repo_url(&draft.canonical_url) {
                existing = self.storage.find_legacy_entry(&legacy_url, &draft.name).await?;
                repointed = existing.is_some();
            }
        }

        let (entry, created) = match existing {
            Some(mut entry) => {
                apply_draft(&mut entry, draft, &category_id);
                self.storage.update_entry(&entry).await?;
                if repointed {
                    info!(entry_id = %entry.id, "repointed legacy entry to canonical URL");
                }
                (entry, false)
            }
            None => self.create(draft, &category_id).await?,
        };

        let tags_added = self.attach_tags(&entry.id, draft, &category.slug).await?;
        let link_added = self
            .link_source(&entry.id, &draft.source_id, &draft.canonical_url)
            .await?;

        debug!(entry_id = %entry.id, created, tags_added, link_added, "entry upserted");
        Ok(UpsertOutcome {
            entry_id: entry.id,
            slug: entry.slug,
            created,
            repointed,
            tags_added,
            link_added,
        })
    }

    async fn create(&self, draft: &EntryDraft, category_id: &str) -> Result<(CatalogEntry, bool)> {
        let slug = self.unique_slug(&draft.name, &draft.canonical_url).await?;
        let now = Utc::now();
        let mut entry = CatalogEntry {
            id: Uuid::now_v7().to_string(),
            slug,
            name: String::new(),
            description: String::new(),
            content: String::new(),
            summary: None,
            url: draft.canonical_url.clone(),
            category_id: None,
            spec: None,
            quality_score: None,
            trust_score: None,
            trust_level: None,
            trust_flags: Vec::new(),
            is_official: true,
            is_verified: true,
            upstream_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_draft(&mut entry, draft, category_id);

        match self.storage.insert_entry(&entry).await {
            Ok(()) => {
                info!(entry_id = %entry.id, slug = %entry.slug, "created catalog entry");
                Ok((entry, true))
            }
            Err(e) => {
                // Another pass may have inserted the same URL since the lookup.
                let Some(mut winner) = self.storage.get_entry_by_url(&draft.canonical_url).await?
                else {
                    return Err(e);
                };
                warn!(entry_id = %winner.id, "entry appeared concurrently, updating instead");
                apply_draft(&mut winner, draft, category_id);
                self.storage.update_entry(&winner).await?;
                Ok((winner, false))
            }
        }
    }

    /// First free slug among `base`, `base-2`, `base-3`, ...
    pub async fn unique_slug(&self, name: &str, canonical_url: &str) -> Result<String> {
        let base = entry_slug(name, canonical_url);
        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let candidate = slug_candidate(&base, attempt);
            if !self.storage.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(CatalogError::Storage(format!(
            "no free slug for '{base}' after {MAX_SLUG_ATTEMPTS} attempts"
        )))
    }

    async fn category_id(&self, category: &CategoryChoice) -> Result<String> {
        let taxon = self
            .storage
            .get_or_create_taxon(TaxonomyTable::Categories, &category.slug, &category.name)
            .await?;
        Ok(taxon.id)
    }

    async fn attach_tags(
        &self,
        entry_id: &str,
        draft: &EntryDraft,
        category_slug: &str,
    ) -> Result<usize> {
        let tags = resolve_tags(&draft.tags, &draft.name, &draft.description, category_slug);
        self.attach_tag_pairs(entry_id, &tags).await
    }

    /// Attach tags by slug/name, creating missing tags. Returns how many links are new.
    pub async fn attach_tag_pairs(&self, entry_id: &str, tags: &[(String, String)]) -> Result<usize> {
        let mut added = 0;
        for (slug, name) in tags {
            let tag = self
                .storage
                .get_or_create_taxon(TaxonomyTable::Tags, slug, name)
                .await?;
            if self.storage.attach_tag(entry_id, &tag.id).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Record the definition link for an entry. Returns `true` if it is new.
    pub async fn link_source(
        &self,
        entry_id: &str,
        source_id: &str,
        canonical_url: &str,
    ) -> Result<bool> {
        self.storage
            .attach_source_link(entry_id, source_id, canonical_url, DEFINITION_LINK)
            .await
    }
}

fn apply_draft(entry: &mut CatalogEntry, draft: &EntryDraft, category_id: &str) {
    entry.url = draft.canonical_url.clone();
    if !draft.name.trim().is_empty() {
        entry.name = draft.name.trim().to_string();
    }
    if !draft.description.trim().is_empty() {
        entry.description = draft.description.trim().to_string();
    }
    if !draft.content.trim().is_empty() {
        entry.content = draft.content.clone();
    }
    entry.category_id = Some(category_id.to_string());
    if let Some(spec) = &draft.spec {
        entry.spec = Some(spec.clone());
    }
    if let Some(score) = draft.quality_score {
        entry.quality_score = Some(f64::from(score));
    }
    if let Some(trust) = &draft.trust {
        entry.trust_score = Some(trust.score);
        entry.trust_level = Some(trust.level);
        entry.trust_flags = trust.flags.clone();
    }
    if draft.upstream_updated_at.is_some() {
        entry.upstream_updated_at = draft.upstream_updated_at;
    }
    entry.is_official = true;
    entry.is_verified = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_source, test_storage};
    use skillcatalog_shared::TrustLevel;

    const URL: &str = "https://github.com/acme/skills/blob/main/skills/foo-skill/SKILL.md";

    fn draft() -> EntryDraft {
        EntryDraft {
            canonical_url: URL.into(),
            source_id: "acme/skills".into(),
            name: "foo-skill".into(),
            description: "Formats Python code with black".into(),
            content: "# Foo\n\nBody".into(),
            spec: Some(serde_json::json!({"model": "sonnet"})),
            quality_score: Some(90),
            trust: Some(TrustProfile {
                score: 88.5,
                level: TrustLevel::Ok,
                flags: Vec::new(),
            }),
            ..EntryDraft::default()
        }
    }

    #[tokio::test]
    async fn creates_entry_with_hashed_slug() {
        let storage = test_storage().await;
        seed_source(&storage, "acme/skills").await;
        let writer = CatalogWriter::new(&storage);

        let out = writer.upsert(&draft()).await.unwrap();
        assert!(out.created);
        assert!(out.slug.starts_with("foo-skill-"));
        assert!(out.link_added);
        assert!(out.tags_added > 0);

        let entry = storage.get_entry(&out.entry_id).await.unwrap().unwrap();
        assert_eq!(entry.url, URL);
        assert!(entry.is_official && entry.is_verified);
        assert_eq!(entry.quality_score, Some(90.0));
        assert_eq!(entry.trust_level, Some(TrustLevel::Ok));
        assert_eq!(
            storage.category_slug(entry.category_id.as_deref().unwrap()).await.unwrap().as_deref(),
            Some("development")
        );
        assert_eq!(
            storage.source_links_for_entry(&entry.id).await.unwrap(),
            vec![("acme/skills".to_string(), URL.to_string(), "definition".to_string())]
        );
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let storage = test_storage().await;
        seed_source(&storage, "acme/skills").await;
        let writer = CatalogWriter::new(&storage);

        let first = writer.upsert(&draft()).await.unwrap();
        let second = writer.upsert(&draft()).await.unwrap();

        assert!(!second.created);
        assert_eq!(first.entry_id, second.entry_id);
        assert_eq!(first.slug, second.slug);
        assert_eq!(second.tags_added, 0);
        assert!(!second.link_added);
        assert_eq!(storage.count_entries().await.unwrap(), 1);
        assert_eq!(storage.source_links_for_entry(&first.entry_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tags_are_additive() {
        let storage = test_storage().await;
        seed_source(&storage, "acme/skills").await;
        let writer = CatalogWriter::new(&storage);

        let mut d = draft();
        d.tags = vec!["alpha".into()];
        let out = writer.upsert(&d).await.unwrap();
        d.tags = vec!["beta".into()];
        writer.upsert(&d).await.unwrap();

        assert_eq!(
            storage.entry_tag_slugs(&out.entry_id).await.unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_fields_do_not_overwrite() {
        let storage = test_storage().await;
        seed_source(&storage, "acme/skills").await;
        let writer = CatalogWriter::new(&storage);

        let out = writer.upsert(&draft()).await.unwrap();
        let mut d = draft();
        d.description = "  ".into();
        d.content = String::new();
        d.trust = None;
        writer.upsert(&d).await.unwrap();

        let entry = storage.get_entry(&out.entry_id).await.unwrap().unwrap();
        assert_eq!(entry.description, "Formats Python code with black");
        assert_eq!(entry.content, "# Foo\n\nBody");
        assert_eq!(entry.trust_score, Some(88.5));
    }

    #[tokio::test]
    async fn legacy_entry_is_repointed() {
        let storage = test_storage().await;
        seed_source(&storage, "acme/skills").await;
        let now = Utc::now();
        let legacy = CatalogEntry {
            id: "legacy-1".into(),
            slug: "foo-skill".into(),
            name: "Foo-Skill".into(),
            description: "old".into(),
            content: "old".into(),
            summary: Some("kept".into()),
            url: "https://github.com/acme/skills/".into(),
            category_id: None,
            spec: None,
            quality_score: None,
            trust_score: None,
            trust_level: None,
            trust_flags: Vec::new(),
            is_official: false,
            is_verified: false,
            upstream_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        storage.insert_entry(&legacy).await.unwrap();

        let writer = CatalogWriter::new(&storage);
        let out = writer.upsert(&draft()).await.unwrap();
        assert!(out.repointed);
        assert!(!out.created);
        assert_eq!(out.entry_id, "legacy-1");
        assert_eq!(out.slug, "foo-skill");

        let entry = storage.get_entry_by_url(URL).await.unwrap().unwrap();
        assert_eq!(entry.id, "legacy-1");
        assert_eq!(entry.summary.as_deref(), Some("kept"));
        assert!(entry.is_verified);
        assert_eq!(storage.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn slug_collisions_get_numeric_suffix() {
        let storage = test_storage().await;
        let writer = CatalogWriter::new(&storage);
        let base = entry_slug("foo-skill", URL);

        let now = Utc::now();
        let taken = CatalogEntry {
            id: "other".into(),
            slug: base.clone(),
            name: "x".into(),
            description: String::new(),
            content: String::new(),
            summary: None,
            url: "https://github.com/x/y/blob/main/skills/x/SKILL.md".into(),
            category_id: None,
            spec: None,
            quality_score: None,
            trust_score: None,
            trust_level: None,
            trust_flags: Vec::new(),
            is_official: true,
            is_verified: true,
            upstream_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        storage.insert_entry(&taken).await.unwrap();

        assert_eq!(writer.unique_slug("foo-skill", URL).await.unwrap(), format!("{base}-2"));
    }
}
