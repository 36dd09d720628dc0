//! Catalog entries, taxonomy, and source links.
//!
//! `catalog_entries.url` carries a unique index; it is the only guard against
//! two passes creating the same entry concurrently.

use chrono::Utc;
use libsql::params;
use uuid::Uuid;

use skillcatalog_shared::{CatalogEntry, CatalogError, Result, Taxon, TrustLevel};

use crate::{Storage, opt_text, parse_ts};

const ENTRY_COLUMNS: &str = "id, slug, name, description, content, summary, url, category_id, \
     spec_json, quality_score, trust_score, trust_level, trust_flags_json, is_official, \
     is_verified, upstream_updated_at, created_at, updated_at";

/// Taxonomy table selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyTable {
    Categories,
    Tags,
}

impl TaxonomyTable {
    fn table(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Tags => "tags",
        }
    }
}

/// A derived field that backfill passes look for on existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryGap {
    SourceLink,
    Tags,
    Spec,
    Trust,
    Summary,
}

impl EntryGap {
    fn predicate(&self) -> &'static str {
        match self {
            // Only entries with a crawled document can be linked.
            Self::SourceLink => {
                "NOT EXISTS (SELECT 1 FROM source_links l WHERE l.entry_id = e.id)
                 AND EXISTS (SELECT 1 FROM raw_documents r
                             WHERE r.entry_id = e.id OR r.canonical_url = e.url)"
            }
            Self::Tags => "NOT EXISTS (SELECT 1 FROM entry_tags t WHERE t.entry_id = e.id)",
            Self::Spec => "e.spec_json IS NULL",
            Self::Trust => "(e.trust_score IS NULL OR e.trust_level IS NULL)",
            Self::Summary => "(e.summary IS NULL OR TRIM(e.summary) = '')",
        }
    }
}

impl Storage {
    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Get an entry by ID.
    pub async fn get_entry(&self, id: &str) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries e WHERE id = ?1");
        self.query_one_entry(&sql, params![id]).await
    }

    /// Get an entry by its canonical URL.
    pub async fn get_entry_by_url(&self, url: &str) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries e WHERE url = ?1");
        self.query_one_entry(&sql, params![url]).await
    }

    /// Find a legacy entry stored under a repository-root URL with the same name.
    pub async fn find_legacy_entry(
        &self,
        repo_root_url: &str,
        name: &str,
    ) -> Result<Option<CatalogEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries e
             WHERE (url = ?1 OR url = ?2) AND LOWER(name) = LOWER(?3)
             ORDER BY created_at ASC LIMIT 1"
        );
        let with_slash = format!("{repo_root_url}/");
        self.query_one_entry(&sql, params![repo_root_url, with_slash.as_str(), name])
            .await
    }

    /// Whether a slug is already taken.
    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM catalog_entries WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(rows.next().await.map_err(CatalogError::storage)?.is_some())
    }

    /// Insert a new entry. Fails on duplicate URL or slug.
    pub async fn insert_entry(&self, entry: &CatalogEntry) -> Result<()> {
        self.check_writable()?;
        let flags = flags_to_json(&entry.trust_flags)?;
        let spec = spec_to_json(entry.spec.as_ref())?;
        self.conn
            .execute(
                "INSERT INTO catalog_entries
                   (id, slug, name, description, content, summary, url, category_id,
                    spec_json, quality_score, trust_score, trust_level, trust_flags_json,
                    is_official, is_verified, upstream_updated_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    entry.id.as_str(),
                    entry.slug.as_str(),
                    entry.name.as_str(),
                    entry.description.as_str(),
                    entry.content.as_str(),
                    entry.summary.as_deref(),
                    entry.url.as_str(),
                    entry.category_id.as_deref(),
                    spec.as_deref(),
                    entry.quality_score,
                    entry.trust_score,
                    entry.trust_level.map(|l| l.as_str()),
                    flags.as_str(),
                    i64::from(entry.is_official),
                    i64::from(entry.is_verified),
                    entry.upstream_updated_at.map(|t| t.to_rfc3339()),
                    entry.created_at.to_rfc3339(),
                    entry.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(())
    }

    /// Overwrite every mutable column of an existing entry and bump `updated_at`.
    pub async fn update_entry(&self, entry: &CatalogEntry) -> Result<()> {
        self.check_writable()?;
        let flags = flags_to_json(&entry.trust_flags)?;
        let spec = spec_to_json(entry.spec.as_ref())?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE catalog_entries SET
                   slug = ?1, name = ?2, description = ?3, content = ?4, summary = ?5,
                   url = ?6, category_id = ?7, spec_json = ?8, quality_score = ?9,
                   trust_score = ?10, trust_level = ?11, trust_flags_json = ?12,
                   is_official = ?13, is_verified = ?14, upstream_updated_at = ?15,
                   updated_at = ?16
                 WHERE id = ?17",
                params![
                    entry.slug.as_str(),
                    entry.name.as_str(),
                    entry.description.as_str(),
                    entry.content.as_str(),
                    entry.summary.as_deref(),
                    entry.url.as_str(),
                    entry.category_id.as_deref(),
                    spec.as_deref(),
                    entry.quality_score,
                    entry.trust_score,
                    entry.trust_level.map(|l| l.as_str()),
                    flags.as_str(),
                    i64::from(entry.is_official),
                    i64::from(entry.is_verified),
                    entry.upstream_updated_at.map(|t| t.to_rfc3339()),
                    now.as_str(),
                    entry.id.as_str(),
                ],
            )
            .await
            .map_err(CatalogError::storage)?;
        if affected == 0 {
            return Err(CatalogError::Storage(format!(
                "catalog entry {} not found",
                entry.id
            )));
        }
        Ok(())
    }

    /// Total number of catalog entries.
    pub async fn count_entries(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM catalog_entries", params![])
            .await
            .map_err(CatalogError::storage)?;
        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(CatalogError::storage)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Entries missing a derived field, oldest first.
    pub async fn entries_with_gap(&self, gap: EntryGap, limit: u32) -> Result<Vec<CatalogEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries e
             WHERE {}
             ORDER BY e.created_at ASC, e.id ASC
             LIMIT ?1",
            gap.predicate()
        );
        let mut rows = self
            .conn
            .query(&sql, params![limit])
            .await
            .map_err(CatalogError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    async fn query_one_entry(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<CatalogEntry>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(CatalogError::storage)?;
        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(Some(row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Taxonomy
    // -----------------------------------------------------------------------

    /// Look up a category or tag by slug, creating it if absent.
    pub async fn get_or_create_taxon(
        &self,
        table: TaxonomyTable,
        slug: &str,
        name: &str,
    ) -> Result<Taxon> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let insert = format!(
            "INSERT INTO {} (id, slug, name) VALUES (?1, ?2, ?3) ON CONFLICT(slug) DO NOTHING",
            table.table()
        );
        self.conn
            .execute(&insert, params![id.as_str(), slug, name])
            .await
            .map_err(CatalogError::storage)?;

        self.get_taxon(table, slug).await?.ok_or_else(|| {
            CatalogError::Storage(format!("{} '{slug}' vanished after insert", table.table()))
        })
    }

    /// Look up a category or tag by slug.
    pub async fn get_taxon(&self, table: TaxonomyTable, slug: &str) -> Result<Option<Taxon>> {
        let select = format!("SELECT id, slug, name FROM {} WHERE slug = ?1", table.table());
        let mut rows = self
            .conn
            .query(&select, params![slug])
            .await
            .map_err(CatalogError::storage)?;
        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(Some(Taxon {
                id: row.get::<String>(0).map_err(CatalogError::storage)?,
                slug: row.get::<String>(1).map_err(CatalogError::storage)?,
                name: row.get::<String>(2).map_err(CatalogError::storage)?,
            })),
            None => Ok(None),
        }
    }

    /// Associate a tag with an entry. Returns `true` if the link is new.
    pub async fn attach_tag(&self, entry_id: &str, tag_id: &str) -> Result<bool> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "INSERT INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2)
                 ON CONFLICT(entry_id, tag_id) DO NOTHING",
                params![entry_id, tag_id],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(affected > 0)
    }

    /// Tag slugs attached to an entry, sorted.
    pub async fn entry_tag_slugs(&self, entry_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.slug FROM entry_tags et JOIN tags t ON t.id = et.tag_id
                 WHERE et.entry_id = ?1 ORDER BY t.slug",
                params![entry_id],
            )
            .await
            .map_err(CatalogError::storage)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            results.push(row.get::<String>(0).map_err(CatalogError::storage)?);
        }
        Ok(results)
    }

    /// Slug of an entry's category, if any.
    pub async fn category_slug(&self, category_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT slug FROM categories WHERE id = ?1",
                params![category_id],
            )
            .await
            .map_err(CatalogError::storage)?;
        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(CatalogError::storage)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Source links
    // -----------------------------------------------------------------------

    /// Link an entry back to a source/external-id pair. Returns `true` if new.
    pub async fn attach_source_link(
        &self,
        entry_id: &str,
        source_id: &str,
        external_id: &str,
        link_type: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "INSERT INTO source_links (entry_id, source_id, external_id, link_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(entry_id, source_id, external_id) DO NOTHING",
                params![entry_id, source_id, external_id, link_type, now.as_str()],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(affected > 0)
    }

    /// Links for an entry. Returns `Vec<(source_id, external_id, link_type)>`.
    pub async fn source_links_for_entry(
        &self,
        entry_id: &str,
    ) -> Result<Vec<(String, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_id, external_id, link_type FROM source_links
                 WHERE entry_id = ?1 ORDER BY id",
                params![entry_id],
            )
            .await
            .map_err(CatalogError::storage)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            results.push((
                row.get::<String>(0).map_err(CatalogError::storage)?,
                row.get::<String>(1).map_err(CatalogError::storage)?,
                row.get::<String>(2).map_err(CatalogError::storage)?,
            ));
        }
        Ok(results)
    }
}

fn flags_to_json(flags: &[String]) -> Result<String> {
    serde_json::to_string(flags)
        .map_err(|e| CatalogError::Storage(format!("serialize trust flags: {e}")))
}

fn spec_to_json(spec: Option<&serde_json::Value>) -> Result<Option<String>> {
    spec.map(serde_json::to_string)
        .transpose()
        .map_err(|e| CatalogError::Storage(format!("serialize spec: {e}")))
}

/// Convert a database row to a [`CatalogEntry`].
fn row_to_entry(row: &libsql::Row) -> Result<CatalogEntry> {
    let trust_level = opt_text(row, 11)
        .map(|s| s.parse::<TrustLevel>())
        .transpose()?;
    let trust_flags = opt_text(row, 12)
        .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default();
    let spec = opt_text(row, 8).and_then(|s| serde_json::from_str(&s).ok());
    let upstream_updated_at = opt_text(row, 15).map(|s| parse_ts(&s)).transpose()?;
    let created_at: String = row.get(16).map_err(CatalogError::storage)?;
    let updated_at: String = row.get(17).map_err(CatalogError::storage)?;

    Ok(CatalogEntry {
        id: row.get::<String>(0).map_err(CatalogError::storage)?,
        slug: row.get::<String>(1).map_err(CatalogError::storage)?,
        name: row.get::<String>(2).map_err(CatalogError::storage)?,
        description: row.get::<String>(3).map_err(CatalogError::storage)?,
        content: row.get::<String>(4).map_err(CatalogError::storage)?,
        summary: opt_text(row, 5),
        url: row.get::<String>(6).map_err(CatalogError::storage)?,
        category_id: opt_text(row, 7),
        spec,
        quality_score: row.get::<f64>(9).ok(),
        trust_score: row.get::<f64>(10).ok(),
        trust_level,
        trust_flags,
        is_official: row.get::<i64>(13).unwrap_or(0) != 0,
        is_verified: row.get::<i64>(14).unwrap_or(0) != 0,
        upstream_updated_at,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn entry(url: &str, slug: &str) -> CatalogEntry {
        let now = Utc::now();
        CatalogEntry {
            id: Uuid::now_v7().to_string(),
            slug: slug.into(),
            name: "foo-skill".into(),
            description: "Does foo things".into(),
            content: "body".into(),
            summary: None,
            url: url.into(),
            category_id: None,
            spec: None,
            quality_score: Some(95.0),
            trust_score: None,
            trust_level: None,
            trust_flags: vec![],
            is_official: true,
            is_verified: true,
            upstream_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    const URL: &str = "https://github.com/o/r/blob/main/skills/foo/SKILL.md";

    #[tokio::test]
    async fn entry_insert_lookup_update() {
        let storage = test_storage().await;
        let mut e = entry(URL, "foo-skill-1a2b3c4d");
        storage.insert_entry(&e).await.unwrap();

        let loaded = storage.get_entry_by_url(URL).await.unwrap().unwrap();
        assert_eq!(loaded.id, e.id);
        assert_eq!(loaded.quality_score, Some(95.0));
        assert!(loaded.is_official);
        assert!(storage.slug_exists("foo-skill-1a2b3c4d").await.unwrap());
        assert!(!storage.slug_exists("other").await.unwrap());

        e.trust_score = Some(88.5);
        e.trust_level = Some(TrustLevel::Ok);
        e.trust_flags = vec!["security:low".into()];
        e.spec = Some(serde_json::json!({"user-invocable": true}));
        storage.update_entry(&e).await.unwrap();

        let loaded = storage.get_entry(&e.id).await.unwrap().unwrap();
        assert_eq!(loaded.trust_level, Some(TrustLevel::Ok));
        assert_eq!(loaded.trust_flags, vec!["security:low".to_string()]);
        assert_eq!(loaded.spec.unwrap()["user-invocable"], true);
        assert_eq!(storage.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_url_is_rejected() {
        let storage = test_storage().await;
        storage.insert_entry(&entry(URL, "a")).await.unwrap();
        assert!(storage.insert_entry(&entry(URL, "b")).await.is_err());
        assert_eq!(storage.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn legacy_lookup_matches_repo_root_and_name() {
        let storage = test_storage().await;
        storage
            .insert_entry(&entry("https://github.com/o/r", "legacy"))
            .await
            .unwrap();
        let found = storage
            .find_legacy_entry("https://github.com/o/r", "FOO-SKILL")
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = storage
            .find_legacy_entry("https://github.com/o/r", "bar")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn taxonomy_and_links_are_insert_if_absent() {
        let storage = test_storage().await;
        storage.ensure_source(&repo_source("src")).await.unwrap();
        let e = entry(URL, "foo");
        storage.insert_entry(&e).await.unwrap();

        let t1 = storage
            .get_or_create_taxon(TaxonomyTable::Tags, "pdf", "pdf")
            .await
            .unwrap();
        let t2 = storage
            .get_or_create_taxon(TaxonomyTable::Tags, "pdf", "PDF")
            .await
            .unwrap();
        assert_eq!(t1.id, t2.id);

        assert!(storage.attach_tag(&e.id, &t1.id).await.unwrap());
        assert!(!storage.attach_tag(&e.id, &t1.id).await.unwrap());
        assert_eq!(storage.entry_tag_slugs(&e.id).await.unwrap(), vec!["pdf"]);

        assert!(
            storage
                .attach_source_link(&e.id, "src", URL, "definition")
                .await
                .unwrap()
        );
        assert!(
            !storage
                .attach_source_link(&e.id, "src", URL, "definition")
                .await
                .unwrap()
        );
        assert_eq!(storage.source_links_for_entry(&e.id).await.unwrap().len(), 1);

        let cat = storage
            .get_or_create_taxon(TaxonomyTable::Categories, "development", "Development")
            .await
            .unwrap();
        assert_eq!(
            storage.category_slug(&cat.id).await.unwrap().as_deref(),
            Some("development")
        );
    }

    #[tokio::test]
    async fn gap_queries_find_incomplete_entries() {
        let storage = test_storage().await;
        storage.ensure_source(&repo_source("src")).await.unwrap();
        let e = entry(URL, "foo");
        storage.insert_entry(&e).await.unwrap();

        // Nothing to link an entry to until a raw document resolves to it.
        assert!(
            storage
                .entries_with_gap(EntryGap::SourceLink, 10)
                .await
                .unwrap()
                .is_empty()
        );
        let raw = storage
            .upsert_raw_document(&crate::NewRawDocument {
                source_id: "src".into(),
                external_id: "https://raw.example/foo/SKILL.md".into(),
                source_url: "https://raw.example/foo/SKILL.md".into(),
                content: "---\nname: foo-skill\n---\nbody".into(),
                metadata: Default::default(),
            })
            .await
            .unwrap();
        storage
            .mark_processed(&raw.id, &Default::default(), Some(URL), None)
            .await
            .unwrap();

        for gap in [
            EntryGap::SourceLink,
            EntryGap::Tags,
            EntryGap::Spec,
            EntryGap::Trust,
            EntryGap::Summary,
        ] {
            assert_eq!(storage.entries_with_gap(gap, 10).await.unwrap().len(), 1);
        }

        storage
            .attach_source_link(&e.id, "src", URL, "definition")
            .await
            .unwrap();
        assert!(
            storage
                .entries_with_gap(EntryGap::SourceLink, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
