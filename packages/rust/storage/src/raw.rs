//! Raw document persistence and status transitions.
//!
//! Content changes are detected by comparing SHA-256 digests; only a changed
//! digest moves a row back to `pending`.

use chrono::Utc;
use libsql::params;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use skillcatalog_shared::{
    CatalogError, DocumentError, DocumentMetadata, RawDocument, RawStatus, RawTransition, Result,
};

use crate::{Storage, opt_text, parse_ts};

const RAW_COLUMNS: &str = "id, source_id, external_id, source_url, content, content_hash, status, \
     error_json, metadata_json, canonical_url, entry_id, created_at, updated_at";

/// Input for [`Storage::upsert_raw_document`].
#[derive(Debug, Clone)]
pub struct NewRawDocument {
    pub source_id: String,
    pub external_id: String,
    pub source_url: String,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Result of [`Storage::upsert_raw_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpsert {
    pub id: String,
    pub transition: RawTransition,
}

/// Counts of raw documents per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStatusCounts {
    pub pending: u64,
    pub processed: u64,
    pub error: u64,
}

/// Which rows an administrative re-queue resets to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueFilter {
    pub include_processed: bool,
    pub include_errors: bool,
    /// Only rows whose source URL ends in `/SKILL.md`.
    pub only_skill_md: bool,
    /// Only rows without a recorded spec report.
    pub only_missing_spec: bool,
}

impl Default for RequeueFilter {
    fn default() -> Self {
        Self {
            include_processed: true,
            include_errors: true,
            only_skill_md: false,
            only_missing_spec: false,
        }
    }
}

/// SHA-256 hex digest of document content.
pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Storage {
    // -----------------------------------------------------------------------
    // Ingest side
    // -----------------------------------------------------------------------

    /// Insert or refresh a raw document keyed by `(source_id, external_id)`.
    ///
    /// - no row: inserted as `pending` ([`RawTransition::Created`])
    /// - same content hash: row untouched ([`RawTransition::Unchanged`])
    /// - different hash: content and crawl metadata replaced, error cleared,
    ///   status reset to `pending` ([`RawTransition::ContentChanged`])
    pub async fn upsert_raw_document(&self, doc: &NewRawDocument) -> Result<RawUpsert> {
        self.check_writable()?;
        let hash = content_hash(&doc.content);
        let now = Utc::now().to_rfc3339();

        let mut rows = self
            .conn
            .query(
                "SELECT id, content_hash, metadata_json FROM raw_documents
                 WHERE source_id = ?1 AND external_id = ?2",
                params![doc.source_id.as_str(), doc.external_id.as_str()],
            )
            .await
            .map_err(CatalogError::storage)?;

        let existing = match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Some((
                row.get::<String>(0).map_err(CatalogError::storage)?,
                row.get::<String>(1).map_err(CatalogError::storage)?,
                opt_text(&row, 2),
            )),
            None => None,
        };

        match existing {
            None => {
                let id = Uuid::now_v7().to_string();
                let metadata = metadata_to_json(&doc.metadata)?;
                self.conn
                    .execute(
                        "INSERT INTO raw_documents
                           (id, source_id, external_id, source_url, content, content_hash,
                            status, metadata_json, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)",
                        params![
                            id.as_str(),
                            doc.source_id.as_str(),
                            doc.external_id.as_str(),
                            doc.source_url.as_str(),
                            doc.content.as_str(),
                            hash.as_str(),
                            metadata.as_str(),
                            now.as_str(),
                            now.as_str(),
                        ],
                    )
                    .await
                    .map_err(CatalogError::storage)?;
                Ok(RawUpsert {
                    id,
                    transition: RawTransition::Created,
                })
            }
            Some((id, stored_hash, _)) if stored_hash == hash => Ok(RawUpsert {
                id,
                transition: RawTransition::Unchanged,
            }),
            Some((id, _, stored_meta)) => {
                let mut metadata = DocumentMetadata::from_json_lenient(stored_meta.as_deref());
                metadata.reset_validation();
                if let Some(crawl) = doc.metadata.crawl.clone() {
                    metadata.crawl = Some(crawl);
                }
                let metadata = metadata_to_json(&metadata)?;
                self.conn
                    .execute(
                        "UPDATE raw_documents SET
                           source_url = ?1, content = ?2, content_hash = ?3,
                           status = 'pending', error_json = NULL,
                           metadata_json = ?4, updated_at = ?5
                         WHERE id = ?6",
                        params![
                            doc.source_url.as_str(),
                            doc.content.as_str(),
                            hash.as_str(),
                            metadata.as_str(),
                            now.as_str(),
                            id.as_str(),
                        ],
                    )
                    .await
                    .map_err(CatalogError::storage)?;
                Ok(RawUpsert {
                    id,
                    transition: RawTransition::ContentChanged,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Worker side
    // -----------------------------------------------------------------------

    /// Get a raw document by ID.
    pub async fn get_raw_document(&self, id: &str) -> Result<Option<RawDocument>> {
        let sql = format!("SELECT {RAW_COLUMNS} FROM raw_documents WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(CatalogError::storage)?;

        match rows.next().await.map_err(CatalogError::storage)? {
            Some(row) => Ok(Some(row_to_raw_document(&row)?)),
            None => Ok(None),
        }
    }

    /// Oldest-first batch of pending documents.
    pub async fn list_pending(&self, limit: u32) -> Result<Vec<RawDocument>> {
        let sql = format!(
            "SELECT {RAW_COLUMNS} FROM raw_documents
             WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC
             LIMIT ?1"
        );
        self.query_raw_documents(&sql, params![limit]).await
    }

    /// Raw documents that produced (or resolved to) a catalog entry, newest first.
    pub async fn raw_documents_for_entry(
        &self,
        entry_id: &str,
        canonical_url: &str,
    ) -> Result<Vec<RawDocument>> {
        let sql = format!(
            "SELECT {RAW_COLUMNS} FROM raw_documents
             WHERE entry_id = ?1 OR canonical_url = ?2
             ORDER BY updated_at DESC, id DESC"
        );
        self.query_raw_documents(&sql, params![entry_id, canonical_url])
            .await
    }

    /// Terminal success: record metadata and clear any previous error.
    pub async fn mark_processed(
        &self,
        id: &str,
        metadata: &DocumentMetadata,
        canonical_url: Option<&str>,
        entry_id: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let metadata = metadata_to_json(metadata)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE raw_documents SET
                   status = 'processed', error_json = NULL, metadata_json = ?1,
                   canonical_url = COALESCE(?2, canonical_url),
                   entry_id = COALESCE(?3, entry_id),
                   updated_at = ?4
                 WHERE id = ?5",
                params![metadata.as_str(), canonical_url, entry_id, now.as_str(), id],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(())
    }

    /// Terminal failure with a structured error.
    pub async fn mark_error(
        &self,
        id: &str,
        error: &DocumentError,
        metadata: &DocumentMetadata,
    ) -> Result<()> {
        self.check_writable()?;
        let error_json = serde_json::to_string(error)
            .map_err(|e| CatalogError::Storage(format!("serialize document error: {e}")))?;
        let metadata = metadata_to_json(metadata)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE raw_documents SET
                   status = 'error', error_json = ?1, metadata_json = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![error_json.as_str(), metadata.as_str(), now.as_str(), id],
            )
            .await
            .map_err(CatalogError::storage)?;
        Ok(())
    }

    /// Force matching rows back to `pending`, clearing their errors.
    /// Returns the number of rows re-queued.
    pub async fn requeue(&self, filter: RequeueFilter) -> Result<u64> {
        self.check_writable()?;
        let mut statuses = Vec::new();
        if filter.include_processed {
            statuses.push("'processed'");
        }
        if filter.include_errors {
            statuses.push("'error'");
        }
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut sql = format!(
            "UPDATE raw_documents SET status = 'pending', error_json = NULL, updated_at = ?1
             WHERE status IN ({})",
            statuses.join(", ")
        );
        if filter.only_skill_md {
            sql.push_str(" AND source_url LIKE '%/SKILL.md'");
        }
        if filter.only_missing_spec {
            sql.push_str(
                " AND (metadata_json IS NULL OR json_extract(metadata_json, '$.spec') IS NULL)",
            );
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(&sql, params![now.as_str()])
            .await
            .map_err(CatalogError::storage)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Count raw documents per status.
    pub async fn raw_status_counts(&self) -> Result<RawStatusCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM raw_documents GROUP BY status",
                params![],
            )
            .await
            .map_err(CatalogError::storage)?;

        let mut counts = RawStatusCounts::default();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            let status: String = row.get(0).map_err(CatalogError::storage)?;
            let count = row.get::<i64>(1).map_err(CatalogError::storage)?.max(0) as u64;
            match status.parse::<RawStatus>() {
                Ok(RawStatus::Pending) => counts.pending = count,
                Ok(RawStatus::Processed) => counts.processed = count,
                Ok(RawStatus::Error) => counts.error = count,
                Err(_) => tracing::warn!(%status, "unknown raw document status"),
            }
        }
        Ok(counts)
    }

    /// Count error rows per error kind, most frequent first.
    pub async fn error_kind_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(json_extract(error_json, '$.kind'), 'unknown') AS kind, COUNT(*)
                 FROM raw_documents WHERE status = 'error'
                 GROUP BY kind ORDER BY COUNT(*) DESC, kind",
                params![],
            )
            .await
            .map_err(CatalogError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            let kind: String = row.get(0).map_err(CatalogError::storage)?;
            let count = row.get::<i64>(1).map_err(CatalogError::storage)?.max(0) as u64;
            results.push((kind, count));
        }
        Ok(results)
    }

    async fn query_raw_documents(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<RawDocument>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(CatalogError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(CatalogError::storage)? {
            results.push(row_to_raw_document(&row)?);
        }
        Ok(results)
    }
}

fn metadata_to_json(metadata: &DocumentMetadata) -> Result<String> {
    serde_json::to_string(metadata)
        .map_err(|e| CatalogError::Storage(format!("serialize document metadata: {e}")))
}

/// Convert a database row to a [`RawDocument`].
fn row_to_raw_document(row: &libsql::Row) -> Result<RawDocument> {
    let status: String = row.get(6).map_err(CatalogError::storage)?;
    let error = opt_text(row, 7).and_then(|s| match serde_json::from_str::<DocumentError>(&s) {
        Ok(err) => Some(err),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed error_json");
            None
        }
    });
    let created_at: String = row.get(11).map_err(CatalogError::storage)?;
    let updated_at: String = row.get(12).map_err(CatalogError::storage)?;

    Ok(RawDocument {
        id: row.get::<String>(0).map_err(CatalogError::storage)?,
        source_id: row.get::<String>(1).map_err(CatalogError::storage)?,
        external_id: row.get::<String>(2).map_err(CatalogError::storage)?,
        source_url: row.get::<String>(3).map_err(CatalogError::storage)?,
        content: row.get::<String>(4).map_err(CatalogError::storage)?,
        content_hash: row.get::<String>(5).map_err(CatalogError::storage)?,
        status: status.parse()?,
        error,
        metadata: DocumentMetadata::from_json_lenient(opt_text(row, 8).as_deref()),
        canonical_url: opt_text(row, 9),
        entry_id: opt_text(row, 10),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use skillcatalog_shared::{
        CrawlProvenance, ErrorKind, MetadataSection, Outcome, QualityReport, SkipReason,
    };

    fn crawl(path: &str) -> CrawlProvenance {
        CrawlProvenance {
            source_id: "src".into(),
            repository: "o/r".into(),
            branch: "main".into(),
            path: path.into(),
            sha: None,
            page_url: format!("https://github.com/o/r/blob/main/{path}"),
            intent: None,
            pushed_at: None,
            fetched_at: Utc::now(),
        }
    }

    fn new_doc(url: &str, content: &str) -> NewRawDocument {
        NewRawDocument {
            source_id: "src".into(),
            external_id: url.into(),
            source_url: url.into(),
            content: content.into(),
            metadata: DocumentMetadata::from_crawl(crawl("skills/foo/SKILL.md")),
        }
    }

    async fn storage_with_source() -> Storage {
        let storage = test_storage().await;
        storage.ensure_source(&repo_source("src")).await.unwrap();
        storage
    }

    const URL: &str = "https://raw.githubusercontent.com/o/r/main/skills/foo/SKILL.md";

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn upsert_detects_transitions() {
        let storage = storage_with_source().await;

        let first = storage.upsert_raw_document(&new_doc(URL, "v1")).await.unwrap();
        assert_eq!(first.transition, RawTransition::Created);

        let doc = storage.get_raw_document(&first.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Pending);
        assert_eq!(doc.content_hash, content_hash("v1"));

        storage
            .mark_processed(&first.id, &doc.metadata, None, None)
            .await
            .unwrap();

        let same = storage.upsert_raw_document(&new_doc(URL, "v1")).await.unwrap();
        assert_eq!(same.transition, RawTransition::Unchanged);
        assert_eq!(same.id, first.id);
        let doc = storage.get_raw_document(&first.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Processed);

        let changed = storage.upsert_raw_document(&new_doc(URL, "v2")).await.unwrap();
        assert_eq!(changed.transition, RawTransition::ContentChanged);
        let doc = storage.get_raw_document(&first.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Pending);
        assert_eq!(doc.content, "v2");
    }

    #[tokio::test]
    async fn content_change_clears_error_and_validation_sections() {
        let storage = storage_with_source().await;
        let up = storage.upsert_raw_document(&new_doc(URL, "v1")).await.unwrap();

        let mut meta = DocumentMetadata::from_crawl(crawl("skills/foo/SKILL.md"));
        meta.merge(MetadataSection::Quality(QualityReport {
            ok: true,
            score: 80,
            errors: vec![],
            warnings: vec![],
        }));
        storage
            .mark_error(&up.id, &DocumentError::new(ErrorKind::Security, "blocked"), &meta)
            .await
            .unwrap();
        let doc = storage.get_raw_document(&up.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Error);
        assert_eq!(doc.error.as_ref().map(|e| e.kind), Some(ErrorKind::Security));

        storage.upsert_raw_document(&new_doc(URL, "v2")).await.unwrap();
        let doc = storage.get_raw_document(&up.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Pending);
        assert!(doc.error.is_none());
        assert!(doc.metadata.quality.is_none());
        assert!(doc.metadata.crawl.is_some());
    }

    #[tokio::test]
    async fn pending_is_oldest_first_and_bounded() {
        let storage = storage_with_source().await;
        for i in 0..5 {
            let url = format!("https://raw.githubusercontent.com/o/r/main/skills/s{i}/SKILL.md");
            storage
                .upsert_raw_document(&new_doc(&url, &format!("doc {i}")))
                .await
                .unwrap();
        }
        let batch = storage.list_pending(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].content, "doc 0");
        assert_eq!(batch[2].content, "doc 2");
    }

    #[tokio::test]
    async fn mark_processed_records_outcome_and_links() {
        let storage = storage_with_source().await;
        let up = storage.upsert_raw_document(&new_doc(URL, "v1")).await.unwrap();
        let mut meta = DocumentMetadata::default();
        meta.merge(MetadataSection::Outcome(Outcome::Skipped {
            reason: SkipReason::NonCanonicalLayout,
            detail: None,
        }));
        let canonical = "https://github.com/o/r/blob/main/skills/foo/SKILL.md";
        storage
            .mark_processed(&up.id, &meta, Some(canonical), Some("entry-1"))
            .await
            .unwrap();

        let doc = storage.get_raw_document(&up.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Processed);
        assert_eq!(doc.canonical_url.as_deref(), Some(canonical));
        assert_eq!(doc.entry_id.as_deref(), Some("entry-1"));
        assert_eq!(doc.metadata, meta);

        let by_entry = storage
            .raw_documents_for_entry("entry-1", "unused")
            .await
            .unwrap();
        assert_eq!(by_entry.len(), 1);
    }

    #[tokio::test]
    async fn requeue_respects_filters() {
        let storage = storage_with_source().await;
        let skill = storage.upsert_raw_document(&new_doc(URL, "a")).await.unwrap();
        let readme = storage
            .upsert_raw_document(&new_doc(
                "https://raw.githubusercontent.com/o/r/main/README.md",
                "b",
            ))
            .await
            .unwrap();
        let empty = DocumentMetadata::default();
        storage.mark_processed(&skill.id, &empty, None, None).await.unwrap();
        storage
            .mark_error(&readme.id, &DocumentError::new(ErrorKind::Exception, "boom"), &empty)
            .await
            .unwrap();

        let only_skill = RequeueFilter {
            only_skill_md: true,
            ..RequeueFilter::default()
        };
        assert_eq!(storage.requeue(only_skill).await.unwrap(), 1);
        let counts = storage.raw_status_counts().await.unwrap();
        assert_eq!(counts, RawStatusCounts { pending: 1, processed: 0, error: 1 });

        let kinds = storage.error_kind_counts().await.unwrap();
        assert_eq!(kinds, vec![("exception".to_string(), 1)]);

        let errors_only = RequeueFilter {
            include_processed: false,
            ..RequeueFilter::default()
        };
        assert_eq!(storage.requeue(errors_only).await.unwrap(), 1);
        let doc = storage.get_raw_document(&readme.id).await.unwrap().unwrap();
        assert_eq!(doc.status, RawStatus::Pending);
        assert!(doc.error.is_none());
    }

    #[tokio::test]
    async fn requeue_missing_spec_skips_validated_rows() {
        let storage = storage_with_source().await;
        let up = storage.upsert_raw_document(&new_doc(URL, "a")).await.unwrap();
        let mut meta = DocumentMetadata::default();
        meta.merge(MetadataSection::Spec(skillcatalog_shared::SpecReport {
            ok: true,
            profile: Default::default(),
            errors: vec![],
            warnings: vec![],
            normalized: serde_json::Map::new(),
            derived_name: Some("foo".into()),
            derived_description: None,
        }));
        storage.mark_processed(&up.id, &meta, None, None).await.unwrap();

        let filter = RequeueFilter {
            only_missing_spec: true,
            ..RequeueFilter::default()
        };
        assert_eq!(storage.requeue(filter).await.unwrap(), 0);
    }
}
