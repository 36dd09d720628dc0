//! Catch-up passes that fill derived fields on existing catalog entries.
//!
//! Every pass selects at most `limit` entries missing one field, fills it,
//! and does nothing once the catalog has converged.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use skillcatalog_markdown::parse_document;
use skillcatalog_shared::{CatalogEntry, RawDocument, Result, ValidationProfile};
use skillcatalog_storage::{EntryGap, Storage};

use crate::security::ModelClient;
use crate::taxonomy::{FALLBACK_CATEGORY, frontmatter_tags, resolve_tags};
use crate::trust::{TrustInputs, compute_trust};
use crate::upsert::CatalogWriter;
use crate::validate::validate_spec;

/// Entries touched by each pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub source_links: usize,
    pub tags: usize,
    pub spec: usize,
    pub trust: usize,
    pub summaries: usize,
}

impl BackfillReport {
    pub fn total(&self) -> usize {
        self.source_links + self.tags + self.spec + self.trust + self.summaries
    }
}

pub struct Backfiller<'a> {
    storage: &'a Storage,
    model: Option<&'a ModelClient>,
    limit: u32,
}

impl<'a> Backfiller<'a> {
    pub fn new(storage: &'a Storage, model: Option<&'a ModelClient>, limit: u32) -> Self {
        Self {
            storage,
            model,
            limit: limit.max(1),
        }
    }

    /// Run every pass. A failing pass is logged and the others still run.
    #[instrument(skip_all, fields(limit = self.limit))]
    pub async fn run(&self) -> BackfillReport {
        let report = BackfillReport {
            source_links: settle("source_links", self.source_links().await),
            tags: settle("tags", self.tags().await),
            spec: settle("spec", self.spec().await),
            trust: settle("trust", self.trust().await),
            summaries: settle("summaries", self.summaries().await),
        };
        if report.total() > 0 {
            info!(
                source_links = report.source_links,
                tags = report.tags,
                spec = report.spec,
                trust = report.trust,
                summaries = report.summaries,
                "backfill finished"
            );
        }
        report
    }

    /// Link entries with no source link back to the source that crawled them.
    pub async fn source_links(&self) -> Result<usize> {
        let writer = CatalogWriter::new(self.storage);
        let mut filled = 0;
        for entry in self.storage.entries_with_gap(EntryGap::SourceLink, self.limit).await? {
            let Some(raw) = self.latest_raw(&entry).await? else {
                debug!(entry = %entry.id, "no raw document to link");
                continue;
            };
            let source_id = raw
                .metadata
                .crawl
                .as_ref()
                .map_or(raw.source_id.as_str(), |c| c.source_id.as_str());
            if writer.link_source(&entry.id, source_id, &entry.url).await? {
                filled += 1;
            }
        }
        Ok(filled)
    }

    pub async fn tags(&self) -> Result<usize> {
        let writer = CatalogWriter::new(self.storage);
        let mut filled = 0;
        for entry in self.storage.entries_with_gap(EntryGap::Tags, self.limit).await? {
            let explicit = match self.latest_raw(&entry).await? {
                Some(raw) => frontmatter_tags(&parse_document(&raw.content).metadata),
                None => Vec::new(),
            };
            let category = match entry.category_id.as_deref() {
                Some(id) => self.storage.category_slug(id).await?,
                None => None,
            }
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

            let tags = resolve_tags(&explicit, &entry.name, &entry.description, &category);
            if writer.attach_tag_pairs(&entry.id, &tags).await? > 0 {
                filled += 1;
            }
        }
        Ok(filled)
    }

    /// Re-validate entries that predate spec storage, leniently.
    pub async fn spec(&self) -> Result<usize> {
        let mut filled = 0;
        for mut entry in self.storage.entries_with_gap(EntryGap::Spec, self.limit).await? {
            // Entries without raw text are validated from their stored body.
            let parsed = match self.latest_raw(&entry).await? {
                Some(raw) => parse_document(&raw.content),
                None => parse_document(&entry.content),
            };
            let report = validate_spec(&parsed, &entry.url, ValidationProfile::Lax);
            entry.spec = Some(Value::Object(report.normalized));
            self.storage.update_entry(&entry).await?;
            filled += 1;
        }
        Ok(filled)
    }

    pub async fn trust(&self) -> Result<usize> {
        let mut filled = 0;
        for mut entry in self.storage.entries_with_gap(EntryGap::Trust, self.limit).await? {
            let raw = self.latest_raw(&entry).await?;
            let meta = raw.as_ref().map(|r| &r.metadata);

            let quality_score = meta
                .and_then(|m| m.quality.as_ref())
                .map(|q| q.score)
                .or_else(|| entry.quality_score.map(|q| q.round().clamp(0.0, 100.0) as u8));
            let upstream_updated_at = meta
                .and_then(|m| m.crawl.as_ref())
                .and_then(|c| c.pushed_at)
                .or(entry.upstream_updated_at);

            let profile = compute_trust(
                &TrustInputs {
                    quality_score,
                    security: meta.and_then(|m| m.security.as_ref()),
                    is_verified: entry.is_verified,
                    is_official: entry.is_official,
                    upstream_updated_at,
                },
                Utc::now(),
            );
            entry.trust_score = Some(profile.score);
            entry.trust_level = Some(profile.level);
            entry.trust_flags = profile.flags;
            self.storage.update_entry(&entry).await?;
            filled += 1;
        }
        Ok(filled)
    }

    /// Model-written summaries. An unreachable service stops the pass; an
    /// unusable reply only skips its entry.
    pub async fn summaries(&self) -> Result<usize> {
        let Some(model) = self.model else {
            return Ok(0);
        };
        let mut filled = 0;
        for mut entry in self.storage.entries_with_gap(EntryGap::Summary, self.limit).await? {
            let summary = match model
                .summarize(&entry.name, &entry.description, &entry.content)
                .await
            {
                Ok(Some(summary)) => summary,
                Ok(None) => {
                    debug!(entry = %entry.id, "no usable summary");
                    continue;
                }
                Err(e) => {
                    warn!(entry = %entry.id, error = %e, "summary service failed, stopping pass");
                    break;
                }
            };
            entry.summary = Some(summary);
            self.storage.update_entry(&entry).await?;
            filled += 1;
        }
        Ok(filled)
    }

    async fn latest_raw(&self, entry: &CatalogEntry) -> Result<Option<RawDocument>> {
        let mut docs = self
            .storage
            .raw_documents_for_entry(&entry.id, &entry.url)
            .await?;
        Ok(if docs.is_empty() {
            None
        } else {
            Some(docs.swap_remove(0))
        })
    }
}

fn settle(pass: &str, result: Result<usize>) -> usize {
    result.unwrap_or_else(|e| {
        warn!(pass, error = %e, "backfill pass failed");
        0
    })
}
