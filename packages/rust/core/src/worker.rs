//! Per-document state machine: pending → processed | error.
//!
//! Each pending document is gated, validated, scanned, scored, and either
//! published into the catalog, skipped with a recorded reason, or failed
//! with a structured error. The row is written before the next document is
//! touched.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use skillcatalog_markdown::parse_document;
use skillcatalog_shared::{
    DocumentError, DocumentMetadata, ErrorKind, MetadataSection, Outcome, RawDocument, Result,
    RuntimePolicy, SkipReason, ValidationProfile,
};
use skillcatalog_storage::Storage;

use crate::canonical::{canonicalize_url, is_canonical_url, is_skill_document_url};
use crate::pipeline::ProgressReporter;
use crate::security::{ModelClient, ScanInput, SecurityScanner};
use crate::taxonomy::frontmatter_tags;
use crate::trust::{TrustInputs, compute_trust};
use crate::upsert::{CatalogWriter, EntryDraft};
use crate::validate::{validate_quality, validate_spec};

/// Terminal result of one document pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Published { entry_id: String, created: bool },
    Skipped(SkipReason),
    Failed(ErrorKind),
}

/// Counters for one or more batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub fetched: usize,
    pub published: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Rows whose final status could not be written; they stay pending.
    pub write_failures: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Published { created, .. } => {
                self.published += 1;
                if *created {
                    self.created += 1;
                }
            }
            DocumentOutcome::Skipped(_) => self.skipped += 1,
            DocumentOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn absorb(&mut self, other: &BatchReport) {
        self.batches += other.batches;
        self.fetched += other.fetched;
        self.published += other.published;
        self.created += other.created;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.write_failures += other.write_failures;
    }

    /// Rows that reached a terminal status.
    pub fn settled(&self) -> usize {
        self.published + self.skipped + self.failed
    }
}

enum Disposition {
    Skip {
        reason: SkipReason,
        detail: Option<String>,
    },
    Reject(DocumentError),
    Publish {
        entry_id: String,
        canonical_url: String,
        created: bool,
    },
}

/// Processes pending raw documents under one runtime policy.
pub struct Worker<'a> {
    storage: &'a Storage,
    model: Option<&'a ModelClient>,
    policy: RuntimePolicy,
}

impl<'a> Worker<'a> {
    pub fn new(storage: &'a Storage, model: Option<&'a ModelClient>, policy: RuntimePolicy) -> Self {
        Self {
            storage,
            model,
            policy,
        }
    }

    pub fn policy(&self) -> &RuntimePolicy {
        &self.policy
    }

    /// Run one document to a terminal status and persist it.
    ///
    /// Only a failure to write the final status is returned as an error.
    #[instrument(skip_all, fields(id = %doc.id, url = %doc.source_url))]
    pub async fn process_document(&self, doc: &RawDocument) -> Result<DocumentOutcome> {
        let mut meta = doc.metadata.clone();
        meta.reset_validation();

        let disposition = match self.evaluate(doc, &mut meta).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "document processing failed");
                Disposition::Reject(DocumentError::new(ErrorKind::Exception, e.to_string()))
            }
        };

        match disposition {
            Disposition::Skip { reason, detail } => {
                debug!(reason = reason.as_str(), "document skipped");
                meta.merge(MetadataSection::Outcome(Outcome::Skipped { reason, detail }));
                self.storage
                    .mark_processed(&doc.id, &meta, None, None)
                    .await?;
                Ok(DocumentOutcome::Skipped(reason))
            }
            Disposition::Reject(error) => {
                let kind = error.kind;
                info!(kind = %kind, message = %error.message, "document rejected");
                self.storage.mark_error(&doc.id, &error, &meta).await?;
                Ok(DocumentOutcome::Failed(kind))
            }
            Disposition::Publish {
                entry_id,
                canonical_url,
                created,
            } => {
                meta.merge(MetadataSection::Outcome(Outcome::Published {
                    entry_id: entry_id.clone(),
                    canonical_url: canonical_url.clone(),
                    created,
                }));
                self.storage
                    .mark_processed(
                        &doc.id,
                        &meta,
                        Some(canonical_url.as_str()),
                        Some(entry_id.as_str()),
                    )
                    .await?;
                Ok(DocumentOutcome::Published { entry_id, created })
            }
        }
    }

    async fn evaluate(&self, doc: &RawDocument, meta: &mut DocumentMetadata) -> Result<Disposition> {
        let policy = &self.policy;

        if !is_skill_document_url(&doc.source_url) {
            return Ok(skip(SkipReason::NotSkillDocument, None));
        }

        let crawl = meta.crawl.clone();
        let Some(intent) = crawl.as_ref().and_then(|c| c.intent.as_ref()) else {
            return Ok(skip(SkipReason::RepoIntentUnknown, None));
        };
        if intent.canonical_files == 0
            || intent.tier < policy.min_repo_tier
            || intent.score < policy.min_intent_score
        {
            return Ok(skip(
                SkipReason::UntrustedRepository,
                Some(format!(
                    "tier {} score {} canonical files {}",
                    intent.tier, intent.score, intent.canonical_files
                )),
            ));
        }

        let canonical_url = crawl
            .as_ref()
            .map(|c| c.page_url.trim())
            .filter(|u| !u.is_empty())
            .map_or_else(|| canonicalize_url(&doc.source_url), String::from);
        if !is_canonical_url(&canonical_url) {
            return Ok(skip(SkipReason::NonCanonicalLayout, Some(canonical_url)));
        }

        let parsed = parse_document(&doc.content);
        let spec = validate_spec(&parsed, &canonical_url, policy.validation_profile);
        let quality = validate_quality(&parsed);
        meta.merge(MetadataSection::Spec(spec.clone()));
        meta.merge(MetadataSection::Quality(quality.clone()));

        let name = spec.derived_name.clone().unwrap_or_else(|| "skill".into());
        let description = spec.derived_description.clone().unwrap_or_default();

        let security = if policy.security_scan_enabled {
            let scanner = SecurityScanner::new(
                self.model,
                policy.classifier_mode,
                policy.confidence_threshold,
            );
            let decision = scanner
                .scan(&ScanInput {
                    name: &name,
                    description: &description,
                    body: &doc.content,
                    url: &canonical_url,
                })
                .await;
            meta.merge(MetadataSection::Security(decision.clone()));
            Some(decision)
        } else {
            None
        };

        if let Some(decision) = security.as_ref().filter(|d| d.block) {
            if policy.security_enforce {
                let error = DocumentError::new(
                    ErrorKind::Security,
                    format!("blocked by security scan (severity {})", decision.severity),
                )
                .with_details(json!({
                    "severity": decision.severity,
                    "confidence": decision.confidence,
                    "reasons": decision.reasons,
                    "indicators": decision.indicators,
                    "provider": decision.provider,
                }));
                return Ok(Disposition::Reject(error));
            }
        }

        if policy.enforce_spec && policy.validation_profile == ValidationProfile::Strict && !spec.ok {
            let error = DocumentError::new(
                ErrorKind::Spec,
                format!("spec validation failed: {}", spec.errors.join(", ")),
            )
            .with_details(json!({ "errors": spec.errors, "warnings": spec.warnings }));
            return Ok(Disposition::Reject(error));
        }

        if policy.quality_enforce && !quality.ok {
            let error = DocumentError::new(
                ErrorKind::Quality,
                format!("quality validation failed: {}", quality.errors.join(", ")),
            )
            .with_details(json!({ "score": quality.score, "errors": quality.errors }));
            return Ok(Disposition::Reject(error));
        }

        let upstream_updated_at = crawl.as_ref().and_then(|c| c.pushed_at);
        let trust = compute_trust(
            &TrustInputs {
                quality_score: Some(quality.score),
                security: security.as_ref(),
                is_verified: true,
                is_official: true,
                upstream_updated_at,
            },
            Utc::now(),
        );

        let draft = EntryDraft {
            canonical_url: canonical_url.clone(),
            source_id: doc.source_id.clone(),
            name,
            description,
            content: parsed.body.clone(),
            category: parsed.str_field("category").map(String::from),
            tags: frontmatter_tags(&parsed.metadata),
            spec: Some(Value::Object(spec.normalized.clone())),
            quality_score: Some(quality.score),
            trust: Some(trust),
            upstream_updated_at,
        };
        let outcome = CatalogWriter::new(self.storage).upsert(&draft).await?;

        Ok(Disposition::Publish {
            entry_id: outcome.entry_id,
            canonical_url,
            created: outcome.created,
        })
    }

    /// Process up to `limit` pending documents, oldest first.
    #[instrument(skip_all, fields(limit))]
    pub async fn process_batch(
        &self,
        limit: u32,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let pending = self.storage.list_pending(limit).await?;
        let mut report = BatchReport {
            batches: 1,
            fetched: pending.len(),
            ..BatchReport::default()
        };

        for (i, doc) in pending.iter().enumerate() {
            match self.process_document(doc).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "could not record document status");
                    report.write_failures += 1;
                }
            }
            progress.document_processed(i + 1, pending.len());
        }

        debug!(
            fetched = report.fetched,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    /// Repeat batches until nothing is pending, a batch makes no progress,
    /// or `max_batches` is reached.
    #[instrument(skip_all, fields(batch_size, max_batches))]
    pub async fn drain(
        &self,
        batch_size: u32,
        max_batches: u32,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let mut total = BatchReport::default();
        for _ in 0..max_batches.max(1) {
            let batch = self.process_batch(batch_size.max(1), progress).await?;
            let done = batch.fetched == 0 || batch.settled() == 0;
            total.absorb(&batch);
            if done || batch.fetched < batch_size as usize {
                break;
            }
        }
        info!(
            batches = total.batches,
            published = total.published,
            skipped = total.skipped,
            failed = total.failed,
            "drain finished"
        );
        Ok(total)
    }
}

fn skip(reason: SkipReason, detail: Option<String>) -> Disposition {
    Disposition::Skip { reason, detail }
}
