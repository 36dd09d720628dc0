//! Shared types, error model, and configuration for SkillCatalog.
//!
//! This crate is the foundation depended on by all other SkillCatalog crates.
//! It provides:
//! - [`CatalogError`] — the unified error type
//! - Domain types ([`RawDocument`], [`CatalogEntry`], [`RepoIntent`], …)
//! - Typed document metadata ([`DocumentMetadata`]) merged by section
//! - Runtime policy ([`RuntimePolicy`]) and worker heartbeat ([`WorkerStatus`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod status;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, DatabaseConfig, GithubConfig, SourceConfig, WorkerConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{CatalogError, Result};
pub use metadata::{
    CrawlProvenance, DocumentMetadata, MetadataSection, Outcome, QualityReport, SecurityDecision,
    SkipReason, SpecReport,
};
pub use policy::{PolicyPatch, RUNTIME_POLICY_KEY, RuntimePolicy};
pub use status::{
    EventLevel, IngestProgress, MAX_RECENT_EVENTS, WORKER_STATUS_KEY, WorkerEvent, WorkerPhase,
    WorkerStatus,
};
pub use types::{
    CatalogEntry, ClassifierMode, DocumentError, ErrorKind, IntentTier, RawDocument, RawStatus,
    RawTransition, RepoIntent, SearchMode, Severity, Source, SourceKind, Taxon, TrustLevel,
    ValidationProfile,
};
