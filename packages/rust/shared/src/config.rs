//! Application configuration for SkillCatalog.
//!
//! User config lives at `~/.skillcatalog/skillcatalog.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored here: the config only names the environment
//! variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::policy::RuntimePolicy;
use crate::types::{IntentTier, SearchMode, SourceKind};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "skillcatalog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".skillcatalog";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "skillcatalog.db";

// ---------------------------------------------------------------------------
// Config structs (matching skillcatalog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Code-hosting API settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Optional model classification service.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Worker batch sizes and HTTP budgets.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Default runtime policy (overridden by the stored policy).
    #[serde(default)]
    pub policy: RuntimePolicy,

    /// Extra crawl sources appended to the built-in registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path. Defaults to `~/.skillcatalog/skillcatalog.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Raw content base URL.
    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Browsable web base URL used for canonical page URLs.
    #[serde(default = "default_web_base")]
    pub web_base: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            web_base: default_web_base(),
            token_env: default_token_env(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_web_base() -> String {
    "https://github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_http_timeout() -> u64 {
    20
}

/// `[classifier]` section. An empty `endpoint` disables the model stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible base URL (`/chat/completions` is appended).
    #[serde(default)]
    pub endpoint: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_classifier_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key_env: default_classifier_key_env(),
            model: default_classifier_model(),
            temperature: default_temperature(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_classifier_key_env() -> String {
    "SKILLCATALOG_CLASSIFIER_KEY".into()
}
fn default_classifier_model() -> String {
    "glm-4".into()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_classifier_timeout() -> u64 {
    30
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Pending documents pulled per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum batches drained per cycle.
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,

    /// Rows touched per backfill pass.
    #[serde(default = "default_backfill_batch_size")]
    pub backfill_batch_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batches: default_max_batches(),
            backfill_batch_size: default_backfill_batch_size(),
        }
    }
}

fn default_batch_size() -> u32 {
    50
}
fn default_max_batches() -> u32 {
    20
}
fn default_backfill_batch_size() -> u32 {
    100
}

/// `[[sources]]` entry — an extra crawl source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier (deduplicated against built-in sources).
    pub id: String,

    /// Display name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub kind: SourceKind,

    /// `owner/repo` for repository sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Root page for web-directory sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Queries for keyword-search sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,

    #[serde(default)]
    pub search_mode: SearchMode,

    #[serde(default = "default_true")]
    pub is_active: bool,

    // Per-source policy overrides; unset fields use the kind's defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_path_globs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tier: Option<IntentTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_repos: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sitemap_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_token: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Resolve the GitHub token from its env var, if set and non-empty.
    pub fn github_token(&self) -> Option<String> {
        read_secret(&self.github.token_env)
    }

    /// Resolve the classifier API key from its env var, if set and non-empty.
    pub fn classifier_api_key(&self) -> Option<String> {
        read_secret(&self.classifier.api_key_env)
    }

    /// Whether the model classification stage is configured.
    pub fn classifier_enabled(&self) -> bool {
        !self.classifier.endpoint.trim().is_empty()
    }

    /// Resolve the database path (config value or default location).
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(p) if !p.trim().is_empty() => Ok(expand_home(p)),
            _ => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
        }
    }
}

fn read_secret(var_name: &str) -> Option<String> {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.skillcatalog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.skillcatalog/skillcatalog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
