//! Frontmatter conformance against the skill document format.
//!
//! Strict and lax run the same checks. Strict only promotes some warnings
//! to errors.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use skillcatalog_markdown::{ParsedDocument, first_paragraph, line_count};
use skillcatalog_shared::{SpecReport, ValidationProfile};

/// Value `context` must take when present.
pub const CONTEXT_FORK: &str = "fork";

/// Bodies longer than this draw a warning.
pub const MAX_BODY_LINES: usize = 500;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]{1,64}$").expect("valid regex"));

/// Fields defined by the format, plus catalog fields publishers commonly add.
const KNOWN_FIELDS: &[&str] = &[
    "name",
    "description",
    "argument-hint",
    "disable-model-invocation",
    "user-invocable",
    "allowed-tools",
    "model",
    "context",
    "agent",
    "hooks",
    "tags",
    "category",
    "license",
    "version",
    "metadata",
];

/// Collects findings, routing promotable ones by profile.
struct Findings {
    profile: ValidationProfile,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Findings {
    fn warn(&mut self, code: &str) {
        self.warnings.push(code.to_string());
    }

    /// Error under strict, warning under lax.
    fn promotable(&mut self, code: &str) {
        match self.profile {
            ValidationProfile::Strict => self.errors.push(code.to_string()),
            ValidationProfile::Lax => self.warnings.push(code.to_string()),
        }
    }
}

/// Validate a parsed document found at `canonical_url`.
pub fn validate_spec(
    doc: &ParsedDocument,
    canonical_url: &str,
    profile: ValidationProfile,
) -> SpecReport {
    let mut f = Findings {
        profile,
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    let mut normalized = Map::new();
    let meta = &doc.metadata;

    if let Some(err) = &doc.frontmatter_error {
        f.promotable(err.code());
    }
    if !doc.has_frontmatter() {
        f.warn("missing_frontmatter");
    }

    let mut unknown: Vec<String> = meta
        .keys()
        .filter(|k| !KNOWN_FIELDS.contains(&k.as_str()))
        .cloned()
        .collect();
    unknown.sort();
    if !unknown.is_empty() {
        if profile == ValidationProfile::Strict {
            f.warn("unknown_frontmatter_fields");
        }
        normalized.insert(
            "unknown_fields".into(),
            Value::Array(unknown.into_iter().map(Value::String).collect()),
        );
    }

    // Name
    let name = as_str(meta.get("name"));
    if let Some(name) = name {
        if !NAME_RE.is_match(name) {
            f.promotable("invalid_name_format");
        }
    }
    let derived_name = name
        .map(String::from)
        .or_else(|| derive_name_from_url(canonical_url));

    // Description
    let description = as_str(meta.get("description"));
    let derived_description = description
        .map(String::from)
        .or_else(|| first_paragraph(&doc.body));
    if description.is_none() && derived_description.is_some() {
        f.warn("description_missing_used_body_fallback");
    }
    if derived_description.is_none() {
        f.warn("missing_description");
    }

    if let Some(hint) = as_str(meta.get("argument-hint")) {
        normalized.insert("argument-hint".into(), Value::String(hint.into()));
    }

    // Booleans
    for (key, code, default) in [
        (
            "disable-model-invocation",
            "disable_model_invocation_must_be_bool",
            false,
        ),
        ("user-invocable", "user_invocable_must_be_bool", true),
    ] {
        match meta.get(key) {
            None => {
                normalized.insert(key.into(), Value::Bool(default));
            }
            Some(v) => match as_bool(v) {
                Some(b) => {
                    normalized.insert(key.into(), Value::Bool(b));
                }
                None => f.promotable(code),
            },
        }
    }

    // Tools
    if let Some(raw) = meta.get("allowed-tools") {
        match normalize_allowed_tools(raw) {
            Ok(tools) => {
                if tools.is_empty() {
                    f.warn("allowed_tools_empty");
                }
                normalized.insert(
                    "allowed-tools".into(),
                    Value::Array(tools.into_iter().map(Value::String).collect()),
                );
            }
            Err(code) => f.promotable(code),
        }
    }

    if let Some(model) = as_str(meta.get("model")) {
        normalized.insert("model".into(), Value::String(model.into()));
    }

    let context = as_str(meta.get("context"));
    if let Some(context) = context {
        normalized.insert("context".into(), Value::String(context.into()));
        if context != CONTEXT_FORK {
            f.promotable("context_must_be_fork_if_present");
        }
    }

    if let Some(agent) = as_str(meta.get("agent")) {
        normalized.insert("agent".into(), Value::String(agent.into()));
        if context != Some(CONTEXT_FORK) {
            f.warn("agent_requires_context_fork");
        }
    }

    match meta.get("hooks") {
        None | Some(Value::Null) => {}
        Some(hooks @ Value::Object(_)) => {
            normalized.insert("hooks".into(), hooks.clone());
        }
        Some(_) => f.promotable("hooks_must_be_mapping"),
    }

    if line_count(&doc.body) > MAX_BODY_LINES {
        f.warn("body_too_long");
    }

    SpecReport {
        ok: f.errors.is_empty(),
        profile,
        errors: f.errors,
        warnings: f.warnings,
        normalized,
        derived_name,
        derived_description,
    }
}

fn as_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Lenient boolean: YAML booleans, yes/no style strings, and 0/1.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Comma string or list, trimmed and deduplicated in order.
fn normalize_allowed_tools(value: &Value) -> Result<Vec<String>, &'static str> {
    let items: Vec<String> = match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        Value::Array(list) => {
            let mut items = Vec::with_capacity(list.len());
            for item in list {
                match item.as_str().map(str::trim) {
                    Some(t) if !t.is_empty() => items.push(t.to_string()),
                    _ => return Err("allowed_tools_list_must_contain_strings"),
                }
            }
            items
        }
        _ => return Err("allowed_tools_must_be_string_or_list"),
    };

    let mut seen = HashSet::new();
    Ok(items
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect())
}

/// Skill directory segment of a canonical URL: the segment after the last `skills`.
pub fn derive_name_from_url(canonical_url: &str) -> Option<String> {
    let path = url::Url::parse(canonical_url).ok()?.path().to_string();
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    // /{owner}/{repo}/blob/{branch}/skills/{name}/SKILL.md at minimum
    if parts.len() < 7 {
        return None;
    }
    let idx = parts
        .iter()
        .rposition(|p| p.eq_ignore_ascii_case("skills"))?;
    parts
        .get(idx + 1)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
