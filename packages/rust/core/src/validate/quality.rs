//! Quality scoring of skill documents.
//!
//! Every finding is advisory: it lowers the score but never fails the
//! document, so `ok` is true unless a finding is ever classified as an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use skillcatalog_markdown::{ParsedDocument, first_paragraph, line_count};
use skillcatalog_shared::QualityReport;

use super::spec::MAX_BODY_LINES;

const ALLOWED_MODELS: &[&str] = &["haiku", "sonnet", "opus", "inherit"];
const TOOL_FIELDS: &[&str] = &["allowed-tools", "allowed_tools", "tools"];

const MIN_DESCRIPTION_CHARS: usize = 20;
const MAX_DESCRIPTION_CHARS: usize = 1024;

static MULTILINE_DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*description\s*:\s*[>|]").expect("valid regex"));

/// Score a parsed document.
pub fn validate_quality(doc: &ParsedDocument) -> QualityReport {
    let errors: Vec<String> = Vec::new();
    let mut warnings = Vec::new();
    let mut score: i32 = 100;
    let mut deduct = |code: String, points: i32| {
        warnings.push(code);
        score -= points;
    };

    if let Some(err) = &doc.frontmatter_error {
        deduct(err.code().to_string(), 0);
    }

    if doc.metadata.is_empty() {
        deduct("missing_frontmatter".into(), 5);
    }

    if doc
        .frontmatter_raw
        .as_deref()
        .is_some_and(|raw| MULTILINE_DESCRIPTION_RE.is_match(raw))
    {
        deduct("description_multiline_yaml_not_supported".into(), 10);
    }

    let description = doc
        .str_field("description")
        .or_else(|| doc.str_field("summary"))
        .map(String::from)
        .or_else(|| {
            let fallback = first_paragraph(&doc.body);
            if fallback.is_some() {
                deduct("description_missing_used_body_fallback".into(), 0);
            }
            fallback
        });

    match description {
        None => deduct("missing_description".into(), 15),
        Some(desc) => {
            let chars = desc.chars().count();
            if chars < MIN_DESCRIPTION_CHARS {
                deduct("description_too_short".into(), 10);
            }
            if chars > MAX_DESCRIPTION_CHARS {
                deduct("description_too_long".into(), 5);
            }
        }
    }

    for key in TOOL_FIELDS {
        if let Some(value) = doc.metadata.get(*key) {
            if !matches!(value, Value::String(_) | Value::Array(_)) {
                deduct(format!("{}_must_be_string_or_list", key.replace('-', "_")), 10);
            }
        }
    }

    if let Some(model) = doc.str_field("model") {
        if !is_allowed_model(model) {
            deduct("invalid_model".into(), 5);
        }
    }

    if line_count(&doc.body) > MAX_BODY_LINES {
        deduct("body_too_long".into(), 10);
    }

    QualityReport {
        ok: errors.is_empty(),
        score: score.clamp(0, 100) as u8,
        errors,
        warnings,
    }
}

fn is_allowed_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    ALLOWED_MODELS.contains(&lower.as_str()) || lower.starts_with("claude-")
}
