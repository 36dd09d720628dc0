//! Frontmatter extraction for skill documents.
//!
//! A document may start with a `---` line, a YAML block, and a closing `---`
//! line. The block is parsed into a JSON object so downstream validators can
//! work with one value model. Parse failures never lose the body.

use serde_json::{Map, Value};
use tracing::debug;

/// Why a present frontmatter block could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrontmatterError {
    /// The block is not valid YAML.
    #[error("invalid YAML frontmatter: {0}")]
    InvalidYaml(String),

    /// The block parsed, but to a scalar or sequence instead of a mapping.
    #[error("frontmatter is not a mapping")]
    NotMapping,
}

impl FrontmatterError {
    /// Stable validation code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidYaml(_) => "frontmatter_invalid_yaml",
            Self::NotMapping => "frontmatter_not_mapping",
        }
    }
}

/// A skill document split into frontmatter metadata and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// Frontmatter fields; empty when absent or unusable.
    pub metadata: Map<String, Value>,
    /// Markdown body with the frontmatter block removed, trimmed.
    pub body: String,
    /// Text between the delimiters, if a block was found.
    pub frontmatter_raw: Option<String>,
    pub frontmatter_error: Option<FrontmatterError>,
}

impl ParsedDocument {
    /// Whether a non-empty, usable frontmatter block was found.
    pub fn has_frontmatter(&self) -> bool {
        self.frontmatter_raw
            .as_deref()
            .is_some_and(|raw| !raw.trim().is_empty())
    }

    /// Trimmed string value of a frontmatter field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Split raw document text into frontmatter and body.
pub fn parse_document(content: &str) -> ParsedDocument {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let Some((raw, body)) = split_frontmatter(content) else {
        return ParsedDocument {
            body: content.trim().to_string(),
            ..ParsedDocument::default()
        };
    };

    let body = body.trim().to_string();
    let frontmatter_raw = Some(raw.to_string());

    match parse_block(raw) {
        Ok(mut metadata) => {
            normalize_tags(&mut metadata);
            ParsedDocument {
                metadata,
                body,
                frontmatter_raw,
                frontmatter_error: None,
            }
        }
        Err(err) => {
            debug!(error = %err, "frontmatter unusable, keeping body");
            ParsedDocument {
                metadata: Map::new(),
                body,
                frontmatter_raw,
                frontmatter_error: Some(err),
            }
        }
    }
}

/// Locate the leading delimited block. Returns `(block, rest)`.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim_end() == "---" {
            let block = &content[block_start..offset];
            let rest = &content[offset + line.len()..];
            return Some((block.trim_end_matches(['\r', '\n']), rest));
        }
        offset += line.len();
    }
    None
}

fn parse_block(raw: &str) -> Result<Map<String, Value>, FrontmatterError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;
    match yaml_to_json(yaml) {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(FrontmatterError::NotMapping),
    }
}

/// Convert YAML into JSON, stringifying non-string mapping keys.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Y::Mapping(mapping) => {
            let mut map = Map::new();
            for (k, v) in mapping {
                let key = match k {
                    Y::String(s) => s,
                    Y::Bool(b) => b.to_string(),
                    Y::Number(n) => n.to_string(),
                    Y::Null => "null".to_string(),
                    // Complex keys have no sensible JSON form.
                    _ => continue,
                };
                map.insert(key, yaml_to_json(v));
            }
            Value::Object(map)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// `tags: a, b` becomes `tags: ["a", "b"]`.
fn normalize_tags(metadata: &mut Map<String, Value>) {
    if let Some(Value::String(raw)) = metadata.get("tags") {
        let tags: Vec<Value> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Value::String(t.to_string()))
            .collect();
        metadata.insert("tags".into(), Value::Array(tags));
    }
}
