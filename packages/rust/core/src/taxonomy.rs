//! Category and tag resolution for catalog entries.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use skillcatalog_markdown::slugify;

/// Category used when nothing else matches.
pub const FALLBACK_CATEGORY: &str = "other";

const MAX_TAGS: usize = 12;

/// A built-in category and the words that select it.
#[derive(Debug)]
pub struct CategoryDef {
    pub slug: &'static str,
    pub name: &'static str,
    keywords: &'static [&'static str],
}

pub const CATEGORIES: &[CategoryDef] = &[
    CategoryDef {
        slug: "development",
        name: "Development",
        keywords: &[
            "code", "coding", "debug", "debugging", "refactor", "refactoring", "test", "testing",
            "git", "api", "typescript", "javascript", "python", "rust", "react", "frontend",
            "backend", "compiler", "lint", "review",
        ],
    },
    CategoryDef {
        slug: "data",
        name: "Data",
        keywords: &[
            "data", "dataset", "sql", "database", "csv", "excel", "xlsx", "spreadsheet",
            "analytics", "analysis", "pandas", "etl", "chart", "visualization",
        ],
    },
    CategoryDef {
        slug: "writing",
        name: "Writing",
        keywords: &[
            "writing", "write", "docs", "documentation", "blog", "article", "copywriting",
            "editing", "grammar", "translation", "docx", "markdown",
        ],
    },
    CategoryDef {
        slug: "design",
        name: "Design",
        keywords: &[
            "design", "ui", "ux", "figma", "css", "theme", "brand", "branding", "canvas", "art",
            "image", "svg", "illustration",
        ],
    },
    CategoryDef {
        slug: "productivity",
        name: "Productivity",
        keywords: &[
            "productivity", "pdf", "pptx", "slides", "presentation", "email", "calendar",
            "notes", "meeting", "todo", "workflow", "automation",
        ],
    },
    CategoryDef {
        slug: "devops",
        name: "DevOps",
        keywords: &[
            "devops", "docker", "kubernetes", "k8s", "deploy", "deployment", "ci", "cd",
            "terraform", "aws", "gcp", "azure", "infrastructure", "monitoring",
        ],
    },
    CategoryDef {
        slug: "security",
        name: "Security",
        keywords: &[
            "security", "audit", "vulnerability", "vulnerabilities", "secrets", "pentest",
            "compliance", "threat", "cve",
        ],
    },
];

/// Explicit category values that collapse into the fallback.
const DEPRECATED_CATEGORIES: &[&str] = &["chat", "general", "misc", "uncategorized", "other-skills"];

const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("code", "development"),
    ("coding", "development"),
    ("dev", "development"),
    ("engineering", "development"),
    ("analytics", "data"),
    ("docs", "writing"),
    ("documentation", "writing"),
    ("ops", "devops"),
    ("infra", "devops"),
    ("infrastructure", "devops"),
];

/// Keyword tags inferred from name and description.
const KEYWORD_TAGS: &[(&str, &str)] = &[
    ("pdf", "pdf"),
    ("docx", "docx"),
    ("xlsx", "excel"),
    ("excel", "excel"),
    ("pptx", "slides"),
    ("slides", "slides"),
    ("git", "git"),
    ("github", "git"),
    ("testing", "testing"),
    ("test", "testing"),
    ("docker", "docker"),
    ("kubernetes", "kubernetes"),
    ("k8s", "kubernetes"),
    ("python", "python"),
    ("typescript", "typescript"),
    ("javascript", "javascript"),
    ("react", "react"),
    ("rust", "rust"),
    ("sql", "sql"),
    ("api", "api"),
    ("mcp", "mcp"),
    ("markdown", "markdown"),
    ("figma", "figma"),
    ("security", "security"),
];

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("valid regex"));

/// Resolved category slug and display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryChoice {
    pub slug: String,
    pub name: String,
}

/// Normalize an explicit category value. Empty input yields `None`.
pub fn normalize_category(raw: &str) -> Option<String> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return None;
    }
    if DEPRECATED_CATEGORIES.contains(&slug.as_str()) {
        return Some(FALLBACK_CATEGORY.to_string());
    }
    let mapped = CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == slug)
        .map_or(slug, |(_, target)| target.to_string());
    Some(mapped)
}

/// Best keyword match over `text`; ties go to the earlier category.
pub fn classify_category(text: &str) -> Option<&'static CategoryDef> {
    let words = words(text);
    let mut best: Option<(&CategoryDef, usize)> = None;
    for def in CATEGORIES {
        let hits = def.keywords.iter().filter(|k| words.contains(**k)).count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((def, hits));
        }
    }
    best.map(|(def, _)| def)
}

/// Explicit category first, then keywords over name + description, then fallback.
pub fn resolve_category(explicit: Option<&str>, name: &str, description: &str) -> CategoryChoice {
    if let Some(slug) = explicit.and_then(normalize_category) {
        let name = CATEGORIES
            .iter()
            .find(|c| c.slug == slug)
            .map_or_else(|| display_name(&slug), |c| c.name.to_string());
        return CategoryChoice { slug, name };
    }
    match classify_category(&format!("{name}\n{description}")) {
        Some(def) => CategoryChoice {
            slug: def.slug.to_string(),
            name: def.name.to_string(),
        },
        None => CategoryChoice {
            slug: FALLBACK_CATEGORY.to_string(),
            name: display_name(FALLBACK_CATEGORY),
        },
    }
}

/// Tags listed in frontmatter, in order.
pub fn frontmatter_tags(metadata: &Map<String, Value>) -> Vec<String> {
    match metadata.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Tags inferred from keywords in `text`, sorted.
pub fn keyword_tags(text: &str) -> Vec<String> {
    let words = words(text);
    KEYWORD_TAGS
        .iter()
        .filter(|(kw, _)| words.contains(*kw))
        .map(|(_, tag)| tag.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tag slug/name pairs for an entry: frontmatter tags, else keyword tags,
/// else the category slug.
pub fn resolve_tags(
    explicit: &[String],
    name: &str,
    description: &str,
    category_slug: &str,
) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for raw in explicit {
        let slug = slugify(raw);
        if !slug.is_empty() && seen.insert(slug.clone()) {
            tags.push((slug, raw.trim().to_string()));
        }
    }

    if tags.is_empty() {
        for tag in keyword_tags(&format!("{name}\n{description}")) {
            if seen.insert(tag.clone()) {
                tags.push((tag.clone(), tag));
            }
        }
    }

    if tags.is_empty() && !category_slug.is_empty() {
        tags.push((category_slug.to_string(), category_slug.to_string()));
    }

    tags.truncate(MAX_TAGS);
    tags
}

fn words(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn display_name(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_category_normalization() {
        assert_eq!(normalize_category("Coding").as_deref(), Some("development"));
        assert_eq!(normalize_category("Other Skills").as_deref(), Some("other"));
        assert_eq!(normalize_category("misc").as_deref(), Some("other"));
        assert_eq!(normalize_category("Finance & Tax").as_deref(), Some("finance-tax"));
        assert_eq!(normalize_category("  "), None);
    }

    #[test]
    fn explicit_category_wins_over_keywords() {
        let choice = resolve_category(Some("Design"), "docker deploy", "kubernetes");
        assert_eq!(choice.slug, "design");
        assert_eq!(choice.name, "Design");

        let custom = resolve_category(Some("Finance & Tax"), "x", "y");
        assert_eq!(custom.name, "Finance Tax");
    }

    #[test]
    fn keyword_classification() {
        let choice = resolve_category(None, "k8s-deployer", "Deploy services to Kubernetes with Docker");
        assert_eq!(choice.slug, "devops");

        let choice = resolve_category(None, "xlsx", "Analyze spreadsheet data");
        assert_eq!(choice.slug, "data");

        let choice = resolve_category(None, "haiku", "Writes poems");
        assert_eq!(choice.slug, FALLBACK_CATEGORY);
        assert_eq!(choice.name, "Other");
    }

    #[test]
    fn frontmatter_tags_accept_lists_and_strings() {
        let meta: Map<String, Value> =
            serde_json::from_str(r#"{"tags": ["PDF", " ", 3, {"x": 1}]}"#).unwrap();
        assert_eq!(frontmatter_tags(&meta), vec!["PDF".to_string(), "3".to_string()]);

        let meta: Map<String, Value> = serde_json::from_str(r#"{"tags": "a, b ,"}"#).unwrap();
        assert_eq!(frontmatter_tags(&meta), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn tag_resolution_order() {
        let explicit = vec!["Data Viz".to_string(), "data-viz".to_string()];
        assert_eq!(
            resolve_tags(&explicit, "n", "d", "data"),
            vec![("data-viz".to_string(), "Data Viz".to_string())]
        );

        let keyword = resolve_tags(&[], "pdf-tools", "Merge PDF files with Python", "productivity");
        let slugs: Vec<_> = keyword.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(slugs, vec!["pdf", "python"]);

        assert_eq!(
            resolve_tags(&[], "haiku", "poems", "other"),
            vec![("other".to_string(), "other".to_string())]
        );
    }
}
