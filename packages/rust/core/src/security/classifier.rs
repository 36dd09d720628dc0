//! Client for an OpenAI-compatible chat-completions service.
//!
//! Used for the optional model stage of the security scan and for
//! generating one-line catalog summaries. Classification failures degrade
//! to "no opinion"; nothing here is allowed to fail a document.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use skillcatalog_crawler::USER_AGENT;
use skillcatalog_markdown::excerpt;
use skillcatalog_shared::{CatalogError, ClassifierConfig, Result, SecurityDecision, Severity};

use super::heuristic::ScanInput;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const CLASSIFY_EXCERPT_CHARS: usize = 4000;
const SUMMARY_EXCERPT_CHARS: usize = 1200;
const MAX_SUMMARY_CHARS: usize = 200;

const CLASSIFY_SYSTEM_PROMPT: &str = "You review agent skill documents for security risks. \
Answer with a single JSON object and nothing else.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You write concise one-paragraph overviews for skill catalog cards.";

// ---------------------------------------------------------------------------
// Opinion
// ---------------------------------------------------------------------------

/// Evidence attached to a model opinion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFindings {
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub indicators: Vec<String>,
}

/// Three-valued result of the model stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOpinion {
    Allow(ModelFindings),
    Block(ModelFindings),
    /// Not called, failed, or answered with something unusable.
    NoOpinion,
}

impl ModelOpinion {
    pub fn findings(&self) -> Option<&ModelFindings> {
        match self {
            Self::Allow(f) | Self::Block(f) => Some(f),
            Self::NoOpinion => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Explicitly constructed model client; one per process, passed by reference.
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
}

impl ModelClient {
    /// Build a client, or `None` when no endpoint is configured.
    pub fn from_config(config: &ClassifierConfig, api_key: Option<String>) -> Result<Option<Self>> {
        let Some(url) = resolve_completions_url(&config.endpoint) else {
            return Ok(None);
        };
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CatalogError::Classifier(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        }))
    }

    /// Resolved chat-completions URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the model for a security verdict.
    #[instrument(skip_all, fields(url = %input.url))]
    pub async fn classify(
        &self,
        input: &ScanInput<'_>,
        heuristic: &SecurityDecision,
    ) -> ModelOpinion {
        let user = classify_prompt(input, heuristic);
        match self.complete(CLASSIFY_SYSTEM_PROMPT, &user).await {
            Ok(text) => {
                let opinion = text
                    .as_deref()
                    .map_or(ModelOpinion::NoOpinion, parse_opinion);
                if opinion == ModelOpinion::NoOpinion {
                    warn!("classifier returned an unusable verdict");
                }
                opinion
            }
            Err(e) => {
                warn!(error = %e, "classifier call failed");
                ModelOpinion::NoOpinion
            }
        }
    }

    /// One-sentence overview for list cards.
    ///
    /// `Err` when the service could not be reached or refused the request;
    /// `Ok(None)` when it answered without usable text.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn summarize(
        &self,
        name: &str,
        description: &str,
        content: &str,
    ) -> Result<Option<String>> {
        let user = format!(
            "Summarize this skill for a marketplace list card.\n\
             Constraints: 1 sentence, <= 140 characters, plain text, no emojis.\n\n\
             Name: {name}\n\
             Description: {description}\n\
             Content (excerpt): {}\n",
            excerpt(content, SUMMARY_EXCERPT_CHARS)
        );
        let Some(text) = self.complete(SUMMARY_SYSTEM_PROMPT, &user).await? else {
            debug!("summary reply had no text");
            return Ok(None);
        };
        let flat = text.trim().replace(['\r', '\n'], " ");
        let capped = excerpt(&flat, MAX_SUMMARY_CHARS).trim();
        Ok((!capped.is_empty()).then(|| capped.to_string()))
    }

    /// Completion text of one chat round. Transport and HTTP failures are
    /// errors; a body without text is `None`.
    async fn complete(&self, system: &str, user: &str) -> Result<Option<String>> {
        let payload = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::Classifier(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Classifier(format!("HTTP {}", status.as_u16())));
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "invalid response body");
                return Ok(None);
            }
        };
        Ok(completion_text(&body))
    }
}

/// Append `/chat/completions` unless the endpoint already names a completions path.
pub fn resolve_completions_url(endpoint: &str) -> Option<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.ends_with("/chat/completions") || lower.ends_with("/completions") {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}/chat/completions"))
    }
}

fn completion_text(body: &Value) -> Option<String> {
    let choice = body
        .get("choices")
        .or_else(|| body.get("data").and_then(|d| d.get("choices")))?
        .get(0)?;
    choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))
        .map(String::from)
}

fn classify_prompt(input: &ScanInput<'_>, heuristic: &SecurityDecision) -> String {
    let hints = if heuristic.indicators.is_empty() {
        "none".to_string()
    } else {
        heuristic.indicators.join(", ")
    };
    format!(
        "Decide whether publishing this skill would let an agent do something dangerous \
         (destroy data, open remote shells, steal or exfiltrate credentials, escalate privileges).\n\
         Reply with JSON: {{\"block\": true|false, \"severity\": \"low|medium|high|critical\", \
         \"confidence\": 0.0-1.0, \"reasons\": [string], \"indicators\": [string]}}\n\n\
         Heuristic indicators: {hints}\n\
         Name: {}\n\
         Description: {}\n\
         URL: {}\n\
         Content (excerpt): {}\n",
        input.name,
        input.description,
        input.url,
        excerpt(input.body, CLASSIFY_EXCERPT_CHARS)
    )
}

// ---------------------------------------------------------------------------
// Verdict parsing
// ---------------------------------------------------------------------------

/// Parse a model verdict. Anything malformed is `NoOpinion`.
pub fn parse_opinion(text: &str) -> ModelOpinion {
    let Some(json) = extract_json_object(text) else {
        return ModelOpinion::NoOpinion;
    };
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(json) else {
        return ModelOpinion::NoOpinion;
    };

    let block = match obj.get("block") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => return ModelOpinion::NoOpinion,
    };
    let Some(confidence) = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
    else {
        return ModelOpinion::NoOpinion;
    };

    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Severity>().ok())
        .unwrap_or(if block { Severity::Medium } else { Severity::Low });

    let findings = ModelFindings {
        severity,
        confidence: confidence.clamp(0.0, 1.0),
        reasons: string_list(obj.get("reasons")),
        indicators: string_list(obj.get("indicators")),
    };

    if block {
        ModelOpinion::Block(findings)
    } else {
        ModelOpinion::Allow(findings)
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
