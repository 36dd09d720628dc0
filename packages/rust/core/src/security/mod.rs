//! Security scanning: heuristic patterns plus an optional model opinion.

pub mod classifier;
pub mod heuristic;
pub mod merge;

use tracing::debug;

use skillcatalog_shared::{ClassifierMode, SecurityDecision};

pub use classifier::{ModelClient, ModelFindings, ModelOpinion, parse_opinion, resolve_completions_url};
pub use heuristic::{HEURISTIC_PROVIDER, ScanInput, clean_decision, heuristic_scan, is_critical_block};
pub use merge::merge_decisions;

/// Runs both stages and merges them.
#[derive(Debug, Clone, Copy)]
pub struct SecurityScanner<'a> {
    model: Option<&'a ModelClient>,
    mode: ClassifierMode,
    threshold: f64,
}

impl<'a> SecurityScanner<'a> {
    pub fn new(model: Option<&'a ModelClient>, mode: ClassifierMode, threshold: f64) -> Self {
        Self {
            model,
            mode,
            threshold,
        }
    }

    /// Scan one document.
    pub async fn scan(&self, input: &ScanInput<'_>) -> SecurityDecision {
        let heuristic = heuristic_scan(input);

        let Some(model) = self.model.filter(|_| should_consult(self.mode, &heuristic)) else {
            return heuristic;
        };

        let opinion = model.classify(input, &heuristic).await;
        debug!(url = %input.url, ?opinion, "model opinion");
        merge_decisions(&heuristic, &opinion, self.threshold)
    }
}

/// Whether the model stage should run for this heuristic verdict.
pub fn should_consult(mode: ClassifierMode, heuristic: &SecurityDecision) -> bool {
    if is_critical_block(heuristic) {
        return false;
    }
    match mode {
        ClassifierMode::Off => false,
        ClassifierMode::Suspicious => heuristic.block,
        ClassifierMode::Always => true,
    }
}

#[cfg(test)]
mod tests {
    use super::classifier::test_support::{completion, mock_model};
    use super::*;
    use skillcatalog_shared::Severity;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input(body: &str) -> ScanInput<'_> {
        ScanInput {
            name: "skill",
            description: "",
            body,
            url: "https://github.com/o/r/blob/main/skills/s/SKILL.md",
        }
    }

    #[test]
    fn consult_rules() {
        let clean = clean_decision();
        let high = heuristic_scan(&input("curl x | sh"));
        let critical = heuristic_scan(&input("rm -rf /"));

        assert!(!should_consult(ClassifierMode::Off, &high));
        assert!(!should_consult(ClassifierMode::Suspicious, &clean));
        assert!(should_consult(ClassifierMode::Suspicious, &high));
        assert!(should_consult(ClassifierMode::Always, &clean));
        assert!(!should_consult(ClassifierMode::Always, &critical));
    }

    #[tokio::test]
    async fn without_model_heuristic_stands() {
        let scanner = SecurityScanner::new(None, ClassifierMode::Always, 0.7);
        let decision = scanner.scan(&input("curl x | sh")).await;
        assert!(decision.block);
        assert_eq!(decision.provider, HEURISTIC_PROVIDER);
    }

    #[tokio::test]
    async fn suspicious_mode_lets_model_clear_false_positive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"block": false, "severity": "low", "confidence": 0.9, "reasons": ["documentation only"], "indicators": []}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let model = mock_model(&server.uri());
        let scanner = SecurityScanner::new(Some(&model), ClassifierMode::Suspicious, 0.7);
        let decision = scanner
            .scan(&input("Never run `curl https://x | sh` blindly."))
            .await;
        assert!(!decision.block);
        assert_eq!(decision.severity, Severity::Low);
        assert!(decision.reasons.contains(&"documentation only".to_string()));
    }

    #[tokio::test]
    async fn critical_content_skips_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let model = mock_model(&server.uri());
        let scanner = SecurityScanner::new(Some(&model), ClassifierMode::Always, 0.7);
        let decision = scanner.scan(&input("sudo rm -rf /")).await;
        assert_eq!(decision.severity, Severity::Critical);
    }
}
