//! Pattern and keyword scan for dangerous instructions.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use skillcatalog_shared::{SecurityDecision, Severity};

pub const HEURISTIC_PROVIDER: &str = "heuristic";

/// Pattern keys whose presence makes a finding critical.
const CRITICAL_KEYS: &[&str] = &[
    "destructive_rm",
    "disk_wipe_dd",
    "mkfs",
    "reverse_shell_tcp",
    "netcat_exec",
    "chmod_suid",
];

const HACKING_KEYWORDS: &[&str] = &[
    "credential dump",
    "steal credentials",
    "keylogger",
    "phishing",
    "exploit",
    "payload",
    "reverse shell",
    "privilege escalation",
    "dump passwords",
    "token theft",
];

struct DangerPattern {
    key: &'static str,
    regex: Regex,
    reason: &'static str,
}

static PATTERNS: LazyLock<Vec<DangerPattern>> = LazyLock::new(|| {
    let table: &[(&str, &str, &str)] = &[
        (
            "destructive_rm",
            r"(?i)\b(sudo\s+)?rm\s+-(?:rf|fr)\s+/(?:\s|$|\*)",
            "Destructive rm -rf /",
        ),
        (
            "disk_wipe_dd",
            r"(?i)\bdd\s+if=/dev/(zero|random)\b",
            "Disk wipe via dd",
        ),
        (
            "mkfs",
            r"(?i)\bmkfs\.(ext[234]|xfs|btrfs)\b",
            "Filesystem formatting (mkfs.*)",
        ),
        (
            "curl_pipe_sh",
            r"(?i)\bcurl\b[^\n]*\|\s*(bash|sh)\b",
            "Remote script execution (curl | sh)",
        ),
        (
            "wget_pipe_sh",
            r"(?i)\bwget\b[^\n]*\|\s*(bash|sh)\b",
            "Remote script execution (wget | sh)",
        ),
        (
            "reverse_shell_tcp",
            r"(?i)/dev/tcp/\d{1,3}(?:\.\d{1,3}){3}/\d{2,5}",
            "Reverse shell via /dev/tcp",
        ),
        (
            "netcat_exec",
            r"(?i)\bnc\b[^\n]*\s+-e\s+\S+",
            "Netcat remote exec (-e)",
        ),
        (
            "chmod_suid",
            r"(?i)\bchmod\b[^\n]*\s+\+s\s+\S+",
            "SUID bit set (chmod +s)",
        ),
        (
            "ssh_authorized_keys",
            r"(?i)authorized_keys",
            "Mentions SSH authorized_keys (persistence risk)",
        ),
        (
            "aws_credentials_file",
            r"(?i)\.aws/credentials\b",
            "Reads cloud credential file (~/.aws/credentials)",
        ),
        (
            "exfil_env",
            r"(?i)\b(printenv|env)\b[^\n]*\|\s*(curl|wget)\b",
            "Potential environment exfiltration",
        ),
    ];
    table
        .iter()
        .map(|(key, pattern, reason)| DangerPattern {
            key,
            regex: Regex::new(pattern).expect("valid regex"),
            reason,
        })
        .collect()
});

/// Fields the heuristic pass looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanInput<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub body: &'a str,
    pub url: &'a str,
}

impl ScanInput<'_> {
    fn text(&self) -> String {
        [self.name, self.description, self.body, self.url]
            .join("\n")
            .trim()
            .to_string()
    }
}

/// Heuristic verdict. Any hit blocks; critical keys escalate severity.
pub fn heuristic_scan(input: &ScanInput<'_>) -> SecurityDecision {
    let text = input.text();
    let lowered = text.to_lowercase();

    let mut indicators = BTreeSet::new();
    let mut reasons = BTreeSet::new();

    for pattern in PATTERNS.iter() {
        if pattern.regex.is_match(&text) {
            indicators.insert(pattern.key.to_string());
            reasons.insert(pattern.reason.to_string());
        }
    }

    for kw in HACKING_KEYWORDS {
        if lowered.contains(kw) {
            indicators.insert(format!("kw:{}", kw.replace(' ', "_")));
            reasons.insert(format!("Suspicious hacking keyword: {kw}"));
        }
    }

    if indicators.is_empty() {
        return clean_decision();
    }

    let critical = indicators.iter().any(|i| CRITICAL_KEYS.contains(&i.as_str()));
    let (severity, confidence) = if critical {
        (Severity::Critical, 0.95)
    } else {
        (Severity::High, 0.8)
    };

    SecurityDecision {
        block: true,
        severity,
        confidence,
        reasons: reasons.into_iter().collect(),
        indicators: indicators.into_iter().collect(),
        provider: HEURISTIC_PROVIDER.into(),
    }
}

/// Decision for content with no findings.
pub fn clean_decision() -> SecurityDecision {
    SecurityDecision {
        block: false,
        severity: Severity::Low,
        confidence: 0.2,
        reasons: Vec::new(),
        indicators: Vec::new(),
        provider: HEURISTIC_PROVIDER.into(),
    }
}

/// Whether a decision is a critical block that nothing may downgrade.
pub fn is_critical_block(decision: &SecurityDecision) -> bool {
    decision.block && decision.severity == Severity::Critical
}
