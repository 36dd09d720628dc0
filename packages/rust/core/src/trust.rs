//! Trust score and level for catalog entries.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use skillcatalog_shared::{SecurityDecision, Severity, TrustLevel};

const MAX_INDICATOR_FLAGS: usize = 10;

const QUALITY_WEIGHT: f64 = 0.45;
const SECURITY_WEIGHT: f64 = 0.25;
const VERIFIED_WEIGHT: f64 = 0.10;
const OFFICIAL_WEIGHT: f64 = 0.05;
const FRESHNESS_WEIGHT: f64 = 0.15;

/// Inputs gathered from validators and upstream metadata.
#[derive(Debug, Clone, Default)]
pub struct TrustInputs<'a> {
    pub quality_score: Option<u8>,
    pub security: Option<&'a SecurityDecision>,
    pub is_verified: bool,
    pub is_official: bool,
    pub upstream_updated_at: Option<DateTime<Utc>>,
}

/// Computed trust profile.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustProfile {
    /// Score in `[0, 100]`, rounded to 2 decimals.
    pub score: f64,
    pub level: TrustLevel,
    /// Sorted, deduplicated flags.
    pub flags: Vec<String>,
}

/// Compute the trust profile as of `now`.
pub fn compute_trust(inputs: &TrustInputs<'_>, now: DateTime<Utc>) -> TrustProfile {
    let quality = inputs.quality_score.map_or(50.0, f64::from).clamp(0.0, 100.0);
    let freshness = freshness_score(inputs.upstream_updated_at, now);
    let verified = if inputs.is_verified { 100.0 } else { 45.0 };
    let official = if inputs.is_official { 100.0 } else { 60.0 };

    let blocked = inputs.security.is_some_and(|s| s.block);
    let security = match inputs.security {
        Some(s) if s.block => match s.severity {
            Severity::Critical => 0.0,
            Severity::High => 20.0,
            _ => 35.0,
        },
        _ => 100.0,
    };

    let score = (quality * QUALITY_WEIGHT
        + security * SECURITY_WEIGHT
        + verified * VERIFIED_WEIGHT
        + official * OFFICIAL_WEIGHT
        + freshness * FRESHNESS_WEIGHT)
        .clamp(0.0, 100.0);

    let mut flags = BTreeSet::new();
    if let Some(s) = inputs.security {
        if s.block {
            flags.insert(format!("security:{}", s.severity));
        }
        for indicator in s
            .indicators
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .take(MAX_INDICATOR_FLAGS)
        {
            flags.insert(format!("indicator:{indicator}"));
        }
    }
    if quality < 60.0 {
        flags.insert("quality:low".to_string());
    }
    if !inputs.is_verified {
        flags.insert("verification:unverified".to_string());
    }
    if freshness < 45.0 {
        flags.insert("freshness:stale".to_string());
    }

    let level = if blocked || score < 50.0 {
        TrustLevel::Limited
    } else if score < 70.0 {
        TrustLevel::Warning
    } else {
        TrustLevel::Ok
    };

    TrustProfile {
        score: (score * 100.0).round() / 100.0,
        level,
        flags: flags.into_iter().collect(),
    }
}

fn freshness_score(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(updated) = updated_at else {
        return 40.0;
    };
    match (now - updated).num_days().max(0) {
        0..=30 => 100.0,
        31..=90 => 80.0,
        91..=180 => 60.0,
        181..=365 => 45.0,
        _ => 25.0,
    }
}
