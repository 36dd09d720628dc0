//! Runtime policy read by the worker at the start of every cycle.
//!
//! The stored policy (system setting `runtime_policy`) overrides the
//! `[policy]` section of the config file. Changes are applied with a
//! [`PolicyPatch`] so that absent fields keep their current value.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::types::{ClassifierMode, IntentTier, ValidationProfile};

/// Lower bound for the worker interval, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Upper bound for the worker interval, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Settings key holding the serialized [`RuntimePolicy`].
pub const RUNTIME_POLICY_KEY: &str = "runtime_policy";

/// Externally patchable pipeline policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePolicy {
    #[serde(default)]
    pub validation_profile: ValidationProfile,
    /// Spec errors become terminal `error` rows (strict profile only).
    #[serde(default)]
    pub enforce_spec: bool,
    /// Quality errors become terminal `error` rows. No check currently emits
    /// a quality error, so this has no effect yet.
    #[serde(default)]
    pub quality_enforce: bool,
    #[serde(default = "default_true")]
    pub security_scan_enabled: bool,
    #[serde(default = "default_true")]
    pub security_enforce: bool,
    #[serde(default)]
    pub classifier_mode: ClassifierMode,
    /// Minimum model confidence for a model `block` to count.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_min_repo_tier")]
    pub min_repo_tier: IntentTier,
    #[serde(default = "default_min_intent_score")]
    pub min_intent_score: u8,
    #[serde(default = "default_true")]
    pub auto_ingest_enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            validation_profile: ValidationProfile::Lax,
            enforce_spec: false,
            quality_enforce: false,
            security_scan_enabled: true,
            security_enforce: true,
            classifier_mode: ClassifierMode::Suspicious,
            confidence_threshold: default_confidence_threshold(),
            min_repo_tier: default_min_repo_tier(),
            min_intent_score: default_min_intent_score(),
            auto_ingest_enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_min_repo_tier() -> IntentTier {
    IntentTier::SkillsFocused
}
fn default_min_intent_score() -> u8 {
    45
}
fn default_interval_secs() -> u64 {
    60
}

impl RuntimePolicy {
    /// Clamp numeric fields into their valid ranges.
    pub fn normalized(mut self) -> Self {
        self.interval_secs = self.interval_secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
        if !self.confidence_threshold.is_finite() {
            self.confidence_threshold = default_confidence_threshold();
        }
        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.min_intent_score = self.min_intent_score.min(100);
        self
    }

    /// Apply a partial update, validating ranges.
    pub fn apply(&self, patch: &PolicyPatch) -> Result<Self> {
        let mut next = self.clone();
        if let Some(v) = patch.validation_profile {
            next.validation_profile = v;
        }
        if let Some(v) = patch.enforce_spec {
            next.enforce_spec = v;
        }
        if let Some(v) = patch.quality_enforce {
            next.quality_enforce = v;
        }
        if let Some(v) = patch.security_scan_enabled {
            next.security_scan_enabled = v;
        }
        if let Some(v) = patch.security_enforce {
            next.security_enforce = v;
        }
        if let Some(v) = patch.classifier_mode {
            next.classifier_mode = v;
        }
        if let Some(v) = patch.confidence_threshold {
            if !(0.0..=1.0).contains(&v) {
                return Err(CatalogError::validation(format!(
                    "confidence_threshold must be within [0, 1], got {v}"
                )));
            }
            next.confidence_threshold = v;
        }
        if let Some(v) = patch.min_repo_tier {
            next.min_repo_tier = v;
        }
        if let Some(v) = patch.min_intent_score {
            if v > 100 {
                return Err(CatalogError::validation(format!(
                    "min_intent_score must be within [0, 100], got {v}"
                )));
            }
            next.min_intent_score = v;
        }
        if let Some(v) = patch.auto_ingest_enabled {
            next.auto_ingest_enabled = v;
        }
        if let Some(v) = patch.interval_secs {
            if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&v) {
                return Err(CatalogError::validation(format!(
                    "interval_secs must be within [{MIN_INTERVAL_SECS}, {MAX_INTERVAL_SECS}], got {v}"
                )));
            }
            next.interval_secs = v;
        }
        Ok(next)
    }
}

/// Partial update for [`RuntimePolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyPatch {
    pub validation_profile: Option<ValidationProfile>,
    pub enforce_spec: Option<bool>,
    pub quality_enforce: Option<bool>,
    pub security_scan_enabled: Option<bool>,
    pub security_enforce: Option<bool>,
    pub classifier_mode: Option<ClassifierMode>,
    pub confidence_threshold: Option<f64>,
    pub min_repo_tier: Option<IntentTier>,
    pub min_intent_score: Option<u8>,
    pub auto_ingest_enabled: Option<bool>,
    pub interval_secs: Option<u64>,
}

impl PolicyPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_lax_and_security_enforced() {
        let policy = RuntimePolicy::default();
        assert_eq!(policy.validation_profile, ValidationProfile::Lax);
        assert!(!policy.enforce_spec);
        assert!(!policy.quality_enforce);
        assert!(policy.security_enforce);
        assert_eq!(policy.min_repo_tier, IntentTier::SkillsFocused);
        assert_eq!(policy.interval_secs, 60);
    }

    #[test]
    fn patch_applies_only_given_fields() {
        let policy = RuntimePolicy::default();
        let patch = PolicyPatch {
            validation_profile: Some(ValidationProfile::Strict),
            enforce_spec: Some(true),
            ..PolicyPatch::default()
        };
        let next = policy.apply(&patch).unwrap();
        assert_eq!(next.validation_profile, ValidationProfile::Strict);
        assert!(next.enforce_spec);
        assert_eq!(next.interval_secs, policy.interval_secs);
    }

    #[test]
    fn patch_rejects_out_of_range_values() {
        let policy = RuntimePolicy::default();
        let bad_interval = PolicyPatch {
            interval_secs: Some(5),
            ..PolicyPatch::default()
        };
        assert!(policy.apply(&bad_interval).is_err());

        let bad_threshold = PolicyPatch {
            confidence_threshold: Some(1.5),
            ..PolicyPatch::default()
        };
        assert!(policy.apply(&bad_threshold).is_err());
    }

    #[test]
    fn normalized_clamps_stored_values() {
        let policy = RuntimePolicy {
            interval_secs: 1,
            confidence_threshold: 3.0,
            ..RuntimePolicy::default()
        }
        .normalized();
        assert_eq!(policy.interval_secs, MIN_INTERVAL_SECS);
        assert_eq!(policy.confidence_threshold, 1.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let policy: RuntimePolicy =
            serde_json::from_str(r#"{"validation_profile":"strict"}"#).unwrap();
        assert_eq!(policy.validation_profile, ValidationProfile::Strict);
        assert!(policy.security_scan_enabled);
        assert_eq!(policy.min_intent_score, 45);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(PolicyPatch::default().is_empty());
        let patch = PolicyPatch {
            auto_ingest_enabled: Some(false),
            ..PolicyPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
