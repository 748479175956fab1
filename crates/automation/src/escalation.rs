//! Escalation policy: when an action outcome goes to the decision module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The trigger an escalation policy watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationCondition {
    /// Error streak at or above the policy threshold.
    #[default]
    ActionErrorRepeated,
    /// The unknown-pattern detector flagged the last error.
    UnknownPattern,
    /// The watcher reported conflicting metrics.
    MultipleMetricsConflict,
    /// Never fires. Also what unrecognized names parse to.
    None,
}

impl EscalationCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionErrorRepeated => "action_error_repeated",
            Self::UnknownPattern => "unknown_pattern",
            Self::MultipleMetricsConflict => "multiple_metrics_conflict",
            Self::None => "none",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "action_error_repeated" => Self::ActionErrorRepeated,
            "unknown_pattern" => Self::UnknownPattern,
            "multiple_metrics_conflict" => Self::MultipleMetricsConflict,
            _ => Self::None,
        }
    }
}

impl From<String> for EscalationCondition {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl Serialize for EscalationCondition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EscalationCondition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

fn default_threshold() -> u32 {
    2
}

fn default_decision_required() -> String {
    "classify".into()
}

/// Per-task escalation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub condition: EscalationCondition,

    /// Streak length for `action_error_repeated`. Never below 1.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// What kind of answer is wanted: classify, choose, explain, prioritize.
    #[serde(default = "default_decision_required")]
    pub decision_required: String,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            condition: EscalationCondition::default(),
            threshold: default_threshold(),
            decision_required: default_decision_required(),
        }
    }
}

impl EscalationPolicy {
    /// Whether this policy fires for `input`.
    pub fn should_escalate(&self, input: &DecisionInput) -> bool {
        if !self.enabled {
            return false;
        }
        let ctx = &input.context;
        match self.condition {
            EscalationCondition::ActionErrorRepeated => ctx.error_streak >= self.threshold.max(1),
            EscalationCondition::UnknownPattern => ctx.unknown_pattern,
            EscalationCondition::MultipleMetricsConflict => ctx.metrics_conflict,
            EscalationCondition::None => false,
        }
    }
}

/// Decides whether an error message looks like something no rule covers.
pub trait UnknownPatternDetector: Send + Sync {
    fn is_unknown(&self, error: &str) -> bool;
}

/// Case-insensitive substring match against a fixed list of phrases.
#[derive(Debug, Clone)]
pub struct SubstringDetector {
    needles: Vec<String>,
}

impl SubstringDetector {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: needles.into_iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }
}

impl Default for SubstringDetector {
    fn default() -> Self {
        Self::new(["unknown", "unexpected", "unrecognized", "ambiguous", "undefined"])
    }
}

impl UnknownPatternDetector for SubstringDetector {
    fn is_unknown(&self, error: &str) -> bool {
        let haystack = error.to_lowercase();
        self.needles.iter().any(|n| haystack.contains(n.as_str()))
    }
}

/// Signals gathered by the task cycle after an action run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub action_success: bool,
    pub error_streak: u32,
    pub unknown_pattern: bool,
    pub metrics_conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The structured payload handed to the decision module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub task_id: String,
    pub event_type: String,
    pub decision_required: String,
    pub context: EventContext,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(streak: u32, unknown: bool, conflict: bool) -> DecisionInput {
        DecisionInput {
            task_id: "t".into(),
            event_type: "file_detected_but_action_failed".into(),
            decision_required: "classify".into(),
            context: EventContext {
                action_success: false,
                error_streak: streak,
                unknown_pattern: unknown,
                metrics_conflict: conflict,
                last_error: None,
            },
            timestamp: Utc::now(),
        }
    }

    fn policy(condition: EscalationCondition, threshold: u32) -> EscalationPolicy {
        EscalationPolicy {
            enabled: true,
            condition,
            threshold,
            ..Default::default()
        }
    }

    #[test]
    fn repeated_error_fires_at_threshold() {
        let p = policy(EscalationCondition::ActionErrorRepeated, 2);
        assert!(!p.should_escalate(&input(1, false, false)));
        assert!(p.should_escalate(&input(2, false, false)));
        assert!(p.should_escalate(&input(3, false, false)));
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let p = policy(EscalationCondition::ActionErrorRepeated, 0);
        assert!(!p.should_escalate(&input(0, false, false)));
        assert!(p.should_escalate(&input(1, false, false)));
    }

    #[test]
    fn disabled_policy_never_fires() {
        let mut p = policy(EscalationCondition::UnknownPattern, 1);
        p.enabled = false;
        assert!(!p.should_escalate(&input(9, true, true)));
    }

    #[test]
    fn flag_conditions_follow_their_flag() {
        assert!(policy(EscalationCondition::UnknownPattern, 2).should_escalate(&input(0, true, false)));
        assert!(!policy(EscalationCondition::UnknownPattern, 2).should_escalate(&input(5, false, false)));
        assert!(policy(EscalationCondition::MultipleMetricsConflict, 2).should_escalate(&input(0, false, true)));
        assert!(!policy(EscalationCondition::None, 1).should_escalate(&input(5, true, true)));
    }

    #[test]
    fn condition_names_round_trip_and_unknown_names_disable() {
        let p: EscalationPolicy = serde_json::from_str(r#"{"enabled":true,"condition":"Unknown_Pattern"}"#).unwrap();
        assert_eq!(p.condition, EscalationCondition::UnknownPattern);
        assert_eq!(p.threshold, 2);

        let p: EscalationPolicy = serde_json::from_str(r#"{"enabled":true,"condition":"gut_feeling"}"#).unwrap();
        assert_eq!(p.condition, EscalationCondition::None);

        let json = serde_json::to_value(EscalationPolicy::default()).unwrap();
        assert_eq!(json["condition"], "action_error_repeated");
    }

    #[test]
    fn substring_detector_is_case_insensitive() {
        let d = SubstringDetector::default();
        assert!(d.is_unknown("Unexpected EOF while reading"));
        assert!(!d.is_unknown("Permission denied (os error 13)"));

        let custom = SubstringDetector::new(["busy"]);
        assert!(custom.is_unknown("Resource BUSY"));
        assert!(!custom.is_unknown("unknown"));
    }
}
