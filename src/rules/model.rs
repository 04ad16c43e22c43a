use crate::model::RestrictionLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerationRule {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1 (advisory) to 10 (authoritative); higher runs first
    pub priority: u8,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub trigger: RuleTrigger,
    pub conditions: Vec<Condition>,
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub stats: RuleStats,
}

fn default_active() -> bool {
    true
}

impl ModerationRule {
    /// Structural checks; field names are checked at evaluation time.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.priority) {
            return Err(format!("priority {} outside 1..=10", self.priority));
        }
        if self.conditions.is_empty() {
            return Err("rule has no conditions".to_string());
        }
        if self.actions.is_empty() {
            return Err("rule has no actions".to_string());
        }
        for condition in &self.conditions {
            if !(0.1..=2.0).contains(&condition.weight) {
                return Err(format!(
                    "condition on {} has weight {} outside [0.1, 2.0]",
                    condition.field, condition.weight
                ));
            }
        }
        Ok(())
    }

    pub fn has_block_action(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, RuleAction::Block { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    #[default]
    ContentSubmitted,
    ContentEdited,
    UserReported,
    Scheduled,
}

impl RuleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleTrigger::ContentSubmitted => "content_submitted",
            RuleTrigger::ContentEdited => "content_edited",
            RuleTrigger::UserReported => "user_reported",
            RuleTrigger::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {}",
            self.condition_type.as_str(),
            self.field,
            self.operator.as_str(),
            self.value
        )
    }
}

/// Which slice of the evaluation context a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    ContentAnalysis,
    Reputation,
    UserHistory,
    Time,
    Metadata,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::ContentAnalysis => "content_analysis",
            ConditionType::Reputation => "reputation",
            ConditionType::UserHistory => "user_history",
            ConditionType::Time => "time",
            ConditionType::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ConditionValue>),
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Bool(b) => write!(f, "{b}"),
            ConditionValue::Number(n) => write!(f, "{n}"),
            ConditionValue::Text(s) => write!(f, "\"{s}\""),
            ConditionValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    #[default]
    Content,
    User,
    Moderator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    Block {
        #[serde(default)]
        target: ActionTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Flag {
        #[serde(default)]
        target: ActionTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Review {
        #[serde(default)]
        target: ActionTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Warn {
        #[serde(default)]
        target: ActionTarget,
        message: String,
    },
    Restrict {
        #[serde(default)]
        target: ActionTarget,
        duration_hours: i64,
        #[serde(default = "default_restriction_level")]
        level: RestrictionLevel,
    },
    Notify {
        #[serde(default)]
        target: ActionTarget,
        message: String,
    },
    Assign {
        #[serde(default)]
        target: ActionTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moderator_id: Option<String>,
    },
    Escalate {
        #[serde(default)]
        target: ActionTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

fn default_restriction_level() -> RestrictionLevel {
    RestrictionLevel::Posting
}

impl RuleAction {
    pub fn name(&self) -> &'static str {
        match self {
            RuleAction::Block { .. } => "block",
            RuleAction::Flag { .. } => "flag",
            RuleAction::Review { .. } => "review",
            RuleAction::Warn { .. } => "warn",
            RuleAction::Restrict { .. } => "restrict",
            RuleAction::Notify { .. } => "notify",
            RuleAction::Assign { .. } => "assign",
            RuleAction::Escalate { .. } => "escalate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    pub times_triggered: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    pub total_confidence: f64,
}

impl RuleStats {
    pub fn record(&mut self, confidence: f64, at: DateTime<Utc>) {
        self.times_triggered += 1;
        self.last_triggered = Some(at);
        self.total_confidence += confidence;
    }

    pub fn average_confidence(&self) -> f64 {
        if self.times_triggered == 0 {
            0.0
        } else {
            self.total_confidence / self.times_triggered as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE_YAML: &str = r#"
id: new-user-links
name: New users posting links
priority: 9
trigger: content_submitted
conditions:
  - type: reputation
    field: trust_level
    operator: in
    value: [restricted, new]
    weight: 1.5
  - type: metadata
    field: url_count
    operator: greater_than
    value: 2
  - type: content_analysis
    field: flags
    operator: contains
    value: phone_number
    weight: 0.5
actions:
  - type: block
    reason: link dumping by new account
  - type: restrict
    target: user
    duration_hours: 12
  - type: notify
    target: moderator
    message: new account link dump
"#;

    #[test]
    fn test_parse_rule_yaml() {
        let rule: ModerationRule = serde_yaml::from_str(RULE_YAML).unwrap();
        assert_eq!(rule.priority, 9);
        assert!(rule.is_active);
        assert_eq!(rule.conditions.len(), 3);
        assert_eq!(rule.conditions[1].weight, 1.0);
        assert_eq!(
            rule.conditions[0].value,
            ConditionValue::List(vec![
                ConditionValue::Text("restricted".to_string()),
                ConditionValue::Text("new".to_string()),
            ])
        );
        assert!(rule.has_block_action());
        assert!(matches!(
            rule.actions[1],
            RuleAction::Restrict {
                target: ActionTarget::User,
                duration_hours: 12,
                level: RestrictionLevel::Posting
            }
        ));
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_rule_roundtrip_preserves_everything() {
        let rule: ModerationRule = serde_yaml::from_str(RULE_YAML).unwrap();

        let yaml = serde_yaml::to_string(&rule).unwrap();
        let from_yaml: ModerationRule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(rule, from_yaml);

        let json = serde_json::to_string(&rule).unwrap();
        let from_json: ModerationRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, from_json);
    }

    #[test]
    fn test_validate_rejects_bad_weight_and_priority() {
        let mut rule: ModerationRule = serde_yaml::from_str(RULE_YAML).unwrap();
        rule.conditions[0].weight = 3.0;
        assert!(rule.validate().is_err());

        let mut rule: ModerationRule = serde_yaml::from_str(RULE_YAML).unwrap();
        rule.priority = 0;
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let yaml = "type: delete\ntarget: content\n";
        assert!(serde_yaml::from_str::<RuleAction>(yaml).is_err());
    }

    #[test]
    fn test_stats_average() {
        let mut stats = RuleStats::default();
        assert_eq!(stats.average_confidence(), 0.0);
        stats.record(0.5, Utc::now());
        stats.record(1.0, Utc::now());
        assert_eq!(stats.times_triggered, 2);
        assert!((stats.average_confidence() - 0.75).abs() < 1e-9);
    }
}
