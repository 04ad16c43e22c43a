//! Condition/action moderation rules.
//!
//! Rules are typed (`model`), evaluated through per-condition-type field
//! tables (`evaluator`) and read through a TTL snapshot cache (`cache`).

pub mod cache;
pub mod evaluator;
pub mod model;

pub use cache::{RuleCache, RuleSnapshot};
pub use evaluator::{RuleContext, RuleEngine, RuleExecutionResult};
pub use model::{
    ActionTarget, Condition, ConditionType, ConditionValue, ModerationRule, Operator, RuleAction,
    RuleStats, RuleTrigger,
};

/// Parse a YAML list of rules, as found in a rules file.
pub fn parse_rules_yaml(content: &str) -> anyhow::Result<Vec<ModerationRule>> {
    let rules: Vec<ModerationRule> = serde_yaml::from_str(content)?;
    for rule in &rules {
        rule.validate()
            .map_err(|e| anyhow::anyhow!("rule {}: {e}", rule.id))?;
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules_file() {
        let yaml = r#"
- id: toxic-block
  name: Block high toxicity
  priority: 9
  conditions:
    - type: content_analysis
      field: toxicity_score
      operator: greater_than
      value: 70
  actions:
    - type: block
- id: weekend-links
  name: Weekend link posts
  priority: 3
  trigger: content_edited
  conditions:
    - type: time
      field: is_weekend
      operator: equals
      value: true
    - type: metadata
      field: url_count
      operator: greater_than
      value: 1
  actions:
    - type: review
      priority: 6
"#;
        let rules = parse_rules_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].trigger, RuleTrigger::ContentEdited);
        assert_eq!(rules[1].conditions[0].value, ConditionValue::Bool(true));
    }

    #[test]
    fn test_invalid_rule_in_file_rejected() {
        let yaml = r#"
- id: empty
  name: No conditions
  priority: 4
  conditions: []
  actions:
    - type: flag
"#;
        assert!(parse_rules_yaml(yaml).is_err());
    }
}
