use super::model::{Condition, ConditionType, ConditionValue, ModerationRule, Operator, RuleAction};
use crate::analysis::AnalysisResult;
use crate::config::RulesConfig;
use crate::error::ModerationError;
use crate::model::Content;
use crate::reputation::ReputationProfile;
use chrono::{DateTime, Datelike, Timelike, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Everything a condition can read.
pub struct RuleContext<'a> {
    pub content: &'a Content,
    pub analysis: &'a AnalysisResult,
    pub profile: &'a ReputationProfile,
    pub timestamp: DateTime<Utc>,
}

/// A field value pulled out of the context.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

type Extractor = fn(&RuleContext) -> FieldValue;

fn num(v: impl Into<f64>) -> FieldValue {
    FieldValue::Number(v.into())
}

fn text(v: impl Into<String>) -> FieldValue {
    FieldValue::Text(v.into())
}

lazy_static! {
    static ref CONTENT_ANALYSIS_FIELDS: HashMap<&'static str, Extractor> = {
        let mut m: HashMap<&'static str, Extractor> = HashMap::new();
        m.insert("spam_score", |c| num(c.analysis.spam_score));
        m.insert("quality_score", |c| num(c.analysis.quality_score));
        m.insert("toxicity_score", |c| num(c.analysis.toxicity_score));
        m.insert("overall_score", |c| num(c.analysis.overall_score));
        m.insert("is_spam", |c| FieldValue::Bool(c.analysis.is_spam()));
        m.insert("is_toxic", |c| FieldValue::Bool(c.analysis.is_toxic()));
        m.insert("severity", |c| text(c.analysis.severity().as_str()));
        m.insert("recommendation", |c| text(c.analysis.recommendation.as_str()));
        m.insert("flags", |c| {
            FieldValue::List(c.analysis.flags.iter().cloned().collect())
        });
        m.insert("toxicity_categories", |c| {
            FieldValue::List(c.analysis.toxicity_categories.keys().cloned().collect())
        });
        m.insert("spam_keywords", |c| {
            FieldValue::List(c.analysis.spam.matched_keywords.clone())
        });
        m
    };
    static ref REPUTATION_FIELDS: HashMap<&'static str, Extractor> = {
        let mut m: HashMap<&'static str, Extractor> = HashMap::new();
        m.insert("overall_score", |c| num(c.profile.overall_score));
        m.insert("trust_level", |c| text(c.profile.trust_level.as_str()));
        m.insert("is_restricted", |c| FieldValue::Bool(c.profile.is_restricted()));
        m.insert("trend", |c| {
            text(format!("{:?}", c.profile.trend.direction).to_lowercase())
        });
        m.insert("composite", |c| num(c.profile.factors.composite()));
        m.insert("content_quality", |c| num(c.profile.factors.content_quality));
        m.insert("community_helpfulness", |c| num(c.profile.factors.community_helpfulness));
        m.insert("consistent_activity", |c| num(c.profile.factors.consistent_activity));
        m.insert("moderation_history", |c| num(c.profile.factors.moderation_history));
        m.insert("expertise", |c| num(c.profile.factors.expertise));
        m.insert("community_trust", |c| num(c.profile.factors.community_trust));
        m.insert("account_maturity", |c| num(c.profile.factors.account_maturity));
        m.insert("behavior_pattern", |c| num(c.profile.factors.behavior_pattern));
        m
    };
    static ref USER_HISTORY_FIELDS: HashMap<&'static str, Extractor> = {
        let mut m: HashMap<&'static str, Extractor> = HashMap::new();
        m.insert("total_violations", |c| num(c.profile.history.total_violations as f64));
        m.insert("recent_violations", |c| num(c.profile.history.recent_violations as f64));
        m.insert("content_count", |c| num(c.profile.history.content_count as f64));
        m.insert("account_age_days", |c| num(c.profile.history.account_age_days));
        m.insert("total_points", |c| num(c.profile.history.total_points as f64));
        m
    };
    static ref TIME_FIELDS: HashMap<&'static str, Extractor> = {
        let mut m: HashMap<&'static str, Extractor> = HashMap::new();
        m.insert("hour", |c| num(c.timestamp.hour()));
        m.insert("minute", |c| num(c.timestamp.minute()));
        m.insert("day_of_week", |c| {
            text(c.timestamp.weekday().to_string().to_lowercase())
        });
        m.insert("is_weekend", |c| {
            FieldValue::Bool(c.timestamp.weekday().number_from_monday() >= 6)
        });
        m.insert("content_age_minutes", |c| {
            num((c.timestamp - c.content.submitted_at).num_minutes() as f64)
        });
        m
    };
    static ref METADATA_FIELDS: HashMap<&'static str, Extractor> = {
        let mut m: HashMap<&'static str, Extractor> = HashMap::new();
        m.insert("content_type", |c| text(c.content.content_type.to_string()));
        m.insert("content_id", |c| text(c.content.id.clone()));
        m.insert("author_id", |c| text(c.content.author_id.clone()));
        m.insert("text_length", |c| num(c.content.text.chars().count() as f64));
        m.insert("word_count", |c| num(c.analysis.quality.word_count as f64));
        m.insert("url_count", |c| num(c.analysis.spam.url_count as f64));
        m.insert("text", |c| text(c.content.text.clone()));
        m
    };
}

fn field_table(condition_type: ConditionType) -> &'static HashMap<&'static str, Extractor> {
    match condition_type {
        ConditionType::ContentAnalysis => &CONTENT_ANALYSIS_FIELDS,
        ConditionType::Reputation => &REPUTATION_FIELDS,
        ConditionType::UserHistory => &USER_HISTORY_FIELDS,
        ConditionType::Time => &TIME_FIELDS,
        ConditionType::Metadata => &METADATA_FIELDS,
    }
}

/// Look up a field through its condition type's extractor table.
pub fn extract(
    condition_type: ConditionType,
    field: &str,
    context: &RuleContext,
) -> Option<FieldValue> {
    field_table(condition_type)
        .get(field)
        .map(|extractor| extractor(context))
}

fn scalar_equals(actual: &FieldValue, expected: &ConditionValue) -> Result<bool, String> {
    match (actual, expected) {
        (FieldValue::Number(a), ConditionValue::Number(e)) => Ok((a - e).abs() < 1e-9),
        (FieldValue::Bool(a), ConditionValue::Bool(e)) => Ok(a == e),
        (FieldValue::Text(a), ConditionValue::Text(e)) => Ok(a.eq_ignore_ascii_case(e)),
        (actual, expected) => Err(format!("cannot compare {actual:?} with {expected}")),
    }
}

/// Apply `operator` to an extracted value. Type mismatches are errors,
/// which make the whole rule malformed.
pub fn compare(
    actual: &FieldValue,
    operator: Operator,
    expected: &ConditionValue,
) -> Result<bool, String> {
    match operator {
        Operator::Equals => scalar_equals(actual, expected),
        Operator::NotEquals => scalar_equals(actual, expected).map(|eq| !eq),
        Operator::GreaterThan | Operator::LessThan => match (actual, expected) {
            (FieldValue::Number(a), ConditionValue::Number(e)) => Ok(if operator == Operator::GreaterThan {
                a > e
            } else {
                a < e
            }),
            _ => Err(format!("{} needs numbers, got {actual:?}", operator.as_str())),
        },
        Operator::Contains | Operator::NotContains => {
            let needle = match expected {
                ConditionValue::Text(t) => t.to_lowercase(),
                other => return Err(format!("contains needs a text value, got {other}")),
            };
            let found = match actual {
                FieldValue::Text(t) => t.to_lowercase().contains(&needle),
                FieldValue::List(items) => items.iter().any(|i| i.to_lowercase() == needle),
                other => return Err(format!("contains needs text or a list, got {other:?}")),
            };
            Ok(if operator == Operator::Contains { found } else { !found })
        }
        Operator::In | Operator::NotIn => {
            let options = match expected {
                ConditionValue::List(options) => options,
                other => return Err(format!("in needs a list value, got {other}")),
            };
            let mut found = false;
            for option in options {
                if scalar_equals(actual, option)? {
                    found = true;
                    break;
                }
            }
            Ok(if operator == Operator::In { found } else { !found })
        }
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone)]
pub struct RuleExecutionResult {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: u8,
    pub triggered: bool,
    pub confidence: f64,
    pub matched_conditions: Vec<String>,
    pub actions: Vec<RuleAction>,
}

fn evaluate_condition(condition: &Condition, context: &RuleContext) -> Result<bool, String> {
    let actual = extract(condition.condition_type, &condition.field, context).ok_or_else(|| {
        format!(
            "unknown {} field '{}'",
            condition.condition_type.as_str(),
            condition.field
        )
    })?;
    compare(&actual, condition.operator, &condition.value)
}

/// Evaluates rules in descending priority order.
pub struct RuleEngine {
    config: RulesConfig,
}

impl RuleEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Weighted fraction of matching conditions, plus their descriptions.
    pub fn evaluate_rule(
        &self,
        rule: &ModerationRule,
        context: &RuleContext,
    ) -> Result<RuleExecutionResult, ModerationError> {
        let malformed = |reason: String| ModerationError::RuleEvaluation {
            rule_id: rule.id.clone(),
            reason,
        };
        rule.validate().map_err(malformed)?;

        let mut total = 0.0;
        let mut matched = 0.0;
        let mut matched_conditions = Vec::new();
        for condition in &rule.conditions {
            total += condition.weight;
            if evaluate_condition(condition, context).map_err(malformed)? {
                matched += condition.weight;
                matched_conditions.push(condition.to_string());
            }
        }

        let confidence = if total > 0.0 { matched / total } else { 0.0 };
        Ok(RuleExecutionResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            priority: rule.priority,
            triggered: confidence >= self.config.trigger_threshold,
            confidence,
            matched_conditions,
            actions: rule.actions.clone(),
        })
    }

    /// Evaluate every active rule, highest priority first. Malformed rules
    /// are skipped. A triggered block rule at or above the short-circuit
    /// priority stops evaluation.
    pub fn evaluate(
        &self,
        rules: &[ModerationRule],
        context: &RuleContext,
    ) -> Vec<RuleExecutionResult> {
        let mut ordered: Vec<&ModerationRule> = rules.iter().filter(|r| r.is_active).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        let mut results = Vec::new();
        for rule in ordered {
            let result = match self.evaluate_rule(rule, context) {
                Ok(result) => result,
                Err(e) => {
                    log::warn!("Skipping rule: {e}");
                    continue;
                }
            };

            let stop = result.triggered
                && rule.priority >= self.config.short_circuit_priority
                && rule.has_block_action();
            if result.triggered {
                log::debug!(
                    "Rule {} triggered on {} (confidence {:.2})",
                    rule.id,
                    context.content.id,
                    result.confidence
                );
            }
            results.push(result);

            if stop {
                log::debug!("Rule {} short-circuits lower-priority rules", rule.id);
                break;
            }
        }
        results
    }
}
