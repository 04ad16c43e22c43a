//! Side effects of a decision, as data.
//!
//! Planning is pure; `Moderator` executes the plan against the store and
//! logs (without failing the request) any effect that could not be applied.

use super::Assessment;
use crate::config::RestrictionPolicy;
use crate::model::{
    Content, DecisionAction, DecisionLogEntry, Notification, NotificationKind, QueueItem,
    QueueKind, Recipient, Restriction, RestrictionLevel, RuleTriggerRecord, Violation,
    ViolationSeverity,
};
use crate::reputation::ReputationProfile;
use crate::rules::{ActionTarget, RuleAction, RuleExecutionResult};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub enum Effect {
    Notify(Notification),
    Enqueue(QueueItem),
    Restrict {
        user_id: String,
        restriction: Restriction,
        penalty_points: i64,
    },
    RecordViolation {
        user_id: String,
        violation: Violation,
    },
    LogDecision(DecisionLogEntry),
    AuditRuleTrigger(RuleTriggerRecord),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Notify(_) => "notify",
            Effect::Enqueue(_) => "enqueue",
            Effect::Restrict { .. } => "restrict",
            Effect::RecordViolation { .. } => "record_violation",
            Effect::LogDecision(_) => "log_decision",
            Effect::AuditRuleTrigger(_) => "audit_rule_trigger",
        }
    }
}

fn queue_item(content: &Content, kind: QueueKind, priority: u8, reason: String) -> QueueItem {
    let mut item = QueueItem::new(&content.id, kind, priority, reason);
    item.user_id = Some(content.author_id.clone());
    item
}

/// Effects of the final decision for one submission.
pub fn plan_decision(
    content: &Content,
    assessment: &Assessment,
    log_entry: DecisionLogEntry,
    profile: &ReputationProfile,
    critical_toxicity: f64,
    policy: &RestrictionPolicy,
) -> Vec<Effect> {
    let decision = &assessment.decision;
    let summary = decision.reasons.join("; ");
    let mut effects = Vec::new();

    match decision.action {
        DecisionAction::Block => {
            effects.push(Effect::Notify(Notification::new(
                Recipient::User(content.author_id.clone()),
                NotificationKind::ContentHidden,
                &content.id,
                format!("Your {} was hidden: {summary}", content.content_type),
            )));
            effects.push(Effect::Notify(Notification::new(
                Recipient::User(content.author_id.clone()),
                NotificationKind::Warning,
                &content.id,
                "Content that breaks the community guidelines is removed; repeated violations lead to restrictions",
            )));
            effects.push(Effect::Enqueue(queue_item(
                content,
                QueueKind::UrgentReview,
                10,
                summary.clone(),
            )));
            let severity = if assessment.adjusted_toxicity >= critical_toxicity {
                ViolationSeverity::Severe
            } else {
                ViolationSeverity::Moderate
            };
            effects.push(Effect::RecordViolation {
                user_id: content.author_id.clone(),
                violation: Violation {
                    content_id: content.id.clone(),
                    severity,
                    reason: summary.clone(),
                    at: decision.timestamp,
                },
            });
        }
        DecisionAction::Review => {
            effects.push(Effect::Enqueue(queue_item(
                content,
                QueueKind::Review,
                7,
                summary.clone(),
            )));
            if decision.confidence > 0.85 {
                effects.push(Effect::Notify(Notification::new(
                    Recipient::Moderators,
                    NotificationKind::ModeratorAlert,
                    &content.id,
                    format!("High-confidence review needed: {summary}"),
                )));
            }
        }
        DecisionAction::Flag => {
            effects.push(Effect::Enqueue(queue_item(
                content,
                QueueKind::Monitoring,
                5,
                summary.clone(),
            )));
        }
        DecisionAction::Allow => {}
    }

    if decision.action != DecisionAction::Allow
        && profile.overall_score < policy.reputation_below
        && decision.confidence > policy.min_confidence
    {
        effects.push(Effect::Restrict {
            user_id: content.author_id.clone(),
            restriction: Restriction {
                level: RestrictionLevel::Posting,
                reason: format!("low reputation and {} decision", decision.action),
                until: decision.timestamp + Duration::hours(policy.hours),
            },
            penalty_points: policy.penalty_points,
        });
    }

    effects.push(Effect::LogDecision(log_entry));
    effects
}

/// Effects of one triggered rule beyond its influence on the decision.
/// Block, flag and review are applied through `apply_rule_results`; a
/// review with an explicit priority also gets its own queue item.
pub fn plan_rule(
    content: &Content,
    result: &RuleExecutionResult,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    if !result.triggered {
        return effects;
    }

    let label = format!("rule '{}'", result.rule_name);
    for action in &result.actions {
        match action {
            RuleAction::Block { .. } | RuleAction::Flag { .. } => {}
            RuleAction::Review {
                priority: Some(priority),
                reason,
                ..
            } => {
                let why = reason.clone().unwrap_or_else(|| label.clone());
                effects.push(Effect::Enqueue(queue_item(
                    content,
                    QueueKind::Review,
                    *priority,
                    why,
                )));
            }
            RuleAction::Review { .. } => {}
            RuleAction::Warn { message, .. } => {
                effects.push(Effect::Notify(Notification::new(
                    Recipient::User(content.author_id.clone()),
                    NotificationKind::Warning,
                    &content.id,
                    message.clone(),
                )));
            }
            RuleAction::Restrict {
                duration_hours,
                level,
                ..
            } => {
                effects.push(Effect::Restrict {
                    user_id: content.author_id.clone(),
                    restriction: Restriction {
                        level: *level,
                        reason: label.clone(),
                        until: now + Duration::hours(*duration_hours),
                    },
                    penalty_points: 0,
                });
            }
            RuleAction::Notify { target, message } => {
                let recipient = match target {
                    ActionTarget::User => Recipient::User(content.author_id.clone()),
                    ActionTarget::Content | ActionTarget::Moderator => Recipient::Moderators,
                };
                let kind = match recipient {
                    Recipient::User(_) => NotificationKind::Warning,
                    Recipient::Moderators => NotificationKind::ModeratorAlert,
                };
                effects.push(Effect::Notify(Notification::new(
                    recipient,
                    kind,
                    &content.id,
                    message.clone(),
                )));
            }
            RuleAction::Assign { moderator_id, .. } => {
                let mut item = queue_item(
                    content,
                    QueueKind::ModeratorAssignment,
                    result.priority,
                    label.clone(),
                );
                item.assignee = moderator_id.clone();
                effects.push(Effect::Enqueue(item));
            }
            RuleAction::Escalate { reason, .. } => {
                let why = reason.clone().unwrap_or_else(|| label.clone());
                effects.push(Effect::Enqueue(queue_item(
                    content,
                    QueueKind::Escalation,
                    9,
                    why,
                )));
            }
        }
    }

    effects.push(Effect::AuditRuleTrigger(RuleTriggerRecord {
        rule_id: result.rule_id.clone(),
        content_id: content.id.clone(),
        user_id: content.author_id.clone(),
        matched_conditions: result.matched_conditions.clone(),
        confidence: result.confidence,
        actions: result.actions.iter().map(|a| a.name().to_string()).collect(),
        triggered_at: now,
    }));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecisionConfig, ReputationConfig};
    use crate::decision::DecisionEngine;
    use crate::model::{ContentType, ModerationDecision, UserActivity};
    use crate::reputation::build_profile;

    fn content() -> Content {
        Content::new("c1", ContentType::Answer, "text", "author")
    }

    fn assessment(action: DecisionAction, confidence: f64) -> Assessment {
        Assessment {
            decision: ModerationDecision::new("c1", action, confidence).with_reason("test"),
            raw_action: action,
            multiplier: 1.0,
            adjusted_spam: 0.0,
            adjusted_toxicity: 95.0,
        }
    }

    fn profile(score: f64) -> ReputationProfile {
        let mut p = build_profile(
            &UserActivity::empty("author"),
            None,
            &ReputationConfig::default(),
            Utc::now(),
        );
        p.overall_score = score;
        p
    }

    fn plan(action: DecisionAction, confidence: f64, score: f64) -> Vec<Effect> {
        let a = assessment(action, confidence);
        let entry = a.log_entry("author", &crate::analysis::ContentAnalyzer::fallback("text"));
        let config = DecisionConfig::default();
        plan_decision(
            &content(),
            &a,
            entry,
            &profile(score),
            config.critical_toxicity,
            &config.restriction,
        )
    }

    fn queued(effects: &[Effect]) -> Vec<(QueueKind, u8)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Enqueue(item) => Some((item.kind, item.priority)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_block_effects() {
        let effects = plan(DecisionAction::Block, 0.98, 120.0);
        assert_eq!(queued(&effects), vec![(QueueKind::UrgentReview, 10)]);
        let notices = effects
            .iter()
            .filter(|e| matches!(e, Effect::Notify(_)))
            .count();
        assert_eq!(notices, 2);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::RecordViolation { violation, .. } if violation.severity == ViolationSeverity::Severe
        )));
        assert!(matches!(effects.last(), Some(Effect::LogDecision(_))));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Restrict { .. })));
    }

    #[test]
    fn test_review_notifies_only_when_confident() {
        let effects = plan(DecisionAction::Review, 0.8, 120.0);
        assert_eq!(queued(&effects), vec![(QueueKind::Review, 7)]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Notify(_))));

        let effects = plan(DecisionAction::Review, 0.9, 120.0);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Notify(n) if n.recipient == Recipient::Moderators
        )));
    }

    #[test]
    fn test_flag_and_allow() {
        let effects = plan(DecisionAction::Flag, 0.65, 120.0);
        assert_eq!(queued(&effects), vec![(QueueKind::Monitoring, 5)]);

        let effects = plan(DecisionAction::Allow, 0.9, 10.0);
        assert!(queued(&effects).is_empty());
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_low_reputation_restriction() {
        let effects = plan(DecisionAction::Review, 0.85, 20.0);
        let restrict = effects.iter().find_map(|e| match e {
            Effect::Restrict {
                restriction,
                penalty_points,
                ..
            } => Some((restriction.clone(), *penalty_points)),
            _ => None,
        });
        let (restriction, penalty) = restrict.unwrap();
        assert_eq!(penalty, 10);
        assert_eq!(restriction.level, RestrictionLevel::Posting);

        // Confidence must exceed the policy minimum.
        let effects = plan(DecisionAction::Review, 0.8, 20.0);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Restrict { .. })));
    }

    #[test]
    fn test_rule_effects_and_audit() {
        let result = RuleExecutionResult {
            rule_id: "r1".to_string(),
            rule_name: "links".to_string(),
            priority: 6,
            triggered: true,
            confidence: 0.75,
            matched_conditions: vec!["metadata.url_count > 2".to_string()],
            actions: vec![
                RuleAction::Flag {
                    target: ActionTarget::Content,
                    reason: None,
                },
                RuleAction::Warn {
                    target: ActionTarget::User,
                    message: "too many links".to_string(),
                },
                RuleAction::Assign {
                    target: ActionTarget::Moderator,
                    moderator_id: Some("mod-1".to_string()),
                },
                RuleAction::Escalate {
                    target: ActionTarget::Moderator,
                    reason: None,
                },
            ],
        };
        let effects = plan_rule(&content(), &result, Utc::now());
        assert_eq!(
            queued(&effects),
            vec![(QueueKind::ModeratorAssignment, 6), (QueueKind::Escalation, 9)]
        );
        match effects.last() {
            Some(Effect::AuditRuleTrigger(record)) => {
                assert_eq!(record.actions, vec!["flag", "warn", "assign", "escalate"]);
                assert_eq!(record.confidence, 0.75);
            }
            other => panic!("expected audit record, got {other:?}"),
        }

        let idle = RuleExecutionResult {
            triggered: false,
            ..result
        };
        assert!(plan_rule(&content(), &idle, Utc::now()).is_empty());
    }

    #[test]
    fn test_engine_output_plans_cleanly() {
        let engine = DecisionEngine::new(DecisionConfig::default());
        let analysis = crate::analysis::ContentAnalyzer::new().analyze("i will hurt you");
        let p = profile(120.0);
        let assessment = engine.decide("c1", &analysis, &p);
        let entry = assessment.log_entry("author", &analysis);
        let effects = plan_decision(
            &content(),
            &assessment,
            entry,
            &p,
            engine.config().critical_toxicity,
            &engine.config().restriction,
        );
        assert_eq!(queued(&effects), vec![(QueueKind::UrgentReview, 10)]);
    }
}
