//! Decision Engine
//!
//! Turns an analysis and a reputation profile into a moderation decision.
//! Everything here is pure: side effects are planned as `Effect` values
//! (see `effects`) and executed by the caller.

pub mod effects;

use crate::analysis::AnalysisResult;
use crate::config::DecisionConfig;
use crate::model::{DecisionAction, DecisionLogEntry, ModerationDecision};
use crate::reputation::{ReputationProfile, TrustLevel};
use crate::rules::{RuleAction, RuleExecutionResult};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

pub use effects::Effect;

/// Score cutoffs of the decision matrix. Block thresholds move with
/// consensus feedback; the rest stay at their configured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub block_toxicity: f64,
    pub block_spam: f64,
    pub critical_toxicity: f64,
    pub review_toxicity: f64,
    pub review_spam: f64,
    pub review_quality: f64,
    pub flag_toxicity: f64,
    pub flag_spam: f64,
    pub flag_quality: f64,
}

impl Thresholds {
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self {
            block_toxicity: config.block_toxicity,
            block_spam: config.block_spam,
            critical_toxicity: config.critical_toxicity,
            review_toxicity: config.review_toxicity,
            review_spam: config.review_spam,
            review_quality: config.review_quality,
            flag_toxicity: config.flag_toxicity,
            flag_spam: config.flag_spam,
            flag_quality: config.flag_quality,
        }
    }
}

/// Threshold feedback derived from community consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSignal {
    /// Blocks were often judged wrong: raise block thresholds
    RelaxBlock,
    /// A weak allow was contradicted by a strong block consensus
    TightenBlock,
}

/// A decision together with the numbers that produced it.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub decision: ModerationDecision,
    /// Matrix outcome before post-adjustments
    pub raw_action: DecisionAction,
    pub multiplier: f64,
    pub adjusted_spam: f64,
    pub adjusted_toxicity: f64,
}

impl Assessment {
    pub fn log_entry(&self, author_id: &str, analysis: &AnalysisResult) -> DecisionLogEntry {
        DecisionLogEntry {
            content_id: self.decision.content_id.clone(),
            author_id: author_id.to_string(),
            action: self.decision.action,
            confidence: self.decision.confidence,
            spam_score: analysis.spam_score,
            toxicity_score: analysis.toxicity_score,
            quality_score: analysis.quality_score,
            adjusted_spam: self.adjusted_spam,
            adjusted_toxicity: self.adjusted_toxicity,
            multiplier: self.multiplier,
            reasons: self.decision.reasons.clone(),
            timestamp: self.decision.timestamp,
        }
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
    thresholds: RwLock<Thresholds>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        let thresholds = RwLock::new(Thresholds::from_config(&config));
        Self { config, thresholds }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Current thresholds, including any learned adjustments.
    pub fn thresholds(&self) -> Thresholds {
        match self.thresholds.read() {
            Ok(t) => t.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sensitivity factor applied to spam and toxicity before thresholding.
    pub fn reputation_multiplier(&self, profile: &ReputationProfile) -> f64 {
        let m = &self.config.multiplier;
        let mut multiplier = 1.0;

        if profile.overall_score < m.low_reputation {
            multiplier *= m.low_reputation_factor;
        } else if profile.overall_score > m.high_reputation {
            multiplier *= m.high_reputation_factor;
        }

        multiplier *= match profile.trust_level {
            TrustLevel::Expert | TrustLevel::Moderator | TrustLevel::Admin => m.expert_factor,
            TrustLevel::Trusted => m.trusted_factor,
            TrustLevel::New => m.new_factor,
            TrustLevel::Restricted => 1.0,
        };

        multiplier *= 1.0 + m.strike_step * profile.strikes() as f64;
        multiplier.clamp(m.min, m.max)
    }

    pub fn decide(
        &self,
        content_id: &str,
        analysis: &AnalysisResult,
        profile: &ReputationProfile,
    ) -> Assessment {
        let thresholds = self.thresholds();
        let multiplier = self.reputation_multiplier(profile);
        let adjusted_spam = (analysis.spam_score * multiplier).clamp(0.0, 100.0);
        let adjusted_toxicity = (analysis.toxicity_score * multiplier).clamp(0.0, 100.0);

        let (raw_action, confidence, reason) = matrix(
            &thresholds,
            adjusted_toxicity,
            adjusted_spam,
            analysis.quality_score,
            profile.strikes(),
        );
        let mut decision =
            ModerationDecision::new(content_id, raw_action, confidence).with_reason(reason);

        self.post_adjust(&mut decision, analysis, profile);

        log::debug!(
            "Decision for {}: {} ({:.2}), multiplier {:.2}, spam {:.1}->{:.1}, toxicity {:.1}->{:.1}",
            content_id,
            decision.action,
            decision.confidence,
            multiplier,
            analysis.spam_score,
            adjusted_spam,
            analysis.toxicity_score,
            adjusted_toxicity
        );

        Assessment {
            decision,
            raw_action,
            multiplier,
            adjusted_spam,
            adjusted_toxicity,
        }
    }

    /// Expert de-escalation first, then the escalations of an `allow`.
    fn post_adjust(
        &self,
        decision: &mut ModerationDecision,
        analysis: &AnalysisResult,
        profile: &ReputationProfile,
    ) {
        if decision.action == DecisionAction::Flag && profile.trust_level.is_expert() {
            decision.action = DecisionAction::Allow;
            decision.confidence *= 0.8;
            decision
                .reasons
                .push(format!("flag waived for {} contributor", profile.trust_level));
        }

        if decision.action != DecisionAction::Allow {
            return;
        }

        let escalation = if profile.history.recent_violations > 1 {
            Some((0.7, "multiple recent violations".to_string()))
        } else if profile.is_restricted() {
            Some((0.6, "user is under an active restriction".to_string()))
        } else if profile.is_new_user(self.config.new_user_days)
            && analysis.spam_score > self.config.new_user_spam
        {
            Some((0.6, "new user with potential spam indicators".to_string()))
        } else {
            None
        };

        if let Some((floor, reason)) = escalation {
            decision.action = DecisionAction::Flag;
            decision.confidence = decision.confidence.max(floor);
            decision.reasons.push(reason);
        }
    }

    /// Move block thresholds one step within their learning bounds.
    /// Returns the new thresholds when anything changed.
    pub fn apply_signal(&self, signal: ThresholdSignal) -> Option<Thresholds> {
        let learning = &self.config.learning;
        if !learning.enabled {
            return None;
        }

        let mut thresholds = match self.thresholds.write() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = thresholds.clone();
        let step = match signal {
            ThresholdSignal::RelaxBlock => learning.step,
            ThresholdSignal::TightenBlock => -learning.step,
        };
        thresholds.block_toxicity = (thresholds.block_toxicity + step)
            .clamp(learning.block_toxicity_min, learning.block_toxicity_max);
        thresholds.block_spam = (thresholds.block_spam + step)
            .clamp(learning.block_spam_min, learning.block_spam_max);

        if *thresholds == before {
            return None;
        }
        log::info!(
            "Block thresholds adjusted ({:?}): toxicity {:.1} -> {:.1}, spam {:.1} -> {:.1}",
            signal,
            before.block_toxicity,
            thresholds.block_toxicity,
            before.block_spam,
            thresholds.block_spam
        );
        Some(thresholds.clone())
    }

    /// Reinstate block thresholds learned in an earlier run, kept within
    /// the learning bounds. The other cutoffs stay as configured.
    pub fn restore_learned(&self, saved: &Thresholds) {
        let learning = &self.config.learning;
        let mut thresholds = match self.thresholds.write() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        thresholds.block_toxicity = saved
            .block_toxicity
            .clamp(learning.block_toxicity_min, learning.block_toxicity_max);
        thresholds.block_spam = saved
            .block_spam
            .clamp(learning.block_spam_min, learning.block_spam_max);
    }
}

/// The decision matrix; first matching row wins.
fn matrix(
    t: &Thresholds,
    toxicity: f64,
    spam: f64,
    quality: f64,
    strikes: usize,
) -> (DecisionAction, f64, String) {
    if toxicity >= t.block_toxicity || spam >= t.block_spam {
        let confidence = if toxicity >= t.critical_toxicity {
            0.98
        } else {
            0.95
        };
        let reason = if toxicity >= t.block_toxicity {
            format!("toxicity {toxicity:.1} at or above block threshold {:.1}", t.block_toxicity)
        } else {
            format!("spam {spam:.1} at or above block threshold {:.1}", t.block_spam)
        };
        return (DecisionAction::Block, confidence, reason);
    }

    if toxicity >= t.review_toxicity || spam >= t.review_spam || quality <= t.review_quality {
        let confidence = if strikes > 2 { 0.85 } else { 0.8 };
        let reason = format!(
            "needs review: toxicity {toxicity:.1}, spam {spam:.1}, quality {quality:.1}"
        );
        return (DecisionAction::Review, confidence, reason);
    }

    if toxicity >= t.flag_toxicity || spam >= t.flag_spam || quality <= t.flag_quality {
        let reason = format!(
            "flagged: toxicity {toxicity:.1}, spam {spam:.1}, quality {quality:.1}"
        );
        return (DecisionAction::Flag, 0.65, reason);
    }

    let confidence = (1.0 - toxicity.max(spam) / 100.0).clamp(0.5, 0.95);
    (DecisionAction::Allow, confidence, "no policy thresholds met".to_string())
}

/// Escalate a decision with the block/flag/review actions of triggered
/// rules. Rules never lower the severity of a decision.
pub fn apply_rule_results(decision: &mut ModerationDecision, results: &[RuleExecutionResult]) {
    for result in results.iter().filter(|r| r.triggered) {
        for action in &result.actions {
            let (target, reason) = match action {
                RuleAction::Block { reason, .. } => (DecisionAction::Block, reason),
                RuleAction::Review { reason, .. } => (DecisionAction::Review, reason),
                RuleAction::Flag { reason, .. } => (DecisionAction::Flag, reason),
                _ => continue,
            };
            let why = reason.as_deref().unwrap_or(target.as_str());
            decision
                .reasons
                .push(format!("rule '{}': {why}", result.rule_name));
            if target > decision.action {
                decision.action = target;
                decision.confidence = decision.confidence.max(result.confidence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ContentAnalyzer;
    use crate::config::ReputationConfig;
    use crate::model::{PointEvent, Restriction, RestrictionLevel, UserActivity, Violation, ViolationSeverity};
    use crate::reputation::build_profile;
    use chrono::{Duration, Utc};

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default())
    }

    fn analysis(spam: f64, toxicity: f64, quality: f64) -> AnalysisResult {
        let mut result =
            ContentAnalyzer::new().analyze("A calm and thoughtful note about the stay.");
        result.spam_score = spam;
        result.toxicity_score = toxicity;
        result.quality_score = quality;
        result
    }

    /// Profile with the given point total on an account `age_days` old.
    fn profile(points: i64, age_days: i64) -> ReputationProfile {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        activity.account_created_at = now - Duration::days(age_days);
        if points != 0 {
            activity.point_events.push(PointEvent {
                delta: points,
                reason: "seed".to_string(),
                at: now - Duration::days(90),
            });
        }
        build_profile(&activity, None, &ReputationConfig::default(), now)
    }

    fn with_score(mut profile: ReputationProfile, score: f64) -> ReputationProfile {
        profile.overall_score = score;
        profile.trust_level = TrustLevel::from_score(score);
        profile
    }

    #[test]
    fn test_multiplier_bounds() {
        let engine = engine();
        let neutral = with_score(profile(0, 365), 120.0);
        assert!((engine.reputation_multiplier(&neutral) - 1.2).abs() < 1e-9);

        let expert = with_score(profile(0, 365), 350.0);
        assert!((engine.reputation_multiplier(&expert) - 0.56).abs() < 1e-9);

        let mut repeat_offender = with_score(profile(0, 365), 10.0);
        repeat_offender.history.total_violations = 10;
        assert_eq!(engine.reputation_multiplier(&repeat_offender), 2.0);
    }

    #[test]
    fn test_threat_blocks_with_high_confidence() {
        let engine = engine();
        let text = "i will hurt you";
        let result = ContentAnalyzer::new().analyze(text);
        let assessment = engine.decide("c1", &result, &with_score(profile(0, 365), 120.0));
        assert_eq!(assessment.decision.action, DecisionAction::Block);
        assert_eq!(assessment.decision.confidence, 0.98);

        // A trusted author lowers adjusted toxicity below the critical band.
        let assessment = engine.decide("c1", &result, &with_score(profile(0, 365), 160.0));
        assert_eq!(assessment.decision.action, DecisionAction::Block);
        assert_eq!(assessment.decision.confidence, 0.95);
    }

    #[test]
    fn test_new_user_spam_escalates_to_flag() {
        let engine = engine();
        let new_user = with_score(profile(0, 3), 100.0);
        assert_eq!(new_user.trust_level, TrustLevel::New);

        let assessment = engine.decide("c1", &analysis(35.0, 0.0, 80.0), &new_user);
        assert_eq!(assessment.raw_action, DecisionAction::Allow);
        assert_eq!(assessment.decision.action, DecisionAction::Flag);
        assert!(assessment.decision.confidence >= 0.6);
        assert!(assessment
            .decision
            .reasons
            .iter()
            .any(|r| r == "new user with potential spam indicators"));
    }

    #[test]
    fn test_expert_flag_deescalated() {
        let engine = engine();
        let expert = with_score(profile(0, 800), 320.0);
        assert_eq!(expert.trust_level, TrustLevel::Expert);

        let assessment = engine.decide("c1", &analysis(0.0, 0.0, 35.0), &expert);
        assert_eq!(assessment.raw_action, DecisionAction::Flag);
        assert_eq!(assessment.decision.action, DecisionAction::Allow);
        assert!((assessment.decision.confidence - 0.65 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_recent_violations_and_restriction_escalate() {
        let engine = engine();
        let now = Utc::now();

        let mut offender = with_score(profile(0, 365), 120.0);
        offender.history.recent_violations = 2;
        let assessment = engine.decide("c1", &analysis(0.0, 0.0, 90.0), &offender);
        assert_eq!(assessment.decision.action, DecisionAction::Flag);
        assert!(assessment.decision.confidence >= 0.7);

        let mut activity = UserActivity::empty("u2");
        activity.account_created_at = now - Duration::days(365);
        let restriction = Restriction {
            level: RestrictionLevel::Posting,
            reason: "test".to_string(),
            until: now + Duration::hours(2),
        };
        let restricted = build_profile(&activity, Some(&restriction), &ReputationConfig::default(), now);
        let assessment = engine.decide("c2", &analysis(0.0, 0.0, 90.0), &restricted);
        assert_eq!(assessment.decision.action, DecisionAction::Flag);
    }

    #[test]
    fn test_review_confidence_with_strikes() {
        let engine = engine();
        let mut user = with_score(profile(0, 365), 160.0);
        let assessment = engine.decide("c1", &analysis(0.0, 0.0, 20.0), &user);
        assert_eq!(assessment.decision.action, DecisionAction::Review);
        assert_eq!(assessment.decision.confidence, 0.8);

        user.history.total_violations = 3;
        let assessment = engine.decide("c1", &analysis(0.0, 0.0, 20.0), &user);
        assert_eq!(assessment.decision.confidence, 0.85);
    }

    #[test]
    fn test_action_monotonic_in_scores() {
        let engine = engine();
        let mut strikes = profile(0, 365);
        strikes.history.total_violations = 1;
        strikes.history.recent_violations = 1;
        let profiles = [
            profile(0, 2),
            with_score(profile(0, 365), 20.0),
            with_score(profile(0, 365), 180.0),
            with_score(profile(0, 900), 600.0),
            strikes,
        ];

        for p in &profiles {
            for quality in [20.0, 50.0, 90.0] {
                for fixed in [0.0, 45.0, 90.0] {
                    let mut last_tox = DecisionAction::Allow;
                    let mut last_spam = DecisionAction::Allow;
                    for step in 0..=20 {
                        let score = step as f64 * 5.0;
                        let by_tox = engine
                            .decide("c", &analysis(fixed, score, quality), p)
                            .decision
                            .action;
                        let by_spam = engine
                            .decide("c", &analysis(score, fixed, quality), p)
                            .decision
                            .action;
                        assert!(by_tox >= last_tox, "toxicity {score} lowered severity");
                        assert!(by_spam >= last_spam, "spam {score} lowered severity");
                        last_tox = by_tox;
                        last_spam = by_spam;
                    }
                }
            }
        }
    }

    #[test]
    fn test_learning_is_bounded() {
        let engine = engine();
        for _ in 0..100 {
            engine.apply_signal(ThresholdSignal::RelaxBlock);
        }
        let t = engine.thresholds();
        assert_eq!(t.block_toxicity, 95.0);
        assert_eq!(t.block_spam, 95.0);
        assert!(engine.apply_signal(ThresholdSignal::RelaxBlock).is_none());

        for _ in 0..100 {
            engine.apply_signal(ThresholdSignal::TightenBlock);
        }
        let t = engine.thresholds();
        assert_eq!(t.block_toxicity, 70.0);
        assert_eq!(t.block_spam, 75.0);
    }

    #[test]
    fn test_restore_learned_clamps_block_only() {
        let engine = engine();
        let mut saved = engine.thresholds();
        saved.block_toxicity = 90.0;
        saved.block_spam = 200.0;
        saved.review_toxicity = 1.0;
        engine.restore_learned(&saved);

        let t = engine.thresholds();
        assert_eq!(t.block_toxicity, 90.0);
        assert_eq!(t.block_spam, 95.0);
        assert_eq!(t.review_toxicity, engine.config().review_toxicity);
    }

    #[test]
    fn test_single_nudge_moves_one_step() {
        let engine = engine();
        let t = engine.apply_signal(ThresholdSignal::TightenBlock).unwrap();
        assert_eq!(t.block_toxicity, 79.0);
        assert_eq!(t.block_spam, 84.0);
    }

    #[test]
    fn test_rules_only_escalate() {
        let mut decision = ModerationDecision::new("c1", DecisionAction::Review, 0.8);
        let result = RuleExecutionResult {
            rule_id: "r1".to_string(),
            rule_name: "advisory".to_string(),
            priority: 3,
            triggered: true,
            confidence: 1.0,
            matched_conditions: vec![],
            actions: vec![RuleAction::Flag {
                target: Default::default(),
                reason: None,
            }],
        };
        apply_rule_results(&mut decision, &[result.clone()]);
        assert_eq!(decision.action, DecisionAction::Review);
        assert_eq!(decision.confidence, 0.8);

        let blocking = RuleExecutionResult {
            actions: vec![RuleAction::Block {
                target: Default::default(),
                reason: Some("banned phrase".to_string()),
            }],
            ..result
        };
        apply_rule_results(&mut decision, &[blocking]);
        assert_eq!(decision.action, DecisionAction::Block);
        assert_eq!(decision.confidence, 1.0);
        assert!(decision.reasons.iter().any(|r| r.contains("banned phrase")));
    }

    #[test]
    fn test_log_entry_carries_scores() {
        let engine = engine();
        let result = analysis(40.0, 10.0, 70.0);
        let assessment = engine.decide("c1", &result, &with_score(profile(0, 365), 120.0));
        let entry = assessment.log_entry("u1", &result);
        assert_eq!(entry.spam_score, 40.0);
        assert!((entry.adjusted_spam - 48.0).abs() < 1e-9);
        assert_eq!(entry.action, assessment.decision.action);
    }

    #[test]
    fn test_violation_records_count_as_strikes() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        activity.violations.push(Violation {
            content_id: "old".to_string(),
            severity: ViolationSeverity::Minor,
            reason: "spam".to_string(),
            at: now - Duration::days(200),
        });
        let p = build_profile(&activity, None, &ReputationConfig::default(), now);
        assert_eq!(p.strikes(), 1);
        // New (1.2) with one strike (1.2)
        assert!((engine().reputation_multiplier(&p) - 1.44).abs() < 1e-9);
    }
}
