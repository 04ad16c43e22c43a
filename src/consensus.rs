//! Community consensus over past decisions.
//!
//! Votes are weighted by the voter's reputation and trust level. Once a
//! content id has enough votes, the weighted result can recommend an
//! override (always queued for an administrator) and nudge the decision
//! engine's block thresholds.

use crate::config::ConsensusConfig;
use crate::decision::ThresholdSignal;
use crate::model::{DecisionAction, FeedbackVote, ModerationDecision, VoteInput};
use crate::reputation::{ReputationProfile, TrustLevel};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_VOTE_WEIGHT: f64 = 0.1;
pub const MAX_VOTE_WEIGHT: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub content_id: String,
    pub original_action: DecisionAction,
    pub total_votes: usize,
    pub accurate_votes: usize,
    /// Unweighted share of votes calling the decision accurate
    pub agreement_rate: f64,
    pub consensus_action: DecisionAction,
    pub confidence_score: f64,
    pub override_recommended: bool,
    pub override_reasons: Vec<String>,
    pub expert_votes: usize,
    pub expert_disagreements: usize,
    pub weighted_mass: BTreeMap<DecisionAction, f64>,
}

/// Base weight by reputation tier.
pub fn reputation_tier_weight(reputation: f64) -> f64 {
    match reputation {
        r if r < 50.0 => 0.5,
        r if r < 150.0 => 1.0,
        r if r < 300.0 => 1.25,
        r if r < 500.0 => 1.5,
        _ => 2.0,
    }
}

pub fn trust_multiplier(trust: TrustLevel) -> f64 {
    match trust {
        TrustLevel::Admin | TrustLevel::Moderator => 3.0,
        TrustLevel::Expert => 2.5,
        TrustLevel::Trusted => 1.5,
        TrustLevel::New => 0.8,
        TrustLevel::Restricted => 0.3,
    }
}

pub fn vote_weight(reputation: f64, trust: TrustLevel) -> f64 {
    (reputation_tier_weight(reputation) * trust_multiplier(trust))
        .clamp(MIN_VOTE_WEIGHT, MAX_VOTE_WEIGHT)
}

pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Turn caller input into a stored vote, weighted by the voter's profile.
    pub fn build_vote(
        &self,
        content_id: &str,
        content_hash: &str,
        voter: &ReputationProfile,
        input: VoteInput,
    ) -> FeedbackVote {
        FeedbackVote {
            content_id: content_id.to_string(),
            content_hash: content_hash.to_string(),
            voter_id: voter.user_id.clone(),
            was_accurate: input.was_accurate,
            suggested_action: input.suggested_action,
            categories: input.categories,
            weight: vote_weight(voter.overall_score, voter.trust_level),
            voter_trust_level: voter.trust_level,
            voter_reputation: voter.overall_score,
            submitted_at: Utc::now(),
        }
    }

    /// `None` until `min_votes` votes exist.
    pub fn compute(
        &self,
        original: &ModerationDecision,
        votes: &[FeedbackVote],
    ) -> Option<ConsensusResult> {
        let total_votes = votes.len();
        if total_votes < self.config.min_votes {
            return None;
        }

        let accurate_votes = votes.iter().filter(|v| v.was_accurate).count();
        let agreement_rate = accurate_votes as f64 / total_votes as f64;

        let mut weighted_mass: BTreeMap<DecisionAction, f64> = BTreeMap::new();
        for vote in votes {
            let target = match (vote.suggested_action, vote.was_accurate) {
                (Some(action), _) => action,
                (None, true) => original.action,
                (None, false) => continue,
            };
            *weighted_mass.entry(target).or_insert(0.0) += vote.weight;
        }
        let consensus_action = pick_action(&weighted_mass, original.action);

        let expert_votes = votes
            .iter()
            .filter(|v| v.voter_trust_level.is_expert())
            .count();
        let expert_disagreements = votes
            .iter()
            .filter(|v| v.voter_trust_level.is_expert())
            .filter(|v| {
                !v.was_accurate || v.suggested_action.map_or(false, |a| a != original.action)
            })
            .count();

        // The majority share, boosted by expert participation and volume.
        let expert_bonus =
            (expert_votes as f64 * self.config.expert_bonus).min(self.config.expert_bonus_cap);
        let excess = (total_votes - self.config.min_votes) as f64;
        let volume_bonus =
            (excess * self.config.volume_bonus).min(self.config.volume_bonus_cap);
        let confidence_score = (agreement_rate.max(1.0 - agreement_rate)
            + expert_bonus
            + volume_bonus)
            .clamp(0.0, 1.0);

        let mut override_reasons = Vec::new();
        if agreement_rate < self.config.low_agreement
            && confidence_score > self.config.low_agreement_confidence
        {
            override_reasons.push(format!(
                "only {:.0}% of voters agree with the decision",
                agreement_rate * 100.0
            ));
        }
        if expert_disagreements >= self.config.expert_disagreements
            && confidence_score > self.config.expert_disagreement_confidence
        {
            override_reasons.push(format!("{expert_disagreements} expert voters disagree"));
        }
        if original.confidence < self.config.weak_decision_confidence
            && confidence_score > self.config.weak_decision_consensus_confidence
            && consensus_action != original.action
        {
            override_reasons.push(format!(
                "weak decision ({:.2}) contradicted by strong consensus for {consensus_action}",
                original.confidence
            ));
        }

        Some(ConsensusResult {
            content_id: original.content_id.clone(),
            original_action: original.action,
            total_votes,
            accurate_votes,
            agreement_rate,
            consensus_action,
            confidence_score,
            override_recommended: !override_reasons.is_empty(),
            override_reasons,
            expert_votes,
            expert_disagreements,
            weighted_mass,
        })
    }

    /// Threshold feedback implied by a consensus result, if any.
    pub fn learning_signal(
        &self,
        original: &ModerationDecision,
        result: &ConsensusResult,
    ) -> Option<ThresholdSignal> {
        if original.action == DecisionAction::Block
            && result.agreement_rate < self.config.relax_block_agreement
        {
            return Some(ThresholdSignal::RelaxBlock);
        }
        if original.action == DecisionAction::Allow
            && original.confidence < self.config.weak_decision_confidence
            && result.consensus_action == DecisionAction::Block
            && result.confidence_score >= self.config.tighten_block_confidence
        {
            return Some(ThresholdSignal::TightenBlock);
        }
        None
    }
}

/// Heaviest action wins; ties go to the original action, then to the
/// less severe one.
fn pick_action(mass: &BTreeMap<DecisionAction, f64>, original: DecisionAction) -> DecisionAction {
    let mut best: Option<(DecisionAction, f64)> = None;
    for (&action, &weight) in mass {
        best = match best {
            None => Some((action, weight)),
            Some((current, current_weight)) => {
                if weight > current_weight
                    || (weight == current_weight && action == original)
                {
                    Some((action, weight))
                } else {
                    Some((current, current_weight))
                }
            }
        };
    }
    best.map(|(action, _)| action).unwrap_or(original)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig::default())
    }

    fn vote(
        voter: &str,
        accurate: bool,
        suggested: Option<DecisionAction>,
        trust: TrustLevel,
        reputation: f64,
    ) -> FeedbackVote {
        FeedbackVote {
            content_id: "c1".to_string(),
            content_hash: String::new(),
            voter_id: voter.to_string(),
            was_accurate: accurate,
            suggested_action: suggested,
            categories: Vec::new(),
            weight: vote_weight(reputation, trust),
            voter_trust_level: trust,
            voter_reputation: reputation,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_vote_weight_always_clamped() {
        for reputation in [-100.0, 0.0, 49.0, 50.0, 149.0, 299.0, 499.0, 500.0, 1e9] {
            for trust in TrustLevel::LADDER {
                let w = vote_weight(reputation, trust);
                assert!((MIN_VOTE_WEIGHT..=MAX_VOTE_WEIGHT).contains(&w));
            }
        }
        assert_eq!(vote_weight(10.0, TrustLevel::Restricted), 0.15);
        assert_eq!(vote_weight(600.0, TrustLevel::Admin), 3.0);
    }

    #[test]
    fn test_pending_below_minimum() {
        let original = ModerationDecision::new("c1", DecisionAction::Flag, 0.65);
        let votes: Vec<_> = (0..4)
            .map(|i| vote(&format!("v{i}"), true, None, TrustLevel::Trusted, 200.0))
            .collect();
        assert!(engine().compute(&original, &votes).is_none());

        let mut votes = votes;
        votes.push(vote("v4", true, None, TrustLevel::Trusted, 200.0));
        let result = engine().compute(&original, &votes).unwrap();
        assert_eq!(result.total_votes, 5);
        assert_eq!(result.agreement_rate, 1.0);
        assert_eq!(result.consensus_action, DecisionAction::Flag);
        assert!(!result.override_recommended);
    }

    #[test]
    fn test_experts_overturn_block() {
        let original = ModerationDecision::new("c1", DecisionAction::Block, 0.95);
        let votes = vec![
            vote("a", true, None, TrustLevel::Trusted, 200.0),
            vote("e1", false, Some(DecisionAction::Allow), TrustLevel::Expert, 350.0),
            vote("e2", false, Some(DecisionAction::Allow), TrustLevel::Expert, 320.0),
            vote("n1", false, Some(DecisionAction::Flag), TrustLevel::New, 60.0),
            vote("n2", false, Some(DecisionAction::Flag), TrustLevel::New, 80.0),
            vote("n3", false, None, TrustLevel::New, 90.0),
        ];
        let result = engine().compute(&original, &votes).unwrap();

        assert_eq!(result.total_votes, 6);
        assert_eq!(result.accurate_votes, 1);
        assert_eq!(result.expert_votes, 2);
        assert_eq!(result.expert_disagreements, 2);
        assert_eq!(result.consensus_action, DecisionAction::Allow);
        assert!(result.confidence_score > 0.7);
        assert!(result.override_recommended);
        assert_eq!(
            engine().learning_signal(&original, &result),
            Some(ThresholdSignal::RelaxBlock)
        );
    }

    #[test]
    fn test_weak_allow_contradicted_tightens() {
        let original = ModerationDecision::new("c1", DecisionAction::Allow, 0.55);
        let votes: Vec<_> = (0..6)
            .map(|i| {
                vote(
                    &format!("v{i}"),
                    false,
                    Some(DecisionAction::Block),
                    TrustLevel::Trusted,
                    200.0,
                )
            })
            .collect();
        let result = engine().compute(&original, &votes).unwrap();
        assert_eq!(result.consensus_action, DecisionAction::Block);
        assert!(result.override_recommended);
        assert_eq!(
            engine().learning_signal(&original, &result),
            Some(ThresholdSignal::TightenBlock)
        );
    }

    #[test]
    fn test_confidence_bonuses_capped() {
        let original = ModerationDecision::new("c1", DecisionAction::Review, 0.8);
        let votes: Vec<_> = (0..20)
            .map(|i| vote(&format!("v{i}"), i % 2 == 0, None, TrustLevel::Expert, 400.0))
            .collect();
        let result = engine().compute(&original, &votes).unwrap();
        // 0.5 majority share + 0.3 expert cap + 0.2 volume cap
        assert!((result.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_prefers_original_action() {
        let mut mass = BTreeMap::new();
        mass.insert(DecisionAction::Flag, 2.0);
        mass.insert(DecisionAction::Review, 2.0);
        assert_eq!(pick_action(&mass, DecisionAction::Review), DecisionAction::Review);
        assert_eq!(pick_action(&mass, DecisionAction::Block), DecisionAction::Flag);
        assert_eq!(pick_action(&BTreeMap::new(), DecisionAction::Block), DecisionAction::Block);
    }
}
