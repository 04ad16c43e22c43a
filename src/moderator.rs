//! The moderation entry points.
//!
//! `Moderator` wires the analyzer, reputation, decision, rule and consensus
//! engines to one `ModerationStore`. It is built once at startup and
//! shared by handle.

use crate::analysis::{AnalysisCache, AnalysisResult, ContentAnalyzer};
use crate::config::{Config, FailurePolicy};
use crate::consensus::{ConsensusEngine, ConsensusResult};
use crate::decision::effects::{self, Effect};
use crate::decision::{apply_rule_results, Assessment, DecisionEngine, Thresholds};
use crate::error::{ModerationError, Result};
use crate::model::{
    Content, ContentRecord, DecisionAction, DecisionRecord, FeedbackVote, ModerationDecision,
    QueueItem, QueueKind, QueueStatus, VoteInput, VoteOutcome,
};
use crate::reputation::{ReputationEngine, ReputationProfile};
use crate::rules::{ModerationRule, RuleCache, RuleContext, RuleEngine, RuleTrigger};
use crate::store::ModerationStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const ANALYSIS_CACHE_CAPACITY: usize = 10_000;
const QUEUE_SCAN_LIMIT: usize = 10_000;

/// Result of `get_consensus`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsensusStatus {
    Pending { have: usize, need: usize },
    Ready(ConsensusResult),
}

impl ConsensusStatus {
    pub fn into_result(self) -> Result<ConsensusResult> {
        match self {
            ConsensusStatus::Ready(result) => Ok(result),
            ConsensusStatus::Pending { have, need } => {
                Err(ModerationError::InsufficientVotes { have, need })
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsensusPassReport {
    pub evaluated: usize,
    pub overrides_queued: usize,
    pub threshold_adjustments: usize,
}

pub struct Moderator {
    config: Config,
    store: Arc<dyn ModerationStore>,
    analyzer: ContentAnalyzer,
    analysis_cache: AnalysisCache,
    reputation: ReputationEngine,
    decisions: DecisionEngine,
    rules: RuleEngine,
    rule_cache: RuleCache,
    consensus: ConsensusEngine,
}

impl Moderator {
    pub fn new(config: Config, store: Arc<dyn ModerationStore>) -> Self {
        Self {
            analyzer: ContentAnalyzer::new(),
            analysis_cache: AnalysisCache::new(ANALYSIS_CACHE_CAPACITY),
            reputation: ReputationEngine::new(Arc::clone(&store), config.reputation.clone()),
            decisions: DecisionEngine::new(config.decision.clone()),
            rules: RuleEngine::new(config.rules.clone()),
            rule_cache: RuleCache::new(Duration::from_secs(config.rules.cache_ttl_seconds)),
            consensus: ConsensusEngine::new(config.consensus.clone()),
            store,
            config,
        }
    }

    /// Like `new`, then reinstate thresholds learned in earlier runs.
    pub async fn open(config: Config, store: Arc<dyn ModerationStore>) -> Self {
        let moderator = Self::new(config, store);
        match moderator.store.load_thresholds().await {
            Ok(Some(saved)) => {
                moderator.decisions.restore_learned(&saved);
                let t = moderator.decisions.thresholds();
                log::info!(
                    "Restored learned block thresholds: toxicity {:.1}, spam {:.1}",
                    t.block_toxicity,
                    t.block_spam
                );
            }
            Ok(None) => {}
            Err(e) => log::warn!("Could not load learned thresholds, using configured: {e}"),
        }
        moderator
    }

    pub fn store(&self) -> &Arc<dyn ModerationStore> {
        &self.store
    }

    pub fn reputation(&self) -> &ReputationEngine {
        &self.reputation
    }

    /// Decision thresholds in force, including learned adjustments.
    pub fn thresholds(&self) -> Thresholds {
        self.decisions.thresholds()
    }

    /// Validate and store rules, then drop the cached rule sets.
    pub async fn import_rules(&self, rules: &[ModerationRule]) -> Result<usize> {
        for rule in rules {
            rule.validate().map_err(|reason| {
                ModerationError::Config(format!("rule {}: {reason}", rule.id))
            })?;
        }
        for rule in rules {
            self.store.upsert_rule(rule).await?;
        }
        self.rule_cache.invalidate();
        log::info!("Imported {} rules into {} store", rules.len(), self.store.name());
        Ok(rules.len())
    }

    /// Decide on a piece of content. Always returns a decision: internal
    /// failures resolve through the configured failure policy.
    pub async fn moderate(&self, content: &Content) -> ModerationDecision {
        let limit = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(limit, self.evaluate(content)).await {
            Ok((decision, effects)) => {
                self.execute(effects).await;
                decision
            }
            Err(_) => {
                let err = ModerationError::Timeout(self.config.request_timeout_ms);
                self.fail(content, &err).await
            }
        }
    }

    /// The decision path proper: returns the decision and the effects
    /// still to be applied.
    async fn evaluate(&self, content: &Content) -> (ModerationDecision, Vec<Effect>) {
        let content_hash = content.version_hash();

        let previous = match self.store.get_decision(&content.id).await {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Could not read current decision for {}: {e}", content.id);
                None
            }
        };
        if let Some(record) = &previous {
            if record.content_hash == content_hash && record.author_id == content.author_id {
                log::debug!("{} unchanged since last decision, reusing it", content.id);
                return (record.decision.clone(), Vec::new());
            }
        }

        let (analysis, profile) = tokio::join!(
            self.analysis_for(content, &content_hash),
            self.reputation.compute_or_default(&content.author_id),
        );

        let assessment = self.decisions.decide(&content.id, &analysis, &profile);
        let mut decision = assessment.decision.clone();

        let now = Utc::now();
        let edited = previous.is_some();
        let rule_results = {
            let submitted = self
                .rule_cache
                .rules(self.store.as_ref(), RuleTrigger::ContentSubmitted)
                .await;
            let mut rules = submitted.rules.clone();
            if edited {
                let on_edit = self
                    .rule_cache
                    .rules(self.store.as_ref(), RuleTrigger::ContentEdited)
                    .await;
                rules.extend(on_edit.rules.iter().cloned());
            }
            let context = RuleContext {
                content,
                analysis: &analysis,
                profile: &profile,
                timestamp: now,
            };
            self.rules.evaluate(&rules, &context)
        };
        apply_rule_results(&mut decision, &rule_results);
        log::info!(
            "Moderated {} by {}: {} ({:.2}) spam {:.1}->{:.1} toxicity {:.1}->{:.1} quality {:.1} x{:.2} [{}]",
            content.id,
            content.author_id,
            decision.action,
            decision.confidence,
            analysis.spam_score,
            assessment.adjusted_spam,
            analysis.toxicity_score,
            assessment.adjusted_toxicity,
            analysis.quality_score,
            assessment.multiplier,
            decision.reasons.join("; ")
        );

        let final_assessment = Assessment {
            decision: decision.clone(),
            ..assessment
        };
        let mut planned = effects::plan_decision(
            content,
            &final_assessment,
            final_assessment.log_entry(&content.author_id, &analysis),
            &profile,
            self.decisions.config().critical_toxicity,
            &self.decisions.config().restriction,
        );
        for result in &rule_results {
            planned.extend(effects::plan_rule(content, result, now));
        }

        self.record(content, &decision, &content_hash, &analysis).await;
        (decision, planned)
    }

    async fn analysis_for(&self, content: &Content, content_hash: &str) -> Arc<AnalysisResult> {
        if let Some(hit) = self.analysis_cache.get(&content.id, content_hash) {
            return hit;
        }
        let result = match self.analyzer.analyze_concurrent(&content.text).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Analysis of {} failed, using fallback: {e}", content.id);
                ContentAnalyzer::fallback(&content.text)
            }
        };
        let result = Arc::new(result);
        self.analysis_cache
            .insert(&content.id, content_hash, Arc::clone(&result));
        result
    }

    /// Persist the current decision and feed the author's history.
    async fn record(
        &self,
        content: &Content,
        decision: &ModerationDecision,
        content_hash: &str,
        analysis: &AnalysisResult,
    ) {
        let record = DecisionRecord {
            decision: decision.clone(),
            author_id: content.author_id.clone(),
            content_hash: content_hash.to_string(),
        };
        if let Err(e) = self.store.put_decision(&record).await {
            log::warn!("Failed to store decision for {}: {e}", content.id);
        }

        let history = ContentRecord {
            content_id: content.id.clone(),
            user_id: content.author_id.clone(),
            quality_score: analysis.quality_score,
            helpful_votes: 0,
            unhelpful_votes: 0,
            accepted: false,
            topic: None,
            submitted_at: content.submitted_at,
        };
        if let Err(e) = self.store.record_content(&history).await {
            log::warn!("Failed to record content history for {}: {e}", content.id);
        }
    }

    /// Apply planned effects. A failed effect is logged and skipped.
    async fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            let name = effect.name();
            let outcome = match effect {
                Effect::Notify(notification) => self.store.push_notification(&notification).await,
                Effect::Enqueue(item) => self.store.enqueue(&item).await,
                Effect::Restrict {
                    user_id,
                    restriction,
                    penalty_points,
                } => {
                    log::info!(
                        "Restricting {user_id} ({:?}) until {}: {}",
                        restriction.level,
                        restriction.until,
                        restriction.reason
                    );
                    match self.store.set_restriction(&user_id, &restriction).await {
                        Ok(()) if penalty_points != 0 => self
                            .reputation
                            .record_event(&user_id, -penalty_points, "restriction penalty")
                            .await
                            .map(|_| ()),
                        other => other,
                    }
                }
                Effect::RecordViolation { user_id, violation } => {
                    self.store.record_violation(&user_id, &violation).await
                }
                Effect::LogDecision(entry) => self.store.append_decision_log(&entry).await,
                Effect::AuditRuleTrigger(record) => self.store.record_rule_trigger(&record).await,
            };
            if let Err(e) = outcome {
                log::warn!("Effect {name} failed on {} store: {e}", self.store.name());
            }
        }
    }

    async fn fail(&self, content: &Content, err: &ModerationError) -> ModerationDecision {
        let (action, label) = match self.config.failure_policy {
            FailurePolicy::FailOpen => (DecisionAction::Allow, "failed open"),
            FailurePolicy::FailClosed => (DecisionAction::Review, "failed closed"),
        };
        log::warn!("Moderation of {} {label}: {err}", content.id);
        let decision =
            ModerationDecision::new(&content.id, action, 0.0).with_reason(format!("{label}: {err}"));

        // No content hash, so a retry runs the full path again.
        let record = DecisionRecord {
            decision: decision.clone(),
            author_id: content.author_id.clone(),
            content_hash: String::new(),
        };
        if let Err(e) = self.store.put_decision(&record).await {
            log::warn!("Failed to store fallback decision for {}: {e}", content.id);
        }
        if action == DecisionAction::Review {
            let mut item = QueueItem::new(&content.id, QueueKind::Review, 7, format!("{label}: {err}"));
            item.user_id = Some(content.author_id.clone());
            if let Err(e) = self.store.enqueue(&item).await {
                log::warn!("Failed to queue {} for review: {e}", content.id);
            }
        }
        decision
    }

    /// Record a community vote on the current decision for `content_id`.
    pub async fn submit_feedback(
        &self,
        content_id: &str,
        voter_id: &str,
        input: VoteInput,
    ) -> Result<VoteOutcome> {
        let record = match self
            .store
            .get_decision(content_id)
            .await
            .map_err(ModerationError::from_store)?
        {
            Some(record) => record,
            None => {
                return Ok(VoteOutcome::Rejected(format!(
                    "no decision recorded for {content_id}"
                )))
            }
        };
        if record.author_id == voter_id {
            return Ok(VoteOutcome::Rejected(
                "authors cannot vote on their own content".to_string(),
            ));
        }

        let voter: ReputationProfile = self.reputation.compute_or_default(voter_id).await;
        let vote = self
            .consensus
            .build_vote(content_id, &record.content_hash, &voter, input);

        match self
            .store
            .record_vote(&vote)
            .await
            .map_err(ModerationError::from_store)
        {
            Ok(()) => {
                log::info!(
                    "Vote on {content_id} by {voter_id} ({}, weight {:.2}): accurate={}",
                    vote.voter_trust_level,
                    vote.weight,
                    vote.was_accurate
                );
                Ok(VoteOutcome::Accepted)
            }
            Err(e @ ModerationError::DuplicateVote { .. }) => {
                log::debug!("Rejected vote: {e}");
                Ok(VoteOutcome::Rejected(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Consensus for one content id, pending until enough votes exist.
    pub async fn get_consensus(&self, content_id: &str) -> Result<ConsensusStatus> {
        let need = self.consensus.config().min_votes;
        let record = match self.store.get_decision(content_id).await? {
            Some(record) => record,
            None => return Ok(ConsensusStatus::Pending { have: 0, need }),
        };
        let votes = self.current_votes(&record).await?;

        Ok(match self.consensus.compute(&record.decision, &votes) {
            Some(result) => ConsensusStatus::Ready(result),
            None => ConsensusStatus::Pending {
                have: votes.len(),
                need,
            },
        })
    }

    /// Batch pass over every content id with enough votes: queue override
    /// recommendations for an administrator and apply learning signals.
    pub async fn run_consensus_pass(&self) -> Result<ConsensusPassReport> {
        let mut report = ConsensusPassReport::default();
        let candidates = self
            .store
            .contents_with_votes(self.consensus.config().min_votes)
            .await?;

        let already_queued: HashSet<String> = self
            .store
            .list_queue(Some(QueueStatus::Pending), QUEUE_SCAN_LIMIT)
            .await?
            .into_iter()
            .filter(|item| item.kind == QueueKind::ConsensusOverride)
            .map(|item| item.content_id)
            .collect();

        for content_id in candidates {
            let record = match self.store.get_decision(&content_id).await? {
                Some(record) => record,
                None => continue,
            };
            let votes = self.current_votes(&record).await?;
            let Some(result) = self.consensus.compute(&record.decision, &votes) else {
                continue;
            };
            report.evaluated += 1;

            if result.override_recommended && !already_queued.contains(&content_id) {
                let mut item = QueueItem::new(
                    &content_id,
                    QueueKind::ConsensusOverride,
                    8,
                    format!(
                        "consensus recommends {} over {} ({:.2}): {}",
                        result.consensus_action,
                        result.original_action,
                        result.confidence_score,
                        result.override_reasons.join("; ")
                    ),
                );
                item.user_id = Some(record.author_id.clone());
                self.store.enqueue(&item).await?;
                report.overrides_queued += 1;
                log::info!("Queued consensus override for {content_id}");
            }

            if let Some(signal) = self.consensus.learning_signal(&record.decision, &result) {
                if !self
                    .store
                    .mark_learned(&content_id, &record.content_hash)
                    .await?
                {
                    continue;
                }
                if let Some(thresholds) = self.decisions.apply_signal(signal) {
                    self.store.save_thresholds(&thresholds).await?;
                    report.threshold_adjustments += 1;
                }
            }
        }

        log::info!(
            "Consensus pass: {} evaluated, {} overrides queued, {} threshold adjustments",
            report.evaluated,
            report.overrides_queued,
            report.threshold_adjustments
        );
        Ok(report)
    }

    /// Votes cast on the text the current decision was made for.
    async fn current_votes(&self, record: &DecisionRecord) -> Result<Vec<FeedbackVote>> {
        let votes = self.store.votes_for(&record.decision.content_id).await?;
        Ok(votes
            .into_iter()
            .filter(|v| v.content_hash == record.content_hash)
            .collect())
    }

    /// Pending queue items, most urgent first.
    pub async fn pending_queue(&self, limit: usize) -> Result<Vec<QueueItem>> {
        Ok(self
            .store
            .list_queue(Some(QueueStatus::Pending), limit)
            .await?)
    }
}
