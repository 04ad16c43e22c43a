use super::{ModerationStore, StoreResult};
use crate::decision::Thresholds;
use crate::error::StoreError;
use crate::model::{
    ContentRecord, DecisionLogEntry, DecisionRecord, FeedbackVote, Notification, PointEvent,
    QueueItem, QueueStatus, Recipient, Restriction, RuleTriggerRecord, UserActivity, Violation,
};
use crate::reputation::ReputationProfile;
use crate::rules::{ModerationRule, RuleTrigger};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    profiles: HashMap<String, ReputationProfile>,
    activity: HashMap<String, UserActivity>,
    restrictions: HashMap<String, Restriction>,
    decisions: HashMap<String, DecisionRecord>,
    decision_log: Vec<DecisionLogEntry>,
    rules: HashMap<String, ModerationRule>,
    rule_triggers: Vec<RuleTriggerRecord>,
    queue: Vec<QueueItem>,
    notifications: Vec<Notification>,
    votes: HashMap<String, Vec<FeedbackVote>>,
    thresholds: Option<Thresholds>,
    learned: HashSet<(String, String)>,
}

impl Inner {
    fn activity_mut(&mut self, user_id: &str) -> &mut UserActivity {
        self.activity
            .entry(user_id.to_string())
            .or_insert_with(|| UserActivity::empty(user_id))
    }
}

/// In-memory store. All operations take one write or read lock, so every
/// call is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's history wholesale.
    pub async fn seed_activity(&self, activity: UserActivity) {
        let mut inner = self.inner.write().await;
        inner.activity.insert(activity.user_id.clone(), activity);
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<ReputationProfile>> {
        self.check()?;
        Ok(self.inner.read().await.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &ReputationProfile) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn user_activity(&self, user_id: &str) -> StoreResult<UserActivity> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserActivity::empty(user_id)))
    }

    async fn record_content(&self, record: &ContentRecord) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let activity = inner.activity_mut(&record.user_id);
        activity
            .contents
            .retain(|c| c.content_id != record.content_id);
        activity.contents.push(record.clone());
        Ok(())
    }

    async fn adjust_points(&self, user_id: &str, delta: i64, reason: &str) -> StoreResult<i64> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let activity = inner.activity_mut(user_id);
        activity.point_events.push(PointEvent {
            delta,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        Ok(activity.total_points())
    }

    async fn record_violation(&self, user_id: &str, violation: &Violation) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner.activity_mut(user_id).violations.push(violation.clone());
        Ok(())
    }

    async fn set_restriction(&self, user_id: &str, restriction: &Restriction) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner
            .restrictions
            .insert(user_id.to_string(), restriction.clone());
        Ok(())
    }

    async fn active_restriction(&self, user_id: &str) -> StoreResult<Option<Restriction>> {
        self.check()?;
        let now = Utc::now();
        let inner = self.inner.read().await;
        Ok(inner
            .restrictions
            .get(user_id)
            .filter(|r| r.until > now)
            .cloned())
    }

    async fn put_decision(&self, record: &DecisionRecord) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner
            .decisions
            .insert(record.decision.content_id.clone(), record.clone());
        Ok(())
    }

    async fn get_decision(&self, content_id: &str) -> StoreResult<Option<DecisionRecord>> {
        self.check()?;
        Ok(self.inner.read().await.decisions.get(content_id).cloned())
    }

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> StoreResult<()> {
        self.check()?;
        self.inner.write().await.decision_log.push(entry.clone());
        Ok(())
    }

    async fn decision_log(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner.decision_log.iter().rev().take(limit).cloned().collect())
    }

    async fn upsert_rule(&self, rule: &ModerationRule) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        inner.rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn list_active_rules(&self, trigger: RuleTrigger) -> StoreResult<Vec<ModerationRule>> {
        self.check()?;
        let inner = self.inner.read().await;
        let mut rules: Vec<ModerationRule> = inner
            .rules
            .values()
            .filter(|r| r.is_active && r.trigger == trigger)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn record_rule_trigger(&self, record: &RuleTriggerRecord) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if let Some(rule) = inner.rules.get_mut(&record.rule_id) {
            rule.stats.record(record.confidence, record.triggered_at);
        }
        inner.rule_triggers.push(record.clone());
        Ok(())
    }

    async fn rule_triggers(&self, rule_id: &str) -> StoreResult<Vec<RuleTriggerRecord>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .rule_triggers
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn enqueue(&self, item: &QueueItem) -> StoreResult<()> {
        self.check()?;
        self.inner.write().await.queue.push(item.clone());
        Ok(())
    }

    async fn list_queue(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> StoreResult<Vec<QueueItem>> {
        self.check()?;
        let inner = self.inner.read().await;
        let mut items: Vec<QueueItem> = inner
            .queue
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit);
        Ok(items)
    }

    async fn push_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.check()?;
        self.inner
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn notifications(
        &self,
        recipient: &Recipient,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .iter()
            .rev()
            .filter(|n| &n.recipient == recipient)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_vote(&self, vote: &FeedbackVote) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let votes = inner.votes.entry(vote.content_id.clone()).or_default();
        if votes
            .iter()
            .any(|v| v.voter_id == vote.voter_id && v.content_hash == vote.content_hash)
        {
            return Err(StoreError::DuplicateVote {
                content_id: vote.content_id.clone(),
                voter_id: vote.voter_id.clone(),
            });
        }
        votes.push(vote.clone());
        Ok(())
    }

    async fn votes_for(&self, content_id: &str) -> StoreResult<Vec<FeedbackVote>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner.votes.get(content_id).cloned().unwrap_or_default())
    }

    async fn count_votes(&self, content_id: &str) -> StoreResult<usize> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner.votes.get(content_id).map_or(0, |v| v.len()))
    }

    async fn contents_with_votes(&self, min_votes: usize) -> StoreResult<Vec<String>> {
        self.check()?;
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner
            .votes
            .iter()
            .filter(|(_, votes)| votes.len() >= min_votes)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_thresholds(&self) -> StoreResult<Option<Thresholds>> {
        self.check()?;
        Ok(self.inner.read().await.thresholds.clone())
    }

    async fn save_thresholds(&self, thresholds: &Thresholds) -> StoreResult<()> {
        self.check()?;
        self.inner.write().await.thresholds = Some(thresholds.clone());
        Ok(())
    }

    async fn mark_learned(&self, content_id: &str, content_hash: &str) -> StoreResult<bool> {
        self.check()?;
        let mut inner = self.inner.write().await;
        Ok(inner
            .learned
            .insert((content_id.to_string(), content_hash.to_string())))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionAction, QueueKind};
    use crate::reputation::TrustLevel;

    fn vote(content_id: &str, voter_id: &str) -> FeedbackVote {
        FeedbackVote {
            content_id: content_id.to_string(),
            content_hash: "h1".to_string(),
            voter_id: voter_id.to_string(),
            was_accurate: true,
            suggested_action: None,
            categories: Vec::new(),
            weight: 1.0,
            voter_trust_level: TrustLevel::Trusted,
            voter_reputation: 160.0,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected() {
        let store = MemoryStore::new();
        store.record_vote(&vote("c1", "v1")).await.unwrap();
        store.record_vote(&vote("c1", "v2")).await.unwrap();
        let err = store.record_vote(&vote("c1", "v1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateVote { .. }));
        assert_eq!(store.count_votes("c1").await.unwrap(), 2);
        assert_eq!(store.contents_with_votes(2).await.unwrap(), vec!["c1"]);
        assert!(store.contents_with_votes(3).await.unwrap().is_empty());

        let mut edited = vote("c1", "v1");
        edited.content_hash = "h2".to_string();
        store.record_vote(&edited).await.unwrap();
        assert_eq!(store.count_votes("c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_points_are_cumulative() {
        let store = MemoryStore::new();
        assert_eq!(store.adjust_points("u1", 30, "answer").await.unwrap(), 30);
        assert_eq!(store.adjust_points("u1", -10, "penalty").await.unwrap(), 20);
        let activity = store.user_activity("u1").await.unwrap();
        assert_eq!(activity.point_events.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_point_adjustments() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.adjust_points("u1", 1, "upvote").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let activity = store.user_activity("u1").await.unwrap();
        assert_eq!(activity.total_points(), 50);
        assert_eq!(activity.point_events.len(), 50);
    }

    #[tokio::test]
    async fn test_decision_superseded() {
        let store = MemoryStore::new();
        let mut record = DecisionRecord {
            decision: crate::model::ModerationDecision::new("c1", DecisionAction::Flag, 0.6),
            author_id: "u1".to_string(),
            content_hash: "h1".to_string(),
        };
        store.put_decision(&record).await.unwrap();
        record.decision.action = DecisionAction::Block;
        store.put_decision(&record).await.unwrap();
        let current = store.get_decision("c1").await.unwrap().unwrap();
        assert_eq!(current.decision.action, DecisionAction::Block);
    }

    #[tokio::test]
    async fn test_queue_ordering() {
        let store = MemoryStore::new();
        store
            .enqueue(&QueueItem::new("c1", QueueKind::Monitoring, 5, "flag"))
            .await
            .unwrap();
        store
            .enqueue(&QueueItem::new("c2", QueueKind::UrgentReview, 10, "block"))
            .await
            .unwrap();
        store
            .enqueue(&QueueItem::new("c3", QueueKind::Review, 7, "review"))
            .await
            .unwrap();
        let items = store.list_queue(Some(QueueStatus::Pending), 10).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.content_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3", "c1"]);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_profile("u1").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.get_profile("u1").await.unwrap().is_none());
    }
}
