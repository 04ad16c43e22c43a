use super::model::{ModerationRule, RuleTrigger};
use crate::store::ModerationStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// One full load of the active rules for a trigger.
#[derive(Debug)]
pub struct RuleSnapshot {
    pub generation: u64,
    pub fetched_at: Instant,
    pub rules: Vec<ModerationRule>,
}

impl RuleSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Time-bounded rule cache. A refresh builds a new snapshot and swaps it
/// in whole, so readers hold either the old set or the new one.
pub struct RuleCache {
    ttl: Duration,
    generation: AtomicU64,
    snapshots: RwLock<HashMap<RuleTrigger, Arc<RuleSnapshot>>>,
}

impl RuleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    fn current(&self, trigger: RuleTrigger) -> Option<Arc<RuleSnapshot>> {
        self.snapshots
            .read()
            .ok()
            .and_then(|s| s.get(&trigger).cloned())
    }

    /// Active rules for `trigger`, reloading from the store once the TTL
    /// has passed. When the reload fails the previous snapshot is served.
    pub async fn rules(
        &self,
        store: &dyn ModerationStore,
        trigger: RuleTrigger,
    ) -> Arc<RuleSnapshot> {
        let current = self.current(trigger);
        if let Some(snapshot) = &current {
            if snapshot.is_fresh(self.ttl) {
                return Arc::clone(snapshot);
            }
        }

        match store.list_active_rules(trigger).await {
            Ok(rules) => {
                let snapshot = Arc::new(RuleSnapshot {
                    generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                    fetched_at: Instant::now(),
                    rules,
                });
                if let Ok(mut snapshots) = self.snapshots.write() {
                    snapshots.insert(trigger, Arc::clone(&snapshot));
                }
                log::debug!(
                    "Loaded {} {} rules (generation {})",
                    snapshot.rules.len(),
                    trigger.as_str(),
                    snapshot.generation
                );
                snapshot
            }
            Err(e) => {
                log::warn!("Rule reload from {} failed, serving cached rules: {e}", store.name());
                current.unwrap_or_else(|| {
                    Arc::new(RuleSnapshot {
                        generation: 0,
                        fetched_at: Instant::now(),
                        rules: Vec::new(),
                    })
                })
            }
        }
    }

    /// Drop all snapshots; the next read reloads.
    pub fn invalidate(&self) {
        if let Ok(mut snapshots) = self.snapshots.write() {
            snapshots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::{
        ActionTarget, Condition, ConditionType, ConditionValue, Operator, RuleAction,
    };
    use crate::store::MemoryStore;

    fn rule(id: &str) -> ModerationRule {
        ModerationRule {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            priority: 5,
            is_active: true,
            trigger: RuleTrigger::ContentSubmitted,
            conditions: vec![Condition {
                condition_type: ConditionType::ContentAnalysis,
                field: "spam_score".to_string(),
                operator: Operator::GreaterThan,
                value: ConditionValue::Number(50.0),
                weight: 1.0,
            }],
            actions: vec![RuleAction::Flag {
                target: ActionTarget::Content,
                reason: None,
            }],
            stats: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_reused_within_ttl() {
        let store = MemoryStore::new();
        store.upsert_rule(&rule("r1")).await.unwrap();
        let cache = RuleCache::new(Duration::from_secs(300));

        let first = cache.rules(&store, RuleTrigger::ContentSubmitted).await;
        store.upsert_rule(&rule("r2")).await.unwrap();
        let second = cache.rules(&store, RuleTrigger::ContentSubmitted).await;

        assert_eq!(first.generation, second.generation);
        assert_eq!(second.rules.len(), 1);

        cache.invalidate();
        let third = cache.rules(&store, RuleTrigger::ContentSubmitted).await;
        assert!(third.generation > first.generation);
        assert_eq!(third.rules.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_snapshot_reloads_whole() {
        let store = MemoryStore::new();
        store.upsert_rule(&rule("r1")).await.unwrap();
        let cache = RuleCache::new(Duration::ZERO);

        let first = cache.rules(&store, RuleTrigger::ContentSubmitted).await;
        store.upsert_rule(&rule("r2")).await.unwrap();
        let second = cache.rules(&store, RuleTrigger::ContentSubmitted).await;

        assert_eq!(first.rules.len(), 1);
        assert_eq!(second.rules.len(), 2);
        assert_eq!(second.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn test_store_failure_serves_stale() {
        let store = MemoryStore::new();
        store.upsert_rule(&rule("r1")).await.unwrap();
        let cache = RuleCache::new(Duration::ZERO);

        let first = cache.rules(&store, RuleTrigger::ContentSubmitted).await;
        store.set_unavailable(true);
        let stale = cache.rules(&store, RuleTrigger::ContentSubmitted).await;
        assert_eq!(stale.generation, first.generation);
        assert_eq!(stale.rules.len(), 1);

        let other = cache.rules(&store, RuleTrigger::Scheduled).await;
        assert!(other.rules.is_empty());
    }
}
