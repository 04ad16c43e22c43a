//! Persistence boundary of the moderation core.
//!
//! - **ModerationStore**: the contract every backend honors
//! - **MemoryStore**: in-process maps, used by tests and embedders
//! - **SqliteStore**: rusqlite-backed production store

pub mod memory;
pub mod sqlite;

use crate::decision::Thresholds;
use crate::error::StoreError;
use crate::model::{
    ContentRecord, DecisionLogEntry, DecisionRecord, FeedbackVote, Notification, QueueItem,
    QueueStatus, Recipient, Restriction, RuleTriggerRecord, UserActivity, Violation,
};
use crate::reputation::ReputationProfile;
use crate::rules::{ModerationRule, RuleTrigger};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<ReputationProfile>>;

    /// Insert or replace the profile for `profile.user_id`.
    async fn upsert_profile(&self, profile: &ReputationProfile) -> StoreResult<()>;

    /// History used for reputation. Unknown users get an empty history.
    async fn user_activity(&self, user_id: &str) -> StoreResult<UserActivity>;

    /// Insert or replace by content id.
    async fn record_content(&self, record: &ContentRecord) -> StoreResult<()>;

    /// Atomically add `delta` reputation points and return the new total.
    async fn adjust_points(&self, user_id: &str, delta: i64, reason: &str) -> StoreResult<i64>;

    async fn record_violation(&self, user_id: &str, violation: &Violation) -> StoreResult<()>;

    async fn set_restriction(&self, user_id: &str, restriction: &Restriction) -> StoreResult<()>;

    /// The restriction in force now, if any.
    async fn active_restriction(&self, user_id: &str) -> StoreResult<Option<Restriction>>;

    /// Store the current decision for a content id, superseding any older one.
    async fn put_decision(&self, record: &DecisionRecord) -> StoreResult<()>;

    async fn get_decision(&self, content_id: &str) -> StoreResult<Option<DecisionRecord>>;

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> StoreResult<()>;

    /// Most recent entries first.
    async fn decision_log(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>>;

    /// Insert or replace by rule id.
    async fn upsert_rule(&self, rule: &ModerationRule) -> StoreResult<()>;

    async fn list_active_rules(&self, trigger: RuleTrigger) -> StoreResult<Vec<ModerationRule>>;

    /// Persist the audit record and bump the rule's stats.
    async fn record_rule_trigger(&self, record: &RuleTriggerRecord) -> StoreResult<()>;

    async fn rule_triggers(&self, rule_id: &str) -> StoreResult<Vec<RuleTriggerRecord>>;

    async fn enqueue(&self, item: &QueueItem) -> StoreResult<()>;

    /// Highest priority first, oldest first within a priority.
    async fn list_queue(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> StoreResult<Vec<QueueItem>>;

    async fn push_notification(&self, notification: &Notification) -> StoreResult<()>;

    /// Most recent first.
    async fn notifications(
        &self,
        recipient: &Recipient,
        limit: usize,
    ) -> StoreResult<Vec<Notification>>;

    /// Fails with `StoreError::DuplicateVote` when the voter already voted
    /// on this version of the content.
    async fn record_vote(&self, vote: &FeedbackVote) -> StoreResult<()>;

    async fn votes_for(&self, content_id: &str) -> StoreResult<Vec<FeedbackVote>>;

    async fn count_votes(&self, content_id: &str) -> StoreResult<usize>;

    /// Content ids with at least `min_votes` votes.
    async fn contents_with_votes(&self, min_votes: usize) -> StoreResult<Vec<String>>;

    /// Decision thresholds as last adjusted by consensus learning.
    async fn load_thresholds(&self) -> StoreResult<Option<Thresholds>>;

    async fn save_thresholds(&self, thresholds: &Thresholds) -> StoreResult<()>;

    /// Remember that consensus on this content version fed learning.
    /// Returns false when it already had.
    async fn mark_learned(&self, content_id: &str, content_hash: &str) -> StoreResult<bool>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
