//! Shared data model for the moderation core.
//!
//! Records in this module are what the store persists and what the
//! admin-facing surface reads back (decisions, audit log, queue, votes).

use crate::reputation::TrustLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Question,
    Answer,
    Comment,
    Post,
    Story,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Question => "question",
            ContentType::Answer => "answer",
            ContentType::Comment => "comment",
            ContentType::Post => "post",
            ContentType::Story => "story",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "question" => Ok(ContentType::Question),
            "answer" => Ok(ContentType::Answer),
            "comment" => Ok(ContentType::Comment),
            "post" => Ok(ContentType::Post),
            "story" => Ok(ContentType::Story),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// A piece of user-submitted content. An edit is a new `Content` value
/// with the same id and different text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub content_type: ContentType,
    pub text: String,
    pub author_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl Content {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        text: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content_type,
            text: text.into(),
            author_id: author_id.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Hash identifying this version of the text.
    pub fn version_hash(&self) -> String {
        text_hash(&self.text)
    }
}

/// Hex SHA-256 of the text. Stable across builds, so it can be persisted.
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Enforcement outcome, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Flag,
    Review,
    Block,
}

impl DecisionAction {
    pub const ALL: [DecisionAction; 4] = [
        DecisionAction::Allow,
        DecisionAction::Flag,
        DecisionAction::Review,
        DecisionAction::Block,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Allow => "allow",
            DecisionAction::Flag => "flag",
            DecisionAction::Review => "review",
            DecisionAction::Block => "block",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DecisionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" | "approve" => Ok(DecisionAction::Allow),
            "flag" => Ok(DecisionAction::Flag),
            "review" => Ok(DecisionAction::Review),
            "block" => Ok(DecisionAction::Block),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationDecision {
    pub content_id: String,
    pub action: DecisionAction,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModerationDecision {
    pub fn new(content_id: &str, action: DecisionAction, confidence: f64) -> Self {
        Self {
            content_id: content_id.to_string(),
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reasons: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// The current decision for a content id, as persisted. A newer record
/// for the same content id replaces the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: ModerationDecision,
    pub author_id: String,
    pub content_hash: String,
}

/// Append-only entry consumed by the threshold learning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub content_id: String,
    pub author_id: String,
    pub action: DecisionAction,
    pub confidence: f64,
    pub spam_score: f64,
    pub toxicity_score: f64,
    pub quality_score: f64,
    pub adjusted_spam: f64,
    pub adjusted_toxicity: f64,
    pub multiplier: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    UrgentReview,
    Review,
    Monitoring,
    Escalation,
    ConsensusOverride,
    ModeratorAssignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InProgress,
    Resolved,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Resolved => "resolved",
        }
    }
}

/// Work item for the moderator-facing surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub content_id: String,
    pub user_id: Option<String>,
    pub kind: QueueKind,
    pub priority: u8,
    pub status: QueueStatus,
    pub reason: String,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(content_id: &str, kind: QueueKind, priority: u8, reason: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: content_id.to_string(),
            user_id: None,
            kind,
            priority: priority.clamp(1, 10),
            status: QueueStatus::Pending,
            reason: reason.into(),
            assignee: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(String),
    Moderators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ContentHidden,
    Warning,
    ModeratorAlert,
}

/// Outbound message to a user or to the moderator team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub content_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        kind: NotificationKind,
        content_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient,
            kind,
            content_id: content_id.to_string(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Community vote on the accuracy of a past decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackVote {
    pub content_id: String,
    /// Version of the text the vote was cast on; an edit starts a new round.
    #[serde(default)]
    pub content_hash: String,
    pub voter_id: String,
    pub was_accurate: bool,
    pub suggested_action: Option<DecisionAction>,
    pub categories: Vec<String>,
    pub weight: f64,
    pub voter_trust_level: TrustLevel,
    pub voter_reputation: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Caller-supplied part of a vote; weight and trust are computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteInput {
    pub was_accurate: bool,
    pub suggested_action: Option<DecisionAction>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOutcome {
    Accepted,
    Rejected(String),
}

/// One analyzed submission in a user's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    pub user_id: String,
    pub quality_score: f64,
    pub helpful_votes: u32,
    pub unhelpful_votes: u32,
    pub accepted: bool,
    pub topic: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointEvent {
    pub delta: i64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Minor,
    Moderate,
    Severe,
}

impl ViolationSeverity {
    pub fn weight(&self) -> f64 {
        match self {
            ViolationSeverity::Minor => 1.0,
            ViolationSeverity::Moderate => 2.0,
            ViolationSeverity::Severe => 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub content_id: String,
    pub severity: ViolationSeverity,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionLevel {
    None,
    Posting,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restriction {
    pub level: RestrictionLevel,
    pub reason: String,
    pub until: DateTime<Utc>,
}

/// Everything the reputation engine reads about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub account_created_at: DateTime<Utc>,
    pub contents: Vec<ContentRecord>,
    pub point_events: Vec<PointEvent>,
    pub violations: Vec<Violation>,
    pub endorsements: u32,
    pub expertise_topics: Vec<String>,
}

impl UserActivity {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            account_created_at: Utc::now(),
            contents: Vec::new(),
            point_events: Vec::new(),
            violations: Vec::new(),
            endorsements: 0,
            expertise_topics: Vec::new(),
        }
    }

    pub fn total_points(&self) -> i64 {
        self.point_events.iter().map(|e| e.delta).sum()
    }

    pub fn account_age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.account_created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    pub fn violations_since(&self, since: DateTime<Utc>) -> usize {
        self.violations.iter().filter(|v| v.at >= since).count()
    }
}

/// Audit record persisted every time a rule triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTriggerRecord {
    pub rule_id: String,
    pub content_id: String,
    pub user_id: String,
    pub matched_conditions: Vec<String>,
    pub confidence: f64,
    pub actions: Vec<String>,
    pub triggered_at: DateTime<Utc>,
}
