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
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    reputation_points INTEGER NOT NULL DEFAULT 0,
    endorsements INTEGER NOT NULL DEFAULT 0,
    expertise_topics TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS point_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    delta INTEGER NOT NULL,
    reason TEXT NOT NULL,
    at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS contents (
    content_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS restrictions (
    user_id TEXT PRIMARY KEY,
    until TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS decisions (
    content_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS decision_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    trigger_type TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rule_triggers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS queue (
    id TEXT PRIMARY KEY,
    priority INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS votes (
    content_id TEXT NOT NULL,
    content_hash TEXT NOT NULL DEFAULT '',
    voter_id TEXT NOT NULL,
    data TEXT NOT NULL,
    UNIQUE(content_id, content_hash, voter_id)
);
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS learned_consensus (
    content_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    at TEXT NOT NULL,
    PRIMARY KEY (content_id, content_hash)
);
CREATE INDEX IF NOT EXISTS idx_point_events_user ON point_events(user_id);
CREATE INDEX IF NOT EXISTS idx_contents_user ON contents(user_id);
CREATE INDEX IF NOT EXISTS idx_queue_order ON queue(status, priority DESC, created_at);
";

/// SQLite-backed store. Complex records are kept as JSON next to the
/// columns that queries filter or order on.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {}", parent.display())
                    })?;
                }
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open moderation database: {db_path}"))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize moderation schema")?;
        log::debug!("Opened moderation database at {db_path}");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::open(":memory:")
    }

    /// Set account metadata the reputation factors read.
    pub fn register_user(
        &self,
        user_id: &str,
        created_at: DateTime<Utc>,
        endorsements: u32,
        expertise_topics: &[String],
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (user_id, created_at, endorsements, expertise_topics)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                created_at = excluded.created_at,
                endorsements = excluded.endorsements,
                expertise_topics = excluded.expertise_topics",
            params![
                user_id,
                timestamp(created_at),
                endorsements,
                serde_json::to_string(expertise_topics)?
            ],
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))
    }
}

const THRESHOLDS_KEY: &str = "decision_thresholds";

/// Fixed-width RFC 3339 so text order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Unavailable(format!("bad timestamp {text}: {e}")))
}

fn recipient_key(recipient: &Recipient) -> String {
    match recipient {
        Recipient::User(id) => format!("user:{id}"),
        Recipient::Moderators => "moderators".to_string(),
    }
}

fn ensure_user(conn: &Connection, user_id: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
        params![user_id, timestamp(Utc::now())],
    )?;
    Ok(())
}

fn decode_all<T: DeserializeOwned>(rows: Vec<String>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(StoreError::from))
        .collect()
}

fn query_json(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl ModerationStore for SqliteStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<ReputationProfile>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn upsert_profile(&self, profile: &ReputationProfile) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO profiles (user_id, data) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data",
            params![profile.user_id, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    async fn user_activity(&self, user_id: &str) -> StoreResult<UserActivity> {
        let conn = self.lock()?;
        let mut activity = UserActivity::empty(user_id);

        let user: Option<(String, u32, String)> = conn
            .query_row(
                "SELECT created_at, endorsements, expertise_topics FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        if let Some((created_at, endorsements, topics)) = user {
            activity.account_created_at = parse_timestamp(&created_at)?;
            activity.endorsements = endorsements;
            activity.expertise_topics = serde_json::from_str(&topics)?;
        }

        activity.contents = decode_all(query_json(
            &conn,
            "SELECT data FROM contents WHERE user_id = ?1",
            params![user_id],
        )?)?;
        activity.violations = decode_all(query_json(
            &conn,
            "SELECT data FROM violations WHERE user_id = ?1 ORDER BY id",
            params![user_id],
        )?)?;

        let mut stmt = conn
            .prepare("SELECT delta, reason, at FROM point_events WHERE user_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (delta, reason, at) in rows {
            activity.point_events.push(PointEvent {
                delta,
                reason,
                at: parse_timestamp(&at)?,
            });
        }

        Ok(activity)
    }

    async fn record_content(&self, record: &ContentRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        ensure_user(&conn, &record.user_id)?;
        conn.execute(
            "INSERT INTO contents (content_id, user_id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(content_id) DO UPDATE SET
                user_id = excluded.user_id,
                data = excluded.data",
            params![record.content_id, record.user_id, serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    async fn adjust_points(&self, user_id: &str, delta: i64, reason: &str) -> StoreResult<i64> {
        let conn = self.lock()?;
        let now = timestamp(Utc::now());
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO users (user_id, created_at, reputation_points) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                reputation_points = reputation_points + excluded.reputation_points",
            params![user_id, now, delta],
        )?;
        tx.execute(
            "INSERT INTO point_events (user_id, delta, reason, at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, delta, reason, now],
        )?;
        let total: i64 = tx.query_row(
            "SELECT reputation_points FROM users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(total)
    }

    async fn record_violation(&self, user_id: &str, violation: &Violation) -> StoreResult<()> {
        let conn = self.lock()?;
        ensure_user(&conn, user_id)?;
        conn.execute(
            "INSERT INTO violations (user_id, data) VALUES (?1, ?2)",
            params![user_id, serde_json::to_string(violation)?],
        )?;
        Ok(())
    }

    async fn set_restriction(&self, user_id: &str, restriction: &Restriction) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO restrictions (user_id, until, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET until = excluded.until, data = excluded.data",
            params![
                user_id,
                timestamp(restriction.until),
                serde_json::to_string(restriction)?
            ],
        )?;
        Ok(())
    }

    async fn active_restriction(&self, user_id: &str) -> StoreResult<Option<Restriction>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM restrictions WHERE user_id = ?1 AND until > ?2",
                params![user_id, timestamp(Utc::now())],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn put_decision(&self, record: &DecisionRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO decisions (content_id, data) VALUES (?1, ?2)
             ON CONFLICT(content_id) DO UPDATE SET data = excluded.data",
            params![record.decision.content_id, serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    async fn get_decision(&self, content_id: &str) -> StoreResult<Option<DecisionRecord>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM decisions WHERE content_id = ?1",
                params![content_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn append_decision_log(&self, entry: &DecisionLogEntry) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO decision_log (data) VALUES (?1)",
            params![serde_json::to_string(entry)?],
        )?;
        Ok(())
    }

    async fn decision_log(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        let conn = self.lock()?;
        decode_all(query_json(
            &conn,
            "SELECT data FROM decision_log ORDER BY id DESC LIMIT ?1",
            params![limit as i64],
        )?)
    }

    async fn upsert_rule(&self, rule: &ModerationRule) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rules (id, trigger_type, is_active, priority, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                trigger_type = excluded.trigger_type,
                is_active = excluded.is_active,
                priority = excluded.priority,
                data = excluded.data",
            params![
                rule.id,
                rule.trigger.as_str(),
                rule.is_active,
                rule.priority,
                serde_json::to_string(rule)?
            ],
        )?;
        Ok(())
    }

    async fn list_active_rules(&self, trigger: RuleTrigger) -> StoreResult<Vec<ModerationRule>> {
        let conn = self.lock()?;
        decode_all(query_json(
            &conn,
            "SELECT data FROM rules WHERE is_active = 1 AND trigger_type = ?1
             ORDER BY priority DESC, id",
            params![trigger.as_str()],
        )?)
    }

    async fn record_rule_trigger(&self, record: &RuleTriggerRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO rule_triggers (rule_id, data) VALUES (?1, ?2)",
            params![record.rule_id, serde_json::to_string(record)?],
        )?;

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM rules WHERE id = ?1",
                params![record.rule_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            let mut rule: ModerationRule = serde_json::from_str(&data)?;
            rule.stats.record(record.confidence, record.triggered_at);
            tx.execute(
                "UPDATE rules SET data = ?1 WHERE id = ?2",
                params![serde_json::to_string(&rule)?, rule.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn rule_triggers(&self, rule_id: &str) -> StoreResult<Vec<RuleTriggerRecord>> {
        let conn = self.lock()?;
        decode_all(query_json(
            &conn,
            "SELECT data FROM rule_triggers WHERE rule_id = ?1 ORDER BY id",
            params![rule_id],
        )?)
    }

    async fn enqueue(&self, item: &QueueItem) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO queue (id, priority, status, created_at, data) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                priority = excluded.priority,
                status = excluded.status,
                data = excluded.data",
            params![
                item.id,
                item.priority,
                item.status.as_str(),
                timestamp(item.created_at),
                serde_json::to_string(item)?
            ],
        )?;
        Ok(())
    }

    async fn list_queue(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> StoreResult<Vec<QueueItem>> {
        let conn = self.lock()?;
        let rows = match status {
            Some(status) => query_json(
                &conn,
                "SELECT data FROM queue WHERE status = ?1
                 ORDER BY priority DESC, created_at ASC LIMIT ?2",
                params![status.as_str(), limit as i64],
            )?,
            None => query_json(
                &conn,
                "SELECT data FROM queue ORDER BY priority DESC, created_at ASC LIMIT ?1",
                params![limit as i64],
            )?,
        };
        decode_all(rows)
    }

    async fn push_notification(&self, notification: &Notification) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications (recipient, data) VALUES (?1, ?2)",
            params![
                recipient_key(&notification.recipient),
                serde_json::to_string(notification)?
            ],
        )?;
        Ok(())
    }

    async fn notifications(
        &self,
        recipient: &Recipient,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        let conn = self.lock()?;
        decode_all(query_json(
            &conn,
            "SELECT data FROM notifications WHERE recipient = ?1 ORDER BY id DESC LIMIT ?2",
            params![recipient_key(recipient), limit as i64],
        )?)
    }

    async fn record_vote(&self, vote: &FeedbackVote) -> StoreResult<()> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO votes (content_id, content_hash, voter_id, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                vote.content_id,
                vote.content_hash,
                vote.voter_id,
                serde_json::to_string(vote)?
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateVote {
                    content_id: vote.content_id.clone(),
                    voter_id: vote.voter_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn votes_for(&self, content_id: &str) -> StoreResult<Vec<FeedbackVote>> {
        let conn = self.lock()?;
        decode_all(query_json(
            &conn,
            "SELECT data FROM votes WHERE content_id = ?1 ORDER BY rowid",
            params![content_id],
        )?)
    }

    async fn count_votes(&self, content_id: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE content_id = ?1",
            params![content_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn contents_with_votes(&self, min_votes: usize) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT content_id FROM votes GROUP BY content_id
             HAVING COUNT(*) >= ?1 ORDER BY content_id",
        )?;
        let ids = stmt
            .query_map(params![min_votes as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn load_thresholds(&self) -> StoreResult<Option<Thresholds>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM settings WHERE key = ?1",
                params![THRESHOLDS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn save_thresholds(&self, thresholds: &Thresholds) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, data) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data",
            params![THRESHOLDS_KEY, serde_json::to_string(thresholds)?],
        )?;
        Ok(())
    }

    async fn mark_learned(&self, content_id: &str, content_hash: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO learned_consensus (content_id, content_hash, at)
             VALUES (?1, ?2, ?3)",
            params![content_id, content_hash, timestamp(Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
