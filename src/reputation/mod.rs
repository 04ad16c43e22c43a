//! Reputation scoring: eight weighted factors, point history, trend and
//! the trust ladder.

pub mod factors;
pub mod trend;
pub mod trust;

pub use factors::ReputationFactors;
pub use trend::{ReputationTrend, TrendDirection};
pub use trust::TrustLevel;

use crate::config::ReputationConfig;
use crate::error::StoreError;
use crate::model::{Restriction, RestrictionLevel, UserActivity};
use crate::store::ModerationStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound of the displayed reputation scale.
pub const MAX_REPUTATION: f64 = 1000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_violations: usize,
    pub recent_violations: usize,
    pub content_count: usize,
    pub account_age_days: f64,
    pub total_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationProfile {
    pub user_id: String,
    pub overall_score: f64,
    pub factors: ReputationFactors,
    pub trust_level: TrustLevel,
    pub restriction_level: RestrictionLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction_expiry: Option<DateTime<Utc>>,
    pub trend: ReputationTrend,
    pub recommendations: Vec<String>,
    pub history: HistorySummary,
    pub computed_at: DateTime<Utc>,
}

impl ReputationProfile {
    /// Prior moderation strikes.
    pub fn strikes(&self) -> usize {
        self.history.total_violations
    }

    pub fn is_restricted(&self) -> bool {
        self.restriction_level > RestrictionLevel::None
    }

    /// New on the ladder, or an account younger than `new_user_days`.
    pub fn is_new_user(&self, new_user_days: f64) -> bool {
        self.trust_level == TrustLevel::New || self.history.account_age_days < new_user_days
    }
}

/// Build a profile from a user's history. Pure; `now` anchors every
/// time-window computation.
pub fn build_profile(
    activity: &UserActivity,
    restriction: Option<&Restriction>,
    config: &ReputationConfig,
    now: DateTime<Utc>,
) -> ReputationProfile {
    let factors = ReputationFactors::compute(activity, now, config.history_limit);
    let composite = factors.composite();
    let points = activity.total_points();

    // Earned points are scaled by factor quality; penalties apply in full.
    let overall_score = if points >= 0 {
        config.base_reputation + points as f64 * (0.5 + composite / 100.0)
    } else {
        config.base_reputation + points as f64
    }
    .clamp(0.0, MAX_REPUTATION);

    let trust_level = TrustLevel::from_score(overall_score);
    let trend = trend::analyze(
        &activity.point_events,
        now,
        config.trend_window_days,
        config.trend_sample_cap,
    );

    let (restriction_level, restriction_expiry) = match restriction {
        Some(r) if r.until > now => (r.level, Some(r.until)),
        _ => (RestrictionLevel::None, None),
    };

    let history = HistorySummary {
        total_violations: activity.violations.len(),
        recent_violations: activity
            .violations_since(now - Duration::days(config.recent_violation_days)),
        content_count: activity.contents.len(),
        account_age_days: activity.account_age_days(now),
        total_points: points,
    };

    let recommendations = recommendations(
        &factors,
        &trend,
        trust_level,
        overall_score,
        history.recent_violations,
    );

    ReputationProfile {
        user_id: activity.user_id.clone(),
        overall_score,
        factors,
        trust_level,
        restriction_level,
        restriction_expiry,
        trend,
        recommendations,
        history,
        computed_at: now,
    }
}

fn advice_for(factor: &str) -> &'static str {
    match factor {
        "content_quality" => "Write longer, well-structured posts to raise content quality",
        "community_helpfulness" => "Focus on answers other members find helpful",
        "consistent_activity" => "Contribute regularly rather than in occasional bursts",
        "moderation_history" => "Review the community guidelines to avoid further violations",
        "expertise" => "Answer questions in topics you know well to build expertise",
        "community_trust" => "Engage with the community to earn endorsements",
        "account_maturity" => "Reputation grows as your account matures",
        "behavior_pattern" => "Avoid posting many low-quality items in a short time",
        _ => "Keep contributing",
    }
}

fn recommendations(
    factors: &ReputationFactors,
    trend: &ReputationTrend,
    trust_level: TrustLevel,
    overall_score: f64,
    recent_violations: usize,
) -> Vec<String> {
    let mut weak: Vec<(&str, f64)> = factors
        .named()
        .into_iter()
        .filter(|(name, score)| {
            *score < 40.0 && !(recent_violations > 0 && *name == "moderation_history")
        })
        .collect();
    weak.sort_by(|a, b| a.1.total_cmp(&b.1));

    // Recent violations always lead, whatever the other factors score.
    let mut names: Vec<&str> = Vec::new();
    if recent_violations > 0 {
        names.push("moderation_history");
    }
    names.extend(weak.iter().map(|(name, _)| *name));

    let mut out: Vec<String> = names
        .iter()
        .take(3)
        .map(|name| advice_for(name).to_string())
        .collect();

    match trend.direction {
        TrendDirection::Declining => {
            out.push("Reputation is declining; recent activity is costing points".to_string())
        }
        TrendDirection::Improving if trend.confidence >= 0.5 => {
            out.push("Reputation is improving; keep it up".to_string())
        }
        _ => {}
    }

    if let Some(next) = TrustLevel::LADDER.iter().find(|l| **l > trust_level) {
        let gap = next.min_reputation() - overall_score;
        if gap > 0.0 && gap <= 25.0 {
            out.push(format!("{gap:.0} more reputation reaches {next}"));
        }
    }

    out
}

/// Computes and caches reputation profiles on top of a `ModerationStore`.
pub struct ReputationEngine {
    store: Arc<dyn ModerationStore>,
    config: ReputationConfig,
}

impl ReputationEngine {
    pub fn new(store: Arc<dyn ModerationStore>, config: ReputationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    /// Recompute from history. The profile write is fire-and-forget.
    pub async fn compute(&self, user_id: &str) -> Result<ReputationProfile, StoreError> {
        let (activity, restriction) = tokio::try_join!(
            self.store.user_activity(user_id),
            self.store.active_restriction(user_id),
        )?;
        let profile = build_profile(&activity, restriction.as_ref(), &self.config, Utc::now());

        log::debug!(
            "Reputation for {}: {:.1} ({}), trend {:?}",
            user_id,
            profile.overall_score,
            profile.trust_level,
            profile.trend.direction
        );

        let store = Arc::clone(&self.store);
        let snapshot = profile.clone();
        tokio::spawn(async move {
            if let Err(e) = store.upsert_profile(&snapshot).await {
                log::warn!("Failed to persist profile for {}: {e}", snapshot.user_id);
            }
        });

        Ok(profile)
    }

    /// Profile for a user with no readable history.
    pub fn default_profile(&self, user_id: &str) -> ReputationProfile {
        build_profile(&UserActivity::empty(user_id), None, &self.config, Utc::now())
    }

    /// `compute`, falling back to the default profile when the store fails.
    pub async fn compute_or_default(&self, user_id: &str) -> ReputationProfile {
        match self.compute(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("Reputation lookup for {user_id} failed, using defaults: {e}");
                self.default_profile(user_id)
            }
        }
    }

    /// Apply a point change. Significant changes recompute the profile
    /// right away and return it.
    pub async fn record_event(
        &self,
        user_id: &str,
        delta: i64,
        reason: &str,
    ) -> Result<Option<ReputationProfile>, StoreError> {
        let total = self.store.adjust_points(user_id, delta, reason).await?;
        log::debug!("Points for {user_id}: {delta:+} ({reason}), total {total}");

        if delta.abs() >= self.config.significant_impact {
            Ok(Some(self.compute(user_id).await?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PointEvent, Violation, ViolationSeverity};
    use crate::store::MemoryStore;

    fn activity_with_points(points: i64) -> UserActivity {
        let mut activity = UserActivity::empty("u1");
        activity.point_events.push(PointEvent {
            delta: points,
            reason: "seed".to_string(),
            at: Utc::now() - Duration::days(60),
        });
        activity
    }

    #[test]
    fn test_new_account_is_new_level() {
        let profile = build_profile(
            &UserActivity::empty("u1"),
            None,
            &ReputationConfig::default(),
            Utc::now(),
        );
        assert_eq!(profile.overall_score, 50.0);
        assert_eq!(profile.trust_level, TrustLevel::New);
        assert!(profile.is_new_user(7.0));
        assert_eq!(profile.restriction_level, RestrictionLevel::None);
    }

    #[test]
    fn test_trust_level_matches_score() {
        let config = ReputationConfig::default();
        for points in [-100, -10, 0, 40, 150, 400, 900, 5000] {
            let profile = build_profile(&activity_with_points(points), None, &config, Utc::now());
            assert!((0.0..=MAX_REPUTATION).contains(&profile.overall_score));
            assert_eq!(profile.trust_level, TrustLevel::from_score(profile.overall_score));
        }
    }

    #[test]
    fn test_penalties_apply_in_full() {
        let profile = build_profile(
            &activity_with_points(-30),
            None,
            &ReputationConfig::default(),
            Utc::now(),
        );
        assert_eq!(profile.overall_score, 20.0);
        assert_eq!(profile.trust_level, TrustLevel::Restricted);
    }

    #[test]
    fn test_active_restriction_reflected() {
        let now = Utc::now();
        let restriction = Restriction {
            level: RestrictionLevel::Posting,
            reason: "spam".to_string(),
            until: now + Duration::hours(24),
        };
        let profile = build_profile(
            &UserActivity::empty("u1"),
            Some(&restriction),
            &ReputationConfig::default(),
            now,
        );
        assert!(profile.is_restricted());
        assert_eq!(profile.restriction_expiry, Some(restriction.until));
    }

    #[test]
    fn test_recent_violations_and_recommendations() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        for days_ago in [3, 10, 100] {
            activity.violations.push(Violation {
                content_id: format!("c{days_ago}"),
                severity: ViolationSeverity::Severe,
                reason: "toxicity".to_string(),
                at: now - Duration::days(days_ago),
            });
        }
        let profile = build_profile(&activity, None, &ReputationConfig::default(), now);
        assert_eq!(profile.strikes(), 3);
        assert_eq!(profile.history.recent_violations, 2);
        assert!(profile.recommendations[0].contains("community guidelines"));
        assert!(profile.recommendations.len() >= 3);
    }

    #[test]
    fn test_guidelines_advice_only_with_recent_violations() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        activity.violations.push(Violation {
            content_id: "old".to_string(),
            severity: ViolationSeverity::Minor,
            reason: "spam".to_string(),
            at: now - Duration::days(200),
        });
        let profile = build_profile(&activity, None, &ReputationConfig::default(), now);
        assert_eq!(profile.history.recent_violations, 0);
        assert!(!profile
            .recommendations
            .iter()
            .any(|r| r.contains("community guidelines")));
    }

    #[tokio::test]
    async fn test_significant_event_recomputes() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReputationEngine::new(store.clone(), ReputationConfig::default());

        assert!(engine.record_event("u1", 5, "comment").await.unwrap().is_none());
        let profile = engine
            .record_event("u1", 40, "accepted answer")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.history.total_points, 45);
        assert!(profile.overall_score > 50.0);
    }

    #[tokio::test]
    async fn test_store_failure_uses_default() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReputationEngine::new(store.clone(), ReputationConfig::default());
        store.set_unavailable(true);

        assert!(engine.compute("u1").await.is_err());
        let profile = engine.compute_or_default("u1").await;
        assert_eq!(profile.trust_level, TrustLevel::New);
        assert_eq!(profile.overall_score, 50.0);
    }
}
