//! The eight reputation factors, each scored in [0, 100].

use crate::model::UserActivity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const WEIGHT_CONTENT_QUALITY: f64 = 0.20;
pub const WEIGHT_COMMUNITY_HELPFULNESS: f64 = 0.18;
pub const WEIGHT_CONSISTENT_ACTIVITY: f64 = 0.15;
pub const WEIGHT_MODERATION_HISTORY: f64 = 0.15;
pub const WEIGHT_EXPERTISE: f64 = 0.12;
pub const WEIGHT_COMMUNITY_TRUST: f64 = 0.10;
pub const WEIGHT_ACCOUNT_MATURITY: f64 = 0.05;
pub const WEIGHT_BEHAVIOR_PATTERN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationFactors {
    pub content_quality: f64,
    pub community_helpfulness: f64,
    pub consistent_activity: f64,
    pub moderation_history: f64,
    pub expertise: f64,
    pub community_trust: f64,
    pub account_maturity: f64,
    pub behavior_pattern: f64,
}

impl ReputationFactors {
    pub fn compute(activity: &UserActivity, now: DateTime<Utc>, history_limit: usize) -> Self {
        Self {
            content_quality: content_quality(activity, history_limit),
            community_helpfulness: community_helpfulness(activity),
            consistent_activity: consistent_activity(activity, now),
            moderation_history: moderation_history(activity, now),
            expertise: expertise(activity),
            community_trust: community_trust(activity),
            account_maturity: account_maturity(activity, now),
            behavior_pattern: behavior_pattern(activity),
        }
    }

    /// Weighted composite in [0, 100].
    pub fn composite(&self) -> f64 {
        (self.content_quality * WEIGHT_CONTENT_QUALITY
            + self.community_helpfulness * WEIGHT_COMMUNITY_HELPFULNESS
            + self.consistent_activity * WEIGHT_CONSISTENT_ACTIVITY
            + self.moderation_history * WEIGHT_MODERATION_HISTORY
            + self.expertise * WEIGHT_EXPERTISE
            + self.community_trust * WEIGHT_COMMUNITY_TRUST
            + self.account_maturity * WEIGHT_ACCOUNT_MATURITY
            + self.behavior_pattern * WEIGHT_BEHAVIOR_PATTERN)
            .clamp(0.0, 100.0)
    }

    /// Factor names paired with their scores, in weight order.
    pub fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("content_quality", self.content_quality),
            ("community_helpfulness", self.community_helpfulness),
            ("consistent_activity", self.consistent_activity),
            ("moderation_history", self.moderation_history),
            ("expertise", self.expertise),
            ("community_trust", self.community_trust),
            ("account_maturity", self.account_maturity),
            ("behavior_pattern", self.behavior_pattern),
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.named()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

fn content_quality(activity: &UserActivity, history_limit: usize) -> f64 {
    let mut recent: Vec<_> = activity.contents.iter().collect();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    recent.truncate(history_limit.max(1));

    if recent.is_empty() {
        return 50.0;
    }
    let avg = recent.iter().map(|c| c.quality_score).sum::<f64>() / recent.len() as f64;
    avg.clamp(0.0, 100.0)
}

fn community_helpfulness(activity: &UserActivity) -> f64 {
    let helpful: u32 = activity.contents.iter().map(|c| c.helpful_votes).sum();
    let unhelpful: u32 = activity.contents.iter().map(|c| c.unhelpful_votes).sum();
    let total = helpful + unhelpful;
    if total == 0 {
        return 50.0;
    }

    // Few votes pull the score toward neutral
    let ratio = helpful as f64 / total as f64;
    let volume = (total as f64 / 20.0).min(1.0);
    (50.0 + (ratio * 100.0 - 50.0) * volume).clamp(0.0, 100.0)
}

/// Active weeks out of the last eight.
fn consistent_activity(activity: &UserActivity, now: DateTime<Utc>) -> f64 {
    let window_start = now - Duration::weeks(8);
    let mut weeks = [false; 8];

    let timestamps = activity
        .contents
        .iter()
        .map(|c| c.submitted_at)
        .chain(activity.point_events.iter().map(|e| e.at));

    for at in timestamps {
        if at < window_start || at > now {
            continue;
        }
        let week = ((now - at).num_days() / 7).clamp(0, 7) as usize;
        weeks[week] = true;
    }

    weeks.iter().filter(|w| **w).count() as f64 * 12.5
}

fn moderation_history(activity: &UserActivity, now: DateTime<Utc>) -> f64 {
    let recent_cutoff = now - Duration::days(90);
    let penalty: f64 = activity
        .violations
        .iter()
        .map(|v| {
            if v.at >= recent_cutoff {
                15.0 * v.severity.weight()
            } else {
                5.0
            }
        })
        .sum();
    (100.0 - penalty).clamp(0.0, 100.0)
}

fn expertise(activity: &UserActivity) -> f64 {
    let accepted = activity.contents.iter().filter(|c| c.accepted).count() as f64;
    let topics = activity.expertise_topics.len() as f64;
    (accepted * 10.0 + topics * 10.0).clamp(0.0, 100.0)
}

fn community_trust(activity: &UserActivity) -> f64 {
    (activity.endorsements as f64 * 5.0).clamp(0.0, 100.0)
}

fn account_maturity(activity: &UserActivity, now: DateTime<Utc>) -> f64 {
    (activity.account_age_days(now) / 365.0 * 100.0).clamp(0.0, 100.0)
}

/// Penalizes posting bursts and a high share of low-quality content.
fn behavior_pattern(activity: &UserActivity) -> f64 {
    let mut score = 100.0;

    let mut times: Vec<DateTime<Utc>> = activity.contents.iter().map(|c| c.submitted_at).collect();
    times.sort();
    let mut max_burst = 0;
    let mut start = 0;
    for end in 0..times.len() {
        while times[end] - times[start] > Duration::hours(1) {
            start += 1;
        }
        max_burst = max_burst.max(end - start + 1);
    }
    if max_burst > 5 {
        score -= (max_burst - 5) as f64 * 10.0;
    }

    if !activity.contents.is_empty() {
        let low = activity
            .contents
            .iter()
            .filter(|c| c.quality_score < 30.0)
            .count();
        score -= low as f64 / activity.contents.len() as f64 * 50.0;
    }

    f64::clamp(score, 0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentRecord, Violation, ViolationSeverity};

    fn record(id: &str, quality: f64, at: DateTime<Utc>) -> ContentRecord {
        ContentRecord {
            content_id: id.to_string(),
            user_id: "u1".to_string(),
            quality_score: quality,
            helpful_votes: 0,
            unhelpful_votes: 0,
            accepted: false,
            topic: None,
            submitted_at: at,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total = WEIGHT_CONTENT_QUALITY
            + WEIGHT_COMMUNITY_HELPFULNESS
            + WEIGHT_CONSISTENT_ACTIVITY
            + WEIGHT_MODERATION_HISTORY
            + WEIGHT_EXPERTISE
            + WEIGHT_COMMUNITY_TRUST
            + WEIGHT_ACCOUNT_MATURITY
            + WEIGHT_BEHAVIOR_PATTERN;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let now = Utc::now();
        let factors = ReputationFactors::compute(&UserActivity::empty("u1"), now, 50);
        assert_eq!(factors.content_quality, 50.0);
        assert_eq!(factors.community_helpfulness, 50.0);
        assert_eq!(factors.moderation_history, 100.0);
        assert_eq!(factors.behavior_pattern, 100.0);
        assert_eq!(factors.consistent_activity, 0.0);
    }

    #[test]
    fn test_violations_lower_moderation_history() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        activity.violations.push(Violation {
            content_id: "c1".to_string(),
            severity: ViolationSeverity::Severe,
            reason: "spam".to_string(),
            at: now - Duration::days(2),
        });
        activity.violations.push(Violation {
            content_id: "c0".to_string(),
            severity: ViolationSeverity::Minor,
            reason: "spam".to_string(),
            at: now - Duration::days(200),
        });
        let factors = ReputationFactors::compute(&activity, now, 50);
        assert_eq!(factors.moderation_history, 50.0);
    }

    #[test]
    fn test_burst_posting_penalized() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        for i in 0..8 {
            activity
                .contents
                .push(record(&format!("c{i}"), 80.0, now - Duration::minutes(i * 5)));
        }
        let factors = ReputationFactors::compute(&activity, now, 50);
        assert_eq!(factors.behavior_pattern, 70.0);
        assert_eq!(factors.consistent_activity, 12.5);
    }

    #[test]
    fn test_all_factors_bounded() {
        let now = Utc::now();
        let mut activity = UserActivity::empty("u1");
        activity.account_created_at = now - Duration::days(5000);
        activity.endorsements = 500;
        activity.expertise_topics = (0..30).map(|i| format!("topic{i}")).collect();
        for i in 0..40 {
            let mut r = record(&format!("c{i}"), 100.0, now - Duration::days(i));
            r.helpful_votes = 50;
            r.accepted = true;
            activity.contents.push(r);
        }
        let factors = ReputationFactors::compute(&activity, now, 50);
        for (name, value) in factors.named() {
            assert!((0.0..=100.0).contains(&value), "{name} = {value}");
        }
        assert!(factors.composite() <= 100.0);
    }
}
