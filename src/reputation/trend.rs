use crate::model::PointEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationTrend {
    pub direction: TrendDirection,
    /// Points per day, from a least-squares fit over the window
    pub slope: f64,
    pub confidence: f64,
    pub samples: usize,
}

impl ReputationTrend {
    pub fn stable() -> Self {
        Self {
            direction: TrendDirection::Stable,
            slope: 0.0,
            confidence: 0.0,
            samples: 0,
        }
    }
}

/// Fit a line through the point events of the last `window_days`.
pub fn analyze(
    events: &[PointEvent],
    now: DateTime<Utc>,
    window_days: i64,
    sample_cap: usize,
) -> ReputationTrend {
    let window_start = now - Duration::days(window_days);
    let samples: Vec<(f64, f64)> = events
        .iter()
        .filter(|e| e.at >= window_start && e.at <= now)
        .map(|e| {
            let x = (e.at - window_start).num_seconds() as f64 / 86_400.0;
            (x, e.delta as f64)
        })
        .collect();

    let n = samples.len();
    let slope = linear_regression_slope(&samples);
    let direction = if slope > 0.1 {
        TrendDirection::Improving
    } else if slope < -0.1 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    let cap = sample_cap.max(1);
    ReputationTrend {
        direction,
        slope,
        confidence: n.min(cap) as f64 / cap as f64,
        samples: n,
    }
}

fn linear_regression_slope(samples: &[(f64, f64)]) -> f64 {
    let n = samples.len() as f64;
    if samples.len() < 2 {
        return 0.0;
    }
    let mean_x = samples.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = samples.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in samples {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x).powi(2);
    }
    if den.abs() < f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(delta: i64, days_ago: i64, now: DateTime<Utc>) -> PointEvent {
        PointEvent {
            delta,
            reason: "test".to_string(),
            at: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_improving_trend() {
        let now = Utc::now();
        let events: Vec<_> = (0..10).map(|i| event(i * 2, 20 - i * 2, now)).collect();
        let trend = analyze(&events, now, 30, 20);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert!(trend.slope > 0.1);
        assert_eq!(trend.samples, 10);
        assert_eq!(trend.confidence, 0.5);
    }

    #[test]
    fn test_declining_trend() {
        let now = Utc::now();
        let events = vec![event(10, 25, now), event(5, 15, now), event(-10, 5, now), event(-10, 1, now)];
        let trend = analyze(&events, now, 30, 20);
        assert_eq!(trend.direction, TrendDirection::Declining);
    }

    #[test]
    fn test_old_events_ignored_and_confidence_capped() {
        let now = Utc::now();
        let mut events: Vec<_> = (0..30).map(|i| event(5, i % 29, now)).collect();
        events.push(event(500, 90, now));
        let trend = analyze(&events, now, 30, 20);
        assert_eq!(trend.samples, 30);
        assert_eq!(trend.confidence, 1.0);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_single_sample_is_stable() {
        let now = Utc::now();
        let trend = analyze(&[event(50, 3, now)], now, 30, 20);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.slope, 0.0);
    }
}
