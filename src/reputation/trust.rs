use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reputation tiers, lowest first. A profile always sits on the highest
/// tier whose minimum it meets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Restricted,
    #[default]
    New,
    Trusted,
    Expert,
    Moderator,
    Admin,
}

impl TrustLevel {
    pub const LADDER: [TrustLevel; 6] = [
        TrustLevel::Restricted,
        TrustLevel::New,
        TrustLevel::Trusted,
        TrustLevel::Expert,
        TrustLevel::Moderator,
        TrustLevel::Admin,
    ];

    pub fn min_reputation(&self) -> f64 {
        match self {
            TrustLevel::Restricted => 0.0,
            TrustLevel::New => 50.0,
            TrustLevel::Trusted => 150.0,
            TrustLevel::Expert => 300.0,
            TrustLevel::Moderator => 500.0,
            TrustLevel::Admin => 1000.0,
        }
    }

    pub fn from_score(score: f64) -> Self {
        Self::LADDER
            .iter()
            .rev()
            .find(|level| score >= level.min_reputation())
            .copied()
            .unwrap_or(TrustLevel::Restricted)
    }

    /// Expert, moderator and admin votes count as expert opinion.
    pub fn is_expert(&self) -> bool {
        *self >= TrustLevel::Expert
    }

    pub fn privileges(&self) -> &'static [&'static str] {
        match self {
            TrustLevel::Restricted => &["read"],
            TrustLevel::New => &["read", "post", "comment"],
            TrustLevel::Trusted => &["read", "post", "comment", "vote", "flag"],
            TrustLevel::Expert => &["read", "post", "comment", "vote", "flag", "edit", "review"],
            TrustLevel::Moderator => &[
                "read", "post", "comment", "vote", "flag", "edit", "review", "moderate", "restrict",
            ],
            TrustLevel::Admin => &[
                "read", "post", "comment", "vote", "flag", "edit", "review", "moderate", "restrict",
                "configure",
            ],
        }
    }

    pub fn restrictions(&self) -> &'static [&'static str] {
        match self {
            TrustLevel::Restricted => &["no_posting", "no_links", "no_voting"],
            TrustLevel::New => &["rate_limited", "no_links", "pre_moderated_media"],
            TrustLevel::Trusted => &["rate_limited"],
            _ => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Restricted => "restricted",
            TrustLevel::New => "new",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Expert => "expert",
            TrustLevel::Moderator => "moderator",
            TrustLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::LADDER
            .iter()
            .find(|level| level.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown trust level: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_thresholds() {
        assert_eq!(TrustLevel::from_score(0.0), TrustLevel::Restricted);
        assert_eq!(TrustLevel::from_score(49.9), TrustLevel::Restricted);
        assert_eq!(TrustLevel::from_score(50.0), TrustLevel::New);
        assert_eq!(TrustLevel::from_score(100.0), TrustLevel::New);
        assert_eq!(TrustLevel::from_score(150.0), TrustLevel::Trusted);
        assert_eq!(TrustLevel::from_score(300.0), TrustLevel::Expert);
        assert_eq!(TrustLevel::from_score(999.0), TrustLevel::Moderator);
        assert_eq!(TrustLevel::from_score(1000.0), TrustLevel::Admin);
    }

    #[test]
    fn test_level_is_highest_met() {
        for score in [0.0, 10.0, 75.0, 200.0, 420.0, 640.0, 1000.0] {
            let level = TrustLevel::from_score(score);
            assert!(score >= level.min_reputation());
            let higher = TrustLevel::LADDER.iter().filter(|l| **l > level);
            for l in higher {
                assert!(score < l.min_reputation());
            }
        }
    }

    #[test]
    fn test_privileges_grow_with_level() {
        for pair in TrustLevel::LADDER.windows(2) {
            assert!(pair[0].privileges().len() <= pair[1].privileges().len());
        }
        assert!(TrustLevel::Expert.is_expert());
        assert!(!TrustLevel::Trusted.is_expert());
        assert_eq!("Moderator".parse::<TrustLevel>(), Ok(TrustLevel::Moderator));
    }
}
