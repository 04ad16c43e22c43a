use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    /// YAML file with a list of moderation rules imported at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
}

fn default_request_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            rules_file: None,
            failure_policy: FailurePolicy::default(),
            request_timeout_ms: default_request_timeout_ms(),
            decision: DecisionConfig::default(),
            rules: RulesConfig::default(),
            consensus: ConsensusConfig::default(),
            reputation: ReputationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "/var/lib/content-arbiter/moderation.db".to_string(),
        }
    }
}

/// What to return when the decision path itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Allow the content (confidence 0). Favors availability.
    #[default]
    FailOpen,
    /// Hold the content for review (confidence 0).
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub block_toxicity: f64,
    pub block_spam: f64,
    pub critical_toxicity: f64,
    pub review_toxicity: f64,
    pub review_spam: f64,
    pub review_quality: f64,
    pub flag_toxicity: f64,
    pub flag_spam: f64,
    pub flag_quality: f64,
    /// Raw spam score above which a new user's `allow` is escalated
    pub new_user_spam: f64,
    /// Accounts younger than this are treated as new regardless of trust level
    pub new_user_days: f64,
    pub multiplier: MultiplierConfig,
    pub restriction: RestrictionPolicy,
    pub learning: LearningConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            block_toxicity: 80.0,
            block_spam: 85.0,
            critical_toxicity: 90.0,
            review_toxicity: 60.0,
            review_spam: 70.0,
            review_quality: 25.0,
            flag_toxicity: 40.0,
            flag_spam: 50.0,
            flag_quality: 40.0,
            new_user_spam: 30.0,
            new_user_days: 7.0,
            multiplier: MultiplierConfig::default(),
            restriction: RestrictionPolicy::default(),
            learning: LearningConfig::default(),
        }
    }
}

/// Constants of the reputation multiplier applied to spam and toxicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    pub low_reputation: f64,
    pub low_reputation_factor: f64,
    pub high_reputation: f64,
    pub high_reputation_factor: f64,
    pub expert_factor: f64,
    pub trusted_factor: f64,
    pub new_factor: f64,
    pub strike_step: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            low_reputation: 50.0,
            low_reputation_factor: 1.3,
            high_reputation: 200.0,
            high_reputation_factor: 0.8,
            expert_factor: 0.7,
            trusted_factor: 0.85,
            new_factor: 1.2,
            strike_step: 0.2,
            min: 0.5,
            max: 2.0,
        }
    }
}

/// Temporary posting restriction for low-reputation submitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionPolicy {
    pub reputation_below: f64,
    pub min_confidence: f64,
    pub hours: i64,
    pub penalty_points: i64,
}

impl Default for RestrictionPolicy {
    fn default() -> Self {
        Self {
            reputation_below: 30.0,
            min_confidence: 0.8,
            hours: 24,
            penalty_points: 10,
        }
    }
}

/// Bounds for consensus-driven threshold nudges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    pub step: f64,
    pub block_toxicity_min: f64,
    pub block_toxicity_max: f64,
    pub block_spam_min: f64,
    pub block_spam_max: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step: 1.0,
            block_toxicity_min: 70.0,
            block_toxicity_max: 95.0,
            block_spam_min: 75.0,
            block_spam_max: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Weighted fraction of matched conditions needed to trigger a rule
    pub trigger_threshold: f64,
    /// Triggered block rules at or above this priority stop evaluation
    pub short_circuit_priority: u8,
    pub cache_ttl_seconds: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 0.5,
            short_circuit_priority: 8,
            cache_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_votes: usize,
    pub low_agreement: f64,
    pub low_agreement_confidence: f64,
    pub expert_disagreements: usize,
    pub expert_disagreement_confidence: f64,
    pub weak_decision_confidence: f64,
    pub weak_decision_consensus_confidence: f64,
    pub expert_bonus: f64,
    pub expert_bonus_cap: f64,
    pub volume_bonus: f64,
    pub volume_bonus_cap: f64,
    /// Block decisions with agreement below this relax the block threshold
    pub relax_block_agreement: f64,
    /// Consensus confidence needed for a contradicted allow to tighten it
    pub tighten_block_confidence: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_votes: 5,
            low_agreement: 0.3,
            low_agreement_confidence: 0.7,
            expert_disagreements: 2,
            expert_disagreement_confidence: 0.6,
            weak_decision_confidence: 0.6,
            weak_decision_consensus_confidence: 0.8,
            expert_bonus: 0.1,
            expert_bonus_cap: 0.3,
            volume_bonus: 0.05,
            volume_bonus_cap: 0.2,
            relax_block_agreement: 0.5,
            tighten_block_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Points every account starts with
    pub base_reputation: f64,
    /// Point changes at least this large trigger an immediate recompute
    pub significant_impact: i64,
    pub trend_window_days: i64,
    pub trend_sample_cap: usize,
    /// Window for counting recent violations
    pub recent_violation_days: i64,
    /// Most recent contents considered for the quality factor
    pub history_limit: usize,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            base_reputation: 50.0,
            significant_impact: 25,
            trend_window_days: 30,
            trend_sample_cap: 20,
            recent_violation_days: 30,
            history_limit: 50,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engines cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let d = &self.decision;
        if !(d.flag_toxicity <= d.review_toxicity && d.review_toxicity <= d.block_toxicity) {
            anyhow::bail!("toxicity thresholds must satisfy flag <= review <= block");
        }
        if !(d.flag_spam <= d.review_spam && d.review_spam <= d.block_spam) {
            anyhow::bail!("spam thresholds must satisfy flag <= review <= block");
        }
        if d.multiplier.min > d.multiplier.max || d.multiplier.min <= 0.0 {
            anyhow::bail!("multiplier bounds are invalid");
        }
        let l = &d.learning;
        if l.block_toxicity_min > l.block_toxicity_max || l.block_spam_min > l.block_spam_max {
            anyhow::bail!("learning bounds are inverted");
        }
        if !(0.0..=1.0).contains(&self.rules.trigger_threshold) {
            anyhow::bail!("rules.trigger_threshold must be within [0, 1]");
        }
        if self.consensus.min_votes == 0 {
            anyhow::bail!("consensus.min_votes must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.consensus.min_votes, 5);
        assert_eq!(config.rules.trigger_threshold, 0.5);
        assert_eq!(config.request_timeout_ms, 2000);
    }

    #[test]
    fn test_default_matches_empty_yaml() {
        let from_yaml: Config = serde_yaml::from_str("{}").unwrap();
        let built = Config::default();
        assert_eq!(from_yaml.request_timeout_ms, built.request_timeout_ms);
        assert_eq!(from_yaml.failure_policy, built.failure_policy);
        assert_eq!(from_yaml.store.database_path, built.store.database_path);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
failure_policy: fail_closed
decision:
  block_toxicity: 85
consensus:
  min_votes: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.decision.block_toxicity, 85.0);
        assert_eq!(config.decision.block_spam, 85.0);
        assert_eq!(config.consensus.min_votes, 3);
        assert_eq!(config.request_timeout_ms, 2000);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = Config::default();
        config.decision.review_toxicity = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbiter.yaml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.rules_file = Some("rules.yaml".to_string());
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.rules_file.as_deref(), Some("rules.yaml"));
        assert_eq!(loaded.decision.block_spam, config.decision.block_spam);
    }
}
