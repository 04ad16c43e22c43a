use thiserror::Error;

/// Failures raised by a `ModerationStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Voter {voter_id} already voted on content {content_id}")]
    DuplicateVote { content_id: String, voter_id: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error taxonomy of the moderation core.
///
/// Most variants are recovered inside the engines (fallback analysis,
/// default reputation, skipped rule) and only surface in logs. The ones a
/// caller sees are `DuplicateVote`, `InvalidVote` and `Config`.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Content analysis failed: {0}")]
    AnalysisFailure(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("Duplicate vote by {voter_id} on {content_id}")]
    DuplicateVote { content_id: String, voter_id: String },
    #[error("Rule {rule_id} could not be evaluated: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },
    #[error("Insufficient votes: {have} of {need}")]
    InsufficientVotes { have: usize, need: usize },
    #[error("Moderation timed out after {0} ms")]
    Timeout(u64),
    #[error("Invalid vote: {0}")]
    InvalidVote(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModerationError {
    /// Lift a store error, keeping duplicate votes distinguishable for callers.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateVote {
                content_id,
                voter_id,
            } => ModerationError::DuplicateVote {
                content_id,
                voter_id,
            },
            other => ModerationError::StoreUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_vote_lifted() {
        let err = ModerationError::from_store(StoreError::DuplicateVote {
            content_id: "c1".to_string(),
            voter_id: "v1".to_string(),
        });
        assert!(matches!(err, ModerationError::DuplicateVote { .. }));

        let err = ModerationError::from_store(StoreError::Unavailable("down".to_string()));
        assert!(matches!(err, ModerationError::StoreUnavailable(_)));
    }
}
