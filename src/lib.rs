pub mod analysis;
pub mod config;
pub mod consensus;
pub mod decision;
pub mod error;
pub mod model;
pub mod moderator;
pub mod reputation;
pub mod rules;
pub mod store;

pub use analysis::{AnalysisResult, ContentAnalyzer};
pub use config::{Config, FailurePolicy};
pub use consensus::{ConsensusEngine, ConsensusResult};
pub use decision::{DecisionEngine, Thresholds};
pub use error::{ModerationError, StoreError};
pub use model::{Content, ContentType, DecisionAction, ModerationDecision, VoteInput, VoteOutcome};
pub use moderator::{ConsensusPassReport, ConsensusStatus, Moderator};
pub use reputation::{ReputationEngine, ReputationProfile, TrustLevel};
pub use rules::{ModerationRule, RuleEngine};
pub use store::{MemoryStore, ModerationStore, SqliteStore};
