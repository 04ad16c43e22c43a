//! Content analysis: spam likelihood, quality and toxicity scoring.
//!
//! Every analyzer is a pure function of the text. `ContentAnalyzer::analyze`
//! runs them inline; `ContentAnalyzer::analyze_concurrent` runs the three
//! passes on the blocking pool and joins them before combining.

pub mod quality;
pub mod spam;
pub mod text;
pub mod toxicity;

use crate::error::ModerationError;
use quality::QualityAnalysis;
use serde::{Deserialize, Serialize};
use spam::SpamAnalysis;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use toxicity::{Severity, ToxicityAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Flag,
    Review,
    Block,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "approve",
            Recommendation::Flag => "flag",
            Recommendation::Review => "review",
            Recommendation::Block => "block",
        }
    }
}

/// Outcome of one analysis pass over one version of a content's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub spam_score: f64,
    pub quality_score: f64,
    pub toxicity_score: f64,
    pub flags: BTreeSet<String>,
    pub toxicity_categories: BTreeMap<String, f64>,
    pub spam: SpamAnalysis,
    pub quality: QualityAnalysis,
    pub toxicity: ToxicityAnalysis,
    pub overall_score: f64,
    pub recommendation: Recommendation,
}

impl AnalysisResult {
    pub fn is_spam(&self) -> bool {
        self.spam.is_spam
    }

    pub fn is_toxic(&self) -> bool {
        self.toxicity.is_toxic
    }

    pub fn severity(&self) -> Severity {
        self.toxicity.severity
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentAnalyzer;

impl ContentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> AnalysisResult {
        Self::combine(spam::analyze(text), quality::analyze(text), toxicity::analyze(text))
    }

    /// Run the three passes concurrently on the blocking pool.
    pub async fn analyze_concurrent(&self, text: &str) -> Result<AnalysisResult, ModerationError> {
        let text: Arc<str> = Arc::from(text);
        let (spam_text, quality_text, toxicity_text) = (text.clone(), text.clone(), text);

        let (spam, quality, toxicity) = tokio::join!(
            tokio::task::spawn_blocking(move || spam::analyze(&spam_text)),
            tokio::task::spawn_blocking(move || quality::analyze(&quality_text)),
            tokio::task::spawn_blocking(move || toxicity::analyze(&toxicity_text)),
        );

        let spam = spam.map_err(|e| ModerationError::AnalysisFailure(format!("spam: {e}")))?;
        let quality =
            quality.map_err(|e| ModerationError::AnalysisFailure(format!("quality: {e}")))?;
        let toxicity =
            toxicity.map_err(|e| ModerationError::AnalysisFailure(format!("toxicity: {e}")))?;

        Ok(Self::combine(spam, quality, toxicity))
    }

    pub fn combine(
        spam: SpamAnalysis,
        quality: QualityAnalysis,
        toxicity: ToxicityAnalysis,
    ) -> AnalysisResult {
        let mut flags = spam.flags.clone();
        flags.extend(quality.issues.iter().cloned());
        if toxicity.is_toxic {
            flags.insert("toxic".to_string());
        }
        for category in toxicity.categories.keys() {
            flags.insert(format!("toxicity:{category}"));
        }

        let toxicity_categories = toxicity
            .categories
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();

        let overall_score = 0.4 * (100.0 - spam.score)
            + 0.35 * quality.score
            + 0.25 * (100.0 - toxicity.score);
        let recommendation = recommend(&spam, &quality, &toxicity);

        AnalysisResult {
            spam_score: spam.score,
            quality_score: quality.score,
            toxicity_score: toxicity.score,
            flags,
            toxicity_categories,
            spam,
            quality,
            toxicity,
            overall_score,
            recommendation,
        }
    }

    /// Deterministic stand-in used when analysis itself fails: quality is
    /// estimated from word count alone, spam and toxicity are zero.
    pub fn fallback(text: &str) -> AnalysisResult {
        let word_count = text::word_count(text);
        let estimate = match word_count {
            0..=4 => 30.0,
            5..=19 => 50.0,
            _ => 65.0,
        };

        let spam = SpamAnalysis {
            score: 0.0,
            is_spam: false,
            confidence: 0.0,
            matched_keywords: Vec::new(),
            url_count: 0,
            flags: BTreeSet::new(),
        };
        let quality = QualityAnalysis {
            score: estimate,
            word_count,
            sentence_count: 0,
            avg_words_per_sentence: 0.0,
            meaningful_ratio: 0.0,
            readability: 0.0,
            coherence: 0.0,
            issues: Vec::new(),
        };
        let toxicity = ToxicityAnalysis {
            score: 0.0,
            severity: Severity::Low,
            is_toxic: false,
            categories: BTreeMap::new(),
            matches: Vec::new(),
        };

        let mut result = Self::combine(spam, quality, toxicity);
        result.flags.insert("analysis_fallback".to_string());
        result
    }
}

fn recommend(
    spam: &SpamAnalysis,
    quality: &QualityAnalysis,
    toxicity: &ToxicityAnalysis,
) -> Recommendation {
    if (toxicity.severity == Severity::Critical && toxicity.score > 60.0) || spam.confidence > 0.8
    {
        Recommendation::Block
    } else if toxicity.severity == Severity::High || spam.confidence > 0.6 {
        Recommendation::Review
    } else if toxicity.severity == Severity::Medium
        || spam.confidence > 0.4
        || quality.score < 30.0
    {
        Recommendation::Flag
    } else {
        Recommendation::Approve
    }
}

/// Analysis results keyed by content id, valid for one text version.
pub struct AnalysisCache {
    entries: Mutex<HashMap<String, (String, Arc<AnalysisResult>)>>,
    capacity: usize,
}

impl AnalysisCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, content_id: &str, content_hash: &str) -> Option<Arc<AnalysisResult>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(content_id)
            .filter(|(hash, _)| hash == content_hash)
            .map(|(_, result)| result.clone())
    }

    pub fn insert(&self, content_id: &str, content_hash: &str, result: Arc<AnalysisResult>) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.capacity && !entries.contains_key(content_id) {
                log::debug!("Analysis cache full ({} entries), clearing", entries.len());
                entries.clear();
            }
            entries.insert(
                content_id.to_string(),
                (content_hash.to_string(), result),
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
