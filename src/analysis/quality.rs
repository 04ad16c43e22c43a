use super::text;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "so", "of", "to", "in", "on", "at", "by",
    "for", "with", "from", "as", "is", "are", "was", "were", "be", "been", "being", "it", "its",
    "this", "that", "these", "those", "i", "you", "he", "she", "we", "they", "me", "him", "her",
    "us", "them", "my", "your", "our", "their", "do", "does", "did", "have", "has", "had", "not",
    "no", "yes", "just", "very", "too", "also", "can", "will", "would", "should", "could", "there",
    "here", "what", "which", "who", "when", "where", "how", "all", "any", "some", "lol", "ok",
];

const TRANSITION_WORDS: &[&str] = &[
    "however",
    "therefore",
    "moreover",
    "furthermore",
    "additionally",
    "consequently",
    "meanwhile",
    "also",
    "because",
    "although",
    "finally",
    "first",
    "second",
    "then",
    "instead",
    "overall",
    "similarly",
    "otherwise",
];

/// Vocabulary of the community the content is posted to.
const DOMAIN_KEYWORDS: &[&str] = &[
    "experience", "recommend", "helpful", "question", "answer", "guide", "tips", "review",
    "service", "booking", "stay", "host", "guest", "pet", "care", "visit", "trip", "advice",
    "community", "quality",
];

const COHERENCE_BASELINE: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub score: f64,
    pub word_count: usize,
    pub sentence_count: usize,
    pub avg_words_per_sentence: f64,
    pub meaningful_ratio: f64,
    pub readability: f64,
    pub coherence: f64,
    pub issues: Vec<String>,
}

/// Score text quality in [0, 100], starting from 100 and subtracting
/// penalties.
pub fn analyze(text: &str) -> QualityAnalysis {
    let words = text::words(text);
    let sentences = text::sentences(text);
    let word_count = words.len();
    let sentence_count = sentences.len().max(1);
    let avg_words_per_sentence = word_count as f64 / sentence_count as f64;

    let mut score: f64 = 100.0;
    let mut issues = Vec::new();

    if word_count < 5 {
        score -= 35.0;
        issues.push("too_short".to_string());
    } else if word_count < 10 {
        score -= 15.0;
        issues.push("short".to_string());
    } else if word_count > 500 {
        score -= 10.0;
        issues.push("too_long".to_string());
    }

    if avg_words_per_sentence < 3.0 {
        score -= 25.0;
        issues.push("fragmented_sentences".to_string());
    } else if avg_words_per_sentence > 40.0 {
        score -= 20.0;
        issues.push("overlong_sentences".to_string());
    }

    if text.matches('!').count() > 3 {
        score -= 15.0;
        issues.push("excessive_exclamation".to_string());
    }

    let trimmed = text.trim_end();
    if !trimmed.is_empty() && !trimmed.ends_with(['.', '!', '?']) {
        score -= 10.0;
        issues.push("missing_terminal_punctuation".to_string());
    }

    let meaningful_ratio = meaningful_ratio(&words);
    if meaningful_ratio < 0.3 {
        score -= 30.0;
        issues.push("low_meaningful_content".to_string());
    } else if meaningful_ratio < 0.5 {
        score -= 15.0;
        issues.push("limited_meaningful_content".to_string());
    }

    let readability = readability(&words, avg_words_per_sentence);
    if readability < 40.0 {
        score -= 20.0;
        issues.push("low_readability".to_string());
    }

    let coherence = coherence(&words, &sentences);
    if coherence < 0.5 {
        score -= 25.0;
        issues.push("low_coherence".to_string());
    }

    score += domain_relevance(&words);

    QualityAnalysis {
        score: score.clamp(0.0, 100.0),
        word_count,
        sentence_count: sentences.len(),
        avg_words_per_sentence,
        meaningful_ratio,
        readability,
        coherence,
        issues,
    }
}

fn meaningful_ratio(words: &[String]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let meaningful = words
        .iter()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .count();
    meaningful as f64 / words.len() as f64
}

/// `120 - 1.2*wps - 35*syllables_per_word + 20*simple_word_ratio`, clamped.
pub fn readability(words: &[String], avg_words_per_sentence: f64) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let syllable_counts: Vec<usize> = words.iter().map(|w| text::syllables(w)).collect();
    let total: usize = syllable_counts.iter().sum();
    let avg_syllables = total as f64 / words.len() as f64;
    let simple = syllable_counts.iter().filter(|&&s| s <= 2).count() as f64 / words.len() as f64;

    (120.0 - 1.2 * avg_words_per_sentence - 35.0 * avg_syllables + 20.0 * simple)
        .clamp(0.0, 100.0)
}

pub fn coherence(words: &[String], sentences: &[String]) -> f64 {
    let mut coherence = COHERENCE_BASELINE;

    let transitions = words
        .iter()
        .filter(|w| TRANSITION_WORDS.contains(&w.as_str()))
        .count();
    coherence += (transitions as f64 * 0.05).min(0.2);

    if sentences.len() > 1 {
        let sets: Vec<HashSet<String>> = sentences
            .iter()
            .map(|s| text::words(s).into_iter().collect())
            .collect();
        let overlaps: Vec<f64> = sets
            .windows(2)
            .map(|pair| {
                let smaller = pair[0].len().min(pair[1].len());
                if smaller == 0 {
                    0.0
                } else {
                    pair[0].intersection(&pair[1]).count() as f64 / smaller as f64
                }
            })
            .collect();
        let avg = overlaps.iter().sum::<f64>() / overlaps.len() as f64;
        coherence += 0.3 * avg;
    }

    coherence.clamp(0.0, 1.0)
}

fn domain_relevance(words: &[String]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let hits = words
        .iter()
        .filter(|w| DOMAIN_KEYWORDS.contains(&w.as_str()))
        .count();
    (hits as f64 / words.len() as f64 * 100.0).min(10.0)
}
