use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToxicityCategory {
    Harassment,
    Threats,
    AnimalAbuse,
    Profanity,
    Misinformation,
}

impl ToxicityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToxicityCategory::Harassment => "harassment",
            ToxicityCategory::Threats => "threats",
            ToxicityCategory::AnimalAbuse => "animal_abuse",
            ToxicityCategory::Profanity => "profanity",
            ToxicityCategory::Misinformation => "misinformation",
        }
    }
}

impl fmt::Display for ToxicityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn keyword_weight(&self) -> f64 {
        match self {
            Severity::Low => 10.0,
            Severity::Medium => 15.0,
            Severity::High => 20.0,
            Severity::Critical => 30.0,
        }
    }

    fn pattern_weight(&self) -> f64 {
        match self {
            Severity::Low => 15.0,
            Severity::Medium => 20.0,
            Severity::High => 30.0,
            Severity::Critical => 40.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_score(score: f64) -> Self {
        match score {
            s if s > 70.0 => Severity::Critical,
            s if s > 50.0 => Severity::High,
            s if s > 25.0 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

struct CategoryMatcher {
    category: ToxicityCategory,
    weight: f64,
    severity: Severity,
    keywords: Vec<(String, Regex)>,
    patterns: Vec<Regex>,
}

impl CategoryMatcher {
    fn new(
        category: ToxicityCategory,
        weight: f64,
        severity: Severity,
        keywords: &[&str],
        patterns: &[&str],
    ) -> Self {
        Self {
            category,
            weight,
            severity,
            keywords: keywords
                .iter()
                .map(|kw| {
                    let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).unwrap();
                    (kw.to_string(), regex)
                })
                .collect(),
            patterns: patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
                .collect(),
        }
    }
}

lazy_static! {
    static ref CATEGORIES: Vec<CategoryMatcher> = vec![
        CategoryMatcher::new(
            ToxicityCategory::Harassment,
            1.5,
            Severity::High,
            &["idiot", "stupid", "loser", "moron", "pathetic", "worthless", "shut up", "nobody likes you"],
            &[
                r"\byou(?:'re| are)\s+(?:so\s+)?(?:dumb|stupid|ugly|worthless|pathetic|useless)\b",
                r"\b(?:go|just)\s+(?:away|die)\b",
                r"\bno\s*one\s+(?:cares|wants you)\b",
            ],
        ),
        CategoryMatcher::new(
            ToxicityCategory::Threats,
            2.0,
            Severity::Critical,
            &["hurt you", "kill you", "beat you", "find you", "watch your back"],
            &[
                r"\b(?:i|we)(?:'ll|\s+will|\s+am going to|\s+are going to|\s+gonna)\s+(?:hurt|kill|beat|find|destroy|attack)\s+(?:you|him|her|them|your)\b",
                r"\byou(?:'ll|\s+will)\s+(?:regret|pay for)\b",
                r"\bi\s+know\s+where\s+you\s+live\b",
            ],
        ),
        CategoryMatcher::new(
            ToxicityCategory::AnimalAbuse,
            1.8,
            Severity::High,
            &["kick the dog", "starve", "poison the", "drown the", "beat the dog", "abandon the puppy"],
            &[
                r"\b(?:kick|beat|hit|starve|poison|drown|burn)\w*\s+(?:the|a|my|your|that)\s+(?:dog|cat|puppy|kitten|pet|animal)s?\b",
                r"\b(?:dogs?|cats?|pets?|animals?)\s+(?:deserve|should)\s+(?:to\s+)?(?:die|suffer)\b",
            ],
        ),
        CategoryMatcher::new(
            ToxicityCategory::Profanity,
            1.0,
            Severity::Medium,
            &["damn", "crap", "shit", "fuck", "bastard", "bitch", "asshole", "wtf"],
            &[r"\bf+u+c+k+\w*", r"\bs+h+i+t+\w*", r"\b[a-z]*[@$*#]{2,}[a-z]*\b"],
        ),
        CategoryMatcher::new(
            ToxicityCategory::Misinformation,
            1.2,
            Severity::Low,
            &["hoax", "plandemic", "fake news", "they don't want you to know", "miracle cure"],
            &[
                r"\b(?:vaccines?|5g)\s+(?:cause|causes)\s+\w+",
                r"\b(?:doctors|scientists|the government)\s+(?:are\s+)?hiding\b",
                r"\b100%\s+(?:cure|guaranteed)\b",
            ],
        ),
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToxicityAnalysis {
    pub score: f64,
    pub severity: Severity,
    pub is_toxic: bool,
    pub categories: BTreeMap<ToxicityCategory, f64>,
    pub matches: Vec<String>,
}

/// Score text toxicity in [0, 100] across the weighted categories.
pub fn analyze(text: &str) -> ToxicityAnalysis {
    let mut categories = BTreeMap::new();
    let mut matches = Vec::new();
    let mut total = 0.0;

    for matcher in CATEGORIES.iter() {
        let mut raw = 0.0;
        for (keyword, regex) in &matcher.keywords {
            if regex.is_match(text) {
                raw += matcher.severity.keyword_weight();
                matches.push(format!("{}: {}", matcher.category, keyword));
            }
        }
        for regex in &matcher.patterns {
            if let Some(m) = regex.find(text) {
                raw += matcher.severity.pattern_weight();
                matches.push(format!("{}: \"{}\"", matcher.category, m.as_str()));
            }
        }
        if raw > 0.0 {
            let category_score = (raw * matcher.weight).min(100.0);
            total += category_score;
            categories.insert(matcher.category, category_score);
        }
    }

    let score: f64 = f64::min(100.0, total);
    ToxicityAnalysis {
        score,
        severity: Severity::from_score(score),
        is_toxic: score > 30.0,
        categories,
        matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let result = analyze("Thanks for the tips, the walk along the river was lovely.");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.severity, Severity::Low);
        assert!(!result.is_toxic);
        assert!(result.categories.is_empty());
    }

    #[test]
    fn test_threat_is_critical() {
        let result = analyze("If you post that again i will hurt you");
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.score > 70.0);
        assert!(result.categories.contains_key(&ToxicityCategory::Threats));
        assert!(result.is_toxic);
    }

    #[test]
    fn test_profanity_single_word() {
        let result = analyze("well that was damn annoying");
        assert_eq!(result.categories.get(&ToxicityCategory::Profanity), Some(&15.0));
        assert_eq!(result.severity, Severity::Low);
        assert!(!result.is_toxic);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        // "class" and "assess" must not trip the profanity list
        let result = analyze("The class will assess the scunthorpe results.");
        assert!(result.categories.get(&ToxicityCategory::Profanity).is_none());
    }

    #[test]
    fn test_animal_abuse() {
        let result = analyze("Someone should kick the dog until it learns");
        assert!(result.categories.contains_key(&ToxicityCategory::AnimalAbuse));
        assert!(result.is_toxic);
    }

    #[test]
    fn test_severity_from_score() {
        assert_eq!(Severity::from_score(71.0), Severity::Critical);
        assert_eq!(Severity::from_score(70.0), Severity::High);
        assert_eq!(Severity::from_score(50.0), Severity::Medium);
        assert_eq!(Severity::from_score(25.0), Severity::Low);
    }
}
