use super::text;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const KEYWORD_SCORE: f64 = 15.0;
const EXCESSIVE_KEYWORD_BONUS: f64 = 25.0;
const PATTERN_CAP: f64 = 50.0;

/// English and regional (romanized Hindi) promotional/spam phrases.
const SPAM_KEYWORDS: &[&str] = &[
    "buy now",
    "click here",
    "free money",
    "make money",
    "earn money",
    "work from home",
    "limited time",
    "act now",
    "winner",
    "congratulations",
    "guaranteed",
    "risk free",
    "cash bonus",
    "double your",
    "lottery",
    "crypto",
    "bitcoin",
    "investment opportunity",
    "no credit check",
    "cheap",
    "discount code",
    "subscribe",
    "follow me",
    "dm me",
    "whatsapp",
    "telegram",
    "paisa kamao",
    "ghar baithe",
    "free mein",
    "jaldi karo",
    "sirf aaj",
    "offer khatam",
    "lakh kamaye",
];

const PROMOTIONAL_WORDS: &[&str] = &[
    "free", "offer", "deal", "sale", "discount", "cheap", "bonus", "promo", "win", "prize",
    "cash", "money", "earn", "profit", "exclusive", "limited", "hurry", "instant", "best",
    "guaranteed", "click", "buy", "order",
];

struct SpamPattern {
    name: &'static str,
    regex: Regex,
    weight: f64,
}

lazy_static! {
    static ref KEYWORD_PATTERNS: Vec<(&'static str, Regex)> = SPAM_KEYWORDS
        .iter()
        .map(|kw| {
            let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).unwrap();
            (*kw, regex)
        })
        .collect();
    static ref SPAM_PATTERNS: Vec<SpamPattern> = vec![
        SpamPattern {
            name: "caps_words",
            regex: Regex::new(r"\b[A-Z]{4,}\b").unwrap(),
            weight: 8.0,
        },
        SpamPattern {
            name: "digit_run",
            regex: Regex::new(r"\d{6,}").unwrap(),
            weight: 10.0,
        },
        SpamPattern {
            name: "symbol_run",
            regex: Regex::new(r"[!?$*#%&]{3,}").unwrap(),
            weight: 12.0,
        },
        SpamPattern {
            name: "url",
            regex: text::URL.clone(),
            weight: 15.0,
        },
        SpamPattern {
            name: "money",
            regex: Regex::new(r"(?i)[$€£₹]\s?\d+|\b\d+\s?(?:dollars|rupees|usd|inr|rs\.?)\b")
                .unwrap(),
            weight: 12.0,
        },
        SpamPattern {
            name: "social_handle",
            regex: Regex::new(r"(?:^|\s)@[A-Za-z0-9_]{3,}").unwrap(),
            weight: 8.0,
        },
        SpamPattern {
            name: "phone_number",
            regex: Regex::new(r"\+?\d[\d\s-]{8,}\d").unwrap(),
            weight: 20.0,
        },
        SpamPattern {
            name: "email_address",
            regex: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+\.[A-Za-z0-9.]+").unwrap(),
            weight: 15.0,
        },
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamAnalysis {
    pub score: f64,
    pub is_spam: bool,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub url_count: usize,
    pub flags: BTreeSet<String>,
}

/// Score text for spam likelihood in [0, 100].
pub fn analyze(text: &str) -> SpamAnalysis {
    let words = text::words(text);
    let word_count = words.len();
    let mut flags = BTreeSet::new();
    let mut score = 0.0;

    let matched_keywords: Vec<String> = KEYWORD_PATTERNS
        .iter()
        .filter(|(_, regex)| regex.is_match(text))
        .map(|(kw, _)| kw.to_string())
        .collect();
    if !matched_keywords.is_empty() {
        score += KEYWORD_SCORE * matched_keywords.len() as f64;
        flags.insert("spam_keywords".to_string());
    }
    if matched_keywords.len() > 3 {
        score += EXCESSIVE_KEYWORD_BONUS;
        flags.insert("excessive_spam_keywords".to_string());
    }

    let repeated = text::repeated_char_runs(text);
    if repeated > 0 {
        score += (10.0 * repeated as f64).min(PATTERN_CAP);
        flags.insert("repeated_characters".to_string());
    }

    for pattern in SPAM_PATTERNS.iter() {
        let hits = pattern.regex.find_iter(text).count();
        if hits > 0 {
            score += (pattern.weight * hits as f64).min(PATTERN_CAP);
            flags.insert(pattern.name.to_string());
        }
    }

    let promo_count = words
        .iter()
        .filter(|w| PROMOTIONAL_WORDS.contains(&w.as_str()))
        .count();

    if word_count < 5 && (!matched_keywords.is_empty() || promo_count > 0) {
        score += 30.0;
        flags.insert("short_promotional".to_string());
    }

    let sentence_count = text::sentences(text).len();
    if word_count > 25 && sentence_count == 1 {
        score += 20.0;
        flags.insert("run_on_sentence".to_string());
    }

    let caps_ratio = text::caps_ratio(text);
    if caps_ratio > 0.3 {
        score += (caps_ratio * 30.0).min(30.0);
        flags.insert("excessive_caps".to_string());
    }

    let url_count = text::url_count(text);
    if url_count > 1 {
        score += 15.0 * (url_count - 1) as f64;
        flags.insert("multiple_links".to_string());
    }

    if promo_count >= 3 {
        score += (promo_count as f64 * 8.0).min(40.0);
        flags.insert("promotional_language".to_string());
    }

    let score = score.clamp(0.0, 100.0);
    SpamAnalysis {
        score,
        is_spam: score > 50.0,
        confidence: score / 100.0,
        matched_keywords,
        url_count,
        flags,
    }
}
