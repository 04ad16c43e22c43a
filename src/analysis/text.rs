//! Tokenization and counting helpers shared by the analyzers.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}']+").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]+").unwrap();
    pub static ref URL: Regex = Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").unwrap();
}

/// Lowercased word tokens.
pub fn words(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn word_count(text: &str) -> usize {
    words(text).len()
}

/// Sentences split on terminal punctuation. Text without any terminal
/// punctuation counts as one sentence.
pub fn sentences(text: &str) -> Vec<String> {
    let parts: Vec<String> = SENTENCE_END
        .split(text)
        .map(|s| s.trim().to_string())
        .filter(|s| WORD.is_match(s))
        .collect();
    if parts.is_empty() && WORD.is_match(text) {
        vec![text.trim().to_string()]
    } else {
        parts
    }
}

pub fn url_count(text: &str) -> usize {
    URL.find_iter(text).count()
}

/// Share of letters that are uppercase; 0 for text without letters.
pub fn caps_ratio(text: &str) -> f64 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}

/// Runs of five or more identical non-space characters ("soooooo", "!!!!!").
pub fn repeated_char_runs(text: &str) -> usize {
    let mut runs = 0;
    let mut prev: Option<char> = None;
    let mut len = 0;
    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            len += 1;
        } else {
            if len >= 5 {
                runs += 1;
            }
            prev = Some(c);
            len = 1;
        }
    }
    if len >= 5 {
        runs += 1;
    }
    runs
}

/// Syllable estimate from vowel groups, with silent-e and -le corrections.
pub fn syllables(word: &str) -> usize {
    let word: Vec<char> = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        return 0;
    }
    if word.len() <= 3 {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut in_group = false;
    for &c in &word {
        if is_vowel(c) {
            if !in_group {
                count += 1;
            }
            in_group = true;
        } else {
            in_group = false;
        }
    }

    let n = word.len();
    if word[n - 1] == 'e' {
        // "table", "bottle": the -le carries its own syllable
        let consonant_le = word[n - 2] == 'l' && !is_vowel(word[n - 3]);
        if !consonant_le && count > 1 {
            count -= 1;
        }
    }

    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_and_sentences() {
        let text = "Hello there. How are you? Fine!";
        assert_eq!(words(text), vec!["hello", "there", "how", "are", "you", "fine"]);
        assert_eq!(sentences(text).len(), 3);
        assert_eq!(sentences("no punctuation here").len(), 1);
        assert!(sentences("").is_empty());
    }

    #[test]
    fn test_syllables() {
        assert_eq!(syllables("cat"), 1);
        assert_eq!(syllables("make"), 1);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("reading"), 2);
        assert_eq!(syllables("beautiful"), 3);
    }

    #[test]
    fn test_repeated_runs() {
        assert_eq!(repeated_char_runs("sooooo good!!!!!"), 2);
        assert_eq!(repeated_char_runs("normal text"), 0);
    }

    #[test]
    fn test_caps_and_urls() {
        assert_eq!(caps_ratio("ABC def"), 0.5);
        assert_eq!(caps_ratio("123"), 0.0);
        assert_eq!(url_count("see https://a.com and www.b.org"), 2);
    }
}
