//! Lexical heuristics used to index and rank knowledge entries.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

const STOP_WORDS: [&str; 27] = [
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "were", "have", "has",
    "been", "into", "which", "their", "there", "about", "would", "could", "should", "will", "can",
    "may", "might", "not", "its",
];

static STOP_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORDS.into_iter().collect());

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("invalid punctuation regex"));

static EXPLICIT_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:confidence|score)(?:\s*\(\s*0\s*-\s*100\s*\))?[:\s]*(\d{1,3})")
        .expect("invalid explicit score regex")
});
static OUT_OF_HUNDRED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3})\s*/\s*100").expect("invalid ratio regex"));
static HIGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bhigh\b").expect("invalid band regex"));
static MEDIUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:medium|moderate)\b").expect("invalid band regex"));
static LOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\blow\b").expect("invalid band regex"));

pub fn is_stop_word(word: &str) -> bool {
    STOP_SET.contains(word)
}

fn normalized_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Tags for a thread: tokens longer than three characters that are not stop
/// words, deduplicated in first-seen order.
pub fn extract_domain_tags(thread: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalized_tokens(thread)
        .into_iter()
        .filter(|token| token.chars().count() > 3 && !is_stop_word(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Words that count toward relevance: longer than two characters, not stop words.
pub fn significant_words(text: &str) -> HashSet<String> {
    normalized_tokens(text)
        .into_iter()
        .filter(|token| token.chars().count() > 2 && !is_stop_word(token))
        .collect()
}

/// Confidence 0-100 from a verdict and its finding, or `None` when neither
/// carries a usable signal. Explicit numbers win over keyword bands.
pub fn extract_confidence(verdict: &str, finding: &str) -> Option<u8> {
    let text = format!("{verdict} {finding}").to_lowercase();

    for pattern in [&*EXPLICIT_SCORE, &*OUT_OF_HUNDRED] {
        let explicit = pattern
            .captures_iter(&text)
            .filter_map(|caps| caps[1].parse::<u16>().ok())
            .find(|value| *value <= 100);
        if let Some(value) = explicit {
            return Some(value as u8);
        }
    }

    if HIGH.is_match(&text) {
        Some(80)
    } else if MEDIUM.is_match(&text) {
        Some(50)
    } else if LOW.is_match(&text) {
        Some(25)
    } else {
        None
    }
}

/// Truncate to `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_prefers_explicit_values() {
        assert_eq!(extract_confidence("Confidence: 85", ""), Some(85));
        assert_eq!(extract_confidence("I rate this 72/100", ""), Some(72));
        assert_eq!(extract_confidence("score 40", "high impact"), Some(40));
        assert_eq!(
            extract_confidence("4. Confidence score (0-100): 64", ""),
            Some(64)
        );
    }

    #[test]
    fn confidence_falls_back_to_bands() {
        assert_eq!(extract_confidence("high confidence", ""), Some(80));
        assert_eq!(extract_confidence("", "Moderate support overall"), Some(50));
        assert_eq!(extract_confidence("Low certainty", ""), Some(25));
        assert_eq!(extract_confidence("nothing to see", "here either"), None);
    }

    #[test]
    fn confidence_ignores_out_of_range_numbers() {
        assert_eq!(extract_confidence("confidence: 450", ""), None);
    }

    #[test]
    fn bands_need_whole_words() {
        assert_eq!(extract_confidence("highlights only", "lowercase"), None);
    }

    #[test]
    fn domain_tags_filter_and_dedupe() {
        let tags = extract_domain_tags("Manufacturing costs of solid-state cells, and costs!");
        assert_eq!(
            tags,
            vec![
                "manufacturing".to_string(),
                "costs".to_string(),
                "solidstate".to_string(),
                "cells".to_string()
            ]
        );
    }

    #[test]
    fn domain_tags_are_idempotent() {
        let thread = "Supply chain risks for sulfide electrolytes";
        let first: HashSet<_> = extract_domain_tags(thread).into_iter().collect();
        let second: HashSet<_> = extract_domain_tags(thread).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn significant_words_drop_short_and_stop_words() {
        let words = significant_words("The cost of EV packs and the grid");
        assert!(words.contains("cost"));
        assert!(words.contains("packs"));
        assert!(words.contains("grid"));
        assert!(!words.contains("the"));
        assert!(!words.contains("of"));
        assert!(!words.contains("ev"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
    }
}
