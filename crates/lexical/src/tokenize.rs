//! Query tokenization for lexical search

use once_cell::sync::Lazy;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Closed stoplist. Filler words that would otherwise fan out into
/// text-match conditions against every field.
pub static STOPLIST: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "what", "is", "the", "of", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for",
        "with", "by", "can", "you", "please",
    ]
    .into_iter()
    .collect()
});

/// Tokenize a query: lowercase, strip punctuation, drop stopwords and
/// tokens of length two or less. Duplicates collapse, first occurrence
/// order is kept.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut tokens = Vec::new();
    for word in query.unicode_words() {
        let token = word.to_lowercase();
        if token.len() <= 2 || STOPLIST.contains(token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

/// Whole-word tokenization of document text, keeping positions.
pub fn tokenize_text(text: &str) -> Vec<String> {
    text.unicode_words().map(|word| word.to_lowercase()).collect()
}

/// Bounded Levenshtein check: true when `a` and `b` are within edit
/// distance one. Cheap early exits make this safe on long tokens.
pub fn within_edit_distance_one(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };
    match long.len() - short.len() {
        0 => {
            // Same length: at most one substitution.
            short
                .iter()
                .zip(long.iter())
                .filter(|(x, y)| x != y)
                .count()
                <= 1
        }
        1 => {
            // One insertion: skip exactly one char of the longer string.
            let mut i = 0;
            let mut j = 0;
            let mut skipped = false;
            while i < short.len() && j < long.len() {
                if short[i] == long[j] {
                    i += 1;
                    j += 1;
                } else if skipped {
                    return false;
                } else {
                    skipped = true;
                    j += 1;
                }
            }
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize_query("What is the table of abilities?");
        assert_eq!(tokens, vec!["table", "abilities"]);
    }

    #[test]
    fn test_tokenize_strips_punctuation_and_lowercases() {
        let tokens = tokenize_query("Warranty, CLAIM!");
        assert_eq!(tokens, vec!["warranty", "claim"]);
    }

    #[test]
    fn test_tokenize_deduplicates() {
        let tokens = tokenize_query("claim claim claim");
        assert_eq!(tokens, vec!["claim"]);
    }

    #[test]
    fn test_all_stopwords_yields_empty() {
        assert!(tokenize_query("what is the of a an").is_empty());
    }

    #[test]
    fn test_edit_distance_exact_and_substitution() {
        assert!(within_edit_distance_one("table", "table"));
        assert!(within_edit_distance_one("table", "tible"));
        assert!(!within_edit_distance_one("table", "tibld"));
    }

    #[test]
    fn test_edit_distance_insertion_and_deletion() {
        assert!(within_edit_distance_one("table", "tables"));
        assert!(within_edit_distance_one("tables", "table"));
        assert!(within_edit_distance_one("able", "table"));
        assert!(!within_edit_distance_one("able", "tables"));
    }

    #[test]
    fn test_edit_distance_length_gap_over_one() {
        assert!(!within_edit_distance_one("cat", "catalog"));
    }
}
