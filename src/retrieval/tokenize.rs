//! Code-aware tokenizer shared by BM25, boosting and diversity filtering

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "of", "on", "or", "so", "that", "the", "then", "this", "to",
    "was", "were", "will", "with",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

fn keep(token: &str) -> bool {
    token.chars().count() > 1 && !is_stopword(token)
}

/// Split an identifier on `_` and camelCase boundaries.
///
/// `parseHTTPRequest` yields `parse`, `HTTP`, `Request`.
pub fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in word.split('_').filter(|s| !s.is_empty()) {
        let chars: Vec<char> = segment.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0 && c.is_uppercase() && {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            };
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current);
        }
    }
    parts
}

/// Tokenize text for indexing and querying.
///
/// Lowercases, splits on anything that is not alphanumeric or `_`, and
/// emits identifier parts in addition to the whole identifier. Drops
/// single-character tokens and stopwords. Duplicates are preserved so term
/// frequencies stay meaningful.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let whole = word.to_lowercase();
        let parts = split_identifier(word);
        let is_compound = parts.len() > 1;

        let trimmed = whole.trim_matches('_');
        if keep(trimmed) {
            tokens.push(trimmed.to_string());
        }
        if is_compound {
            for part in parts {
                let part = part.to_lowercase();
                if keep(&part) {
                    tokens.push(part);
                }
            }
        }
    }
    tokens
}

/// Distinct tokens of `text`
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Distinct query terms in first-seen order
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
