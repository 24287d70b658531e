//! Near-duplicate suppression for ranked results

use super::tokenize::token_set;
use std::collections::HashSet;

/// Jaccard similarity of two token sets (two empty sets are identical)
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

/// Greedy diversity filter over an already sorted list.
///
/// A candidate is admitted only if its similarity to every admitted item is
/// below `radius`. Applying the filter to its own output changes nothing.
pub fn diversify<T, F>(items: Vec<T>, radius: f32, content: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut admitted: Vec<(T, HashSet<String>)> = Vec::with_capacity(items.len());
    for item in items {
        let tokens = token_set(content(&item));
        if admitted.iter().all(|(_, seen)| jaccard(&tokens, seen) < radius) {
            admitted.push((item, tokens));
        }
    }
    admitted.into_iter().map(|(item, _)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(items: &[&str], radius: f32) -> Vec<String> {
        let owned: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        diversify(owned, radius, |s| s.as_str())
    }

    #[test]
    fn test_jaccard() {
        let a = token_set("alpha beta gamma");
        let b = token_set("beta gamma delta");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-6);
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn test_duplicates_removed_keeping_first() {
        let out = run(
            &["fn load_config() {}", "fn load_config() {}", "fn save_state() {}"],
            0.85,
        );
        assert_eq!(out, vec!["fn load_config() {}", "fn save_state() {}"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let items = [
            "parse the request body",
            "parse the request body quickly",
            "parse request body",
            "write response headers",
            "write response headers now",
            "completely different words",
        ];
        let once = run(&items, 0.6);
        let refs: Vec<&str> = once.iter().map(|s| s.as_str()).collect();
        let twice = run(&refs, 0.6);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_radius_one_keeps_near_duplicates() {
        let out = run(&["alpha beta gamma delta", "alpha beta gamma epsilon"], 1.0);
        assert_eq!(out.len(), 2);
    }
}
