//! Keyword extraction for grant matching.

use std::collections::HashMap;

use regex::Regex;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Top keywords from a project summary, with the stated focus area and
/// organization type folded in. Lowercase tokens of three letters or more,
/// stop words dropped, ranked by frequency, at most ten.
pub fn extract_keywords(summary: &str, focus_area: &str, org_type: &str) -> Vec<String> {
    // Static pattern, parse cannot fail
    let word = Regex::new(r"\b[a-z]{3,}\b").unwrap();

    let mut tokens: Vec<String> = word
        .find_iter(&summary.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect();
    for extra in [focus_area, org_type] {
        tokens.extend(extra.to_lowercase().split_whitespace().map(String::from));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    // Stable output: frequency first, then alphabetical
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(10).map(|(w, _)| w).collect()
}
