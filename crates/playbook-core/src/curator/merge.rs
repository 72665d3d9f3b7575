//! Deterministic content merge for reinforced bullets.
//!
//! `merge_content(existing, newer)` keeps the newer phrasing and appends any
//! clause of the existing text whose content words the newer text does not
//! already carry. It is a pure function of the two strings.

use std::collections::HashSet;

/// Function words ignored when checking whether a clause is covered.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "and", "or", "in", "on", "for", "with", "by", "at", "as", "it",
    "its", "this", "that", "from", "is", "are", "be", "been", "was", "were",
];

const CLAUSE_SEPARATOR: &str = "; ";

/// Merges an existing bullet's content with a newer phrasing.
pub fn merge_content(existing: &str, newer: &str) -> String {
    let existing = normalize_whitespace(existing);
    let newer = normalize_whitespace(newer);

    if newer.is_empty() {
        return existing;
    }
    if existing.is_empty() {
        return newer;
    }

    let existing_words = words(&existing);
    let newer_words = words(&newer);
    if contains_run(&newer_words, &existing_words) {
        return newer;
    }
    if contains_run(&existing_words, &newer_words) {
        return existing;
    }

    let covered = content_words(&newer);
    let mut missing: Vec<&str> = Vec::new();
    for clause in split_clauses(&existing) {
        let words = content_words(clause);
        if words.is_empty() || words.is_subset(&covered) {
            continue;
        }
        if !missing.iter().any(|m| m.eq_ignore_ascii_case(clause)) {
            missing.push(clause);
        }
    }

    if missing.is_empty() {
        return newer;
    }

    let terminal = newer.chars().last().filter(|c| matches!(c, '.' | '!' | '?'));
    let mut merged = trim_clause(&newer).to_string();
    for clause in missing {
        merged.push_str(CLAUSE_SEPARATOR);
        merged.push_str(clause);
    }
    if let Some(c) = terminal {
        merged.push(c);
    }
    merged
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased words, punctuation dropped.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `needle` occurs as a contiguous run of whole words in `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

fn trim_clause(text: &str) -> &str {
    text.trim().trim_end_matches(['.', ';', '!', '?', ',']).trim_end()
}

fn split_clauses(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', ';', '!', '?', '\n']).map(trim_clause).filter(|c| !c.is_empty())
}

fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

/// Strips a trailing plural `s` ("inputs" matches "input").
fn stem(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_identical_is_identity() {
        let text = "Always validate email format";
        assert_eq!(merge_content(text, text), text);
    }

    #[test]
    fn test_newer_superset_wins() {
        assert_eq!(
            merge_content("validate email", "Always validate email before saving"),
            "Always validate email before saving"
        );
    }

    #[test]
    fn test_existing_superset_kept() {
        assert_eq!(
            merge_content("Validate email format before processing", "validate email format"),
            "Validate email format before processing"
        );
    }

    #[test]
    fn test_missing_clause_appended() {
        let merged =
            merge_content("Always validate email format", "Validate email format before processing");
        assert_eq!(merged, "Validate email format before processing; Always validate email format");
    }

    #[test]
    fn test_covered_clauses_dropped() {
        let merged = merge_content(
            "Check the inputs. Log failures",
            "Check inputs and log failures with context.",
        );
        assert_eq!(merged, "Check inputs and log failures with context.");
    }

    #[test]
    fn test_only_uncovered_clauses_kept() {
        let merged = merge_content(
            "Retry on timeout. Cap retries at three",
            "Retry on timeout with backoff.",
        );
        assert_eq!(merged, "Retry on timeout with backoff; Cap retries at three.");
    }

    #[test]
    fn test_containment_respects_word_boundaries() {
        let merged = merge_content("Validate email", "Invalidate email cache");
        assert_eq!(merged, "Invalidate email cache; Validate email");
    }

    #[test]
    fn test_existing_inside_longer_word_not_dropped() {
        let merged = merge_content("Invalidate email cache", "validate email");
        assert_eq!(merged, "validate email; Invalidate email cache");
    }

    #[test]
    fn test_empty_sides() {
        assert_eq!(merge_content("", "New text"), "New text");
        assert_eq!(merge_content("Old text", "   "), "Old text");
    }

    #[test]
    fn test_merge_is_stable_when_repeated() {
        let once = merge_content("Use idempotency keys", "Send payment retries with backoff");
        let twice = merge_content(&once, "Send payment retries with backoff");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_whitespace_normalized() {
        assert_eq!(merge_content("a  b", "a b"), "a b");
    }
}
