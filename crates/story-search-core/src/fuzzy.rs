//! ============================================================================
//! Fuzzy Matcher - Lenient string matching for metadata filters
//! ============================================================================
//! Rules, first match wins:
//! 1. substring containment in either direction
//! 2. any whitespace-separated word of the candidate contains the term,
//!    or the term contains the word
//! 3. terms of 3+ chars match inside any candidate word of 4+ chars
//!
//! Callers lower-case both sides; `matches_ignore_case` does it for them.
//! ============================================================================

/// Minimum term length for the partial-word rule
const PARTIAL_TERM_MIN: usize = 3;

/// Minimum candidate word length for the partial-word rule
const PARTIAL_WORD_MIN: usize = 4;

/// Match a candidate text against a query term. Both are expected to be
/// lower-cased already. Empty inputs never match.
pub fn matches(candidate: &str, term: &str) -> bool {
    let candidate = candidate.trim();
    let term = term.trim();
    if candidate.is_empty() || term.is_empty() {
        return false;
    }

    if candidate.contains(term) || term.contains(candidate) {
        return true;
    }

    let mut words = candidate.split_whitespace();
    if words
        .clone()
        .any(|word| word.contains(term) || term.contains(word))
    {
        return true;
    }

    term.chars().count() >= PARTIAL_TERM_MIN
        && words.any(|word| word.chars().count() >= PARTIAL_WORD_MIN && word.contains(term))
}

/// `matches` after lower-casing both sides
pub fn matches_ignore_case(candidate: &str, term: &str) -> bool {
    matches(&candidate.to_lowercase(), &term.to_lowercase())
}

/// True when any candidate value matches any term (OR within a field)
pub fn matches_any<C, T>(candidates: &[C], terms: &[T]) -> bool
where
    C: AsRef<str>,
    T: AsRef<str>,
{
    candidates.iter().any(|candidate| {
        terms
            .iter()
            .any(|term| matches_ignore_case(candidate.as_ref(), term.as_ref()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_either_direction() {
        assert!(matches("software engineer", "engineer"));
        assert!(matches("art", "modern art"));
        assert!(!matches("chef", "pilot"));
    }

    #[test]
    fn test_word_boundary_rule() {
        assert!(matches("loves painting and hiking", "hiking trips"));
        assert!(matches("data scientist", "scientists"));
    }

    #[test]
    fn test_partial_word_rule() {
        assert!(matches("photography enthusiast", "photo"));
        assert!(!matches("cooking", "xyz"));
    }

    #[test]
    fn test_empty_inputs_never_match() {
        assert!(!matches("", "art"));
        assert!(!matches("art", ""));
        assert!(!matches("   ", "  "));
    }

    #[test]
    fn test_case_handling() {
        assert!(!matches("Software Engineer", "engineer software"));
        assert!(matches_ignore_case("Software Engineer", "ENGINEER"));
    }

    #[test]
    fn test_matches_any_is_or_within_field() {
        let interests = vec!["travel".to_string(), "painting".to_string()];
        assert!(matches_any(interests.as_slice(), &["cooking", "travel"]));
        assert!(!matches_any(interests.as_slice(), &["cooking", "chess"]));
        let none: Vec<String> = Vec::new();
        assert!(!matches_any(none.as_slice(), &["travel"]));
    }
}
