//! Canonical name normalisation for the lookup index.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Produce the canonical lookup key for a name: NFKD-decomposed, combining
/// marks stripped, punctuation and whitespace dropped, lowercased.
///
/// "Ĵõhn Dóe-Smith" and "johndoesmith" normalise to the same key.
pub fn normalize(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Rank two display names by "complexity": a mixed-case name beats a
/// mono-case one, and a longer name beats a shorter one. Used only when
/// choosing the aggregate display name among member names.
pub fn compare_complexity(a: &str, b: &str) -> Ordering {
    case_class(a)
        .cmp(&case_class(b))
        .then(a.chars().count().cmp(&b.chars().count()))
}

fn case_class(s: &str) -> u8 {
    let has_upper = s.chars().any(|c| c.is_uppercase());
    let has_lower = s.chars().any(|c| c.is_lowercase());
    if has_upper && has_lower {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases() {
        assert_eq!(normalize("John"), "john");
        assert_eq!(normalize("DOE"), "doe");
    }

    #[test]
    fn test_normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize("O'Brien"), "obrien");
        assert_eq!(normalize("Doe-Smith"), "doesmith");
        assert_eq!(normalize("Mary Jane"), "maryjane");
        assert_eq!(normalize(" . - "), "");
    }

    #[test]
    fn test_normalize_strips_diacritics() {
        assert_eq!(normalize("Dóe"), "doe");
        assert_eq!(normalize("Müller"), "muller");
        assert_eq!(normalize("Ĵõhn"), "john");
    }

    #[test]
    fn test_normalize_keeps_digits() {
        assert_eq!(normalize("john2"), "john2");
    }

    #[test]
    fn test_complexity_mixed_case_beats_mono_case() {
        assert_eq!(compare_complexity("John Doe", "JOHNATHAN DOE"), Ordering::Greater);
        assert_eq!(compare_complexity("john doe", "John D"), Ordering::Less);
    }

    #[test]
    fn test_complexity_longer_beats_shorter_within_class() {
        assert_eq!(compare_complexity("Johnathan Doe", "John Doe"), Ordering::Greater);
        assert_eq!(compare_complexity("jo", "john"), Ordering::Less);
    }

    #[test]
    fn test_complexity_equal() {
        assert_eq!(compare_complexity("John Doe", "Jane Roe"), Ordering::Equal);
    }
}
