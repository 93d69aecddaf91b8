//! Party-name canonicalization for catalog matching

use serde::{Deserialize, Serialize};

/// Canonical marker for a blank or explicitly unknown party name
pub const UNKNOWN_NAME: &str = "نامشخص";

/// Token joining the words of a normalized name
pub const WILDCARD: char = '%';

/// Fold look-alike letter variants to one canonical form and lowercase
///
/// Arabic yeh and hamza-yeh become Persian yeh, Arabic kaf becomes Persian
/// keheh, and the madda/hamza alef variants become a bare alef.
pub fn fold_characters(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ي' | 'ئ' => 'ی',
            'ك' => 'ک',
            'آ' | 'أ' => 'ا',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonicalize a free-text party name into a wildcard search pattern
///
/// Returns [`UNKNOWN_NAME`] for blank input, for the marker itself and for
/// "unknown". The result is stable under a second application.
pub fn normalize(raw: &str) -> String {
    let folded = fold_characters(raw.trim());
    if folded.is_empty() || folded == UNKNOWN_NAME || folded == "unknown" {
        return UNKNOWN_NAME.to_string();
    }

    let separator = WILDCARD.to_string();
    folded.split_whitespace().collect::<Vec<_>>().join(&separator)
}

/// True if `raw` normalizes to the unknown marker
pub fn is_unknown(raw: &str) -> bool {
    normalize(raw) == UNKNOWN_NAME
}

/// Ordered word pattern with `LIKE '%a%b%'` semantics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePattern {
    tokens: Vec<String>,
}

impl NamePattern {
    /// Build a pattern from a normalized name
    pub fn from_normalized(normalized: &str) -> Self {
        let tokens = normalized
            .split(WILDCARD)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { tokens }
    }

    /// Normalize `raw` and build its pattern
    pub fn from_raw(raw: &str) -> Self {
        Self::from_normalized(&normalize(raw))
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True if every token occurs in the folded title, in order
    pub fn matches(&self, title: &str) -> bool {
        if self.tokens.is_empty() {
            return false;
        }

        let folded = fold_characters(title);
        let mut rest = folded.as_str();
        for token in &self.tokens {
            match rest.find(token.as_str()) {
                Some(pos) => rest = &rest[pos + token.len()..],
                None => return false,
            }
        }
        true
    }

    /// Render as a store `LIKE` operand with literal `_` and `[` escaped
    pub fn to_like_operand(&self) -> String {
        let mut operand = String::from(WILDCARD);
        for token in &self.tokens {
            operand.push_str(&escape_like(token));
            operand.push(WILDCARD);
        }
        operand
    }
}

/// Escape the `LIKE` metacharacters of `text` so it matches literally
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' => escaped.push_str("[_]"),
            '[' => escaped.push_str("[[]"),
            WILDCARD => escaped.push_str("[%]"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blank_and_unknown_collapse_to_marker() {
        assert_eq!(normalize(""), UNKNOWN_NAME);
        assert_eq!(normalize("   \t "), UNKNOWN_NAME);
        assert_eq!(normalize(" نامشخص "), UNKNOWN_NAME);
        assert_eq!(normalize("Unknown"), UNKNOWN_NAME);
        assert!(is_unknown("UNKNOWN"));
    }

    #[test]
    fn test_folds_letter_variants() {
        assert_eq!(normalize("علي"), "علی");
        assert_eq!(normalize("كاظم"), "کاظم");
        assert_eq!(normalize("آرين"), "ارین");
        assert_eq!(normalize("أمير"), "امیر");
        assert_eq!(normalize("هيئت"), "هییت");
    }

    #[test]
    fn test_whitespace_runs_become_single_wildcard() {
        assert_eq!(normalize("  Acme   Trading  Co "), "acme%trading%co");
    }

    #[test]
    fn test_pattern_matches_in_order_with_gaps() {
        let pattern = NamePattern::from_raw("Acme Co");
        assert!(pattern.matches("ACME Trading Co."));
        assert!(!pattern.matches("Co-op Acme"));
        assert!(!pattern.matches("Beta Ltd"));
    }

    #[test]
    fn test_pattern_folds_catalog_title() {
        let pattern = NamePattern::from_raw("شرکت کیان");
        assert!(pattern.matches("شركت كيان صنعت"));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let pattern = NamePattern::from_normalized("%%");
        assert!(pattern.is_empty());
        assert!(!pattern.matches("anything"));
    }

    #[test]
    fn test_like_operand_escapes_metacharacters() {
        let pattern = NamePattern::from_raw("a_b [x]");
        assert_eq!(pattern.to_like_operand(), "%a[_]b%[[]x]%");
    }

    #[test]
    fn test_escape_like_keeps_wildcard_literal() {
        assert_eq!(escape_like("111"), "111");
        assert_eq!(escape_like("1_%"), "1[_][%]");
    }

    #[test]
    fn test_wildcard_only_name_has_empty_pattern() {
        assert!(NamePattern::from_raw("%").is_empty());
        assert!(NamePattern::from_raw("% %").is_empty());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in "\\PC{0,40}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_normalized_name_has_no_whitespace(raw in "[ a-zيكئآأیک\t]{0,30}") {
            prop_assert!(!normalize(&raw).chars().any(char::is_whitespace));
        }
    }
}
