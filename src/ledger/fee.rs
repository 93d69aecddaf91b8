//! Bank-fee detection

use crate::ledger::normalize::fold_characters;

/// Default fee marker ("service charge")
pub const FEE_MARKER: &str = "کارمزد";

/// Detects bank service charges from text markers
#[derive(Debug, Clone)]
pub struct FeeClassifier {
    markers: Vec<String>,
}

impl Default for FeeClassifier {
    fn default() -> Self {
        Self::new(vec![FEE_MARKER.to_string()])
    }
}

impl FeeClassifier {
    /// Create a classifier matching any of `markers`
    pub fn new(markers: Vec<String>) -> Self {
        let markers = markers
            .iter()
            .map(|m| fold_characters(m.trim()))
            .filter(|m| !m.is_empty())
            .collect();
        Self { markers }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// True if either the party name or the description carries a fee marker
    pub fn is_fee(&self, party_name: &str, description: Option<&str>) -> bool {
        let party = fold_characters(party_name);
        let description = description.map(fold_characters).unwrap_or_default();
        self.markers
            .iter()
            .any(|marker| party.contains(marker.as_str()) || description.contains(marker.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_in_party_name() {
        let classifier = FeeClassifier::default();
        assert!(classifier.is_fee("کارمزد", None));
        assert!(classifier.is_fee("کارمزد ساتنا", Some("")));
    }

    #[test]
    fn test_marker_in_description_only() {
        let classifier = FeeClassifier::default();
        assert!(classifier.is_fee("Acme Co", Some("بابت کارمزد انتقال")));
    }

    #[test]
    fn test_marker_with_arabic_kaf_variant() {
        let classifier = FeeClassifier::default();
        assert!(classifier.is_fee("كارمزد پایا", None));
    }

    #[test]
    fn test_plain_payment_is_not_fee() {
        let classifier = FeeClassifier::default();
        assert!(!classifier.is_fee("Acme Co", Some("invoice 42")));
        assert!(!classifier.is_fee("", None));
    }

    #[test]
    fn test_custom_markers() {
        let classifier = FeeClassifier::new(vec!["آبونمان".to_string(), "  ".to_string()]);
        assert_eq!(classifier.markers().len(), 1);
        assert!(classifier.is_fee("ابونمان سالانه", None));
        assert!(!classifier.is_fee("کارمزد", None));
    }
}
