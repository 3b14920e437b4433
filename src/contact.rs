// ☎️ Contact Classifier - ordered (pattern, field) rules for free-text enquiry fields
//
// First matching rule wins: email, then phone, then address.
// A value matching none of them is discarded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactField {
    Email,
    PhoneNumber,
    Address,
}

#[derive(Debug, Clone)]
pub struct ContactRule {
    pub field: ContactField,
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct ContactClassifier {
    rules: Vec<ContactRule>,
}

static DEFAULT_RULES: Lazy<Vec<ContactRule>> = Lazy::new(|| {
    let rule = |field, pattern: &str| {
        Regex::new(pattern)
            .ok()
            .map(|pattern| ContactRule { field, pattern })
    };

    [
        rule(ContactField::Email, r"^[^@\s]+@[^@\s]+\.[^@\s]+$"),
        rule(ContactField::PhoneNumber, r"^[\d ]+$"),
        rule(ContactField::Address, r"^[a-zA-Z\d ,]+$"),
    ]
    .into_iter()
    .flatten()
    .collect()
});

impl Default for ContactClassifier {
    fn default() -> Self {
        ContactClassifier {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl ContactClassifier {
    pub fn new(rules: Vec<ContactRule>) -> Self {
        ContactClassifier { rules }
    }

    pub fn rules(&self) -> &[ContactRule] {
        &self.rules
    }

    /// Field assigned to `value`, if any rule matches.
    pub fn classify(&self, value: &str) -> Option<ContactField> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(value))
            .map(|rule| rule.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_examples() {
        let classifier = ContactClassifier::default();

        assert_eq!(classifier.classify("ops@example.co.uk"), Some(ContactField::Email));
        assert_eq!(classifier.classify("0207 123 4567"), Some(ContactField::PhoneNumber));
        assert_eq!(classifier.classify("12 High Street, Leeds"), Some(ContactField::Address));
        assert_eq!(classifier.classify("https://example.com"), None);

        println!("✅ Contact classification test PASSED");
    }

    #[test]
    fn test_phone_wins_over_address() {
        // Digits and spaces also match the address pattern
        let classifier = ContactClassifier::default();
        assert_eq!(classifier.classify("01234 567890"), Some(ContactField::PhoneNumber));
    }

    #[test]
    fn test_email_needs_a_dotted_domain_without_spaces() {
        let classifier = ContactClassifier::default();

        assert_eq!(classifier.classify("  help@bus.example \t"), Some(ContactField::Email));
        assert_eq!(classifier.classify("help@busexample"), None);
        assert_eq!(classifier.classify("help desk@bus.example"), None);
    }

    #[test]
    fn test_blank_is_discarded() {
        assert_eq!(ContactClassifier::default().classify("   "), None);
    }

    #[test]
    fn test_rule_order_is_the_tie_break() {
        let digits = Regex::new(r"^[\d ]+$").unwrap();
        let classifier = ContactClassifier::new(vec![
            ContactRule {
                field: ContactField::Address,
                pattern: digits.clone(),
            },
            ContactRule {
                field: ContactField::PhoneNumber,
                pattern: digits,
            },
        ]);

        assert_eq!(classifier.classify("0207 123 4567"), Some(ContactField::Address));
    }
}
