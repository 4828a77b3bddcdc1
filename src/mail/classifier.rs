//! Action phrase classifier.
//!
//! Maps the free-text action line of a notification ("Jane Doe approved the
//! pull request") onto a closed set of lifecycle events. Rules are tried in
//! table order and the first match wins, so the order below is load-bearing:
//! a phrase that satisfies two rules always resolves to the earlier one.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::mail::types::{Classification, EventKind};

/// A single classification rule. Every substring must be present.
#[derive(Debug, Clone)]
pub struct ActionRule {
    pub all_of: &'static [&'static str],
    pub kind: EventKind,
}

/// Default rule table.
pub static DEFAULT_RULES: &[ActionRule] = &[
    ActionRule {
        all_of: &["completed the pull request"],
        kind: EventKind::Completed,
    },
    ActionRule {
        all_of: &["commented"],
        kind: EventKind::Commented,
    },
    ActionRule {
        all_of: &["replied"],
        kind: EventKind::Replied,
    },
    ActionRule {
        all_of: &["approved the pull request"],
        kind: EventKind::Approved,
    },
    ActionRule {
        all_of: &["pushed"],
        kind: EventKind::Pushed,
    },
    ActionRule {
        all_of: &["abandoned the pull request"],
        kind: EventKind::Abandoned,
    },
    ActionRule {
        all_of: &["created the pull request"],
        kind: EventKind::Created,
    },
    ActionRule {
        all_of: &["set", "auto-complete"],
        kind: EventKind::AutoComplete,
    },
];

/// Ordered first-match classifier with a counter for phrases no rule covers.
pub struct ActionClassifier {
    rules: &'static [ActionRule],
    unclassified: AtomicU64,
}

impl Default for ActionClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

impl ActionClassifier {
    pub fn new(rules: &'static [ActionRule]) -> Self {
        Self {
            rules,
            unclassified: AtomicU64::new(0),
        }
    }

    /// Classify `phrase`. `author` is the name already extracted from its front
    /// and is removed before matching.
    pub fn classify(&self, phrase: &str, author: &str) -> Classification {
        let predicate = phrase
            .trim()
            .strip_prefix(author)
            .unwrap_or(phrase)
            .to_lowercase();

        for rule in self.rules {
            if rule.all_of.iter().all(|needle| predicate.contains(needle)) {
                debug!(kind = rule.kind.label(), phrase = %phrase, "Action phrase classified");
                return Classification::Event(rule.kind);
            }
        }

        let total = self.unclassified.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(phrase = %phrase, unclassified_total = total, "No action rule matched");
        Classification::Unrecognized
    }

    /// Number of phrases that matched no rule since startup.
    pub fn unclassified_count(&self) -> u64 {
        self.unclassified.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(phrase: &str) -> Classification {
        ActionClassifier::default().classify(phrase, "Jane Doe")
    }

    #[test]
    fn canonical_phrases_map_to_unique_kinds() {
        let fixtures = [
            ("Jane Doe completed the pull request", EventKind::Completed),
            ("Jane Doe commented:", EventKind::Commented),
            ("Jane Doe replied:", EventKind::Replied),
            ("Jane Doe approved the pull request", EventKind::Approved),
            ("Jane Doe pushed updates", EventKind::Pushed),
            ("Jane Doe abandoned the pull request", EventKind::Abandoned),
            ("Jane Doe created the pull request", EventKind::Created),
            (
                "Jane Doe set auto-complete for the pull request",
                EventKind::AutoComplete,
            ),
        ];
        for (phrase, expected) in fixtures {
            assert_eq!(classify(phrase), Classification::Event(expected), "{phrase}");
        }
    }

    #[test]
    fn unknown_phrase_is_unrecognized_and_counted() {
        let classifier = ActionClassifier::default();
        assert_eq!(
            classifier.classify("Jane Doe renamed the pull request", "Jane Doe"),
            Classification::Unrecognized
        );
        assert_eq!(classifier.unclassified_count(), 1);
    }

    #[test]
    fn auto_complete_requires_both_substrings() {
        assert_eq!(
            classify("Jane Doe cancelled auto-complete"),
            Classification::Unrecognized
        );
        assert_eq!(
            classify("Jane Doe set the pull request to draft"),
            Classification::Unrecognized
        );
    }

    #[test]
    fn earlier_rule_wins_on_overlap() {
        // Matches both "commented" and "replied"; table order decides.
        assert_eq!(
            classify("Jane Doe replied and commented:"),
            Classification::Event(EventKind::Commented)
        );
    }

    #[test]
    fn author_name_is_not_matched() {
        let classifier = ActionClassifier::default();
        assert_eq!(
            classifier.classify("Pushed Smith approved the pull request", "Pushed Smith"),
            Classification::Event(EventKind::Approved)
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let phrase = "Jane Doe Approved The Pull Request";
        let author = crate::mail::extract::extract_person_name(phrase);
        assert_eq!(
            ActionClassifier::default().classify(phrase, &author),
            Classification::Event(EventKind::Approved)
        );
    }
}
