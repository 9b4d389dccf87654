// ABOUTME: Phrase cache — static canned replies that short-circuit the upstream call.
// ABOUTME: Exact match on normalized input first, then substring containment, in rule order.

use serde::{Deserialize, Serialize};

/// One canned reply, triggered by a phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRule {
    pub phrase: String,
    pub reply: String,
}

impl PhraseRule {
    pub fn new(phrase: &str, reply: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            reply: reply.to_string(),
        }
    }
}

/// Trimmed, case-folded form used for matching.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Ordered list of phrase rules. An empty cache never matches.
#[derive(Debug, Clone, Default)]
pub struct PhraseCache {
    rules: Vec<PhraseRule>,
}

impl PhraseCache {
    /// Build a cache; phrases are normalized and blank phrases are dropped.
    pub fn new(rules: impl IntoIterator<Item = PhraseRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| PhraseRule {
                phrase: normalize(&rule.phrase),
                reply: rule.reply,
            })
            .filter(|rule| !rule.phrase.is_empty())
            .collect();
        Self { rules }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find a canned reply for `input`.
    pub fn lookup(&self, input: &str) -> Option<&str> {
        let input = normalize(input);
        if input.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.phrase == input)
            .or_else(|| self.rules.iter().find(|rule| input.contains(&rule.phrase)))
            .map(|rule| rule.reply.as_str())
    }
}
