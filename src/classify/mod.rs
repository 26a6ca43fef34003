//! Rule-based message classification.
//!
//! A message's subject and text are joined, lower-cased and matched against
//! five fixed rule-sets in priority order. The first rule-set with a literal
//! substring hit decides the category.

mod rules;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of classification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Out of Office")]
    OutOfOffice,
    #[serde(rename = "Spam")]
    Spam,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Interested")]
    Interested,
    #[default]
    #[serde(rename = "Uncategorized")]
    Uncategorized,
}

impl Category {
    /// Categories that have a rule-set, highest priority first.
    pub const PRIORITY: [Category; 5] = [
        Category::OutOfOffice,
        Category::Spam,
        Category::MeetingBooked,
        Category::NotInterested,
        Category::Interested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::OutOfOffice => "Out of Office",
            Category::Spam => "Spam",
            Category::MeetingBooked => "Meeting Booked",
            Category::NotInterested => "Not Interested",
            Category::Interested => "Interested",
            Category::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the classifier can read. Missing fields classify as empty text.
pub trait Classifiable {
    fn subject(&self) -> Option<&str>;
    fn text(&self) -> Option<&str>;
}

struct RuleSet {
    category: Category,
    patterns: &'static [&'static str],
    matcher: AhoCorasick,
}

impl RuleSet {
    fn new(category: Category, patterns: &'static [&'static str]) -> Option<Self> {
        let matcher = match AhoCorasick::new(patterns) {
            Ok(ac) => ac,
            Err(e) => {
                tracing::error!("Failed to build matcher for {}: {}", category, e);
                return None;
            }
        };
        Some(Self {
            category,
            patterns,
            matcher,
        })
    }

    fn matched_patterns(&self, content: &str) -> Vec<&'static str> {
        let mut hits: Vec<&'static str> = self
            .matcher
            .find_overlapping_iter(content)
            .map(|m| self.patterns[m.pattern().as_usize()])
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits
    }
}

/// Deterministic keyword classifier. Cheap to share behind an `Arc`.
pub struct Classifier {
    rule_sets: Vec<RuleSet>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        let rule_sets = Category::PRIORITY
            .iter()
            .filter_map(|category| RuleSet::new(*category, rules::patterns_for(*category)))
            .collect();
        Self { rule_sets }
    }

    pub fn classify(&self, message: &impl Classifiable) -> Category {
        self.classify_parts(message.subject(), message.text())
    }

    pub fn classify_parts(&self, subject: Option<&str>, text: Option<&str>) -> Category {
        let subject = subject.unwrap_or_default();
        let text = text.unwrap_or_default();
        let content = format!("{} {}", subject, text).to_lowercase();

        tracing::debug!(
            subject,
            text_len = text.len(),
            sample = %content.chars().take(100).collect::<String>(),
            "Classifying message"
        );

        for rule_set in &self.rule_sets {
            if rule_set.matcher.is_match(&content) {
                tracing::debug!(
                    matched = ?rule_set.matched_patterns(&content),
                    "Classified as: {}",
                    rule_set.category
                );
                return rule_set.category;
            }
        }

        tracing::debug!("Classified as: {}", Category::Uncategorized);
        Category::Uncategorized
    }
}
