//! Capture-ignore rules.
//!
//! A capture whose triggering error message matches any rule is skipped. The
//! first rule that matches is reported so the decision can be logged.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Predicate over an error message
pub type MessagePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Rule errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IgnoreError {
    /// Regex did not compile
    #[error("invalid ignore pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        reason: String,
    },
}

impl From<IgnoreError> for rewind_core::CoreError {
    fn from(err: IgnoreError) -> Self {
        rewind_core::CoreError::Configuration {
            field: "capture_ignores".to_string(),
            reason: err.to_string(),
        }
    }
}

/// One ignore rule
#[derive(Clone)]
pub enum IgnoreRule {
    /// Message contains the substring
    Contains(String),
    /// Message matches the regex
    Pattern(Regex),
    /// Caller-supplied predicate
    Predicate(MessagePredicate),
}

impl IgnoreRule {
    /// Substring rule
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Regex rule
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not compile
    pub fn pattern(pattern: &str) -> Result<Self, IgnoreError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| IgnoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Predicate rule
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Check a message against this rule
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        match self {
            Self::Contains(needle) => message.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(message),
            Self::Predicate(f) => f(message),
        }
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => f.debug_tuple("Contains").field(needle).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => write!(f, "contains {:?}", needle),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
            Self::Predicate(_) => f.write_str("predicate"),
        }
    }
}

/// Serializable form of a rule, as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnorePattern {
    /// `{"contains": "..."}`
    Contains(String),
    /// `{"regex": "..."}`
    Regex(String),
}

impl TryFrom<&IgnorePattern> for IgnoreRule {
    type Error = IgnoreError;

    fn try_from(pattern: &IgnorePattern) -> Result<Self, Self::Error> {
        match pattern {
            IgnorePattern::Contains(needle) => Ok(IgnoreRule::contains(needle.clone())),
            IgnorePattern::Regex(source) => IgnoreRule::pattern(source),
        }
    }
}

/// Ordered set of ignore rules
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile configured patterns
    ///
    /// # Errors
    ///
    /// Returns error on the first pattern that does not compile
    pub fn from_patterns<'a>(
        patterns: impl IntoIterator<Item = &'a IgnorePattern>,
    ) -> Result<Self, IgnoreError> {
        let rules = patterns
            .into_iter()
            .map(IgnoreRule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Compile configured patterns, skipping any that do not compile.
    ///
    /// Each skipped pattern is logged at `warn`; the remaining rules still
    /// apply.
    #[must_use]
    pub fn from_patterns_lossy<'a>(patterns: impl IntoIterator<Item = &'a IgnorePattern>) -> Self {
        let rules = patterns
            .into_iter()
            .filter_map(|pattern| match IgnoreRule::try_from(pattern) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping capture ignore pattern");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Append a rule
    #[must_use]
    pub fn with_rule(mut self, rule: IgnoreRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// First rule that matches `message`
    #[must_use]
    pub fn first_match(&self, message: &str) -> Option<&IgnoreRule> {
        self.rules.iter().find(|rule| rule.matches(message))
    }

    /// Whether any rule matches `message`
    #[must_use]
    pub fn is_ignored(&self, message: &str) -> bool {
        self.first_match(message).is_some()
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
