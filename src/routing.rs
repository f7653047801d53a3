//! Routing keys and topic pattern matching.
//!
//! Lifecycle notifications are published under hierarchical routing keys of
//! the form `<producer>.<version>.notifications.recipe.<event>`, where
//! `<event>` is one of `saved`, `updated` or `deleted`. Downstream consumers
//! bind with topic patterns such as `*.*.notifications.recipe.*`.
//!
//! Pattern segments follow the usual topic-exchange rules:
//!
//! - a literal segment matches itself,
//! - `*` matches exactly one segment,
//! - `#` matches zero or more segments.

use std::fmt;

/// Lifecycle event kind, the final segment of a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A record was created (first persistence under an id).
    Saved,
    /// An existing record was overwritten by a newer version.
    Updated,
    /// A record was removed from both indices.
    Deleted,
}

impl EventKind {
    /// The routing-key segment for this event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing-key scheme for one producer.
///
/// Formats keys as `<producer>.<version>.notifications.recipe.<event>`.
/// Producer name and version come from configuration so that several
/// deployments can share one bus without colliding.
///
/// # Examples
///
/// ```
/// use recipes_storage::routing::{EventKind, KeyScheme};
///
/// let scheme = KeyScheme::new("cookbook", "v1");
/// assert_eq!(scheme.key(EventKind::Saved), "cookbook.v1.notifications.recipe.saved");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    producer: String,
    version: String,
}

impl KeyScheme {
    /// Creates a scheme for the given producer name and version tag.
    pub fn new(producer: impl Into<String>, version: impl Into<String>) -> Self {
        Self { producer: producer.into(), version: version.into() }
    }

    /// The full routing key for an event kind.
    #[must_use]
    pub fn key(&self, kind: EventKind) -> String {
        format!("{}.{}.notifications.recipe.{}", self.producer, self.version, kind)
    }

    /// A pattern matching every recipe notification from any producer.
    ///
    /// Uses `#` rather than `*.*` for the leading producer and version
    /// segments so the binding keeps matching if a producer ever uses a
    /// different number of identity segments.
    #[must_use]
    pub fn wildcard() -> &'static str {
        "#.notifications.recipe.*"
    }
}

/// A parsed topic pattern usable as a subscription binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` — exactly one segment.
    One,
    /// `#` — zero or more segments.
    Many,
}

impl TopicPattern {
    /// Parses a dot-separated pattern. Every input is a valid pattern;
    /// `*` and `#` are only special as whole segments.
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => Segment::One,
                "#" => Segment::Many,
                lit => Segment::Literal(lit.to_owned()),
            })
            .collect();
        Self { segments }
    }

    /// Whether the given routing key matches this pattern.
    #[must_use]
    pub fn matches(&self, routing_key: &str) -> bool {
        let key: Vec<&str> = routing_key.split('.').collect();
        matches_at(&self.segments, &key)
    }
}

fn matches_at(pattern: &[Segment], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(Segment::Literal(lit)) => {
            key.first() == Some(&lit.as_str()) && matches_at(&pattern[1..], &key[1..])
        }
        Some(Segment::One) => !key.is_empty() && matches_at(&pattern[1..], &key[1..]),
        Some(Segment::Many) => {
            // `#` either consumes nothing or one segment and stays greedy.
            matches_at(&pattern[1..], key)
                || (!key.is_empty() && matches_at(pattern, &key[1..]))
        }
    }
}
