//! # Routing Patterns
//!
//! Patterns are matched against the routing key an event is published under.
//! Keys and patterns are dot-separated segments, matched the way a topic
//! exchange matches them:
//!
//! - `user.created` matches only `user.created`
//! - `user.*` matches exactly one segment after `user` (`user.created`, not `user.created.v2`)
//! - `user.#` matches zero or more segments after `user` (`user`, `user.created`, `user.created.v2`)
//!
//! `*` and `#` are wildcards only when they make up a whole segment; a pattern
//! without wildcard segments matches by plain equality.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::{FromStr, Split};
use thiserror::Error;

const SEPARATOR: char = '.';
const ONE_SEGMENT: &str = "*";
const ANY_SEGMENTS: &str = "#";

/// Immutable routing pattern
///
/// Exact patterns match a routing key by plain string equality. On top of
/// that, a pattern must be non-empty and must not contain empty segments, so
/// `a..b`, `.a` and `a.` are rejected here rather than matching their own
/// text. Routing keys are held to the same rule when published and
/// additionally may not contain `*` or `#` segments.
///
/// Equality, ordering and hashing use the pattern text alone, so a
/// `HashMap<RoutingPattern, _>` can be queried with a `&str` routing key.
#[derive(Debug, Clone)]
pub struct RoutingPattern {
    text: String,
    wildcard: bool,
}

impl RoutingPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.split(SEPARATOR).any(str::is_empty) {
            return Err(PatternError::EmptySegment { pattern });
        }

        let wildcard = pattern
            .split(SEPARATOR)
            .any(|segment| segment == ONE_SEGMENT || segment == ANY_SEGMENTS);
        Ok(Self {
            text: pattern,
            wildcard,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether any segment is a `*` or `#` wildcard
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Check whether a concrete routing key matches this pattern
    pub fn matches(&self, routing_key: &str) -> bool {
        if !self.wildcard {
            return self.text == routing_key;
        }

        matches_segments(self.text.split(SEPARATOR), routing_key.split(SEPARATOR))
    }
}

fn matches_segments(mut pattern: Split<'_, char>, mut key: Split<'_, char>) -> bool {
    loop {
        match pattern.next() {
            None => return key.next().is_none(),
            Some(ANY_SEGMENTS) => loop {
                if matches_segments(pattern.clone(), key.clone()) {
                    return true;
                }
                if key.next().is_none() {
                    return false;
                }
            },
            Some(ONE_SEGMENT) => {
                if key.next().is_none() {
                    return false;
                }
            }
            Some(segment) => {
                if key.next() != Some(segment) {
                    return false;
                }
            }
        }
    }
}

impl PartialEq for RoutingPattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for RoutingPattern {}

impl Hash for RoutingPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for RoutingPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoutingPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for RoutingPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RoutingPattern {
    type Error = PatternError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for RoutingPattern {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl Borrow<str> for RoutingPattern {
    fn borrow(&self) -> &str {
        &self.text
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("routing pattern must not be empty")]
    Empty,

    #[error("routing pattern '{pattern}' has an empty segment")]
    EmptySegment { pattern: String },
}
