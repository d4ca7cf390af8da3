// SPDX-License-Identifier: MIT

//! Permission scopes: `<resource>:<action>:<target>` triples with wildcard
//! matching on any segment.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// A parsed, validated permission scope string.
///
/// Two scopes match iff their triples match segment-wise, where `*` on
/// either side matches any value for that segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
    resource: SmolStr,
    action: SmolStr,
    target: SmolStr,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ScopeParseError {
    #[error("scope {0:?} must have exactly three `:`-separated segments")]
    WrongSegmentCount(String),
    #[error("scope {0:?} has an empty segment")]
    EmptySegment(String),
}

impl Scope {
    pub fn new(resource: impl Into<SmolStr>, action: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self { resource: resource.into(), action: action.into(), target: target.into() }
    }

    pub fn parse(s: &str) -> Result<Self, ScopeParseError> {
        // `splitn(3, ..)` so the target segment may itself contain colons
        // (a URL target like `network:request:https://x` is exactly two
        // colons past `resource` and `action`).
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        let [resource, action, target] = parts.as_slice() else {
            return Err(ScopeParseError::WrongSegmentCount(s.to_string()));
        };
        if resource.is_empty() || action.is_empty() || target.is_empty() {
            return Err(ScopeParseError::EmptySegment(s.to_string()));
        }
        Ok(Self::new(*resource, *action, *target))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True iff `self` (typically a held grant) satisfies `required`
    /// (typically a scope a tool manifest declares it needs), matching
    /// segment-wise with `*` as a wildcard on either side.
    pub fn matches(&self, required: &Scope) -> bool {
        segment_matches(&self.resource, &required.resource)
            && segment_matches(&self.action, &required.action)
            && segment_matches(&self.target, &required.target)
    }
}

fn segment_matches(held: &str, required: &str) -> bool {
    held == "*" || required == "*" || held == required
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.target)
    }
}

impl TryFrom<String> for Scope {
    type Error = ScopeParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Scope::parse(&s)
    }
}

impl From<Scope> for String {
    fn from(s: Scope) -> Self {
        s.to_string()
    }
}

impl std::str::FromStr for Scope {
    type Err = ScopeParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::parse(s)
    }
}
