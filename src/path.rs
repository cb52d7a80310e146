//! Path addressing for the managed data tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical partition of the data store.
///
/// Configuration holds desired state written by clients; Operational holds
/// observed state reported by the system. Every store access names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Configuration,
    Operational,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Configuration => write!(f, "configuration"),
            Partition::Operational => write!(f, "operational"),
        }
    }
}

/// Scope of a data-change subscription relative to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenScope {
    /// Only the node at the subscribed path.
    Base,
    /// The node and its direct children.
    OneLevel,
    /// The node and all descendants.
    Subtree,
}

impl ListenScope {
    /// Whether a change at `changed` is visible to a subscription at `subscribed`.
    pub fn matches(&self, subscribed: &PathAddress, changed: &PathAddress) -> bool {
        match self {
            ListenScope::Base => subscribed == changed,
            ListenScope::OneLevel => {
                changed == subscribed
                    || changed
                        .parent()
                        .map(|p| p == *subscribed)
                        .unwrap_or(false)
            }
            ListenScope::Subtree => changed.starts_with(subscribed),
        }
    }
}

/// Hierarchical identifier of a node in the data tree.
///
/// An ordered sequence of segments from the root. Equality, ordering and
/// hashing are structural, so paths serve directly as map and set keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PathAddress {
    segments: Vec<String>,
}

impl PathAddress {
    /// The root of the tree (empty segment sequence).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// A new path extended by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `ancestor` is a prefix of this path (inclusive: every path
    /// starts with itself).
    pub fn starts_with(&self, ancestor: &PathAddress) -> bool {
        self.segments.len() >= ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Error parsing a textual path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathParseError {
    #[error("path must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("empty segment in path: {0}")]
    EmptySegment(String),
}

impl FromStr for PathAddress {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PathParseError::MissingLeadingSlash(s.to_string()));
        };
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(PathParseError::EmptySegment(s.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }
}
