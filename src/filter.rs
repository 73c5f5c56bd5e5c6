//! Tag / include / exclude predicate applied to discovered resources.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use crate::types::AttributeMap;

/// A `key=value` tag a resource may carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value`.
    pub fn parse(s: &str) -> Option<Self> {
        let (key, value) = s.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, value.trim()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Which resources enter the pipeline.
///
/// - `tags`: a resource is admitted if it carries any of these tags
/// - `include`: resource-type allow-list
/// - `exclude`: literal-value block-list (matched against raw cloud IDs)
///
/// Empty lists admit everything. The exclude set is built once, on first use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Tags of which at least one must match.
    pub tags: Vec<Tag>,
    /// Allowed resource types.
    pub include: Vec<String>,
    /// Blocked values.
    pub exclude: Vec<String>,
    #[serde(skip)]
    exclude_set: OnceLock<HashSet<String>>,
}

impl FilterSpec {
    /// Create a filter from its three lists.
    pub fn new(tags: Vec<Tag>, include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            tags,
            include,
            exclude,
            exclude_set: OnceLock::new(),
        }
    }

    /// Whether `value` is on the exclude list.
    pub fn is_excluded(&self, value: &str) -> bool {
        if self.exclude.is_empty() {
            return false;
        }

        self.exclude_set
            .get_or_init(|| self.exclude.iter().cloned().collect())
            .contains(value)
    }

    /// Whether resources of `resource_type` should be imported.
    pub fn is_included(&self, resource_type: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|t| t == resource_type)
    }

    /// Whether flat `tags.<key>` attributes carry any configured tag.
    pub fn matches_tags(&self, attributes: &AttributeMap) -> bool {
        if self.tags.is_empty() {
            return true;
        }

        self.tags.iter().any(|tag| {
            attributes
                .get(&format!("tags.{}", tag.key))
                .is_some_and(|value| *value == tag.value)
        })
    }
}

impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags && self.include == other.include && self.exclude == other.exclude
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.tags.iter().map(Tag::to_string).collect();
        write!(
            f,
            "Tags: [{}], Include: [{}], Exclude: [{}]",
            tags.join(", "),
            self.include.join(", "),
            self.exclude.join(", ")
        )
    }
}
