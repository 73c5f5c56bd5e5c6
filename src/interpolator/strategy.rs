//! Ranked attribute match strategies.
//!
//! Within a candidate group, strategies are tried in rank order across all
//! of the group's instances; the first hit wins.

use std::fmt;

use crate::types::AttributeMap;

/// How an attribute of a candidate instance is matched against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Attribute named exactly by the leftover key suffix, with equal value.
    ExactAttribute,
    /// Any attribute with an equal value.
    AnyAttribute,
}

impl MatchStrategy {
    /// Strategies in priority order.
    pub const RANKED: [MatchStrategy; 2] = [Self::ExactAttribute, Self::AnyAttribute];

    /// Attribute of `attributes` matching `value` under this strategy.
    ///
    /// `suffix` is the part of the interpolated key not consumed by the
    /// group name (`id` for `virtual_machine_id` against `virtual_machine`).
    pub fn find<'a>(
        &self,
        attributes: &'a AttributeMap,
        suffix: &str,
        value: &str,
    ) -> Option<&'a str> {
        match self {
            Self::ExactAttribute => attributes
                .get_key_value(suffix)
                .filter(|(_, v)| v.as_str() == value)
                .map(|(k, _)| k.as_str()),
            Self::AnyAttribute => attributes
                .iter()
                .find(|(_, v)| v.as_str() == value)
                .map(|(k, _)| k.as_str()),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactAttribute => write!(f, "exact_attribute"),
            Self::AnyAttribute => write!(f, "any_attribute"),
        }
    }
}
