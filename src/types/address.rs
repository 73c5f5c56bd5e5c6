//! Resource addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error parsing a resource address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The address string was empty.
    #[error("resource address is empty")]
    Empty,
    /// The address is not of the form `<type>.<name>`.
    #[error("malformed resource address {0:?}: expected \"<type>.<name>\"")]
    Malformed(String),
}

/// A `(type, name)` pair identifying one managed infrastructure object.
///
/// Serialized as `"<type>.<name>"`. Ordering is by type, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceAddress {
    resource_type: String,
    name: String,
}

impl ResourceAddress {
    /// Create an address from its parts.
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Parse `"<type>.<name>"`.
    ///
    /// Exactly one `.` separator is allowed and both segments must be non-empty.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (resource_type, name) = s
            .split_once('.')
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;

        if resource_type.is_empty() || name.is_empty() || name.contains('.') {
            return Err(AddressError::Malformed(s.to_string()));
        }

        Ok(Self::new(resource_type, name))
    }

    /// The resource type, e.g. `aws_instance`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First underscore-delimited token of the type (`aws` for `aws_instance`).
    pub fn provider_prefix(&self) -> &str {
        self.resource_type
            .split('_')
            .next()
            .unwrap_or(&self.resource_type)
    }

    /// The type with its provider prefix dropped (`instance` for `aws_instance`).
    ///
    /// Empty when the type has no `_`.
    pub fn group(&self) -> String {
        self.resource_type
            .split('_')
            .skip(1)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Same type, different name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(self.resource_type.clone(), name)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Turn a raw cloud name or ID into a usable resource name.
///
/// ASCII alphanumerics, `_` and `-` are kept, anything else becomes `_`.
/// Names must not start with a digit or `-`.
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        return "unnamed".to_string();
    }

    if name.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        name.insert(0, '_');
    }

    name
}
